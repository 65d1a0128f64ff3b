//! Montage - chat-driven video and audio production
//!
//! An assistant that reasons over a conversation and calls media agents to do
//! the work: library lookups, image generation, narration and storyboards.
//!
//! # Overview
//!
//! Each user message starts a turn. The reasoning engine sends the session's
//! context to the LLM together with the tools of the available agents, runs the
//! tool calls it asks for, feeds the results back and repeats until the model
//! stops asking for tools. It then writes a summary for the user. Progress is
//! streamed through the turn's output message.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `session` - Sessions, the context log and the output channel
//! - `store` - Session persistence (SQLite, in-memory)
//! - `llm` - LLM gateway abstraction and the OpenAI implementation
//! - `library` - Media catalog used to orient the assistant
//! - `agent` - Capabilities, their registry and the built-in agents
//! - `reasoning` - The reasoning loop
//! - `handler` - Turn and session entry points
//!
//! # Example
//!
//! ```rust,no_run
//! use montage::config::Settings;
//! use montage::handler::{ChatHandler, ChatRequest};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let handler = ChatHandler::new(&settings)?;
//!
//!     let output = handler
//!         .chat(ChatRequest {
//!             content: "Storyboard a 30 second intro for the coast trip".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{}", output.final_text().unwrap_or_default());
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod library;
pub mod llm;
pub mod openai;
pub mod reasoning;
pub mod session;
pub mod store;

pub use error::{MontageError, Result};
