//! CLI command implementations.

mod agents;
mod chat;
mod config;
mod doctor;
mod run;
mod serve;
mod sessions;

pub use agents::run_agents;
pub use chat::run_chat;
pub use config::run_config;
pub use doctor::run_doctor;
pub use run::{run_run, TurnOptions};
pub use serve::run_serve;
pub use sessions::run_sessions;
