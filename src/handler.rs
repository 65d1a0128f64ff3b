//! Turn and session handlers.
//!
//! `ChatHandler` runs one user turn end to end: it loads or creates the
//! session, resolves what the session is working on, runs the reasoning engine
//! and persists the result. `SessionHandler` exposes stored sessions.

use crate::agent::{builtin_registry, CapabilityRegistry};
use crate::config::{Prompts, Settings};
use crate::error::{MontageError, Result};
use crate::library::{CatalogLibrary, MediaLibrary};
use crate::llm::{create_gateway, LlmGateway};
use crate::reasoning::ReasoningEngine;
use crate::session::{
    ConversationMessage, InputMessage, MsgStatus, OutputMessage, Session, SessionRecord, SessionState,
};
use crate::store::{open_store, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A user message addressed to a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Existing session to continue; a new session is created when absent or unknown.
    pub session_id: Option<String>,
    pub collection_id: Option<String>,
    pub video_id: Option<String>,
    pub content: String,
    /// Restrict the turn to these agents; empty means all.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Runs chat turns.
pub struct ChatHandler {
    store: Arc<dyn SessionStore>,
    llm: Arc<dyn LlmGateway>,
    registry: CapabilityRegistry,
    library: Arc<dyn MediaLibrary>,
    prompts: Prompts,
    max_iterations: usize,
    default_collection: Option<String>,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl ChatHandler {
    /// Build a handler with every component taken from settings.
    pub fn new(settings: &Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let store = open_store(settings)?;
        let llm = create_gateway(&settings.llm)?;
        let library: Arc<dyn MediaLibrary> = Arc::new(CatalogLibrary::load(&settings.catalog_path())?);
        let registry = builtin_registry(settings, library.clone())?;

        info!(
            "Chat handler ready: model {}, {} agent(s)",
            llm.model_name(),
            registry.len()
        );

        Ok(Self::with_components(store, llm, registry, library, prompts)
            .with_max_iterations(settings.reasoning.max_iterations)
            .with_default_collection(settings.library.default_collection.clone()))
    }

    /// Build a handler from custom components.
    pub fn with_components(
        store: Arc<dyn SessionStore>,
        llm: Arc<dyn LlmGateway>,
        registry: CapabilityRegistry,
        library: Arc<dyn MediaLibrary>,
        prompts: Prompts,
    ) -> Self {
        Self {
            store,
            llm,
            registry,
            library,
            prompts,
            max_iterations: crate::reasoning::DEFAULT_MAX_ITERATIONS,
            default_collection: None,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_default_collection(mut self, collection_id: Option<String>) -> Self {
        self.default_collection = collection_id;
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn store(&self) -> Arc<dyn SessionStore> {
        self.store.clone()
    }

    pub fn library(&self) -> Arc<dyn MediaLibrary> {
        self.library.clone()
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Run one turn and return its published output message.
    pub async fn chat(&self, request: ChatRequest) -> Result<OutputMessage> {
        self.run_turn(request, None).await
    }

    /// Run one turn, sending an output snapshot on every update.
    pub async fn chat_with_updates(
        &self,
        request: ChatRequest,
        updates: mpsc::UnboundedSender<OutputMessage>,
    ) -> Result<OutputMessage> {
        self.run_turn(request, Some(updates)).await
    }

    /// Ask the active run of a session to stop. Returns false if nothing is running.
    pub fn stop(&self, session_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(session_id) {
            Some(token) => {
                info!("Stop requested for session {}", session_id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a turn is currently running for the session.
    pub fn is_running(&self, session_id: &str) -> bool {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.contains_key(session_id)
    }

    #[instrument(skip(self, request, updates), fields(session_id = ?request.session_id))]
    async fn run_turn(
        &self,
        request: ChatRequest,
        updates: Option<mpsc::UnboundedSender<OutputMessage>>,
    ) -> Result<OutputMessage> {
        if request.content.trim().is_empty() {
            return Err(MontageError::InvalidInput("Message content is empty".to_string()));
        }
        let registry = self.registry.subset(&request.agents)?;

        let mut session = self.load_or_create(&request).await?;
        let conv_id = session.start_turn();
        if let Some(tx) = updates {
            session.output_message.attach(tx);
        }
        self.resolve_state(&mut session).await?;

        let session_id = session.session_id.clone();
        let stop = self.register_run(&session_id)?;
        let result = self
            .execute(&mut session, &conv_id, &request, registry, stop)
            .await;
        self.unregister_run(&session_id);
        result?;

        session.output_message.detach();
        Ok(session.output_message)
    }

    async fn execute(
        &self,
        session: &mut Session,
        conv_id: &str,
        request: &ChatRequest,
        registry: CapabilityRegistry,
        stop: CancellationToken,
    ) -> Result<()> {
        let session_id = session.session_id.clone();
        self.store.upsert_session(&session.record()).await?;

        let input = InputMessage::new(&session_id, conv_id, &request.content, request.agents.clone());
        self.store
            .save_message(&session_id, &ConversationMessage::Input(input))
            .await?;
        self.store
            .save_message(&session_id, &ConversationMessage::Output(session.output_message.clone()))
            .await?;

        let result = {
            let mut engine = ReasoningEngine::new(
                session,
                request.content.clone(),
                self.llm.clone(),
                registry,
                self.prompts.clone(),
            )
            .with_max_iterations(self.max_iterations)
            .with_stop_token(stop);
            engine.run().await
        };

        match result {
            Ok(outcome) => {
                info!("Turn {} ended: {:?}", conv_id, outcome);
                self.store
                    .save_context(&session_id, &session.reasoning_context)
                    .await?;
            }
            Err(e) => {
                // The context may hold a partial turn; keep the last consistent one.
                error!("Turn {} aborted: {}", conv_id, e);
                let output = &mut session.output_message;
                output.actions.push(format!("Turn aborted: {}", e));
                output.status = MsgStatus::Error;
                output.publish();
            }
        }

        self.store.upsert_session(&session.record()).await?;
        self.store
            .save_message(&session_id, &ConversationMessage::Output(session.output_message.clone()))
            .await?;
        Ok(())
    }

    async fn load_or_create(&self, request: &ChatRequest) -> Result<Session> {
        let existing = match &request.session_id {
            Some(id) => self.store.get_session(id).await?,
            None => None,
        };

        let mut session = match existing {
            Some(record) => {
                let context = self.store.load_context(&record.session_id).await?;
                Session::from_record(record, context)
            }
            None => Session::new(
                request.session_id.clone(),
                request.collection_id.clone(),
                request.video_id.clone(),
            ),
        };

        if request.collection_id.is_some() {
            session.collection_id = request.collection_id.clone();
        }
        if request.video_id.is_some() {
            session.video_id = request.video_id.clone();
        }
        if session.collection_id.is_none() {
            session.collection_id = self.default_collection.clone();
        }
        Ok(session)
    }

    /// Look up the session's collection and video in the library.
    ///
    /// A video found outside any bound collection binds its owning collection.
    async fn resolve_state(&self, session: &mut Session) -> Result<()> {
        let mut state = SessionState::default();

        if let Some(collection_id) = &session.collection_id {
            state.collection = self.library.get_collection(collection_id).await?;
            if state.collection.is_none() {
                warn!("Collection {} is not in the media library", collection_id);
            }
        }

        if let Some(video_id) = &session.video_id {
            match &state.collection {
                Some(collection) => {
                    state.video = collection.videos.iter().find(|v| &v.id == video_id).cloned();
                }
                None => {
                    let owner = self
                        .library
                        .list_collections()
                        .await?
                        .into_iter()
                        .find(|c| c.videos.iter().any(|v| &v.id == video_id));
                    if let Some(collection) = owner {
                        debug!("Video {} belongs to collection {}", video_id, collection.id);
                        state.video = collection.videos.iter().find(|v| &v.id == video_id).cloned();
                        if session.collection_id.is_none() {
                            session.collection_id = Some(collection.id.clone());
                        }
                        state.collection = Some(collection);
                    }
                }
            }
            if state.video.is_none() {
                warn!("Video {} is not in the media library", video_id);
            }
        }

        session.state = state;
        Ok(())
    }

    fn register_run(&self, session_id: &str) -> Result<CancellationToken> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.contains_key(session_id) {
            return Err(MontageError::InvalidInput(format!(
                "Session {} already has a turn in progress",
                session_id
            )));
        }
        let token = CancellationToken::new();
        active.insert(session_id.to_string(), token.clone());
        Ok(token)
    }

    fn unregister_run(&self, session_id: &str) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(session_id);
    }
}

/// A stored session with its conversation.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetails {
    #[serde(flatten)]
    pub record: SessionRecord,
    pub conversation: Vec<ConversationMessage>,
}

/// Read and delete stored sessions.
pub struct SessionHandler {
    store: Arc<dyn SessionStore>,
}

impl SessionHandler {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<SessionRecord>> {
        self.store.list_sessions().await
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionDetails> {
        let record = self
            .store
            .get_session(session_id)
            .await?
            .ok_or_else(|| MontageError::SessionNotFound(session_id.to_string()))?;
        let conversation = self.store.list_messages(session_id).await?;
        Ok(SessionDetails { record, conversation })
    }

    pub async fn delete(&self, session_id: &str) -> Result<()> {
        if self.store.delete_session(session_id).await? {
            Ok(())
        } else {
            Err(MontageError::SessionNotFound(session_id.to_string()))
        }
    }
}

/// Readiness of the configured backends.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigCheck {
    pub llm: bool,
    pub session_store: bool,
    pub library: bool,
}

impl ConfigCheck {
    pub fn ok(&self) -> bool {
        self.llm && self.session_store && self.library
    }
}

/// Check API credentials, the session store and the media catalog.
pub async fn check_config(settings: &Settings, store: &dyn SessionStore) -> ConfigCheck {
    ConfigCheck {
        llm: crate::openai::api_key_configured(),
        session_store: store.health_check().await,
        library: settings.catalog_path().exists(),
    }
}
