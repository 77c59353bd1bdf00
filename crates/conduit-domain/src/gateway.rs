//! The gateway facade.
//!
//! [`Gateway`] wires the provider registry, option translator, session store
//! and toolkit together and exposes every operation transport layers need.
//! The tool loop behind [`Gateway::chat`] lives in [`crate::chat`].

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conduit_config::{DEFAULT_MAX_ITERATIONS, GatewayConfig};
use conduit_llm::{
    Attachment, Client, Dialect, GenOption, Message, SharedClient, StreamCallback,
    ToolDefinition, Translator, options,
};
use conduit_session::{
    GeneratorMeta, ListFilter, MemoryStore, NewSession, Pagination, Session, SessionId,
    SessionPage, SessionUpdate, SharedSessionStore,
};
use conduit_tools::{Tool, ToolContext, ToolInfo, ToolOutput, Toolkit};

use crate::error::{GatewayError, Result};
use crate::registry::{ModelResolver, ProviderRegistry};
use crate::request::{AskRequest, AskResponse, EmbedRequest, EmbedResponse, ModelPage};
use crate::store::open_store;

// ─────────────────────────────────────────────────────────────────────────────
// Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Entry point for generation, sessions and tools.
///
/// Cheap to clone; every clone shares the same registry, store and toolkit.
#[derive(Clone)]
pub struct Gateway {
    pub(crate) resolver: ModelResolver,
    pub(crate) translator: Arc<Translator>,
    pub(crate) store: SharedSessionStore,
    pub(crate) toolkit: Arc<Toolkit>,
    pub(crate) max_iterations: u32,
    pub(crate) default_provider: Option<String>,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Build a gateway from loaded configuration.
    ///
    /// Opens the configured session store and registers configured dialects.
    pub async fn from_config(
        config: &GatewayConfig,
        clients: impl IntoIterator<Item = SharedClient>,
        toolkit: Toolkit,
    ) -> Result<Self> {
        let store = open_store(&config.session()).await?;
        let mut builder = GatewayBuilder::new()
            .with_config(config)?
            .with_store(store)
            .with_toolkit(toolkit);
        for client in clients {
            builder = builder.with_client(client);
        }
        builder.build()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        self.resolver.registry()
    }

    pub fn resolver(&self) -> &ModelResolver {
        &self.resolver
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    pub fn store(&self) -> &SharedSessionStore {
        &self.store
    }

    /// Default tool-loop budget.
    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// The provider hint for a request: its own, else the configured default.
    pub(crate) fn provider_hint<'a>(&'a self, provider: &'a str) -> Option<&'a str> {
        if provider.is_empty() {
            self.default_provider.as_deref()
        } else {
            Some(provider)
        }
    }

    // ── Generation ──────────────────────────────────────────────────────────

    /// Generate a single reply with no session and no tool loop.
    pub async fn ask(
        &self,
        request: AskRequest,
        stream: Option<StreamCallback>,
    ) -> Result<AskResponse> {
        let AskRequest {
            meta,
            text,
            attachments,
            options,
            cancel,
        } = request;

        let (model, client) = self
            .resolver
            .resolve(self.provider_hint(&meta.provider), &meta.model, &cancel)
            .await?;
        let generator = client
            .as_generator()
            .ok_or_else(|| GatewayError::not_implemented(client.name(), "generation"))?;

        let options = self.translator.translate(
            &meta_options(&meta, Vec::new(), stream, &options),
            client.name(),
        )?;
        let message = user_message(text, attachments);

        info!(provider = %model.provider, model = %model.name, "Ask started");
        let generation = cancellable(
            &cancel,
            generator.without_session(&model.name, &message, &options),
        )
        .await?;
        info!(
            provider = %model.provider,
            model = %model.name,
            input_tokens = generation.usage.input_tokens,
            output_tokens = generation.usage.output_tokens,
            "Ask completed"
        );

        Ok(AskResponse::from_message(generation.message, generation.usage))
    }

    /// Embed one or more texts.
    pub async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        if request.texts.is_empty() {
            return Err(GatewayError::BadParameter(
                "at least one text is required".to_string(),
            ));
        }

        let provider = request.provider.as_deref().unwrap_or_default();
        let (model, client) = self
            .resolver
            .resolve(self.provider_hint(provider), &request.model, &request.cancel)
            .await?;
        let embedder = client
            .as_embedder()
            .ok_or_else(|| GatewayError::not_implemented(client.name(), "embeddings"))?;
        let options = self.translator.translate(&request.options, client.name())?;

        debug!(provider = %model.provider, model = %model.name, texts = request.texts.len(), "Embedding");
        let vectors = match request.texts.as_slice() {
            [text] => vec![
                cancellable(
                    &request.cancel,
                    embedder.embedding(&model.name, text, &options),
                )
                .await?,
            ],
            texts => {
                cancellable(
                    &request.cancel,
                    embedder.batch_embedding(&model.name, texts, &options),
                )
                .await?
            }
        };

        Ok(EmbedResponse { model, vectors })
    }

    // ── Models ──────────────────────────────────────────────────────────────

    /// List models across backends, or from one backend.
    ///
    /// Without a filter, backends that fail to list are skipped. With a
    /// filter, that backend's failure is the caller's error.
    pub async fn list_models(
        &self,
        provider: Option<&str>,
        pagination: Pagination,
    ) -> Result<ModelPage> {
        let registry = self.resolver.registry();
        let clients: Vec<SharedClient> = match provider {
            Some(name) => vec![registry.get(name)?],
            None => registry.clients().cloned().collect(),
        };

        let listed = join_all(clients.iter().map(|client| async move {
            (client.name().to_string(), client.list_models().await)
        }))
        .await;

        let mut models = Vec::new();
        for (name, result) in listed {
            match result {
                Ok(found) => models.extend(found),
                Err(e) if provider.is_some() => return Err(e.into()),
                Err(e) => warn!(provider = %name, error = %e, "Failed to list models"),
            }
        }
        models.sort();

        Ok(ModelPage {
            total: models.len(),
            models: pagination.page(models),
            known_providers: registry.names(),
        })
    }

    // ── Sessions ────────────────────────────────────────────────────────────

    /// Create a session after checking that its model exists.
    ///
    /// The stored provider is the one that actually serves the model.
    pub async fn create_session(&self, mut new: NewSession) -> Result<Session> {
        let (model, _) = self
            .resolver
            .resolve(
                self.provider_hint(&new.meta.provider),
                &new.meta.model,
                &CancellationToken::new(),
            )
            .await?;
        new.meta.provider = model.provider;

        let session = self.store.create(new).await?;
        info!(
            session_id = %session.id,
            provider = %session.meta.provider,
            model = %session.meta.model,
            "Session created"
        );
        Ok(session)
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Session> {
        Ok(self.store.get(id).await?)
    }

    pub async fn delete_session(&self, id: &SessionId) -> Result<()> {
        self.store.delete(id).await?;
        info!(session_id = %id, "Session deleted");
        Ok(())
    }

    pub async fn list_sessions(
        &self,
        filter: &ListFilter,
        pagination: Pagination,
    ) -> Result<SessionPage> {
        Ok(self.store.list(filter, pagination).await?)
    }

    /// Apply a partial update.
    ///
    /// Changing the model or provider re-validates the pair. A new model
    /// without a new provider is searched for across every backend.
    pub async fn update_session(
        &self,
        id: &SessionId,
        mut update: SessionUpdate,
    ) -> Result<Session> {
        if !update.meta.model.is_empty() || !update.meta.provider.is_empty() {
            let current = self.store.get(id).await?;
            let target = current.meta.overlay(&update.meta);
            let hint = if !update.meta.provider.is_empty() {
                Some(update.meta.provider.as_str())
            } else if !update.meta.model.is_empty() {
                self.default_provider.as_deref()
            } else {
                Some(current.meta.provider.as_str())
            };
            let (model, _) = self
                .resolver
                .resolve(hint, &target.model, &CancellationToken::new())
                .await?;
            update.meta.provider = model.provider;
        }

        let session = self.store.update(id, update).await?;
        debug!(session_id = %id, "Session updated");
        Ok(session)
    }

    // ── Tools ───────────────────────────────────────────────────────────────

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.toolkit.list()
    }

    pub fn get_tool(&self, name: &str) -> Result<ToolInfo> {
        Ok(self.toolkit.info(name)?)
    }

    /// Execute one tool outside any conversation.
    pub async fn call_tool(
        &self,
        name: &str,
        input: serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<ToolOutput> {
        let ctx = ToolContext::with_cancellation(cancel);
        debug!(tool = %name, "Calling tool directly");
        Ok(self.toolkit.call(name, input, &ctx).await?)
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", self.resolver.registry())
            .field("tools", &self.toolkit.names())
            .field("max_iterations", &self.max_iterations)
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Assembles a [`Gateway`].
///
/// Dialects are registered built-ins first, then those the backends
/// describe, then those added here or through config, so later sources win.
pub struct GatewayBuilder {
    clients: Vec<SharedClient>,
    store: Option<SharedSessionStore>,
    toolkit: Toolkit,
    dialects: Vec<Dialect>,
    max_iterations: u32,
    default_provider: Option<String>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            clients: Vec::new(),
            store: None,
            toolkit: Toolkit::new(),
            dialects: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            default_provider: None,
        }
    }

    pub fn with_client(mut self, client: SharedClient) -> Self {
        self.clients.push(client);
        self
    }

    pub fn with_backend<C: Client + 'static>(self, backend: C) -> Self {
        self.with_client(Arc::new(backend))
    }

    /// Session store; an in-memory store when unset.
    pub fn with_store(mut self, store: SharedSessionStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_toolkit(mut self, toolkit: Toolkit) -> Self {
        self.toolkit = toolkit;
        self
    }

    pub fn with_tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.toolkit.register(tool);
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialects.push(dialect);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    /// Apply the `[gateway]` and `[dialect.*]` sections.
    pub fn with_config(mut self, config: &GatewayConfig) -> Result<Self> {
        self.max_iterations = config.max_iterations();
        if let Some(provider) = config.default_provider() {
            self.default_provider = Some(provider.to_string());
        }
        self.dialects.extend(config.dialects()?);
        Ok(self)
    }

    pub fn build(self) -> Result<Gateway> {
        let registry = ProviderRegistry::new(self.clients)?;

        let mut translator = Translator::new();
        for client in registry.clients() {
            if let Some(dialect) = client.dialect() {
                translator.register(dialect);
            }
        }
        for dialect in self.dialects {
            translator.register(dialect);
        }

        if let Some(ref provider) = self.default_provider {
            registry.get(provider)?;
        }

        info!(
            providers = registry.len(),
            tools = self.toolkit.len(),
            max_iterations = self.max_iterations,
            "Gateway initialized"
        );

        Ok(Gateway {
            resolver: ModelResolver::new(Arc::new(registry)),
            translator: Arc::new(translator),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new()) as SharedSessionStore),
            toolkit: Arc::new(self.toolkit),
            max_iterations: self.max_iterations,
            default_provider: self.default_provider,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Generation options implied by generator settings, followed by `extra`.
pub(crate) fn meta_options(
    meta: &GeneratorMeta,
    tools: Vec<ToolDefinition>,
    stream: Option<StreamCallback>,
    extra: &[GenOption],
) -> Vec<GenOption> {
    let mut opts = Vec::new();
    if !meta.system_prompt.is_empty() {
        opts.push(options::system_prompt(meta.system_prompt.clone()));
    }
    if let Some(ref schema) = meta.response_format {
        opts.push(options::response_schema(schema.clone()));
    }
    if let Some(enabled) = meta.thinking {
        opts.push(options::thinking(enabled));
    }
    if meta.thinking_budget > 0 && meta.thinking != Some(false) {
        opts.push(options::thinking_budget(meta.thinking_budget));
    }
    if !tools.is_empty() {
        opts.push(options::tools(tools));
    }
    if let Some(callback) = stream {
        opts.push(options::stream(callback));
    }
    opts.extend(extra.iter().cloned());
    opts
}

/// The user's turn, with its estimated token count.
pub(crate) fn user_message(text: String, attachments: Vec<Attachment>) -> Message {
    let message = if attachments.is_empty() {
        Message::user(text)
    } else {
        Message::user_with_attachments(text, attachments)
    };
    let tokens = message.estimated_tokens();
    message.with_tokens(tokens)
}

/// Race a backend call against the caller's cancellation.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = conduit_llm::Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        result = call => result.map_err(GatewayError::from),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
