//! Provider registry and model resolution.
//!
//! The registry maps backend names to clients. It is built once when the
//! gateway starts and never changes afterwards, so lookups need no locking.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use conduit_llm::{LlmError, Model, SharedClient};

use crate::error::{GatewayError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Provider Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable map of backend name to client.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: BTreeMap<String, SharedClient>,
}

impl ProviderRegistry {
    /// Build a registry. Backend names must be unique and non-empty.
    pub fn new(clients: impl IntoIterator<Item = SharedClient>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for client in clients {
            let name = client.name().to_string();
            if name.is_empty() {
                return Err(GatewayError::BadParameter(
                    "backend name must not be empty".to_string(),
                ));
            }
            if map.insert(name.clone(), client).is_some() {
                return Err(GatewayError::BadParameter(format!(
                    "backend '{}' registered twice",
                    name
                )));
            }
        }
        Ok(Self { clients: map })
    }

    /// Look up a backend by name.
    pub fn get(&self, name: &str) -> Result<SharedClient> {
        self.clients
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("provider '{}'", name)))
    }

    /// Registered backend names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    pub fn clients(&self) -> impl Iterator<Item = &SharedClient> {
        self.clients.values()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Resolver
// ─────────────────────────────────────────────────────────────────────────────

/// How one backend answered during a model search.
enum Probe {
    Matched,
    Absent,
    Unreachable(String),
    Failed,
    Cancelled,
}

/// Finds the backend serving a model.
#[derive(Debug, Clone)]
pub struct ModelResolver {
    registry: Arc<ProviderRegistry>,
}

impl ModelResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve `name` to a model and the client that serves it.
    ///
    /// With a provider hint only that backend is asked. Without one every
    /// backend is searched concurrently and the first to report the name
    /// wins; see [`ModelResolver::search`].
    pub async fn resolve(
        &self,
        provider: Option<&str>,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(Model, SharedClient)> {
        if name.is_empty() {
            return Err(GatewayError::BadParameter("model name is required".to_string()));
        }

        let Some(provider) = provider.filter(|p| !p.is_empty()) else {
            return self.search(name, cancel).await;
        };

        let client = self.registry.get(provider)?;
        let lookup = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
            lookup = client.get_model(name) => lookup,
        };
        match lookup {
            Ok(model) => Ok((model, client)),
            Err(LlmError::NotFound(_)) => Err(GatewayError::ModelNotFound {
                model: name.to_string(),
                unreachable: Vec::new(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Ask every backend for its model list at once.
    ///
    /// The first match recorded under the lock wins and cancels the rest.
    /// Losing queries are detached rather than aborted; they observe the
    /// cancellation and their results are dropped. Backend failures are
    /// logged and skipped. When nothing matches, the error names the
    /// backends that could not be reached.
    async fn search(&self, name: &str, cancel: &CancellationToken) -> Result<(Model, SharedClient)> {
        let token = cancel.child_token();
        let winner: Arc<Mutex<Option<(Model, SharedClient)>>> = Arc::new(Mutex::new(None));
        let mut probes = JoinSet::new();

        for client in self.registry.clients() {
            let client = Arc::clone(client);
            let token = token.clone();
            let winner = Arc::clone(&winner);
            let name = name.to_string();

            probes.spawn(async move {
                let listed = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Probe::Cancelled,
                    listed = client.list_models() => listed,
                };
                match listed {
                    Ok(models) => match models.into_iter().find(|m| m.name == name) {
                        Some(model) => {
                            let mut slot = winner.lock();
                            if slot.is_none() && !token.is_cancelled() {
                                *slot = Some((model, Arc::clone(&client)));
                                token.cancel();
                            }
                            Probe::Matched
                        }
                        None => Probe::Absent,
                    },
                    Err(e) => {
                        warn!(
                            provider = client.name(),
                            model = %name,
                            error = %e,
                            "Backend failed during model search"
                        );
                        if e.is_unreachable() {
                            Probe::Unreachable(client.name().to_string())
                        } else {
                            Probe::Failed
                        }
                    }
                }
            });
        }

        let mut unreachable = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Probe::Unreachable(provider)) => unreachable.push(provider),
                Ok(Probe::Matched | Probe::Absent | Probe::Failed | Probe::Cancelled) => {}
                Err(e) => warn!(error = %e, "Model search task failed"),
            }
            if winner.lock().is_some() {
                probes.detach_all();
                break;
            }
        }

        let found = winner.lock().take();
        match found {
            Some((model, client)) => {
                debug!(provider = %model.provider, model = %model.name, "Model resolved");
                Ok((model, client))
            }
            None if cancel.is_cancelled() => Err(GatewayError::Cancelled),
            None => {
                unreachable.sort();
                Err(GatewayError::ModelNotFound {
                    model: name.to_string(),
                    unreachable,
                })
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_llm::MockBackend;
    use std::time::Duration;

    fn resolver(backends: Vec<MockBackend>) -> ModelResolver {
        let clients = backends
            .into_iter()
            .map(|b| Arc::new(b) as SharedClient);
        ModelResolver::new(Arc::new(ProviderRegistry::new(clients).unwrap()))
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let clients: Vec<SharedClient> = vec![
            Arc::new(MockBackend::new("a")),
            Arc::new(MockBackend::new("a")),
        ];
        assert!(matches!(
            ProviderRegistry::new(clients),
            Err(GatewayError::BadParameter(_))
        ));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ProviderRegistry::new(vec![
            Arc::new(MockBackend::new("b")) as SharedClient,
            Arc::new(MockBackend::new("a")) as SharedClient,
        ])
        .unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
        assert!(registry.get("a").is_ok());
        assert!(matches!(registry.get("c"), Err(GatewayError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_resolve_with_provider() {
        let resolver = resolver(vec![
            MockBackend::new("a").with_models(&["m1"]),
            MockBackend::new("b").with_models(&["m2"]),
        ]);
        let cancel = CancellationToken::new();

        let (model, client) = resolver.resolve(Some("b"), "m2", &cancel).await.unwrap();
        assert_eq!(model, Model::new("b", "m2"));
        assert_eq!(client.name(), "b");

        let err = resolver.resolve(Some("a"), "m2", &cancel).await.unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotFound { .. }));

        let err = resolver.resolve(Some("zz"), "m2", &cancel).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_search_skips_broken_backend() {
        let resolver = resolver(vec![
            MockBackend::new("broken").with_list_error(LlmError::Backend("boom".to_string())),
            MockBackend::new("ok").with_models(&["m"]),
        ]);
        let (model, _) = resolver
            .resolve(None, "m", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model.provider, "ok");
    }

    #[tokio::test]
    async fn test_search_reports_unreachable_backends() {
        let resolver = resolver(vec![
            MockBackend::new("down").with_list_error(LlmError::Network("refused".to_string())),
            MockBackend::new("broken").with_list_error(LlmError::Backend("500".to_string())),
            MockBackend::new("up").with_models(&["other"]),
        ]);
        let err = resolver
            .resolve(None, "m", &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            GatewayError::ModelNotFound { model, unreachable } => {
                assert_eq!(model, "m");
                assert_eq!(unreachable, vec!["down".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_search_does_not_wait_for_slow_backend() {
        let resolver = resolver(vec![
            MockBackend::new("slow")
                .with_models(&["m"])
                .with_list_delay(Duration::from_secs(30)),
            MockBackend::new("fast").with_models(&["m"]),
        ]);

        let started = std::time::Instant::now();
        let (model, _) = resolver
            .resolve(None, "m", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(model.provider, "fast");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_search_honours_caller_cancellation() {
        let resolver = resolver(vec![
            MockBackend::new("slow")
                .with_models(&["m"])
                .with_list_delay(Duration::from_secs(30)),
        ]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver.resolve(None, "m", &cancel).await.unwrap_err();
        assert!(matches!(err, GatewayError::Cancelled));
    }

    #[tokio::test]
    async fn test_empty_model_name() {
        let resolver = resolver(vec![MockBackend::new("a")]);
        let err = resolver
            .resolve(None, "", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BadParameter(_)));
    }
}
