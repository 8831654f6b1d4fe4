// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LLM Provider Factory - Task Routing, Caching and Fallback
//
// Resolves "which provider, which model" from configuration and hands out a
// single shared instance per provider name. Backend kinds are looked up in a
// flat constructor table, so adding a backend never touches resolution code.

use crate::domain::llm::{ChunkStream, GenerationOptions, LLMError, LLMProvider, Message};
use crate::domain::llm_config::{LlmConfig, ProviderConfig, RoutingTarget};
use crate::infrastructure::config_loader::{load_config, ConfigSource};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::anthropic::AnthropicProvider;
use super::ollama::OllamaProvider;

/// Builds a provider instance from its name and configuration block
pub type ProviderConstructor =
    Arc<dyn Fn(&str, &ProviderConfig) -> Result<Arc<dyn LLMProvider>, LLMError> + Send + Sync>;

/// Outcome of a resolution: the shared provider instance and the model that
/// routing selected for this request.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub name: String,
    pub provider: Arc<dyn LLMProvider>,
    pub model: String,
}

impl ResolvedProvider {
    /// Options pinned to the routed model
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions::default().with_model(self.model.clone())
    }

    pub async fn invoke(&self, messages: &[Message]) -> Result<String, LLMError> {
        self.provider.invoke(messages, &self.options()).await
    }

    pub async fn stream(&self, messages: &[Message]) -> Result<ChunkStream, LLMError> {
        self.provider.stream(messages, &self.options()).await
    }
}

impl Deref for ResolvedProvider {
    type Target = dyn LLMProvider;

    fn deref(&self) -> &Self::Target {
        self.provider.as_ref()
    }
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("name", &self.name)
            .field("model", &self.model)
            .finish()
    }
}

struct FactoryState {
    source: ConfigSource,
    config: Option<Arc<LlmConfig>>,
    providers: HashMap<String, Arc<dyn LLMProvider>>,
}

/// Process-scoped provider registry. Create one, share it (e.g. behind an
/// `Arc`) and call [`ProviderFactory::reset`] to start over.
pub struct ProviderFactory {
    constructors: RwLock<HashMap<String, ProviderConstructor>>,
    state: Mutex<FactoryState>,
}

fn build_ollama(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LLMProvider>, LLMError> {
    Ok(Arc::new(OllamaProvider::from_config(name, config)?))
}

fn build_anthropic(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LLMProvider>, LLMError> {
    Ok(Arc::new(AnthropicProvider::from_config(name, config)?))
}

impl ProviderFactory {
    /// Create a factory with the built-in backends registered. Nothing is
    /// loaded until the first resolution or an explicit `initialize`.
    pub fn new(source: ConfigSource) -> Self {
        let mut constructors: HashMap<String, ProviderConstructor> = HashMap::new();
        constructors.insert("ollama".to_string(), Arc::new(build_ollama));
        constructors.insert("anthropic".to_string(), Arc::new(build_anthropic));

        Self {
            constructors: RwLock::new(constructors),
            state: Mutex::new(FactoryState {
                source,
                config: None,
                providers: HashMap::new(),
            }),
        }
    }

    /// Register (or replace) the constructor for a backend kind
    pub fn register(&self, kind: impl Into<String>, constructor: ProviderConstructor) {
        let kind = kind.into();
        debug!("Registering provider kind '{}'", kind);
        self.constructors.write().insert(kind, constructor);
    }

    /// Backend kinds that can be constructed
    pub fn registered_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Load (or reload) configuration. `None` reloads from the current source.
    /// Any configuration error is returned here and the previous
    /// configuration stays in place.
    pub fn initialize(&self, source: Option<ConfigSource>) -> Result<Arc<LlmConfig>, LLMError> {
        let source = match source {
            Some(source) => source,
            None => self.state.lock().source.clone(),
        };

        let config = Arc::new(load_config(&source)?);

        let mut state = self.state.lock();
        state.source = source;
        state.config = Some(config.clone());
        info!("LLM Factory initialized");

        Ok(config)
    }

    /// Currently loaded configuration, if any
    pub fn config(&self) -> Option<Arc<LlmConfig>> {
        self.state.lock().config.clone()
    }

    /// Drop every cached provider and the loaded configuration
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.providers.clear();
        state.config = None;
        info!("LLM Factory reset");
    }

    fn ensure_config(state: &mut FactoryState) -> Result<Arc<LlmConfig>, LLMError> {
        if let Some(config) = &state.config {
            return Ok(config.clone());
        }

        let config = Arc::new(load_config(&state.source)?);
        state.config = Some(config.clone());
        info!("LLM Factory initialized");
        Ok(config)
    }

    /// Provider and model a task is routed to, without constructing anything.
    /// A `None` model means the provider's own default.
    pub fn model_for_task(&self, task_name: &str) -> Result<(String, Option<String>), LLMError> {
        let config = Self::ensure_config(&mut self.state.lock())?;
        let target = config.route(task_name);
        Ok((target.provider().to_string(), config.routed_model(&target)))
    }

    /// Resolve a provider by explicit name, by task routing, or to the
    /// configured default, constructing and caching it on first use.
    pub fn resolve(
        &self,
        provider_name: Option<&str>,
        task_name: Option<&str>,
    ) -> Result<ResolvedProvider, LLMError> {
        let mut state = self.state.lock();
        let config = Self::ensure_config(&mut state)?;

        let (name, routed_model) = match (provider_name, task_name) {
            (Some(name), _) => (name.to_string(), None),
            (None, Some(task)) => {
                let target = config.route(task);
                let model = match &target {
                    RoutingTarget::Alias { .. } => config.routed_model(&target),
                    RoutingTarget::Provider(_) => None,
                };
                debug!("Task '{}' routed to provider '{}'", task, target.provider());
                (target.provider().to_string(), model)
            }
            (None, None) => (config.default_provider.clone(), None),
        };

        let provider = match state.providers.get(&name) {
            Some(cached) => cached.clone(),
            None => {
                let provider = self.create_provider(&config, &name)?;
                state.providers.insert(name.clone(), provider.clone());
                provider
            }
        };

        let model = routed_model.unwrap_or_else(|| provider.default_model().to_string());

        Ok(ResolvedProvider {
            name,
            provider,
            model,
        })
    }

    /// Create a provider instance from configuration
    fn create_provider(
        &self,
        config: &LlmConfig,
        name: &str,
    ) -> Result<Arc<dyn LLMProvider>, LLMError> {
        let provider_config = config.provider(name)?;
        let kind = provider_config.kind(name);

        let constructor = self
            .constructors
            .read()
            .get(kind)
            .cloned()
            .ok_or_else(|| LLMError::UnknownProviderType(kind.to_string()))?;

        info!("Initializing provider: {} ({})", name, kind);
        constructor(name, provider_config)
    }

    /// Resolve as [`ProviderFactory::resolve`]; if the result is unavailable
    /// and fallback is enabled, substitute the fallback provider. When the
    /// fallback is unavailable too, the primary is returned and any failure
    /// surfaces on first use.
    pub async fn resolve_with_fallback(
        &self,
        primary_provider: Option<&str>,
        task_name: Option<&str>,
    ) -> Result<ResolvedProvider, LLMError> {
        let primary = self.resolve(primary_provider, task_name)?;

        if primary.is_available().await {
            return Ok(primary);
        }

        let config = match self.config() {
            Some(config) => config,
            None => return Ok(primary),
        };

        if config.enable_fallback {
            if let Some(fallback_name) = config
                .fallback_provider
                .as_deref()
                .filter(|fallback| *fallback != primary.name)
            {
                warn!(
                    "Primary provider '{}' unavailable, falling back to '{}'",
                    primary.name, fallback_name
                );

                match self.resolve(Some(fallback_name), None) {
                    Ok(fallback) => {
                        if fallback.is_available().await {
                            return Ok(fallback);
                        }
                        warn!("Fallback provider '{}' is unavailable too", fallback_name);
                    }
                    Err(e) => warn!("Fallback provider '{}' failed to resolve: {}", fallback_name, e),
                }
            }
        }

        error!("No available providers found");
        Ok(primary)
    }

    /// Availability of every configured provider. Disabled providers report
    /// `false` without being constructed; one provider's failure never aborts
    /// the listing.
    pub async fn list_providers(&self) -> Result<BTreeMap<String, bool>, LLMError> {
        let config = {
            let mut state = self.state.lock();
            Self::ensure_config(&mut state)?
        };
        let mut status = BTreeMap::new();

        for (name, provider_config) in &config.providers {
            if !provider_config.enabled {
                status.insert(name.clone(), false);
                continue;
            }

            let available = match self.resolve(Some(name), None) {
                Ok(provider) => provider.is_available().await,
                Err(e) => {
                    error!("Error checking {}: {}", name, e);
                    false
                }
            };
            status.insert(name.clone(), available);
        }

        Ok(status)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new(ConfigSource::Discover)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::ModelInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct StubProvider {
        name: String,
        model: String,
        available: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LLMProvider for StubProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn default_model(&self) -> &str {
            &self.model
        }

        async fn invoke(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<String, LLMError> {
            self.validate_messages(messages)?;
            Ok(format!(
                "{}:{}",
                self.name,
                options.model.as_deref().unwrap_or(&self.model)
            ))
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<ChunkStream, LLMError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn is_available(&self) -> bool {
            self.available.load(Ordering::SeqCst)
        }

        async fn model_info(&self) -> ModelInfo {
            ModelInfo::unavailable(&self.model, "stub")
        }
    }

    /// Registers stub constructors for "ollama" and "anthropic" and returns
    /// per-kind construction counters and availability switches.
    struct Harness {
        factory: ProviderFactory,
        constructed: Arc<AtomicUsize>,
        ollama_up: Arc<AtomicBool>,
        anthropic_up: Arc<AtomicBool>,
    }

    fn harness(yaml: &str) -> Harness {
        let factory = ProviderFactory::new(ConfigSource::Yaml(yaml.to_string()));
        let constructed = Arc::new(AtomicUsize::new(0));
        let ollama_up = Arc::new(AtomicBool::new(true));
        let anthropic_up = Arc::new(AtomicBool::new(true));

        for (kind, switch) in [("ollama", ollama_up.clone()), ("anthropic", anthropic_up.clone())] {
            let constructed = constructed.clone();
            factory.register(
                kind,
                Arc::new(move |name: &str, config: &ProviderConfig| {
                    constructed.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, LLMError>(Arc::new(StubProvider {
                        name: name.to_string(),
                        model: config.default_model().unwrap_or("stub-default").to_string(),
                        available: switch.clone(),
                    }) as Arc<dyn LLMProvider>)
                }),
            );
        }

        Harness {
            factory,
            constructed,
            ollama_up,
            anthropic_up,
        }
    }

    const CONFIG: &str = r#"
llm:
  default_provider: ollama
  fallback_provider: anthropic
  enable_fallback: true
  providers:
    ollama:
      enabled: true
      models:
        default: codellama:13b
        code_gen_model: deepseek-coder:6.7b
    anthropic:
      enabled: true
      api_key: sk-test
      model: claude-sonnet-4-5
    mystery:
      enabled: true
      type: cohere
  task_routing:
    code_generation: ollama.code_gen_model
    architecture_review: anthropic
"#;

    #[test]
    fn test_resolve_is_cached() {
        let h = harness(CONFIG);

        let first = h.factory.resolve(Some("ollama"), None).unwrap();
        let second = h.factory.resolve(Some("ollama"), None).unwrap();

        assert!(Arc::ptr_eq(&first.provider, &second.provider));
        assert_eq!(h.constructed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_task_routing_to_alias() {
        let h = harness(CONFIG);

        let routed = h.factory.resolve(None, Some("code_generation")).unwrap();
        let direct = h.factory.resolve(Some("ollama"), None).unwrap();

        assert!(Arc::ptr_eq(&routed.provider, &direct.provider));
        assert_eq!(routed.name, "ollama");
        assert_eq!(routed.model, "deepseek-coder:6.7b");
        assert_eq!(direct.model, "codellama:13b");
    }

    #[test]
    fn test_task_routing_to_bare_provider() {
        let h = harness(CONFIG);

        let routed = h.factory.resolve(None, Some("architecture_review")).unwrap();
        assert_eq!(routed.name, "anthropic");
        assert_eq!(routed.model, "claude-sonnet-4-5");
    }

    #[test]
    fn test_unmapped_task_uses_default() {
        let h = harness(CONFIG);

        let routed = h.factory.resolve(None, Some("unmapped_task")).unwrap();
        assert_eq!(routed.name, "ollama");
        assert_eq!(routed.model, "codellama:13b");

        let default = h.factory.resolve(None, None).unwrap();
        assert!(Arc::ptr_eq(&routed.provider, &default.provider));
    }

    #[test]
    fn test_unknown_provider_type_is_local() {
        let h = harness(CONFIG);

        let err = h.factory.resolve(Some("mystery"), None).unwrap_err();
        assert!(matches!(err, LLMError::UnknownProviderType(kind) if kind == "cohere"));

        // The failure neither poisons the cache nor other providers
        assert!(h.factory.resolve(Some("ollama"), None).is_ok());
        assert!(matches!(
            h.factory.resolve(Some("mystery"), None),
            Err(LLMError::UnknownProviderType(_))
        ));
    }

    #[test]
    fn test_unconfigured_provider() {
        let h = harness(CONFIG);
        assert!(matches!(
            h.factory.resolve(Some("openai"), None),
            Err(LLMError::Configuration(_))
        ));
    }

    #[test]
    fn test_builtin_kinds_registered() {
        let factory = ProviderFactory::new(ConfigSource::Yaml(CONFIG.to_string()));
        assert_eq!(factory.registered_kinds(), vec!["anthropic", "ollama"]);
    }

    #[test]
    fn test_concurrent_first_resolution_constructs_once() {
        let h = harness(CONFIG);

        let instances: Vec<Arc<dyn LLMProvider>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| h.factory.resolve(Some("anthropic"), None).unwrap().provider))
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(h.constructed.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_fallback_when_primary_unavailable() {
        let h = harness(CONFIG);
        h.ollama_up.store(false, Ordering::SeqCst);

        let resolved = h.factory.resolve_with_fallback(None, None).await.unwrap();
        assert_eq!(resolved.name, "anthropic");
    }

    #[tokio::test]
    async fn test_primary_returned_when_everything_down() {
        let h = harness(CONFIG);
        h.ollama_up.store(false, Ordering::SeqCst);
        h.anthropic_up.store(false, Ordering::SeqCst);

        let resolved = h.factory.resolve_with_fallback(Some("ollama"), None).await.unwrap();
        assert_eq!(resolved.name, "ollama");
    }

    #[tokio::test]
    async fn test_no_swap_when_fallback_is_primary() {
        let h = harness(CONFIG);
        h.anthropic_up.store(false, Ordering::SeqCst);

        let resolved = h
            .factory
            .resolve_with_fallback(Some("anthropic"), None)
            .await
            .unwrap();
        assert_eq!(resolved.name, "anthropic");
        // Only anthropic was ever constructed
        assert_eq!(h.constructed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_disabled() {
        let h = harness(&CONFIG.replace("enable_fallback: true", "enable_fallback: false"));
        h.ollama_up.store(false, Ordering::SeqCst);

        let resolved = h.factory.resolve_with_fallback(None, None).await.unwrap();
        assert_eq!(resolved.name, "ollama");
    }

    #[tokio::test]
    async fn test_list_providers_isolates_failures() {
        let h = harness(CONFIG);
        h.anthropic_up.store(false, Ordering::SeqCst);

        let status = h.factory.list_providers().await.unwrap();
        assert_eq!(
            status,
            BTreeMap::from([
                ("anthropic".to_string(), false),
                ("mystery".to_string(), false),
                ("ollama".to_string(), true),
            ])
        );
    }

    #[tokio::test]
    async fn test_resolved_provider_pins_model() {
        let h = harness(CONFIG);

        let routed = h.factory.resolve(None, Some("code_generation")).unwrap();
        let reply = routed.invoke(&[Message::user("hi")]).await.unwrap();
        assert_eq!(reply, "ollama:deepseek-coder:6.7b");

        assert!(matches!(
            routed.invoke(&[]).await,
            Err(LLMError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_reset_clears_cache() {
        let h = harness(CONFIG);

        let before = h.factory.resolve(Some("ollama"), None).unwrap();
        assert!(h.factory.config().is_some());

        h.factory.reset();
        assert!(h.factory.config().is_none());

        let after = h.factory.resolve(Some("ollama"), None).unwrap();
        assert!(!Arc::ptr_eq(&before.provider, &after.provider));
        assert_eq!(h.constructed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_initialize_rejects_bad_config_and_keeps_previous() {
        let h = harness(CONFIG);
        h.factory.initialize(None).unwrap();

        let bad = ConfigSource::Yaml("llm:\n  default_provider: nowhere\n  providers: {}\n".to_string());
        assert!(matches!(
            h.factory.initialize(Some(bad)),
            Err(LLMError::Configuration(_))
        ));

        let config = h.factory.config().unwrap();
        assert_eq!(config.default_provider, "ollama");
    }

    #[test]
    fn test_model_for_task() {
        let h = harness(CONFIG);
        assert_eq!(
            h.factory.model_for_task("code_generation").unwrap(),
            ("ollama".to_string(), Some("deepseek-coder:6.7b".to_string()))
        );
        assert_eq!(
            h.factory.model_for_task("anything").unwrap(),
            ("ollama".to_string(), Some("codellama:13b".to_string()))
        );
        // Nothing was constructed
        assert_eq!(h.constructed.load(Ordering::SeqCst), 0);
    }
}
