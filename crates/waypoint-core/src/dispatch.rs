//! Dispatch facade
//!
//! The entry point callers use. Every request is classified, routed by the
//! active strategy, and handed to the breaker-protected pair for the chosen
//! `(primary, fallback)` backends. Pairs are created on first use and live
//! as long as the dispatcher.

use crate::classifier::TaskClassifier;
use crate::error::{Error as CoreError, Result as CoreResult};
use crate::failover::FailoverBackend;
use crate::router::{RouteDecision, RouteTable, RoutingConfig, RoutingStrategy, StrategyRegistry};
use crate::utils::{CircuitBreakerConfig, CircuitBreakerStatus};
use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, field, info, instrument, Span};
use waypoint_llm::{
    Backend, BackendCapabilities, BackendRegistry, ChunkStream, CompletionRequest,
    CompletionResponse, Error, Result, TaskCategory,
};

type PairKey = (String, Option<String>);

/// Classify, route and dispatch completions
pub struct Dispatcher {
    classifier: TaskClassifier,
    table: RouteTable,
    strategy: Arc<dyn RoutingStrategy>,
    registry: Arc<dyn BackendRegistry>,
    breaker_config: CircuitBreakerConfig,
    multi_model_routing: bool,
    provider_fallback: bool,
    pairs: DashMap<PairKey, Arc<FailoverBackend>>,
}

impl Dispatcher {
    /// Create a dispatcher with the default classifier and both routing
    /// flags enabled
    #[must_use]
    pub fn new(
        table: RouteTable,
        strategy: Arc<dyn RoutingStrategy>,
        registry: Arc<dyn BackendRegistry>,
        breaker_config: CircuitBreakerConfig,
    ) -> Self {
        Self {
            classifier: TaskClassifier::default(),
            table,
            strategy,
            registry,
            breaker_config,
            multi_model_routing: true,
            provider_fallback: true,
            pairs: DashMap::new(),
        }
    }

    /// Build from configuration using the built-in strategies
    pub fn from_config(config: &RoutingConfig, registry: Arc<dyn BackendRegistry>) -> CoreResult<Self> {
        let strategies = StrategyRegistry::with_builtins(config.required_quality);
        Self::from_config_with(config, registry, &strategies)
    }

    /// Build from configuration, resolving the strategy in `strategies`
    ///
    /// Every problem found is reported at once: structural checks, the
    /// strategy name, strategy-specific checks and unresolvable backends.
    pub fn from_config_with(
        config: &RoutingConfig,
        registry: Arc<dyn BackendRegistry>,
        strategies: &StrategyRegistry,
    ) -> CoreResult<Self> {
        let mut errors = config.validate();

        let strategy = match strategies.get(&config.strategy) {
            Ok(strategy) => Some(strategy),
            Err(e) => {
                errors.push(format!("{e} (registered: {})", strategies.names().join(", ")));
                None
            }
        };

        let table = config.route_table();
        if let Some(table) = &table {
            if let Some(strategy) = &strategy {
                errors.extend(strategy.validate(table));
            }
            for name in table.backend_names() {
                if registry.resolve(&name).is_none() {
                    errors.push(format!("backend '{name}' is not registered"));
                }
            }
        }

        let (Some(table), Some(strategy), true) = (table, strategy, errors.is_empty()) else {
            return Err(CoreError::InvalidConfig(errors));
        };

        info!(
            strategy = %strategy.name(),
            routes = table.len(),
            multi_model_routing = config.enable_multi_model_routing,
            provider_fallback = config.enable_provider_fallback,
            "Dispatcher configured"
        );

        let mut dispatcher = Self::new(table, strategy, registry, config.breaker_config())
            .with_multi_model_routing(config.enable_multi_model_routing)
            .with_provider_fallback(config.enable_provider_fallback);
        if let Some(rules) = &config.classifier {
            dispatcher = dispatcher.with_classifier(TaskClassifier::new(rules.clone()));
        }
        Ok(dispatcher)
    }

    /// Replace the classifier
    #[must_use]
    pub fn with_classifier(mut self, classifier: TaskClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// When disabled, every request uses the default route
    #[must_use]
    pub fn with_multi_model_routing(mut self, enabled: bool) -> Self {
        self.multi_model_routing = enabled;
        self
    }

    /// When disabled, decisions never carry a fallback
    #[must_use]
    pub fn with_provider_fallback(mut self, enabled: bool) -> Self {
        self.provider_fallback = enabled;
        self
    }

    /// Active strategy name
    #[must_use]
    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// The route table
    #[must_use]
    pub fn route_table(&self) -> &RouteTable {
        &self.table
    }

    /// The backend registry
    #[must_use]
    pub fn registry(&self) -> Arc<dyn BackendRegistry> {
        Arc::clone(&self.registry)
    }

    /// Classify a request
    #[must_use]
    pub fn classify(&self, request: &CompletionRequest) -> TaskCategory {
        self.classifier.classify(request)
    }

    /// Decide where a request would go, without calling any backend
    #[must_use]
    pub fn route(&self, request: &CompletionRequest) -> RouteDecision {
        let category = self.classify(request);
        let decision = if self.multi_model_routing {
            self.strategy
                .select_route_with_quality(category, request.required_quality, &self.table)
        } else {
            RouteDecision::from_route(self.table.default_route(), category, self.strategy.name())
        };
        let decision = if self.provider_fallback {
            decision
        } else {
            decision.without_fallback()
        };
        let decision = decision.with_estimated_units(request.estimated_units());

        debug!(
            category = %decision.category,
            strategy = %decision.strategy_name,
            primary = %decision.primary_backend,
            fallback = ?decision.fallback_backend,
            "Route selected"
        );
        decision
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Backend>> {
        self.registry
            .resolve(name)
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Breaker-protected pair for a decision, created on first use
    pub fn failover_for(&self, decision: &RouteDecision) -> Result<Arc<FailoverBackend>> {
        let key = decision.pair_key();
        if let Some(existing) = self.pairs.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let primary = self.resolve(&decision.primary_backend)?;
        let fallback = match decision.fallback_backend.as_deref() {
            Some(name) => Some((name.to_string(), self.resolve(name)?)),
            None => None,
        };
        let entry = self.pairs.entry(key).or_insert_with(|| {
            debug!(
                primary = %decision.primary_backend,
                fallback = ?decision.fallback_backend,
                "Creating circuit breaker for backend pair"
            );
            Arc::new(FailoverBackend::new(
                decision.primary_backend.clone(),
                primary,
                fallback,
                self.breaker_config.clone(),
            ))
        });
        Ok(Arc::clone(entry.value()))
    }

    fn record_route(decision: &RouteDecision) {
        let span = Span::current();
        span.record("category", decision.category.as_str());
        span.record("primary", decision.primary_backend.as_str());
    }

    /// Single-shot completion
    #[instrument(skip_all, fields(category = field::Empty, primary = field::Empty))]
    pub async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        let decision = self.route(&request);
        Self::record_route(&decision);
        self.failover_for(&decision)?
            .complete(&request, &decision, cancel)
            .await
    }

    /// Streaming completion
    ///
    /// Routing happens once, before the first chunk is requested.
    #[instrument(skip_all, fields(category = field::Empty, primary = field::Empty))]
    pub async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        let decision = self.route(&request);
        Self::record_route(&decision);
        self.failover_for(&decision)?
            .stream_complete(&request, &decision, cancel)
            .await
    }

    /// Embedding through the default route's pair
    #[instrument(skip_all)]
    pub async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        let decision = RouteDecision::from_route(
            self.table.default_route(),
            TaskCategory::General,
            self.strategy.name(),
        );
        let decision = if self.provider_fallback {
            decision
        } else {
            decision.without_fallback()
        };
        self.failover_for(&decision)?
            .embed(text, model, &decision, cancel)
            .await
    }

    /// Snapshot of every pair's breaker, sorted by name
    #[must_use]
    pub fn breaker_statuses(&self) -> Vec<CircuitBreakerStatus> {
        let mut statuses: Vec<CircuitBreakerStatus> =
            self.pairs.iter().map(|entry| entry.value().status()).collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }
}

#[async_trait::async_trait]
impl Backend for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn capabilities(&self) -> BackendCapabilities {
        let mut capabilities = BackendCapabilities::default();
        for name in self.registry.names() {
            if let Some(backend) = self.registry.resolve(&name) {
                let caps = backend.capabilities();
                capabilities.supports_streaming |= caps.supports_streaming;
                capabilities.supports_embeddings |= caps.supports_embeddings;
                capabilities.supported_models.extend(caps.supported_models);
            }
        }
        capabilities.supported_models.sort();
        capabilities.supported_models.dedup();
        capabilities
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse> {
        Dispatcher::complete(self, request, cancel).await
    }

    async fn stream_complete(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<ChunkStream> {
        Dispatcher::stream_complete(self, request, cancel).await
    }

    async fn embed(
        &self,
        text: &str,
        model: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>> {
        Dispatcher::embed(self, text, model, cancel).await
    }

    async fn is_available(&self, cancel: &CancellationToken) -> bool {
        for name in self.registry.names() {
            if let Some(backend) = self.registry.resolve(&name) {
                if backend.is_available(cancel).await {
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordRule;
    use crate::router::{RouteDefinition, TaskBasedStrategy};
    use crate::utils::CircuitState;
    use mockall::mock;
    use tokio_test::assert_ok;
    use waypoint_llm::{InMemoryBackendRegistry, Script, ScriptedBackend};

    mock! {
        pub Registry {}

        impl BackendRegistry for Registry {
            fn resolve(&self, name: &str) -> Option<Arc<dyn Backend>>;
            fn names(&self) -> Vec<String>;
        }
    }

    struct Backends {
        openai: Arc<ScriptedBackend>,
        anthropic: Arc<ScriptedBackend>,
        ollama: Arc<ScriptedBackend>,
        registry: Arc<dyn BackendRegistry>,
    }

    fn backends() -> Backends {
        let openai = Arc::new(ScriptedBackend::new("openai"));
        let anthropic = Arc::new(ScriptedBackend::new("anthropic"));
        let ollama = Arc::new(ScriptedBackend::new("ollama"));
        let registry = InMemoryBackendRegistry::new()
            .with_backend("openai", Arc::clone(&openai) as Arc<dyn Backend>)
            .with_backend("anthropic", Arc::clone(&anthropic) as Arc<dyn Backend>)
            .with_backend("ollama", Arc::clone(&ollama) as Arc<dyn Backend>);
        Backends {
            openai,
            anthropic,
            ollama,
            registry: Arc::new(registry),
        }
    }

    fn config() -> RoutingConfig {
        let mut config = RoutingConfig {
            default_route: Some(
                RouteDefinition::new("openai", "gpt-4o-mini")
                    .with_fallback("ollama", "llama3")
                    .with_cost(0.15),
            ),
            ..RoutingConfig::default()
        };
        config.circuit_breaker.failure_threshold = 2;
        config.routes.insert(
            TaskCategory::CodeGeneration,
            RouteDefinition::new("anthropic", "claude-sonnet")
                .with_fallback("openai", "gpt-4o")
                .with_cost(3.0),
        );
        config
    }

    #[test]
    fn test_from_config_success() {
        let dispatcher = assert_ok!(Dispatcher::from_config(&config(), backends().registry));
        assert_eq!(dispatcher.strategy_name(), "task_based");
        assert_eq!(dispatcher.route_table().len(), 1);
        assert!(dispatcher.breaker_statuses().is_empty());
    }

    #[test]
    fn test_from_config_reports_every_problem() {
        let mut config = config();
        config.strategy = "round_robin".to_string();
        config.circuit_breaker.failure_threshold = 0;
        config.routes.insert(
            TaskCategory::Planning,
            RouteDefinition::new("groq", "llama-3.1-70b"),
        );

        let err = Dispatcher::from_config(&config, backends().registry).err().unwrap();
        let messages = err.messages();
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("failure_threshold")));
        assert!(messages.iter().any(|m| m.contains("unknown routing strategy: round_robin")));
        assert!(messages.contains(&"backend 'groq' is not registered".to_string()));
    }

    #[test]
    fn test_cost_optimized_requires_costs_at_startup() {
        let mut config = config();
        config.strategy = "cost_optimized".to_string();
        config
            .routes
            .insert(TaskCategory::Planning, RouteDefinition::new("openai", "gpt-4o"));

        let err = Dispatcher::from_config(&config, backends().registry).err().unwrap();
        assert_eq!(
            err.messages(),
            vec!["routes.planning[0]: cost_per_thousand_units is required by the cost_optimized strategy"]
        );
    }

    #[test]
    fn test_unknown_backend_detected_through_registry_mock() {
        let mut registry = MockRegistry::new();
        registry
            .expect_resolve()
            .withf(|name| name == "openai")
            .returning(|_| Some(Arc::new(ScriptedBackend::new("openai")) as Arc<dyn Backend>));
        registry
            .expect_resolve()
            .withf(|name| name == "ollama")
            .times(1)
            .returning(|_| None);

        let config = RoutingConfig {
            default_route: Some(
                RouteDefinition::new("openai", "gpt-4o-mini").with_fallback("ollama", "llama3"),
            ),
            ..RoutingConfig::default()
        };
        let err = Dispatcher::from_config(&config, Arc::new(registry)).err().unwrap();
        assert_eq!(err.messages(), vec!["backend 'ollama' is not registered"]);
    }

    #[test]
    fn test_route_explains_without_calling_backends() {
        let backends = backends();
        let dispatcher = Dispatcher::from_config(&config(), backends.registry).unwrap();

        let decision = dispatcher.route(
            &CompletionRequest::from_prompt("implement a parser").with_max_tokens(1000),
        );
        assert_eq!(decision.category, TaskCategory::CodeGeneration);
        assert_eq!(decision.primary_backend, "anthropic");
        assert_eq!(decision.fallback(), Some(("openai", "gpt-4o")));
        assert_eq!(decision.estimated_cost, Some(3.0));

        let decision = dispatcher.route(&CompletionRequest::from_prompt("hello"));
        assert_eq!(decision.category, TaskCategory::General);
        assert_eq!(decision.primary_backend, "openai");

        assert_eq!(backends.openai.calls() + backends.anthropic.calls(), 0);
        assert!(dispatcher.breaker_statuses().is_empty());
    }

    #[test]
    fn test_caller_quality_overrides_configured_floor() {
        let mut config = config();
        config.strategy = "cost_optimized".to_string();
        config.required_quality = Some(0.5);
        config.routes.insert(
            TaskCategory::CodeGeneration,
            RouteDefinition::new("anthropic", "claude-sonnet")
                .with_cost(3.0)
                .with_quality(0.95)
                .with_alternative(
                    RouteDefinition::new("ollama", "qwen-coder").with_cost(0.0).with_quality(0.6),
                ),
        );
        let dispatcher = Dispatcher::from_config(&config, backends().registry).unwrap();

        let decision = dispatcher.route(&CompletionRequest::from_prompt("implement a parser"));
        assert_eq!(decision.primary_backend, "ollama");

        let decision = dispatcher.route(
            &CompletionRequest::from_prompt("implement a parser").with_required_quality(0.9),
        );
        assert_eq!(decision.primary_backend, "anthropic");
    }

    #[test]
    fn test_routing_flags() {
        let mut config = config();
        config.enable_multi_model_routing = false;
        config.enable_provider_fallback = false;
        let dispatcher = Dispatcher::from_config(&config, backends().registry).unwrap();

        let decision = dispatcher.route(&CompletionRequest::from_prompt("implement a parser"));
        assert_eq!(decision.category, TaskCategory::CodeGeneration);
        assert_eq!(decision.primary_backend, "openai");
        assert!(decision.fallback().is_none());
    }

    #[test]
    fn test_custom_classifier_rules() {
        let mut config = config();
        config.classifier = Some(vec![KeywordRule::new(TaskCategory::CodeGeneration, &["rustc"])]);
        let dispatcher = Dispatcher::from_config(&config, backends().registry).unwrap();

        assert_eq!(
            dispatcher.classify(&CompletionRequest::from_prompt("why does rustc complain")),
            TaskCategory::CodeGeneration
        );
        assert_eq!(
            dispatcher.classify(&CompletionRequest::from_prompt("implement a parser")),
            TaskCategory::General
        );
    }

    #[tokio::test]
    async fn test_complete_routes_and_reuses_pair() {
        let backends = backends();
        let dispatcher = Dispatcher::from_config(&config(), backends.registry).unwrap();
        let cancel = CancellationToken::new();

        let request = CompletionRequest::from_prompt("refactor this module");
        let response = dispatcher.complete(request.clone(), &cancel).await.unwrap();
        assert_eq!(response.content, "anthropic response");
        assert_eq!(response.model, "claude-sonnet");

        dispatcher.complete(request, &cancel).await.unwrap();
        let statuses = dispatcher.breaker_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "anthropic->openai");
        assert_eq!(statuses[0].total_requests, 2);
    }

    #[tokio::test]
    async fn test_pairs_have_independent_breakers() {
        let backends = backends();
        let dispatcher = Dispatcher::from_config(&config(), backends.registry).unwrap();
        let cancel = CancellationToken::new();
        backends
            .anthropic
            .push_failures(2, || Error::Unavailable("down".into()));

        for _ in 0..2 {
            let response = dispatcher
                .complete(CompletionRequest::from_prompt("write code"), &cancel)
                .await
                .unwrap();
            assert_eq!(response.content, "openai response");
        }
        dispatcher
            .complete(CompletionRequest::from_prompt("hello"), &cancel)
            .await
            .unwrap();

        let statuses = dispatcher.breaker_statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].name, "anthropic->openai");
        assert_eq!(statuses[0].state, CircuitState::Open);
        assert_eq!(statuses[1].name, "openai->ollama");
        assert_eq!(statuses[1].state, CircuitState::Closed);
        assert_eq!(backends.ollama.calls(), 0);
    }

    #[tokio::test]
    async fn test_embed_uses_default_route() {
        let backends = backends();
        let dispatcher = Dispatcher::from_config(&config(), backends.registry).unwrap();
        let cancel = CancellationToken::new();

        let vector = dispatcher.embed("abc", None, &cancel).await.unwrap();
        assert_eq!(vector, vec![3.0, 1.0]);
        assert_eq!(backends.openai.calls(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_is_a_backend() {
        let backends = backends();
        backends.openai.push(Script::Reply("from trait".into()));
        let dispatcher: Arc<dyn Backend> =
            Arc::new(Dispatcher::from_config(&config(), backends.registry).unwrap());
        let cancel = CancellationToken::new();

        assert_eq!(dispatcher.name(), "dispatcher");
        assert!(dispatcher.capabilities().supports_streaming);
        assert_eq!(dispatcher.capabilities().supported_models.len(), 3);
        assert!(dispatcher.is_available(&cancel).await);

        let response = dispatcher
            .complete(CompletionRequest::from_prompt("hi"), &cancel)
            .await
            .unwrap();
        assert_eq!(response.content, "from trait");
    }

    #[test]
    fn test_unknown_backend_at_request_time() {
        let backends = backends();
        let table = RouteTable::new(RouteDefinition::new("missing", "m"));
        let dispatcher = Dispatcher::new(
            table,
            Arc::new(TaskBasedStrategy),
            backends.registry,
            CircuitBreakerConfig::default(),
        );
        let decision = dispatcher.route(&CompletionRequest::from_prompt("hi"));
        assert!(matches!(
            dispatcher.failover_for(&decision),
            Err(Error::UnknownBackend(name)) if name == "missing"
        ));
    }
}
