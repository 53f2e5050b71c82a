//! Query orchestration.
//!
//! [`Orchestrator::process_query`] is the only entry point the core
//! exposes. Every path returns a [`ResponseEnvelope`]:
//!
//! - safety-blocked: scripted safety text, `target_id = "safety-filter"`,
//!   no target invoked
//! - cache hit: cached text, `cached = true`, steps `["cache-retrieval"]`
//! - executed: routed, run through the fallback chain and post-processed
//! - error: apology text, `target_id = "error-handler"`, confidence 0
//!
//! Errors and panics inside the flow are caught here and never reach the
//! caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use haven_events::{EventDispatcher, PublishOptions};
use haven_safety::SafetyGate;
use haven_types::config::OrchestratorConfig;
use haven_types::envelope::{
    ERROR_HANDLER_TARGET, EnvelopeMetadata, ResponseEnvelope, SAFETY_FILTER_TARGET,
};
use haven_types::error::Result;
use haven_types::event::topics;
use haven_types::routing::{
    CostTier, DecisionSource, PipelineStep, QueryContext, QueryPriority, RoutingDecision,
};
use haven_types::safety::SafetyVerdict;
use haven_types::user::{AuthContext, Preferences, RiskLevel};

use crate::cache::{NoCache, SemanticCache};
use crate::fallback::{self, AttemptRecord, FallbackPolicy};
use crate::pipeline;
use crate::provider::{InvocationParams, TargetRegistry};
use crate::rules::{self, RoutingRule};
use crate::targets;

/// Event source name for everything the orchestrator publishes.
const EVENT_SOURCE: &str = "orchestrator";

const APOLOGY: &str =
    "I'm sorry, I wasn't able to complete your request right now. Please try again in a moment.";
const BLOCKED_FALLBACK_TEXT: &str = "I can't help with that request.";

/// One inbound query.
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub text: String,
    pub priority: QueryPriority,
    pub auth: AuthContext,
    pub preferences: Preferences,
    /// The caller agreed to this interaction being recorded for training.
    pub consent_to_train: bool,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            auth: AuthContext::user(user_id),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: QueryPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn with_consent_to_train(mut self, consent: bool) -> Self {
        self.consent_to_train = consent;
        self
    }
}

/// Routes, executes and post-processes queries.
pub struct Orchestrator {
    config: OrchestratorConfig,
    gate: Arc<SafetyGate>,
    dispatcher: Arc<EventDispatcher>,
    targets: TargetRegistry,
    cache: Arc<dyn SemanticCache>,
    rules: Vec<RoutingRule>,
}

impl Orchestrator {
    /// Create an orchestrator with the default rule table and no cache.
    pub fn new(
        config: OrchestratorConfig,
        gate: Arc<SafetyGate>,
        dispatcher: Arc<EventDispatcher>,
        targets: TargetRegistry,
    ) -> Self {
        Self {
            rules: rules::default_rules(&config),
            config,
            gate,
            dispatcher,
            targets,
            cache: Arc::new(NoCache),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn SemanticCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the rule table.
    pub fn with_rules(mut self, rules: Vec<RoutingRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn gate(&self) -> &Arc<SafetyGate> {
        &self.gate
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Routing decision for a query context.
    pub fn route(&self, ctx: &QueryContext) -> RoutingDecision {
        let (action, confidence, source, rationale) = match rules::evaluate(&self.rules, ctx) {
            Some(rule) => {
                debug!(rule = rule.name, action = %rule.action, "routing rule matched");
                (
                    rule.action,
                    self.config.rule_confidence,
                    DecisionSource::Rule,
                    format!("rule {}: {}", rule.name, rule.rationale),
                )
            }
            None => {
                let (action, rationale) = targets::heuristic_action(ctx, &self.config);
                debug!(%action, "no routing rule matched, using heuristic");
                (
                    action,
                    self.config.heuristic_confidence,
                    DecisionSource::Heuristic,
                    rationale,
                )
            }
        };
        let target = targets::target_for(action);
        RoutingDecision {
            target,
            action,
            pipeline_steps: pipeline::steps_for(action),
            confidence,
            fallback_chain: targets::profile(target).fallbacks.to_vec(),
            safety_checks: pipeline::safety_checks_for(action),
            source,
            rationale,
        }
    }

    /// Process one query. Never fails; see the module docs for the
    /// envelope each path produces.
    pub async fn process_query(&self, request: QueryRequest) -> ResponseEnvelope {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();

        let outcome = AssertUnwindSafe(self.run(&request, &request_id, started))
            .catch_unwind()
            .await;
        let envelope = match outcome {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                error!(request_id = %request_id, error = %e, "query failed");
                error_envelope(&request_id, started)
            }
            Err(panic) => {
                error!(
                    request_id = %request_id,
                    panic = %panic_message(&*panic),
                    "query panicked"
                );
                error_envelope(&request_id, started)
            }
        };

        info!(
            request_id = %request_id,
            target = %envelope.target_id,
            confidence = envelope.confidence,
            cached = envelope.metadata.cached,
            elapsed_ms = envelope.metadata.processing_time_ms,
            "query completed"
        );
        self.emit(
            topics::REQUEST_COMPLETED,
            json!({
                "request_id": request_id,
                "target_id": envelope.target_id,
                "confidence": envelope.confidence,
                "cached": envelope.metadata.cached,
                "tokens_used": envelope.metadata.tokens_used,
                "processing_time_ms": envelope.metadata.processing_time_ms,
            }),
            &request,
            &request_id,
        );
        envelope
    }

    async fn run(
        &self,
        req: &QueryRequest,
        request_id: &str,
        started: Instant,
    ) -> Result<ResponseEnvelope> {
        let user_id = req.auth.user_id.as_str();

        // ── Safety gate ─────────────────────────────────────────────
        let verdict = self.gate.validate_query(&req.text, user_id).await;
        if let Some(rejection) = verdict.rejection() {
            info!(request_id, %rejection, "query stopped at the safety gate");
            self.emit(
                topics::SAFETY_VIOLATION,
                json!({
                    "request_id": request_id,
                    "user_id": user_id,
                    "safe": verdict.safe,
                    "severity": verdict.severity,
                    "violations": verdict.violations,
                    "escalate": verdict.escalate,
                }),
                req,
                request_id,
            );
            return Ok(safety_envelope(&verdict, request_id, started));
        }

        // ── Semantic cache ──────────────────────────────────────────
        match self.cache.find_similar(&req.text, user_id).await {
            Ok(Some(hit)) if hit.confidence >= self.config.cache_threshold => {
                debug!(request_id, confidence = hit.confidence, "semantic cache hit");
                return Ok(ResponseEnvelope {
                    text: hit.content,
                    target_id: hit.source_target,
                    confidence: hit.confidence,
                    reasoning: vec![format!("served from cache (similarity {:.2})", hit.confidence)],
                    metadata: EnvelopeMetadata {
                        request_id: request_id.to_string(),
                        processing_time_ms: elapsed_ms(started),
                        tokens_used: 0,
                        cached: true,
                        pipeline_steps: vec![PipelineStep::CacheRetrieval],
                        safety_checks: vec!["query-validation".into()],
                        cost_tier: CostTier::Free,
                    },
                });
            }
            Ok(Some(hit)) => {
                debug!(request_id, confidence = hit.confidence, "cache match below threshold");
            }
            Ok(None) => {}
            Err(e) => warn!(request_id, error = %e, "cache lookup failed, continuing"),
        }

        // ── Routing ─────────────────────────────────────────────────
        let risk_level = match self.gate.features().user_features(user_id).await {
            Ok(features) => features.risk_level,
            Err(e) => {
                warn!(request_id, error = %e, "feature lookup failed, routing as low risk");
                RiskLevel::Low
            }
        };
        let ctx = QueryContext::new(req.text.clone(), req.priority, risk_level);
        let decision = self.route(&ctx);
        debug!(
            request_id,
            target = %decision.target,
            confidence = decision.confidence,
            steps = decision.pipeline_steps.len(),
            "routing decision"
        );

        // ── Execution ───────────────────────────────────────────────
        let prompt = pipeline::build_prompt(&decision.pipeline_steps, &req.text);
        let params = InvocationParams {
            temperature: req
                .preferences
                .temperature
                .unwrap_or(self.config.default_temperature),
            max_tokens: req
                .preferences
                .max_tokens
                .unwrap_or(self.config.default_max_tokens),
        };
        let mut chain = Vec::with_capacity(decision.fallback_chain.len() + 1);
        chain.push(decision.target);
        chain.extend_from_slice(&decision.fallback_chain);
        let policy = FallbackPolicy {
            discount: self.config.fallback_discount,
            target_timeout: Duration::from_millis(self.config.target_timeout_ms),
            deadline: tokio::time::Instant::from_std(started)
                + Duration::from_millis(self.config.query_deadline_ms),
        };

        let run = fallback::execute(
            &self.targets,
            &chain,
            &prompt,
            &params,
            decision.confidence,
            policy,
        )
        .await;
        self.report_attempts(&run.attempts, req, request_id);
        let served = run.outcome?;

        // ── Post-processing ─────────────────────────────────────────
        let processed =
            pipeline::postprocess(&decision.pipeline_steps, &served.invocation.content, &self.gate);

        let mut reasoning = vec![decision.rationale.clone()];
        if served.hop > 0 {
            reasoning.push(format!(
                "primary target {} failed, served by fallback {} (hop {})",
                decision.target, served.target, served.hop
            ));
        }
        reasoning.extend(processed.notes);

        let envelope = ResponseEnvelope {
            text: processed.text,
            target_id: served.target.id().to_string(),
            confidence: served.confidence,
            reasoning,
            metadata: EnvelopeMetadata {
                request_id: request_id.to_string(),
                processing_time_ms: elapsed_ms(started),
                tokens_used: served.invocation.usage.total(),
                cached: false,
                pipeline_steps: decision.pipeline_steps,
                safety_checks: decision.safety_checks,
                cost_tier: targets::profile(served.target).cost_tier,
            },
        };

        if !processed.substituted
            && let Err(e) = self
                .cache
                .store(&req.text, &envelope, user_id, envelope.confidence)
                .await
        {
            warn!(request_id, error = %e, "cache store failed");
        }

        if req.consent_to_train {
            self.emit(
                topics::INTERACTION_RECORDED,
                json!({
                    "request_id": request_id,
                    "user_id": user_id,
                    "query": req.text,
                    "response": envelope.text,
                    "target_id": envelope.target_id,
                    "confidence": envelope.confidence,
                }),
                req,
                request_id,
            );
        }

        Ok(envelope)
    }

    fn report_attempts(&self, attempts: &[AttemptRecord], req: &QueryRequest, request_id: &str) {
        for (i, attempt) in attempts.iter().enumerate() {
            self.emit(
                topics::TARGET_PERFORMANCE,
                json!({
                    "request_id": request_id,
                    "target_id": attempt.target,
                    "hop": attempt.hop,
                    "latency_ms": attempt.latency_ms,
                    "success": attempt.success,
                    "error": attempt.error,
                }),
                req,
                request_id,
            );
            if let Some(next) = attempts.get(i + 1)
                && !attempt.success
            {
                self.emit(
                    topics::TARGET_FAILOVER,
                    json!({
                        "request_id": request_id,
                        "from": attempt.target,
                        "to": next.target,
                        "error": attempt.error,
                    }),
                    req,
                    request_id,
                );
            }
        }
    }

    fn emit(
        &self,
        topic: &'static str,
        payload: serde_json::Value,
        req: &QueryRequest,
        request_id: &str,
    ) {
        let options = PublishOptions {
            correlation_id: Some(request_id.to_string()),
            user_id: Some(req.auth.user_id.clone()),
            session_id: req.auth.session_id.clone(),
            persistent: false,
        };
        self.dispatcher
            .emit_detached(topic, payload, EVENT_SOURCE, options);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("targets", &self.targets)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn safety_envelope(verdict: &SafetyVerdict, request_id: &str, started: Instant) -> ResponseEnvelope {
    ResponseEnvelope {
        text: verdict
            .message
            .clone()
            .unwrap_or_else(|| BLOCKED_FALLBACK_TEXT.to_string()),
        target_id: SAFETY_FILTER_TARGET.to_string(),
        confidence: verdict.confidence,
        reasoning: vec![format!(
            "blocked by safety gate (severity {}, escalated: {})",
            verdict.severity, verdict.escalate
        )],
        metadata: EnvelopeMetadata {
            request_id: request_id.to_string(),
            processing_time_ms: elapsed_ms(started),
            tokens_used: 0,
            cached: false,
            pipeline_steps: Vec::new(),
            safety_checks: vec!["query-validation".into()],
            cost_tier: CostTier::Free,
        },
    }
}

fn error_envelope(request_id: &str, started: Instant) -> ResponseEnvelope {
    ResponseEnvelope {
        text: APOLOGY.to_string(),
        target_id: ERROR_HANDLER_TARGET.to_string(),
        confidence: 0.0,
        reasoning: vec!["request could not be completed".into()],
        metadata: EnvelopeMetadata {
            request_id: request_id.to_string(),
            processing_time_ms: elapsed_ms(started),
            tokens_used: 0,
            cached: false,
            pipeline_steps: Vec::new(),
            safety_checks: Vec::new(),
            cost_tier: CostTier::Free,
        },
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;
    use haven_safety::StaticFeatureStore;
    use haven_types::config::{DispatcherConfig, SafetyConfig};
    use haven_types::routing::{ProcessingTarget, TargetAction};

    fn orchestrator() -> Orchestrator {
        let gate = SafetyGate::new(SafetyConfig::default(), Arc::new(StaticFeatureStore::new()))
            .unwrap();
        Orchestrator::new(
            OrchestratorConfig::default(),
            Arc::new(gate),
            Arc::new(EventDispatcher::new(DispatcherConfig::default())),
            TargetRegistry::uniform(Arc::new(ScriptedProvider::new())),
        )
    }

    fn route(text: &str) -> RoutingDecision {
        orchestrator().route(&QueryContext::new(text, QueryPriority::Normal, RiskLevel::Low))
    }

    #[test]
    fn rule_decision_uses_rule_confidence() {
        let decision = route("Can you help me understand photosynthesis for my biology homework?");
        assert_eq!(decision.action, TargetAction::Educational);
        assert_eq!(decision.target, ProcessingTarget::EducationTutor);
        assert_eq!(decision.source, DecisionSource::Rule);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
        assert_eq!(
            decision.fallback_chain,
            vec![ProcessingTarget::BalancedGeneral, ProcessingTarget::FastResponse]
        );
    }

    #[test]
    fn heuristic_decision_uses_heuristic_confidence() {
        let decision = route("hello there");
        assert_eq!(decision.target, ProcessingTarget::BalancedGeneral);
        assert_eq!(decision.source, DecisionSource::Heuristic);
        assert!((decision.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn custom_rule_table_is_honoured() {
        let orch = orchestrator().with_rules(vec![RoutingRule::new(
            "everything-creative",
            1,
            TargetAction::Creative,
            "test",
            |_| true,
        )]);
        let decision =
            orch.route(&QueryContext::new("fix my code", QueryPriority::Normal, RiskLevel::Low));
        assert_eq!(decision.target, ProcessingTarget::CreativeWriter);
    }

    #[test]
    fn panic_messages_are_extracted() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }
}
