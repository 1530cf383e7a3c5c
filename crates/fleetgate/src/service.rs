//! The access control service.
//!
//! `AccessControlService` owns the validated ownership matrix, the decision
//! evaluator, the access-policy cache and the audit recorder. Build one per
//! process from configuration and share it across request handlers.

use std::fs::OpenOptions;
use std::io::BufWriter;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use fleetgate_abac::{CacheConfig, CacheKey, CacheStats, EvaluatorConfig, PolicyEvaluator, TtlCache};
use fleetgate_audit::{
    AuditRecorder, AuditSink, JsonLinesAuditSink, QueuedAuditRecorder, RecorderConfig,
    RecorderStats, TracingAuditSink,
};
use fleetgate_config::{AuditSettings, AuditSinkKind, CacheSettings, FleetgateConfig};
use fleetgate_rbac::{
    AccessPolicy, OwnershipAccessMatrix, QueryFilter, QueryOperation, WriteDecision,
    filter_from_policy,
};
use fleetgate_types::{Action, Decision, PartialResourceContext, Principal, ResourceContext};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::Result;

/// Inputs an access policy depends on.
#[derive(Serialize)]
struct PolicyKey<'a> {
    principal: &'a Principal,
    context: &'a PartialResourceContext,
}

/// Access control entry point.
pub struct AccessControlService {
    matrix: Arc<OwnershipAccessMatrix>,
    evaluator: PolicyEvaluator,
    policies: Option<TtlCache<AccessPolicy>>,
    recorder: Arc<dyn AuditRecorder>,
}

impl std::fmt::Debug for AccessControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlService")
            .field("evaluator", &self.evaluator)
            .field("policies", &self.policies)
            .field("audit", &self.recorder.stats())
            .finish_non_exhaustive()
    }
}

impl AccessControlService {
    pub fn builder() -> ServiceBuilder {
        ServiceBuilder::default()
    }

    /// Builds a service from loaded configuration.
    ///
    /// Loads and validates the ownership matrix, opens the configured audit
    /// sink and starts the audit delivery thread.
    pub fn from_config(config: &FleetgateConfig) -> Result<Self> {
        let matrix = config.policy.load_matrix()?;
        let sink = open_sink(&config.audit)?;
        let recorder = QueuedAuditRecorder::new(sink, recorder_config(&config.audit))?;

        Self::builder()
            .with_matrix(matrix)
            .with_recorder(Arc::new(recorder))
            .with_cache(cache_config(&config.cache))
            .with_investigation_window(TimeDelta::days(i64::from(
                config.policy.investigation_window_days,
            )))
            .build()
    }

    pub fn matrix(&self) -> &OwnershipAccessMatrix {
        &self.matrix
    }

    /// Decides a single request. Emits one audit event.
    pub fn evaluate(&self, principal: &Principal, resource: &ResourceContext, action: Action) -> Decision {
        self.evaluator.evaluate(principal, resource, action)
    }

    /// Decides a single request, tagging the audit event with the caller's
    /// request id.
    pub fn evaluate_correlated(
        &self,
        principal: &Principal,
        resource: &ResourceContext,
        action: Action,
        correlation_id: Uuid,
    ) -> Decision {
        self.evaluator
            .evaluate_correlated(principal, resource, action, Some(correlation_id))
    }

    /// Derives the role-driven access policy, served from cache when fresh.
    pub fn get_access_policy(&self, principal: &Principal, context: &PartialResourceContext) -> AccessPolicy {
        let Some(cache) = &self.policies else {
            return fleetgate_rbac::get_access_policy(&self.matrix, principal, context);
        };

        let key = match CacheKey::digest(&PolicyKey { principal, context }) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to derive policy cache key");
                return fleetgate_rbac::get_access_policy(&self.matrix, principal, context);
            }
        };

        // A cached policy must belong to the principal it is served to.
        if let Some(policy) = cache.get_valid(&key, |p| p.principal_id == principal.id && p.role == principal.role) {
            return policy;
        }

        let policy = fleetgate_rbac::get_access_policy(&self.matrix, principal, context);
        cache.put(key, policy.clone());
        policy
    }

    /// Builds the row filter for a bulk operation.
    pub fn build_query_filter(
        &self,
        principal: &Principal,
        operation: QueryOperation,
        context: &PartialResourceContext,
    ) -> QueryFilter {
        let policy = self.get_access_policy(principal, context);
        filter_from_policy(&policy, operation)
    }

    /// Strips forbidden fields and masks masked fields.
    pub fn filter_results(&self, rows: &[Map<String, Value>], policy: &AccessPolicy) -> Vec<Map<String, Value>> {
        fleetgate_rbac::filter_results(rows, policy)
    }

    /// Validates a write payload against the principal's policy.
    pub fn validate_write(
        &self,
        principal: &Principal,
        payload: &Map<String, Value>,
        operation: QueryOperation,
    ) -> WriteDecision {
        fleetgate_rbac::validate_write(&self.matrix, principal, payload, operation)
    }

    pub fn decision_cache_stats(&self) -> Option<CacheStats> {
        self.evaluator.cache_stats()
    }

    pub fn policy_cache_stats(&self) -> Option<CacheStats> {
        self.policies.as_ref().map(TtlCache::stats)
    }

    pub fn audit_stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    /// Flushes pending audit events and clears both caches.
    ///
    /// Returns `false` if audit delivery did not finish within `timeout`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let flushed = self.recorder.flush(timeout);
        self.evaluator.clear_cache();
        if let Some(policies) = &self.policies {
            policies.clear();
        }

        let stats = self.recorder.stats();
        if flushed {
            info!(
                delivered = stats.delivered,
                dropped = stats.dropped,
                failed = stats.failed,
                "Access control service shut down"
            );
        } else {
            warn!(pending = stats.pending(), "Audit flush timed out during shutdown");
        }
        flushed
    }
}

/// Builder for [`AccessControlService`].
#[derive(Default)]
pub struct ServiceBuilder {
    matrix: Option<OwnershipAccessMatrix>,
    recorder: Option<Arc<dyn AuditRecorder>>,
    evaluator: EvaluatorConfig,
}

impl ServiceBuilder {
    /// Uses `matrix` instead of the built-in default.
    pub fn with_matrix(mut self, matrix: OwnershipAccessMatrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Audit destination. Defaults to a queued recorder logging through
    /// `tracing`.
    pub fn with_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Cache timing for both decisions and access policies. `None` disables
    /// caching.
    pub fn with_cache(mut self, cache: Option<CacheConfig>) -> Self {
        self.evaluator.cache = cache;
        self
    }

    pub fn with_investigation_window(mut self, window: TimeDelta) -> Self {
        self.evaluator.investigation_window = window;
        self
    }

    pub fn build(self) -> Result<AccessControlService> {
        let matrix = Arc::new(match self.matrix {
            Some(matrix) => matrix,
            None => OwnershipAccessMatrix::default_matrix()?,
        });

        let recorder: Arc<dyn AuditRecorder> = match self.recorder {
            Some(recorder) => recorder,
            None => Arc::new(QueuedAuditRecorder::new(
                Arc::new(TracingAuditSink),
                RecorderConfig::default(),
            )?),
        };

        let policies = self.evaluator.cache.map(TtlCache::new);
        let evaluator = PolicyEvaluator::new(Arc::clone(&matrix), Arc::clone(&recorder), self.evaluator);

        Ok(AccessControlService {
            matrix,
            evaluator,
            policies,
            recorder,
        })
    }
}

fn cache_config(settings: &CacheSettings) -> Option<CacheConfig> {
    settings.enabled.then(|| CacheConfig {
        ttl: Duration::from_secs(settings.ttl_secs),
        sweep_interval: Duration::from_secs(settings.sweep_interval_secs),
    })
}

fn recorder_config(settings: &AuditSettings) -> RecorderConfig {
    RecorderConfig {
        queue_capacity: settings.queue_capacity,
        batch_size: settings.batch_size,
        max_retries: settings.max_retries,
        initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
        max_backoff: Duration::from_millis(settings.max_backoff_ms),
    }
}

fn open_sink(settings: &AuditSettings) -> Result<Arc<dyn AuditSink>> {
    Ok(match settings.sink {
        AuditSinkKind::Tracing => Arc::new(TracingAuditSink),
        AuditSinkKind::JsonLines => {
            if let Some(parent) = settings.log_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&settings.log_file)?;
            Arc::new(JsonLinesAuditSink::new(BufWriter::new(file)))
        }
    })
}
