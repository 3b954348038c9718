//! BigQuery performance advisor library
//!
//! Analyzes query text, execution plans and usage history, produces
//! optimization recommendations with impact and priority scoring, and
//! tracks their implementation through approval and rollback workflows.

use std::sync::Arc;

use chrono::Duration;

pub mod backends;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use backends::{DocumentStore, LogNotifier, MemoryStore, Notifier, QueryEngine, SqliteStore};
pub use config::Config;
pub use services::{
    ApprovalWorkflow, EffectivenessMonitor, Implementer, PatternEngine, PriorityRanker,
    QueryAnalyzer, QueryOptimizer, RecommendationGenerator, ResourceMonitor, TableDesigner,
    WorkloadManager,
};
pub use utils::{AdvisorError, AdvisorResult, ScheduledExecutor, ShutdownHandle, TtlCache};

use services::approval_service::ApprovalPolicy;
use services::priority::{PriorityThresholds, PriorityWeights};

/// Shared advisor state.
///
/// Design Philosophy: Keep it simple - Rust's type system IS our DI container.
/// No need for Service Container pattern with dyn Any.
/// All services are wrapped in Arc for cheap cloning and thread safety.
#[derive(Clone)]
pub struct AdvisorState {
    pub engine: Arc<dyn QueryEngine>,
    pub store: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,

    pub pattern_engine: Arc<PatternEngine>,
    pub query_analyzer: Arc<QueryAnalyzer>,
    pub query_optimizer: Arc<QueryOptimizer>,
    pub table_designer: Arc<TableDesigner>,

    pub priority_ranker: Arc<PriorityRanker>,
    pub recommendation_generator: Arc<RecommendationGenerator>,
    pub approval_workflow: Arc<ApprovalWorkflow>,
    pub implementer: Arc<Implementer>,

    pub resource_monitor: Arc<ResourceMonitor>,
    pub workload_manager: Arc<WorkloadManager>,
    pub effectiveness_monitor: Arc<EffectivenessMonitor>,
}

impl AdvisorState {
    /// Wire every service against the injected backends using the given
    /// configuration.
    pub fn new(
        config: &Config,
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cache_ttl = Duration::seconds(config.cache.ttl_secs as i64);

        let pattern_engine = Arc::new(PatternEngine::new(TtlCache::new(
            cache_ttl,
            config.cache.pattern_capacity,
        )));
        let query_analyzer = Arc::new(QueryAnalyzer::new(
            engine.clone(),
            store.clone(),
            pattern_engine.clone(),
            TtlCache::new(cache_ttl, config.cache.analysis_capacity),
        ));
        let query_optimizer = Arc::new(QueryOptimizer::new(
            engine.clone(),
            TtlCache::new(cache_ttl, config.cache.optimizer_capacity),
        ));
        let table_designer = Arc::new(TableDesigner::new(engine.clone()));

        let priority_ranker = Arc::new(PriorityRanker::new(
            PriorityWeights {
                business_value: config.priority.business_value_weight,
                impact: config.priority.impact_weight,
                effort: config.priority.effort_weight,
                risk: config.priority.risk_weight,
            },
            PriorityThresholds {
                critical: config.priority.critical_threshold,
                high: config.priority.high_threshold,
                medium: config.priority.medium_threshold,
            },
        ));
        let recommendation_generator = Arc::new(
            RecommendationGenerator::new(store.clone(), priority_ranker.clone())
                .with_ttl(Duration::days(config.recommendation.ttl_days)),
        );
        let approval_workflow = Arc::new(
            ApprovalWorkflow::new(store.clone())
                .with_policy(ApprovalPolicy {
                    performance_threshold: config.approval.performance_threshold,
                    risk_threshold: config.approval.risk_threshold,
                })
                .with_ttl(Duration::days(config.approval.ttl_days)),
        );
        let implementer = Arc::new(
            Implementer::new(engine.clone(), store.clone())
                .with_confidence_threshold(config.implementation.auto_confidence_threshold)
                .with_monitor_delay(Duration::seconds(
                    config.implementation.monitor_delay_secs as i64,
                )),
        );

        let resource_monitor = Arc::new(
            ResourceMonitor::new(engine.clone(), config.resource.slot_capacity).with_thresholds(
                config.resource.over_utilization_threshold,
                config.resource.under_utilization_threshold,
            ),
        );
        let workload_manager = Arc::new(WorkloadManager::new(config.workload.concurrency_limit));
        let effectiveness_monitor = Arc::new(
            EffectivenessMonitor::new(engine.clone(), store.clone(), notifier.clone())
                .with_regression_threshold(config.implementation.regression_threshold_pct),
        );

        Self {
            engine,
            store,
            notifier,
            pattern_engine,
            query_analyzer,
            query_optimizer,
            table_designer,
            priority_ranker,
            recommendation_generator,
            approval_workflow,
            implementer,
            resource_monitor,
            workload_manager,
            effectiveness_monitor,
        }
    }
}

/// Initialize logging from config. Returns the non-blocking writer guard
/// when file logging is on; the caller must keep it alive.
pub fn init_telemetry(config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_filter = tracing_subscriber::EnvFilter::new(&config.logging.level);
    let registry = tracing_subscriber::registry().with(log_filter);

    if let Some(log_file) = &config.logging.file {
        let log_path = std::path::Path::new(log_file);
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let log_dir = log_path.parent().and_then(|p| p.to_str()).unwrap_or("logs");
        let file_name = log_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("advisor.log");
        // Rolling appender adds a date suffix; drop the .log extension.
        let file_prefix = file_name.strip_suffix(".log").unwrap_or(file_name);

        let file_appender = tracing_appender::rolling::daily(log_dir, file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(non_blocking))
            .with(tracing_subscriber::fmt::layer())
            .init();
        Some(guard)
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
        None
    }
}
