pub mod approval_service;
pub mod clustering_analyzer;
pub mod effectiveness_task;
pub mod impact;
pub mod implementation_service;
pub mod partition_analyzer;
pub mod pattern_engine;
pub mod priority;
pub mod query_analyzer;
pub mod query_optimizer;
pub mod recommendation_service;
pub mod resource_monitor;
pub mod schema_analyzer;
pub mod table_designer;
pub mod usage_stats;
pub mod workload_manager;

pub use approval_service::{ApprovalPolicy, ApprovalWorkflow};
pub use clustering_analyzer::ClusteringAnalyzer;
pub use effectiveness_task::EffectivenessMonitor;
pub use impact::{ImpactEstimator, calculate_payback_period, calculate_roi};
pub use implementation_service::{
    ImplementationOutcome, Implementer, MonitoringSchedule, is_auto_implementable,
};
pub use partition_analyzer::PartitionAnalyzer;
pub use pattern_engine::{PatternEngine, PatternReport};
pub use priority::{PriorityRanker, PriorityThresholds, PriorityWeights};
pub use query_analyzer::QueryAnalyzer;
pub use query_optimizer::{
    EquivalenceReport, OptimizationResult, PerformanceComparison, QueryOptimizer,
    ValidationOptions,
};
pub use recommendation_service::{GenerationContext, RecommendationGenerator};
pub use resource_monitor::{ResourceMonitor, ResourceUtilization};
pub use schema_analyzer::SchemaAnalyzer;
pub use table_designer::TableDesigner;
pub use usage_stats::UsageCollector;
pub use workload_manager::WorkloadManager;
