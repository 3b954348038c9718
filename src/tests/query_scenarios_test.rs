//! Scenario-level tests for analysis, prioritization and approval
//! behaviors that cut across more than one service.

use std::sync::Arc;

use chrono::Duration;

use super::common::{CapturingNotifier, ScriptedEngine, orders_metadata, test_state};
use crate::backends::{DocumentStore, MemoryStore};
use crate::models::{
    ApprovalStatus, Confidence, OptimizationType, PriorityLevel, Recommendation,
    RecommendationDetail, Severity,
};
use crate::services::ApprovalWorkflow;
use crate::services::approval_service::APPROVALS_COLLECTION;
use crate::utils::AdvisorError;

#[tokio::test]
async fn test_unconditioned_join_is_flagged_high() {
    let engine = Arc::new(ScriptedEngine::new());
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);

    let q = "SELECT o.id FROM sales.orders o JOIN sales.customers c ON 1=1 WHERE o.amount > 100";
    let analysis = state.query_analyzer.analyze_query(q, true, true).await.unwrap();

    let cartesian = analysis
        .patterns
        .iter()
        .find(|p| p.pattern_id == "CARTESIAN_JOIN")
        .expect("cartesian join pattern");
    assert_eq!(cartesian.severity, Severity::High);
    assert_eq!(cartesian.optimization_type, OptimizationType::JoinReordering);

    assert!(
        analysis
            .anti_patterns
            .iter()
            .any(|a| a.anti_pattern_id == "CARTESIAN_PRODUCT")
    );

    // Suggestions come sorted by impact; the join dominates everything
    // else found in this query.
    let top = &analysis.recommendations[0];
    assert_eq!(top.optimization_type, OptimizationType::JoinReordering);
    assert_eq!(top.estimated_improvement.confidence, Confidence::High);
}

#[tokio::test]
async fn test_select_star_anti_pattern_is_deduplicated() {
    let engine = Arc::new(ScriptedEngine::new());
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);

    // Both the syntax rule and the structure rule fire on this query;
    // the report still carries a single SELECT_STAR anti-pattern.
    let analysis = state
        .query_analyzer
        .analyze_query("SELECT * FROM sales.orders", true, true)
        .await
        .unwrap();
    let star_count = analysis
        .anti_patterns
        .iter()
        .filter(|a| a.anti_pattern_id == "SELECT_STAR")
        .count();
    assert_eq!(star_count, 1);
    assert!(
        analysis
            .recommendations
            .iter()
            .any(|r| r.optimization_type == OptimizationType::ColumnPruning)
    );
}

#[tokio::test]
async fn test_not_in_rewrite_validates_equivalent() {
    let engine = Arc::new(ScriptedEngine::new().script_table(orders_metadata()));
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);

    let q = "SELECT id FROM sales.orders WHERE customer_id NOT IN (SELECT id FROM sales.banned)";
    let result = state
        .query_optimizer
        .optimize_query(q, &[OptimizationType::SubqueryFlattening], true, false)
        .await
        .unwrap();

    assert!(result.optimized_query.contains("NOT EXISTS"));
    // Both sides sample the same scripted rows, so validation passes.
    let equivalence = result.equivalence.expect("validation ran");
    assert!(equivalence.is_equivalent);
    // Identical plans on both sides: a zero-improvement comparison.
    let comparison = result.performance_comparison.expect("comparison ran");
    assert_eq!(comparison.slot_ms_improvement_pct, 0.0);
}

#[tokio::test]
async fn test_validation_catches_divergent_rewrite() {
    let q = "SELECT id FROM sales.orders WHERE customer_id NOT IN (SELECT id FROM sales.banned)";
    let rewritten = "SELECT id FROM sales.orders WHERE NOT EXISTS (SELECT 1 FROM sales.banned WHERE banned.id = customer_id)";

    // The rewritten side samples a different row set, standing in for an
    // engine where the transform changed the results.
    let engine = Arc::new(ScriptedEngine::new().script_rows(
        &format!("SELECT * FROM ({}) LIMIT 100", rewritten),
        vec![serde_json::json!({"id": 2, "amount": 10.0})],
    ));
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);

    let result = state
        .query_optimizer
        .optimize_query(q, &[OptimizationType::SubqueryFlattening], true, false)
        .await
        .unwrap();
    assert_eq!(result.optimized_query, rewritten);
    assert!(!result.equivalence.expect("validation ran").is_equivalent);
}

#[tokio::test]
async fn test_priority_score_weighs_all_four_inputs() {
    let engine = Arc::new(ScriptedEngine::new());
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);

    // 0.3*0.8 + 0.4*0.75 + 0.2*(1-0.2) + 0.1*(1-0.6) with default weights.
    let score = state
        .priority_ranker
        .calculate_priority_score(0.8, 0.75, 0.2, 0.6);
    assert!((score - 0.74).abs() < 1e-9);
    assert_eq!(
        state.priority_ranker.determine_priority_level(score),
        PriorityLevel::High
    );
}

#[tokio::test]
async fn test_expired_approval_cannot_be_decided() {
    let store = Arc::new(MemoryStore::new());
    let workflow = ApprovalWorkflow::new(store.clone()).with_ttl(Duration::days(-1));

    let rec = Recommendation::new(
        OptimizationType::Partitioning,
        RecommendationDetail::Schema {
            dataset: "sales".to_string(),
            table: "orders".to_string(),
            ddl: "ALTER TABLE sales.orders SET OPTIONS (partition_expiration_days = 90)"
                .to_string(),
            rollback_ddl: None,
        },
        "Partition sales.orders",
        "Scan costs dominate",
        Duration::days(30),
    );
    let request = workflow
        .create_approval_request(rec, "analyst-1", "stale request")
        .await
        .unwrap();

    // The overdue request expires on read, so the decision is rejected
    // against the EXPIRED state.
    let err = workflow
        .approve(&request.approval_id, "dba-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AdvisorError::StateViolation(_)));

    let fetched = workflow
        .get_approval_request(&request.approval_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fetched.status, ApprovalStatus::Expired);

    // The flip was persisted, not just returned.
    let doc = store
        .get_document(APPROVALS_COLLECTION, &request.approval_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(doc["status"], serde_json::json!("EXPIRED"));
}
