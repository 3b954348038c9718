//! End-to-end pipeline tests wiring the full advisor state over an
//! in-memory store and a scripted engine.

use std::sync::Arc;

use chrono::Duration;

use super::common::{CapturingNotifier, ScriptedEngine, orders_metadata, simple_plan, test_state};
use crate::models::{
    ApprovalStatus, ChangeStatus, Confidence, EstimatedImprovement, OptimizationRecommendation,
    OptimizationType, RecommendationDetail, ResourceRequirements, WorkloadPriority,
};
use crate::services::{GenerationContext, ImplementationOutcome, Implementer};

#[tokio::test]
async fn test_query_rewrite_pipeline_end_to_end() {
    let original = "SELECT * FROM sales.orders";
    let optimized = "SELECT id, amount, order_date FROM sales.orders";

    // The rewritten query plans 50% slower than the original, so the
    // effectiveness sweep at the end has something to complain about.
    let engine = Arc::new(
        ScriptedEngine::new()
            .script_table(orders_metadata())
            .script_plan(optimized, simple_plan(150.0)),
    );
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine.clone(), notifier.clone());

    // Analysis flags the star projection and the missing WHERE clause.
    let analysis = state
        .query_analyzer
        .analyze_query(original, true, true)
        .await
        .unwrap();
    assert!(
        analysis
            .anti_patterns
            .iter()
            .any(|a| a.anti_pattern_id == "SELECT_STAR")
    );
    assert!(
        analysis
            .anti_patterns
            .iter()
            .any(|a| a.anti_pattern_id == "UNFILTERED_QUERY")
    );

    // The optimizer expands the star from the catalog schema.
    let result = state
        .query_optimizer
        .optimize_query(original, &[OptimizationType::ColumnPruning], false, false)
        .await
        .unwrap();
    assert_eq!(result.optimized_query, optimized);

    // Promote the analyzer suggestion into a canonical recommendation
    // carrying the rewritten query as its payload.
    let suggestion = analysis
        .recommendations
        .iter()
        .find(|r| r.optimization_type == OptimizationType::ColumnPruning)
        .expect("column pruning suggestion")
        .clone();
    let detail = RecommendationDetail::Query {
        original_query: original.to_string(),
        optimized_query: result.optimized_query.clone(),
        techniques: result.applied_techniques.clone(),
    };
    let ctx = GenerationContext { monthly_spend_usd: 1000.0, ..Default::default() };
    let rec = state
        .recommendation_generator
        .generate(&suggestion, detail, &ctx)
        .await
        .unwrap();
    // A low-risk query rewrite goes straight through.
    assert!(!rec.requires_manual_approval);

    // Implement with an immediately-due monitoring window so the sweep
    // picks the change up in the same test.
    let implementer = Implementer::new(engine.clone(), state.store.clone())
        .with_monitor_delay(Duration::seconds(-1));
    let outcome = implementer
        .implement_optimization(&rec, true, false)
        .await
        .unwrap();
    let record = match outcome {
        ImplementationOutcome::Applied { record } => record,
        other => panic!("expected an applied change, got {:?}", other),
    };
    assert_eq!(record.status, ChangeStatus::Completed);

    let swept = state.effectiveness_monitor.sweep_due().await.unwrap();
    assert_eq!(swept, 1);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].metadata["change_id"],
        serde_json::json!(record.change_id)
    );
    assert!(sent[0].body.contains("slower"));
}

#[tokio::test]
async fn test_schema_change_approval_then_rollback() {
    let engine = Arc::new(ScriptedEngine::new().script_table(orders_metadata()));
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine.clone(), notifier.clone());

    let suggestion = OptimizationRecommendation {
        optimization_type: OptimizationType::Partitioning,
        description: "Partition sales.orders by order_date".to_string(),
        rationale: "Most queries filter on order_date".to_string(),
        impact_score: 8.0,
        original_snippet: String::new(),
        optimized_snippet: String::new(),
        estimated_improvement: EstimatedImprovement {
            percentage: 40.0,
            confidence: Confidence::High,
            metrics: vec!["bytes_processed".to_string()],
        },
    };
    let detail = RecommendationDetail::Schema {
        dataset: "sales".to_string(),
        table: "orders".to_string(),
        ddl: "CREATE TABLE sales.orders_p PARTITION BY order_date AS SELECT * FROM sales.orders"
            .to_string(),
        rollback_ddl: Some("DROP TABLE sales.orders_p".to_string()),
    };
    let ctx = GenerationContext { monthly_spend_usd: 2000.0, ..Default::default() };
    let rec = state
        .recommendation_generator
        .generate(&suggestion, detail, &ctx)
        .await
        .unwrap();
    // Schema-altering changes always go through a human.
    assert!(rec.requires_manual_approval);

    let request = state
        .approval_workflow
        .create_approval_request(rec.clone(), "analyst-1", "rebuild during low traffic")
        .await
        .unwrap();
    let pending = state.approval_workflow.list_pending().await.unwrap();
    assert_eq!(pending.len(), 1);

    let approved = state
        .approval_workflow
        .approve(&request.approval_id, "dba-1")
        .await
        .unwrap();
    assert_eq!(approved.status, ApprovalStatus::Approved);
    assert_eq!(approved.decided_by.as_deref(), Some("dba-1"));

    let outcome = state
        .implementer
        .implement_optimization(&rec, true, false)
        .await
        .unwrap();
    let record = match outcome {
        ImplementationOutcome::Applied { record } => record,
        other => panic!("expected an applied change, got {:?}", other),
    };
    assert_eq!(record.status, ChangeStatus::Completed);
    state
        .approval_workflow
        .mark_status(&request.approval_id, ApprovalStatus::Implemented)
        .await
        .unwrap();

    let rollback = state
        .implementer
        .rollback_implementation(&record.change_id)
        .await
        .unwrap();
    assert_eq!(rollback.status, ChangeStatus::Completed);
    {
        let statements = engine.statements.lock().unwrap();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("CREATE TABLE"));
        assert!(statements[1].contains("DROP TABLE"));
    }

    let original = state
        .implementer
        .get_change(&record.change_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(original.status, ChangeStatus::RolledBack);
}

#[tokio::test]
async fn test_workload_admission_respects_dependencies() {
    let engine = Arc::new(ScriptedEngine::new());
    let notifier = Arc::new(CapturingNotifier::default());
    let state = test_state(engine, notifier);
    let manager = &state.workload_manager;

    let analysis = manager
        .submit_workload(
            "table_analysis",
            serde_json::json!({"table": "sales.orders"}),
            WorkloadPriority::High,
            ResourceRequirements { slots: 100, memory_gb: 4.0 },
            vec![],
        )
        .unwrap();
    let rebuild = manager
        .submit_workload(
            "table_rebuild",
            serde_json::json!({"table": "sales.orders"}),
            WorkloadPriority::Critical,
            ResourceRequirements { slots: 500, memory_gb: 16.0 },
            vec![analysis.workload_id.clone()],
        )
        .unwrap();

    // The rebuild outranks the analysis but cannot run before it.
    let admitted = manager.schedule_pending();
    assert_eq!(admitted, vec![analysis.workload_id.clone()]);

    manager.start(&analysis.workload_id).unwrap();
    manager
        .complete(&analysis.workload_id, serde_json::json!({"rows": 5_000_000}))
        .unwrap();

    let admitted = manager.schedule_pending();
    assert_eq!(admitted, vec![rebuild.workload_id.clone()]);
}
