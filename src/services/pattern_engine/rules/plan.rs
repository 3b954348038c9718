//! Plan rules: checks over execution-plan statistics
//!
//! All rules in this module return `None` when no plan is attached to the
//! context; they only fire on measured numbers.

use super::{PatternRule, RuleContext};
use crate::models::{OptimizationType, Pattern, PatternType, PlanStage, Severity};

const FULL_SCAN_ROW_THRESHOLD: f64 = 1_000_000.0;
const LARGE_SHUFFLE_BYTES: f64 = 1_073_741_824.0; // 1 GiB
const IO_RATIO_THRESHOLD: f64 = 10.0;

fn make_pattern(
    id: &'static str,
    description: String,
    severity: Severity,
    optimization_type: OptimizationType,
    details: serde_json::Value,
) -> Pattern {
    Pattern {
        pattern_id: id.to_string(),
        pattern_type: PatternType::Plan,
        description,
        severity,
        optimization_type,
        details,
    }
}

fn max_stage_by<'a>(
    stages: impl Iterator<Item = &'a PlanStage>,
    key: impl Fn(&PlanStage) -> f64,
) -> Option<&'a PlanStage> {
    stages.max_by(|a, b| key(a).total_cmp(&key(b)))
}

/// A stage read over a million records without any filter step.
struct FullScanNoFilter;

impl PatternRule for FullScanNoFilter {
    fn id(&self) -> &'static str {
        "FULL_SCAN_NO_FILTER"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let plan = ctx.plan?;
        let offender = max_stage_by(
            plan.stages
                .iter()
                .filter(|s| !s.has_filter && s.records_read > FULL_SCAN_ROW_THRESHOLD),
            |s| s.records_read,
        )?;
        Some(make_pattern(
            self.id(),
            format!(
                "Stage {} read {} records with no filter step",
                offender.name, offender.records_read
            ),
            Severity::High,
            OptimizationType::PartitionFiltering,
            serde_json::json!({
                "stage": offender.name,
                "records_scanned": offender.records_read,
            }),
        ))
    }
}

struct LargeShuffle;

impl PatternRule for LargeShuffle {
    fn id(&self) -> &'static str {
        "LARGE_SHUFFLE"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let plan = ctx.plan?;
        let offender = max_stage_by(
            plan.stages
                .iter()
                .filter(|s| s.shuffle_output_bytes > LARGE_SHUFFLE_BYTES),
            |s| s.shuffle_output_bytes,
        )?;
        Some(make_pattern(
            self.id(),
            format!(
                "Stage {} shuffled {} bytes between workers",
                offender.name, offender.shuffle_output_bytes
            ),
            Severity::Medium,
            OptimizationType::JoinReordering,
            serde_json::json!({
                "stage": offender.name,
                "shuffle_output_bytes": offender.shuffle_output_bytes,
            }),
        ))
    }
}

/// Aggregation spread over more than one stage.
struct MultiStageAggregation;

impl PatternRule for MultiStageAggregation {
    fn id(&self) -> &'static str {
        "MULTI_STAGE_AGGREGATION"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let plan = ctx.plan?;
        if plan.aggregate_stage_count <= 1 {
            return None;
        }
        Some(make_pattern(
            self.id(),
            format!("{} aggregation stages in one plan", plan.aggregate_stage_count),
            Severity::Medium,
            OptimizationType::AggregationOptimization,
            serde_json::json!({ "aggregate_stage_count": plan.aggregate_stage_count }),
        ))
    }
}

/// Plan-wide read volume far exceeds the written output: most of what was
/// scanned got dropped late.
struct HighIoRatio;

impl PatternRule for HighIoRatio {
    fn id(&self) -> &'static str {
        "HIGH_IO_RATIO"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let plan = ctx.plan?;
        let read = plan.total_records_read;
        let written = plan.total_records_written.max(1.0);
        if read / written <= IO_RATIO_THRESHOLD {
            return None;
        }
        Some(make_pattern(
            self.id(),
            format!(
                "Plan read {} records but produced only {}",
                read, plan.total_records_written
            ),
            Severity::Medium,
            OptimizationType::PredicatePushdown,
            serde_json::json!({
                "total_records_read": read,
                "total_records_written": plan.total_records_written,
            }),
        ))
    }
}

pub fn get_rules() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(FullScanNoFilter),
        Box::new(LargeShuffle),
        Box::new(MultiStageAggregation),
        Box::new(HighIoRatio),
    ]
}
