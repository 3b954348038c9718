//! Anti-pattern rule catalog
//!
//! Three detector families: syntax rules over the normalized (or raw) query
//! text, structure rules over the extracted shape, and plan rules over an
//! execution-plan rollup. Rules are small objects behind one trait so the
//! engine can iterate a single catalog.

pub mod plan;
pub mod structure;
pub mod syntax;

use crate::models::{
    AntiPattern, OptimizationType, Pattern, PlanAnalysis, Severity, StructureAnalysis,
};

/// Everything a rule may look at for one query.
pub struct RuleContext<'a> {
    /// Raw query text with comments stripped.
    pub raw_query: &'a str,
    /// Normalized text (literals replaced, lower-cased).
    pub normalized_query: &'a str,
    pub structure: &'a StructureAnalysis,
    pub plan: Option<&'a PlanAnalysis>,
}

pub trait PatternRule: Send + Sync {
    fn id(&self) -> &'static str;
    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern>;
}

/// Full catalog in evaluation order: syntax, structure, plan.
pub fn get_all_rules() -> Vec<Box<dyn PatternRule>> {
    let mut rules = syntax::get_rules();
    rules.extend(structure::get_rules());
    rules.extend(plan::get_rules());
    rules
}

/// One-line human hint per optimization technique; used for pattern
/// suggestions and recommendation descriptions.
pub fn optimization_hint(optimization_type: OptimizationType) -> &'static str {
    match optimization_type {
        OptimizationType::PredicatePushdown => {
            "Move filters as close to the table scan as possible"
        },
        OptimizationType::JoinReordering => {
            "Reorder joins so the smallest filtered input builds first and every join has a condition"
        },
        OptimizationType::SubqueryFlattening => {
            "Flatten nested subqueries into joins or WITH clauses"
        },
        OptimizationType::ColumnPruning => "Select only the columns the query actually uses",
        OptimizationType::AggregationOptimization => {
            "Combine aggregation stages and bound sorts with LIMIT"
        },
        OptimizationType::CteConversion => {
            "Lift repeated subqueries into a single WITH clause"
        },
        OptimizationType::PartitionFiltering => {
            "Filter on the partition column to prune scanned data"
        },
        OptimizationType::Partitioning => "Partition the table on its dominant filter column",
        OptimizationType::Clustering => "Cluster the table on frequent filter/order columns",
        OptimizationType::SchemaChange => "Tighten column types to cut storage and scan cost",
        OptimizationType::SlotAllocation => "Right-size slot reservations to observed usage",
    }
}

struct AntiPatternSpec {
    anti_pattern_id: &'static str,
    description: &'static str,
    recommendation: &'static str,
}

/// Fixed pattern-id -> anti-pattern mapping (N:1 allowed).
fn anti_pattern_spec(pattern_id: &str) -> Option<AntiPatternSpec> {
    let spec = match pattern_id {
        "CARTESIAN_JOIN" | "MISSING_JOIN_CONDITION" => AntiPatternSpec {
            anti_pattern_id: "CARTESIAN_PRODUCT",
            description: "A join without a restricting condition multiplies rows from both sides",
            recommendation: "Join on the related key columns instead of an unconditioned join",
        },
        "SELECT_STAR" | "UNNECESSARY_COLUMNS" | "DISTINCT_STAR" => AntiPatternSpec {
            anti_pattern_id: "SELECT_STAR",
            description: "SELECT * retrieves unnecessary columns and defeats column pruning",
            recommendation: "List only the columns the consumer needs",
        },
        "UNPARTITIONED_SCAN" | "FULL_SCAN_NO_FILTER" => AntiPatternSpec {
            anti_pattern_id: "FULL_TABLE_SCAN",
            description: "The query scans entire tables without pruning partitions",
            recommendation: "Add a partition filter, or partition the table on the filter column",
        },
        "MISSING_WHERE_CLAUSE" => AntiPatternSpec {
            anti_pattern_id: "UNFILTERED_QUERY",
            description: "The query has no WHERE clause and processes every row",
            recommendation: "Restrict the query with a WHERE clause, ideally on a partition column",
        },
        "NESTED_SUBQUERIES" => AntiPatternSpec {
            anti_pattern_id: "DEEP_SUBQUERY_NESTING",
            description: "Deeply nested subqueries block optimizer rewrites",
            recommendation: "Flatten subqueries into joins or WITH clauses",
        },
        "NOT_IN_SUBQUERY" => AntiPatternSpec {
            anti_pattern_id: "NOT_IN_SUBQUERY",
            description: "NOT IN over a subquery is NULL-hostile and evaluates poorly",
            recommendation: "Rewrite as NOT EXISTS or a LEFT JOIN ... IS NULL",
        },
        "LIKE_LEADING_WILDCARD" | "FUNCTION_ON_FILTER_COLUMN" => AntiPatternSpec {
            anti_pattern_id: "NON_SARGABLE_FILTER",
            description: "The filter shape prevents pushdown and pruning",
            recommendation: "Filter on raw column values; avoid leading wildcards and wrapping functions",
        },
        "ORDER_BY_WITHOUT_LIMIT" => AntiPatternSpec {
            anti_pattern_id: "UNBOUNDED_SORT",
            description: "ORDER BY without LIMIT sorts the full result set",
            recommendation: "Add a LIMIT, or drop the ordering if the consumer re-sorts anyway",
        },
        "LARGE_SHUFFLE" => AntiPatternSpec {
            anti_pattern_id: "LARGE_SHUFFLE",
            description: "Stages move large volumes of data between workers",
            recommendation: "Reduce shuffled data via earlier filters or better join order",
        },
        "MULTI_STAGE_AGGREGATION" => AntiPatternSpec {
            anti_pattern_id: "REPEATED_AGGREGATION",
            description: "Aggregation is split across multiple plan stages",
            recommendation: "Combine aggregations or pre-aggregate in a single pass",
        },
        "HIGH_IO_RATIO" | "SUBOPTIMAL_PREDICATE_PLACEMENT" => AntiPatternSpec {
            anti_pattern_id: "LATE_FILTERING",
            description: "Far more data is read than survives to the output",
            recommendation: "Push filters down so data is discarded at the scan",
        },
        "HIGH_JOIN_COUNT" => AntiPatternSpec {
            anti_pattern_id: "MANY_WAY_JOIN",
            description: "The query joins many tables in a single statement",
            recommendation: "Stage the query through intermediate results or a materialized view",
        },
        _ => return None,
    };
    Some(spec)
}

/// Derive de-duplicated anti-patterns from detected patterns. When several
/// patterns map to one anti-pattern, the highest severity wins.
pub fn derive_anti_patterns(patterns: &[Pattern]) -> Vec<AntiPattern> {
    let mut by_id: Vec<AntiPattern> = Vec::new();

    for pattern in patterns {
        let Some(spec) = anti_pattern_spec(&pattern.pattern_id) else {
            tracing::debug!("no anti-pattern mapping for pattern {}", pattern.pattern_id);
            continue;
        };

        match by_id
            .iter_mut()
            .find(|ap| ap.anti_pattern_id == spec.anti_pattern_id)
        {
            Some(existing) => {
                if pattern.severity > existing.impact {
                    existing.impact = pattern.severity;
                }
            },
            None => by_id.push(AntiPattern {
                anti_pattern_id: spec.anti_pattern_id.to_string(),
                description: spec.description.to_string(),
                impact: pattern.severity,
                recommendation: spec.recommendation.to_string(),
                details: serde_json::json!({ "source_pattern": pattern.pattern_id }),
            }),
        }
    }

    by_id
}

/// Severity used across derived suggestions for consistent wording.
pub fn severity_label(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatternType;

    fn pattern(id: &str, severity: Severity) -> Pattern {
        Pattern {
            pattern_id: id.to_string(),
            pattern_type: PatternType::Syntax,
            description: String::new(),
            severity,
            optimization_type: OptimizationType::JoinReordering,
            details: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_catalog_not_empty() {
        assert!(get_all_rules().len() >= 15);
    }

    #[test]
    fn test_anti_patterns_deduplicated() {
        let patterns = vec![
            pattern("CARTESIAN_JOIN", Severity::Medium),
            pattern("MISSING_JOIN_CONDITION", Severity::High),
            pattern("SELECT_STAR", Severity::Medium),
        ];
        let anti = derive_anti_patterns(&patterns);
        assert_eq!(anti.len(), 2);

        let cartesian = anti
            .iter()
            .find(|a| a.anti_pattern_id == "CARTESIAN_PRODUCT")
            .unwrap();
        // Highest contributing severity wins.
        assert_eq!(cartesian.impact, Severity::High);
    }

    #[test]
    fn test_unmapped_pattern_is_skipped() {
        let anti = derive_anti_patterns(&[pattern("SOMETHING_NEW", Severity::Low)]);
        assert!(anti.is_empty());
    }
}
