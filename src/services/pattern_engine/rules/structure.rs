//! Structure rules: checks over the extracted query shape

use super::{PatternRule, RuleContext};
use crate::models::{JoinInfo, OptimizationType, Pattern, PatternType, Severity};

fn make_pattern(
    id: &'static str,
    description: String,
    severity: Severity,
    optimization_type: OptimizationType,
    details: serde_json::Value,
) -> Pattern {
    Pattern {
        pattern_id: id.to_string(),
        pattern_type: PatternType::Structure,
        description,
        severity,
        optimization_type,
        details,
    }
}

fn is_trivial_condition(condition: &str) -> bool {
    let c: String = condition.chars().filter(|c| !c.is_whitespace()).collect();
    c == "1=1" || c.eq_ignore_ascii_case("true")
}

fn join_lacks_condition(join: &JoinInfo) -> bool {
    match &join.condition {
        None => !join.join_type.eq_ignore_ascii_case("CROSS"),
        Some(c) => is_trivial_condition(c),
    }
}

/// Non-cross join written without a usable ON condition.
struct MissingJoinCondition;

impl PatternRule for MissingJoinCondition {
    fn id(&self) -> &'static str {
        "MISSING_JOIN_CONDITION"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let offenders: Vec<&str> = ctx
            .structure
            .joins
            .iter()
            .filter(|j| join_lacks_condition(j))
            .map(|j| j.table.as_str())
            .collect();
        if offenders.is_empty() {
            return None;
        }
        Some(make_pattern(
            self.id(),
            format!("Joins without a usable ON condition: {}", offenders.join(", ")),
            Severity::High,
            OptimizationType::JoinReordering,
            serde_json::json!({ "tables": offenders }),
        ))
    }
}

/// `SELECT *` reported at the structure level.
struct UnnecessaryColumns;

impl PatternRule for UnnecessaryColumns {
    fn id(&self) -> &'static str {
        "UNNECESSARY_COLUMNS"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        if !ctx.structure.select_star {
            return None;
        }
        Some(make_pattern(
            self.id(),
            "The select list is `*`; every column is materialized".to_string(),
            Severity::Medium,
            OptimizationType::ColumnPruning,
            serde_json::json!({ "tables": ctx.structure.tables }),
        ))
    }
}

struct MissingWhereClause;

impl PatternRule for MissingWhereClause {
    fn id(&self) -> &'static str {
        "MISSING_WHERE_CLAUSE"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        if ctx.structure.has_where || ctx.structure.tables.is_empty() {
            return None;
        }
        Some(make_pattern(
            self.id(),
            "No WHERE clause; the query processes every row of its inputs".to_string(),
            Severity::Medium,
            OptimizationType::PartitionFiltering,
            serde_json::json!({ "tables": ctx.structure.tables }),
        ))
    }
}

/// More than two levels of nested subqueries.
struct NestedSubqueries;

impl PatternRule for NestedSubqueries {
    fn id(&self) -> &'static str {
        "NESTED_SUBQUERIES"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let count = ctx.structure.subquery_count;
        if count <= 2 {
            return None;
        }
        Some(make_pattern(
            self.id(),
            format!("{} nested subqueries; optimizer rewrites are limited", count),
            Severity::Medium,
            OptimizationType::SubqueryFlattening,
            serde_json::json!({ "subquery_count": count }),
        ))
    }
}

/// Outer-query predicate on a joined table while subqueries exist: the
/// filter likely belongs inside the subquery.
struct SuboptimalPredicatePlacement;

impl PatternRule for SuboptimalPredicatePlacement {
    fn id(&self) -> &'static str {
        "SUBOPTIMAL_PREDICATE_PLACEMENT"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        if ctx.structure.subquery_count == 0 || ctx.structure.joins.is_empty() {
            return None;
        }
        let qualified: Vec<&str> = ctx
            .structure
            .predicates
            .iter()
            .filter(|p| p.contains('.'))
            .map(|p| p.as_str())
            .collect();
        if qualified.is_empty() {
            return None;
        }
        Some(make_pattern(
            self.id(),
            "Outer-query predicates on joined tables could be pushed into subqueries".to_string(),
            Severity::Low,
            OptimizationType::PredicatePushdown,
            serde_json::json!({ "predicates": qualified }),
        ))
    }
}

struct HighJoinCount;

impl PatternRule for HighJoinCount {
    fn id(&self) -> &'static str {
        "HIGH_JOIN_COUNT"
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let count = ctx.structure.joins.len();
        if count <= 4 {
            return None;
        }
        Some(make_pattern(
            self.id(),
            format!("{} joins in one statement", count),
            Severity::Medium,
            OptimizationType::JoinReordering,
            serde_json::json!({ "join_count": count }),
        ))
    }
}

pub fn get_rules() -> Vec<Box<dyn PatternRule>> {
    vec![
        Box::new(MissingJoinCondition),
        Box::new(UnnecessaryColumns),
        Box::new(MissingWhereClause),
        Box::new(NestedSubqueries),
        Box::new(SuboptimalPredicatePlacement),
        Box::new(HighJoinCount),
    ]
}
