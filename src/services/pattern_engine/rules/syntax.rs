//! Syntax rules: regex matches over the query text
//!
//! Most rules run against the normalized text (literals already replaced
//! with `?` placeholders); rules that need literal shape, like leading
//! wildcards, run against the raw text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{PatternRule, RuleContext};
use crate::models::{OptimizationType, Pattern, PatternType, Severity};

#[derive(Clone, Copy)]
enum Target {
    Normalized,
    Raw,
}

struct SyntaxRule {
    id: &'static str,
    description: &'static str,
    severity: Severity,
    optimization_type: OptimizationType,
    target: Target,
    pattern: &'static Lazy<Regex>,
    /// When set, the rule fires only if this does NOT match.
    veto: Option<&'static Lazy<Regex>>,
}

impl PatternRule for SyntaxRule {
    fn id(&self) -> &'static str {
        self.id
    }

    fn evaluate(&self, ctx: &RuleContext) -> Option<Pattern> {
        let text = match self.target {
            Target::Normalized => ctx.normalized_query,
            Target::Raw => ctx.raw_query,
        };

        let matched = self.pattern.find(text)?;
        if let Some(veto) = self.veto {
            if veto.is_match(text) {
                return None;
            }
        }

        Some(Pattern {
            pattern_id: self.id.to_string(),
            pattern_type: PatternType::Syntax,
            description: self.description.to_string(),
            severity: self.severity,
            optimization_type: self.optimization_type,
            details: serde_json::json!({ "matched": matched.as_str() }),
        })
    }
}

static RE_CARTESIAN: Lazy<Regex> = Lazy::new(|| {
    // `ON 1=1` normalizes to `on ? = ?` / `on ?=?`; also catch literal TRUE.
    Regex::new(r"\bcross\s+join\b|\bon\s+\?\s*=\s*\?|\bon\s+true\b").unwrap()
});
static RE_SELECT_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bselect\s+\*").unwrap());
static RE_DISTINCT_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bselect\s+distinct\s+\*").unwrap());
static RE_WILDCARD_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bfrom\s+`[^`]*\*`").unwrap());
static RE_SUFFIX_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)_table_suffix|_partitiontime|_partitiondate").unwrap());
static RE_LIKE_LEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\blike\s+'%").unwrap());
static RE_NOT_IN_SUBQUERY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bnot\s+in\s*\(\s*select\b").unwrap());
static RE_ORDER_BY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\border\s+by\b").unwrap());
static RE_LIMIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\blimit\s+\?").unwrap());
static RE_FUNCTION_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bwhere\s+[a-z_]+\s*\(").unwrap());

static RULES: &[SyntaxRule] = &[
    SyntaxRule {
        id: "CARTESIAN_JOIN",
        description: "Join without a restricting condition (cross join or trivially true ON)",
        severity: Severity::High,
        optimization_type: OptimizationType::JoinReordering,
        target: Target::Normalized,
        pattern: &RE_CARTESIAN,
        veto: None,
    },
    SyntaxRule {
        id: "SELECT_STAR",
        description: "SELECT * reads every column of every referenced table",
        severity: Severity::Medium,
        optimization_type: OptimizationType::ColumnPruning,
        target: Target::Normalized,
        pattern: &RE_SELECT_STAR,
        veto: None,
    },
    SyntaxRule {
        id: "DISTINCT_STAR",
        description: "SELECT DISTINCT * deduplicates across all columns",
        severity: Severity::Medium,
        optimization_type: OptimizationType::AggregationOptimization,
        target: Target::Normalized,
        pattern: &RE_DISTINCT_STAR,
        veto: None,
    },
    SyntaxRule {
        id: "UNPARTITIONED_SCAN",
        description: "Wildcard table scan without a _TABLE_SUFFIX or partition filter",
        severity: Severity::High,
        optimization_type: OptimizationType::PartitionFiltering,
        target: Target::Raw,
        pattern: &RE_WILDCARD_TABLE,
        veto: Some(&RE_SUFFIX_FILTER),
    },
    SyntaxRule {
        id: "LIKE_LEADING_WILDCARD",
        description: "LIKE with a leading wildcard cannot be pruned",
        severity: Severity::Medium,
        optimization_type: OptimizationType::PredicatePushdown,
        target: Target::Raw,
        pattern: &RE_LIKE_LEADING,
        veto: None,
    },
    SyntaxRule {
        id: "NOT_IN_SUBQUERY",
        description: "NOT IN over a subquery; NULL-hostile and slow",
        severity: Severity::Medium,
        optimization_type: OptimizationType::SubqueryFlattening,
        target: Target::Normalized,
        pattern: &RE_NOT_IN_SUBQUERY,
        veto: None,
    },
    SyntaxRule {
        id: "ORDER_BY_WITHOUT_LIMIT",
        description: "ORDER BY without LIMIT sorts the entire result",
        severity: Severity::Low,
        optimization_type: OptimizationType::AggregationOptimization,
        target: Target::Normalized,
        pattern: &RE_ORDER_BY,
        veto: Some(&RE_LIMIT),
    },
    SyntaxRule {
        id: "FUNCTION_ON_FILTER_COLUMN",
        description: "Function call wrapping the first WHERE column blocks pruning",
        severity: Severity::Medium,
        optimization_type: OptimizationType::PredicatePushdown,
        target: Target::Normalized,
        pattern: &RE_FUNCTION_FILTER,
        veto: None,
    },
];

pub fn get_rules() -> Vec<Box<dyn PatternRule>> {
    RULES
        .iter()
        .map(|r| {
            Box::new(SyntaxRule {
                id: r.id,
                description: r.description,
                severity: r.severity,
                optimization_type: r.optimization_type,
                target: r.target,
                pattern: r.pattern,
                veto: r.veto,
            }) as Box<dyn PatternRule>
        })
        .collect()
}
