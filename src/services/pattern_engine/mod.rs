//! SQL pattern engine
//!
//! Normalizes query text, extracts structure, runs the rule catalog and
//! derives anti-patterns with a per-instance result cache. The engine is
//! pure over its inputs: no backend calls happen here.

pub mod extract;
pub mod rules;

use serde::{Deserialize, Serialize};

use crate::models::{AntiPattern, Pattern, PlanAnalysis};
use crate::utils::TtlCache;
use rules::RuleContext;

pub use extract::{
    extract_structure, generate_query_fingerprint, normalize_query, query_hash, sha256_hex,
};

/// Everything pattern detection produced for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternReport {
    pub query_fingerprint: String,
    pub patterns: Vec<Pattern>,
    pub anti_patterns: Vec<AntiPattern>,
    /// One hint per distinct optimization technique the patterns point at.
    pub optimization_suggestions: Vec<String>,
}

pub struct PatternEngine {
    cache: TtlCache<String, PatternReport>,
}

impl PatternEngine {
    pub fn new(cache: TtlCache<String, PatternReport>) -> Self {
        Self { cache }
    }

    /// Detect patterns and anti-patterns in one query. `plan` enables the
    /// plan rule family; detection without a plan is purely textual.
    ///
    /// Results are cached per fingerprint when `use_cache` is set. The cache
    /// key includes whether a plan was attached, so a plan-backed report
    /// never masks a text-only one or vice versa.
    pub fn identify_patterns(
        &self,
        query: &str,
        plan: Option<&PlanAnalysis>,
        use_cache: bool,
    ) -> PatternReport {
        if query.trim().is_empty() {
            return PatternReport::default();
        }

        let fingerprint = generate_query_fingerprint(query);
        let cache_key = format!("{}:{}", fingerprint, plan.is_some());
        if use_cache
            && let Some(report) = self.cache.get(&cache_key)
        {
            tracing::debug!(fingerprint = %fingerprint, "pattern cache hit");
            return report;
        }

        let raw = extract::strip_comments(query);
        let normalized = normalize_query(query);
        let structure = extract_structure(query);
        let ctx = RuleContext {
            raw_query: &raw,
            normalized_query: &normalized,
            structure: &structure,
            plan,
        };

        let patterns: Vec<Pattern> = rules::get_all_rules()
            .iter()
            .filter_map(|rule| rule.evaluate(&ctx))
            .collect();
        let anti_patterns = rules::derive_anti_patterns(&patterns);
        let optimization_suggestions = suggestions_for(&patterns);

        tracing::debug!(
            fingerprint = %fingerprint,
            pattern_count = patterns.len(),
            anti_pattern_count = anti_patterns.len(),
            "pattern detection complete"
        );

        let report = PatternReport {
            query_fingerprint: fingerprint,
            patterns,
            anti_patterns,
            optimization_suggestions,
        };
        if use_cache {
            self.cache.put(cache_key, report.clone());
        }
        report
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// One suggestion line per distinct technique, highest severity first.
fn suggestions_for(patterns: &[Pattern]) -> Vec<String> {
    let mut ranked: Vec<&Pattern> = patterns.iter().collect();
    ranked.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut seen = Vec::new();
    let mut suggestions = Vec::new();
    for pattern in ranked {
        if seen.contains(&pattern.optimization_type) {
            continue;
        }
        seen.push(pattern.optimization_type);
        suggestions.push(format!(
            "[{}] {}",
            rules::severity_label(pattern.severity),
            rules::optimization_hint(pattern.optimization_type),
        ));
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;
    use chrono::Duration;

    fn engine() -> PatternEngine {
        PatternEngine::new(TtlCache::new(Duration::minutes(10), 64))
    }

    #[test]
    fn test_empty_query_empty_report() {
        let report = engine().identify_patterns("   ", None, true);
        assert!(report.patterns.is_empty());
        assert!(report.anti_patterns.is_empty());
        assert!(report.query_fingerprint.is_empty());
    }

    #[test]
    fn test_cartesian_join_detected() {
        let report = engine().identify_patterns("SELECT * FROM t JOIN u ON 1=1", None, false);
        let cartesian = report
            .patterns
            .iter()
            .find(|p| p.pattern_id == "CARTESIAN_JOIN")
            .expect("cartesian pattern");
        assert_eq!(cartesian.severity, Severity::High);
        assert!(report
            .anti_patterns
            .iter()
            .any(|a| a.anti_pattern_id == "CARTESIAN_PRODUCT"));
    }

    #[test]
    fn test_select_star_without_where() {
        let report = engine().identify_patterns("SELECT * FROM orders", None, false);
        let ids: Vec<&str> = report.patterns.iter().map(|p| p.pattern_id.as_str()).collect();
        assert!(ids.contains(&"SELECT_STAR"));
        assert!(ids.contains(&"UNNECESSARY_COLUMNS"));
        assert!(ids.contains(&"MISSING_WHERE_CLAUSE"));
        // SELECT_STAR and UNNECESSARY_COLUMNS collapse to one anti-pattern.
        assert_eq!(
            report
                .anti_patterns
                .iter()
                .filter(|a| a.anti_pattern_id == "SELECT_STAR")
                .count(),
            1
        );
    }

    #[test]
    fn test_suggestions_deduplicated_by_technique() {
        let report = engine().identify_patterns("SELECT * FROM orders", None, false);
        assert!(!report.optimization_suggestions.is_empty());
        let mut sorted = report.optimization_suggestions.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), report.optimization_suggestions.len());
    }

    #[test]
    fn test_cache_round_trip() {
        let engine = engine();
        let q = "SELECT * FROM t JOIN u ON 1=1";
        let first = engine.identify_patterns(q, None, true);
        let second = engine.identify_patterns(q, None, true);
        assert_eq!(first.query_fingerprint, second.query_fingerprint);
        assert_eq!(first.patterns.len(), second.patterns.len());

        engine.clear_cache();
        let third = engine.identify_patterns(q, None, true);
        assert_eq!(first.patterns.len(), third.patterns.len());
    }

    #[test]
    fn test_clean_query_has_no_high_findings() {
        let report = engine().identify_patterns(
            "SELECT id, total FROM orders WHERE order_date >= '2026-01-01' LIMIT 100",
            None,
            false,
        );
        assert!(report.patterns.iter().all(|p| p.severity != Severity::High));
    }
}
