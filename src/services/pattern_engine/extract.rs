//! Query normalization and structural extraction
//!
//! Regex-based, best-effort scanning in the spirit of the profile text
//! parsers: good enough for pattern detection and fingerprinting, not a SQL
//! parser. Misfires degrade to empty collections, never errors.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::models::{JoinInfo, StructureAnalysis};

static LINE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"--[^\n]*").unwrap());
static BLOCK_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'[^']*'").unwrap());
static NUMERIC_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());

static CTE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bwith|,)\s+([a-zA-Z_][\w]*)\s+as\s*\(").unwrap());

static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    // FROM/JOIN followed by an optionally backticked, optionally qualified
    // name. Subqueries start with '(' and are skipped by construction.
    Regex::new(r"(?i)\b(?:from|join)\s+(`[^`]+`|[a-zA-Z_][\w.*-]*)").unwrap()
});

static JOIN_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(inner\s+join|left\s+outer\s+join|left\s+join|right\s+outer\s+join|right\s+join|full\s+outer\s+join|full\s+join|cross\s+join|join)\s+(`[^`]+`|[a-zA-Z_][\w.*-]*)",
    )
    .unwrap()
});

static ON_CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bon\b\s*(.+?)(?:\b(?:inner|left|right|full|cross|join|where|group\s+by|order\s+by|limit|having|qualify)\b|$)")
        .unwrap()
});

static WHERE_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bwhere\b(.+?)(?:\b(?:group\s+by|order\s+by|limit|having|window|qualify)\b|$)")
        .unwrap()
});

static PREDICATE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(?:and|or)\b").unwrap());

static AGGREGATE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(count|sum|avg|min|max|array_agg|string_agg|approx_count_distinct)\s*\(")
        .unwrap()
});

static GROUP_BY_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)\bgroup\s+by\b(.+?)(?:\b(?:order\s+by|limit|having|window|qualify)\b|$)")
        .unwrap()
});

static SUBQUERY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(\s*select\b").unwrap());

static SELECT_STAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\s+(?:distinct\s+)?\*").unwrap());

const KEYWORDS: &[&str] = &[
    "select", "where", "and", "or", "on", "as", "left", "right", "inner", "outer", "cross",
    "join", "from", "unnest", "lateral",
];

/// Remove `--` and `/* */` comments.
pub fn strip_comments(query: &str) -> String {
    let no_block = BLOCK_COMMENT.replace_all(query, " ");
    LINE_COMMENT.replace_all(&no_block, " ").into_owned()
}

/// Canonical text form of a query: comments stripped, string literals
/// replaced with `'?'`, numeric literals with `?`, lower-cased, whitespace
/// collapsed. Idempotent.
pub fn normalize_query(query: &str) -> String {
    let stripped = strip_comments(query);
    let no_strings = STRING_LITERAL.replace_all(&stripped, "'?'");
    let no_numbers = NUMERIC_LITERAL.replace_all(&no_strings, "?");
    no_numbers
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// SHA-256 of the normalized query text; analysis cache key.
pub fn query_hash(query: &str) -> String {
    sha256_hex(&normalize_query(query))
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn unquote(name: &str) -> String {
    name.trim_matches('`').to_string()
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name.to_lowercase().as_str())
}

/// Extract the query's structural shape. All sub-extractions are
/// independent; one misfiring regex leaves the other fields intact.
pub fn extract_structure(query: &str) -> StructureAnalysis {
    let text = strip_comments(query);

    let cte_names: Vec<String> = CTE_NAME
        .captures_iter(&text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();

    let mut tables: Vec<String> = TABLE_REF
        .captures_iter(&text)
        .filter_map(|c| c.get(1).map(|m| unquote(m.as_str())))
        .filter(|t| !is_keyword(t))
        .filter(|t| !cte_names.iter().any(|cte| cte.eq_ignore_ascii_case(t)))
        .collect();
    tables.sort();
    tables.dedup();

    let joins = extract_joins(&text);

    let predicates: Vec<String> = WHERE_CLAUSE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| {
            PREDICATE_SPLIT
                .split(m.as_str())
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let aggregations: Vec<String> = AGGREGATE_CALL
        .captures_iter(&text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_lowercase()))
        .collect();

    let group_by_columns: Vec<String> = GROUP_BY_CLAUSE
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect()
        })
        .unwrap_or_default();

    StructureAnalysis {
        tables,
        joins,
        predicates,
        aggregations,
        group_by_columns,
        subquery_count: SUBQUERY_OPEN.find_iter(&text).count(),
        cte_names,
        select_star: SELECT_STAR.is_match(&text),
        has_where: WHERE_CLAUSE.is_match(&text),
    }
}

fn extract_joins(text: &str) -> Vec<JoinInfo> {
    let matches: Vec<_> = JOIN_CLAUSE.captures_iter(text).collect();
    let starts: Vec<usize> = matches
        .iter()
        .filter_map(|c| c.get(0).map(|m| m.start()))
        .collect();

    matches
        .iter()
        .enumerate()
        .map(|(i, cap)| {
            let raw_type = cap.get(1).map(|m| m.as_str()).unwrap_or("join");
            let join_type = raw_type
                .to_uppercase()
                .split_whitespace()
                .next()
                .unwrap_or("JOIN")
                .trim_end_matches("JOIN")
                .trim()
                .to_string();
            let join_type = if join_type.is_empty() { "INNER".to_string() } else { join_type };
            let table = cap.get(2).map(|m| unquote(m.as_str())).unwrap_or_default();

            // The ON condition, if any, sits between this join and the next.
            let clause_start = cap.get(0).map(|m| m.end()).unwrap_or(0);
            let clause_end = starts
                .get(i + 1)
                .copied()
                .unwrap_or(text.len());
            let condition = ON_CONDITION
                .captures(&text[clause_start..clause_end])
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|c| !c.is_empty());

            JoinInfo { join_type, table, condition }
        })
        .collect()
}

/// Structural fingerprint: sorted tables, joins and normalized predicates,
/// hashed. Queries differing only in literal values or clause order collide
/// on purpose; best-effort, pathological inputs can collide falsely.
pub fn generate_query_fingerprint(query: &str) -> String {
    let structure = extract_structure(query);

    let mut tables: Vec<String> = structure.tables.iter().map(|t| t.to_lowercase()).collect();
    tables.sort();

    let mut joins: Vec<String> = structure
        .joins
        .iter()
        .map(|j| format!("{}:{}", j.join_type.to_lowercase(), j.table.to_lowercase()))
        .collect();
    joins.sort();

    let mut predicates: Vec<String> = structure
        .predicates
        .iter()
        .map(|p| normalize_query(p))
        .collect();
    predicates.sort();

    let canonical = format!(
        "TABLES:{}|JOINS:{}|WHERE:{}",
        tables.join(","),
        joins.join(","),
        predicates.join(",")
    );
    sha256_hex(&canonical)
}
