use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub analyzer: AnalyzerConfig,
    pub priority: PriorityConfig,
    pub approval: ApprovalConfig,
    pub recommendation: RecommendationConfig,
    pub implementation: ImplementationConfig,
    pub resource: ResourceConfig,
    pub workload: WorkloadConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL for the document store.
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub pattern_capacity: usize,
    pub analysis_capacity: usize,
    pub optimizer_capacity: usize,
    /// Entry TTL for all analysis caches (accepts "30s", "5m", "1h").
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Rolling window of query history consulted by the table analyzers.
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub usage_window_days: i64,
    /// Row limit for sampled equivalence validation.
    pub validation_row_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Weights must sum to 1.0 (±0.001).
    pub business_value_weight: f64,
    pub impact_weight: f64,
    pub effort_weight: f64,
    pub risk_weight: f64,
    pub critical_threshold: f64,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Performance score above which a human must sign off.
    pub performance_threshold: f64,
    pub risk_threshold: f64,
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecommendationConfig {
    #[serde(deserialize_with = "deserialize_days_i64")]
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImplementationConfig {
    /// Minimum confidence for unattended implementation.
    pub auto_confidence_threshold: f64,
    /// Delay before a completed change is re-measured.
    #[serde(deserialize_with = "deserialize_duration_secs")]
    pub monitor_delay_secs: u64,
    /// Slot-time growth (percent) treated as a regression.
    pub regression_threshold_pct: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub slot_capacity: u32,
    pub over_utilization_threshold: f64,
    pub under_utilization_threshold: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub concurrency_limit: usize,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority, highest first:
    /// 1. Environment variables (prefixed with ADVISOR_, `.env` honored)
    /// 2. Configuration file (config.toml)
    /// 3. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let mut config = if let Some(path) = Self::find_config_file() {
            Self::from_toml(&path)?
        } else {
            tracing::warn!("configuration file not found, using defaults");
            Config::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Supported environment variables:
    /// - ADVISOR_DATABASE_URL
    /// - ADVISOR_LOG_LEVEL
    /// - ADVISOR_CACHE_TTL_SECS (accepts "30s", "5m", "1h")
    /// - ADVISOR_USAGE_WINDOW_DAYS (accepts "30d", "4w")
    /// - ADVISOR_APPROVAL_TTL_DAYS
    /// - ADVISOR_RECOMMENDATION_TTL_DAYS
    /// - ADVISOR_AUTO_CONFIDENCE_THRESHOLD
    /// - ADVISOR_SLOT_CAPACITY
    /// - ADVISOR_WORKLOAD_CONCURRENCY_LIMIT
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ADVISOR_DATABASE_URL") {
            self.database.url = url;
            tracing::info!("override database.url from env");
        }

        if let Ok(level) = std::env::var("ADVISOR_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("override logging.level from env: {}", self.logging.level);
        }

        if let Ok(ttl) = std::env::var("ADVISOR_CACHE_TTL_SECS") {
            match parse_duration_to_secs(&ttl) {
                Ok(val) => {
                    self.cache.ttl_secs = val;
                    tracing::info!("override cache.ttl_secs from env: {}", self.cache.ttl_secs);
                },
                Err(e) => tracing::warn!(
                    "invalid ADVISOR_CACHE_TTL_SECS '{}': {} (keep {})",
                    ttl,
                    e,
                    self.cache.ttl_secs
                ),
            }
        }

        if let Ok(window) = std::env::var("ADVISOR_USAGE_WINDOW_DAYS") {
            match parse_days_to_i64(&window) {
                Ok(val) => {
                    self.analyzer.usage_window_days = val;
                    tracing::info!(
                        "override analyzer.usage_window_days from env: {}",
                        self.analyzer.usage_window_days
                    );
                },
                Err(e) => tracing::warn!(
                    "invalid ADVISOR_USAGE_WINDOW_DAYS '{}': {} (keep {})",
                    window,
                    e,
                    self.analyzer.usage_window_days
                ),
            }
        }

        if let Ok(ttl) = std::env::var("ADVISOR_APPROVAL_TTL_DAYS")
            && let Ok(val) = parse_days_to_i64(&ttl)
        {
            self.approval.ttl_days = val;
            tracing::info!("override approval.ttl_days from env: {}", self.approval.ttl_days);
        }

        if let Ok(ttl) = std::env::var("ADVISOR_RECOMMENDATION_TTL_DAYS")
            && let Ok(val) = parse_days_to_i64(&ttl)
        {
            self.recommendation.ttl_days = val;
            tracing::info!(
                "override recommendation.ttl_days from env: {}",
                self.recommendation.ttl_days
            );
        }

        if let Ok(threshold) = std::env::var("ADVISOR_AUTO_CONFIDENCE_THRESHOLD")
            && let Ok(val) = threshold.parse()
        {
            self.implementation.auto_confidence_threshold = val;
            tracing::info!(
                "override implementation.auto_confidence_threshold from env: {}",
                self.implementation.auto_confidence_threshold
            );
        }

        if let Ok(capacity) = std::env::var("ADVISOR_SLOT_CAPACITY")
            && let Ok(val) = capacity.parse()
        {
            self.resource.slot_capacity = val;
            tracing::info!(
                "override resource.slot_capacity from env: {}",
                self.resource.slot_capacity
            );
        }

        if let Ok(limit) = std::env::var("ADVISOR_WORKLOAD_CONCURRENCY_LIMIT")
            && let Ok(val) = limit.parse()
        {
            self.workload.concurrency_limit = val;
            tracing::info!(
                "override workload.concurrency_limit from env: {}",
                self.workload.concurrency_limit
            );
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.database.url.is_empty() {
            anyhow::bail!("database URL cannot be empty");
        }

        let weight_sum = self.priority.business_value_weight
            + self.priority.impact_weight
            + self.priority.effort_weight
            + self.priority.risk_weight;
        if (weight_sum - 1.0).abs() > 0.001 {
            anyhow::bail!("priority weights must sum to 1.0, got {}", weight_sum);
        }
        if !(self.priority.critical_threshold > self.priority.high_threshold
            && self.priority.high_threshold > self.priority.medium_threshold)
        {
            anyhow::bail!("priority thresholds must be strictly decreasing");
        }

        if self.recommendation.ttl_days <= 0 {
            anyhow::bail!("recommendation.ttl_days must be > 0");
        }
        if self.approval.ttl_days <= 0 {
            anyhow::bail!("approval.ttl_days must be > 0");
        }
        if self.analyzer.usage_window_days <= 0 {
            anyhow::bail!("analyzer.usage_window_days must be > 0");
        }
        if self.analyzer.validation_row_limit == 0 {
            anyhow::bail!("analyzer.validation_row_limit must be > 0");
        }

        if !(0.0..=1.0).contains(&self.implementation.auto_confidence_threshold) {
            anyhow::bail!("implementation.auto_confidence_threshold must be in [0, 1]");
        }
        if self.resource.slot_capacity == 0 {
            anyhow::bail!("resource.slot_capacity must be > 0");
        }
        if self.resource.under_utilization_threshold >= self.resource.over_utilization_threshold {
            anyhow::bail!("resource utilization floor must be below the ceiling");
        }
        if self.workload.concurrency_limit == 0 {
            anyhow::bail!("workload.concurrency_limit must be > 0");
        }

        Ok(())
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/advisor.db".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,bigquery_advisor=debug".to_string(),
            file: Some("logs/advisor.log".to_string()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pattern_capacity: 512,
            analysis_capacity: 512,
            optimizer_capacity: 256,
            ttl_secs: 3600,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self { usage_window_days: 30, validation_row_limit: 100 }
    }
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            business_value_weight: 0.3,
            impact_weight: 0.4,
            effort_weight: 0.2,
            risk_weight: 0.1,
            critical_threshold: 0.75,
            high_threshold: 0.5,
            medium_threshold: 0.25,
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { performance_threshold: 0.7, risk_threshold: 0.6, ttl_days: 7 }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self { ttl_days: 30 }
    }
}

impl Default for ImplementationConfig {
    fn default() -> Self {
        Self {
            auto_confidence_threshold: 0.7,
            monitor_delay_secs: 24 * 60 * 60,
            regression_threshold_pct: 10.0,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            slot_capacity: 1000,
            over_utilization_threshold: 0.85,
            under_utilization_threshold: 0.30,
        }
    }
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self { concurrency_limit: 8 }
    }
}

// =========================
// Helpers for parsing values
// =========================

fn parse_duration_to_secs(input: &str) -> Result<u64, String> {
    // Accept plain numbers (treated as seconds)
    if let Ok(val) = input.parse::<u64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: u64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(n),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(n * 60),
        "h" | "hr" | "hour" | "hours" => Ok(n * 60 * 60),
        "d" | "day" | "days" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

fn parse_days_to_i64(input: &str) -> Result<i64, String> {
    // Accept plain numbers (treated as days)
    if let Ok(val) = input.parse::<i64>() {
        return Ok(val);
    }

    let s = input.trim().to_lowercase();
    let (num_str, unit) = s.split_at(s.chars().take_while(|c| c.is_ascii_digit()).count());
    if num_str.is_empty() || unit.is_empty() {
        return Err("missing number or unit".into());
    }
    let n: i64 = num_str.parse().map_err(|_| "invalid number".to_string())?;
    match unit {
        "d" | "day" | "days" => Ok(n),
        "w" | "week" | "weeks" => Ok(n * 7),
        _ => Err(format!("unsupported unit: {}", unit)),
    }
}

// Custom serde deserializers to support numeric or human-friendly string values
fn deserialize_duration_secs<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of seconds or a string like '30s', '5m', '1h'")
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v >= 0 { Ok(v as u64) } else { Err(E::custom("negative not allowed")) }
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_duration_to_secs(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

fn deserialize_days_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Visitor;
    impl<'de> serde::de::Visitor<'de> for Visitor {
        type Value = i64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(f, "a number of days or a string like '7d' or '2w'")
        }
        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
            Ok(v)
        }
        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
            Ok(v as i64)
        }
        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(v).map_err(E::custom)
        }
        fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            parse_days_to_i64(&v).map_err(E::custom)
        }
    }
    deserializer.deserialize_any(Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_toml_with_human_friendly_values() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            ttl_secs = "15m"

            [analyzer]
            usage_window_days = "2w"

            [workload]
            concurrency_limit = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.cache.ttl_secs, 900);
        assert_eq!(config.analyzer.usage_window_days, 14);
        assert_eq!(config.workload.concurrency_limit, 4);
        // Untouched sections keep defaults.
        assert_eq!(config.approval.ttl_days, 7);
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let mut config = Config::default();
        config.priority.impact_weight = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = Config::default();
        config.resource.under_utilization_threshold = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_duration_to_secs("90"), Ok(90));
        assert_eq!(parse_duration_to_secs("2h"), Ok(7200));
        assert!(parse_duration_to_secs("fast").is_err());
        assert_eq!(parse_days_to_i64("3w"), Ok(21));
    }
}
