use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::services::analysis::{BinLimits, ColumnCandidates, ParetoCategories, ParetoCategory};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Token and server-side session lifetime (accepts "60m", "1h", "3600")
    pub jwt_expires_in: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Root directory for uploaded datasets
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origins: Vec<String>,
}

/// Analysis engine configuration (loaded from the `[analysis]` section)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Date column candidates, highest priority first
    pub date_candidates: Vec<String>,
    /// Store/grouping column candidates, highest priority first
    pub store_candidates: Vec<String>,
    /// Histogram bin count used when a request omits `bins`
    pub default_bins: usize,
    /// Largest histogram bin count a request may ask for
    pub max_bins: usize,
    /// Pareto category columns in tie-break order
    pub categories: Vec<CategoryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub column: String,
    pub display_name: Option<String>,
}

impl Config {
    /// Load configuration with environment variable override support
    ///
    /// Loading order:
    /// 1. Load from the explicit path, or the first config.toml found
    /// 2. Override with environment variables (prefixed with APP_)
    /// 3. Validate the final configuration
    pub fn load(explicit_path: Option<&str>) -> Result<Self, anyhow::Error> {
        let mut config = match explicit_path.map(str::to_string).or_else(Self::find_config_file) {
            Some(config_path) => Self::from_toml(&config_path)?,
            None => {
                tracing::warn!("Configuration file not found, using defaults");
                Config::default()
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - APP_SERVER_HOST: Server host (default: 0.0.0.0)
    /// - APP_SERVER_PORT: Server port (default: 8000)
    /// - APP_DATABASE_URL: Database URL (default: sqlite://data/qstorm.db)
    /// - APP_JWT_SECRET: JWT secret key
    /// - APP_JWT_EXPIRES_IN: JWT expiration time (e.g., "60m")
    /// - APP_LOG_LEVEL: Logging level (e.g., "info,qstorm_backend=debug")
    /// - APP_STORAGE_DIR: Upload storage root
    /// - APP_CORS_ORIGINS: Comma separated list of allowed origins
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
            tracing::info!("Override server.port from env: {}", self.server.port);
        }

        if let Ok(db_url) = std::env::var("APP_DATABASE_URL") {
            self.database.url = db_url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(secret) = std::env::var("APP_JWT_SECRET") {
            self.auth.jwt_secret = secret;
            tracing::info!("Override auth.jwt_secret from env");
        }

        if let Ok(expires) = std::env::var("APP_JWT_EXPIRES_IN") {
            self.auth.jwt_expires_in = expires;
            tracing::info!("Override auth.jwt_expires_in from env: {}", self.auth.jwt_expires_in);
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }

        if let Ok(dir) = std::env::var("APP_STORAGE_DIR") {
            self.storage.dir = dir;
            tracing::info!("Override storage.dir from env: {}", self.storage.dir);
        }

        if let Ok(origins) = std::env::var("APP_CORS_ORIGINS") {
            self.cors.origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            tracing::info!("Override cors.origins from env: {:?}", self.cors.origins);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.auth.jwt_secret == "dev-secret-key-change-in-production" {
            tracing::warn!("⚠️  WARNING: Using default JWT secret!");
            tracing::warn!(
                "⚠️  Please set APP_JWT_SECRET environment variable or update config.toml"
            );
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.storage.dir.trim().is_empty() {
            anyhow::bail!("storage.dir cannot be empty");
        }

        if let Err(e) = parse_duration_to_secs(&self.auth.jwt_expires_in) {
            anyhow::bail!("Invalid auth.jwt_expires_in '{}': {}", self.auth.jwt_expires_in, e);
        }

        if self.analysis.default_bins == 0 {
            anyhow::bail!("analysis.default_bins must be > 0");
        }
        if self.analysis.max_bins < self.analysis.default_bins {
            anyhow::bail!(
                "analysis.max_bins ({}) must be >= analysis.default_bins ({})",
                self.analysis.max_bins,
                self.analysis.default_bins
            );
        }
        if self.analysis.categories.is_empty() {
            anyhow::bail!("analysis.categories must not be empty");
        }

        Ok(())
    }

    /// Token lifetime in seconds (validated at load time)
    pub fn token_ttl_secs(&self) -> u64 {
        parse_duration_to_secs(&self.auth.jwt_expires_in).unwrap_or(3600)
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

impl AnalysisConfig {
    pub fn column_candidates(&self) -> ColumnCandidates {
        ColumnCandidates {
            date: self.date_candidates.clone(),
            store: self.store_candidates.clone(),
        }
    }

    pub fn bin_limits(&self) -> BinLimits {
        BinLimits { default: self.default_bins, max: self.max_bins }
    }

    pub fn pareto_categories(&self) -> ParetoCategories {
        ParetoCategories::new(
            self.categories
                .iter()
                .map(|c| ParetoCategory {
                    column: c.column.clone(),
                    display_name: c.display_name.clone(),
                })
                .collect(),
        )
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8000 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/qstorm.db".to_string() }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret-key-change-in-production".to_string(),
            jwt_expires_in: "60m".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,qstorm_backend=debug".to_string(),
            file: Some("logs/qstorm-backend.log".to_string()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { dir: "storage".to_string() }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { origins: vec!["http://localhost:5173".to_string()] }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let candidates = ColumnCandidates::default();
        Self {
            date_candidates: candidates.date,
            store_candidates: candidates.store,
            default_bins: 20,
            max_bins: 1000,
            categories: ParetoCategories::default()
                .iter()
                .map(|c| CategoryConfig {
                    column: c.column.clone(),
                    display_name: c.display_name.clone(),
                })
                .collect(),
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration_to_secs("90").unwrap(), 90);
        assert_eq!(parse_duration_to_secs("60m").unwrap(), 3600);
        assert_eq!(parse_duration_to_secs("2h").unwrap(), 7200);
        assert_eq!(parse_duration_to_secs("1d").unwrap(), 86400);
        assert!(parse_duration_to_secs("10y").is_err());
        assert!(parse_duration_to_secs("m").is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl_secs(), 3600);
        assert_eq!(config.analysis.categories.len(), 8);
        assert_eq!(config.analysis.date_candidates[0], "Date");
    }

    #[test]
    fn test_analysis_section_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [analysis]
            date_candidates = ["day"]
            default_bins = 10

            [[analysis.categories]]
            column = "Tea"
            display_name = "Green tea"

            [[analysis.categories]]
            column = "Coffee"
            "#,
        )
        .unwrap();

        assert_eq!(config.analysis.date_candidates, vec!["day".to_string()]);
        // Unset lists keep their defaults
        assert_eq!(config.analysis.store_candidates[0], "shop");
        assert_eq!(config.analysis.default_bins, 10);

        let categories = config.analysis.pareto_categories();
        assert_eq!(categories.display_name_for("Tea"), "Green tea");
        assert_eq!(categories.display_name_for("Coffee"), "Coffee");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_bins_rejected() {
        let mut config = Config::default();
        config.analysis.default_bins = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_bins_below_default_rejected() {
        let mut config = Config::default();
        assert_eq!(config.analysis.bin_limits().max, 1000);

        config.analysis.max_bins = 10;
        assert!(config.validate().is_err());
        config.analysis.default_bins = 10;
        assert!(config.validate().is_ok());
    }
}
