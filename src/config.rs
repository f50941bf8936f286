use rust_decimal::Decimal;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    pub test_before_acquire: bool,
}

/// Stake calculator tuning
#[derive(Debug, Clone)]
pub struct StakeConfig {
    pub base: Decimal,
    pub min: Decimal,
    pub max: Decimal,
    /// Multiplier shift per token wagered on an option
    pub sensitivity: Decimal,
    pub easing: Decimal,
    pub recompute_interval_secs: u64,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub stake: StakeConfig,
    pub log_level: String,
    pub environment: String,
    pub audit_log_dir: PathBuf,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

impl DatabaseConfig {
    /// Create database config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| "DATABASE_URL environment variable is required")?;

        let defaults = Self::default();
        let config = Self {
            url,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            acquire_timeout_secs: env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or(defaults.acquire_timeout_secs),
            idle_timeout_secs: env_parse("DATABASE_IDLE_TIMEOUT_SECS").unwrap_or(defaults.idle_timeout_secs),
            max_lifetime_secs: env_parse("DATABASE_MAX_LIFETIME_SECS").unwrap_or(defaults.max_lifetime_secs),
            test_before_acquire: env_parse("DATABASE_TEST_BEFORE_ACQUIRE")
                .unwrap_or(defaults.test_before_acquire),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
        }

        if self.acquire_timeout_secs == 0 {
            return Err("DATABASE_ACQUIRE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Get idle timeout as Duration
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Get max lifetime as Duration
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/placement_wagers".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
            test_before_acquire: true,
        }
    }
}

impl StakeConfig {
    /// Create stake config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let defaults = Self::default();
        let config = Self {
            base: env_parse("STAKE_BASE").unwrap_or(defaults.base),
            min: env_parse("STAKE_MIN").unwrap_or(defaults.min),
            max: env_parse("STAKE_MAX").unwrap_or(defaults.max),
            sensitivity: env_parse("STAKE_SENSITIVITY").unwrap_or(defaults.sensitivity),
            easing: env_parse("STAKE_EASING").unwrap_or(defaults.easing),
            recompute_interval_secs: env_parse("STAKE_RECOMPUTE_INTERVAL_SECS")
                .unwrap_or(defaults.recompute_interval_secs),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min <= Decimal::ZERO {
            return Err("STAKE_MIN must be greater than 0".to_string());
        }
        if !(self.min <= self.base && self.base <= self.max) {
            return Err(format!(
                "Stake bounds must satisfy min <= base <= max (got {} <= {} <= {})",
                self.min, self.base, self.max
            ));
        }
        if self.sensitivity < Decimal::ZERO {
            return Err("STAKE_SENSITIVITY must not be negative".to_string());
        }
        if self.easing <= Decimal::ZERO || self.easing > Decimal::ONE {
            return Err("STAKE_EASING must be in (0, 1]".to_string());
        }
        if self.recompute_interval_secs == 0 {
            return Err("STAKE_RECOMPUTE_INTERVAL_SECS must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn recompute_interval(&self) -> Duration {
        Duration::from_secs(self.recompute_interval_secs)
    }
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            base: Decimal::new(200, 2),
            min: Decimal::new(105, 2),
            max: Decimal::new(1000, 2),
            sensitivity: Decimal::new(5, 5), // 0.00005
            easing: Decimal::new(2, 1),
            recompute_interval_secs: 5,
        }
    }
}

impl AppConfig {
    /// Create application config from environment variables
    pub fn from_env() -> Result<Self, String> {
        let database = DatabaseConfig::from_env()?;
        let stake = StakeConfig::from_env()?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let audit_log_dir = env::var("AUDIT_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./logs"));

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&log_level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid LOG_LEVEL: {}. Must be one of: {:?}",
                log_level, valid_log_levels
            ));
        }

        // Validate environment
        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&environment.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid ENVIRONMENT: {}. Must be one of: {:?}",
                environment, valid_environments
            ));
        }

        Ok(Self {
            database,
            stake,
            log_level: log_level.to_lowercase(),
            environment: environment.to_lowercase(),
            audit_log_dir,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            stake: StakeConfig::default(),
            log_level: "info".to_string(),
            environment: "development".to_string(),
            audit_log_dir: PathBuf::from("./logs"),
        }
    }
}
