use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Product ids to trade (e.g., ["BTC-USD", "ETH-USD"])
    pub products: Vec<String>,
    /// Fiat settlement currency (e.g., "USD")
    pub fiat_currency: String,
    /// Place real orders; false keeps the engine in simulate mode
    #[serde(default)]
    pub live: bool,
    /// Prefer immediate market orders over the adaptive limit-order loop
    #[serde(default)]
    pub market_orders: bool,
    /// Maximum tolerated slippage, in percent (e.g., 0.10 = 0.10%)
    #[serde(default = "default_max_slippage")]
    pub max_slippage_pct: Decimal,
    /// Exchange fee rate per leg, used in break-even projections
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_max_slippage() -> Decimal {
    Decimal::new(10, 2) // 0.10%
}

fn default_fee_rate() -> Decimal {
    Decimal::new(5, 3) // 0.5% per leg
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    /// Cooperative polling tick for the executor and monitor loops (ms)
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Minimum spacing between network refreshes per resource (ms)
    #[serde(default = "default_refresh_ms")]
    pub refresh_interval_ms: u64,
}

fn default_tick_ms() -> u64 {
    10
}

fn default_refresh_ms() -> u64 {
    1000
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            refresh_interval_ms: default_refresh_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("execution.tick_ms", 10)?
            .set_default("execution.refresh_interval_ms", 1000)?
            .set_default("engine.live", false)?
            .set_default("engine.market_orders", false)?
            .set_default("engine.max_slippage_pct", "0.10")?
            .set_default("engine.fee_rate", "0.005")?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("COINBOT_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (COINBOT_ENGINE__FIAT_CURRENCY, etc.)
            .add_source(
                Environment::with_prefix("COINBOT")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(products: &[&str], fiat: &str) -> Self {
        Self {
            engine: EngineConfig {
                products: products.iter().map(|p| p.to_string()).collect(),
                fiat_currency: fiat.to_string(),
                live: false,
                market_orders: false,
                max_slippage_pct: default_max_slippage(),
                fee_rate: default_fee_rate(),
            },
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
