use config::{Config, Environment, File};
use scanner_core::{Result, ScannerConfig, ScannerError};
use std::path::{Path, PathBuf};
use tracing::info;

const ENV_PREFIX: &str = "SETUP_SCANNER";
const ENV_SEPARATOR: &str = "__";
/// Fewer candles than this can never produce an assessment.
const MIN_CANDLE_LIMIT: usize = 10;

pub struct ConfigManager {
    path: Option<PathBuf>,
    scanner_config: ScannerConfig,
}

impl ConfigManager {
    pub fn new() -> Result<Self> {
        Self::from_file("config.yaml")
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let scanner_config = load(Some(&path))?;

        info!("Configuration loaded from {}", path.display());

        Ok(Self {
            path: Some(path),
            scanner_config,
        })
    }

    pub fn from_env() -> Result<Self> {
        let scanner_config = load(None)?;

        info!("Configuration loaded from environment");

        Ok(Self {
            path: None,
            scanner_config,
        })
    }

    /// Wraps an already-built configuration, e.g. defaults when no file is given.
    pub fn from_config(scanner_config: ScannerConfig) -> Self {
        Self {
            path: None,
            scanner_config,
        }
    }

    pub fn get_config(&self) -> &ScannerConfig {
        &self.scanner_config
    }

    pub fn get_config_mut(&mut self) -> &mut ScannerConfig {
        &mut self.scanner_config
    }

    /// Re-reads the file and environment. The current configuration is kept
    /// if loading fails.
    pub fn reload(&mut self) -> Result<()> {
        self.scanner_config = load(self.path.as_deref())?;

        info!("Configuration reloaded");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate(&self.scanner_config)?;

        info!("Configuration validation passed");
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.scanner_config)
            .map_err(|e| ScannerError::Configuration(e.to_string()))?;

        std::fs::write(path.as_ref(), yaml)
            .map_err(|e| ScannerError::Configuration(e.to_string()))?;

        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}

fn load(path: Option<&Path>) -> Result<ScannerConfig> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ScannerError::Configuration(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ScannerError::Configuration(e.to_string()))
}

pub fn validate(config: &ScannerConfig) -> Result<()> {
    let analysis = &config.analysis;
    let refresh = &config.refresh;

    let rsi_bands = [
        ("rsi_long_confirm_below", analysis.rsi_long_confirm_below),
        ("rsi_long_conflict_above", analysis.rsi_long_conflict_above),
        ("rsi_short_confirm_above", analysis.rsi_short_confirm_above),
        ("rsi_short_conflict_below", analysis.rsi_short_conflict_below),
        ("rsi_oversold", analysis.rsi_oversold),
        ("rsi_overbought", analysis.rsi_overbought),
    ];
    for (name, value) in rsi_bands {
        if !(0.0..=100.0).contains(&value) {
            return Err(invalid(format!("{name} must be within 0..=100, got {value}")));
        }
    }

    let positive = [
        ("level_proximity_pct", analysis.level_proximity_pct),
        ("min_risk_reward", analysis.min_risk_reward),
        ("atr_stop_multiplier", analysis.atr_stop_multiplier),
        ("fallback_risk_reward", analysis.fallback_risk_reward),
    ];
    for (name, value) in positive {
        if !(value.is_finite() && value > 0.0) {
            return Err(invalid(format!("{name} must be positive, got {value}")));
        }
    }

    let non_negative = [
        ("min_volume_24h", analysis.min_volume_24h),
        ("level_buffer_pct", analysis.level_buffer_pct),
        ("liquidity_volume_24h", analysis.liquidity_volume_24h),
    ];
    for (name, value) in non_negative {
        if !(value.is_finite() && value >= 0.0) {
            return Err(invalid(format!("{name} must not be negative, got {value}")));
        }
    }

    if refresh.max_concurrent_instruments == 0 {
        return Err(invalid("max_concurrent_instruments must be at least 1".to_string()));
    }
    if refresh.fetch_timeout_ms == 0 {
        return Err(invalid("fetch_timeout_ms must be positive".to_string()));
    }
    if refresh.interval_secs == 0 {
        return Err(invalid("interval_secs must be positive".to_string()));
    }
    if refresh.candle_limit < MIN_CANDLE_LIMIT {
        return Err(invalid(format!(
            "candle_limit must be at least {MIN_CANDLE_LIMIT}, got {}",
            refresh.candle_limit
        )));
    }

    if config.instruments.iter().any(|i| i.trim().is_empty()) {
        return Err(invalid("Instrument ids must not be blank".to_string()));
    }

    Ok(())
}

fn invalid(reason: String) -> ScannerError {
    ScannerError::Configuration(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::Timeframe;

    const YAML: &str = r#"
instruments:
  - BTC-PERP
  - ETH-PERP
analysis:
  level_proximity_pct: 2.0
  min_volume_24h: 250000
refresh:
  max_concurrent_instruments: 4
  timeframe: 4h
"#;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&ScannerConfig::default()).is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.yaml");
        std::fs::write(&path, YAML).unwrap();

        let manager = ConfigManager::from_file(&path).unwrap();
        let config = manager.get_config();

        assert_eq!(config.instruments, vec!["BTC-PERP", "ETH-PERP"]);
        assert_eq!(config.analysis.level_proximity_pct, 2.0);
        assert_eq!(config.analysis.min_volume_24h, 250_000.0);
        assert_eq!(config.analysis.rsi_long_confirm_below, 35.0);
        assert_eq!(config.refresh.max_concurrent_instruments, 4);
        assert_eq!(config.refresh.timeframe, Timeframe::FourHours);
        assert_eq!(config.refresh.candle_limit, 100);
        assert!(manager.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigManager::from_file(dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ScannerError::Configuration(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scanner.yaml");
        std::fs::write(&path, YAML).unwrap();

        let mut manager = ConfigManager::from_file(&path).unwrap();
        manager.get_config_mut().refresh.fetch_timeout_ms = 750;
        manager.save_to_file(&path).unwrap();

        manager.get_config_mut().refresh.fetch_timeout_ms = 1;
        manager.reload().unwrap();

        assert_eq!(manager.get_config().refresh.fetch_timeout_ms, 750);
        assert_eq!(manager.get_config().refresh.timeframe, Timeframe::FourHours);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ScannerConfig::default();
        config.refresh.max_concurrent_instruments = 0;
        assert!(validate(&config).is_err());

        let mut config = ScannerConfig::default();
        config.analysis.level_proximity_pct = 0.0;
        assert!(validate(&config).is_err());

        let mut config = ScannerConfig::default();
        config.analysis.rsi_overbought = 120.0;
        assert!(validate(&config).is_err());

        let mut config = ScannerConfig::default();
        config.refresh.candle_limit = 5;
        assert!(validate(&config).is_err());

        let mut config = ScannerConfig::default();
        config.instruments = vec![" ".to_string()];
        assert!(validate(&config).is_err());
    }
}
