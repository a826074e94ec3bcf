//! Config file loading.

use std::path::{Path, PathBuf};

use replaylab_core::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config '{path}': {source}")]
    Invalid {
        path: PathBuf,
        source: replaylab_core::ConfigError,
    },
}

/// Read and validate an engine config from a TOML file.
pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml_str(&text).map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use replaylab_core::config::{AlternateModel, StrategyFamily};
    use std::io::Write;

    #[test]
    fn loads_partial_toml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
strategy_family = "session"
starting_balance = 25000.0

[alternate]
signal_model = "opening_range"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.strategy_family, StrategyFamily::Session);
        assert_eq!(config.starting_balance, 25_000.0);
        let alt = config.alternate.unwrap();
        assert_eq!(alt.signal_model, AlternateModel::OpeningRange);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "risk_per_trade_pct = 2.5").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
