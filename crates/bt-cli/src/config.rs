//! Configuration loading and management.

use std::path::{Path, PathBuf};

use bt_core::FailurePolicy;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// What to do with observations that fail validation.
    pub failure_policy: FailurePolicy,
    /// Default sampling step for kappa and alignment, in seconds.
    pub kappa_interval: Decimal,
    /// Keep modifiers apart by default.
    pub include_modifiers: bool,
    /// Leave out zero-overlap co-occurrence rows by default.
    pub hide_zero_cooccurrence: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Skip,
            kappa_interval: Decimal::ONE,
            include_modifiers: false,
            hide_zero_cooccurrence: false,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // BT_FAILURE_POLICY, BT_KAPPA_INTERVAL, ...
        figment = figment.merge(Env::prefixed("BT_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for bt.
///
/// On Linux: `~/.config/bt`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn config_dir_ends_with_bt() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "bt");
    }

    #[test]
    fn defaults_without_any_file() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from(None)?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_override() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "bt.toml",
                r#"
                failure_policy = "annotate"
                kappa_interval = "0.5"
                "#,
            )?;
            jail.set_env("BT_HIDE_ZERO_COOCCURRENCE", "true");

            let config = Config::load_from(Some(Path::new("bt.toml")))?;
            assert_eq!(config.failure_policy, FailurePolicy::Annotate);
            assert_eq!(config.kappa_interval, dec!(0.5));
            assert!(config.hide_zero_cooccurrence);
            assert!(!config.include_modifiers);
            Ok(())
        });
    }
}
