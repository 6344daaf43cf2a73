use dotenvy::dotenv;
use eyre::{Result, WrapErr, eyre};
use std::env;
use std::str::FromStr;
use std::sync::Arc;

use crate::meta::diagnostics::DiagnosticThresholds;
use crate::meta::meta_constants::DEFAULT_MIN_SAMPLE_SIZE;
use crate::meta::proposal_generator::ProposalThresholds;
use crate::meta::risk_limits::{DefaultRiskLimits, RiskLimitSource, StaticRiskLimits};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub dry_run: bool,
    pub min_sample_size: usize,
    pub diagnostic_thresholds: DiagnosticThresholds,
    pub proposal_thresholds: ProposalThresholds,
    pub risk_limits_file: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, applying defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let diagnostic_defaults = DiagnosticThresholds::default();
        let proposal_defaults = ProposalThresholds::default();

        Ok(Config {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            dry_run: parse_bool(&lookup, "TUNER_DRY_RUN")?,
            min_sample_size: parse_or(&lookup, "MIN_SAMPLE_SIZE", DEFAULT_MIN_SAMPLE_SIZE)?,
            diagnostic_thresholds: DiagnosticThresholds {
                min_sharpe: parse_or(&lookup, "MIN_SHARPE_THRESHOLD", diagnostic_defaults.min_sharpe)?,
                max_volatility: parse_or(&lookup, "MAX_VOLATILITY_THRESHOLD", diagnostic_defaults.max_volatility)?,
                max_drawdown: parse_or(&lookup, "MAX_DRAWDOWN_THRESHOLD", diagnostic_defaults.max_drawdown)?,
            },
            proposal_thresholds: ProposalThresholds {
                min_confidence: parse_or(&lookup, "MIN_CONFIDENCE_THRESHOLD", proposal_defaults.min_confidence)?,
                min_sharpe_improvement: parse_or(
                    &lookup,
                    "MIN_SHARPE_IMPROVEMENT",
                    proposal_defaults.min_sharpe_improvement,
                )?,
            },
            risk_limits_file: lookup("RISK_LIMITS_FILE").filter(|path| !path.is_empty()),
        })
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| eyre!("Missing DATABASE_URL"))
    }

    pub fn risk_limit_source(&self) -> Result<Arc<dyn RiskLimitSource>> {
        match &self.risk_limits_file {
            Some(path) => Ok(Arc::new(StaticRiskLimits::from_file(path)?)),
            None => Ok(Arc::new(DefaultRiskLimits::default())),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .wrap_err_with(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|raw| raw.trim().to_lowercase()) {
        None => Ok(false),
        Some(raw) => match raw.as_str() {
            "" | "false" | "0" | "no" => Ok(false),
            "true" | "1" | "yes" => Ok(true),
            _ => Err(eyre!("Invalid value for {}: {:?}", key, raw)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.max_connections, 5);
        assert!(!cfg.dry_run);
        assert_eq!(cfg.min_sample_size, 5);
        assert_eq!(cfg.diagnostic_thresholds, DiagnosticThresholds::default());
        assert_eq!(cfg.proposal_thresholds, ProposalThresholds::default());
        assert!(cfg.database_url().is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config_from(&[
            ("DATABASE_URL", "postgres://localhost/tuner"),
            ("TUNER_DRY_RUN", "true"),
            ("MIN_SAMPLE_SIZE", "8"),
            ("MAX_DRAWDOWN_THRESHOLD", "-0.1"),
            ("MIN_SHARPE_IMPROVEMENT", " 0.25 "),
        ])
        .unwrap();
        assert!(cfg.dry_run);
        assert_eq!(cfg.min_sample_size, 8);
        assert_eq!(cfg.diagnostic_thresholds.max_drawdown, -0.1);
        assert_eq!(cfg.proposal_thresholds.min_sharpe_improvement, 0.25);
        assert_eq!(cfg.database_url().unwrap(), "postgres://localhost/tuner");
    }

    #[test]
    fn malformed_numbers_fail() {
        let err = config_from(&[("MIN_SAMPLE_SIZE", "five")]).unwrap_err();
        assert!(err.to_string().contains("MIN_SAMPLE_SIZE"));
        assert!(config_from(&[("TUNER_DRY_RUN", "maybe")]).is_err());
    }
}
