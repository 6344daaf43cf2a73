use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::meta_constants::{FALLBACK_MAX_DRAWDOWN, FALLBACK_MAX_VOLATILITY};

/// Per-strategy risk limits used as the target of risk-constraint proposals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_volatility: f64,
    pub max_drawdown: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_volatility: FALLBACK_MAX_VOLATILITY,
            max_drawdown: FALLBACK_MAX_DRAWDOWN,
        }
    }
}

pub trait RiskLimitSource: Send + Sync {
    fn get(&self, strategy_id: &str) -> RiskLimits;
}

/// Same limits for every strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRiskLimits {
    pub limits: RiskLimits,
}

impl RiskLimitSource for DefaultRiskLimits {
    fn get(&self, _strategy_id: &str) -> RiskLimits {
        self.limits
    }
}

/// Limits loaded from a JSON document:
/// `{"fallback": {...}, "strategies": {"S1": {...}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticRiskLimits {
    #[serde(default)]
    pub fallback: RiskLimits,
    #[serde(default)]
    pub strategies: HashMap<String, RiskLimits>,
}

impl StaticRiskLimits {
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read risk limits file {}: {}", path.display(), e))?;
        Ok(Self::from_json_str(&raw)?)
    }
}

impl RiskLimitSource for StaticRiskLimits {
    fn get(&self, strategy_id: &str) -> RiskLimits {
        self.strategies.get(strategy_id).copied().unwrap_or(self.fallback)
    }
}
