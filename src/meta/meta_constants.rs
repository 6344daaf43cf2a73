// --- METRIC KEYS (backtest_runs.metrics_json) ---
pub const SHARPE_METRIC: &str = "annualised_sharpe";
pub const RETURN_METRIC: &str = "cumulative_return";
pub const VOLATILITY_METRIC: &str = "annualised_vol";
pub const DRAWDOWN_METRIC: &str = "max_drawdown";
pub const WIN_RATE_METRIC: &str = "win_rate";

/// Neutral win rate reported when no run supplies a measured one
pub const PLACEHOLDER_WIN_RATE: f64 = 0.5;

/// Catch-all regime until runs carry regime labels
pub const ALL_REGIME_ID: &str = "ALL";

// --- DIAGNOSTICS DEFAULTS ---
pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 5;
pub const DEFAULT_MIN_SHARPE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_VOLATILITY_THRESHOLD: f64 = 0.30;
pub const DEFAULT_MAX_DRAWDOWN_THRESHOLD: f64 = -0.20;
pub const MIN_RUNS_PER_COMPARED_VALUE: usize = 2;

// --- CONFIDENCE SCORE ---
pub const CONFIDENCE_FULL_SAMPLE_SIZE: f64 = 20.0; // runs needed for full sample credit
pub const CONFIDENCE_FULL_SHARPE_DELTA: f64 = 0.5; // Sharpe delta needed for full effect credit
pub const CONFIDENCE_SAMPLE_WEIGHT: f64 = 0.4;
pub const CONFIDENCE_EFFECT_WEIGHT: f64 = 0.4;
pub const CONFIDENCE_CONSISTENCY_WEIGHT: f64 = 0.2;
pub const COMPARISON_CONSISTENCY: f64 = 0.7; // assumed for A/B config comparisons

// --- PROPOSAL GENERATION ---
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;
pub const DEFAULT_MIN_SHARPE_IMPROVEMENT: f64 = 0.1;
pub const UNDERPERFORMING_FRACTION: f64 = 0.3;

pub const RISK_REDUCTION_TARGET: &str = "strategy_risk_limits";
pub const RISK_REDUCTION_CONFIDENCE: f64 = 0.5;
pub const RISK_REDUCTION_SHARPE_ESTIMATE: f64 = 0.2;
pub const RISK_REDUCTION_RETURN_ESTIMATE: f64 = 0.0;
pub const RISK_REDUCTION_RISK_ESTIMATE: f64 = 0.05;

pub const RISK_CONSTRAINT_TARGET: &str = "max_position_volatility";
pub const RISK_CONSTRAINT_CONFIDENCE: f64 = 0.6;
pub const RISK_CONSTRAINT_SHARPE_ESTIMATE: f64 = 0.15;
pub const RISK_CONSTRAINT_RETURN_ESTIMATE: f64 = -0.02; // tighter limits may cost some return
pub const RISK_CONSTRAINT_RISK_ESTIMATE: f64 = 0.08;

// --- FALLBACK RISK LIMITS ---
pub const FALLBACK_MAX_VOLATILITY: f64 = 0.25;
pub const FALLBACK_MAX_DRAWDOWN: f64 = -0.15;

// --- APPLICATION ---
pub const DRY_RUN_CHANGE_ID: &str = "DRY_RUN";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_CHANGE_LIST_LIMIT: usize = 50;
