pub mod backtest_runs;
pub mod config_change_log;
pub mod config_proposals;
pub mod strategy_configs;
