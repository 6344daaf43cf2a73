pub mod applicator;
pub mod config_value;
pub mod diagnostics;
pub mod memory_store;
pub mod meta_constants;
pub mod performance;
pub mod proposal_generator;
pub mod risk_limits;
pub mod store;
pub mod types;
