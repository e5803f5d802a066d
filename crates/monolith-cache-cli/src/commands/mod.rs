//! CLI Command Implementations
//!
//! - [`validate`]: Cache configuration validation
//! - [`simulate`]: Synthetic workload driver

mod simulate;
mod validate;

pub use simulate::{SimulateCommand, SimulationReport};
pub use validate::ValidateCommand;
