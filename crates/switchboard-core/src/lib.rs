pub mod breadcrumbs;
pub mod config;
pub mod error;
pub mod handler;
pub mod io;
pub mod learning;
pub mod paths;
pub mod rotation;
pub mod signal;
pub mod switchboard;
pub mod types;

pub use error::{Result, SwitchboardError};
pub use switchboard::{ExecutionResult, Switchboard};
pub use types::{DecisionAction, Phase, Priority};
