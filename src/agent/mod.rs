//! Boundary to the external browser-driving agent.

pub mod runtime;
pub mod types;

pub use runtime::{BrowserAgent, RecordingAgent, StepObserver};
pub use types::*;
