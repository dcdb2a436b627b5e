//! Natural-language UI test recording and replay.
//!
//! The [`recording::Recorder`] drives an external browser agent through a
//! task and stores each completed step as a [`recording::TestCase`]. The
//! [`replay::ReplayEngine`] re-drives those steps later, relocating drifted
//! elements from their recorded fingerprints and asking the agent to correct
//! steps it can no longer execute as recorded.

pub mod agent;
pub mod config;
pub mod error;
pub mod recording;
pub mod replay;
pub mod skills;

pub use error::{Result, RetraceError};
