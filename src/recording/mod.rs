//! Recording module: capture agent runs as replayable test cases.

pub mod manager;
pub mod schema;
pub mod session;

pub use manager::TestCaseStore;
pub use schema::{ActionType, ElementFingerprint, RecordedAction, TestCase, TestCaseMetadata};
pub use session::{
    extract_url_from_prompt, RecordRequest, Recorder, RecordingResult, RecordingSession,
    RecordingState,
};
