use crate::agent::types::{
    AgentRunSummary, AgentTask, CandidateElement, Instruction, StepControl, StepObservation,
    StepResult,
};
use async_trait::async_trait;

/// Receives one observation per completed agent step.
#[async_trait]
pub trait StepObserver: Send {
    /// Called after each step. Returning [`StepControl::Stop`] asks the agent
    /// not to dispatch another step.
    async fn on_step_end(&mut self, observation: StepObservation) -> StepControl;
}

/// Agent runtime used while recording: plans and executes a whole task.
#[async_trait]
pub trait RecordingAgent: Send {
    /// Run the task to completion, calling `observer` after every step.
    ///
    /// The observer may fire zero times.
    async fn run(
        &mut self,
        task: &AgentTask,
        observer: &mut dyn StepObserver,
    ) -> Result<AgentRunSummary, String>;
}

/// Agent runtime used while replaying: executes one instruction at a time.
#[async_trait]
pub trait BrowserAgent: Send {
    /// Execute a single instruction against the live page.
    async fn execute(&mut self, instruction: &Instruction) -> Result<StepResult, String>;

    /// Interactable elements on the current page.
    async fn candidates(&mut self) -> Result<Vec<CandidateElement>, String>;
}
