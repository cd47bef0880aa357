//! Agent loop
//!
//! Implements the Elm Architecture pattern: a pure transition function over
//! `AgentState` plus a runner that performs the effects it returns.

mod conversation;
mod effect;
mod event;
mod runner;
mod state;
mod synthesis;
mod transition;

#[cfg(test)]
mod proptests;
#[cfg(test)]
pub(crate) mod testing;

pub use runner::{AgentLoop, RunReport};
pub use state::Outcome;

use std::time::Duration;

/// Budgets and retry policy for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// LLM round trips before `step_limit_exceeded`
    pub max_steps: usize,
    /// Wall-clock budget from `Init`; zero ends the run before any LLM call
    pub timeout: Duration,
    /// Attempts per step, first try included
    pub max_llm_attempts: u32,
    /// First backoff delay, doubled per attempt
    pub retry_base: Duration,
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            timeout: Duration::from_secs(90),
            max_llm_attempts: 3,
            retry_base: Duration::from_secs(1),
            max_tokens: Some(4096),
        }
    }
}
