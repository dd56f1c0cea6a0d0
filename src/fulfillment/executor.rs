//! Runs a [`FulfillmentCommand`] as a child process.
//!
//! The `FulfillmentExecutor` trait keeps the dispatcher testable without a
//! robot attached.

use std::process::Command;

use thiserror::Error;

use super::command::FulfillmentCommand;

/// Why a fulfillment attempt did not succeed.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executable '{0}' not found")]
    NotFound(String),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}")]
    Exit { program: String, status: String },

    #[error("executor task failed: {0}")]
    Join(String),
}

/// Performs the physical action described by a command.
///
/// Object-safe, `Send + Sync` so the dispatcher can run it on the blocking
/// pool.  Only success or failure is reported.
pub trait FulfillmentExecutor: Send + Sync {
    fn execute(&self, command: &FulfillmentCommand) -> Result<(), ExecutorError>;
}

/// Runs the executable with inherited stdio and environment and waits for
/// it to exit.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl FulfillmentExecutor for ProcessExecutor {
    fn execute(&self, command: &FulfillmentCommand) -> Result<(), ExecutorError> {
        let program = command.executable.as_str();
        log::info!("executor: {program} {}", command.to_args().join(" "));

        let status = Command::new(program)
            .args(command.to_args())
            .status()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecutorError::NotFound(program.to_string())
                } else {
                    ExecutorError::Spawn {
                        program: program.to_string(),
                        source: e,
                    }
                }
            })?;

        if !status.success() {
            return Err(ExecutorError::Exit {
                program: program.to_string(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test double
// ---------------------------------------------------------------------------

/// Records every command it receives; fails for the configured orders.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingExecutor {
    pub commands: std::sync::Mutex<Vec<FulfillmentCommand>>,
    pub fail_tasks: Vec<String>,
}

#[cfg(test)]
impl RecordingExecutor {
    pub fn failing_for(tasks: &[&str]) -> Self {
        Self {
            commands: Default::default(),
            fail_tasks: tasks.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn commands(&self) -> Vec<FulfillmentCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl FulfillmentExecutor for RecordingExecutor {
    fn execute(&self, command: &FulfillmentCommand) -> Result<(), ExecutorError> {
        self.commands.lock().unwrap().push(command.clone());
        if self.fail_tasks.contains(&command.task) {
            return Err(ExecutorError::Exit {
                program: command.executable.clone(),
                status: "exit status: 1".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
