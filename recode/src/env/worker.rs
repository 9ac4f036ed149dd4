//! Async worker that owns the environment, plus the handle fragments call through.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::env::{EnvError, Environment};
use crate::fragment::{Primitive, PrimitiveError};

const REQUEST_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvStatus {
    pub done: bool,
    pub success: bool,
}

enum Request {
    Act {
        action: String,
        reply: oneshot::Sender<Result<String, EnvError>>,
    },
    Status {
        reply: oneshot::Sender<EnvStatus>,
    },
}

/// Spawns the task that serializes all access to one environment.
pub struct EnvWorker;

impl EnvWorker {
    /// Start the worker on the current tokio runtime. The task ends, returning
    /// the environment, once every handle has been dropped.
    pub fn spawn(env: Box<dyn Environment>) -> (EnvHandle, JoinHandle<Box<dyn Environment>>) {
        let (tx, mut rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(async move {
            let mut env = env;
            while let Some(request) = rx.recv().await {
                match request {
                    Request::Act { action, reply } => {
                        let result = env.run_action(&action).await;
                        debug!(action = %action, ok = result.is_ok(), "environment action");
                        let _ = reply.send(result);
                    }
                    Request::Status { reply } => {
                        let _ = reply.send(EnvStatus {
                            done: env.is_done(),
                            success: env.is_success(),
                        });
                    }
                }
            }
            env
        });
        (EnvHandle { tx }, task)
    }
}

#[derive(Debug, Clone)]
pub struct EnvHandle {
    tx: mpsc::Sender<Request>,
}

impl EnvHandle {
    /// Perform an action from a blocking thread. Must not be called from async code.
    pub fn perform_blocking(&self, action: &str) -> Result<String, EnvError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(Request::Act {
                action: action.to_string(),
                reply,
            })
            .map_err(|_| EnvError::Closed)?;
        rx.blocking_recv().map_err(|_| EnvError::Closed)?
    }

    pub async fn run_action(&self, action: &str) -> Result<String, EnvError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Act {
                action: action.to_string(),
                reply,
            })
            .await
            .map_err(|_| EnvError::Closed)?;
        rx.await.map_err(|_| EnvError::Closed)?
    }

    pub async fn status(&self) -> Result<EnvStatus, EnvError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Status { reply })
            .await
            .map_err(|_| EnvError::Closed)?;
        rx.await.map_err(|_| EnvError::Closed)
    }
}

impl Primitive for EnvHandle {
    fn perform(&mut self, action: &str) -> Result<String, PrimitiveError> {
        self.perform_blocking(action)
            .map_err(|err| PrimitiveError::new(err.kind(), err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ScriptedWorld, WorldSpec};

    fn world() -> Box<dyn Environment> {
        let spec = WorldSpec::parse(
            r#"
name = "household"
task_type = "put"
initial = "You are in a room.\nYour task is to: look around."
max_steps = 2

[[transitions]]
action = "look"
observation = "You see a desk 1."
success = true
"#,
        )
        .expect("spec");
        Box::new(ScriptedWorld::new(spec))
    }

    #[tokio::test]
    async fn async_perform_and_status() {
        let (handle, task) = EnvWorker::spawn(world());
        assert_eq!(handle.run_action("look").await.expect("look"), "You see a desk 1.");
        assert_eq!(
            handle.status().await.expect("status"),
            EnvStatus {
                done: true,
                success: true
            }
        );
        drop(handle);
        let env = task.await.expect("join");
        assert!(env.is_success());
    }

    /// Blocking calls from `spawn_blocking` reach the async worker.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn blocking_primitive_maps_errors() {
        let (handle, _task) = EnvWorker::spawn(world());
        let mut primitive = handle.clone();
        let results = tokio::task::spawn_blocking(move || {
            let first = primitive.perform("wait");
            let second = primitive.perform("wait");
            let third = primitive.perform("wait");
            (first, second, third)
        })
        .await
        .expect("join");
        assert_eq!(results.0, Ok("Nothing happens.".to_string()));
        assert!(results.1.is_ok());
        assert_eq!(
            results.2,
            Err(PrimitiveError::new("StepLimitError", "Step limit of 2 exceeded."))
        );
    }
}
