//! Task group owning the monitoring loops.
//!
//! Loops are never restarted. The supervisor only makes their termination
//! visible: each exit is logged with its cause, and [`Supervisor::wait`]
//! returns once nothing is left running.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopKind {
    Connectivity,
    Speed,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Connectivity => write!(f, "connectivity"),
            LoopKind::Speed => write!(f, "speed"),
        }
    }
}

/// Why a loop stopped.
#[derive(Debug)]
pub enum LoopExit {
    /// A write to the result store failed.
    Failed(StorageError),
    Panicked(String),
    /// The loop future completed without an error.
    Returned,
}

impl fmt::Display for LoopExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopExit::Failed(e) => write!(f, "storage error: {e}"),
            LoopExit::Panicked(msg) => write!(f, "panicked: {msg}"),
            LoopExit::Returned => write!(f, "returned"),
        }
    }
}

#[derive(Default)]
pub struct Supervisor {
    tasks: JoinSet<(LoopKind, LoopExit)>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `fut` as an independent task.
    pub fn spawn<F>(&mut self, kind: LoopKind, fut: F)
    where
        F: Future<Output = Result<(), StorageError>> + Send + 'static,
    {
        self.tasks.spawn(async move {
            let exit = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(())) => LoopExit::Returned,
                Ok(Err(e)) => LoopExit::Failed(e),
                Err(payload) => LoopExit::Panicked(panic_message(payload.as_ref())),
            };
            (kind, exit)
        });
        info!(task = %kind, "Monitoring loop spawned");
    }

    /// Number of loops still running.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait until every loop has stopped, logging each exit as it happens.
    pub async fn wait(&mut self) -> Vec<(LoopKind, LoopExit)> {
        let mut exits = Vec::new();

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((kind, exit)) => {
                    error!(
                        task = %kind,
                        reason = %exit,
                        remaining = self.tasks.len(),
                        "Monitoring loop terminated and will not be restarted"
                    );
                    exits.push((kind, exit));
                }
                Err(e) => error!(error = %e, "Monitoring task could not be joined"),
            }
        }

        exits
    }

    /// Abort every loop and wait for the tasks to unwind.
    pub async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn fail_write() -> Result<(), StorageError> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    async fn explode() -> Result<(), StorageError> {
        panic!("speed loop blew up")
    }

    async fn sleep_forever() -> Result<(), StorageError> {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
    }

    #[tokio::test]
    async fn test_reports_each_exit() {
        let mut sup = Supervisor::new();
        sup.spawn(LoopKind::Connectivity, fail_write());
        sup.spawn(LoopKind::Speed, explode());
        assert_eq!(sup.len(), 2);

        let mut exits = sup.wait().await;
        exits.sort_by_key(|(kind, _)| *kind == LoopKind::Speed);

        assert!(sup.is_empty());
        assert_eq!(exits.len(), 2);
        assert!(matches!(exits[0], (LoopKind::Connectivity, LoopExit::Failed(_))));
        match &exits[1] {
            (LoopKind::Speed, LoopExit::Panicked(msg)) => assert_eq!(msg, "speed loop blew up"),
            other => panic!("unexpected exit: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_surviving_loop_keeps_running() {
        let mut sup = Supervisor::new();
        sup.spawn(LoopKind::Connectivity, fail_write());
        sup.spawn(LoopKind::Speed, sleep_forever());

        let waited = tokio::time::timeout(Duration::from_secs(600), sup.wait()).await;
        assert!(waited.is_err(), "wait must not return while a loop is alive");
        assert_eq!(sup.len(), 1);

        sup.shutdown().await;
        assert!(sup.is_empty());
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(LoopExit::Returned.to_string(), "returned");
        assert_eq!(
            LoopExit::Panicked("boom".into()).to_string(),
            "panicked: boom"
        );
        assert_eq!(LoopKind::Speed.to_string(), "speed");
    }
}
