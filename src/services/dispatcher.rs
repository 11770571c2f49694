//! Scheduled continuations ("sleep, then continue") carrying a game identifier.

use std::{fmt, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::ServiceError;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Unit of orchestration work scheduled for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    /// Move a pending game to in-progress if it is still pending.
    StartGame(Uuid),
    /// Open the next round of an in-progress game.
    DoRound(Uuid),
}

impl Task {
    pub fn game_id(&self) -> Uuid {
        match self {
            Task::StartGame(id) | Task::DoRound(id) => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::StartGame(_) => "start_game",
            Task::DoRound(_) => "do_round",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.game_id())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("task queue is closed")]
    Closed,
}

/// Fire-and-forget scheduling. Delivery is at least once; handlers must re-check
/// their preconditions.
pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: Task, delay: Duration) -> Result<(), DispatchError>;
}

/// Executes a task when it comes due.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: Task) -> BoxFuture<'static, Result<(), ServiceError>>;
}

struct Scheduled {
    task: Task,
    delay: Duration,
}

/// In-process dispatcher backed by a tokio channel.
#[derive(Clone)]
pub struct TokioDispatcher {
    tx: mpsc::UnboundedSender<Scheduled>,
}

/// Receiving half of a [`TokioDispatcher`], drained by [`TaskQueue::run`].
pub struct TaskQueue {
    rx: mpsc::UnboundedReceiver<Scheduled>,
}

impl TokioDispatcher {
    /// Build a dispatcher and the queue that must be run for tasks to execute.
    pub fn new() -> (Self, TaskQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, TaskQueue { rx })
    }
}

impl TaskDispatcher for TokioDispatcher {
    fn dispatch(&self, task: Task, delay: Duration) -> Result<(), DispatchError> {
        debug!(%task, delay_ms = delay.as_millis() as u64, "scheduling task");
        self.tx
            .send(Scheduled { task, delay })
            .map_err(|_| DispatchError::Closed)
    }
}

impl TaskQueue {
    /// Spawn every scheduled task until all dispatchers are dropped.
    pub async fn run(mut self, handler: Arc<dyn TaskHandler>) {
        while let Some(Scheduled { task, delay }) = self.rx.recv().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                run_with_retry(handler.as_ref(), task).await;
            });
        }
        debug!("task queue closed");
    }
}

/// Run `task`, re-running it with exponential backoff when it fails.
async fn run_with_retry(handler: &dyn TaskHandler, task: Task) {
    let mut backoff = INITIAL_BACKOFF;
    for attempt in 1..=MAX_ATTEMPTS {
        match handler.handle(task).await {
            Ok(()) => return,
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(%task, attempt, error = %err, "task failed; retrying");
                sleep(backoff).await;
                backoff *= 2;
            }
            Err(err) => {
                error!(%task, attempt, error = %err, "task failed; giving up");
            }
        }
    }
}
