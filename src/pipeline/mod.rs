//! Staged document pipeline.
//!
//! ```text
//! pipe ─▶ read ─▶ validate ─▶ parse ─▶ index ─▶ drain
//!  ▲                            │        │
//!  └──────── resubmit ──────────┴────────┘
//! ```
//!
//! Every stage is its own task processing one record at a time; stages are
//! joined by bounded channels (`queue_capacity`, default 1), so a full
//! downstream stage blocks the one above it. A stage returns a [`Step`]:
//!
//! | Step | Driver action |
//! |------|---------------|
//! | `Continue(record)` | hand to the next stage |
//! | `Drop` | stop; the stage has disposed of the record |
//! | `Resubmit(record)` | re-enter at the front from a detached task |
//!
//! Records that reach the drain are returned to the pool. The index stage
//! only forwards ignored records; persisted ones go through
//! [`Indexer::pipe`] and are released by the indexer.
//!
//! Shutdown cancels every stage. In-flight records are abandoned, not
//! released.

pub mod stages;

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use sitesearch_core::{PathPolicy, Record};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::indexer::Indexer;

/// Outcome of one stage for one record.
#[derive(Debug)]
pub enum Step {
    Continue(Record),
    Drop,
    Resubmit(Record),
}

/// A single pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, record: Record) -> Step;
}

pub struct Pipeline {
    input: mpsc::Sender<Record>,
    indexer: Arc<Indexer>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Pipeline {
    /// The standard read → validate → parse → index pipeline.
    pub fn new(indexer: Arc<Indexer>, policy: PathPolicy, queue_capacity: usize) -> Arc<Self> {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(stages::Read),
            Arc::new(stages::Validate::new(policy)),
            Arc::new(stages::Parse::new(indexer.clone())),
            Arc::new(stages::Index::new(indexer.clone())),
        ];
        Self::with_stages(indexer, stages, queue_capacity)
    }

    /// Wires `stages` in order and spawns one task per stage plus the drain.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_stages(
        indexer: Arc<Indexer>,
        stages: Vec<Arc<dyn Stage>>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let capacity = queue_capacity.max(1);
        let cancel = CancellationToken::new();
        let (input, mut rx) = mpsc::channel::<Record>(capacity);
        let front = input.downgrade();

        let mut tasks = Vec::with_capacity(stages.len() + 1);
        for stage in stages {
            let (tx, next_rx) = mpsc::channel::<Record>(capacity);
            tasks.push(tokio::spawn(run_stage(
                stage,
                rx,
                tx,
                front.clone(),
                indexer.clone(),
                cancel.clone(),
            )));
            rx = next_rx;
        }
        tasks.push(tokio::spawn(drain(rx, indexer.clone(), cancel.clone())));

        debug!(stages = tasks.len() - 1, capacity, "pipeline started");
        Arc::new(Self {
            input,
            indexer,
            cancel,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    /// Submits `record` at the front, waiting only for queue space.
    pub async fn pipe(&self, record: Record) {
        let send = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            sent = self.input.send(record) => Some(sent),
        };
        match send {
            Some(Ok(())) => {}
            Some(Err(mpsc::error::SendError(record))) => self.indexer.kill(record),
            None => trace!("pipeline closed, record abandoned"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stops every stage and waits for their tasks to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            let _ = task.await;
        }
        debug!("pipeline stopped");
    }
}

async fn run_stage(
    stage: Arc<dyn Stage>,
    mut rx: mpsc::Receiver<Record>,
    tx: mpsc::Sender<Record>,
    front: mpsc::WeakSender<Record>,
    indexer: Arc<Indexer>,
    cancel: CancellationToken,
) {
    let name = stage.name();
    trace!(stage = name, "stage starting");
    let mut processed = 0usize;

    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            step = stage.run(record) => step,
        };
        processed += 1;

        match step {
            Step::Continue(record) => {
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(record) => sent,
                };
                if let Err(mpsc::error::SendError(record)) = sent {
                    indexer.kill(record);
                    break;
                }
            }
            Step::Drop => {}
            Step::Resubmit(record) => resubmit(&front, record, &indexer, &cancel),
        }
    }

    trace!(stage = name, processed, "stage stopped");
}

/// Sends `record` back to the front from a detached task, so a stage never
/// waits on its own upstream.
fn resubmit(
    front: &mpsc::WeakSender<Record>,
    record: Record,
    indexer: &Arc<Indexer>,
    cancel: &CancellationToken,
) {
    let Some(front) = front.upgrade() else {
        indexer.kill(record);
        return;
    };
    trace!(path = record.path(), attempt = record.resubmits(), "resubmitting");
    let indexer = indexer.clone();
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {}
            sent = front.send(record) => {
                if let Err(mpsc::error::SendError(record)) = sent {
                    indexer.kill(record);
                }
            }
        }
    });
}

/// Reclaims whatever leaves the last stage.
async fn drain(mut rx: mpsc::Receiver<Record>, indexer: Arc<Indexer>, cancel: CancellationToken) {
    loop {
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(record) => record,
                None => break,
            },
        };
        trace!(path = record.path(), ignored = record.ignored(), "reclaiming");
        indexer.kill(record);
    }
}
