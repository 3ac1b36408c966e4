//! Background delivery of token and credential snapshots to the primary.
//!
//! Mutations never talk to the network themselves. They mark a [`SyncJob`]
//! as pending through a [`SyncHandle`]; a single worker task wakes up, takes
//! every pending kind at once and runs the pushes through [`ProxySyncer`].
//! A pending kind is a flag, not a queue entry, so repeated changes collapse
//! into one push each and a slow primary can never crowd one kind out.
//! Failures are logged and never reach the caller whose mutation triggered
//! the push.

mod proxy;

pub use proxy::{ProxySyncer, SyncError, API_VERSION, CREDS_PATH, TOKENS_PATH};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::manager::UserManager;

/// A snapshot that needs to reach the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncJob {
    Credentials,
    Tokens,
}

/// Push kinds waiting for the worker
#[derive(Debug, Default)]
struct Pending {
    credentials: AtomicBool,
    tokens: AtomicBool,
    wake: Notify,
}

impl Pending {
    fn flag(&self, job: SyncJob) -> &AtomicBool {
        match job {
            SyncJob::Credentials => &self.credentials,
            SyncJob::Tokens => &self.tokens,
        }
    }

    /// Clear and return every pending kind, tokens first
    fn take(&self) -> Vec<SyncJob> {
        [SyncJob::Tokens, SyncJob::Credentials]
            .into_iter()
            .filter(|job| self.flag(*job).swap(false, Ordering::AcqRel))
            .collect()
    }
}

/// Sending side of the sync queue, held by the user manager
#[derive(Debug, Clone)]
pub struct SyncHandle {
    flushes: mpsc::Sender<oneshot::Sender<()>>,
    pending: Arc<Pending>,
}

/// Receiving side of the sync queue, consumed by [`start_sync_worker`]
#[derive(Debug)]
pub struct SyncQueue {
    flushes: mpsc::Receiver<oneshot::Sender<()>>,
    pending: Arc<Pending>,
}

/// Create a sync queue; `capacity` bounds the outstanding flush barriers
pub fn channel(capacity: usize) -> (SyncHandle, SyncQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    let pending = Arc::new(Pending::default());
    (
        SyncHandle {
            flushes: tx,
            pending: Arc::clone(&pending),
        },
        SyncQueue {
            flushes: rx,
            pending,
        },
    )
}

impl SyncHandle {
    /// Mark a push as pending without waiting.
    ///
    /// A kind that is already pending is left as is: the push reads the
    /// state at delivery time and carries this change too.
    pub fn schedule(&self, job: SyncJob) {
        if self.pending.flag(job).swap(true, Ordering::AcqRel) {
            debug!(?job, "Push already pending");
            return;
        }
        self.pending.wake.notify_one();
    }

    /// Wait until every push scheduled before this call has been processed
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.flushes.send(done_tx).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

impl SyncQueue {
    /// Take every pending push without running it
    pub fn drain(&mut self) -> Vec<SyncJob> {
        while let Ok(done) = self.flushes.try_recv() {
            let _ = done.send(());
        }
        self.pending.take()
    }
}

/// Start the worker that delivers pending pushes to the primary
pub fn start_sync_worker(
    manager: Arc<UserManager>,
    syncer: ProxySyncer,
    mut queue: SyncQueue,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut flushes = Vec::new();
            tokio::select! {
                _ = queue.pending.wake.notified() => {}
                barrier = queue.flushes.recv() => match barrier {
                    Some(done) => flushes.push(done),
                    None => break,
                },
            }
            while let Ok(done) = queue.flushes.try_recv() {
                flushes.push(done);
            }

            for job in queue.pending.take() {
                let result = match job {
                    SyncJob::Tokens => syncer.push_tokens(&manager).await,
                    SyncJob::Credentials => syncer.push_credentials(&manager).await,
                };
                if let Err(e) = result {
                    log_push_failure(job, &e);
                }
            }

            for done in flushes {
                let _ = done.send(());
            }
        }

        debug!("Sync worker exiting (queue closed)");
    })
}

fn log_push_failure(job: SyncJob, e: &SyncError) {
    let what = match job {
        SyncJob::Credentials => "credentials list",
        SyncJob::Tokens => "token list",
    };
    match e {
        SyncError::NoPrimary => warn!("Primary proxy is not defined, {what} not sent"),
        _ => error!(error = %e, "Failed to send {what}"),
    }
}
