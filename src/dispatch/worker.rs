//! The Worker Dequeue Interface: a generic cooperative-shutdown pool
//! ("fridge" in the original) that drains `GlobalQueueSet` and invokes the
//! registered protocol handler for each dequeued `Req`.
//!
//! Workers are tokio tasks rather than OS threads. The fridge's contract is
//! unchanged: a worker only honours shutdown at the dequeue suspension
//! point, pool teardown is synchronous (awaits every worker task), and the
//! pool can be sized independently of the event-channel count.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dispatch::queue::GlobalQueueSet;
use crate::dispatch::req::Req;

/// A pool of workers draining a shared `GlobalQueueSet`.
///
/// `handler` is invoked once per dequeued `Req`; its errors are logged and
/// do not take down the worker, matching the original's "a bad request
/// doesn't kill the dispatcher" posture (per-request errors are reported
/// via RPC-level replies inside the handler, not propagated here).
pub struct Fridge {
    queues: Arc<GlobalQueueSet>,
    should_break: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Fridge {
    /// Spawns `count` workers, each looping `dequeue_req` -> `handler` until
    /// told to break.
    ///
    /// `dequeue_timeout` is `rpc.decoder_fridge_block_timeout_s` (§6); it
    /// bounds how long a worker blocks on an empty queue set before
    /// re-checking `should_break`.
    pub fn spawn<F, Fut>(
        queues: Arc<GlobalQueueSet>,
        count: usize,
        dequeue_timeout: Duration,
        handler: F,
    ) -> Self
    where
        F: Fn(Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let should_break = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);
        let mut handles = Vec::with_capacity(count);

        for worker_id in 0..count {
            let queues = queues.clone();
            let should_break = should_break.clone();
            let handler = handler.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let should_break_now = should_break.clone();
                    let req = queues
                        .dequeue_req(dequeue_timeout, move || {
                            should_break_now.load(Ordering::SeqCst)
                        })
                        .await;
                    let Some(req) = req else {
                        debug!(worker_id, "worker observed shutdown, returning");
                        return;
                    };
                    if let Err(e) = handler(req).await {
                        warn!(worker_id, error = %e, "request handler returned an error");
                    }
                }
            }));
        }

        Self { queues, should_break, handles }
    }

    /// Signals every worker's cooperative shutdown flag and waits for all
    /// worker tasks to return. A worker currently blocked in `dequeue_req`
    /// unblocks within the configured dequeue timeout plus a bounded delta
    /// (§8 property 6).
    pub async fn shutdown(mut self) {
        self.should_break.store(true, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked during shutdown");
            }
        }
    }

    pub fn queues(&self) -> &Arc<GlobalQueueSet> {
        &self.queues
    }
}
