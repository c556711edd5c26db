//! # Delivery worker: periodic queue drains plus the final flush.
//!
//! ```text
//!   loop:
//!     select! {
//!       stop.cancelled()  → leave loop
//!       ticker.tick()     → queue.drain_once(transport, credential)
//!     }
//!   final flush:
//!     drain_once until Drained | Unauthorized   (Incomplete → wait one tick, retry)
//!     send DrainResult on the rendezvous channel
//! ```
//!
//! ## Rules
//! - A drain in progress is never interrupted by `stop`; the stop request
//!   is observed between drains.
//! - The final flush is unbounded here; the supervisor bounds the
//!   rendezvous and aborts the worker when the bound elapses.
//! - The credential is resolved (through the TTL cache) before every drain.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::delivery::{CachedCredential, DeliveryQueue, DrainResult, Transport};

/// Floor for tick intervals; `tokio::time::interval` rejects zero.
pub(crate) const MIN_TICK: Duration = Duration::from_millis(1);

pub(crate) struct DeliveryWorker {
    pub(crate) done: oneshot::Receiver<DrainResult>,
    pub(crate) handle: JoinHandle<()>,
}

pub(crate) fn spawn_delivery_worker(
    queue: Arc<DeliveryQueue>,
    transport: Arc<dyn Transport>,
    credential: Arc<CachedCredential>,
    interval: Duration,
    stop: CancellationToken,
) -> DeliveryWorker {
    let (tx, done) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval(interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let cred = credential.get();
                    let res = queue.drain_once(transport.as_ref(), cred.as_deref()).await;
                    debug!(run = %queue.run_id(), ?res, "periodic drain");
                }
            }
        }

        let res = loop {
            let cred = credential.get();
            match queue.drain_once(transport.as_ref(), cred.as_deref()).await {
                DrainResult::Incomplete { .. } => ticker.tick().await,
                settled => break settled,
            };
        };
        debug!(run = %queue.run_id(), ?res, "final drain finished");
        let _ = tx.send(res);
    });
    DeliveryWorker { done, handle }
}
