//! Concurrent fan-out of ARP probes
//!
//! Every candidate address gets its own task. Results flow back through one
//! channel; a coordinator task tracks every spawned probe and drops the last
//! sender only once all of them have reported, which is what lets the
//! collector stop without polling.

use super::probe::{ProbeCapability, ProbeFailure, ProbeResult};
use futures::FutureExt;
use std::any::Any;
use std::net::Ipv4Addr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Capacity of the result channel
pub const RESULT_BUFFER: usize = 256;

/// Limits applied to a dispatch run.
///
/// The default launches every probe at once and lets each run as long as the
/// tool takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Maximum number of probes in flight, `None` for unbounded
    pub max_concurrency: Option<usize>,
    /// Deadline for a single probe, `None` to wait indefinitely
    pub probe_timeout: Option<Duration>,
}

/// A running dispatch
pub struct Dispatch {
    /// Closed once every dispatched probe has reported
    pub results: mpsc::Receiver<ProbeResult>,
    /// Resolves to the number of probes launched
    pub dispatched: JoinHandle<usize>,
}

/// Launch one probe per address and return immediately.
///
/// Must be called from within a tokio runtime.
pub fn dispatch<I>(
    addresses: I,
    probe: Arc<dyn ProbeCapability>,
    options: DispatchOptions,
    cancel: CancellationToken,
) -> Dispatch
where
    I: IntoIterator<Item = Ipv4Addr>,
    I::IntoIter: Send + 'static,
{
    let (tx, rx) = mpsc::channel(RESULT_BUFFER);
    let coordinator = tokio::spawn(coordinate(
        addresses.into_iter(),
        probe,
        options,
        cancel,
        tx,
    ));

    Dispatch {
        results: rx,
        dispatched: coordinator,
    }
}

async fn coordinate<I>(
    addresses: I,
    probe: Arc<dyn ProbeCapability>,
    options: DispatchOptions,
    cancel: CancellationToken,
    results: mpsc::Sender<ProbeResult>,
) -> usize
where
    I: Iterator<Item = Ipv4Addr>,
{
    let tracker = TaskTracker::new();
    let limiter = options.max_concurrency.map(|limit| {
        if limit > Semaphore::MAX_PERMITS {
            tracing::warn!(
                "Concurrency limit {} exceeds {}, clamping",
                limit,
                Semaphore::MAX_PERMITS
            );
        }
        Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS)))
    });
    let mut dispatched = 0usize;

    for target in addresses {
        if cancel.is_cancelled() {
            tracing::info!("Dispatch cancelled after {} probes", dispatched);
            break;
        }

        let permit = match &limiter {
            Some(limiter) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::info!("Dispatch cancelled after {} probes", dispatched);
                        break;
                    }
                    permit = Arc::clone(limiter).acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            tracing::error!("Concurrency limiter closed: {}", e);
                            break;
                        }
                    },
                }
            }
            None => None,
        };

        let probe = Arc::clone(&probe);
        let results = results.clone();
        let deadline = options.probe_timeout;

        // `target` is a Copy value moved into the task; nothing is shared
        tracker.spawn(async move {
            let result = run_probe(probe.as_ref(), target, deadline).await;
            drop(permit);

            if let Some(ref failure) = result.failure {
                tracing::debug!("{}: {}", target, failure);
            }
            if results.send(result).await.is_err() {
                tracing::warn!("Result receiver dropped before {} reported", target);
            }
        });
        dispatched += 1;
    }

    tracker.close();
    tracing::debug!("Dispatched {} probes, waiting for completion", dispatched);
    tracker.wait().await;

    tracing::debug!("All {} probes reported, closing result channel", dispatched);
    drop(results);
    dispatched
}

/// Run one probe, turning a missed deadline or a panic into a failure result.
async fn run_probe(
    probe: &dyn ProbeCapability,
    target: Ipv4Addr,
    deadline: Option<Duration>,
) -> ProbeResult {
    let invocation = AssertUnwindSafe(probe.request_arp(target)).catch_unwind();

    let outcome = match deadline {
        Some(limit) => match tokio::time::timeout(limit, invocation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return ProbeResult::failed(
                    target,
                    String::new(),
                    ProbeFailure::TimedOut {
                        after_ms: limit.as_millis() as u64,
                    },
                );
            }
        },
        None => invocation.await,
    };

    outcome.unwrap_or_else(|panic| {
        ProbeResult::failed(
            target,
            String::new(),
            ProbeFailure::Panicked {
                message: panic_message(panic.as_ref()),
            },
        )
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
