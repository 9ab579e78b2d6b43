//! Probe capabilities with scripted behaviour for tests

use super::probe::{ProbeCapability, ProbeFailure, ProbeResult};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Answers from a canned table; unknown addresses get a generic reply.
#[derive(Default)]
pub struct FakeProbe {
    canned: HashMap<Ipv4Addr, ProbeResult>,
    max_latency_ms: u64,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
}

impl FakeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, target: Ipv4Addr, output: &str) -> Self {
        self.canned
            .insert(target, ProbeResult::success(target, output.to_string()));
        self
    }

    pub fn fail(mut self, target: Ipv4Addr, failure: ProbeFailure) -> Self {
        self.canned
            .insert(target, ProbeResult::failed(target, String::new(), failure));
        self
    }

    /// Sleep a random 0..=`max_ms` milliseconds before answering
    pub fn with_random_latency(mut self, max_ms: u64) -> Self {
        self.max_latency_ms = max_ms;
        self
    }
}

#[async_trait]
impl ProbeCapability for FakeProbe {
    fn tool(&self) -> &str {
        "fake"
    }

    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.max_latency_ms > 0 {
            let delay = rand::thread_rng().gen_range(0..=self.max_latency_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.canned.get(&target).cloned().unwrap_or_else(|| {
            ProbeResult::success(target, format!("Unicast reply from {}", target))
        })
    }
}

/// Never answers
pub struct HangingProbe;

#[async_trait]
impl ProbeCapability for HangingProbe {
    fn tool(&self) -> &str {
        "hang"
    }

    async fn request_arp(&self, _target: Ipv4Addr) -> ProbeResult {
        std::future::pending().await
    }
}

/// Panics on every call
pub struct PanickingProbe;

#[async_trait]
impl ProbeCapability for PanickingProbe {
    fn tool(&self) -> &str {
        "panic"
    }

    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult {
        panic!("probe for {} exploded", target);
    }
}

/// Blocks every probe until `open` is called
pub struct GatedProbe {
    started: AtomicUsize,
    gate_tx: watch::Sender<bool>,
    gate_rx: watch::Receiver<bool>,
}

impl GatedProbe {
    pub fn new() -> Self {
        let (gate_tx, gate_rx) = watch::channel(false);
        Self {
            started: AtomicUsize::new(0),
            gate_tx,
            gate_rx,
        }
    }

    pub fn open(&self) {
        self.gate_tx.send_replace(true);
    }

    pub async fn wait_for_started(&self, count: usize) {
        while self.started.load(Ordering::SeqCst) < count {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

#[async_trait]
impl ProbeCapability for GatedProbe {
    fn tool(&self) -> &str {
        "gated"
    }

    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate_rx.clone();
        let _ = gate.wait_for(|open| *open).await;
        ProbeResult::success(target, "gated reply".to_string())
    }
}
