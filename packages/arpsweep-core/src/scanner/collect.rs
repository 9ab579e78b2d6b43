//! Fan-in of probe results

use super::probe::ProbeResult;
use tokio::sync::mpsc;

/// Everything the collector saw
#[derive(Debug, Clone, Default)]
pub struct Collected {
    /// Results received, reportable or not
    pub received: usize,
    /// Reportable results in arrival order
    pub reportable: Vec<ProbeResult>,
}

/// A result is worth reporting when the probe succeeded and printed something.
///
/// A silent host legitimately yields empty output without any failure.
pub fn is_reportable(result: &ProbeResult) -> bool {
    result.failure.is_none() && !result.output.is_empty()
}

/// Drain the channel until every producer is done.
pub async fn collect(results: mpsc::Receiver<ProbeResult>) -> Collected {
    collect_with(results, |_| {}).await
}

/// Drain the channel, handing each reportable result to `on_reportable` as
/// soon as it arrives.
pub async fn collect_with<F>(mut results: mpsc::Receiver<ProbeResult>, mut on_reportable: F) -> Collected
where
    F: FnMut(&ProbeResult),
{
    let mut collected = Collected::default();

    while let Some(result) = results.recv().await {
        collected.received += 1;

        if is_reportable(&result) {
            tracing::debug!("{} responded", result.target);
            on_reportable(&result);
            collected.reportable.push(result);
        } else if result.failure.is_none() {
            tracing::trace!("{} returned no output", result.target);
        }
    }

    tracing::debug!(
        "Collector finished: {} results, {} reportable",
        collected.received,
        collected.reportable.len()
    );
    collected
}
