use futures_util::stream::{self, StreamExt};
use mosaic_common::channel::{CaptureResult, Channel};
use mosaic_common::config::RefreshConfig;
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::aggregator::Aggregator;
use crate::capture::FrameCapture;

/// Split `len` channels into consecutive index ranges of at most `batch_size`.
///
/// Only the last range may be shorter. A `batch_size` of 0 is treated as 1.
pub fn partition(len: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..len)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(len))
        .collect()
}

/// Capture every channel and collect the results by channel position.
///
/// Runs of `batch_size` channels are captured sequentially inside the run, with at most
/// `concurrency` runs in flight. Returns only once every run has finished.
pub async fn dispatch<'a>(
    channels: &'a [Channel],
    cfg: &RefreshConfig,
    capture: &dyn FrameCapture,
) -> Aggregator<'a> {
    let mut aggregator = Aggregator::new(channels);
    if channels.is_empty() {
        return aggregator;
    }

    let runs = partition(channels.len(), cfg.batch_size);
    let concurrency = cfg.concurrency.max(1);
    info!(
        channels = channels.len(),
        runs = runs.len(),
        concurrency,
        batch_size = cfg.batch_size,
        "dispatching capture runs"
    );

    let mut completed = stream::iter(runs.into_iter().enumerate())
        .map(|(run_index, range)| {
            // Runs past the first wave reuse a slot another run just released.
            let pause = if run_index >= concurrency {
                cfg.min_cycle_interval
            } else {
                Duration::ZERO
            };
            run_batch(run_index, range, channels, capture, pause)
        })
        .buffer_unordered(concurrency);

    while let Some((start, results)) = completed.next().await {
        if let Err(e) = aggregator.insert_run(start, results) {
            error!(error = %e, start, "discarding misplaced run results");
        }
    }

    let missing = aggregator.missing();
    if missing > 0 {
        error!(missing, "runs finished without a result for every channel");
    }
    aggregator
}

async fn run_batch(
    run_index: usize,
    range: Range<usize>,
    channels: &[Channel],
    capture: &dyn FrameCapture,
    pause: Duration,
) -> (usize, Vec<CaptureResult>) {
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }

    let start = range.start;
    let mut results = Vec::with_capacity(range.len());

    for channel in &channels[range] {
        let result = match capture.capture_frame(&channel.address).await {
            Ok(image) => CaptureResult::captured(channel.name.clone(), image),
            Err(e) => {
                debug!(
                    error = %e,
                    channel = %channel.name,
                    address = %channel.address,
                    "capture failed, using placeholder"
                );
                CaptureResult::failed(channel.name.clone())
            }
        };
        results.push(result);
    }

    debug!(run_index, start, len = results.len(), "run finished");
    (start, results)
}
