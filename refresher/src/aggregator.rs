use mosaic_common::channel::{CaptureResult, Channel, Snapshot};
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("result position {position} is outside the {len} channels of this cycle")]
    OutOfRange { position: usize, len: usize },
    #[error("channel at position {0} already has a result")]
    Duplicate(usize),
}

/// Collects capture results of one cycle and restores the original channel order.
///
/// Results may arrive in any order; each is stored at the position of the channel it was
/// captured for, never appended in arrival order.
pub struct Aggregator<'a> {
    channels: &'a [Channel],
    slots: Vec<Option<CaptureResult>>,
}

impl<'a> Aggregator<'a> {
    pub fn new(channels: &'a [Channel]) -> Self {
        Self {
            channels,
            slots: vec![None; channels.len()],
        }
    }

    pub fn insert(&mut self, position: usize, result: CaptureResult) -> Result<(), AggregateError> {
        let len = self.slots.len();
        let slot = self
            .slots
            .get_mut(position)
            .ok_or(AggregateError::OutOfRange { position, len })?;
        if slot.is_some() {
            return Err(AggregateError::Duplicate(position));
        }
        *slot = Some(result);
        Ok(())
    }

    /// Insert the results of one run, which started at channel index `start`.
    ///
    /// The run is placed whole or not at all.
    pub fn insert_run(
        &mut self,
        start: usize,
        results: Vec<CaptureResult>,
    ) -> Result<(), AggregateError> {
        if results.is_empty() {
            return Ok(());
        }
        let len = self.slots.len();
        let end = start + results.len();
        if end > len {
            return Err(AggregateError::OutOfRange {
                position: end - 1,
                len,
            });
        }
        if let Some(offset) = self.slots[start..end].iter().position(Option::is_some) {
            return Err(AggregateError::Duplicate(start + offset));
        }

        for (slot, result) in self.slots[start..end].iter_mut().zip(results) {
            *slot = Some(result);
        }
        Ok(())
    }

    pub fn missing(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// One result per channel, in channel order.
    ///
    /// A channel that never reported is filled with a placeholder so the output length always
    /// matches the input.
    pub fn into_results(self) -> Vec<CaptureResult> {
        self.slots
            .into_iter()
            .zip(self.channels)
            .enumerate()
            .map(|(position, (slot, channel))| {
                slot.unwrap_or_else(|| {
                    debug!(position, channel = %channel.name, "no capture result for channel");
                    CaptureResult::failed(channel.name.clone())
                })
            })
            .collect()
    }

    pub fn into_snapshot(self, cycle: u64) -> Snapshot {
        Snapshot::new(cycle, self.into_results())
    }
}
