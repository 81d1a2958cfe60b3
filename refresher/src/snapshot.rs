use mosaic_common::channel::Snapshot;
use std::sync::Arc;
use tokio::sync::watch;

/// Create the shared slot holding the most recently published snapshot.
///
/// The slot starts with [`Snapshot::empty`]. There is exactly one publisher; readers can be
/// cloned freely and always observe a whole snapshot.
pub fn snapshot_slot() -> (SnapshotPublisher, SnapshotReader) {
    let (tx, rx) = watch::channel(Arc::new(Snapshot::empty()));
    (SnapshotPublisher { tx }, SnapshotReader { rx })
}

pub struct SnapshotPublisher {
    tx: watch::Sender<Arc<Snapshot>>,
}

impl SnapshotPublisher {
    /// Replace the published snapshot. Readers holding the previous one keep it intact.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        self.tx.send_replace(Arc::clone(&snapshot));
        snapshot
    }
}

#[derive(Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<Snapshot>>,
}

impl SnapshotReader {
    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait for the next publication and return it. `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Arc<Snapshot>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}
