use tokio::sync::broadcast;

use crate::path::StorePath;

/// Fans out "this path was written" signals to every watcher.
///
/// Only the path travels on the channel; watchers whose path overlaps it
/// re-read in full, so a lagged receiver can recover by reading once more.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<StorePath>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorePath> {
        self.tx.subscribe()
    }

    /// Announce a write at `path`. No-op without watchers.
    pub fn notify(&self, path: StorePath) {
        let _ = self.tx.send(path);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
