use std::sync::Arc;

use tokio::sync::watch;

use super::status::{DownloadSnapshot, DownloadStatus};

/// Shared handle to a job's snapshot channel.
#[derive(Clone)]
pub(crate) struct Publisher {
    tx: Arc<watch::Sender<DownloadSnapshot>>,
}

impl Publisher {
    pub(crate) fn new(initial: DownloadSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Publisher { tx: Arc::new(tx) }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<DownloadSnapshot> {
        self.tx.subscribe()
    }

    pub(crate) fn snapshot(&self) -> DownloadSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut DownloadSnapshot)) {
        self.tx.send_modify(f);
    }

    /// Record transfer progress. Never moves backwards for the same total; watchers
    /// are only woken when the displayed percentage changes.
    pub(crate) fn progress(&self, read: u64, total: u64) {
        self.tx.send_if_modified(|s| {
            if total == s.total_bytes && read < s.bytes_read {
                return false;
            }
            let before = s.progress;
            s.set_bytes(read, total);
            if s.status == Some(DownloadStatus::Downloading) {
                s.set_status(s.status);
            }
            s.progress != before
        });
    }

    /// Replace the status message without touching anything else.
    pub(crate) fn message(&self, text: &str) {
        self.tx.send_modify(|s| s.message = text.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_monotonic_and_coalesced() {
        let mut snap = DownloadSnapshot::idle("pack");
        snap.set_status(Some(DownloadStatus::Downloading));
        let p = Publisher::new(snap);
        let mut rx = p.subscribe();

        p.progress(500, 1000);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().message, "Downloading 50%");

        p.progress(501, 1000);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(p.snapshot().bytes_read, 501);

        p.progress(100, 1000);
        assert_eq!(p.snapshot().bytes_read, 501);
    }
}
