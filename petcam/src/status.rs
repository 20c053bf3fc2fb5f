//! Status board for user-facing messages.
//!
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::watch;

use common::status::{Status, StatusLevel};

/// Latest user-facing status with optional auto-dismiss.
///
/// Cheap to clone; clones share the same underlying message slot.
#[derive(Clone)]
pub struct StatusBoard {
    tx: Arc<watch::Sender<Option<Status>>>,
    seq: Arc<AtomicU64>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the current status.
    pub fn announce(&self, level: StatusLevel, message: impl Into<String>) {
        let message = message.into();
        log::debug!("Status ({level:?}): {message}");
        self.bump();
        self.tx.send_replace(Some(Status::new(level, message)));
    }

    /// Announce a status that clears itself after `ttl` unless a newer
    /// status replaced it in the meantime.
    pub fn announce_transient(&self, level: StatusLevel, message: impl Into<String>, ttl: Duration) {
        self.announce(level, message);

        let stamp = self.seq.load(Ordering::SeqCst);
        let board = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if board.seq.load(Ordering::SeqCst) == stamp {
                board.tx.send_replace(None);
            }
        });
    }

    pub fn clear(&self) {
        self.bump();
        self.tx.send_replace(None);
    }

    pub fn current(&self) -> Option<Status> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Status>> {
        self.tx.subscribe()
    }

    fn bump(&self) {
        self.seq.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_transient_status_auto_dismisses() {
        let board = StatusBoard::new();
        board.announce_transient(StatusLevel::Warning, "nothing found", Duration::from_secs(3));

        assert_eq!(
            board.current(),
            Some(Status::new(StatusLevel::Warning, "nothing found"))
        );

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(board.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_does_not_clobber_newer_status() {
        let board = StatusBoard::new();
        board.announce_transient(StatusLevel::Info, "first", Duration::from_secs(1));
        board.announce(StatusLevel::Error, "second");

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(
            board.current(),
            Some(Status::new(StatusLevel::Error, "second"))
        );
    }
}
