//! Non-blocking delivery of background errors.

use crate::error::RefreshError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type Callback = Arc<dyn Fn(&RefreshError) + Send + Sync>;

#[derive(Clone)]
enum SinkKind {
    Channel(mpsc::Sender<RefreshError>),
    Callback(Callback),
}

/// Where the refresher reports fetch and rebind failures.
///
/// Reporting never waits: a full channel drops the error (it is still logged),
/// and callbacks must return quickly.
#[derive(Clone)]
pub struct ErrorSink {
    kind: SinkKind,
}

impl ErrorSink {
    /// Creates a sink backed by a bounded channel of `capacity` errors.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RefreshError>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                kind: SinkKind::Channel(tx),
            },
            rx,
        )
    }

    /// Creates a sink that calls `callback` on the refresher task.
    pub fn from_fn<F>(callback: F) -> Self
    where
        F: Fn(&RefreshError) + Send + Sync + 'static,
    {
        Self {
            kind: SinkKind::Callback(Arc::new(callback)),
        }
    }

    pub(crate) fn report(&self, error: RefreshError) {
        match &self.kind {
            SinkKind::Channel(tx) => match tx.try_send(error) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    warn!(error = %dropped, "Error sink is full, dropping error");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Error sink receiver is gone");
                }
            },
            SinkKind::Callback(callback) => callback(&error),
        }
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SinkKind::Channel(_) => "channel",
            SinkKind::Callback(_) => "callback",
        };
        f.debug_struct("ErrorSink").field("kind", &kind).finish()
    }
}
