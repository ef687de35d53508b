//! Cooperative cancellation for blocking call chains.
//!
//! Every service and repository operation takes a token and checks it at
//! entry; bulk workers check it again before each item. Cancellation and
//! deadline expiry surface as `SERVICE_UNAVAILABLE` with the operation
//! name in context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{EncryptionError, ErrorKind};

/// Cloneable cancellation handle with an optional deadline.
///
/// Clones share the cancellation flag: cancelling any clone cancels all of
/// them. The deadline is fixed at construction.
#[derive(Debug, Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never expires on its own.
    pub fn new() -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token that expires `timeout` from now, and can also be cancelled
    /// explicitly before that.
    pub fn with_timeout(timeout: Duration) -> Self {
        CancelToken {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Signal cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::SeqCst) {
            return true;
        }
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Fail fast if the token is cancelled or past its deadline.
    pub fn check(&self, op: &str) -> Result<(), EncryptionError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(
                EncryptionError::new(ErrorKind::ServiceUnavailable, "operation cancelled")
                    .with_context("op", op),
            );
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(
                    EncryptionError::new(ErrorKind::ServiceUnavailable, "deadline exceeded")
                        .with_context("op", op),
                );
            }
        }
        Ok(())
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        CancelToken::new()
    }
}
