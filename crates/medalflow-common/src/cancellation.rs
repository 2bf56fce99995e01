//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is attached to the execution request context and
//! threaded into engine calls. The planning core only propagates it; engines
//! check it between blocking steps.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use medalflow_error::{ErrorCode, FlowError, FlowResult};

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Bail out with an operation error when the token has been cancelled.
    pub fn check_cancellation(&self) -> FlowResult<()> {
        if self.is_cancelled() {
            Err(FlowError::new(
                ErrorCode::OperationError,
                "execution was cancelled",
            )
            .with_detail("reason", "cancelled"))
        } else {
            Ok(())
        }
    }
}

/// A token that never fires. Default for code paths with no ambient request.
pub fn never_cancels() -> CancellationToken {
    CancellationToken::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check_cancellation().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(token.check_cancellation().is_err());
    }
}
