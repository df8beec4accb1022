use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{CallseqError, Result};

/// Shared flag raised by Ctrl-C and polled by the loader and walker
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the flag is raised
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CallseqError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = CancellationFlag::new();
        let worker = flag.clone();
        assert!(worker.check().is_ok());

        flag.cancel();
        assert!(worker.is_cancelled());
        assert!(matches!(worker.check(), Err(CallseqError::Cancelled)));
    }
}
