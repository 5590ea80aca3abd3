use crate::{StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, Ordering};

/// One-way open/closed flag shared by an engine and its repositories.
#[derive(Debug, Default)]
pub(crate) struct CloseLatch {
    closed: AtomicBool,
}

impl CloseLatch {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Flip to closed. Returns `true` only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_first_close_wins() {
        let latch = CloseLatch::new();
        assert!(latch.ensure_open().is_ok());
        assert!(latch.close());
        assert!(!latch.close());
        assert!(matches!(latch.ensure_open(), Err(StorageError::Closed)));
    }
}
