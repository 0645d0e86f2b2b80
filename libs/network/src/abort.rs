//! Cooperative cancellation of blocking reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable abort handle polled by blocking receives.
///
/// Tripping the flag makes the next read attempt on every connection using
/// it return without producing a message. In-flight messages are not rolled
/// back.
#[derive(Clone, Debug, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        AbortFlag::default()
    }

    /// Trip the flag. Irreversible.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let flag = AbortFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_set());
        flag.abort();
        assert!(clone.is_set());
    }
}
