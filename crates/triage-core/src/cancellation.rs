#![forbid(unsafe_code)]

//! Cooperative cancellation for background raster preparation.
//!
//! The UI thread keeps the [`CancellationSource`]; the worker receives a
//! [`CancellationToken`] and checks it before and after decoding. A worker
//! that observes cancellation drops whatever it produced, which releases the
//! raster immediately.
//!
//! Dropping the source does not cancel. Cancellation is always explicit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Control side of a cancellation pair.
#[derive(Debug, Default)]
pub struct CancellationSource {
    flag: Arc<AtomicBool>,
}

/// Observer side; cheap to clone and send across threads.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            flag: Arc::clone(&self.flag),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl CancellationToken {
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
