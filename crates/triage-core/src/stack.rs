#![forbid(unsafe_code)]

//! The batch of images being triaged and the three visible card slots.

use tracing::debug;

use crate::raster::ImageRef;

/// Number of cards drawn at once (current plus two behind it).
pub const VISIBLE_CARDS: usize = 3;

/// Result of [`CardStack::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Moved { index: usize },
    /// Advanced past the last card.
    BatchComplete,
    /// Nothing to do (no previous card, or the batch is already complete).
    Ignored,
}

/// Ordered batch with a cursor.
#[derive(Debug, Clone, Default)]
pub struct CardStack {
    images: Vec<ImageRef>,
    current: usize,
    complete: bool,
}

impl CardStack {
    #[must_use]
    pub fn new(images: Vec<ImageRef>) -> Self {
        let complete = images.is_empty();
        Self {
            images,
            current: 0,
            complete,
        }
    }

    /// Replace the batch and rewind.
    pub fn load(&mut self, images: Vec<ImageRef>) {
        *self = Self::new(images);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The card under the finger; `None` once the batch is complete.
    #[must_use]
    pub fn current(&self) -> Option<&ImageRef> {
        if self.complete {
            None
        } else {
            self.images.get(self.current)
        }
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        !self.complete && self.current > 0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Current card followed by the ones stacked behind it.
    #[must_use]
    pub fn visible(&self) -> [Option<&ImageRef>; VISIBLE_CARDS] {
        let mut out = [None; VISIBLE_CARDS];
        if self.complete {
            return out;
        }
        for (slot, image) in out.iter_mut().zip(self.images.iter().skip(self.current)) {
            *slot = Some(image);
        }
        out
    }

    /// Move the cursor by `delta` (`-1` or `+1`). Moving forward from the
    /// last card completes the batch; it never wraps.
    pub fn advance(&mut self, delta: i32) -> AdvanceOutcome {
        if self.complete || delta == 0 {
            return AdvanceOutcome::Ignored;
        }
        if delta < 0 {
            let back = delta.unsigned_abs() as usize;
            if back > self.current {
                return AdvanceOutcome::Ignored;
            }
            self.current -= back;
            return AdvanceOutcome::Moved {
                index: self.current,
            };
        }
        let next = self.current + delta as usize;
        if next < self.images.len() {
            self.current = next;
            AdvanceOutcome::Moved { index: next }
        } else {
            debug!(len = self.images.len(), "batch complete");
            self.complete = true;
            AdvanceOutcome::BatchComplete
        }
    }

    /// Take the current card out of the batch. The cursor then points at
    /// the card that followed it; removing the last card completes the batch.
    pub fn remove_current(&mut self) -> Option<ImageRef> {
        if self.complete || self.current >= self.images.len() {
            return None;
        }
        let removed = self.images.remove(self.current);
        if self.current >= self.images.len() {
            debug!("batch complete after removal");
            self.complete = true;
        }
        Some(removed)
    }
}
