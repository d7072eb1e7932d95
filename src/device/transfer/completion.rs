//! # Completion Notification
//!
//! When the driver reports that a transfer is finished, the transfer hands a
//! [`Completion`] to the [`Notify`] implementation it was armed with.
//! Notifiers run in the driver's context, which is usually an interrupt
//! handler, so they must be quick and must not block.
//!
//! A plain closure works as a notifier. Components that want to react
//! outside of interrupt context use a [`CompletionQueue`] instead and drain
//! it later.

use std::cell::Cell;

use tracing::warn;

use super::{EndpointAddress, OwnerId};

/// The event delivered when a transfer completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// The component that armed the transfer.
    pub owner: Option<OwnerId>,
    /// The endpoint the transfer ran on.
    pub endpoint: EndpointAddress,
    /// The number of bytes the driver moved.
    pub transferred: usize,
    /// The size of the armed region.
    pub total: usize,
}

impl Completion {
    /// Returns true if the transfer ended before its region was exhausted.
    ///
    /// Short completions are valid. The host may send a short packet or ask
    /// for fewer bytes than the device offers.
    #[must_use]
    pub const fn is_short(&self) -> bool {
        self.transferred < self.total
    }
}

/// Something that wants to hear about completed transfers.
pub trait Notify {
    /// Called synchronously from [`notify_complete`].
    ///
    /// [`notify_complete`]: super::ReceiveTransfer::notify_complete
    fn notify(&self, completion: Completion);
}

impl<F: Fn(Completion)> Notify for F {
    fn notify(&self, completion: Completion) {
        self(completion)
    }
}

/// A fixed-capacity FIFO of completions.
///
/// The queue never allocates after construction. If it is full, new
/// completions are dropped and counted, see [`dropped`](Self::dropped).
#[derive(Debug)]
pub struct CompletionQueue<const N: usize> {
    slots: [Cell<Option<Completion>>; N],
    /// Index of the oldest entry.
    head: Cell<usize>,
    len: Cell<usize>,
    dropped: Cell<usize>,
}

impl<const N: usize> Default for CompletionQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CompletionQueue<N> {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        assert!(N > 0, "a completion queue needs at least one slot");

        Self {
            slots: std::array::from_fn(|_| Cell::new(None)),
            head: Cell::new(0),
            len: Cell::new(0),
            dropped: Cell::new(0),
        }
    }

    /// Append a completion.
    ///
    /// Returns false if the queue was full and the completion was dropped.
    #[must_use]
    pub fn push(&self, completion: Completion) -> bool {
        let len = self.len.get();

        if len == N {
            self.dropped.set(self.dropped.get() + 1);
            warn!(
                "completion queue full, dropping completion on {}",
                completion.endpoint
            );
            return false;
        }

        self.slots[(self.head.get() + len) % N].set(Some(completion));
        self.len.set(len + 1);

        true
    }

    /// Remove the oldest completion.
    #[must_use]
    pub fn pop(&self) -> Option<Completion> {
        if self.len.get() == 0 {
            return None;
        }

        let head = self.head.get();
        let completion = self.slots[head].take();

        self.head.set((head + 1) % N);
        self.len.set(self.len.get() - 1);

        completion
    }

    /// The number of queued completions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.get()
    }

    /// Returns true if no completion is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len.get() == 0
    }

    /// The number of completions lost because the queue was full.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped.get()
    }
}

impl<const N: usize> Notify for CompletionQueue<N> {
    fn notify(&self, completion: Completion) {
        let _ = self.push(completion);
    }
}
