//! # Transfers
//!
//! A transfer is the bookkeeping for bytes moving through one endpoint. The
//! controller driver moves data in chunks (usually one packet at a time) and
//! reports every chunk back, so a transfer has to remember how far it got.
//!
//! The driver only ever sees transfers through two capability traits:
//!
//! - [`ReceiveTransfer`] for OUT data (host-to-device), and
//! - [`TransmitTransfer`] for IN data (device-to-host).
//!
//! It does not need to know where the bytes live. There are four variants
//! that differ only in their backing storage:
//!
//! | Variant | Storage | Direction |
//! |---|---|---|
//! | [`ZeroLengthTransfer`] | none | both |
//! | [`OwnedBufferTransfer`] | array inside the transfer | receive |
//! | [`ExternalBufferTransfer`] | caller-supplied mutable slice | receive |
//! | [`SpanTransfer`] | caller-supplied read-only slice | transmit |
//!
//! All of them share [`Transfer`], which tracks the cursor and enforces that
//! a transfer is never re-armed while the driver still works on it.

use std::fmt;

use thiserror::Error;
use tracing::trace;

use crate::device::{constants::endpoint, setup::Direction};

pub mod completion;
mod directional;
mod external;
mod owned;
mod span;
mod zero_length;

pub use completion::{Completion, CompletionQueue, Notify};
pub use directional::{InTransfer, OutTransfer};
pub use external::{External, ExternalBufferTransfer};
pub use owned::{Owned, OwnedBufferTransfer};
pub use span::{Span, SpanTransfer};
pub use zero_length::{ZeroLength, ZeroLengthTransfer};

/// The receive capability, used by the driver for OUT data.
///
/// The driver asks for a region to write into, copies (or DMAs) at most
/// [`remaining`](Self::remaining) bytes there and reports the exact amount
/// with [`notify_filled`](Self::notify_filled). When it considers the
/// transfer done (short packet, nothing remaining, or an abort by the host),
/// it calls [`notify_complete`](Self::notify_complete) exactly once.
pub trait ReceiveTransfer {
    /// Return the region the next bytes go into.
    ///
    /// The region is at most `requested` bytes long and never longer than
    /// [`remaining`](Self::remaining). Transfers without storage return
    /// `None`.
    fn write_region(&mut self, requested: usize) -> Option<&mut [u8]>;

    /// The number of bytes the transfer can still take.
    fn remaining(&self) -> usize;

    /// Record that the driver wrote `bytes` bytes into the last region.
    ///
    /// # Panics
    ///
    /// If `bytes` exceeds [`remaining`](Self::remaining).
    fn notify_filled(&mut self, bytes: usize);

    /// Finish the transfer and run its completion notifier.
    ///
    /// # Panics
    ///
    /// If the transfer is not armed.
    fn notify_complete(&mut self);

    /// Copy `data` into the transfer, as far as it fits.
    ///
    /// This is the whole chunk cycle for drivers that read packets out of a
    /// FIFO. Returns the number of bytes consumed.
    fn fill_from(&mut self, data: &[u8]) -> usize {
        let Some(region) = self.write_region(data.len()) else {
            return 0;
        };
        let count = region.len();

        region.copy_from_slice(&data[..count]);
        self.notify_filled(count);

        count
    }
}

/// The transmit capability, used by the driver for IN data.
///
/// The counterpart of [`ReceiveTransfer`]: the driver reads from
/// [`read_region`](Self::read_region), reports what it sent with
/// [`notify_transferred`](Self::notify_transferred) and eventually calls
/// [`notify_complete`](Self::notify_complete) once.
pub trait TransmitTransfer {
    /// Return the bytes that still have to be sent.
    ///
    /// Transfers without storage return `None`.
    fn read_region(&self) -> Option<&[u8]>;

    /// The number of bytes that still have to be sent.
    fn remaining(&self) -> usize;

    /// Record that the driver sent `bytes` bytes from the read region.
    ///
    /// # Panics
    ///
    /// If `bytes` exceeds [`remaining`](Self::remaining).
    fn notify_transferred(&mut self, bytes: usize);

    /// Finish the transfer and run its completion notifier.
    ///
    /// # Panics
    ///
    /// If the transfer is not armed.
    fn notify_complete(&mut self);

    /// Copy the next bytes into `out` and mark them as sent.
    ///
    /// Returns the number of bytes copied, which is the smaller of
    /// `out.len()` and [`remaining`](Self::remaining).
    fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let count = match self.read_region() {
            Some(data) => {
                let count = data.len().min(out.len());
                out[..count].copy_from_slice(&data[..count]);
                count
            }
            None => 0,
        };

        self.notify_transferred(count);

        count
    }
}

/// The address of an endpoint: its number and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointAddress(u8);

impl EndpointAddress {
    /// The IN half of the control endpoint.
    pub const CONTROL_IN: Self = Self(endpoint::CONTROL_IN);

    /// The OUT half of the control endpoint.
    pub const CONTROL_OUT: Self = Self(endpoint::CONTROL_OUT);

    /// Create an endpoint address.
    ///
    /// # Panics
    ///
    /// If `number` is larger than 15.
    #[must_use]
    pub const fn new(number: u8, direction: Direction) -> Self {
        assert!(number <= endpoint::NUMBER_MASK, "endpoint number out of range");

        match direction {
            Direction::In => Self(number | endpoint::DIRECTION_IN),
            Direction::Out => Self(number),
        }
    }

    /// The endpoint number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0 & endpoint::NUMBER_MASK
    }

    /// The direction of the data on this endpoint.
    #[must_use]
    pub const fn direction(self) -> Direction {
        if self.0 & endpoint::DIRECTION_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }
}

impl From<EndpointAddress> for u8 {
    fn from(value: EndpointAddress) -> Self {
        value.0
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.direction() {
            Direction::In => "IN",
            Direction::Out => "OUT",
        };
        write!(f, "EP{} {}", self.number(), direction)
    }
}

/// Identifies the component that armed a transfer.
///
/// Completions carry the owner, so a component draining a shared
/// [`CompletionQueue`] can tell which events are meant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(pub u8);

impl OwnerId {
    /// The standard request dispatcher.
    pub const STANDARD_REQUESTS: Self = Self(0);
}

/// The activation state of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    /// Not armed. The owner may (re-)arm it.
    #[default]
    Idle,
    /// Armed and handed to the driver.
    Armed,
    /// The completion notifier is running.
    Completing,
}

/// Errors when arming a transfer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// The transfer is still armed or completing.
    #[error("Transfer on {endpoint} is still active (owner {owner:?})")]
    Busy {
        /// The endpoint of the active transfer.
        endpoint: EndpointAddress,
        /// The owner of the active transfer.
        owner: Option<OwnerId>,
    },
}

/// Progress through a region of `total` bytes.
///
/// Only the position is stored, so `transferred + remaining == total` cannot
/// be violated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Cursor {
    total: usize,
    position: usize,
}

impl Cursor {
    pub(crate) const fn new(total: usize) -> Self {
        Self { total, position: 0 }
    }

    pub(crate) const fn total(&self) -> usize {
        self.total
    }

    pub(crate) const fn position(&self) -> usize {
        self.position
    }

    pub(crate) const fn remaining(&self) -> usize {
        self.total - self.position
    }

    /// The window of the region that has not been moved yet, at most `limit`
    /// bytes long.
    pub(crate) fn window(&self, limit: usize) -> std::ops::Range<usize> {
        self.position..self.position + self.remaining().min(limit)
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        assert!(
            bytes <= self.remaining(),
            "driver reported {} bytes, but only {} remain",
            bytes,
            self.remaining()
        );
        self.position += bytes;
    }

    pub(crate) fn rewind(&mut self) {
        self.position = 0;
    }
}

/// Everything a transfer remembers about its current activation.
#[derive(Clone, Copy)]
pub(crate) struct Binding<'a> {
    endpoint: EndpointAddress,
    owner: Option<OwnerId>,
    notifier: Option<&'a dyn Notify>,
    state: TransferState,
}

impl fmt::Debug for Binding<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("endpoint", &self.endpoint)
            .field("owner", &self.owner)
            .field("notifier", &self.notifier.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl<'a> Binding<'a> {
    const fn new(endpoint: EndpointAddress) -> Self {
        Self {
            endpoint,
            owner: None,
            notifier: None,
            state: TransferState::Idle,
        }
    }

    const fn ensure_idle(&self) -> Result<(), TransferError> {
        match self.state {
            TransferState::Idle => Ok(()),
            TransferState::Armed | TransferState::Completing => Err(TransferError::Busy {
                endpoint: self.endpoint,
                owner: self.owner,
            }),
        }
    }

    fn arm(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_idle()?;

        self.owner = Some(owner);
        self.notifier = notifier;
        self.state = TransferState::Armed;

        Ok(())
    }

    fn rearm(&mut self) -> Result<(), TransferError> {
        self.ensure_idle()?;
        self.state = TransferState::Armed;

        Ok(())
    }
}

/// A transfer on one endpoint, generic over its backing storage.
///
/// Use the aliases [`ZeroLengthTransfer`], [`OwnedBufferTransfer`],
/// [`ExternalBufferTransfer`] and [`SpanTransfer`] rather than naming the
/// storage types directly.
#[derive(Debug)]
pub struct Transfer<'a, S> {
    storage: S,
    cursor: Cursor,
    binding: Binding<'a>,
}

impl<'a, S> Transfer<'a, S> {
    const fn with_storage(endpoint: EndpointAddress, storage: S, total: usize) -> Self {
        Self {
            storage,
            cursor: Cursor::new(total),
            binding: Binding::new(endpoint),
        }
    }

    /// The endpoint this transfer is bound to.
    #[must_use]
    pub const fn endpoint(&self) -> EndpointAddress {
        self.binding.endpoint
    }

    /// The component that armed the transfer most recently.
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        self.binding.owner
    }

    /// The activation state.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        self.binding.state
    }

    /// Returns true from arming until the completion notifier returned.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.binding.state, TransferState::Idle)
    }

    /// The size of the region this transfer moves.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.cursor.total()
    }

    /// The number of bytes the driver has moved so far.
    #[must_use]
    pub const fn transferred(&self) -> usize {
        self.cursor.position()
    }

    /// The number of bytes still to be moved.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Reset progress and arm the transfer again with its current region,
    /// owner and notifier.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the transfer is still active.
    pub fn reinit(&mut self) -> Result<&mut Self, TransferError> {
        self.binding.rearm()?;
        self.cursor.rewind();

        trace!(
            "re-armed {} transfer of {} bytes",
            self.binding.endpoint,
            self.cursor.total()
        );

        Ok(self)
    }

    /// Drop the current activation without notifying anyone.
    ///
    /// A new setup packet overrides whatever the control endpoint was doing,
    /// which is the only way a transfer ends without completion.
    pub fn abort(&mut self) {
        if self.is_active() {
            trace!(
                "aborting {} transfer after {} of {} bytes",
                self.binding.endpoint,
                self.cursor.position(),
                self.cursor.total()
            );
        }
        self.binding.state = TransferState::Idle;
    }

    fn arm(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.binding.arm(owner, notifier)?;

        trace!(
            "{:?} armed {} transfer of {} bytes",
            owner,
            self.binding.endpoint,
            self.cursor.total()
        );

        Ok(())
    }

    fn advance(&mut self, bytes: usize) {
        assert_eq!(
            self.binding.state,
            TransferState::Armed,
            "driver reported progress for a transfer on {} that is not armed",
            self.binding.endpoint
        );
        self.cursor.advance(bytes);

        trace!(
            "{} moved {} bytes, {} remaining",
            self.binding.endpoint,
            bytes,
            self.cursor.remaining()
        );
    }

    fn complete(&mut self) {
        assert_eq!(
            self.binding.state,
            TransferState::Armed,
            "completion reported for a transfer on {} that is not armed",
            self.binding.endpoint
        );

        let completion = Completion {
            owner: self.binding.owner,
            endpoint: self.binding.endpoint,
            transferred: self.cursor.position(),
            total: self.cursor.total(),
        };

        self.binding.state = TransferState::Completing;
        if let Some(notifier) = self.binding.notifier {
            notifier.notify(completion);
        }
        self.binding.state = TransferState::Idle;
    }
}
