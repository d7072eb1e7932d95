//! Closed sums over the transfer variants that can occupy one direction of
//! an endpoint.
//!
//! The driver sees a single type per direction and never needs to know the
//! variant. Dispatch is a `match`, not a virtual call.

use super::{
    EndpointAddress, ExternalBufferTransfer, OwnedBufferTransfer, OwnerId, ReceiveTransfer,
    SpanTransfer, TransferState, TransmitTransfer, ZeroLengthTransfer,
};

/// Any transfer that can send data to the host.
#[derive(Debug)]
pub enum InTransfer<'a> {
    /// A zero-length packet, e.g. the status stage of a no-data request.
    ZeroLength(ZeroLengthTransfer<'a>),
    /// Bytes from a read-only region.
    Span(SpanTransfer<'a>),
}

/// Any transfer that can receive data from the host.
#[derive(Debug)]
pub enum OutTransfer<'a, const SIZE: usize> {
    /// A zero-length packet, e.g. the status stage of an IN request.
    ZeroLength(ZeroLengthTransfer<'a>),
    /// Bytes into a buffer embedded in the transfer.
    Owned(OwnedBufferTransfer<'a, SIZE>),
    /// Bytes into caller-supplied memory.
    External(ExternalBufferTransfer<'a>),
}

macro_rules! forward {
    ($transfer:expr, $t:ident => $body:expr) => {
        match $transfer {
            Self::ZeroLength($t) => $body,
            Self::Span($t) => $body,
        }
    };
}

macro_rules! forward_out {
    ($transfer:expr, $t:ident => $body:expr) => {
        match $transfer {
            Self::ZeroLength($t) => $body,
            Self::Owned($t) => $body,
            Self::External($t) => $body,
        }
    };
}

impl<'a> InTransfer<'a> {
    /// The endpoint of the current variant.
    #[must_use]
    pub const fn endpoint(&self) -> EndpointAddress {
        forward!(self, t => t.endpoint())
    }

    /// The owner of the current variant.
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        forward!(self, t => t.owner())
    }

    /// The activation state of the current variant.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        forward!(self, t => t.state())
    }

    /// See [`Transfer::is_active`](super::Transfer::is_active).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        forward!(self, t => t.is_active())
    }

    /// The size of the armed region.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        forward!(self, t => t.total_size())
    }

    /// The number of bytes sent so far.
    #[must_use]
    pub const fn transferred(&self) -> usize {
        forward!(self, t => t.transferred())
    }

    /// Drop the current activation without notifying anyone.
    pub fn abort(&mut self) {
        forward!(self, t => t.abort())
    }
}

impl TransmitTransfer for InTransfer<'_> {
    fn read_region(&self) -> Option<&[u8]> {
        forward!(self, t => t.read_region())
    }

    fn remaining(&self) -> usize {
        forward!(self, t => TransmitTransfer::remaining(t))
    }

    fn notify_transferred(&mut self, bytes: usize) {
        forward!(self, t => t.notify_transferred(bytes))
    }

    fn notify_complete(&mut self) {
        forward!(self, t => TransmitTransfer::notify_complete(t))
    }
}

impl<'a, const SIZE: usize> OutTransfer<'a, SIZE> {
    /// The endpoint of the current variant.
    #[must_use]
    pub const fn endpoint(&self) -> EndpointAddress {
        forward_out!(self, t => t.endpoint())
    }

    /// The owner of the current variant.
    #[must_use]
    pub const fn owner(&self) -> Option<OwnerId> {
        forward_out!(self, t => t.owner())
    }

    /// The activation state of the current variant.
    #[must_use]
    pub const fn state(&self) -> TransferState {
        forward_out!(self, t => t.state())
    }

    /// See [`Transfer::is_active`](super::Transfer::is_active).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        forward_out!(self, t => t.is_active())
    }

    /// The size of the armed region.
    #[must_use]
    pub const fn total_size(&self) -> usize {
        forward_out!(self, t => t.total_size())
    }

    /// The number of bytes received so far.
    #[must_use]
    pub const fn transferred(&self) -> usize {
        forward_out!(self, t => t.transferred())
    }

    /// The bytes received so far. Empty for zero-length transfers.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        match self {
            Self::ZeroLength(_) => &[],
            Self::Owned(t) => t.received(),
            Self::External(t) => t.received(),
        }
    }

    /// Drop the current activation without notifying anyone.
    pub fn abort(&mut self) {
        forward_out!(self, t => t.abort())
    }
}

impl<const SIZE: usize> ReceiveTransfer for OutTransfer<'_, SIZE> {
    fn write_region(&mut self, requested: usize) -> Option<&mut [u8]> {
        forward_out!(self, t => t.write_region(requested))
    }

    fn remaining(&self) -> usize {
        forward_out!(self, t => ReceiveTransfer::remaining(t))
    }

    fn notify_filled(&mut self, bytes: usize) {
        forward_out!(self, t => t.notify_filled(bytes))
    }

    fn notify_complete(&mut self) {
        forward_out!(self, t => ReceiveTransfer::notify_complete(t))
    }
}
