//! Transmitting from a read-only region owned by someone else.

use super::{Cursor, EndpointAddress, Notify, OwnerId, Transfer, TransferError, TransmitTransfer};

/// Storage of a [`SpanTransfer`]: a borrowed, read-only slice.
#[derive(Debug, Default, Clone, Copy)]
pub struct Span<'a> {
    data: &'a [u8],
}

/// A transmit transfer streaming from caller-owned bytes, typically
/// descriptors or other static data.
pub type SpanTransfer<'a> = Transfer<'a, Span<'a>>;

impl<'a> Transfer<'a, Span<'a>> {
    /// Create an idle transfer without data.
    #[must_use]
    pub const fn new(endpoint: EndpointAddress) -> Self {
        Self::with_storage(endpoint, Span { data: &[] }, 0)
    }

    /// Arm the transfer to send all of `data`.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the transfer is still active.
    pub fn init(
        &mut self,
        data: &'a [u8],
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<&mut Self, TransferError> {
        self.arm(owner, notifier)?;
        self.cursor = Cursor::new(data.len());
        self.storage.data = data;

        Ok(self)
    }

    /// The complete region this transfer sends.
    #[must_use]
    pub const fn data(&self) -> &'a [u8] {
        self.storage.data
    }
}

impl TransmitTransfer for Transfer<'_, Span<'_>> {
    fn read_region(&self) -> Option<&[u8]> {
        Some(&self.storage.data[self.cursor.position()..])
    }

    fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn notify_transferred(&mut self, bytes: usize) {
        self.advance(bytes);
    }

    fn notify_complete(&mut self) {
        self.complete();
    }
}
