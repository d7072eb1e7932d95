//! Receiving into a buffer that lives inside the transfer.

use super::{EndpointAddress, Notify, OwnerId, ReceiveTransfer, Transfer, TransferError};

/// Storage of an [`OwnedBufferTransfer`]: `SIZE` bytes embedded in the
/// transfer itself.
#[derive(Debug, Clone)]
pub struct Owned<const SIZE: usize> {
    buffer: [u8; SIZE],
}

/// A receive transfer into a private, reusable buffer of `SIZE` bytes.
///
/// Every arming offers the whole buffer to the driver. After completion the
/// owner reads the data with [`received`](Transfer::received).
pub type OwnedBufferTransfer<'a, const SIZE: usize> = Transfer<'a, Owned<SIZE>>;

impl<'a, const SIZE: usize> Transfer<'a, Owned<SIZE>> {
    /// Create an idle transfer with a zeroed buffer.
    #[must_use]
    pub const fn new(endpoint: EndpointAddress) -> Self {
        Self::with_storage(endpoint, Owned { buffer: [0; SIZE] }, SIZE)
    }

    /// Arm the transfer for `owner`, offering the whole buffer.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the transfer is still active.
    pub fn init(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<&mut Self, TransferError> {
        self.arm(owner, notifier)?;
        self.cursor.rewind();

        Ok(self)
    }

    /// The bytes the driver has filled in so far.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        &self.storage.buffer[..self.cursor.position()]
    }

    /// The complete buffer, including bytes beyond what was received.
    #[must_use]
    pub const fn buffer(&self) -> &[u8; SIZE] {
        &self.storage.buffer
    }
}

impl<const SIZE: usize> ReceiveTransfer for Transfer<'_, Owned<SIZE>> {
    fn write_region(&mut self, requested: usize) -> Option<&mut [u8]> {
        let window = self.cursor.window(requested);

        Some(&mut self.storage.buffer[window])
    }

    fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn notify_filled(&mut self, bytes: usize) {
        self.advance(bytes);
    }

    fn notify_complete(&mut self) {
        self.complete();
    }
}
