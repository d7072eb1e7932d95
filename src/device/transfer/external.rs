//! Receiving into memory supplied by the caller.

use super::{Cursor, EndpointAddress, Notify, OwnerId, ReceiveTransfer, Transfer, TransferError};

/// Storage of an [`ExternalBufferTransfer`]: a borrowed, mutable slice.
#[derive(Debug, Default)]
pub struct External<'a> {
    buffer: &'a mut [u8],
}

/// A receive transfer into application memory.
///
/// The transfer does not own the buffer. It borrows it from arming until
/// the transfer is dropped or armed with a different buffer.
pub type ExternalBufferTransfer<'a> = Transfer<'a, External<'a>>;

impl<'a> Transfer<'a, External<'a>> {
    /// Create an idle transfer without a buffer.
    #[must_use]
    pub fn new(endpoint: EndpointAddress) -> Self {
        Self::with_storage(endpoint, External::default(), 0)
    }

    /// Arm the transfer to receive up to `buffer.len()` bytes into `buffer`.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the transfer is still active. The buffer
    /// is not taken in that case.
    pub fn init(
        &mut self,
        buffer: &'a mut [u8],
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<&mut Self, TransferError> {
        self.arm(owner, notifier)?;
        self.cursor = Cursor::new(buffer.len());
        self.storage.buffer = buffer;

        Ok(self)
    }

    /// The bytes the driver has filled in so far.
    #[must_use]
    pub fn received(&self) -> &[u8] {
        &self.storage.buffer[..self.cursor.position()]
    }
}

impl ReceiveTransfer for Transfer<'_, External<'_>> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn external_buffer_receives_in_place() {
        let mut memory = [0u8; 6];

        {
            let mut transfer = ExternalBufferTransfer::new(EndpointAddress::CONTROL_OUT);
            transfer.init(&mut memory, OwnerId(1), None).unwrap();

            assert_eq!(transfer.total_size(), 6);
            assert_eq!(transfer.fill_from(&[0xaa, 0xbb]), 2);
            assert_eq!(transfer.received(), &[0xaa, 0xbb]);

            transfer.notify_complete();
        }

        assert_eq!(memory, [0xaa, 0xbb, 0, 0, 0, 0]);
    }

    #[test]
    fn reinit_rewinds_into_same_memory() {
        let mut memory = [0u8; 4];
        let mut transfer = ExternalBufferTransfer::new(EndpointAddress::CONTROL_OUT);

        transfer.init(&mut memory, OwnerId(1), None).unwrap();
        transfer.fill_from(&[1, 2, 3]);
        transfer.notify_complete();

        transfer.reinit().unwrap();
        assert_eq!(transfer.transferred(), 0);
        assert_eq!(transfer.remaining(), 4);

        transfer.fill_from(&[9]);
        assert_eq!(transfer.received(), &[9]);
    }

    #[test]
    fn unarmed_external_transfer_is_empty() {
        let mut transfer = ExternalBufferTransfer::new(EndpointAddress::CONTROL_OUT);

        assert_eq!(transfer.remaining(), 0);
        assert_eq!(transfer.write_region(8).map(|r| r.len()), Some(0));
    }

    proptest! {
        #[test]
        fn progress_adds_up(
            size in 0usize..512,
            chunks in proptest::collection::vec(0usize..64, 0..32),
        ) {
            let mut memory = vec![0u8; size];
            let mut transfer = ExternalBufferTransfer::new(EndpointAddress::CONTROL_OUT);
            transfer.init(&mut memory, OwnerId(1), None).unwrap();

            for chunk in chunks {
                let filled = transfer.fill_from(&vec![0x5a; chunk]);

                prop_assert!(filled <= chunk);
                prop_assert_eq!(transfer.transferred() + transfer.remaining(), size);
            }
        }
    }
}
