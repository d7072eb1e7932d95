//! The transfer that moves no data, used for status stages.

use super::{
    EndpointAddress, Notify, OwnerId, ReceiveTransfer, Transfer, TransferError, TransmitTransfer,
};

/// Storage of a [`ZeroLengthTransfer`]: there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroLength;

/// A transfer of zero bytes in either direction.
///
/// Regions are always `None` and [`remaining`](Transfer::remaining) is
/// always 0, but the transfer is armed and completed like any other, so its
/// completion still reaches the owner.
pub type ZeroLengthTransfer<'a> = Transfer<'a, ZeroLength>;

impl<'a> Transfer<'a, ZeroLength> {
    /// Create an idle zero-length transfer on `endpoint`.
    #[must_use]
    pub const fn new(endpoint: EndpointAddress) -> Self {
        Self::with_storage(endpoint, ZeroLength, 0)
    }

    /// Arm the transfer for `owner`.
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

        Ok(self)
    }
}

impl ReceiveTransfer for Transfer<'_, ZeroLength> {
    fn write_region(&mut self, _requested: usize) -> Option<&mut [u8]> {
        None
    }

    fn remaining(&self) -> usize {
        0
    }

    fn notify_filled(&mut self, bytes: usize) {
        self.advance(bytes);
    }

    fn notify_complete(&mut self) {
        self.complete();
    }
}

impl TransmitTransfer for Transfer<'_, ZeroLength> {
    fn read_region(&self) -> Option<&[u8]> {
        None
    }

    fn remaining(&self) -> usize {
        0
    }

    fn notify_transferred(&mut self, bytes: usize) {
        self.advance(bytes);
    }

    fn notify_complete(&mut self) {
        self.complete();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::device::transfer::{Completion, TransferState};

    #[test]
    fn zero_length_transfer_has_no_region() {
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_IN);
        zlp.init(OwnerId(1), None).unwrap();

        for requested in [0, 1, 8, 64, usize::MAX] {
            assert!(zlp.write_region(requested).is_none());
            assert_eq!(ReceiveTransfer::remaining(&zlp), 0);
        }
        assert!(zlp.read_region().is_none());
        assert_eq!(TransmitTransfer::remaining(&zlp), 0);
        assert_eq!(zlp.fill_from(&[1, 2, 3]), 0);
        assert_eq!(zlp.drain_into(&mut [0; 8]), 0);
    }

    #[test]
    fn zero_length_completion_reaches_owner() {
        let seen = Cell::new(None);
        let notifier = |c: Completion| seen.set(Some(c));
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_OUT);

        zlp.init(OwnerId(7), Some(&notifier)).unwrap();
        assert_eq!(zlp.state(), TransferState::Armed);

        ReceiveTransfer::notify_complete(&mut zlp);

        assert_eq!(zlp.state(), TransferState::Idle);
        assert_eq!(
            seen.get(),
            Some(Completion {
                owner: Some(OwnerId(7)),
                endpoint: EndpointAddress::CONTROL_OUT,
                transferred: 0,
                total: 0,
            })
        );
    }

    #[test]
    fn zero_length_transfer_cannot_be_armed_twice() {
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_IN);

        zlp.init(OwnerId(1), None).unwrap();

        assert_eq!(
            zlp.init(OwnerId(2), None).err(),
            Some(TransferError::Busy {
                endpoint: EndpointAddress::CONTROL_IN,
                owner: Some(OwnerId(1)),
            })
        );

        zlp.abort();
        assert!(zlp.init(OwnerId(2), None).is_ok());
        assert_eq!(zlp.owner(), Some(OwnerId(2)));
    }

    #[test]
    fn reinit_arms_again_with_same_owner() {
        let completions = Cell::new(0);
        let notifier = |_: Completion| completions.set(completions.get() + 1);
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_IN);

        zlp.init(OwnerId(4), Some(&notifier)).unwrap();
        zlp.drain_into(&mut [0; 8]);
        TransmitTransfer::notify_complete(&mut zlp);

        zlp.reinit().unwrap();
        assert_eq!(zlp.state(), TransferState::Armed);
        assert_eq!(zlp.transferred(), 0);
        assert_eq!(zlp.total_size(), 0);

        TransmitTransfer::notify_complete(&mut zlp);
        assert_eq!(completions.get(), 2);
        assert_eq!(zlp.owner(), Some(OwnerId(4)));
    }

    #[test]
    #[should_panic(expected = "reported progress")]
    fn progress_on_idle_zero_length_transfer_panics() {
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_OUT);

        zlp.notify_filled(0);
    }

    #[test]
    #[should_panic(expected = "not armed")]
    fn completing_an_idle_transfer_panics() {
        let mut zlp = ZeroLengthTransfer::new(EndpointAddress::CONTROL_IN);

        TransmitTransfer::notify_complete(&mut zlp);
    }
}
