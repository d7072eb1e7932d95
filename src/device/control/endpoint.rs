//! Endpoint zero, as seen by control request handlers.
//!
//! The control endpoint holds exactly one transfer per direction. Handlers
//! arm them through the `init_*` methods, which pick the transfer variant
//! and refuse to replace a transfer the driver is still working on.

use crate::device::{
    constants::endpoint::CONTROL_BUFFER_SIZE,
    descriptor::negotiate_length,
    transfer::{
        EndpointAddress, ExternalBufferTransfer, InTransfer, Notify, OutTransfer,
        OwnedBufferTransfer, OwnerId, SpanTransfer, TransferError, ZeroLengthTransfer,
    },
};

/// The transfer slots of endpoint zero.
#[derive(Debug)]
pub struct ControlEndpoint<'a> {
    max_packet_size: u16,
    in_transfer: InTransfer<'a>,
    out_transfer: OutTransfer<'a, CONTROL_BUFFER_SIZE>,
}

impl<'a> ControlEndpoint<'a> {
    /// Create an idle control endpoint.
    #[must_use]
    pub const fn new(max_packet_size: u16) -> Self {
        Self {
            max_packet_size,
            in_transfer: InTransfer::ZeroLength(ZeroLengthTransfer::new(
                EndpointAddress::CONTROL_IN,
            )),
            out_transfer: OutTransfer::Owned(OwnedBufferTransfer::new(
                EndpointAddress::CONTROL_OUT,
            )),
        }
    }

    /// The largest packet the endpoint moves at once.
    #[must_use]
    pub const fn max_packet_size(&self) -> u16 {
        self.max_packet_size
    }

    /// Arm an IN data stage that sends `data`, cut to the `length` the host
    /// asked for.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the IN transfer is still active.
    pub fn init_transfer(
        &mut self,
        data: &'a [u8],
        length: u16,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_in_idle()?;

        let data = &data[..negotiate_length(data.len(), length)];
        let mut transfer = SpanTransfer::new(EndpointAddress::CONTROL_IN);
        transfer.init(data, owner, notifier)?;
        self.in_transfer = InTransfer::Span(transfer);

        Ok(())
    }

    /// Arm a zero-length IN packet, the status stage of OUT and no-data
    /// requests.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the IN transfer is still active.
    pub fn init_status_in(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_in_idle()?;

        let mut transfer = ZeroLengthTransfer::new(EndpointAddress::CONTROL_IN);
        transfer.init(owner, notifier)?;
        self.in_transfer = InTransfer::ZeroLength(transfer);

        Ok(())
    }

    /// Arm a zero-length OUT packet, the status stage of IN requests.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the OUT transfer is still active.
    pub fn init_status_out(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_out_idle()?;

        let mut transfer = ZeroLengthTransfer::new(EndpointAddress::CONTROL_OUT);
        transfer.init(owner, notifier)?;
        self.out_transfer = OutTransfer::ZeroLength(transfer);

        Ok(())
    }

    /// Arm an OUT data stage into the endpoint's own buffer.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the OUT transfer is still active.
    pub fn init_out_buffer(
        &mut self,
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_out_idle()?;

        let mut transfer = OwnedBufferTransfer::new(EndpointAddress::CONTROL_OUT);
        transfer.init(owner, notifier)?;
        self.out_transfer = OutTransfer::Owned(transfer);

        Ok(())
    }

    /// Arm an OUT data stage that lands directly in `buffer`.
    ///
    /// # Errors
    ///
    /// [`TransferError::Busy`] if the OUT transfer is still active.
    pub fn init_out_into(
        &mut self,
        buffer: &'a mut [u8],
        owner: OwnerId,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<(), TransferError> {
        self.ensure_out_idle()?;

        let mut transfer = ExternalBufferTransfer::new(EndpointAddress::CONTROL_OUT);
        transfer.init(buffer, owner, notifier)?;
        self.out_transfer = OutTransfer::External(transfer);

        Ok(())
    }

    /// Drop whatever both directions were doing.
    pub fn abort(&mut self) {
        self.in_transfer.abort();
        self.out_transfer.abort();
    }

    /// The IN transfer slot.
    #[must_use]
    pub const fn in_transfer(&self) -> &InTransfer<'a> {
        &self.in_transfer
    }

    /// The IN transfer slot, for the driver.
    pub fn in_transfer_mut(&mut self) -> &mut InTransfer<'a> {
        &mut self.in_transfer
    }

    /// The OUT transfer slot.
    #[must_use]
    pub const fn out_transfer(&self) -> &OutTransfer<'a, CONTROL_BUFFER_SIZE> {
        &self.out_transfer
    }

    /// The OUT transfer slot, for the driver.
    pub fn out_transfer_mut(&mut self) -> &mut OutTransfer<'a, CONTROL_BUFFER_SIZE> {
        &mut self.out_transfer
    }

    fn ensure_in_idle(&self) -> Result<(), TransferError> {
        if self.in_transfer.is_active() {
            return Err(TransferError::Busy {
                endpoint: self.in_transfer.endpoint(),
                owner: self.in_transfer.owner(),
            });
        }
        Ok(())
    }

    fn ensure_out_idle(&self) -> Result<(), TransferError> {
        if self.out_transfer.is_active() {
            return Err(TransferError::Busy {
                endpoint: self.out_transfer.endpoint(),
                owner: self.out_transfer.owner(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::transfer::{
        CompletionQueue, ReceiveTransfer, TransferState, TransmitTransfer,
    };

    const OWNER: OwnerId = OwnerId(7);

    #[test]
    fn in_data_is_cut_to_requested_length() {
        let data = [1, 2, 3, 4, 5];
        let mut ep0 = ControlEndpoint::new(64);

        ep0.init_transfer(&data, 3, OWNER, None).unwrap();

        assert!(matches!(ep0.in_transfer(), InTransfer::Span(_)));
        assert_eq!(ep0.in_transfer().total_size(), 3);
        assert_eq!(ep0.in_transfer().read_region(), Some(&data[..3]));
        assert_eq!(ep0.in_transfer().owner(), Some(OWNER));
    }

    #[test]
    fn in_slot_is_guarded_while_active() {
        let data = [0u8; 4];
        let mut ep0 = ControlEndpoint::new(64);

        ep0.init_transfer(&data, 4, OWNER, None).unwrap();

        assert_eq!(
            ep0.init_status_in(OwnerId(1), None),
            Err(TransferError::Busy {
                endpoint: EndpointAddress::CONTROL_IN,
                owner: Some(OWNER),
            })
        );

        ep0.in_transfer_mut().notify_transferred(4);
        ep0.in_transfer_mut().notify_complete();
        ep0.init_status_in(OwnerId(1), None).unwrap();

        assert!(matches!(ep0.in_transfer(), InTransfer::ZeroLength(_)));
        assert_eq!(ep0.in_transfer().state(), TransferState::Armed);
    }

    #[test]
    fn out_slot_switches_variants() {
        let mut target = [0u8; 3];
        let mut ep0 = ControlEndpoint::new(64);

        ep0.init_status_out(OWNER, None).unwrap();
        assert!(ep0.out_transfer_mut().write_region(8).is_none());
        ep0.out_transfer_mut().notify_complete();

        ep0.init_out_buffer(OWNER, None).unwrap();
        assert_eq!(ep0.out_transfer().total_size(), CONTROL_BUFFER_SIZE);
        assert_eq!(ep0.out_transfer_mut().fill_from(&[9, 8]), 2);
        assert_eq!(ep0.out_transfer().received(), &[9, 8]);
        ep0.out_transfer_mut().notify_complete();

        ep0.init_out_into(&mut target, OWNER, None).unwrap();
        assert_eq!(ep0.out_transfer_mut().fill_from(&[1, 2, 3, 4]), 3);
        ep0.out_transfer_mut().notify_complete();
        assert_eq!(ep0.out_transfer().received(), &[1, 2, 3]);
    }

    #[test]
    fn abort_idles_both_directions_silently() {
        let queue = CompletionQueue::<4>::new();
        let data = [0u8; 8];
        let mut ep0 = ControlEndpoint::new(8);

        ep0.init_transfer(&data, 8, OWNER, Some(&queue)).unwrap();
        ep0.init_status_out(OWNER, Some(&queue)).unwrap();
        ep0.abort();

        assert!(!ep0.in_transfer().is_active());
        assert!(!ep0.out_transfer().is_active());
        assert!(queue.is_empty());
        assert_eq!(ep0.max_packet_size(), 8);
    }
}
