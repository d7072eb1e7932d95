//! # Control Transfers
//!
//! Control transfers on endpoint zero run through up to three stages:
//! setup, an optional data stage and a status stage. The driver reports
//! each stage to a stack of [`ControlHandler`]s. Handlers do not keep state
//! between these calls; everything that has to survive until the next
//! interrupt is recorded in the transfer they arm on the
//! [`ControlEndpoint`].
//!
//! [`StandardRequests`](standard::StandardRequests) resolves the requests
//! every device has to understand. Class or vendor handlers are layered in
//! front of it with a [`ControlPipe`], which also implements the fallback
//! policy: a setup packet no layer recognizes is stalled.

use std::fmt;

use tracing::debug;

use crate::device::{setup::SetupPacket, transfer::EndpointAddress};

pub mod endpoint;
pub mod standard;

#[cfg(test)]
pub mod testutils;

pub use endpoint::ControlEndpoint;

/// The outcome of the setup stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupResult {
    /// A data stage transfer was armed and started.
    DataStage,
    /// The request is complete, the status stage was armed.
    NoDataStage,
    /// The request is invalid. The driver has to stall endpoint zero.
    Stall,
    /// The handler does not know this request. The next layer should try.
    Unhandled,
}

/// The outcome of a data stage hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataResult {
    /// The handler took care of the data stage.
    Handled,
    /// The handler has nothing to do with this data stage.
    Unhandled,
}

/// The operations the controller driver offers to protocol handlers.
///
/// This is the only way handlers touch the hardware.
pub trait DeviceController {
    /// Adopt a new device address.
    fn set_address(&mut self, address: u8);

    /// Apply the configuration with the given value.
    ///
    /// Returns false if the device has no such configuration.
    fn set_configuration(&mut self, configuration: u8) -> bool;

    /// Send the zero-length status packet armed on `ep0`.
    fn transmit_zlp(&mut self, ep0: &mut ControlEndpoint<'_>);

    /// Start sending the IN data stage armed on `ep0`.
    fn start_in_transfer(&mut self, ep0: &mut ControlEndpoint<'_>);
}

/// Everything a handler may look at or modify while processing one stage.
///
/// The context replaces global accessors for the current setup packet, the
/// device and endpoint zero.
pub struct ControlContext<'c, 'a> {
    /// The setup packet of the current control transfer.
    pub setup: &'c SetupPacket,
    /// The controller driver.
    pub device: &'c mut dyn DeviceController,
    /// Endpoint zero.
    pub ep0: &'c mut ControlEndpoint<'a>,
}

impl fmt::Debug for ControlContext<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlContext")
            .field("setup", &self.setup)
            .field("ep0", &self.ep0)
            .finish_non_exhaustive()
    }
}

impl<'c, 'a> ControlContext<'c, 'a> {
    /// Bundle the state of one control transfer stage.
    pub fn new(
        setup: &'c SetupPacket,
        device: &'c mut dyn DeviceController,
        ep0: &'c mut ControlEndpoint<'a>,
    ) -> Self {
        Self { setup, device, ep0 }
    }
}

/// A layer of control request handling.
///
/// Only [`handle_ctrl_setup_stage`](Self::handle_ctrl_setup_stage) is
/// required. The remaining hooks default to doing nothing, which is what a
/// layer that resolves everything in the setup stage wants.
pub trait ControlHandler<'a> {
    /// A setup packet arrived.
    fn handle_ctrl_setup_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> SetupResult;

    /// The IN data stage needs attention.
    fn handle_ctrl_in_data_stage(&mut self, _ctx: &mut ControlContext<'_, 'a>) -> DataResult {
        DataResult::Unhandled
    }

    /// The OUT data stage needs attention.
    fn handle_ctrl_out_data_stage(&mut self, _ctx: &mut ControlContext<'_, 'a>) -> DataResult {
        DataResult::Unhandled
    }

    /// The status stage finished.
    fn handle_ctrl_status_stage(&mut self, _ctx: &mut ControlContext<'_, 'a>) {}

    /// A transfer on a non-control IN endpoint finished.
    fn handle_in_transfer(&mut self, _endpoint: EndpointAddress) {}

    /// A transfer on a non-control OUT endpoint finished.
    fn handle_out_transfer(&mut self, _endpoint: EndpointAddress) {}
}

/// An ordered stack of [`ControlHandler`]s.
///
/// Layers are asked in order. The first one that resolves a stage wins.
pub struct ControlPipe<'p, 'h, 'a> {
    layers: &'p mut [&'h mut dyn ControlHandler<'a>],
}

impl fmt::Debug for ControlPipe<'_, '_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPipe")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl<'p, 'h, 'a> ControlPipe<'p, 'h, 'a> {
    /// Create a pipe that asks `layers` front to back.
    pub fn new(layers: &'p mut [&'h mut dyn ControlHandler<'a>]) -> Self {
        Self { layers }
    }

    /// Resolve a setup packet.
    ///
    /// Whatever endpoint zero was doing is aborted first: a new setup packet
    /// always overrides the previous control transfer. If no layer handles
    /// the request, the result is [`SetupResult::Stall`].
    pub fn setup_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> SetupResult {
        ctx.ep0.abort();

        let resolved = self
            .layers
            .iter_mut()
            .map(|layer| layer.handle_ctrl_setup_stage(ctx))
            .find(|result| *result != SetupResult::Unhandled);

        resolved.unwrap_or_else(|| {
            debug!("no handler for setup packet {}, stalling", ctx.setup);
            SetupResult::Stall
        })
    }

    /// Offer the IN data stage to the layers until one handles it.
    pub fn in_data_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> DataResult {
        self.layers
            .iter_mut()
            .map(|layer| layer.handle_ctrl_in_data_stage(ctx))
            .find(|result| *result == DataResult::Handled)
            .unwrap_or(DataResult::Unhandled)
    }

    /// Offer the OUT data stage to the layers until one handles it.
    pub fn out_data_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> DataResult {
        self.layers
            .iter_mut()
            .map(|layer| layer.handle_ctrl_out_data_stage(ctx))
            .find(|result| *result == DataResult::Handled)
            .unwrap_or(DataResult::Unhandled)
    }

    /// Tell every layer that the status stage finished.
    pub fn status_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) {
        for layer in self.layers.iter_mut() {
            layer.handle_ctrl_status_stage(ctx);
        }
    }

    /// Tell every layer that a transfer on a non-control IN endpoint finished.
    pub fn in_transfer(&mut self, endpoint: EndpointAddress) {
        for layer in self.layers.iter_mut() {
            layer.handle_in_transfer(endpoint);
        }
    }

    /// Tell every layer that a transfer on a non-control OUT endpoint finished.
    pub fn out_transfer(&mut self, endpoint: EndpointAddress) {
        for layer in self.layers.iter_mut() {
            layer.handle_out_transfer(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::standard::StandardRequests;
    use super::testutils::RecordingDevice;
    use super::*;
    use crate::device::{descriptor::testutils::TABLES, transfer::TransmitTransfer};

    /// A class layer that claims one vendor request and counts what it sees.
    #[derive(Debug, Default)]
    struct VendorLayer {
        setups: usize,
        status_stages: usize,
        in_transfers: Vec<EndpointAddress>,
    }

    const VENDOR_REQUEST: u8 = 0x42;

    impl<'a> ControlHandler<'a> for VendorLayer {
        fn handle_ctrl_setup_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> SetupResult {
            self.setups += 1;

            if u8::from(ctx.setup.request_type) == 0x40 && ctx.setup.request == VENDOR_REQUEST {
                SetupResult::NoDataStage
            } else {
                SetupResult::Unhandled
            }
        }

        fn handle_ctrl_status_stage(&mut self, _ctx: &mut ControlContext<'_, 'a>) {
            self.status_stages += 1;
        }

        fn handle_in_transfer(&mut self, endpoint: EndpointAddress) {
            self.in_transfers.push(endpoint);
        }
    }

    fn setup(bytes: [u8; 8]) -> SetupPacket {
        SetupPacket::from_bytes(bytes)
    }

    #[test]
    fn first_layer_to_resolve_wins() {
        let mut vendor = VendorLayer::default();
        let mut standard = StandardRequests::new(TABLES);
        let mut device = RecordingDevice::default();
        let mut ep0 = ControlEndpoint::new(64);

        let packet = setup([0x40, VENDOR_REQUEST, 0, 0, 0, 0, 0, 0]);
        {
            let mut layers: [&mut dyn ControlHandler<'_>; 2] = [&mut vendor, &mut standard];
            let mut pipe = ControlPipe::new(&mut layers);
            let mut ctx = ControlContext::new(&packet, &mut device, &mut ep0);

            assert_eq!(pipe.setup_stage(&mut ctx), SetupResult::NoDataStage);
        }

        assert_eq!(vendor.setups, 1);
        assert_eq!(device.in_transfers, 0);
    }

    #[test]
    fn standard_requests_fall_through_class_layer() {
        let mut vendor = VendorLayer::default();
        let mut standard = StandardRequests::new(TABLES);
        let mut device = RecordingDevice::default();
        let mut ep0 = ControlEndpoint::new(64);

        let packet = setup([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
        {
            let mut layers: [&mut dyn ControlHandler<'_>; 2] = [&mut vendor, &mut standard];
            let mut pipe = ControlPipe::new(&mut layers);
            let mut ctx = ControlContext::new(&packet, &mut device, &mut ep0);

            assert_eq!(pipe.setup_stage(&mut ctx), SetupResult::DataStage);
        }

        assert_eq!(vendor.setups, 1);
        assert_eq!(ep0.in_transfer().total_size(), 18);
    }

    #[test]
    fn unhandled_everywhere_means_stall() {
        let mut vendor = VendorLayer::default();
        let mut standard = StandardRequests::new(TABLES);
        let mut device = RecordingDevice::default();
        let mut ep0 = ControlEndpoint::new(64);

        // GET_CONFIGURATION is a standard request this stack does not answer.
        let packet = setup([0x80, 0x08, 0, 0, 0, 0, 1, 0]);
        let mut layers: [&mut dyn ControlHandler<'_>; 2] = [&mut vendor, &mut standard];
        let mut pipe = ControlPipe::new(&mut layers);
        let mut ctx = ControlContext::new(&packet, &mut device, &mut ep0);

        assert_eq!(pipe.setup_stage(&mut ctx), SetupResult::Stall);
        assert_eq!(pipe.in_data_stage(&mut ctx), DataResult::Unhandled);
        assert_eq!(pipe.out_data_stage(&mut ctx), DataResult::Unhandled);
    }

    #[test]
    fn new_setup_aborts_pending_transfer() {
        let mut standard = StandardRequests::new(TABLES);
        let mut device = RecordingDevice::default();
        let mut ep0 = ControlEndpoint::new(64);
        let get_device = setup([0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
        let get_status = setup([0x80, 0x00, 0, 0, 0, 0, 2, 0]);

        let mut layers: [&mut dyn ControlHandler<'_>; 1] = [&mut standard];
        let mut pipe = ControlPipe::new(&mut layers);

        let mut ctx = ControlContext::new(&get_device, &mut device, &mut ep0);
        assert_eq!(pipe.setup_stage(&mut ctx), SetupResult::DataStage);
        ctx.ep0.in_transfer_mut().notify_transferred(8);

        // The host gives up and sends another setup packet.
        let mut ctx = ControlContext::new(&get_status, &mut device, &mut ep0);
        assert_eq!(pipe.setup_stage(&mut ctx), SetupResult::DataStage);
        assert_eq!(ctx.ep0.in_transfer().total_size(), 2);
        assert_eq!(ctx.ep0.in_transfer().transferred(), 0);
    }

    #[test]
    fn notifications_are_broadcast() {
        let mut first = VendorLayer::default();
        let mut second = VendorLayer::default();
        let mut device = RecordingDevice::default();
        let mut ep0 = ControlEndpoint::new(64);
        let packet = setup([0x40, VENDOR_REQUEST, 0, 0, 0, 0, 0, 0]);
        let bulk_in = EndpointAddress::new(1, crate::device::setup::Direction::In);

        {
            let mut layers: [&mut dyn ControlHandler<'_>; 2] = [&mut first, &mut second];
            let mut pipe = ControlPipe::new(&mut layers);
            let mut ctx = ControlContext::new(&packet, &mut device, &mut ep0);

            pipe.status_stage(&mut ctx);
            pipe.in_transfer(bulk_in);
        }

        assert_eq!(first.status_stages, 1);
        assert_eq!(second.status_stages, 1);
        assert_eq!(first.in_transfers, vec![bulk_in]);
        assert_eq!(second.in_transfers, vec![bulk_in]);
    }
}
