//! The standard requests of Chapter 9 of the USB 2.0 specification.
//!
//! Only the subset a simple device needs during enumeration is answered:
//! `GET_DESCRIPTOR`, `SET_ADDRESS`, `SET_CONFIGURATION`, `SET_INTERFACE` and
//! `GET_STATUS`. Everything else is left to other layers.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use super::{ControlContext, ControlHandler, SetupResult};
use crate::device::{
    constants::{request, DEVICE_STATUS},
    descriptor::{DescriptorError, DescriptorTables},
    setup::{Direction, Recipient, SetupPacket},
    transfer::{Notify, OwnerId, TransferError},
};

/// Why a recognized request ends in a stall.
#[derive(Error, Debug)]
enum DispatchError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("Device rejected configuration {0}")]
    ConfigurationRejected(u8),
}

/// Answers standard device requests from a set of descriptor tables.
///
/// The handler keeps nothing between control transfers. Everything that
/// outlives a call is recorded in the transfer it arms on endpoint zero.
pub struct StandardRequests<'a> {
    descriptors: DescriptorTables<'a>,
    owner: OwnerId,
    notifier: Option<&'a dyn Notify>,
}

impl fmt::Debug for StandardRequests<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardRequests")
            .field("descriptors", &self.descriptors)
            .field("owner", &self.owner)
            .field("notifier", &self.notifier.is_some())
            .finish()
    }
}

impl<'a> StandardRequests<'a> {
    /// Serve descriptors from `descriptors`.
    #[must_use]
    pub const fn new(descriptors: DescriptorTables<'a>) -> Self {
        Self {
            descriptors,
            owner: OwnerId::STANDARD_REQUESTS,
            notifier: None,
        }
    }

    /// Report the completion of every transfer this handler arms to
    /// `notifier`.
    #[must_use]
    pub fn with_notifier(mut self, notifier: &'a dyn Notify) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Returns true for the requests this handler answers.
    fn recognizes(setup: &SetupPacket) -> bool {
        let request_type = setup.request_type;

        match setup.request {
            request::GET_DESCRIPTOR | request::GET_STATUS => {
                request_type.is_standard(Direction::In, Recipient::Device)
            }
            request::SET_ADDRESS | request::SET_CONFIGURATION => {
                request_type.is_standard(Direction::Out, Recipient::Device)
            }
            request::SET_INTERFACE => request_type.is_standard(Direction::Out, Recipient::Interface),
            _ => false,
        }
    }

    fn dispatch(&self, ctx: &mut ControlContext<'_, 'a>) -> Result<SetupResult, DispatchError> {
        let setup = *ctx.setup;

        if !Self::recognizes(&setup) {
            return Ok(SetupResult::Unhandled);
        }

        // A new setup packet overrides whatever endpoint zero was doing.
        ctx.ep0.abort();

        match setup.request {
            request::GET_DESCRIPTOR => self.get_descriptor(&setup, ctx),
            request::SET_ADDRESS => {
                let address = setup.value_low();
                debug!("SET_ADDRESS {}", address);

                ctx.device.set_address(address);
                self.acknowledge(ctx)
            }
            request::SET_CONFIGURATION => {
                let configuration = setup.value_low();
                debug!("SET_CONFIGURATION {}", configuration);

                if !ctx.device.set_configuration(configuration) {
                    return Err(DispatchError::ConfigurationRejected(configuration));
                }
                self.acknowledge(ctx)
            }
            request::SET_INTERFACE => {
                // Alternate settings are not modeled, every one is accepted.
                debug!(
                    "SET_INTERFACE interface={} alternate={}",
                    setup.index, setup.value
                );

                self.acknowledge(ctx)
            }
            request::GET_STATUS => {
                // Neither self-powered nor remote wakeup is reported.
                let status: &'static [u8] = &DEVICE_STATUS;
                debug!("GET_STATUS length={}", setup.length);

                ctx.ep0
                    .init_transfer(status, setup.length, self.owner, self.notifier)?;
                ctx.device.start_in_transfer(ctx.ep0);

                Ok(SetupResult::DataStage)
            }
            _ => Ok(SetupResult::Unhandled),
        }
    }

    fn get_descriptor(
        &self,
        setup: &SetupPacket,
        ctx: &mut ControlContext<'_, 'a>,
    ) -> Result<SetupResult, DispatchError> {
        let descriptor = self
            .descriptors
            .select(setup.value_high(), setup.value_low(), setup.index)?;

        debug!(
            "GET_DESCRIPTOR type={:#04x} index={} has {} bytes, host wants {}",
            setup.value_high(),
            setup.value_low(),
            descriptor.len(),
            setup.length
        );

        ctx.ep0
            .init_transfer(descriptor, setup.length, self.owner, self.notifier)?;
        ctx.device.start_in_transfer(ctx.ep0);

        Ok(SetupResult::DataStage)
    }

    /// Finish a request without data stage by arming the status packet.
    fn acknowledge(&self, ctx: &mut ControlContext<'_, 'a>) -> Result<SetupResult, DispatchError> {
        ctx.ep0.init_status_in(self.owner, self.notifier)?;
        ctx.device.transmit_zlp(ctx.ep0);

        Ok(SetupResult::NoDataStage)
    }
}

impl<'a> ControlHandler<'a> for StandardRequests<'a> {
    fn handle_ctrl_setup_stage(&mut self, ctx: &mut ControlContext<'_, 'a>) -> SetupResult {
        self.dispatch(ctx).unwrap_or_else(|e| {
            warn!("Stalling {}: {}", ctx.setup, e);
            SetupResult::Stall
        })
    }
}
