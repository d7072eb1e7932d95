//! A controller driver fake that records what handlers ask of it.

use super::{ControlEndpoint, DeviceController};

/// Records every call instead of touching hardware.
#[derive(Debug)]
pub struct RecordingDevice {
    /// Every address passed to `set_address`.
    pub addresses: Vec<u8>,
    /// Every value passed to `set_configuration`.
    pub configurations: Vec<u8>,
    /// Whether `set_configuration` accepts the value.
    pub accept_configuration: bool,
    /// The number of `transmit_zlp` calls.
    pub zlps: usize,
    /// The number of `start_in_transfer` calls.
    pub in_transfers: usize,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            configurations: Vec::new(),
            accept_configuration: true,
            zlps: 0,
            in_transfers: 0,
        }
    }
}

impl DeviceController for RecordingDevice {
    fn set_address(&mut self, address: u8) {
        self.addresses.push(address);
    }

    fn set_configuration(&mut self, configuration: u8) -> bool {
        self.configurations.push(configuration);
        self.accept_configuration
    }

    fn transmit_zlp(&mut self, _ep0: &mut ControlEndpoint<'_>) {
        self.zlps += 1;
    }

    fn start_in_transfer(&mut self, _ep0: &mut ControlEndpoint<'_>) {
        self.in_transfers += 1;
    }
}
