//! # Loopback Enumeration
//!
//! An in-memory controller driver and a host that enumerates the device
//! through it. IN data leaves endpoint zero in packets of the endpoint's
//! maximum packet size, exactly as a hardware driver would move it, and the
//! host reassembles the packets.

use anyhow::{bail, ensure, Context, Result};
use tracing::{debug, info, trace, warn};
use usbd_control::device::{
    constants::{descriptor_type, request},
    control::{
        standard::StandardRequests, ControlContext, ControlEndpoint, ControlHandler, ControlPipe,
        DataResult, DeviceController, SetupResult,
    },
    descriptor::DescriptorTables,
    setup::{Direction, Recipient, RequestKind, RequestType, SetupPacket},
    transfer::{CompletionQueue, Notify, OwnerId, ReceiveTransfer, TransmitTransfer},
};

/// The owner of the transfers the driver arms itself.
const DRIVER: OwnerId = OwnerId(0xff);

/// Completions that can pile up during one control transfer.
const QUEUE_DEPTH: usize = 8;

/// The only configuration the device offers.
const CONFIGURATION_VALUE: u8 = 1;

/// US English, the only language the device speaks.
const LANGUAGE_ID: u16 = 0x0409;

/// Manufacturer, product and serial number.
const STRINGS: [&str; 3] = ["usbd-control", "Loopback Device", "0001"];

/// The device descriptor. `bMaxPacketSize0` is patched in at runtime.
const DEVICE_DESCRIPTOR: [u8; 18] = [
    0x12, // bLength
    descriptor_type::DEVICE,
    0x00, 0x02, // bcdUSB 2.0
    0xff, 0x00, 0x00, // vendor-specific class
    0x40, // bMaxPacketSize0
    0x09, 0x12, // idVendor
    0x01, 0x00, // idProduct
    0x00, 0x01, // bcdDevice
    0x01, 0x02, 0x03, // string indices
    0x01, // bNumConfigurations
];

const MAX_PACKET_SIZE_OFFSET: usize = 7;
const STRING_INDEX_OFFSETS: [usize; 3] = [14, 15, 16];

/// One vendor-specific interface with a bulk endpoint pair.
const CONFIGURATION_DESCRIPTOR: [u8; 32] = [
    // configuration
    0x09, descriptor_type::CONFIGURATION, 0x20, 0x00, 0x01, CONFIGURATION_VALUE, 0x00, 0x80, 0x32,
    // interface
    0x09, descriptor_type::INTERFACE, 0x00, 0x00, 0x02, 0xff, 0x00, 0x00, 0x00,
    // endpoint 1 IN
    0x07, descriptor_type::ENDPOINT, 0x81, 0x02, 0x40, 0x00, 0x00,
    // endpoint 1 OUT
    0x07, descriptor_type::ENDPOINT, 0x01, 0x02, 0x40, 0x00, 0x00,
];

/// What the host asks for and how the device reacts.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackOptions {
    pub max_packet_size: u16,
    pub address: u8,
    pub configuration: u8,
    pub reject_configuration: bool,
}

/// What the host learned about the device.
#[derive(Debug)]
pub struct Enumeration {
    pub device_descriptor: Vec<u8>,
    pub configuration_descriptor: Vec<u8>,
    pub language_ids: Vec<u16>,
    pub strings: Vec<String>,
    pub address: u8,
    pub configuration: u8,
    pub status: u16,
    pub completions: usize,
}

/// A controller driver that keeps the wire in memory.
#[derive(Debug, Default)]
pub struct LoopbackController {
    address: u8,
    configuration: u8,
    reject_configuration: bool,
    /// `wLength` of the current control transfer.
    requested: usize,
    /// IN packets not yet picked up by the host.
    in_packets: Vec<Vec<u8>>,
}

impl LoopbackController {
    pub fn new(reject_configuration: bool) -> Self {
        Self {
            reject_configuration,
            ..Self::default()
        }
    }

    /// Latch the setup packet the hardware just received.
    pub fn receive_setup(&mut self, setup: &SetupPacket) {
        self.requested = usize::from(setup.length);
    }

    /// Hand the IN packets sent so far to the host.
    pub fn take_in_packets(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.in_packets)
    }

    /// Receive the zero-length OUT packet that ends an IN request.
    pub fn receive_status<'a>(
        &mut self,
        ep0: &mut ControlEndpoint<'a>,
        notifier: Option<&'a dyn Notify>,
    ) -> Result<()> {
        ep0.init_status_out(DRIVER, notifier)
            .context("Failed to arm the OUT status stage")?;

        let transfer = ep0.out_transfer_mut();
        let count = transfer.fill_from(&[]);
        trace!("status stage received {} bytes", count);
        transfer.notify_complete();

        Ok(())
    }

    /// Send the armed IN transfer in packets until a short packet or the
    /// end of the data.
    ///
    /// Data that ends on a packet boundary before `wLength` is terminated
    /// with a zero-length packet, so the host does not wait for more.
    fn send_in_packets(&mut self, ep0: &mut ControlEndpoint<'_>) {
        let mut packet = vec![0; usize::from(ep0.max_packet_size())];
        let transfer = ep0.in_transfer_mut();

        loop {
            let count = transfer.drain_into(&mut packet);
            trace!("{} sent {} bytes", transfer.endpoint(), count);
            self.in_packets.push(packet[..count].to_vec());

            if count < packet.len() {
                break;
            }
            if transfer.remaining() == 0 {
                if transfer.transferred() < self.requested {
                    trace!("{} sent a zero-length packet", transfer.endpoint());
                    self.in_packets.push(Vec::new());
                }
                break;
            }
        }

        transfer.notify_complete();
    }
}

impl DeviceController for LoopbackController {
    fn set_address(&mut self, address: u8) {
        info!("device address is now {}", address);
        self.address = address;
    }

    fn set_configuration(&mut self, configuration: u8) -> bool {
        if self.reject_configuration || (configuration != 0 && configuration != CONFIGURATION_VALUE)
        {
            warn!("refusing configuration {}", configuration);
            return false;
        }

        info!("device configuration is now {}", configuration);
        self.configuration = configuration;
        true
    }

    fn transmit_zlp(&mut self, ep0: &mut ControlEndpoint<'_>) {
        self.send_in_packets(ep0);
    }

    fn start_in_transfer(&mut self, ep0: &mut ControlEndpoint<'_>) {
        self.send_in_packets(ep0);
    }
}

/// The host side of endpoint zero.
struct Host<'p, 'h, 'a> {
    pipe: ControlPipe<'p, 'h, 'a>,
    controller: LoopbackController,
    ep0: ControlEndpoint<'a>,
    queue: &'a CompletionQueue<QUEUE_DEPTH>,
    completions: usize,
}

impl<'p, 'h, 'a> Host<'p, 'h, 'a> {
    /// Run one control transfer and return the data the device sent.
    fn control_transfer(&mut self, setup: SetupPacket) -> Result<Vec<u8>> {
        debug!("host sends setup packet {}", setup);
        self.controller.receive_setup(&setup);

        let result = self.pipe.setup_stage(&mut ControlContext::new(
            &setup,
            &mut self.controller,
            &mut self.ep0,
        ));

        let data = match result {
            SetupResult::DataStage => {
                let data = self.controller.take_in_packets().concat();

                let mut ctx = ControlContext::new(&setup, &mut self.controller, &mut self.ep0);
                if self.pipe.in_data_stage(&mut ctx) == DataResult::Handled {
                    trace!("a layer took part in the IN data stage");
                }

                let notifier: &'a dyn Notify = self.queue;
                self.controller.receive_status(&mut self.ep0, Some(notifier))?;
                data
            }
            SetupResult::NoDataStage => {
                let packets = self.controller.take_in_packets();
                ensure!(
                    packets.iter().all(Vec::is_empty),
                    "Status stage of {} carried data",
                    setup
                );
                Vec::new()
            }
            SetupResult::Stall | SetupResult::Unhandled => {
                bail!("Device stalled request {}", setup)
            }
        };

        self.pipe.status_stage(&mut ControlContext::new(
            &setup,
            &mut self.controller,
            &mut self.ep0,
        ));
        self.drain_completions();

        ensure!(
            data.len() <= usize::from(setup.length),
            "Device sent {} bytes, but only {} were requested",
            data.len(),
            setup.length
        );

        Ok(data)
    }

    fn drain_completions(&mut self) {
        while let Some(completion) = self.queue.pop() {
            debug!(
                "{} transfer of {:?} completed with {}/{} bytes",
                completion.endpoint, completion.owner, completion.transferred, completion.total
            );
            self.completions += 1;
        }

        if self.queue.dropped() > 0 {
            warn!("{} completions were lost", self.queue.dropped());
        }
    }

    fn get_descriptor(
        &mut self,
        descriptor_type: u8,
        index: u8,
        language_id: u16,
        length: u16,
    ) -> Result<Vec<u8>> {
        self.control_transfer(SetupPacket {
            request_type: RequestType::new(Direction::In, RequestKind::Standard, Recipient::Device),
            request: request::GET_DESCRIPTOR,
            value: u16::from_be_bytes([descriptor_type, index]),
            index: language_id,
            length,
        })
    }

    fn set_device_request(&mut self, request: u8, value: u8) -> Result<()> {
        self.control_transfer(SetupPacket {
            request_type: RequestType::new(
                Direction::Out,
                RequestKind::Standard,
                Recipient::Device,
            ),
            request,
            value: u16::from(value),
            index: 0,
            length: 0,
        })?;

        Ok(())
    }

    fn enumerate(&mut self, options: &LoopbackOptions) -> Result<Enumeration> {
        let header = self
            .get_descriptor(descriptor_type::DEVICE, 0, 0, 8)
            .context("Failed to read the device descriptor header")?;
        let max_packet_size = *header
            .get(MAX_PACKET_SIZE_OFFSET)
            .context("Device descriptor header is too short")?;
        ensure!(
            u16::from(max_packet_size) == self.ep0.max_packet_size(),
            "Device reports a maximum packet size of {}, but endpoint zero uses {}",
            max_packet_size,
            self.ep0.max_packet_size()
        );

        self.set_device_request(request::SET_ADDRESS, options.address)
            .context("Failed to set the device address")?;

        let device_descriptor = self
            .get_descriptor(descriptor_type::DEVICE, 0, 0, u16::from(header[0]))
            .context("Failed to read the device descriptor")?;

        let configuration_header = self
            .get_descriptor(descriptor_type::CONFIGURATION, 0, 0, 9)
            .context("Failed to read the configuration descriptor header")?;
        let total_length = match configuration_header.get(2..4) {
            Some(&[low, high]) => u16::from_le_bytes([low, high]),
            _ => bail!("Configuration descriptor header is too short"),
        };
        let configuration_descriptor = self
            .get_descriptor(descriptor_type::CONFIGURATION, 0, 0, total_length)
            .context("Failed to read the configuration descriptor")?;

        let language_ids = decode_language_ids(
            &self
                .get_descriptor(descriptor_type::STRING, 0, 0, 0xff)
                .context("Failed to read the supported languages")?,
        );
        let language_id = *language_ids
            .first()
            .context("Device does not support any language")?;

        let mut strings = Vec::new();
        for offset in STRING_INDEX_OFFSETS {
            let index = device_descriptor.get(offset).copied().unwrap_or(0);
            if index == 0 {
                continue;
            }

            let descriptor = self
                .get_descriptor(descriptor_type::STRING, index, language_id, 0xff)
                .with_context(|| format!("Failed to read string {index}"))?;
            strings.push(decode_string(&descriptor));
        }

        self.set_device_request(request::SET_CONFIGURATION, options.configuration)
            .with_context(|| format!("Failed to select configuration {}", options.configuration))?;

        let status = self
            .control_transfer(SetupPacket {
                request_type: RequestType::new(
                    Direction::In,
                    RequestKind::Standard,
                    Recipient::Device,
                ),
                request: request::GET_STATUS,
                value: 0,
                index: 0,
                length: 2,
            })
            .context("Failed to read the device status")?;
        let status = match status[..] {
            [low, high] => u16::from_le_bytes([low, high]),
            _ => bail!("Device status has {} bytes instead of 2", status.len()),
        };

        Ok(Enumeration {
            device_descriptor,
            configuration_descriptor,
            language_ids,
            strings,
            address: self.controller.address,
            configuration: self.controller.configuration,
            status,
            completions: self.completions,
        })
    }
}

/// Encode `text` as a string descriptor.
fn string_descriptor(text: &str) -> Result<Vec<u8>> {
    let mut descriptor = vec![0, descriptor_type::STRING];
    descriptor.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    descriptor[0] = u8::try_from(descriptor.len())
        .with_context(|| format!("String {text:?} does not fit into a descriptor"))?;

    Ok(descriptor)
}

fn utf16_units(descriptor: &[u8]) -> impl Iterator<Item = u16> + '_ {
    descriptor
        .get(2..)
        .unwrap_or_default()
        .chunks_exact(2)
        .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
}

fn decode_language_ids(descriptor: &[u8]) -> Vec<u16> {
    utf16_units(descriptor).collect()
}

fn decode_string(descriptor: &[u8]) -> String {
    String::from_utf16_lossy(&utf16_units(descriptor).collect::<Vec<_>>())
}

/// Build the device and enumerate it like a host would.
///
/// # Errors
///
/// If the device stalls any request or answers with malformed data.
pub fn run(options: &LoopbackOptions) -> Result<Enumeration> {
    let mut device = DEVICE_DESCRIPTOR;
    device[MAX_PACKET_SIZE_OFFSET] = u8::try_from(options.max_packet_size)
        .context("Maximum packet size does not fit into the device descriptor")?;

    let language_ids = {
        let mut descriptor = vec![4, descriptor_type::STRING];
        descriptor.extend(LANGUAGE_ID.to_le_bytes());
        descriptor
    };
    let strings = STRINGS
        .iter()
        .map(|text| string_descriptor(text))
        .collect::<Result<Vec<_>>>()?;
    let string_table: Vec<&[u8]> = strings.iter().map(Vec::as_slice).collect();

    let tables = DescriptorTables {
        device: &device,
        configuration: &CONFIGURATION_DESCRIPTOR,
        language_ids: &language_ids,
        strings: &string_table,
    };

    let queue = CompletionQueue::<QUEUE_DEPTH>::new();
    let mut standard = StandardRequests::new(tables).with_notifier(&queue);
    let mut layers: [&mut dyn ControlHandler<'_>; 1] = [&mut standard];

    let mut host = Host {
        pipe: ControlPipe::new(&mut layers),
        controller: LoopbackController::new(options.reject_configuration),
        ep0: ControlEndpoint::new(options.max_packet_size),
        queue: &queue,
        completions: 0,
    };

    host.enumerate(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> LoopbackOptions {
        LoopbackOptions {
            max_packet_size: 64,
            address: 5,
            configuration: CONFIGURATION_VALUE,
            reject_configuration: false,
        }
    }

    #[test]
    fn enumeration_succeeds() {
        let enumeration = run(&options()).unwrap();

        assert_eq!(enumeration.device_descriptor.len(), 18);
        assert_eq!(enumeration.device_descriptor[7], 64);
        assert_eq!(enumeration.configuration_descriptor, CONFIGURATION_DESCRIPTOR);
        assert_eq!(enumeration.language_ids, vec![LANGUAGE_ID]);
        assert_eq!(enumeration.strings, STRINGS);
        assert_eq!(enumeration.address, 5);
        assert_eq!(enumeration.configuration, CONFIGURATION_VALUE);
        assert_eq!(enumeration.status, 0);
    }

    #[test]
    fn every_transfer_completes() {
        let enumeration = run(&options()).unwrap();

        // 9 IN requests with data and status stage each, plus 2 requests
        // without data stage.
        assert_eq!(enumeration.completions, 9 * 2 + 2);
    }

    #[test]
    fn small_packets_are_reassembled() {
        let enumeration = run(&LoopbackOptions {
            max_packet_size: 8,
            ..options()
        })
        .unwrap();

        assert_eq!(enumeration.configuration_descriptor, CONFIGURATION_DESCRIPTOR);
        assert_eq!(enumeration.strings[1], "Loopback Device");
    }

    #[test]
    fn rejected_configuration_fails_enumeration() {
        let error = run(&LoopbackOptions {
            reject_configuration: true,
            ..options()
        })
        .unwrap_err();

        assert!(format!("{error:#}").contains("configuration 1"));
    }

    #[test]
    fn unknown_configuration_fails_enumeration() {
        assert!(run(&LoopbackOptions {
            configuration: 2,
            ..options()
        })
        .is_err());
    }

    #[test]
    fn packets_follow_the_max_packet_size() {
        let data: Vec<u8> = (0..20).collect();
        let mut controller = LoopbackController::default();
        let mut ep0 = ControlEndpoint::new(8);

        ep0.init_transfer(&data, 64, OwnerId(1), None).unwrap();
        controller.start_in_transfer(&mut ep0);

        let packets = controller.take_in_packets();
        assert_eq!(
            packets.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![8, 8, 4]
        );
        assert_eq!(packets.concat(), data);
        assert!(!ep0.in_transfer().is_active());
    }

    #[test]
    fn data_ending_on_packet_boundary_gets_zero_length_packet() {
        let data = [0x5a; 16];
        let mut controller = LoopbackController::default();
        let mut ep0 = ControlEndpoint::new(8);

        controller.receive_setup(&SetupPacket::from_bytes([0x80, 0x06, 0, 1, 0, 0, 64, 0]));
        ep0.init_transfer(&data, 64, OwnerId(1), None).unwrap();
        controller.start_in_transfer(&mut ep0);

        let lengths: Vec<usize> = controller.take_in_packets().iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![8, 8, 0]);

        // No terminator when the host gets all it asked for.
        controller.receive_setup(&SetupPacket::from_bytes([0x80, 0x06, 0, 1, 0, 0, 16, 0]));
        ep0.init_transfer(&data, 16, OwnerId(1), None).unwrap();
        controller.start_in_transfer(&mut ep0);

        let lengths: Vec<usize> = controller.take_in_packets().iter().map(Vec::len).collect();
        assert_eq!(lengths, vec![8, 8]);
    }

    #[test]
    fn string_descriptors_round_trip_text() {
        let descriptor = string_descriptor("ab").unwrap();

        assert_eq!(descriptor, [6, descriptor_type::STRING, b'a', 0, b'b', 0]);
        assert_eq!(decode_string(&descriptor), "ab");
        assert!(string_descriptor(&"x".repeat(127)).is_err());
    }
}
