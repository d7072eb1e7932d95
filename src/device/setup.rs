//! # Setup Packets
//!
//! Every control transfer starts with an 8-byte setup packet sent by the
//! host. See Section "9.3 USB Device Requests" in the USB 2.0 specification.

use std::fmt;

use thiserror::Error;

use crate::device::constants::{request_type, SETUP_PACKET_SIZE};

/// The direction of the data stage of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host-to-device.
    Out,
    /// Device-to-host.
    In,
}

/// The kind of a request, bits 6..5 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Requests every device has to understand.
    Standard,
    /// Requests defined by a device class.
    Class,
    /// Vendor-specific requests.
    Vendor,
    /// Reserved encoding.
    Reserved,
}

/// The recipient of a request, bits 4..0 of `bmRequestType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// The device as a whole.
    Device,
    /// An interface, selected by `wIndex`.
    Interface,
    /// An endpoint, selected by `wIndex`.
    Endpoint,
    /// Something else.
    Other,
    /// One of the reserved encodings 4 to 31.
    Reserved(u8),
}

/// The decoded `bmRequestType` field.
///
/// The raw byte is kept so that conversion back is lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestType(u8);

impl RequestType {
    /// Compose a request type from its three components.
    #[must_use]
    pub const fn new(direction: Direction, kind: RequestKind, recipient: Recipient) -> Self {
        use request_type::{kind as k, recipient as r};

        let direction = match direction {
            Direction::Out => 0,
            Direction::In => request_type::DIRECTION_IN,
        };
        let kind = match kind {
            RequestKind::Standard => k::STANDARD,
            RequestKind::Class => k::CLASS,
            RequestKind::Vendor => k::VENDOR,
            RequestKind::Reserved => k::RESERVED,
        };
        let recipient = match recipient {
            Recipient::Device => r::DEVICE,
            Recipient::Interface => r::INTERFACE,
            Recipient::Endpoint => r::ENDPOINT,
            Recipient::Other => r::OTHER,
            Recipient::Reserved(value) => value & request_type::RECIPIENT_MASK,
        };

        Self(direction | (kind << request_type::KIND_SHIFT) | recipient)
    }

    /// The direction of the data stage.
    #[must_use]
    pub const fn direction(self) -> Direction {
        if self.0 & request_type::DIRECTION_IN != 0 {
            Direction::In
        } else {
            Direction::Out
        }
    }

    /// Whether this is a standard, class or vendor request.
    #[must_use]
    pub const fn kind(self) -> RequestKind {
        use request_type::kind as k;

        match (self.0 & request_type::KIND_MASK) >> request_type::KIND_SHIFT {
            k::STANDARD => RequestKind::Standard,
            k::CLASS => RequestKind::Class,
            k::VENDOR => RequestKind::Vendor,
            _ => RequestKind::Reserved,
        }
    }

    /// The addressed recipient.
    #[must_use]
    pub const fn recipient(self) -> Recipient {
        use request_type::recipient as r;

        match self.0 & request_type::RECIPIENT_MASK {
            r::DEVICE => Recipient::Device,
            r::INTERFACE => Recipient::Interface,
            r::ENDPOINT => Recipient::Endpoint,
            r::OTHER => Recipient::Other,
            value => Recipient::Reserved(value),
        }
    }

    /// Returns true for standard requests with the given direction and
    /// recipient.
    #[must_use]
    pub fn is_standard(self, direction: Direction, recipient: Recipient) -> bool {
        self == Self::new(direction, RequestKind::Standard, recipient)
    }
}

impl From<u8> for RequestType {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<RequestType> for u8 {
    fn from(value: RequestType) -> Self {
        value.0
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#04x} ({:?}, {:?}, {:?})",
            self.0,
            self.direction(),
            self.kind(),
            self.recipient()
        )
    }
}

/// A USB setup packet.
///
/// For documentation of the fields, see Section "9.3 USB Device Requests"
/// in the USB 2.0 specification. The packet is immutable for the duration
/// of a control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupPacket {
    /// `bmRequestType`
    pub request_type: RequestType,
    /// `bRequest`
    pub request: u8,
    /// `wValue`
    pub value: u16,
    /// `wIndex`
    pub index: u16,
    /// `wLength`: the maximum number of bytes the host accepts in the data
    /// stage, or the exact number it sends.
    pub length: u16,
}

impl SetupPacket {
    /// Decode a setup packet from its little-endian wire format.
    #[must_use]
    pub fn from_bytes(bytes: [u8; SETUP_PACKET_SIZE]) -> Self {
        Self {
            request_type: RequestType(bytes[0]),
            request: bytes[1],
            value: u16::from_le_bytes([bytes[2], bytes[3]]),
            index: u16::from_le_bytes([bytes[4], bytes[5]]),
            length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    /// Encode the setup packet into its wire format.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; SETUP_PACKET_SIZE] {
        let mut bytes = [0; SETUP_PACKET_SIZE];

        bytes[0] = self.request_type.into();
        bytes[1] = self.request;
        bytes[2..4].copy_from_slice(&self.value.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.index.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.length.to_le_bytes());

        bytes
    }

    /// The low byte of `wValue`.
    ///
    /// `SET_ADDRESS` and `SET_CONFIGURATION` carry their argument here, and
    /// `GET_DESCRIPTOR` carries the descriptor index.
    #[must_use]
    pub const fn value_low(&self) -> u8 {
        (self.value & 0xff) as u8
    }

    /// The high byte of `wValue`.
    ///
    /// `GET_DESCRIPTOR` carries the descriptor type here.
    #[must_use]
    pub const fn value_high(&self) -> u8 {
        (self.value >> 8) as u8
    }
}

impl TryFrom<&[u8]> for SetupPacket {
    type Error = SetupPacketError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SETUP_PACKET_SIZE] = value
            .try_into()
            .map_err(|_| SetupPacketError::InvalidLength(value.len()))?;

        Ok(Self::from_bytes(bytes))
    }
}

impl fmt::Display for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={:#04x} request={:#04x} value={:#06x} index={:#06x} length={}",
            u8::from(self.request_type),
            self.request,
            self.value,
            self.index,
            self.length
        )
    }
}

/// Errors when decoding a [`SetupPacket`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupPacketError {
    /// Setup packets are exactly 8 bytes long.
    #[error("Setup packet must be 8 bytes, got {0}")]
    InvalidLength(usize),
}
