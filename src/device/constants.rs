//! # USB Constants
//!
//! This module collects USB related constants. All definitions are derived
//! from Chapter 9 "USB Device Framework" of the USB 2.0 specification.

// Allow missing docs to avoid duplicating Chapter 9 for all constants.
#![allow(missing_docs)]

/// The size of a setup packet in bytes.
pub const SETUP_PACKET_SIZE: usize = 8;

/// Constants for the `bmRequestType` field of a setup packet.
pub mod request_type {
    /// Bit 7 is set for device-to-host (IN) requests.
    pub const DIRECTION_IN: u8 = 1 << 7;

    pub const KIND_SHIFT: u8 = 5;
    pub const KIND_MASK: u8 = 0b11 << KIND_SHIFT;

    pub const RECIPIENT_MASK: u8 = 0b1_1111;

    /// Encodings of the request kind (bits 6..5).
    pub mod kind {
        pub const STANDARD: u8 = 0;
        pub const CLASS: u8 = 1;
        pub const VENDOR: u8 = 2;
        pub const RESERVED: u8 = 3;
    }

    /// Encodings of the recipient (bits 4..0).
    pub mod recipient {
        pub const DEVICE: u8 = 0;
        pub const INTERFACE: u8 = 1;
        pub const ENDPOINT: u8 = 2;
        pub const OTHER: u8 = 3;
    }
}

/// Standard request codes (Table 9-4).
pub mod request {
    pub const GET_STATUS: u8 = 0x00;
    pub const CLEAR_FEATURE: u8 = 0x01;
    pub const SET_FEATURE: u8 = 0x03;
    pub const SET_ADDRESS: u8 = 0x05;
    pub const GET_DESCRIPTOR: u8 = 0x06;
    pub const SET_DESCRIPTOR: u8 = 0x07;
    pub const GET_CONFIGURATION: u8 = 0x08;
    pub const SET_CONFIGURATION: u8 = 0x09;
    pub const GET_INTERFACE: u8 = 0x0A;
    pub const SET_INTERFACE: u8 = 0x0B;
    pub const SYNCH_FRAME: u8 = 0x0C;
}

/// Descriptor type codes (Table 9-5).
pub mod descriptor_type {
    pub const DEVICE: u8 = 1;
    pub const CONFIGURATION: u8 = 2;
    pub const STRING: u8 = 3;
    pub const INTERFACE: u8 = 4;
    pub const ENDPOINT: u8 = 5;
}

/// Offsets of fields shared by all descriptors.
pub mod descriptor_offset {
    pub const LENGTH: usize = 0;
    pub const DESCRIPTOR_TYPE: usize = 1;

    /// `wTotalLength` of a configuration descriptor.
    pub const TOTAL_LENGTH: usize = 2;
}

/// Endpoint addresses.
pub mod endpoint {
    /// Bit 7 of an endpoint address is set for IN endpoints.
    pub const DIRECTION_IN: u8 = 1 << 7;
    pub const NUMBER_MASK: u8 = 0x0F;

    pub const CONTROL_OUT: u8 = 0x00;
    pub const CONTROL_IN: u8 = DIRECTION_IN;

    /// The default size of the receive buffer embedded in the control endpoint.
    pub const CONTROL_BUFFER_SIZE: usize = 64;
}

/// The reply to a standard device `GET_STATUS` request.
///
/// Bit 0 (self-powered) and bit 1 (remote wakeup) are never reported.
pub const DEVICE_STATUS: [u8; 2] = [0x00, 0x00];
