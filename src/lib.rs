//! # usbd-control
//!
//! The protocol core of a USB device-side stack. See [`device`] for the
//! transfer contract and the standard control request dispatcher.

pub mod device;
