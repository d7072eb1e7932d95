//! # Device-Side USB Protocol Core
//!
//! This module contains the parts of a USB device stack that sit between
//! the controller driver and class-specific code. It should never depend on
//! a particular controller, bus or operating system.
//!
//! - [`transfer`] defines the capability contract the driver uses to move
//!   bytes, along with the four transfer variants that implement it.
//! - [`control`] resolves standard requests arriving on endpoint zero.
//! - [`descriptor`] selects descriptor bytes for `GET_DESCRIPTOR`.

#![deny(missing_docs)]
#![deny(rustdoc::all)]
#![deny(clippy::must_use_candidate)]
#![deny(missing_debug_implementations)]

pub mod constants;
pub mod control;
pub mod descriptor;
pub mod setup;
pub mod transfer;
