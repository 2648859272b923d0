//! Bridge a wireless Xbox-class gamepad onto a wired Nintendo Switch Pro
//! Controller interface.
//!
//! The crate is split along the system's two collaborator boundaries:
//!
//! - [`procon`] holds the protocol emulator: the stateful responder that
//!   answers the console's subcommand stream byte-for-byte like a real Pro
//!   Controller, plus the input adapter feeding it.
//! - [`xbox`] decodes the wireless source's HID reports into the shared
//!   input model in [`input`].
//! - [`ble`] and [`usb`] are the thin transport glue (hidraw in, USB gadget
//!   out); everything protocol-shaped stays out of them so the emulator is
//!   fully testable without hardware.
//!
//! Both controller ends implement the [`gamepad::GamepadDevice`] capability
//! trait, which is all the wiring in the binary ever talks to.

pub mod ble;
pub mod gamepad;
pub mod input;
pub mod procon;
pub mod usb;
pub mod xbox;
