//! The gamepad device capability set.
//!
//! Both sides of the bridge speak this interface: the emulated Switch Pro
//! Controller implements it facing the wired host, and the Xbox source
//! implements it facing the wireless stack. The wiring in `main` only ever
//! talks to a `GamepadDevice`, so swapping either end is a one-line change.

use crate::input::GamepadInputs;

/// Identity constants a device exposes to its transport.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub vid: u16,
    pub pid: u16,
    /// Device release number (bcdDevice).
    pub bcd: u16,
    /// USB specification release (bcdUSB).
    pub usb_bcd: u16,
    pub manufacturer_name: &'static str,
    pub product_name: &'static str,
    pub serial_number: String,
}

/// A report to transmit: `(report_id, payload)`. The payload excludes the
/// report id byte; the transport frames it.
pub type ReportData = (u8, Vec<u8>);

pub trait GamepadDevice: Send + Sync {
    // Info
    fn device_info(&self) -> &DeviceInfo;

    // Report data
    fn input_report_id(&self) -> u8;
    fn report_descriptor(&self) -> &'static [u8];
    fn set_report_data(&self, report_id: u8, data: &[u8]);
    fn get_report_data(&self, report_id: u8) -> Vec<u8>;

    // Gamepad inputs
    fn gamepad_inputs(&self) -> GamepadInputs;
    fn set_gamepad_inputs(&self, inputs: &GamepadInputs);

    // Battery level in percent, [0, 100].
    fn set_battery_level(&self, level: u8);

    /// Called when the wired transport mounts. A device may hand back a
    /// report to transmit immediately.
    fn on_attach(&self) -> Option<ReportData> {
        None
    }

    /// Called for every host-to-device report. `data` is the full transport
    /// frame including the leading channel byte.
    fn on_host_report(&self, _report_id: u8, _data: &[u8]) -> Option<ReportData> {
        None
    }
}
