//! Xbox-class wireless controller, the input source of the bridge.
//!
//! HID-over-GATT input report format (16 bytes, report id 0x01):
//!   [0..2]   = left stick X, u16 LE, 0..65535
//!   [2..4]   = left stick Y
//!   [4..6]   = right stick X
//!   [6..8]   = right stick Y
//!   [8..10]  = left trigger, u16 LE, 0..1023
//!   [10..12] = right trigger
//!   [12]     = hat: 0 = neutral, 1..8 clockwise from north
//!   [13]     = A=01 B=02 X=08 Y=10 LB=40 RB=80
//!   [14]     = view=04 menu=08 guide=10 LS=20 RS=40
//!   [15]     = share=01
//!
//! The battery service delivers a single percentage byte (report id 0x04
//! on this model).

use std::sync::Mutex;

use tracing::warn;

use crate::gamepad::{DeviceInfo, GamepadDevice};
use crate::input::{GamepadInputs, Joystick};

pub const INPUT_REPORT_ID: u8 = 0x01;
pub const BATTERY_REPORT_ID: u8 = 0x04;
pub const INPUT_REPORT_LEN: usize = 16;

const JOYSTICK_CENTER: f32 = 32768.0;
const TRIGGER_MAX: f32 = 1023.0;

const VID: u16 = 0x045E;
const PID: u16 = 0x0B13;
const DEVICE_BCD: u16 = 0x0110;
const USB_BCD: u16 = 0x0100;

fn read_u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn decode_axis(raw: u16) -> f32 {
    ((raw as f32 - JOYSTICK_CENTER) / JOYSTICK_CENTER).clamp(-1.0, 1.0)
}

fn encode_axis(value: f32) -> u16 {
    let scaled = JOYSTICK_CENTER + value.clamp(-1.0, 1.0) * JOYSTICK_CENTER;
    scaled.clamp(0.0, 65535.0) as u16
}

/// Decode a raw input report into the normalized snapshot. Returns `None`
/// when the buffer is too short to be an input report.
pub fn parse_input_report(data: &[u8]) -> Option<GamepadInputs> {
    if data.len() < INPUT_REPORT_LEN {
        return None;
    }

    let mut inputs = GamepadInputs {
        left_joystick: Joystick {
            x: decode_axis(read_u16_le(data, 0)),
            y: decode_axis(read_u16_le(data, 2)),
        },
        right_joystick: Joystick {
            x: decode_axis(read_u16_le(data, 4)),
            y: decode_axis(read_u16_le(data, 6)),
        },
        left_trigger: (read_u16_le(data, 8) as f32 / TRIGGER_MAX).clamp(0.0, 1.0),
        right_trigger: (read_u16_le(data, 10) as f32 / TRIGGER_MAX).clamp(0.0, 1.0),
        ..Default::default()
    };

    let buttons = &mut inputs.buttons;
    let (up, down, left, right) = decode_hat(data[12]);
    buttons.set_up(up);
    buttons.set_down(down);
    buttons.set_left(left);
    buttons.set_right(right);

    buttons.set_a(data[13] & 0x01 != 0);
    buttons.set_b(data[13] & 0x02 != 0);
    buttons.set_x(data[13] & 0x08 != 0);
    buttons.set_y(data[13] & 0x10 != 0);
    buttons.set_lb(data[13] & 0x40 != 0);
    buttons.set_rb(data[13] & 0x80 != 0);

    buttons.set_view(data[14] & 0x04 != 0);
    buttons.set_menu(data[14] & 0x08 != 0);
    buttons.set_guide(data[14] & 0x10 != 0);
    buttons.set_l3(data[14] & 0x20 != 0);
    buttons.set_r3(data[14] & 0x40 != 0);

    buttons.set_share(data[15] & 0x01 != 0);

    Some(inputs)
}

fn decode_hat(hat: u8) -> (bool, bool, bool, bool) {
    match hat {
        1 => (true, false, false, false),
        2 => (true, false, false, true),
        3 => (false, false, false, true),
        4 => (false, true, false, true),
        5 => (false, true, false, false),
        6 => (false, true, true, false),
        7 => (false, false, true, false),
        8 => (true, false, true, false),
        _ => (false, false, false, false),
    }
}

fn encode_hat(up: bool, down: bool, left: bool, right: bool) -> u8 {
    match (up, down, left, right) {
        (true, false, false, false) => 1,
        (true, false, false, true) => 2,
        (false, false, false, true) => 3,
        (false, true, false, true) => 4,
        (false, true, false, false) => 5,
        (false, true, true, false) => 6,
        (false, false, true, false) => 7,
        (true, false, true, false) => 8,
        _ => 0,
    }
}

struct State {
    report: [u8; INPUT_REPORT_LEN],
    battery_level: u8,
}

/// The wireless controller as seen by the bridge: raw notification bytes
/// go in through `set_report_data`, normalized snapshots come out through
/// `gamepad_inputs`.
pub struct XboxSource {
    device_info: DeviceInfo,
    inner: Mutex<State>,
}

impl Default for XboxSource {
    fn default() -> Self {
        Self::new()
    }
}

impl XboxSource {
    pub fn new() -> Self {
        Self {
            device_info: DeviceInfo {
                vid: VID,
                pid: PID,
                bcd: DEVICE_BCD,
                usb_bcd: USB_BCD,
                manufacturer_name: "Microsoft",
                product_name: "Controller",
                serial_number: "1337".into(),
            },
            inner: Mutex::new(State {
                report: neutral_report(),
                battery_level: 100,
            }),
        }
    }

    pub fn battery_level(&self) -> u8 {
        self.lock().battery_level
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Sticks centered, triggers released, nothing pressed.
fn neutral_report() -> [u8; INPUT_REPORT_LEN] {
    let mut report = [0u8; INPUT_REPORT_LEN];
    for offset in [0, 2, 4, 6] {
        report[offset..offset + 2].copy_from_slice(&0x8000u16.to_le_bytes());
    }
    report
}

impl GamepadDevice for XboxSource {
    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn input_report_id(&self) -> u8 {
        INPUT_REPORT_ID
    }

    fn report_descriptor(&self) -> &'static [u8] {
        // The source's descriptor belongs to the real hardware; the bridge
        // never re-exposes it.
        &[]
    }

    fn set_report_data(&self, report_id: u8, data: &[u8]) {
        match report_id {
            INPUT_REPORT_ID if data.len() >= INPUT_REPORT_LEN => {
                self.lock().report.copy_from_slice(&data[..INPUT_REPORT_LEN]);
            }
            BATTERY_REPORT_ID if !data.is_empty() => {
                self.lock().battery_level = data[0].min(100);
            }
            _ => warn!("[BLE] Unusable report id {report_id:#04x} ({} bytes)", data.len()),
        }
    }

    fn get_report_data(&self, report_id: u8) -> Vec<u8> {
        match report_id {
            INPUT_REPORT_ID => self.lock().report.to_vec(),
            BATTERY_REPORT_ID => vec![self.lock().battery_level],
            _ => Vec::new(),
        }
    }

    fn gamepad_inputs(&self) -> GamepadInputs {
        parse_input_report(&self.lock().report).unwrap_or_default()
    }

    fn set_gamepad_inputs(&self, inputs: &GamepadInputs) {
        let mut report = neutral_report();

        report[0..2].copy_from_slice(&encode_axis(inputs.left_joystick.x).to_le_bytes());
        report[2..4].copy_from_slice(&encode_axis(inputs.left_joystick.y).to_le_bytes());
        report[4..6].copy_from_slice(&encode_axis(inputs.right_joystick.x).to_le_bytes());
        report[6..8].copy_from_slice(&encode_axis(inputs.right_joystick.y).to_le_bytes());

        let left_trigger = (inputs.left_trigger.clamp(0.0, 1.0) * TRIGGER_MAX) as u16;
        let right_trigger = (inputs.right_trigger.clamp(0.0, 1.0) * TRIGGER_MAX) as u16;
        report[8..10].copy_from_slice(&left_trigger.to_le_bytes());
        report[10..12].copy_from_slice(&right_trigger.to_le_bytes());

        let buttons = &inputs.buttons;
        report[12] = encode_hat(
            buttons.up(),
            buttons.down(),
            buttons.left(),
            buttons.right(),
        );

        let mut byte = 0u8;
        if buttons.a() {
            byte |= 0x01;
        }
        if buttons.b() {
            byte |= 0x02;
        }
        if buttons.x() {
            byte |= 0x08;
        }
        if buttons.y() {
            byte |= 0x10;
        }
        if buttons.lb() {
            byte |= 0x40;
        }
        if buttons.rb() {
            byte |= 0x80;
        }
        report[13] = byte;

        let mut byte = 0u8;
        if buttons.view() {
            byte |= 0x04;
        }
        if buttons.menu() {
            byte |= 0x08;
        }
        if buttons.guide() {
            byte |= 0x10;
        }
        if buttons.l3() {
            byte |= 0x20;
        }
        if buttons.r3() {
            byte |= 0x40;
        }
        report[14] = byte;

        report[15] = if buttons.share() { 0x01 } else { 0x00 };

        self.lock().report = report;
    }

    fn set_battery_level(&self, level: u8) {
        self.lock().battery_level = level.min(100);
    }
}
