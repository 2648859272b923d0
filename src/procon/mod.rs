//! Emulated Nintendo Switch Pro Controller.
//!
//! [`SwitchPro`] owns the whole emulator session: the input-report buffer,
//! the SPI calibration image, the protocol flags and the trigger-elapsed
//! bookkeeping. Three callers share it concurrently (the wired host's
//! request path, the wireless input path and the timer tick), so all state
//! sits behind one mutex and is reached through message-style operations.

pub mod descriptor;
pub mod protocol;
pub mod report;
pub mod spi;
pub mod subcommand;

use std::sync::Mutex;
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::warn;

use crate::gamepad::{DeviceInfo, GamepadDevice, ReportData};
use crate::input::{GamepadInputs, Joystick};
use report::InputReport;
use spi::SpiRom;
use subcommand::{HOST_INIT_REPORT, HOST_OUTPUT_REPORT, HOST_RUMBLE_REPORT};

/// Timer tick period: the counter byte advances every 4.96 ms.
pub const COUNTER_PERIOD_US: u64 = 4960;

/// Connection-info nibble for a wired Pro Controller:
/// `(type 0b00 << 1) | powered 0b1`.
pub const PRO_CONTROLLER_CONNECTION: u8 = 0x01;

const VID: u16 = 0x057E;
const PID: u16 = 0x2009;
const DEVICE_BCD: u16 = 0x0200;
const USB_BCD: u16 = 0x0100;
const MANUFACTURER: &str = "Nintendo Co., Ltd.";
const PRODUCT: &str = "Pro Controller";

/// Elapsed-hold times for the seven trigger buttons, reported by
/// subcommand 0x04 as little-endian u16 values in units of 10 ms.
/// Order on the wire: L, R, ZL, ZR, SL, SR, HOME.
pub(crate) struct TriggerTimes {
    values: [u16; 7],
    held: [HoldState; 7],
}

#[derive(Clone, Copy, Default)]
struct HoldState {
    elapsed_us: u64,
    press_start_us: u64,
}

const TRIGGER_L: usize = 0;
const TRIGGER_R: usize = 1;
const TRIGGER_ZL: usize = 2;
const TRIGGER_ZR: usize = 3;
const TRIGGER_HOME: usize = 6;

impl TriggerTimes {
    fn new() -> Self {
        Self {
            values: [0; 7],
            held: [HoldState::default(); 7],
        }
    }

    /// Advance one trigger's hold time. The first pressed sample records
    /// the start; later ones accumulate; release clears the start while the
    /// last elapsed value persists until power-off.
    fn update(&mut self, index: usize, pressed: bool, now_us: u64) {
        let state = &mut self.held[index];
        if pressed {
            if state.press_start_us == 0 {
                state.press_start_us = now_us;
            } else {
                state.elapsed_us = now_us - state.press_start_us;
            }
        } else {
            state.press_start_us = 0;
        }
        self.values[index] = (state.elapsed_us / 10_000) as u16;
    }

    pub(crate) fn as_payload(&self) -> [u8; 14] {
        let mut out = [0u8; 14];
        for (i, value) in self.values.iter().enumerate() {
            out[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn set_for_test(&mut self, index: usize, value: u16) {
        self.values[index] = value;
    }

    #[cfg(test)]
    pub(crate) fn value(&self, index: usize) -> u16 {
        self.values[index]
    }
}

/// Everything the emulator mutates, gathered under one lock.
pub(crate) struct Session {
    pub(crate) report: InputReport,
    pub(crate) spi: SpiRom,
    pub(crate) rng: Box<dyn RngCore + Send>,
    pub(crate) mac_address: [u8; 6],
    pub(crate) trigger_times: TriggerTimes,
    pub(crate) battery_level: u8,
    pub(crate) hid_ready: bool,
    pub(crate) imu_enabled: bool,
    pub(crate) vibration_enabled: bool,
    pub(crate) input_report_mode: u8,
    pub(crate) player_number: u8,
    pub(crate) vibrator_filler: u8,
    pub(crate) input_report_id: u8,
}

impl Session {
    pub(crate) fn new(
        rng: Box<dyn RngCore + Send>,
        mac_address: [u8; 6],
        serial: [u8; spi::SERIAL_LEN],
    ) -> Self {
        let mut spi = SpiRom::new();
        spi.set_serial(&serial);

        Self {
            report: InputReport::new(),
            spi,
            rng,
            mac_address,
            trigger_times: TriggerTimes::new(),
            battery_level: 100,
            hid_ready: false,
            imu_enabled: false,
            vibration_enabled: false,
            input_report_mode: 0,
            player_number: 0,
            vibrator_filler: 0,
            input_report_id: protocol::INPUT_REPORT_SUBCOMMAND_REPLY,
        }
    }

    /// The input adapter: project a normalized snapshot into the report
    /// buffer and advance the trigger-elapsed bookkeeping.
    fn set_inputs_at(&mut self, inputs: &GamepadInputs, now_us: u64) {
        self.report.reset();
        self.report.set_buttons(&inputs.buttons);
        // HID sticks grow downward, the Pro Controller's grow upward.
        self.report
            .set_left_joystick(inputs.left_joystick.x, -inputs.left_joystick.y);
        self.report
            .set_right_joystick(inputs.right_joystick.x, -inputs.right_joystick.y);
        self.report.set_brake(inputs.left_trigger);
        self.report.set_accelerator(inputs.right_trigger);

        let buttons = &inputs.buttons;
        self.trigger_times.update(TRIGGER_L, buttons.l(), now_us);
        self.trigger_times.update(TRIGGER_R, buttons.r(), now_us);
        self.trigger_times.update(TRIGGER_ZL, buttons.zl(), now_us);
        self.trigger_times.update(TRIGGER_ZR, buttons.zr(), now_us);
        // SL/SR only exist on Joy-Cons; their slots stay zero.
        self.trigger_times
            .update(TRIGGER_HOME, buttons.home(), now_us);

        self.report.set_usb_powered(true);
        self.report.set_battery_charging(true);
        self.report.set_battery_level(self.battery_level);
        self.report.set_connection_info(PRO_CONTROLLER_CONNECTION);
    }
}

/// The emulated controller handed to the wired transport.
pub struct SwitchPro {
    device_info: DeviceInfo,
    boot: Instant,
    inner: Mutex<Session>,
}

impl Default for SwitchPro {
    fn default() -> Self {
        Self::new()
    }
}

impl SwitchPro {
    pub fn new() -> Self {
        Self::with_rng(Box::new(OsRng))
    }

    /// Build the emulator around an injected random source (tests pass a
    /// deterministic one). The RNG feeds the boot serial, the BT MAC and
    /// the per-reply vibrator byte.
    pub fn with_rng(mut rng: Box<dyn RngCore + Send>) -> Self {
        let mut serial = [0u8; spi::SERIAL_LEN];
        for digit in &mut serial {
            *digit = b'0' + (rng.next_u32() % 10) as u8;
        }

        let mut mac_address = [0u8; 6];
        rng.fill_bytes(&mut mac_address);
        mac_address[0] &= 0xFE; // keep the address unicast

        let device_info = DeviceInfo {
            vid: VID,
            pid: PID,
            bcd: DEVICE_BCD,
            usb_bcd: USB_BCD,
            manufacturer_name: MANUFACTURER,
            product_name: PRODUCT,
            serial_number: String::from_utf8_lossy(&serial).into_owned(),
        };

        Self {
            device_info,
            boot: Instant::now(),
            inner: Mutex::new(Session::new(rng, mac_address, serial)),
        }
    }

    /// Advance the input-report counter. Driven every 4.96 ms; a late tick
    /// still advances by exactly one.
    pub fn tick(&self) {
        self.lock().report.increment_counter();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session> {
        // The session holds no lock-poisoning hazards worth dying over.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn now_us(&self) -> u64 {
        self.boot.elapsed().as_micros() as u64
    }

    #[cfg(test)]
    pub(crate) fn set_inputs_at(&self, inputs: &GamepadInputs, now_us: u64) {
        self.lock().set_inputs_at(inputs, now_us);
    }

    #[cfg(test)]
    pub(crate) fn trigger_time(&self, index: usize) -> u16 {
        self.lock().trigger_times.value(index)
    }
}

impl GamepadDevice for SwitchPro {
    fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    fn input_report_id(&self) -> u8 {
        self.lock().input_report_id
    }

    fn report_descriptor(&self) -> &'static [u8] {
        descriptor::REPORT_DESCRIPTOR
    }

    fn set_report_data(&self, report_id: u8, data: &[u8]) {
        match report_id {
            protocol::INPUT_REPORT_STANDARD => self.lock().report.set_data(data),
            _ => warn!("[EMU] Unknown report id: {report_id:#04x}"),
        }
    }

    fn get_report_data(&self, report_id: u8) -> Vec<u8> {
        let mut session = self.lock();
        if !session.hid_ready {
            return Vec::new();
        }
        match report_id {
            protocol::INPUT_REPORT_STANDARD => {
                if session.input_report_mode == protocol::INPUT_REPORT_STANDARD {
                    session.full_input_report()
                } else {
                    session.report.get_report().to_vec()
                }
            }
            _ => Vec::new(),
        }
    }

    fn gamepad_inputs(&self) -> GamepadInputs {
        let session = self.lock();
        let left = session.report.get_left_joystick();
        let right = session.report.get_right_joystick();
        GamepadInputs {
            buttons: session.report.get_buttons(),
            left_joystick: Joystick {
                x: left.x,
                y: -left.y,
            },
            right_joystick: Joystick {
                x: right.x,
                y: -right.y,
            },
            left_trigger: session.report.get_brake(),
            right_trigger: session.report.get_accelerator(),
        }
    }

    fn set_gamepad_inputs(&self, inputs: &GamepadInputs) {
        let now_us = self.now_us();
        self.lock().set_inputs_at(inputs, now_us);
    }

    fn set_battery_level(&self, level: u8) {
        let mut session = self.lock();
        session.battery_level = level.min(100);
        let level = session.battery_level;
        session.report.set_battery_level(level);
    }

    fn on_attach(&self) -> Option<ReportData> {
        Some(self.lock().attach_report())
    }

    fn on_host_report(&self, _report_id: u8, data: &[u8]) -> Option<ReportData> {
        let channel = *data.first()?;
        let mut session = self.lock();
        match channel {
            HOST_INIT_REPORT => Some(session.process_init_command(data)),
            HOST_OUTPUT_REPORT => Some(session.process_command(data)),
            // Rumble waveforms are not emulated; the packet needs no reply.
            HOST_RUMBLE_REPORT => None,
            _ => None,
        }
    }
}
