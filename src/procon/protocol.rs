//! Subcommand responder and device-init sub-protocol.
//!
//! Every reply is a 49-byte report body seeded from the live input-report
//! snapshot, with the ACK byte at 12, the subcommand echo at 13 and the
//! payload from 14. Constant data follows the wire captures collected in
//! the community protocol notes (dekuNukem / nxbt).

use tracing::debug;

use super::subcommand::{Message, ResponseKind};
use super::Session;
use crate::gamepad::ReportData;

/// Standard full input report id.
pub const INPUT_REPORT_STANDARD: u8 = 0x30;
/// Subcommand reply input report id.
pub const INPUT_REPORT_SUBCOMMAND_REPLY: u8 = 0x21;
/// Device-init reply report id.
pub const DEVICE_INIT_REPORT: u8 = 0x81;

pub const INIT_COMMAND_DEVICE_INFO: u8 = 0x01;
pub const INIT_COMMAND_HANDSHAKE: u8 = 0x02;
pub const INIT_COMMAND_SET_BAUD_RATE: u8 = 0x03;
pub const INIT_COMMAND_ENABLE_USB_HID: u8 = 0x04;
pub const INIT_COMMAND_ENABLE_BT_HID: u8 = 0x05;

/// Init-channel replies carry a fixed 63-byte body.
const INIT_REPLY_LEN: usize = 63;

const ACK_GENERIC: u8 = 0x80;
const ACK_PAIRING: u8 = 0x81;
const ACK_DEVICE_INFO: u8 = 0x82;
const ACK_VIBRATION: u8 = 0x82;
const ACK_TRIGGER_ELAPSED: u8 = 0x83;
const ACK_SPI_READ: u8 = 0x90;
const ACK_NFC_IR_CONFIG: u8 = 0xA0;
const NACK: u8 = 0x83;

/// Firmware version reported in the device-info block (3.48).
const FIRMWARE_VERSION: [u8; 2] = [0x03, 0x48];

/// Values the vibrator input byte has been observed to take on real
/// hardware; one is drawn per subcommand reply.
const VIBRATOR_BYTES: [u8; 3] = [0x70, 0xC0, 0xB0];

/// NFC/IR MCU parameter block.
const NFC_IR_PARAMS: [u8; 8] = [0x01, 0x00, 0xFF, 0x00, 0x08, 0x00, 0x1B, 0x01];

/// Fixed six-axis sample block (three stacked 12-byte samples), shaped like
/// a controller at rest. Written at [12..48] of the full standard report.
const IMU_SAMPLES: [u8; 36] = [
    0x75, 0xFD, 0xFD, 0xFF, 0x09, 0x10, 0x21, 0x00, 0xD5, 0xFF, 0xE0, 0xFF, //
    0x72, 0xFD, 0xF9, 0xFF, 0x0A, 0x10, 0x22, 0x00, 0xD5, 0xFF, 0xE0, 0xFF, //
    0x76, 0xFD, 0xFC, 0xFF, 0x09, 0x10, 0x23, 0x00, 0xD5, 0xFF, 0xE0, 0xFF,
];

impl Session {
    /// Answer one 0x01-channel host packet. Always returns a full 49-byte
    /// body; bad packets are ACKed rather than NACKed so the host moves on
    /// instead of retrying forever.
    pub(crate) fn process_command(&mut self, data: &[u8]) -> ReportData {
        let message = Message::parse(data);

        // Common prelude: seed from the live input-report snapshot.
        let mut report = self.report.get_report().to_vec();
        report[12] = ACK_GENERIC;
        report[13] = message.subcommand_id;
        report[14] = 0;

        self.begin_subcommand_reply(&mut report);

        match message.kind {
            ResponseKind::OnlyControllerState => {
                report[12] = ACK_GENERIC;
                report[13] = 0x00;
            }
            ResponseKind::BtManualPairing => {
                report[12] = ACK_PAIRING;
                report[13] = 0x01;
            }
            ResponseKind::RequestDeviceInfo => {
                // hid_ready flips on this reply, vibrator byte included.
                self.hid_ready = true;
                report[11] = self.vibrator_filler;
                self.write_device_info(&mut report);
            }
            ResponseKind::SetShipment => {
                report[12] = ACK_GENERIC;
                report[13] = 0x08;
            }
            ResponseKind::SpiRead => self.write_spi_read(&mut report, &message),
            ResponseKind::SetMode => {
                report[12] = ACK_GENERIC;
                report[13] = 0x03;
                self.input_report_mode = message.args[0];
            }
            ResponseKind::TriggerButtonsElapsed => {
                report[12] = ACK_TRIGGER_ELAPSED;
                report[13] = 0x04;
                report[14..28].copy_from_slice(&self.trigger_times.as_payload());
            }
            ResponseKind::ToggleImu => {
                report[12] = ACK_GENERIC;
                report[13] = 0x40;
                self.imu_enabled = message.args[0] == 0x01;
            }
            ResponseKind::EnableVibration => {
                report[12] = ACK_VIBRATION;
                report[13] = 0x48;
                self.vibration_enabled = true;
            }
            ResponseKind::SetPlayer => {
                report[12] = ACK_GENERIC;
                report[13] = 0x30;
                self.set_player_lights(message.args[0]);
            }
            ResponseKind::SetNfcIrState => {
                report[12] = ACK_GENERIC;
                report[13] = 0x22;
            }
            ResponseKind::SetNfcIrConfig => {
                report[12] = ACK_NFC_IR_CONFIG;
                report[13] = 0x21;
                report[14..22].copy_from_slice(&NFC_IR_PARAMS);
                // Lone marker byte observed on real replies; the bytes in
                // between keep the snapshot contents.
                report[47] = 0xC8;
            }
            ResponseKind::UnknownSubcommand
            | ResponseKind::NoData
            | ResponseKind::TooShort
            | ResponseKind::Malformed => {
                debug!("[EMU] Unanswerable packet ({:?}), ACKing", message.kind);
                report[12] = ACK_GENERIC;
                report[13] = message.subcommand_id;
                report[14] = 0x03;
            }
        }

        (self.input_report_id, report)
    }

    /// Shared post-amble of every subcommand reply: switch to report id
    /// 0x21, redraw the vibrator byte and refresh the timer.
    fn begin_subcommand_reply(&mut self, report: &mut [u8]) {
        self.input_report_id = INPUT_REPORT_SUBCOMMAND_REPLY;

        let index = (self.rng.next_u32() as usize) % VIBRATOR_BYTES.len();
        self.vibrator_filler = VIBRATOR_BYTES[index];

        report[0] = self.report.counter();
        if self.hid_ready {
            report[11] = self.vibrator_filler;
        }
        // Until device info has been queried the host gets the untouched
        // startup bytes at [1..11].
    }

    fn write_device_info(&mut self, report: &mut [u8]) {
        report[12] = ACK_DEVICE_INFO;
        report[13] = 0x02;

        report[14] = FIRMWARE_VERSION[0];
        report[15] = FIRMWARE_VERSION[1];
        report[16] = 0x03; // Pro Controller
        report[17] = 0x02;
        report[18..24].copy_from_slice(&self.mac_address);
        report[24] = 0x01;
        report[25] = 0x01; // colors live in SPI
    }

    fn write_spi_read(&mut self, report: &mut [u8], message: &Message) {
        let reg = message.args[0];
        let bank = message.args[1];
        let len = message.args[4];

        match self.spi.read(bank, reg, len) {
            Some(bytes) => {
                report[12] = ACK_SPI_READ;
                report[13] = 0x10;
                report[14] = reg;
                report[15] = bank;
                report[16] = 0;
                report[17] = 0;
                report[18] = len;
                report[19..19 + bytes.len()].copy_from_slice(&bytes);
            }
            None => {
                debug!("[EMU] SPI read outside known banks: {bank:#04x}:{reg:#04x}+{len}");
                report[12] = NACK;
                report[13] = 0x00;
            }
        }
    }

    fn set_player_lights(&mut self, bitfield: u8) {
        self.player_number = match bitfield {
            0x01 | 0x10 => 1,
            0x03 | 0x30 => 2,
            0x07 | 0x70 => 3,
            0x0F | 0xF0 => 4,
            // Flash patterns and mixed fields leave the assignment alone.
            _ => self.player_number,
        };
    }

    /// Answer one 0x80-channel device-init command.
    pub(crate) fn process_init_command(&mut self, data: &[u8]) -> ReportData {
        let command = if data.len() > 1 { data[1] } else { 0 };
        let mut reply = vec![0u8; INIT_REPLY_LEN];
        reply[0] = command;

        match command {
            INIT_COMMAND_DEVICE_INFO => {}
            INIT_COMMAND_HANDSHAKE => {
                // Echo the host's payload back.
                let len = (data.len() - 1).min(INIT_REPLY_LEN);
                reply[..len].copy_from_slice(&data[1..1 + len]);
            }
            INIT_COMMAND_SET_BAUD_RATE => {}
            INIT_COMMAND_ENABLE_USB_HID => {
                self.hid_ready = true;
            }
            INIT_COMMAND_ENABLE_BT_HID => {}
            _ => {
                debug!("[EMU] Unknown init command {command:#04x}");
            }
        }

        (DEVICE_INIT_REPORT, reply)
    }

    /// The announcement sent when the wired transport mounts: command 0x01,
    /// device category, then the BT MAC in reverse byte order.
    pub(crate) fn attach_report(&self) -> ReportData {
        let mut reply = vec![0u8; INIT_REPLY_LEN];
        reply[0] = INIT_COMMAND_DEVICE_INFO;
        reply[2] = 0x03;
        for (i, byte) in self.mac_address.iter().rev().enumerate() {
            reply[3 + i] = *byte;
        }
        (DEVICE_INIT_REPORT, reply)
    }

    /// The polled no-subcommand path: report id 0x30 carrying the live
    /// snapshot, with the six-axis block appended when the IMU is on.
    pub(crate) fn full_input_report(&mut self) -> Vec<u8> {
        self.input_report_id = INPUT_REPORT_STANDARD;

        let mut report = self.report.get_report().to_vec();
        if self.hid_ready {
            report[11] = self.vibrator_filler;
        }
        if self.imu_enabled {
            report[12..48].copy_from_slice(&IMU_SAMPLES);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::GamepadInputs;
    use crate::procon::report::REPORT_LEN;
    use crate::procon::subcommand::{HOST_OUTPUT_REPORT, SUBCOMMAND_OFFSET};
    use rand::rngs::mock::StepRng;

    const TEST_MAC: [u8; 6] = [0x98, 0xB6, 0xE9, 0x46, 0x50, 0x6A];

    fn session() -> Session {
        Session::new(Box::new(StepRng::new(0, 1)), TEST_MAC, *b"000000000001")
    }

    fn ready_session() -> Session {
        let mut s = session();
        s.process_command(&frame(0x02, &[]));
        s
    }

    fn frame(subcommand_id: u8, args: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; SUBCOMMAND_OFFSET];
        data[0] = HOST_OUTPUT_REPORT;
        data.push(subcommand_id);
        data.extend_from_slice(args);
        data
    }

    #[test]
    fn test_every_reply_is_49_bytes_with_id_0x21() {
        let mut s = session();
        for id in [0x00u8, 0x01, 0x02, 0x08, 0x22, 0x48, 0x99] {
            let (report_id, body) = s.process_command(&frame(id, &[0x01]));
            assert_eq!(report_id, 0x21, "subcommand {id:#04x}");
            assert_eq!(body.len(), REPORT_LEN, "subcommand {id:#04x}");
        }
    }

    #[test]
    fn test_device_info_query() {
        // S1: subcommand 0x02.
        let mut s = session();
        assert!(!s.hid_ready);

        let (report_id, body) = s.process_command(&frame(0x02, &[]));
        assert_eq!(report_id, 0x21);
        assert_eq!(body[12], 0x82);
        assert_eq!(body[13], 0x02);
        assert_eq!(body[14..18], [0x03, 0x48, 0x03, 0x02]);
        assert_eq!(body[18..24], TEST_MAC);
        assert_eq!(body[24..26], [0x01, 0x01]);
        assert!(s.hid_ready);
    }

    #[test]
    fn test_spi_factory_serial_read() {
        // S2: reg 0x00, bank 0x60, 12 bytes -> the ASCII serial.
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x10, &[0x00, 0x60, 0x00, 0x00, 0x0C]));
        assert_eq!(body[12..19], [0x90, 0x10, 0x00, 0x60, 0x00, 0x00, 0x0C]);
        assert_eq!(&body[19..31], b"000000000001");
    }

    #[test]
    fn test_spi_read_exact_length() {
        let mut s = ready_session();
        for len in [0x01u8, 0x0D, 0x18, 0x1D] {
            let (_, body) = s.process_command(&frame(0x10, &[0x20, 0x60, 0x00, 0x00, len]));
            assert_eq!(body[12], 0x90);
            assert_eq!(body[18], len);
            // Bytes past the data run keep the snapshot contents (zero here).
            if (19 + len as usize) < REPORT_LEN {
                assert_eq!(body[19 + len as usize], 0x00);
            }
        }
    }

    #[test]
    fn test_spi_invalid_bank_nacks() {
        // S3: bank 0xFF.
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x10, &[0x00, 0xFF, 0x00, 0x00, 0x10]));
        assert_eq!(body[12..14], [0x83, 0x00]);
        // Payload region keeps the snapshot template.
        assert_eq!(body[14], 0x00);
    }

    #[test]
    fn test_set_player_lights() {
        // S4: payload 0x07 -> player 3.
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x30, &[0x07]));
        assert_eq!(body[12..14], [0x80, 0x30]);
        assert_eq!(s.player_number, 3);

        // The full bitfield table.
        for (bitfield, player) in [
            (0x01u8, 1u8),
            (0x10, 1),
            (0x03, 2),
            (0x30, 2),
            (0x07, 3),
            (0x70, 3),
            (0x0F, 4),
            (0xF0, 4),
        ] {
            s.process_command(&frame(0x30, &[bitfield]));
            assert_eq!(s.player_number, player, "bitfield {bitfield:#04x}");
        }

        // A flash pattern leaves the assignment unchanged.
        s.process_command(&frame(0x30, &[0x0F]));
        s.process_command(&frame(0x30, &[0x05]));
        assert_eq!(s.player_number, 4);
    }

    #[test]
    fn test_set_report_mode() {
        // S5: payload 0x30.
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x03, &[0x30]));
        assert_eq!(body[12..14], [0x80, 0x03]);
        assert_eq!(s.input_report_mode, 0x30);

        s.process_command(&frame(0x03, &[0x3F]));
        assert_eq!(s.input_report_mode, 0x3F);
    }

    #[test]
    fn test_unknown_subcommand_acked() {
        // S6: subcommand 0x99.
        let mut s = ready_session();
        let player_before = s.player_number;
        let imu_before = s.imu_enabled;

        let (_, body) = s.process_command(&frame(0x99, &[]));
        assert_eq!(body[12], 0x80);
        assert_eq!(body[13], 0x99);
        assert_eq!(body[14], 0x03);
        assert_eq!(s.player_number, player_before);
        assert_eq!(s.imu_enabled, imu_before);
    }

    #[test]
    fn test_short_and_empty_packets_acked() {
        let mut s = ready_session();
        for bad in [&[][..], &[0x01, 0x00][..], &[0x42, 0x00, 0x00][..]] {
            let (report_id, body) = s.process_command(bad);
            assert_eq!(report_id, 0x21);
            assert_eq!(body.len(), REPORT_LEN);
            assert_eq!(body[12], 0x80);
            assert_eq!(body[14], 0x03);
        }
    }

    #[test]
    fn test_imu_toggle() {
        let mut s = ready_session();
        for (arg, enabled) in [(0x01u8, true), (0x00, false), (0x01, true)] {
            let (_, body) = s.process_command(&frame(0x40, &[arg]));
            assert_eq!(body[12..14], [0x80, 0x40]);
            assert_eq!(s.imu_enabled, enabled, "arg {arg}");
        }
    }

    #[test]
    fn test_enable_vibration() {
        let mut s = ready_session();
        assert!(!s.vibration_enabled);
        let (_, body) = s.process_command(&frame(0x48, &[0x01]));
        assert_eq!(body[12..14], [0x82, 0x48]);
        assert!(s.vibration_enabled);
    }

    #[test]
    fn test_bt_pairing_and_shipment_acks() {
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x01, &[]));
        assert_eq!(body[12..14], [0x81, 0x01]);

        let (_, body) = s.process_command(&frame(0x08, &[0x00]));
        assert_eq!(body[12..14], [0x80, 0x08]);
    }

    #[test]
    fn test_nfc_ir_replies() {
        let mut s = ready_session();
        let (_, body) = s.process_command(&frame(0x22, &[0x00]));
        assert_eq!(body[12..14], [0x80, 0x22]);

        let (_, body) = s.process_command(&frame(0x21, &[0x00]));
        assert_eq!(body[12..14], [0xA0, 0x21]);
        assert_eq!(body[14..22], NFC_IR_PARAMS);
        assert_eq!(body[47], 0xC8);
    }

    #[test]
    fn test_trigger_elapsed_payload() {
        let mut s = ready_session();
        s.trigger_times.set_for_test(0, 0x1234);
        s.trigger_times.set_for_test(6, 0x0005);

        let (_, body) = s.process_command(&frame(0x04, &[]));
        assert_eq!(body[12..14], [0x83, 0x04]);
        // 7 little-endian u16 values: L first, HOME last.
        assert_eq!(body[14..16], [0x34, 0x12]);
        assert_eq!(body[26..28], [0x05, 0x00]);
    }

    #[test]
    fn test_counter_advances_reply_timer() {
        let mut s = ready_session();
        let (_, first) = s.process_command(&frame(0x00, &[]));
        for _ in 0..5 {
            s.report.increment_counter();
        }
        let (_, second) = s.process_command(&frame(0x00, &[]));
        assert_eq!(second[0].wrapping_sub(first[0]), 5);
    }

    #[test]
    fn test_vibrator_byte_needs_hid_ready() {
        let mut s = session();
        // Before device info: [1..11] keeps the startup bytes, vibrator
        // byte included.
        let (_, body) = s.process_command(&frame(0x00, &[]));
        assert_eq!(body[11], 0x00);

        s.process_command(&frame(0x02, &[]));
        let (_, body) = s.process_command(&frame(0x00, &[]));
        assert!(VIBRATOR_BYTES.contains(&body[11]));
    }

    #[test]
    fn test_init_handshake_echo() {
        let mut s = session();
        let (report_id, reply) =
            s.process_init_command(&[0x80, INIT_COMMAND_HANDSHAKE, 0xAA, 0xBB]);
        assert_eq!(report_id, 0x81);
        assert_eq!(reply.len(), 63);
        assert_eq!(reply[..3], [INIT_COMMAND_HANDSHAKE, 0xAA, 0xBB]);
    }

    #[test]
    fn test_init_enable_usb_hid_sets_ready() {
        let mut s = session();
        let (_, reply) = s.process_init_command(&[0x80, INIT_COMMAND_ENABLE_USB_HID]);
        assert_eq!(reply[0], INIT_COMMAND_ENABLE_USB_HID);
        assert_eq!(&reply[1..], &[0u8; 62][..]);
        assert!(s.hid_ready);
    }

    #[test]
    fn test_init_device_info_and_baud_rate_zeroed() {
        let mut s = session();
        for command in [INIT_COMMAND_DEVICE_INFO, INIT_COMMAND_SET_BAUD_RATE] {
            let (_, reply) = s.process_init_command(&[0x80, command, 0x55]);
            assert_eq!(reply[0], command);
            assert_eq!(&reply[1..], &[0u8; 62][..]);
        }
        assert!(!s.hid_ready);
    }

    #[test]
    fn test_attach_report() {
        let s = session();
        let (report_id, reply) = s.attach_report();
        assert_eq!(report_id, 0x81);
        assert_eq!(reply[0], 0x01);
        assert_eq!(reply[2], 0x03);
        let reversed: Vec<u8> = TEST_MAC.iter().rev().copied().collect();
        assert_eq!(&reply[3..9], &reversed[..]);
    }

    #[test]
    fn test_full_report_carries_imu_when_enabled() {
        let mut s = ready_session();
        s.report.set_inputs(&GamepadInputs::default());

        s.process_command(&frame(0x40, &[0x01]));
        let report = s.full_input_report();
        assert_eq!(s.input_report_id, 0x30);
        assert_eq!(report[12..48], IMU_SAMPLES);

        s.process_command(&frame(0x40, &[0x00]));
        let report = s.full_input_report();
        assert_eq!(&report[12..48], &[0u8; 36][..]);
    }

    #[test]
    fn test_report_id_transitions() {
        let mut s = ready_session();
        s.process_command(&frame(0x03, &[0x30]));
        assert_eq!(s.input_report_id, 0x21);
        s.full_input_report();
        assert_eq!(s.input_report_id, 0x30);
        s.process_command(&frame(0x00, &[]));
        assert_eq!(s.input_report_id, 0x21);
    }
}
