//! The Pro Controller USB HID report descriptor.
//!
//! Declares the standard input report (0x30), the subcommand reply (0x21),
//! the simple HID report (0x3F), the device-init reports (0x80 out /
//! 0x81 in) and the host output reports (0x01 subcommand, 0x10 rumble).

#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,       // Usage Page (Generic Desktop)
    0x15, 0x00,       // Logical Minimum (0)
    0x09, 0x04,       // Usage (Joystick)
    0xA1, 0x01,       // Collection (Application)

    0x85, 0x30,       //   Report ID (0x30) - standard input report
    0x05, 0x01,       //   Usage Page (Generic Desktop)
    0x05, 0x09,       //   Usage Page (Button)
    0x19, 0x01,       //   Usage Minimum (1)
    0x29, 0x0A,       //   Usage Maximum (10)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x01,       //   Logical Maximum (1)
    0x75, 0x01,       //   Report Size (1)
    0x95, 0x0A,       //   Report Count (10)
    0x55, 0x00,       //   Unit Exponent (0)
    0x65, 0x00,       //   Unit (None)
    0x81, 0x02,       //   Input (Data,Var,Abs)
    0x05, 0x09,       //   Usage Page (Button)
    0x19, 0x0B,       //   Usage Minimum (11)
    0x29, 0x0E,       //   Usage Maximum (14)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x01,       //   Logical Maximum (1)
    0x75, 0x01,       //   Report Size (1)
    0x95, 0x04,       //   Report Count (4)
    0x81, 0x02,       //   Input (Data,Var,Abs)
    0x75, 0x01,       //   Report Size (1)
    0x95, 0x02,       //   Report Count (2)
    0x81, 0x03,       //   Input (Const,Var,Abs)

    0x0B, 0x01, 0x00, 0x01, 0x00, //   Usage (0x010001)
    0xA1, 0x00,                   //   Collection (Physical)
    0x0B, 0x30, 0x00, 0x01, 0x00, //     Usage (X)
    0x0B, 0x31, 0x00, 0x01, 0x00, //     Usage (Y)
    0x0B, 0x32, 0x00, 0x01, 0x00, //     Usage (Z)
    0x0B, 0x35, 0x00, 0x01, 0x00, //     Usage (Rz)
    0x15, 0x00,                   //     Logical Minimum (0)
    0x27, 0xFF, 0xFF, 0x00, 0x00, //     Logical Maximum (65534)
    0x75, 0x10,                   //     Report Size (16)
    0x95, 0x04,                   //     Report Count (4)
    0x81, 0x02,                   //     Input (Data,Var,Abs)
    0xC0,                         //   End Collection

    0x0B, 0x39, 0x00, 0x01, 0x00, //   Usage (Hat Switch)
    0x15, 0x00,                   //   Logical Minimum (0)
    0x25, 0x07,                   //   Logical Maximum (7)
    0x35, 0x00,                   //   Physical Minimum (0)
    0x46, 0x3B, 0x01,             //   Physical Maximum (315)
    0x65, 0x14,                   //   Unit (Degrees)
    0x75, 0x04,                   //   Report Size (4)
    0x95, 0x01,                   //   Report Count (1)
    0x81, 0x02,                   //   Input (Data,Var,Abs)
    0x05, 0x09,                   //   Usage Page (Button)
    0x19, 0x0F,                   //   Usage Minimum (15)
    0x29, 0x12,                   //   Usage Maximum (18)
    0x15, 0x00,                   //   Logical Minimum (0)
    0x25, 0x01,                   //   Logical Maximum (1)
    0x75, 0x01,                   //   Report Size (1)
    0x95, 0x04,                   //   Report Count (4)
    0x81, 0x02,                   //   Input (Data,Var,Abs)
    0x75, 0x08,                   //   Report Size (8)
    0x95, 0x34,                   //   Report Count (52)
    0x81, 0x03,                   //   Input (Const,Var,Abs)

    0x06, 0x00, 0xFF, //   Usage Page (Vendor Defined)
    0x85, 0x21,       //   Report ID (0x21) - subcommand reply
    0x09, 0x01,       //   Usage (0x01)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x81, 0x03,       //   Input (Const,Var,Abs)

    0x85, 0x3F,       //   Report ID (0x3F) - simple HID input report
    0x09, 0x02,       //   Usage (0x02)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x81, 0x03,       //   Input (Const,Var,Abs)

    0x85, 0x81,       //   Report ID (0x81) - device-init reply
    0x09, 0x03,       //   Usage (0x03)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x81, 0x03,       //   Input (Const,Var,Abs)

    0x85, 0x01,       //   Report ID (0x01) - output with subcommand
    0x09, 0x04,       //   Usage (0x04)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x91, 0x83,       //   Output (Const,Var,Abs,Volatile)

    0x85, 0x10,       //   Report ID (0x10) - rumble output
    0x09, 0x05,       //   Usage (0x05)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x91, 0x83,       //   Output (Const,Var,Abs,Volatile)

    0x85, 0x80,       //   Report ID (0x80) - device-init command
    0x09, 0x06,       //   Usage (0x06)
    0x75, 0x08,       //   Report Size (8)
    0x95, 0x3F,       //   Report Count (63)
    0x91, 0x83,       //   Output (Const,Var,Abs,Volatile)

    0xC0,             // End Collection
];

#[cfg(test)]
mod tests {
    use super::*;

    /// Walk the descriptor's items and collect every declared report id.
    fn declared_report_ids() -> Vec<u8> {
        let mut ids = Vec::new();
        let mut i = 0;
        while i < REPORT_DESCRIPTOR.len() {
            let prefix = REPORT_DESCRIPTOR[i];
            let size = match prefix & 0x03 {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            };
            if (prefix & 0xFC) == 0x84 {
                ids.push(REPORT_DESCRIPTOR[i + 1]);
            }
            i += 1 + size;
        }
        ids
    }

    #[test]
    fn test_descriptor_declares_required_reports() {
        let ids = declared_report_ids();
        for id in [0x30, 0x21, 0x3F, 0x81, 0x01, 0x10, 0x80] {
            assert!(ids.contains(&id), "missing report id {id:#04x}");
        }
    }

    #[test]
    fn test_descriptor_items_parse_cleanly() {
        // The id walker must land exactly on the end of the buffer; a
        // malformed item table would leave a partial trailing item.
        let mut i = 0;
        while i < REPORT_DESCRIPTOR.len() {
            let prefix = REPORT_DESCRIPTOR[i];
            let size = match prefix & 0x03 {
                0 => 0,
                1 => 1,
                2 => 2,
                _ => 4,
            };
            i += 1 + size;
        }
        assert_eq!(i, REPORT_DESCRIPTOR.len());
    }
}
