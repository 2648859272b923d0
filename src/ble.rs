//! Wireless source plumbing.
//!
//! The kernel surfaces a connected BLE HID gamepad as a hidraw node, so the
//! bridge consumes its notifications with hidapi. Reads are blocking, so
//! they run on a dedicated OS thread (not tokio) and raw reports cross into
//! the async side through a bounded mpsc channel.

use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::gamepad::GamepadDevice;

/// One raw notification: report id first, payload after.
pub type SourceReport = Vec<u8>;

/// How often the battery sysfs node is re-read.
const BATTERY_POLL_PERIOD: Duration = Duration::from_secs(30);

/// Spawn the notification reader thread. Returns a receiver of raw reports.
///
/// The thread runs until the device disconnects or the receiver is dropped.
pub fn spawn_reader(vid: u16, pid: u16, channel_cap: usize) -> mpsc::Receiver<SourceReport> {
    let (tx, rx) = mpsc::sync_channel::<SourceReport>(channel_cap);

    std::thread::Builder::new()
        .name("ble-reader".into())
        .spawn(move || {
            if let Err(e) = reader_loop(vid, pid, &tx) {
                error!("[BLE] Reader thread exited with error: {e}");
            }
        })
        .expect("failed to spawn BLE reader thread");

    rx
}

fn reader_loop(vid: u16, pid: u16, tx: &mpsc::SyncSender<SourceReport>) -> anyhow::Result<()> {
    info!("[BLE] Opening HID device {vid:04X}:{pid:04X}...");

    let api = hidapi::HidApi::new()?;

    // Retry a few times -- the node appears a moment after the connection.
    let device = {
        let mut dev = None;
        for attempt in 1..=10 {
            match api.open(vid, pid) {
                Ok(d) => {
                    dev = Some(d);
                    break;
                }
                Err(e) => {
                    if attempt == 10 {
                        return Err(anyhow::anyhow!(
                            "Could not open HID device after 10 attempts: {e}"
                        ));
                    }
                    warn!("[BLE] Attempt {attempt}/10 failed: {e}, retrying...");
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        }
        dev.unwrap()
    };

    device.set_blocking_mode(true)?;
    info!("[BLE] Source connected. Reading notifications...");

    let mut buf = [0u8; 64];
    loop {
        match device.read_timeout(&mut buf, 100) {
            Ok(0) => {
                // Timeout, no data -- just loop again
                continue;
            }
            Ok(n) => {
                if tx.send(buf[..n].to_vec()).is_err() {
                    info!("[BLE] Channel closed, exiting reader thread.");
                    return Ok(());
                }
            }
            Err(e) => {
                error!("[BLE] Read error: {e}");
                return Err(anyhow::anyhow!("HID read error: {e}"));
            }
        }
    }
}

/// Forward the source's battery level to the emulated controller.
///
/// BlueZ exposes the peer's Battery service as a power-supply node; reading
/// its `capacity` file gives the same 0..100 byte the notification carries.
pub async fn battery_poll_task(path: std::path::PathBuf, device: Arc<dyn GamepadDevice>) {
    loop {
        match read_capacity(&path) {
            Some(level) => {
                debug!("[BLE] Battery level: {level}%");
                device.set_battery_level(level);
            }
            None => debug!("[BLE] Battery node {} not readable", path.display()),
        }
        tokio::time::sleep(BATTERY_POLL_PERIOD).await;
    }
}

fn read_capacity(path: &Path) -> Option<u8> {
    let text = std::fs::read_to_string(path).ok()?;
    text.trim().parse::<u8>().ok().map(|v| v.min(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_capacity_parses_and_clamps() {
        let dir = std::env::temp_dir();
        let path = dir.join("procon-bridge-capacity-test");

        std::fs::write(&path, "87\n").unwrap();
        assert_eq!(read_capacity(&path), Some(87));

        std::fs::write(&path, "  55  ").unwrap();
        assert_eq!(read_capacity(&path), Some(55));

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(read_capacity(&path), None);

        std::fs::remove_file(&path).ok();
        assert_eq!(read_capacity(&path), None);
    }
}
