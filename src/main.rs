//! procon-bridge - wireless gamepad to wired Switch Pro Controller.
//!
//! BLE-in, USB-gadget-out. The wireless controller's notifications come in
//! through hidapi, get normalized into a generic snapshot, and feed the
//! emulated Pro Controller that answers the console's subcommand stream on
//! the gadget side.

use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};

use procon_bridge::ble::{self, SourceReport};
use procon_bridge::gamepad::GamepadDevice;
use procon_bridge::procon::protocol::INPUT_REPORT_STANDARD;
use procon_bridge::procon::{self, SwitchPro};
use procon_bridge::usb::gadget::{GadgetDevice, FRAME_LEN};
use procon_bridge::xbox::{self, XboxSource};

#[derive(Parser)]
#[command(
    name = "procon-bridge",
    about = "Bridge a wireless gamepad onto a wired Pro Controller interface"
)]
struct Args {
    /// USB gadget HID device node
    #[arg(long, default_value = "/dev/hidg0")]
    gadget: PathBuf,

    /// Wireless source vendor id (hex)
    #[arg(long, default_value = "045E", value_parser = parse_hex_id)]
    source_vid: u16,

    /// Wireless source product id (hex)
    #[arg(long, default_value = "0B13", value_parser = parse_hex_id)]
    source_pid: u16,

    /// Battery capacity sysfs node of the wireless source
    #[arg(long)]
    battery_path: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_hex_id(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    info!("=== procon-bridge ===");
    info!("BLE-in, USB-gadget-out");

    let emulator = Arc::new(SwitchPro::new());
    {
        let identity = emulator.device_info();
        info!(
            "[EMU] Presenting as {} {} ({:04X}:{:04X}), serial {}",
            identity.manufacturer_name,
            identity.product_name,
            identity.vid,
            identity.pid,
            identity.serial_number
        );
    }

    // --- Counter tick: 4.96 ms, late ticks advance by one ---
    let tick_emulator = emulator.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_micros(procon::COUNTER_PERIOD_US));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            tick_emulator.tick();
        }
    });

    // --- Battery forwarding (optional) ---
    if let Some(path) = args.battery_path.clone() {
        let battery_emulator: Arc<dyn GamepadDevice> = emulator.clone();
        tokio::spawn(ble::battery_poll_task(path, battery_emulator));
    }

    // --- Wireless source reader thread ---
    let source_rx = ble::spawn_reader(args.source_vid, args.source_pid, 2);

    // --- Wired transport ---
    let gadget = GadgetDevice::open(&args.gadget)
        .with_context(|| format!("opening gadget device {}", args.gadget.display()))?;
    info!("[USB] Gadget device {} open", args.gadget.display());

    // Announce ourselves; without a host bound yet this fails harmlessly.
    if let Some((report_id, body)) = emulator.on_attach() {
        if let Err(e) = gadget.write_report(report_id, &body).await {
            warn!("[USB] Attach announcement not delivered: {e}");
        }
    }

    info!("[EMU] Bridge active.");

    match run_bridge(&gadget, &source_rx, &emulator).await {
        DisconnectReason::SourceLost => {
            error!("[BLE] Wireless source disconnected. Exiting.");
        }
        DisconnectReason::HostLost => {
            error!("[USB] Host transport failed. Exiting.");
        }
    }

    Ok(())
}

enum DisconnectReason {
    SourceLost,
    HostLost,
}

async fn run_bridge(
    gadget: &GadgetDevice,
    source_rx: &Receiver<SourceReport>,
    emulator: &Arc<SwitchPro>,
) -> DisconnectReason {
    let source = XboxSource::new();
    let mut host_buf = [0u8; FRAME_LEN];

    loop {
        // --- Wireless notification (non-blocking from the reader thread) ---
        match source_rx.recv_timeout(Duration::from_millis(8)) {
            Ok(raw) => {
                if let Err(e) = forward_notification(&raw, &source, emulator, gadget).await {
                    warn!("[USB] Send error: {e}");
                    return DisconnectReason::HostLost;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return DisconnectReason::SourceLost;
            }
        }

        // --- Host output channel, polled with a small time budget ---
        tokio::select! {
            result = gadget.read(&mut host_buf) => {
                match result {
                    Ok(0) => {}
                    Ok(n) => {
                        let frame = &host_buf[..n];
                        debug!("[USB] Host report ({n} bytes): {:02X?}", &frame[..n.min(16)]);
                        if let Some((report_id, body)) = emulator.on_host_report(frame[0], frame) {
                            if !body.is_empty() {
                                if let Err(e) = gadget.write_report(report_id, &body).await {
                                    warn!("[USB] Reply send error: {e}");
                                    return DisconnectReason::HostLost;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("[USB] Read error: {e}");
                        return DisconnectReason::HostLost;
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(1)) => {
                // No host traffic this cycle.
            }
        }
    }
}

/// Decode one wireless notification and push the resulting state to the
/// host when the session is ready for input reports.
async fn forward_notification(
    raw: &[u8],
    source: &XboxSource,
    emulator: &Arc<SwitchPro>,
    gadget: &GadgetDevice,
) -> std::io::Result<()> {
    // hidapi hands numbered reports back with the id byte in front; a bare
    // 16-byte buffer is an unnumbered input report.
    let (report_id, payload) = if raw.len() == xbox::INPUT_REPORT_LEN {
        (xbox::INPUT_REPORT_ID, raw)
    } else if raw.len() > 1 {
        (raw[0], &raw[1..])
    } else {
        return Ok(());
    };

    source.set_report_data(report_id, payload);

    match report_id {
        xbox::INPUT_REPORT_ID => {
            emulator.set_gamepad_inputs(&source.gamepad_inputs());

            let body = emulator.get_report_data(INPUT_REPORT_STANDARD);
            if !body.is_empty() {
                gadget.write_report(emulator.input_report_id(), &body).await?;
            }
        }
        xbox::BATTERY_REPORT_ID => {
            emulator.set_battery_level(source.battery_level());
        }
        _ => {}
    }

    Ok(())
}
