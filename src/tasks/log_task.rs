use core::fmt::Write;

use embassy_executor::task;
use embassy_futures::select::{select, Either};
use embassy_stm32::peripherals::SPI3;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Receiver;
use embassy_time::{Duration, Ticker};

use geet_ecu::commands::{Reply, HELP};
use geet_ecu::config::SLOW_SAMPLE_INTERVAL_MS;
use geet_ecu::pid::LoopId;
use geet_ecu::records::RECORD_BYTES;
use geet_ecu::report::{hex_line, pid_line, record_line, status_line, Line, HEX_BYTES_PER_LINE};
use geet_ecu::state::Snapshot;
use geet_ecu::{Error, SharedEcu};

use crate::drivers::flash::{W25qxx, SETTINGS_ADDR};
use crate::tasks::command_task::REPLY_DEPTH;
use crate::usb::{UsbSender, MAX_PACKET};

/// Split a line into endpoint-sized packets. Write errors drop the rest.
async fn send(tx: &mut UsbSender, bytes: &[u8]) {
    for chunk in bytes.chunks(MAX_PACKET) {
        if tx.write_packet(chunk).await.is_err() {
            return;
        }
    }
    // a full last packet needs a short one to end the transfer
    if !bytes.is_empty() && bytes.len() % MAX_PACKET == 0 {
        let _ = tx.write_packet(&[]).await;
    }
}

async fn send_state(tx: &mut UsbSender, snap: &Snapshot) {
    send(tx, status_line(snap).as_bytes()).await;
    send(tx, record_line(snap).as_bytes()).await;
    send(tx, pid_line(LoopId::Rpm, &snap.rpm_pid).as_bytes()).await;
    send(tx, pid_line(LoopId::Vacuum, &snap.vacuum_pid).as_bytes()).await;
}

/// Record reports and command replies on the USB serial port.
///
/// Polls for a published record every slow period; each record is reported
/// once, as text lines and/or a hex image depending on the log flags.
#[task]
pub async fn log_task(
    mut tx: UsbSender,
    mut flash: W25qxx<'static, SPI3>,
    ecu: &'static SharedEcu,
    reply_rx: Receiver<'static, CriticalSectionRawMutex, Result<Reply, Error>, REPLY_DEPTH>,
) {
    let mut ticker = Ticker::every(Duration::from_millis(SLOW_SAMPLE_INTERVAL_MS as u64));
    let mut image = [0u8; RECORD_BYTES];

    loop {
        match select(ticker.next(), reply_rx.receive()).await {
            // ── Records ───────────────────────────────────────────────────────
            Either::First(()) => {
                let Some(snap) = ecu.take_ready() else {
                    continue;
                };
                if !tx.dtr() {
                    continue;
                }

                if snap.log.serial_write {
                    send(&mut tx, record_line(&snap).as_bytes()).await;
                    if snap.mode.uses_rpm_loop() {
                        send(&mut tx, pid_line(LoopId::Rpm, &snap.rpm_pid).as_bytes()).await;
                    }
                    if snap.mode.uses_vacuum_loop() {
                        send(&mut tx, pid_line(LoopId::Vacuum, &snap.vacuum_pid).as_bytes()).await;
                    }
                }

                if snap.log.serial_write_hex {
                    if let Ok(n) = ecu.encode_read_side(&mut image) {
                        for (i, chunk) in image[..n].chunks(HEX_BYTES_PER_LINE).enumerate() {
                            send(&mut tx, hex_line(i * HEX_BYTES_PER_LINE, chunk).as_bytes()).await;
                        }
                    }
                }
            }

            // ── Command replies ───────────────────────────────────────────────
            Either::Second(reply) => match reply {
                Ok(Reply::Ack) => send(&mut tx, b"OK\r\n").await,
                Ok(Reply::Status) => send_state(&mut tx, &ecu.snapshot()).await,
                Ok(Reply::Help) => {
                    for text in HELP {
                        send(&mut tx, text.as_bytes()).await;
                        send(&mut tx, b"\r\n").await;
                    }
                }
                Ok(Reply::Save) => {
                    let settings = ecu.with(|s| s.settings());
                    match flash.store(SETTINGS_ADDR, &settings.to_bytes()).await {
                        Ok(()) => send(&mut tx, b"OK saved\r\n").await,
                        Err(e) => {
                            defmt::warn!("settings save failed: {}", e);
                            send(&mut tx, b"ERR flash\r\n").await;
                        }
                    }
                }
                Err(e) => {
                    let mut m = Line::new();
                    let _ = write!(m, "ERR {}\r\n", e);
                    send(&mut tx, m.as_bytes()).await;
                }
            },
        }
    }
}
