use embassy_executor::task;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;

use geet_ecu::commands::{Command, LineBuffer, Reply};
use geet_ecu::{Error, SharedEcu};

use crate::usb::{UsbReceiver, MAX_PACKET};

pub const REPLY_DEPTH: usize = 4;
const LINE_LEN: usize = 64;

/// Serial command input. Replies go to the log task, which owns the TX side.
#[task]
pub async fn command_task(
    mut rx: UsbReceiver,
    ecu: &'static SharedEcu,
    reply_tx: Sender<'static, CriticalSectionRawMutex, Result<Reply, Error>, REPLY_DEPTH>,
) {
    let mut line = LineBuffer::<LINE_LEN>::new();
    let mut buf = [0u8; MAX_PACKET];

    loop {
        rx.wait_connection().await;
        // read errors mean the host went away; wait for it to come back
        while let Ok(n) = rx.read_packet(&mut buf).await {
            for &byte in &buf[..n] {
                if let Some(parsed) = line.push(byte) {
                    let reply = parsed.and_then(Command::parse).map(|cmd| ecu.apply(cmd));
                    // a full queue means nobody is listening; drop the reply
                    let _ = reply_tx.try_send(reply);
                }
            }
        }
    }
}
