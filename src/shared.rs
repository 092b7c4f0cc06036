use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::commands::{Command, Reply};
use crate::error::Error;
use crate::records::encode_record;
use crate::scheduler::Scheduler;
use crate::state::{SensorFrame, Snapshot, TickOutcome};

/// The scheduler behind a critical-section mutex.
///
/// The sampling task, the edge task and the logging task each hold the lock
/// only for one short call; no I/O happens inside it.
pub struct SharedEcu {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Scheduler>>,
}

impl SharedEcu {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(scheduler)),
        }
    }

    /// Run `f` with exclusive access to the scheduler.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }

    pub fn tick(&self, frame: &SensorFrame) -> TickOutcome {
        self.with(|s| s.tick(frame))
    }

    pub fn on_rpm_edge(&self, now_us: u32) {
        self.with(|s| s.on_rpm_edge(now_us))
    }

    pub fn apply(&self, command: Command) -> Reply {
        self.with(|s| s.apply(command))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.with(|s| s.snapshot())
    }

    /// Snapshot of a newly published record, once per record.
    pub fn take_ready(&self) -> Option<Snapshot> {
        self.with(|s| s.records_mut().take_ready().then(|| s.snapshot()))
    }

    /// Encode the published record into `buf`.
    pub fn encode_read_side(&self, buf: &mut [u8]) -> Result<usize, Error> {
        self.with(|s| {
            let records = s.records();
            encode_record(records.read_side(), records.averages(), buf)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EcuConfig;
    use crate::records::{Channel, RECORD_BYTES, RECORD_VERSION};

    #[test]
    fn ready_once_per_record() {
        let ecu = SharedEcu::new(Scheduler::new(EcuConfig::default()));
        let frame = SensorFrame {
            analog: [10, 20, 30, 969, 307],
            ..Default::default()
        };
        for _ in 0..99 {
            ecu.tick(&frame);
            assert!(ecu.take_ready().is_none());
        }
        assert!(ecu.tick(&frame).record_ready);

        let snap = ecu.take_ready().unwrap();
        assert_eq!(snap.averages.channel(Channel::Usr2).mean, 30);
        assert_eq!(snap.summary.map_mbar, 200);
        assert!(ecu.take_ready().is_none());

        let mut buf = [0u8; RECORD_BYTES];
        assert_eq!(ecu.encode_read_side(&mut buf), Ok(RECORD_BYTES));
        assert_eq!(buf[0], RECORD_VERSION);
    }
}
