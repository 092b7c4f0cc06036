//! Serial report lines.

use core::fmt::Write;

use heapless::String;

use crate::pid::{LoopId, PidTelemetry};
use crate::state::Snapshot;

pub type Line = String<160>;

/// Encoded record bytes per hex line.
pub const HEX_BYTES_PER_LINE: usize = 32;

fn flag(set: bool, c: char) -> char {
    if set {
        c
    } else {
        '-'
    }
}

/// `[REC]` summary of the latest record.
pub fn record_line(snap: &Snapshot) -> Line {
    let s = &snap.summary;
    let mut m = Line::new();
    let _ = write!(
        m,
        "[REC] t={} rpm={} n={} map={}mbar tmp={}C egt={}C trq={}dNm pow={}W srv={},{},{}\r\n",
        s.timestamp_ms,
        s.rpm,
        s.ticks,
        s.map_mbar,
        s.tmp_c,
        s.egt_c,
        s.torque_dnm,
        s.power_w,
        snap.servo_us[0],
        snap.servo_us[1],
        snap.servo_us[2],
    );
    m
}

/// `[PID]` state of one loop.
pub fn pid_line(id: LoopId, t: &PidTelemetry) -> Line {
    let name = match id {
        LoopId::Rpm => "rpm",
        LoopId::Vacuum => "vac",
    };
    let mut m = Line::new();
    let _ = write!(
        m,
        "[PID] {} tgt={} act={} err={} p={} i={} d={} out={} g={}/{}/{}\r\n",
        name,
        t.target,
        t.actual,
        t.error,
        t.p_term,
        t.i_term,
        t.d_term,
        t.output,
        t.kp_ui,
        t.ki_ui,
        t.kd_ui,
    );
    m
}

/// `[ECU]` mode, logging and status flags.
pub fn status_line(snap: &Snapshot) -> Line {
    let st = &snap.status;
    let mut m = Line::new();
    let _ = write!(
        m,
        "[ECU] mode={} log={:#x} flags={}{}{}\r\n",
        snap.mode.name(),
        snap.log.to_bits(),
        flag(st.engine_running, 'R'),
        flag(st.feedback_lost, 'F'),
        flag(st.egt_fault, 'E'),
    );
    m
}

/// `[HEX]` line for one chunk of an encoded record starting at `offset`.
pub fn hex_line(offset: usize, chunk: &[u8]) -> Line {
    let mut m = Line::new();
    let _ = write!(m, "[HEX] {:04x} ", offset);
    for b in chunk.iter().take(HEX_BYTES_PER_LINE) {
        let _ = write!(m, "{:02x}", b);
    }
    let _ = m.push_str("\r\n");
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogFlags, SysMode};
    use crate::state::{EcuStatus, EngineSummary};

    fn snapshot() -> Snapshot {
        Snapshot {
            mode: SysMode::PidRpm,
            log: LogFlags::from_bits(0b0011),
            status: EcuStatus {
                engine_running: true,
                feedback_lost: false,
                egt_fault: true,
            },
            summary: EngineSummary {
                timestamp_ms: 1500,
                map_mbar: 850,
                tmp_c: 24,
                egt_c: 612,
                torque_dnm: 105,
                power_w: 3298,
                rpm: 3000,
                ticks: 49,
            },
            servo_us: [1200, 750, 2300],
            ..Default::default()
        }
    }

    #[test]
    fn record_line_fields() {
        assert_eq!(
            record_line(&snapshot()).as_str(),
            "[REC] t=1500 rpm=3000 n=49 map=850mbar tmp=24C egt=612C trq=105dNm pow=3298W srv=1200,750,2300\r\n"
        );
    }

    #[test]
    fn status_flags() {
        assert_eq!(
            status_line(&snapshot()).as_str(),
            "[ECU] mode=PID_RPM log=0x3 flags=R-E\r\n"
        );
    }

    #[test]
    fn pid_fields() {
        let t = PidTelemetry {
            target: 2500,
            actual: 2400,
            error: 100,
            p_term: 100,
            i_term: 40,
            d_term: -3,
            output: 137,
            kp_ui: 80,
            ki_ui: 48,
            kd_ui: 0,
        };
        assert_eq!(
            pid_line(LoopId::Rpm, &t).as_str(),
            "[PID] rpm tgt=2500 act=2400 err=100 p=100 i=40 d=-3 out=137 g=80/48/0\r\n"
        );
    }

    #[test]
    fn hex_chunk() {
        assert_eq!(hex_line(32, &[0x04, 0xab, 0x00]).as_str(), "[HEX] 0020 04ab00\r\n");
        let long = [0u8; HEX_BYTES_PER_LINE + 4];
        assert_eq!(hex_line(0, &long).len(), 11 + 2 * HEX_BYTES_PER_LINE + 2);
    }
}
