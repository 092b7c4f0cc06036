//! Fast/slow/record tick orchestration.
//!
//! One [`Scheduler::tick`] per fast period. Every `NO_OF_FAST_PER_SLOW`th
//! tick also runs the control step, and every `NO_OF_SLOW_PER_RECORD`th
//! control step closes the record. Nothing here blocks or allocates.

use crate::calibration::{CalibrationPoints, CalibrationTable, SensorId};
use crate::commands::{Command, Reply};
use crate::config::{
    EcuConfig, LogFlags, ServoCal, SysMode, FAST_SAMPLE_INTERVAL_MS, NO_OF_FAST_PER_SLOW,
    NO_OF_SERVOS, NO_OF_SLOW_PER_EGT, NO_OF_SLOW_PER_RECORD, NO_OF_USER_INPUTS, PID_OUTPUT_MAX,
    PID_OUTPUT_MIN, SLOW_SAMPLE_INTERVAL_MS,
};
use crate::error::Error;
use crate::pid::{LoopId, PidAxis, PidState};
use crate::records::{Channel, RecordAggregator};
use crate::rpm::RpmEstimator;
use crate::settings::Settings;
use crate::state::{EcuStatus, EgtReading, EngineSummary, SensorFrame, Snapshot, TickOutcome};

/// Latest calibrated process variables.
#[derive(Debug, Clone, Copy, Default)]
struct ProcessValues {
    usr: [i32; NO_OF_USER_INPUTS],
    map_mbar: i32,
    tmp_c: i32,
    torque_counts: Option<i16>,
    egt_quarter_c: Option<u16>,
}

/// Servo command to pulse width through the servo's calibration.
fn servo_map(cal: &ServoCal) -> CalibrationPoints {
    CalibrationPoints::new(
        PID_OUTPUT_MIN,
        PID_OUTPUT_MAX,
        cal.lower_us as i32,
        cal.upper_us as i32,
    )
    .unwrap_or(CalibrationPoints::identity())
}

pub struct Scheduler {
    calibration: CalibrationTable,
    servo_cal: [ServoCal; NO_OF_SERVOS],
    servo_maps: [CalibrationPoints; NO_OF_SERVOS],
    max_feedback_ms: u32,
    log: LogFlags,
    mode: SysMode,

    rpm_loop: PidState,
    vacuum_loop: PidState,
    rpm: RpmEstimator,
    records: RecordAggregator,

    fast_count: u32,
    slow_count: u32,
    elapsed_ms: u32,
    feedback_timer_ms: u32,

    latest: ProcessValues,
    servo_cmd: [u16; NO_OF_SERVOS],
    servo_us: [u16; NO_OF_SERVOS],
    status: EcuStatus,
    summary: EngineSummary,
}

impl Scheduler {
    pub fn new(config: EcuConfig) -> Self {
        let servo_maps = config.servo_cal.each_ref().map(servo_map);
        let servo_us = servo_maps.each_ref().map(|m| m.map_to_units(PID_OUTPUT_MIN) as u16);
        info!("scheduler up in mode {=str}", config.mode.name());
        Self {
            calibration: config.calibration,
            servo_cal: config.servo_cal,
            servo_maps,
            max_feedback_ms: config.max_feedback_ms,
            log: config.log,
            mode: config.mode,
            rpm_loop: PidState::new(&config.rpm_loop),
            vacuum_loop: PidState::new(&config.vacuum_loop),
            rpm: RpmEstimator::new(),
            records: RecordAggregator::new(0),
            fast_count: 0,
            slow_count: 0,
            elapsed_ms: 0,
            feedback_timer_ms: 0,
            latest: ProcessValues::default(),
            servo_cmd: [PID_OUTPUT_MIN as u16; NO_OF_SERVOS],
            servo_us,
            status: EcuStatus::default(),
            summary: EngineSummary::default(),
        }
    }

    // ── Timing ────────────────────────────────────────────────────────────────

    /// Run one fast period and whatever slower work falls due with it.
    pub fn tick(&mut self, frame: &SensorFrame) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        self.on_fast_tick(frame);
        self.elapsed_ms = self.elapsed_ms.wrapping_add(FAST_SAMPLE_INTERVAL_MS);
        self.fast_count += 1;
        if self.fast_count < NO_OF_FAST_PER_SLOW {
            return outcome;
        }
        self.fast_count = 0;

        outcome.slow = true;
        outcome.servo_us = Some(self.on_slow_tick());
        self.slow_count += 1;
        if self.slow_count < NO_OF_SLOW_PER_RECORD {
            return outcome;
        }
        self.slow_count = 0;

        self.on_record_boundary();
        outcome.record_ready = true;
        outcome
    }

    /// Store the analog samples and refresh the calibrated process values.
    pub fn on_fast_tick(&mut self, frame: &SensorFrame) {
        for (&raw, channel) in frame.analog.iter().zip(Channel::FAST) {
            self.records.write_sample(channel, raw.min(i16::MAX as u16) as i16);
        }

        for (usr, &raw) in self.latest.usr.iter_mut().zip(&frame.analog) {
            *usr = (raw as i32).clamp(PID_OUTPUT_MIN, PID_OUTPUT_MAX);
        }
        let map_raw = frame.analog[Channel::Map as usize] as i32;
        let tmp_raw = frame.analog[Channel::Tmp as usize] as i32;
        self.latest.map_mbar = self.calibration.map(SensorId::Map, map_raw);
        self.latest.tmp_c = self.calibration.map(SensorId::Tmp, tmp_raw);

        if let Some(counts) = frame.torque_counts {
            self.latest.torque_counts = Some(counts);
        }
        match frame.egt {
            Some(EgtReading::QuarterDegrees(q)) => {
                self.status.egt_fault = false;
                self.latest.egt_quarter_c = Some(q);
            }
            Some(EgtReading::OpenCircuit) => {
                if !self.status.egt_fault {
                    warn!("thermocouple open");
                }
                self.status.egt_fault = true;
                self.latest.egt_quarter_c = None;
            }
            None => {}
        }
    }

    /// Control step: RPM fold, PID loops, servo commands. Returns pulse widths.
    pub fn on_slow_tick(&mut self) -> [u16; NO_OF_SERVOS] {
        let edge_seen = self.rpm.slow_update();
        self.update_feedback(edge_seen);

        let mut cmd = self.latest.usr;
        if self.mode.uses_rpm_loop() {
            cmd[0] = self.rpm_loop.tick(self.rpm.instant_rpm() as i32);
        }
        if self.mode.uses_vacuum_loop() {
            cmd[1] = self.vacuum_loop.tick(self.latest.map_mbar);
        }

        for (i, &c) in cmd.iter().enumerate() {
            let c = c.clamp(PID_OUTPUT_MIN, PID_OUTPUT_MAX);
            self.servo_cmd[i] = c as u16;
            self.servo_us[i] = self.servo_pulse(i, c);
            self.records.write_sample(Channel::SERVOS[i], c as i16);
        }

        if let Some(counts) = self.latest.torque_counts {
            self.records.write_sample(Channel::Trq, counts);
        }
        if (self.slow_count + 1) % NO_OF_SLOW_PER_EGT == 0 {
            if let Some(q) = self.latest.egt_quarter_c {
                self.records.write_sample(Channel::Egt, q.min(i16::MAX as u16) as i16);
            }
        }

        self.servo_us
    }

    /// Close the record: publish averages and refresh the summary.
    pub fn on_record_boundary(&mut self) {
        let reading = self.rpm.finalize();
        let averages = *self.records.swap(self.elapsed_ms, reading);
        self.summary = EngineSummary::from_averages(&averages, &self.calibration);

        let running = self.summary.engine_running();
        if running != self.status.engine_running {
            info!("engine running: {=bool} at {=u16} rpm", running, reading.rpm);
        }
        self.status.engine_running = running;
    }

    /// Flywheel edge at free-running time `now_us`.
    pub fn on_rpm_edge(&mut self, now_us: u32) {
        if let Some(interval) = self.rpm.on_edge(now_us) {
            self.records.write_tick(interval);
        }
    }

    fn servo_pulse(&self, servo: usize, command: i32) -> u16 {
        let cal = &self.servo_cal[servo];
        let lo = cal.lower_us.min(cal.upper_us) as i32;
        let hi = cal.lower_us.max(cal.upper_us) as i32;
        self.servo_maps[servo].map_to_units(command).clamp(lo, hi) as u16
    }

    fn update_feedback(&mut self, edge_seen: bool) {
        let armed = self.mode.uses_rpm_loop() && self.rpm_loop.target() > 0;
        if !armed || edge_seen {
            self.feedback_timer_ms = 0;
            return;
        }
        self.feedback_timer_ms = self.feedback_timer_ms.saturating_add(SLOW_SAMPLE_INTERVAL_MS);
        if self.feedback_timer_ms > self.max_feedback_ms && !self.status.feedback_lost {
            warn!("no rpm feedback for {=u32} ms", self.feedback_timer_ms);
            self.status.feedback_lost = true;
        }
    }

    // ── Control inputs ────────────────────────────────────────────────────────

    /// Switch mode; both loops restart from a clean state.
    pub fn set_mode(&mut self, mode: SysMode) {
        info!("mode {=str} -> {=str}", self.mode.name(), mode.name());
        self.mode = mode;
        self.rpm_loop.reset();
        self.vacuum_loop.reset();
        self.status.feedback_lost = false;
        self.feedback_timer_ms = 0;
    }

    pub fn set_gain(&mut self, id: LoopId, axis: PidAxis, ui: u8) {
        debug!("gain {} {} = {=u8}", id, axis, ui);
        self.loop_mut(id).set_gain(axis, ui);
    }

    /// Returns the target actually applied after clamping.
    pub fn set_target(&mut self, id: LoopId, value: i32) -> i32 {
        let applied = self.loop_mut(id).set_target(value);
        debug!("target {} = {=i32}", id, applied);
        applied
    }

    pub fn clear_feedback_lost(&mut self) {
        self.status.feedback_lost = false;
        self.feedback_timer_ms = 0;
    }

    pub fn set_log_flags(&mut self, flags: LogFlags) {
        self.log = flags;
    }

    pub fn load_calibration(
        &mut self,
        sensor: SensorId,
        raw_low: i32,
        raw_high: i32,
        unit_low: i32,
        unit_high: i32,
    ) -> Result<(), Error> {
        let points = CalibrationPoints::new(raw_low, raw_high, unit_low, unit_high)?;
        self.calibration.set(sensor, points);
        info!("calibration loaded for {}", sensor);
        Ok(())
    }

    pub fn apply(&mut self, command: Command) -> Reply {
        match command {
            Command::SetMode(mode) => self.set_mode(mode),
            Command::SetTarget(id, value) => {
                self.set_target(id, value);
            }
            Command::SetGain(id, axis, ui) => self.set_gain(id, axis, ui),
            Command::ClearFeedbackLost => self.clear_feedback_lost(),
            Command::SetLogFlags(flags) => self.set_log_flags(flags),
            Command::Save => return Reply::Save,
            Command::Status => return Reply::Status,
            Command::Help => return Reply::Help,
        }
        Reply::Ack
    }

    // ── Readers ───────────────────────────────────────────────────────────────

    fn loop_mut(&mut self, id: LoopId) -> &mut PidState {
        match id {
            LoopId::Rpm => &mut self.rpm_loop,
            LoopId::Vacuum => &mut self.vacuum_loop,
        }
    }

    pub fn pid(&self, id: LoopId) -> &PidState {
        match id {
            LoopId::Rpm => &self.rpm_loop,
            LoopId::Vacuum => &self.vacuum_loop,
        }
    }

    pub const fn mode(&self) -> SysMode {
        self.mode
    }

    pub const fn log_flags(&self) -> LogFlags {
        self.log
    }

    pub const fn status(&self) -> EcuStatus {
        self.status
    }

    pub const fn summary(&self) -> &EngineSummary {
        &self.summary
    }

    pub const fn records(&self) -> &RecordAggregator {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut RecordAggregator {
        &mut self.records
    }

    pub const fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub const fn servo_commands(&self) -> [u16; NO_OF_SERVOS] {
        self.servo_cmd
    }

    pub const fn servo_us(&self) -> [u16; NO_OF_SERVOS] {
        self.servo_us
    }

    pub const fn instant_rpm(&self) -> u16 {
        self.rpm.instant_rpm()
    }

    pub const fn elapsed_ms(&self) -> u32 {
        self.elapsed_ms
    }

    /// Persistable view of the current state.
    pub fn settings(&self) -> Settings {
        Settings {
            servo_cal: self.servo_cal,
            log: self.log,
            mode: self.mode,
            rpm_gains: self.rpm_loop.gains_ui(),
            vacuum_gains: self.vacuum_loop.gains_ui(),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            mode: self.mode,
            log: self.log,
            status: self.status,
            averages: *self.records.averages(),
            summary: self.summary,
            rpm_pid: self.rpm_loop.telemetry(),
            vacuum_pid: self.vacuum_loop.telemetry(),
            servo_us: self.servo_us,
        }
    }
}
