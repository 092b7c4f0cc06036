//! Double-buffered data records and their wire image.

use heapless::Vec;

use crate::config::{
    EGT_SAMPLES_PER_UPDATE, FAST_SAMPLES_PER_UPDATE, NO_OF_FAST_CHANNELS, NO_OF_SERVOS,
    RPM_MAX_TICKS_PER_UPDATE, SLOW_SAMPLES_PER_UPDATE,
};
use crate::error::Error;
use crate::rpm::{rpm_from_ticks, RpmReading};

/// Layout version of the encoded record. Bump on any layout change.
pub const RECORD_VERSION: u8 = 4;

const NO_OF_SLOW_CHANNELS: usize = 1 + NO_OF_SERVOS;

// ── Channels ──────────────────────────────────────────────────────────────────

/// Sampled channels, in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Usr0,
    Usr1,
    Usr2,
    Map,
    Tmp,
    Egt,
    Trq,
    Srv0,
    Srv1,
    Srv2,
}

impl Channel {
    pub const COUNT: usize = 10;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Usr0,
        Channel::Usr1,
        Channel::Usr2,
        Channel::Map,
        Channel::Tmp,
        Channel::Egt,
        Channel::Trq,
        Channel::Srv0,
        Channel::Srv1,
        Channel::Srv2,
    ];

    /// Fast analog channel by ADC input index.
    pub const FAST: [Channel; NO_OF_FAST_CHANNELS] = [
        Channel::Usr0,
        Channel::Usr1,
        Channel::Usr2,
        Channel::Map,
        Channel::Tmp,
    ];

    pub const SERVOS: [Channel; NO_OF_SERVOS] = [Channel::Srv0, Channel::Srv1, Channel::Srv2];

    /// Samples one record holds for this channel.
    pub const fn capacity(self) -> usize {
        match self {
            Channel::Usr0 | Channel::Usr1 | Channel::Usr2 | Channel::Map | Channel::Tmp => {
                FAST_SAMPLES_PER_UPDATE
            }
            Channel::Egt => EGT_SAMPLES_PER_UPDATE,
            Channel::Trq | Channel::Srv0 | Channel::Srv1 | Channel::Srv2 => SLOW_SAMPLES_PER_UPDATE,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Channel::Usr0 => "usr0",
            Channel::Usr1 => "usr1",
            Channel::Usr2 => "usr2",
            Channel::Map => "map",
            Channel::Tmp => "tmp",
            Channel::Egt => "egt",
            Channel::Trq => "trq",
            Channel::Srv0 => "srv0",
            Channel::Srv1 => "srv1",
            Channel::Srv2 => "srv2",
        }
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// Samples of one update period.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    timestamp_ms: u32,
    fast: [Vec<i16, FAST_SAMPLES_PER_UPDATE>; NO_OF_FAST_CHANNELS],
    egt: Vec<i16, EGT_SAMPLES_PER_UPDATE>,
    slow: [Vec<i16, SLOW_SAMPLES_PER_UPDATE>; NO_OF_SLOW_CHANNELS],
    ticks: Vec<u16, RPM_MAX_TICKS_PER_UPDATE>,
}

impl DataRecord {
    pub fn new(timestamp_ms: u32) -> Self {
        Self {
            timestamp_ms,
            fast: core::array::from_fn(|_| Vec::new()),
            egt: Vec::new(),
            slow: core::array::from_fn(|_| Vec::new()),
            ticks: Vec::new(),
        }
    }

    pub fn clear(&mut self, timestamp_ms: u32) {
        self.timestamp_ms = timestamp_ms;
        self.fast.iter_mut().for_each(|v| v.clear());
        self.egt.clear();
        self.slow.iter_mut().for_each(|v| v.clear());
        self.ticks.clear();
    }

    pub const fn timestamp_ms(&self) -> u32 {
        self.timestamp_ms
    }

    pub fn samples(&self, channel: Channel) -> &[i16] {
        match channel {
            Channel::Usr0 => self.fast[0].as_slice(),
            Channel::Usr1 => self.fast[1].as_slice(),
            Channel::Usr2 => self.fast[2].as_slice(),
            Channel::Map => self.fast[3].as_slice(),
            Channel::Tmp => self.fast[4].as_slice(),
            Channel::Egt => self.egt.as_slice(),
            Channel::Trq => self.slow[0].as_slice(),
            Channel::Srv0 => self.slow[1].as_slice(),
            Channel::Srv1 => self.slow[2].as_slice(),
            Channel::Srv2 => self.slow[3].as_slice(),
        }
    }

    pub fn ticks(&self) -> &[u16] {
        self.ticks.as_slice()
    }

    /// Append a sample; `false` when the channel is full and it was dropped.
    pub fn push(&mut self, channel: Channel, value: i16) -> bool {
        let slot = match channel {
            Channel::Usr0 => self.fast[0].push(value),
            Channel::Usr1 => self.fast[1].push(value),
            Channel::Usr2 => self.fast[2].push(value),
            Channel::Map => self.fast[3].push(value),
            Channel::Tmp => self.fast[4].push(value),
            Channel::Egt => self.egt.push(value),
            Channel::Trq => self.slow[0].push(value),
            Channel::Srv0 => self.slow[1].push(value),
            Channel::Srv1 => self.slow[2].push(value),
            Channel::Srv2 => self.slow[3].push(value),
        };
        slot.is_ok()
    }

    pub fn push_tick(&mut self, interval: u16) -> bool {
        self.ticks.push(interval).is_ok()
    }

    /// Per-channel truncating means. RPM comes from the stored intervals only.
    pub fn compute_averages(&self) -> DataAverages {
        let mut channels = [ChannelAverage::default(); Channel::COUNT];
        for (avg, channel) in channels.iter_mut().zip(Channel::ALL) {
            let samples = self.samples(channel);
            if !samples.is_empty() {
                let sum: i64 = samples.iter().map(|&s| s as i64).sum();
                avg.mean = (sum / samples.len() as i64) as i16;
                avg.count = samples.len() as u8;
            }
        }

        let total: u64 = self.ticks.iter().map(|&t| t as u64).sum();
        let rpm = if total == 0 {
            0
        } else {
            rpm_from_ticks(1) as u64 * self.ticks.len() as u64 / total
        };

        DataAverages {
            timestamp_ms: self.timestamp_ms,
            channels,
            rpm: rpm.min(u16::MAX as u64) as u16,
            rpm_ticks: self.ticks.len() as u16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelAverage {
    pub mean: i16,
    pub count: u8,
}

/// Averages of a completed record, in raw channel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataAverages {
    pub timestamp_ms: u32,
    pub channels: [ChannelAverage; Channel::COUNT],
    pub rpm: u16,
    pub rpm_ticks: u16,
}

impl DataAverages {
    pub fn channel(&self, channel: Channel) -> ChannelAverage {
        self.channels[channel as usize]
    }
}

// ── Aggregator ────────────────────────────────────────────────────────────────

/// Two records: one written by the sampling path, one published for readers.
#[derive(Debug, Clone)]
pub struct RecordAggregator {
    records: [DataRecord; 2],
    write_idx: usize,
    averages: DataAverages,
    ready: bool,
    dropped: u32,
}

impl RecordAggregator {
    pub fn new(timestamp_ms: u32) -> Self {
        Self {
            records: [DataRecord::new(timestamp_ms), DataRecord::new(0)],
            write_idx: 0,
            averages: DataAverages::default(),
            ready: false,
            dropped: 0,
        }
    }

    pub fn write_sample(&mut self, channel: Channel, value: i16) -> bool {
        let stored = self.records[self.write_idx].push(channel, value);
        if !stored {
            self.note_drop();
        }
        stored
    }

    pub fn write_tick(&mut self, interval: u16) -> bool {
        let stored = self.records[self.write_idx].push_tick(interval);
        if !stored {
            self.note_drop();
        }
        stored
    }

    fn note_drop(&mut self) {
        if self.dropped == 0 {
            debug!("record full, dropping samples until swap");
        }
        self.dropped = self.dropped.saturating_add(1);
    }

    /// Publish the write record and start the next one at `next_timestamp_ms`.
    ///
    /// The period's RPM totals replace the record-derived values, since they
    /// also count intervals the record had no room for.
    pub fn swap(&mut self, next_timestamp_ms: u32, rpm: RpmReading) -> &DataAverages {
        let mut averages = self.records[self.write_idx].compute_averages();
        averages.rpm = rpm.rpm;
        averages.rpm_ticks = rpm.ticks;
        self.averages = averages;

        if self.dropped > 0 {
            debug!("{=u32} samples dropped in record", self.dropped);
            self.dropped = 0;
        }

        self.write_idx ^= 1;
        self.records[self.write_idx].clear(next_timestamp_ms);
        self.ready = true;
        &self.averages
    }

    pub fn write_side(&self) -> &DataRecord {
        &self.records[self.write_idx]
    }

    pub fn read_side(&self) -> &DataRecord {
        &self.records[self.write_idx ^ 1]
    }

    pub const fn averages(&self) -> &DataAverages {
        &self.averages
    }

    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the ready flag and clears it.
    pub fn take_ready(&mut self) -> bool {
        core::mem::replace(&mut self.ready, false)
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

const fn channel_bytes() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < Channel::COUNT {
        total += 1 + 2 * Channel::ALL[i].capacity();
        i += 1;
    }
    total
}

/// Length of every encoded record.
pub const RECORD_BYTES: usize = 1 // version
    + 4 // timestamp
    + channel_bytes()
    + 1 + 2 * RPM_MAX_TICKS_PER_UPDATE
    + 3 * Channel::COUNT // means and counts
    + 2 + 2; // rpm, ticks

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn put(&mut self, bytes: &[u8]) {
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    fn u8(&mut self, v: u8) {
        self.put(&[v]);
    }

    fn u16(&mut self, v: u16) {
        self.put(&v.to_le_bytes());
    }

    fn i16(&mut self, v: i16) {
        self.put(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.put(&v.to_le_bytes());
    }

    fn zeros(&mut self, n: usize) {
        self.buf[self.pos..self.pos + n].fill(0);
        self.pos += n;
    }
}

/// Write the little-endian image of `record` followed by `averages`.
///
/// Every channel is written at full capacity, zero padded after its count,
/// so the image is always [`RECORD_BYTES`] long.
pub fn encode_record(
    record: &DataRecord,
    averages: &DataAverages,
    buf: &mut [u8],
) -> Result<usize, Error> {
    if buf.len() < RECORD_BYTES {
        return Err(Error::BufferTooSmall);
    }
    let mut w = Writer { buf, pos: 0 };

    w.u8(RECORD_VERSION);
    w.u32(record.timestamp_ms());

    for channel in Channel::ALL {
        let samples = record.samples(channel);
        w.u8(samples.len() as u8);
        samples.iter().for_each(|&s| w.i16(s));
        w.zeros(2 * (channel.capacity() - samples.len()));
    }

    let ticks = record.ticks();
    w.u8(ticks.len() as u8);
    ticks.iter().for_each(|&t| w.u16(t));
    w.zeros(2 * (RPM_MAX_TICKS_PER_UPDATE - ticks.len()));

    for avg in averages.channels {
        w.i16(avg.mean);
        w.u8(avg.count);
    }
    w.u16(averages.rpm);
    w.u16(averages.rpm_ticks);

    Ok(w.pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size() {
        // 5 x 100 + 2 + 4 x 10 samples, 51 intervals
        assert_eq!(RECORD_BYTES, 1 + 4 + (10 + 2 * 542) + (1 + 102) + 30 + 4);
    }

    #[test]
    fn averages_truncate() {
        let mut r = DataRecord::new(0);
        for v in [10, 11, 11] {
            r.push(Channel::Map, v);
        }
        r.push(Channel::Trq, -7);
        r.push(Channel::Trq, -8);
        let avg = r.compute_averages();
        assert_eq!(avg.channel(Channel::Map), ChannelAverage { mean: 10, count: 3 });
        // -7.5 truncates toward zero
        assert_eq!(avg.channel(Channel::Trq), ChannelAverage { mean: -7, count: 2 });
        assert_eq!(avg.channel(Channel::Egt), ChannelAverage::default());
    }

    #[test]
    fn rpm_from_stored_intervals() {
        let mut r = DataRecord::new(0);
        r.push_tick(1250);
        r.push_tick(1250);
        let avg = r.compute_averages();
        assert_eq!((avg.rpm, avg.rpm_ticks), (3000, 2));
        assert_eq!(DataRecord::new(0).compute_averages().rpm, 0);
    }

    #[test]
    fn overrun_drops_and_keeps_count_at_capacity() {
        let mut agg = RecordAggregator::new(0);
        for i in 0..(EGT_SAMPLES_PER_UPDATE + 3) {
            let stored = agg.write_sample(Channel::Egt, i as i16);
            assert_eq!(stored, i < EGT_SAMPLES_PER_UPDATE);
        }
        for _ in 0..(RPM_MAX_TICKS_PER_UPDATE + 1) {
            agg.write_tick(100);
        }
        assert_eq!(agg.write_side().samples(Channel::Egt), &[0i16, 1]);
        assert_eq!(agg.write_side().ticks().len(), RPM_MAX_TICKS_PER_UPDATE);
    }

    #[test]
    fn swap_publishes_and_isolates() {
        let mut agg = RecordAggregator::new(0);
        agg.write_sample(Channel::Usr0, 100);
        agg.write_sample(Channel::Usr0, 200);
        assert!(!agg.take_ready());

        let avg = *agg.swap(500, RpmReading { rpm: 1800, ticks: 15 });
        assert_eq!(avg.timestamp_ms, 0);
        assert_eq!(avg.channel(Channel::Usr0).mean, 150);
        assert_eq!((avg.rpm, avg.rpm_ticks), (1800, 15));

        // writes land on the fresh record only
        agg.write_sample(Channel::Usr0, 999);
        assert_eq!(agg.read_side().samples(Channel::Usr0), &[100i16, 200]);
        assert_eq!(agg.write_side().samples(Channel::Usr0), &[999i16]);
        assert_eq!(agg.write_side().timestamp_ms(), 500);

        assert!(agg.take_ready());
        assert!(!agg.take_ready());

        agg.swap(1000, RpmReading::default());
        assert_eq!(agg.read_side().samples(Channel::Usr0), &[999i16]);
        assert_eq!(agg.write_side().samples(Channel::Usr0), &[] as &[i16]);
        assert_eq!(agg.averages().timestamp_ms, 500);
    }

    #[test]
    fn encode_layout() {
        let mut r = DataRecord::new(0x0102_0304);
        r.push(Channel::Usr0, -2);
        r.push_tick(0xABCD);
        let avg = r.compute_averages();

        let mut buf = [0xFFu8; RECORD_BYTES];
        assert_eq!(encode_record(&r, &avg, &mut buf), Ok(RECORD_BYTES));
        assert_eq!(buf[0], RECORD_VERSION);
        assert_eq!(&buf[1..5], &[0x04, 0x03, 0x02, 0x01]);
        // usr0: count then samples, padded
        assert_eq!(buf[5], 1);
        assert_eq!(&buf[6..8], &(-2i16).to_le_bytes());
        assert!(buf[8..6 + 200].iter().all(|&b| b == 0));

        let ticks_at = 5 + channel_bytes();
        assert_eq!(buf[ticks_at], 1);
        assert_eq!(&buf[ticks_at + 1..ticks_at + 3], &[0xCD, 0xAB]);

        let avg_at = ticks_at + 1 + 2 * RPM_MAX_TICKS_PER_UPDATE;
        assert_eq!(&buf[avg_at..avg_at + 3], &[0xFE, 0xFF, 1]);
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let r = DataRecord::new(0);
        let mut buf = [0u8; RECORD_BYTES - 1];
        assert_eq!(
            encode_record(&r, &r.compute_averages(), &mut buf),
            Err(Error::BufferTooSmall)
        );
    }
}
