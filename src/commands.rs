//! Single-letter serial commands.
//!
//! ```text
//! M <mode>               0 direct, 1 rpm, 2 rpm+vacuum (or by name)
//! T <loop> <value>       loop setpoint; loop is `rpm` or `vac`
//! G <loop> <axis> <ui>   gain slider 0..=255 for axis `p`, `i` or `d`
//! C                      clear the feedback-lost flag
//! L <flags>              logging flags as a bit mask
//! S                      save settings
//! A                      print state
//! H                      help
//! ```

use heapless::Vec;

use crate::config::{LogFlags, SysMode};
use crate::error::Error;
use crate::pid::{LoopId, PidAxis};

pub const HELP: &[&str] = &[
    "M <0|1|2>          mode: direct, rpm, rpm+vacuum",
    "T <rpm|vac> <n>    loop target",
    "G <rpm|vac> <p|i|d> <0-255>  gain",
    "C                  clear feedback lost",
    "L <bits>           log: 1 serial, 2 hex, 4 sd, 8 sd hex",
    "S                  save settings",
    "A                  print state",
    "H                  help",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    SetMode(SysMode),
    SetTarget(LoopId, i32),
    SetGain(LoopId, PidAxis, u8),
    ClearFeedbackLost,
    SetLogFlags(LogFlags),
    Save,
    Status,
    Help,
}

/// What the caller should print after a command ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    Ack,
    /// Persist [`crate::settings::Settings`] from the current state.
    Save,
    Status,
    Help,
}

fn parse_loop(token: &str) -> Result<LoopId, Error> {
    match token {
        "rpm" | "r" | "0" => Ok(LoopId::Rpm),
        "vac" | "v" | "1" => Ok(LoopId::Vacuum),
        _ => Err(Error::InvalidArgument),
    }
}

fn parse_axis(token: &str) -> Result<PidAxis, Error> {
    match token {
        "p" | "P" => Ok(PidAxis::P),
        "i" | "I" => Ok(PidAxis::I),
        "d" | "D" => Ok(PidAxis::D),
        _ => Err(Error::InvalidArgument),
    }
}

fn parse_mode(token: &str) -> Result<SysMode, Error> {
    match token {
        "direct" => Ok(SysMode::Direct),
        "rpm" => Ok(SysMode::PidRpm),
        "vac" => Ok(SysMode::PidRpmVacuum),
        _ => token
            .parse::<u8>()
            .ok()
            .and_then(SysMode::from_index)
            .ok_or(Error::InvalidArgument),
    }
}

fn parse_num<T: core::str::FromStr>(token: Option<&str>) -> Result<T, Error> {
    token
        .ok_or(Error::InvalidArgument)?
        .parse()
        .map_err(|_| Error::InvalidArgument)
}

impl Command {
    pub fn parse(line: &str) -> Result<Command, Error> {
        let mut tokens = line.split_ascii_whitespace();
        let Some(head) = tokens.next() else {
            return Err(Error::UnknownCommand);
        };
        let mut letter = head.chars();
        let (Some(op), None) = (letter.next(), letter.next()) else {
            return Err(Error::UnknownCommand);
        };

        let command = match op.to_ascii_uppercase() {
            'M' => Command::SetMode(parse_mode(tokens.next().ok_or(Error::InvalidArgument)?)?),
            'T' => {
                let id = parse_loop(tokens.next().ok_or(Error::InvalidArgument)?)?;
                Command::SetTarget(id, parse_num(tokens.next())?)
            }
            'G' => {
                let id = parse_loop(tokens.next().ok_or(Error::InvalidArgument)?)?;
                let axis = parse_axis(tokens.next().ok_or(Error::InvalidArgument)?)?;
                Command::SetGain(id, axis, parse_num(tokens.next())?)
            }
            'C' => Command::ClearFeedbackLost,
            'L' => Command::SetLogFlags(LogFlags::from_bits(parse_num(tokens.next())?)),
            'S' => Command::Save,
            'A' => Command::Status,
            'H' | '?' => Command::Help,
            _ => return Err(Error::UnknownCommand),
        };

        if tokens.next().is_some() {
            return Err(Error::InvalidArgument);
        }
        Ok(command)
    }
}

/// Assembles input bytes into lines.
///
/// A line ends at `\r` or `\n`; empty lines are skipped. A line longer than
/// `N` is reported once as [`Error::LineTooLong`] when it ends.
pub struct LineBuffer<const N: usize> {
    buf: Vec<u8, N>,
    overflow: bool,
    complete: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflow: false,
            complete: false,
        }
    }

    /// Feed one byte; yields the finished line when `byte` ends one.
    pub fn push(&mut self, byte: u8) -> Option<Result<&str, Error>> {
        if self.complete {
            self.buf.clear();
            self.complete = false;
        }

        match byte {
            b'\r' | b'\n' => {
                if self.overflow {
                    self.overflow = false;
                    self.buf.clear();
                    return Some(Err(Error::LineTooLong));
                }
                if self.buf.is_empty() {
                    return None;
                }
                self.complete = true;
                Some(core::str::from_utf8(&self.buf).map_err(|_| Error::InvalidArgument))
            }
            _ => {
                if !self.overflow && self.buf.push(byte).is_err() {
                    self.overflow = true;
                }
                None
            }
        }
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<const N: usize>(lb: &mut LineBuffer<N>, bytes: &[u8]) -> std::vec::Vec<Result<std::string::String, Error>> {
        let mut out = std::vec::Vec::new();
        for &b in bytes {
            if let Some(line) = lb.push(b) {
                out.push(line.map(|s| s.into()));
            }
        }
        out
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(Command::parse("M 1"), Ok(Command::SetMode(SysMode::PidRpm)));
        assert_eq!(Command::parse("m vac"), Ok(Command::SetMode(SysMode::PidRpmVacuum)));
        assert_eq!(Command::parse("T rpm 2500"), Ok(Command::SetTarget(LoopId::Rpm, 2500)));
        assert_eq!(Command::parse("T vac -3"), Ok(Command::SetTarget(LoopId::Vacuum, -3)));
        assert_eq!(
            Command::parse("G vac d 96"),
            Ok(Command::SetGain(LoopId::Vacuum, PidAxis::D, 96))
        );
        assert_eq!(Command::parse("C"), Ok(Command::ClearFeedbackLost));
        assert_eq!(
            Command::parse("L 3"),
            Ok(Command::SetLogFlags(LogFlags::from_bits(3)))
        );
        assert_eq!(Command::parse("s"), Ok(Command::Save));
        assert_eq!(Command::parse("  A  "), Ok(Command::Status));
        assert_eq!(Command::parse("h"), Ok(Command::Help));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Command::parse(""), Err(Error::UnknownCommand));
        assert_eq!(Command::parse("X"), Err(Error::UnknownCommand));
        assert_eq!(Command::parse("MM 1"), Err(Error::UnknownCommand));
        assert_eq!(Command::parse("M 7"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("T oil 10"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("G rpm p 256"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("G rpm q 10"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("T rpm"), Err(Error::InvalidArgument));
        assert_eq!(Command::parse("C now"), Err(Error::InvalidArgument));
    }

    #[test]
    fn line_buffer_splits_lines() {
        let mut lb = LineBuffer::<16>::new();
        let lines = feed(&mut lb, b"M 1\r\n\nT rpm 2000\n");
        assert_eq!(lines, [Ok(String::from("M 1")), Ok(String::from("T rpm 2000"))]);
    }

    #[test]
    fn line_buffer_reports_overflow_once() {
        let mut lb = LineBuffer::<4>::new();
        let lines = feed(&mut lb, b"G rpm p 10\nA\n");
        assert_eq!(lines, [Err(Error::LineTooLong), Ok(String::from("A"))]);
    }
}
