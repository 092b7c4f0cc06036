use core::fmt;

/// Errors from setup, settings and command parsing.
///
/// The sampling and control path itself never fails; it clamps, drops or
/// raises status flags instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Calibration points with `raw_low == raw_high`.
    ZeroCalibrationSpan,
    /// Output buffer cannot hold the encoded data.
    BufferTooSmall,
    /// Persisted settings carry an unknown layout version.
    SettingsVersion(u8),
    /// Persisted settings image has the wrong length.
    SettingsLength,
    UnknownCommand,
    InvalidArgument,
    /// Command line exceeded the line buffer.
    LineTooLong,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ZeroCalibrationSpan => f.write_str("calibration raw span is zero"),
            Error::BufferTooSmall => f.write_str("buffer too small"),
            Error::SettingsVersion(v) => write!(f, "unsupported settings version {}", v),
            Error::SettingsLength => f.write_str("settings image has wrong length"),
            Error::UnknownCommand => f.write_str("unknown command"),
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::LineTooLong => f.write_str("command line too long"),
        }
    }
}
