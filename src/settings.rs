//! Persisted subset of the configuration.
//!
//! Image layout, little endian:
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 1    | version                                |
//! | 1      | 12   | servo calibration, lower/upper `u16`   |
//! | 13     | 1    | log flag bits                          |
//! | 14     | 1    | mode index                             |
//! | 15     | 3    | rpm loop gain sliders p, i, d          |
//! | 18     | 3    | vacuum loop gain sliders p, i, d       |

use crate::config::{EcuConfig, LogFlags, ServoCal, SysMode, NO_OF_SERVOS};
use crate::error::Error;
use crate::pid::PidConfig;

pub const SETTINGS_VERSION: u8 = 2;
pub const SETTINGS_BYTES: usize = 1 + 4 * NO_OF_SERVOS + 1 + 1 + 3 + 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub servo_cal: [ServoCal; NO_OF_SERVOS],
    pub log: LogFlags,
    pub mode: SysMode,
    /// UI slider positions, p, i, d. Stored as set, not recovered from the
    /// gains, since the slider-to-gain curve is not one to one.
    pub rpm_gains: [u8; 3],
    pub vacuum_gains: [u8; 3],
}


impl Settings {
    pub fn from_config(config: &EcuConfig) -> Self {
        Self {
            servo_cal: config.servo_cal,
            log: config.log,
            mode: config.mode,
            rpm_gains: config.rpm_loop.gains,
            vacuum_gains: config.vacuum_loop.gains,
        }
    }

    /// Overlay the persisted values on `config`.
    pub fn apply_to(&self, config: &mut EcuConfig) {
        config.servo_cal = self.servo_cal;
        config.log = self.log;
        config.mode = self.mode;
        config.rpm_loop.gains = self.rpm_gains;
        config.vacuum_loop.gains = self.vacuum_gains;
    }

    pub fn to_bytes(&self) -> [u8; SETTINGS_BYTES] {
        let mut out = [0u8; SETTINGS_BYTES];
        out[0] = SETTINGS_VERSION;
        for (chunk, cal) in out[1..13].chunks_exact_mut(4).zip(&self.servo_cal) {
            chunk[..2].copy_from_slice(&cal.lower_us.to_le_bytes());
            chunk[2..].copy_from_slice(&cal.upper_us.to_le_bytes());
        }
        out[13] = self.log.to_bits();
        out[14] = self.mode.index();
        out[15..18].copy_from_slice(&self.rpm_gains);
        out[18..21].copy_from_slice(&self.vacuum_gains);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let Some(&version) = bytes.first() else {
            return Err(Error::SettingsLength);
        };
        if version != SETTINGS_VERSION {
            return Err(Error::SettingsVersion(version));
        }
        if bytes.len() != SETTINGS_BYTES {
            return Err(Error::SettingsLength);
        }

        let mut servo_cal = [ServoCal::default(); NO_OF_SERVOS];
        for (cal, chunk) in servo_cal.iter_mut().zip(bytes[1..13].chunks_exact(4)) {
            cal.lower_us = u16::from_le_bytes([chunk[0], chunk[1]]);
            cal.upper_us = u16::from_le_bytes([chunk[2], chunk[3]]);
        }
        let mode = SysMode::from_index(bytes[14]).ok_or(Error::InvalidArgument)?;

        Ok(Self {
            servo_cal,
            log: LogFlags::from_bits(bytes[13]),
            mode,
            rpm_gains: [bytes[15], bytes[16], bytes[17]],
            vacuum_gains: [bytes[18], bytes[19], bytes[20]],
        })
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&EcuConfig::default())
    }
}

/// Configuration from a stored image, or the defaults when it does not load.
pub fn load_or_default(image: &[u8]) -> EcuConfig {
    let mut config = EcuConfig::default();
    match Settings::from_bytes(image) {
        Ok(settings) => settings.apply_to(&mut config),
        Err(e) => warn!("settings not loaded: {}", e),
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Settings {
        Settings {
            servo_cal: [
                ServoCal { lower_us: 1000, upper_us: 2000 },
                ServoCal { lower_us: 2100, upper_us: 900 },
                ServoCal::default(),
            ],
            log: LogFlags::from_bits(0b0011),
            mode: SysMode::PidRpmVacuum,
            rpm_gains: [80, 48, 0],
            vacuum_gains: [96, 64, 16],
        }
    }

    #[test]
    fn image_layout() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), 21);
        assert_eq!(bytes[0], SETTINGS_VERSION);
        assert_eq!(&bytes[1..5], &[0xE8, 0x03, 0xD0, 0x07]);
        assert_eq!(bytes[13], 0b0011);
        assert_eq!(bytes[14], 2);
        assert_eq!(Settings::from_bytes(&bytes), Ok(sample()));
    }

    #[test]
    fn rejects_foreign_images() {
        let mut bytes = sample().to_bytes();
        assert_eq!(Settings::from_bytes(&bytes[..20]), Err(Error::SettingsLength));
        assert_eq!(Settings::from_bytes(&[]), Err(Error::SettingsLength));
        bytes[14] = 9;
        assert_eq!(Settings::from_bytes(&bytes), Err(Error::InvalidArgument));
        bytes[0] = 1;
        assert_eq!(Settings::from_bytes(&bytes), Err(Error::SettingsVersion(1)));
    }

    #[test]
    fn defaults_survive_a_config_round_trip() {
        let defaults = Settings::default();
        assert_eq!(defaults.rpm_gains, [80, 48, 0]);
        let mut config = EcuConfig::default();
        defaults.apply_to(&mut config);
        assert_eq!(config.rpm_loop, EcuConfig::default().rpm_loop);
    }

    #[test]
    fn bad_image_falls_back() {
        let config = load_or_default(&[0xFF; SETTINGS_BYTES]);
        assert_eq!(config.mode, SysMode::Direct);

        let config = load_or_default(&sample().to_bytes());
        assert_eq!(config.mode, SysMode::PidRpmVacuum);
        assert_eq!(config.vacuum_loop.gains, [96, 64, 16]);
    }
}
