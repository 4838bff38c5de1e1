//! Converter configuration
//!
//! A station definition comes from the command line as
//! `ADDR[:DICT[:POLL[:CODEPAGE[:ADVANCED]]]]`. The poll field takes the
//! shorthands `0` (continuous), `1` (slow), `2` (very slow) or an explicit
//! microsecond count such as `650us`.

use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use twinax_charmap::Codepage;
use twinax_keyboard::Dictionary;
use twinax_station::PollCadence;

pub const DEFAULT_DICTIONARY: &str = "us";
pub const DEFAULT_CODEPAGE: &str = "cp037";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("station address {0:?} is not a number in 0..=6")]
    BadAddress(String),

    #[error("station address {0} configured twice")]
    DuplicateAddress(u8),

    #[error(
        "{0:?} is not a valid poll value: use 0, 1, 2 or a microsecond \
         count with a \"us\" suffix (e.g. \"650us\")"
    )]
    BadPollValue(String),

    #[error(transparent)]
    Dictionary(#[from] twinax_keyboard::KeyboardError),

    #[error(transparent)]
    Codepage(#[from] twinax_charmap::CharmapError),
}

/// One terminal definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub address: u8,
    pub dictionary: String,
    pub cadence: PollCadence,
    pub codepage: String,
    pub advanced_indicators: bool,
}

impl StationConfig {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            dictionary: DEFAULT_DICTIONARY.to_string(),
            cadence: PollCadence::NORMAL,
            codepage: DEFAULT_CODEPAGE.to_string(),
            advanced_indicators: false,
        }
    }
}

impl FromStr for StationConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(':');

        let addr_field = fields.next().unwrap_or_default();
        let address: u8 = addr_field
            .parse()
            .ok()
            .filter(|a| *a <= 6)
            .ok_or_else(|| ConfigError::BadAddress(addr_field.to_string()))?;
        let mut config = StationConfig::new(address);

        if let Some(dict) = fields.next().filter(|f| !f.is_empty()) {
            // fail now rather than at attach time
            Dictionary::by_name(dict)?;
            config.dictionary = dict.to_string();
        }
        if let Some(poll) = fields.next().filter(|f| !f.is_empty()) {
            config.cadence = parse_poll(poll)?;
        }
        if let Some(codepage) = fields.next().filter(|f| !f.is_empty()) {
            Codepage::by_name(codepage)?;
            config.codepage = codepage.to_string();
        }
        if let Some(advanced) = fields.next().filter(|f| !f.is_empty()) {
            config.advanced_indicators = advanced != "0";
        }

        Ok(config)
    }
}

fn parse_poll(value: &str) -> Result<PollCadence, ConfigError> {
    match value {
        "0" => Ok(PollCadence::NORMAL),
        "1" => Ok(PollCadence::SLOW),
        "2" => Ok(PollCadence::VERY_SLOW),
        _ => value
            .strip_suffix("us")
            .and_then(|n| n.parse::<u64>().ok())
            .map(PollCadence::from_micros)
            .ok_or_else(|| ConfigError::BadPollValue(value.to_string())),
    }
}

/// Everything the scheduler needs, assembled by the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub serial_device: PathBuf,
    pub stations: Vec<StationConfig>,
    pub clicker_silent: bool,
    /// Program run on each session's PTY.
    pub shell: PathBuf,
    /// Value for `TERM` in the child environment.
    pub term_name: String,
    /// Optional `TERMINFO` directory carrying the converter's terminfo.
    pub terminfo_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_device: PathBuf::from("/dev/ttyACM0"),
            stations: vec![StationConfig::new(0)],
            clicker_silent: false,
            shell: PathBuf::from("/bin/sh"),
            term_name: "vt52".to_string(),
            terminfo_dir: None,
        }
    }
}

impl Config {
    /// Reject duplicate station addresses.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = [false; 7];
        for station in &self.stations {
            let slot = &mut seen[station.address as usize];
            if *slot {
                return Err(ConfigError::DuplicateAddress(station.address));
            }
            *slot = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let cfg: StationConfig = "3".parse().unwrap();
        assert_eq!(cfg.address, 3);
        assert_eq!(cfg.dictionary, "us");
        assert_eq!(cfg.cadence, PollCadence::NORMAL);
        assert_eq!(cfg.codepage, "cp037");
    }

    #[test]
    fn test_full_definition() {
        let cfg: StationConfig = "2:es:1:cp500:1".parse().unwrap();
        assert_eq!(cfg.address, 2);
        assert_eq!(cfg.dictionary, "es");
        assert_eq!(cfg.cadence, PollCadence::SLOW);
        assert_eq!(cfg.codepage, "cp500");
        assert!(cfg.advanced_indicators);
    }

    #[test]
    fn test_empty_fields_keep_defaults() {
        let cfg: StationConfig = "0::650us".parse().unwrap();
        assert_eq!(cfg.dictionary, "us");
        assert_eq!(cfg.cadence, PollCadence::from_micros(650));
    }

    #[test]
    fn test_bad_inputs() {
        assert!(matches!(
            "7".parse::<StationConfig>(),
            Err(ConfigError::BadAddress(_))
        ));
        assert!(matches!(
            "x".parse::<StationConfig>(),
            Err(ConfigError::BadAddress(_))
        ));
        assert!(matches!(
            "0:us:soon".parse::<StationConfig>(),
            Err(ConfigError::BadPollValue(_))
        ));
        assert!(matches!(
            "0:qwerty".parse::<StationConfig>(),
            Err(ConfigError::Dictionary(_))
        ));
        assert!(matches!(
            "0:us:0:cp1337".parse::<StationConfig>(),
            Err(ConfigError::Codepage(_))
        ));
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let config = Config {
            stations: vec![StationConfig::new(1), StationConfig::new(1)],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateAddress(1))
        ));
    }
}
