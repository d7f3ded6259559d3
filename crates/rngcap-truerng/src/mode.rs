//! Capture mode registry
//!
//! TrueRNG firmware has no command channel. A capture mode is selected by
//! opening the port at a mode-specific baud rate right after the knock
//! sequence (see [`crate::device::change_mode`]).

use std::fmt;
use std::str::FromStr;

use rngcap_core::{DeviceModel, Error};

/// TrueRNG capture modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureMode {
    /// Streams combined + Mersenne Twister
    #[default]
    Normal,
    /// Power supply voltage in mV, ASCII
    PsDebug,
    /// RNG debug, `0x0RRR 0x0RRR` in ASCII
    RngDebug,
    /// RNG1 + Mersenne Twister
    Rng1White,
    /// RNG2 + Mersenne Twister
    Rng2White,
    /// Raw ADC samples, binary
    RawBin,
    /// Raw ADC samples, ASCII
    RawAsc,
    /// Unwhitened RNG1-RNG2
    Unwhitened,
    /// Normal output in ASCII
    NormalAsc,
    /// Normal output in ASCII, slowed down for small hosts
    NormalAscSlow,
}

/// Registry entry for one mode
#[derive(Debug, Clone, Copy)]
pub struct ModeInfo {
    /// Mode
    pub mode: CaptureMode,
    /// Short name accepted by the parser
    pub name: &'static str,
    /// Firmware symbol
    pub symbol: &'static str,
    /// Baud rate that selects the mode
    pub baud: u32,
    /// Whether the mode exists only on TrueRNGproV2
    pub v2_only: bool,
}

/// All capture modes with their baud rates
pub const MODES: &[ModeInfo] = &[
    ModeInfo {
        mode: CaptureMode::Normal,
        name: "normal",
        symbol: "MODE_NORMAL",
        baud: 300,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::PsDebug,
        name: "psdebug",
        symbol: "MODE_PSDEBUG",
        baud: 1200,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::RngDebug,
        name: "rngdebug",
        symbol: "MODE_RNGDEBUG",
        baud: 2400,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::Rng1White,
        name: "rng1white",
        symbol: "MODE_RNG1WHITE",
        baud: 4800,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::Rng2White,
        name: "rng2white",
        symbol: "MODE_RNG2WHITE",
        baud: 9600,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::RawBin,
        name: "raw_bin",
        symbol: "MODE_RAW_BIN",
        baud: 19200,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::RawAsc,
        name: "raw_asc",
        symbol: "MODE_RAW_ASC",
        baud: 38400,
        v2_only: false,
    },
    ModeInfo {
        mode: CaptureMode::Unwhitened,
        name: "unwhitened",
        symbol: "MODE_UNWHITENED",
        baud: 57600,
        v2_only: true,
    },
    ModeInfo {
        mode: CaptureMode::NormalAsc,
        name: "normal_asc",
        symbol: "MODE_NORMAL_ASC",
        baud: 115200,
        v2_only: true,
    },
    ModeInfo {
        mode: CaptureMode::NormalAscSlow,
        name: "normal_asc_slow",
        symbol: "MODE_NORMAL_ASC_SLOW",
        baud: 230400,
        v2_only: true,
    },
];

impl CaptureMode {
    /// Registry entry for this mode
    pub fn info(&self) -> &'static ModeInfo {
        let index = match self {
            CaptureMode::Normal => 0,
            CaptureMode::PsDebug => 1,
            CaptureMode::RngDebug => 2,
            CaptureMode::Rng1White => 3,
            CaptureMode::Rng2White => 4,
            CaptureMode::RawBin => 5,
            CaptureMode::RawAsc => 6,
            CaptureMode::Unwhitened => 7,
            CaptureMode::NormalAsc => 8,
            CaptureMode::NormalAscSlow => 9,
        };
        &MODES[index]
    }

    /// Baud rate that selects this mode
    pub fn baud_rate(&self) -> u32 {
        self.info().baud
    }

    /// Short name
    pub fn name(&self) -> &'static str {
        self.info().name
    }

    /// Whether `model` implements this mode
    pub fn supported_by(&self, model: DeviceModel) -> bool {
        !self.info().v2_only || model == DeviceModel::TrueRngProV2
    }

    /// Comma separated list of accepted mode names
    pub fn names() -> String {
        MODES.iter().map(|m| m.name).collect::<Vec<_>>().join(", ")
    }
}

impl FromStr for CaptureMode {
    type Err = Error;

    /// Parse a mode from its short name or firmware symbol, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        MODES
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(s) || m.symbol.eq_ignore_ascii_case(s))
            .map(|m| m.mode)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Unknown capture mode '{}'. Valid modes: {}",
                    s,
                    CaptureMode::names()
                ))
            })
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
