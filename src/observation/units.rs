//! MDC unit codes.

use core::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UnitCode {
    Bpm,
    Percent,
    Celsius,
    MmHg,
    Dimensionless,
    MilliGram,
    InternationalUnit,
    #[default]
    Unknown,
}

impl UnitCode {
    const KNOWN: [Self; 7] = [
        Self::Bpm,
        Self::Percent,
        Self::Celsius,
        Self::MmHg,
        Self::Dimensionless,
        Self::MilliGram,
        Self::InternationalUnit,
    ];

    pub const fn code(self) -> u32 {
        match self {
            Self::Bpm => 0x0004_0AA0,
            Self::Percent => 0x0004_0220,
            Self::Celsius => 0x0004_17A0,
            Self::MmHg => 0x0004_0F20,
            Self::Dimensionless => 0x0004_0200,
            Self::MilliGram => 0x0004_06D2,
            Self::InternationalUnit => 0x0004_1560,
            Self::Unknown => 0x0FFF_FFFF,
        }
    }

    pub fn from_code(code: u32) -> Self {
        Self::KNOWN
            .into_iter()
            .find(|u| u.code() == code)
            .unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for UnitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Self::Bpm => "bpm",
            Self::Percent => "%",
            Self::Celsius => "\u{00b0}C",
            Self::MmHg => "mmHg",
            Self::Dimensionless => "",
            Self::MilliGram => "mg",
            Self::InternationalUnit => "IU",
            Self::Unknown => "?",
        };
        f.write_str(symbol)
    }
}
