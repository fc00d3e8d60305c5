//! Year-quarter tags for contract recency and forecast columns.

use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QuarterError;

/// A calendar quarter, e.g. 2025 Q1.
///
/// The canonical text form is the short lowercase tag used as the forecast
/// column suffix (`25q1`). Parsing also accepts the long form found in
/// contract data (`2025Q1`), case-insensitively and with surrounding
/// whitespace. Ordering is chronological.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearQuarter {
    year: u16,
    quarter: u8,
}

impl YearQuarter {
    /// Create a quarter from a full year and a quarter number in 1..=4.
    pub fn new(year: u16, quarter: u8) -> Result<Self, QuarterError> {
        if !(1..=4).contains(&quarter) {
            return Err(QuarterError::QuarterOutOfRange(format!("{year}Q{quarter}")));
        }
        Ok(Self { year, quarter })
    }

    /// Parse `2025Q1`, `25Q1`, `25q1` or the like into a quarter.
    ///
    /// Two-digit years are interpreted as 20xx. Anything that is not exactly
    /// a year followed by `Q` and a quarter digit is rejected.
    pub fn parse(input: &str) -> Result<Self, QuarterError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuarterError::Empty);
        }
        // contract tags occasionally arrive as "2025 Q1"
        let s: String = trimmed
            .split_whitespace()
            .collect::<String>()
            .to_uppercase();
        if !s.is_ascii() {
            return Err(QuarterError::Malformed(trimmed.to_string()));
        }
        let bytes = s.as_bytes();
        let (year_part, q_pos) = match bytes.len() {
            6 => (&s[..4], 4),
            4 => (&s[..2], 2),
            _ => return Err(QuarterError::Malformed(trimmed.to_string())),
        };
        if bytes[q_pos] != b'Q' || !bytes[q_pos + 1].is_ascii_digit() {
            return Err(QuarterError::Malformed(trimmed.to_string()));
        }
        let year: u16 = year_part
            .parse()
            .map_err(|_| QuarterError::Malformed(trimmed.to_string()))?;
        let year = if bytes.len() == 4 { 2000 + year } else { year };
        let quarter = bytes[q_pos + 1] - b'0';
        if !(1..=4).contains(&quarter) {
            return Err(QuarterError::QuarterOutOfRange(trimmed.to_string()));
        }
        Ok(Self { year, quarter })
    }

    pub fn year(&self) -> u16 {
        self.year
    }

    pub fn quarter(&self) -> u8 {
        self.quarter
    }

    /// Canonical short tag, e.g. `25q1`. Used as the forecast column suffix.
    pub fn short_tag(&self) -> String {
        format!("{:02}q{}", self.year % 100, self.quarter)
    }
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_tag())
    }
}

impl FromStr for YearQuarter {
    type Err = QuarterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for YearQuarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_tag())
    }
}

impl<'de> Deserialize<'de> for YearQuarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

/// Recency score for a stored `recent_yq` tag: `year * 10 + quarter`.
///
/// Stored tags are long-form (`2024Q3`), but the data is scraped and dirty, so
/// anything that does not start with four numeric chars and end with a digit
/// scores -1 rather than failing the whole selection.
pub fn recency_score(tag: Option<&str>) -> i64 {
    let Some(raw) = tag else { return -1 };
    let s = raw.trim();
    let head: String = s.chars().take(4).collect();
    let Ok(year) = head.parse::<i64>() else {
        return -1;
    };
    match s.chars().last().and_then(|c| c.to_digit(10)) {
        Some(q) => year * 10 + q as i64,
        None => -1,
    }
}
