//! Portable status colour
//!
//! Colours cross the process boundary as `#RRGGBB` strings so the display
//! surface never depends on the producer's colour system.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three 8-bit channels, independent of any platform colour API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl StatusColor {
    /// Fallback used by consumers when a stored hex string cannot be decoded
    pub const GRAY: StatusColor = StatusColor::new(0x80, 0x80, 0x80);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Encode as `#RRGGBB` (upper-case)
    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Decode a hex string, falling back to grey on malformed input
    pub fn from_hex_or_gray(hex: &str) -> Self {
        hex.parse().unwrap_or(Self::GRAY)
    }
}

impl fmt::Display for StatusColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Error decoding a hex colour string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid hex colour: {0:?}")]
pub struct ParseColorError(pub String);

impl FromStr for StatusColor {
    type Err = ParseColorError;

    /// Accepts `#RRGGBB` or `RRGGBB`, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseColorError(s.to_string()));
        }
        let rgb = u32::from_str_radix(digits, 16).map_err(|_| ParseColorError(s.to_string()))?;
        Ok(Self::new(
            ((rgb >> 16) & 0xFF) as u8,
            ((rgb >> 8) & 0xFF) as u8,
            (rgb & 0xFF) as u8,
        ))
    }
}
