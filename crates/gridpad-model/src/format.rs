use core::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// An RGB color.
///
/// Serialized as a `#RRGGBB` hex string for IPC friendliness.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub rgb: u32,
}

impl Color {
    pub const fn new_rgb(rgb: u32) -> Self {
        Self { rgb: rgb & 0x00FF_FFFF }
    }

    pub const fn black() -> Self {
        Self { rgb: 0x000000 }
    }

    pub const fn white() -> Self {
        Self { rgb: 0xFFFFFF }
    }

    fn to_hex(self) -> String {
        format!("#{:06X}", self.rgb)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorParseError {
    #[error("color must be a #RRGGBB hex string (missing '#')")]
    MissingHash,
    #[error("color must be a #RRGGBB hex string (6 hex digits)")]
    BadLength,
    #[error("color must be a #RRGGBB hex string (invalid hex)")]
    BadHex,
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s
            .trim()
            .strip_prefix('#')
            .ok_or(ColorParseError::MissingHash)?;
        if hex.len() != 6 {
            return Err(ColorParseError::BadLength);
        }
        let rgb = u32::from_str_radix(hex, 16).map_err(|_| ColorParseError::BadHex)?;
        Ok(Color { rgb })
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Color {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Horizontal alignment options.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    Left,
    Center,
    Right,
}

/// Optional visual attributes attachable to one grid cell.
///
/// Every attribute is optional; an absent attribute inherits the document
/// default. A `CellFormat` with every field `None` is equivalent to no
/// stored format at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellFormat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub align: Option<HorizontalAlignment>,
    /// Font size in whole points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size_pt: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_color: Option<Color>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Color>,
}

impl CellFormat {
    pub fn is_empty(&self) -> bool {
        self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.align.is_none()
            && self.font_size_pt.is_none()
            && self.font_color.is_none()
            && self.background_color.is_none()
    }

    /// Merge `patch` into `self`.
    ///
    /// Set attributes override; absent attributes leave the existing value
    /// untouched. There is no way to clear an attribute through a merge:
    /// "off" states are expressed explicitly (e.g. `bold: Some(false)`).
    pub fn merge(&mut self, patch: &CellFormat) {
        if let Some(b) = patch.bold {
            self.bold = Some(b);
        }
        if let Some(i) = patch.italic {
            self.italic = Some(i);
        }
        if let Some(u) = patch.underline {
            self.underline = Some(u);
        }
        if let Some(a) = patch.align {
            self.align = Some(a);
        }
        if let Some(size) = patch.font_size_pt {
            self.font_size_pt = Some(size);
        }
        if let Some(color) = patch.font_color {
            self.font_color = Some(color);
        }
        if let Some(color) = patch.background_color {
            self.background_color = Some(color);
        }
    }
}
