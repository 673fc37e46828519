//! # Printer Profiles
//!
//! This module defines the fixed geometry of the supported PeriPage printers.
//! Different models are different profile values, never different code paths.
//!
//! ## Supported Printers
//!
//! | Model | Width (dots) | Row bytes | ASCII columns |
//! |-------|--------------|-----------|---------------|
//! | A6    | 384          | 48        | 32            |
//! | A6+   | 576          | 72        | 48            |
//! | A40   | 1728         | 216       | 144           |
//! | A40+  | 1848         | 231       | 154           |
//!
//! ## Usage
//!
//! ```
//! use peripage::printer::{PrinterProfile, ProfileId};
//!
//! let profile = PrinterProfile::for_id(ProfileId::A6p);
//! println!("Print width: {} dots ({} bytes)",
//!          profile.raster_width_pixels,
//!          profile.row_bytes);
//! ```

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::PeripageError;

/// Enumerated identifier of a supported printer model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProfileId {
    /// PeriPage A6 (58mm paper)
    A6,
    /// PeriPage A6+ (58mm paper, 304 DPI)
    #[value(alias = "a6+")]
    A6p,
    /// PeriPage A40 (A4 paper)
    A40,
    /// PeriPage A40+
    #[value(alias = "a40+")]
    A40p,
}

impl ProfileId {
    /// All profile identifiers, in table order.
    pub const ALL: [ProfileId; 4] = [Self::A6, Self::A6p, Self::A40, Self::A40p];

    /// Short lowercase name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A6 => "a6",
            Self::A6p => "a6p",
            Self::A40 => "a40",
            Self::A40p => "a40p",
        }
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileId {
    type Err = PeripageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "a6" => Ok(Self::A6),
            "a6p" | "a6+" => Ok(Self::A6p),
            "a40" => Ok(Self::A40),
            "a40p" | "a40+" => Ok(Self::A40p),
            other => Err(PeripageError::Validation(format!(
                "Unknown printer profile '{}'. Use one of: a6, a6p, a40, a40p",
                other
            ))),
        }
    }
}

/// # Printer Profile
///
/// Immutable hardware geometry, selected when a session is created.
///
/// - **row_bytes**: bytes per raster row (`ceil(raster_width_pixels / 8)`)
/// - **raster_width_pixels**: printable dots per row
/// - **row_characters**: characters per row in the device's ASCII mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PrinterProfile {
    /// Profile identifier
    pub id: ProfileId,

    /// Printer model name
    pub name: &'static str,

    /// Bytes per raster row
    pub row_bytes: usize,

    /// ASCII characters per text row
    pub row_characters: usize,

    /// Printable width in dots
    pub raster_width_pixels: usize,
}

/// Profile table, indexed by `ProfileId` declaration order.
const PROFILES: [PrinterProfile; 4] = [
    PrinterProfile {
        id: ProfileId::A6,
        name: "PeriPage A6",
        row_bytes: 48,
        row_characters: 32,
        raster_width_pixels: 384,
    },
    PrinterProfile {
        id: ProfileId::A6p,
        name: "PeriPage A6+",
        row_bytes: 72,
        row_characters: 48,
        raster_width_pixels: 576,
    },
    PrinterProfile {
        id: ProfileId::A40,
        name: "PeriPage A40",
        row_bytes: 216,
        row_characters: 144,
        raster_width_pixels: 1728,
    },
    PrinterProfile {
        id: ProfileId::A40p,
        name: "PeriPage A40+",
        row_bytes: 231,
        row_characters: 154,
        raster_width_pixels: 1848,
    },
];

impl PrinterProfile {
    /// Look up the profile for a model.
    pub fn for_id(id: ProfileId) -> Self {
        PROFILES[id as usize]
    }

    /// List all built-in profiles.
    pub fn built_in() -> &'static [PrinterProfile] {
        &PROFILES
    }
}

impl Default for PrinterProfile {
    fn default() -> Self {
        Self::for_id(ProfileId::A6)
    }
}

impl From<ProfileId> for PrinterProfile {
    fn from(id: ProfileId) -> Self {
        Self::for_id(id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
