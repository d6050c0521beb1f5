// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Fixed catalog of avatar generation styles

use serde::{Deserialize, Serialize};

/// Identifier for a generation style preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StyleId {
    ClassicBest,
    CyberLink,
    Heritage,
}

impl StyleId {
    /// Wire identifier for the style, matching the generation endpoint's catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            StyleId::ClassicBest => "classic-best",
            StyleId::CyberLink => "cyber-link",
            StyleId::Heritage => "heritage",
        }
    }

    /// Parse a wire identifier, falling back to the default style.
    /// Lookup must never fail; unrecognized ids map to the first catalog entry.
    pub fn parse_or_default(s: &str) -> StyleId {
        match s {
            "classic-best" => StyleId::ClassicBest,
            "cyber-link" => StyleId::CyberLink,
            "heritage" => StyleId::Heritage,
            _ => StyleId::default(),
        }
    }
}

impl Default for StyleId {
    fn default() -> Self {
        STYLE_CATALOG[0].id
    }
}

impl std::fmt::Display for StyleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in the style catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyleOption {
    pub id: StyleId,
    pub name: &'static str,
    pub icon: &'static str,
    pub before_image: &'static str,
    pub after_image: &'static str,
}

/// Ordered style catalog; the first entry is the default
pub const STYLE_CATALOG: &[StyleOption] = &[
    StyleOption {
        id: StyleId::ClassicBest,
        name: "Classic BEST",
        icon: "bus",
        before_image: "/examples/classic-before.jpg",
        after_image: "/examples/classic-after.jpeg",
    },
    StyleOption {
        id: StyleId::CyberLink,
        name: "Cyber-Link",
        icon: "waves",
        before_image: "/examples/cyber-before.jpg",
        after_image: "/examples/cyber-after.jpg",
    },
    StyleOption {
        id: StyleId::Heritage,
        name: "Heritage",
        icon: "landmark",
        before_image: "/examples/heritage-before.jpg",
        after_image: "/examples/heritage-after.jpg",
    },
];

/// Get a style option by id. Always returns a valid entry, falling back to the
/// first catalog entry for ids not present in the catalog.
pub fn style_by_id(id: StyleId) -> &'static StyleOption {
    STYLE_CATALOG
        .iter()
        .find(|s| s.id == id)
        .unwrap_or(&STYLE_CATALOG[0])
}
