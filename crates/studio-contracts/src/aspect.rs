use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Output framing requested from the generation service.
///
/// `Auto` is a caller-side sentinel: it is resolved against the source image
/// with [`AspectRatio::resolve`] and never reaches the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Tall,
    #[serde(rename = "16:9")]
    Wide,
    #[default]
    #[serde(rename = "AUTO")]
    Auto,
}

/// Concrete ratios in resolution order; ties go to the earlier entry.
pub const CONCRETE_RATIOS: [AspectRatio; 5] = [
    AspectRatio::Square,
    AspectRatio::Portrait,
    AspectRatio::Landscape,
    AspectRatio::Tall,
    AspectRatio::Wide,
];

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Portrait => "3:4",
            Self::Landscape => "4:3",
            Self::Tall => "9:16",
            Self::Wide => "16:9",
            Self::Auto => "AUTO",
        }
    }

    /// Numeric width/height value, `None` for `Auto`.
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Square => Some(1.0),
            Self::Portrait => Some(3.0 / 4.0),
            Self::Landscape => Some(4.0 / 3.0),
            Self::Tall => Some(9.0 / 16.0),
            Self::Wide => Some(16.0 / 9.0),
            Self::Auto => None,
        }
    }

    pub fn is_auto(self) -> bool {
        self == Self::Auto
    }

    /// Nearest concrete ratio for a pixel size.
    ///
    /// A zero height has no meaningful ratio and resolves to `Square`.
    pub fn nearest(width: u32, height: u32) -> AspectRatio {
        let target = width as f64 / height as f64;
        let mut best = CONCRETE_RATIOS[0];
        let mut best_delta = f64::MAX;
        for candidate in CONCRETE_RATIOS {
            let Some(ratio) = candidate.value() else {
                continue;
            };
            let delta = (ratio - target).abs();
            if delta < best_delta {
                best = candidate;
                best_delta = delta;
            }
        }
        best
    }

    /// Returns `self` when concrete, otherwise the nearest ratio for the size.
    pub fn resolve(self, width: u32, height: u32) -> AspectRatio {
        if self.is_auto() {
            Self::nearest(width, height)
        } else {
            self
        }
    }

    /// Pixel size with `long_edge` on the longer side.
    pub fn dimensions(self, long_edge: u32) -> (u32, u32) {
        let ratio = self.value().unwrap_or(1.0);
        if ratio >= 1.0 {
            let height = (long_edge as f64 / ratio).round().max(1.0) as u32;
            (long_edge, height)
        } else {
            let width = (long_edge as f64 * ratio).round().max(1.0) as u32;
            (width, long_edge)
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "1:1" | "square" => Ok(Self::Square),
            "3:4" | "portrait" => Ok(Self::Portrait),
            "4:3" | "landscape" => Ok(Self::Landscape),
            "9:16" | "tall" => Ok(Self::Tall),
            "16:9" | "wide" => Ok(Self::Wide),
            "auto" | "" => Ok(Self::Auto),
            _ => Err(format!("unsupported aspect ratio '{raw}'")),
        }
    }
}
