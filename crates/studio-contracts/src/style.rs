use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LightingIntensity {
    Soft,
    #[default]
    Cinematic,
    Dramatic,
    Intense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColorGradingStyle {
    None,
    WarmVintage,
    CoolNoir,
    #[default]
    TealOrange,
    ClassicBw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QualityMode {
    Standard,
    #[default]
    High,
}

/// Which flow produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    Single,
    Batch,
    FaceSwap,
}

/// Style knobs that shape the final prompt. Stored with each history entry
/// so a result can be reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleSettings {
    pub skin_texture: bool,
    /// 0-100
    pub face_detail: u8,
    /// 0-100
    pub creativity_level: u8,
    #[serde(default)]
    pub lighting: LightingIntensity,
    #[serde(default)]
    pub color_grading: ColorGradingStyle,
    #[serde(default)]
    pub quality: QualityMode,
}

impl Default for StyleSettings {
    fn default() -> Self {
        Self {
            skin_texture: true,
            face_detail: 75,
            creativity_level: 30,
            lighting: LightingIntensity::default(),
            color_grading: ColorGradingStyle::default(),
            quality: QualityMode::default(),
        }
    }
}

impl LightingIntensity {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "soft" => Some(Self::Soft),
            "cinematic" => Some(Self::Cinematic),
            "dramatic" => Some(Self::Dramatic),
            "intense" => Some(Self::Intense),
            _ => None,
        }
    }
}

impl ColorGradingStyle {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Some(Self::None),
            "warm_vintage" => Some(Self::WarmVintage),
            "cool_noir" => Some(Self::CoolNoir),
            "teal_orange" => Some(Self::TealOrange),
            "classic_bw" => Some(Self::ClassicBw),
            _ => None,
        }
    }
}

impl QualityMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}
