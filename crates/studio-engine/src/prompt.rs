use studio_contracts::{
    AspectRatio, ColorGradingStyle, LightingIntensity, QualityMode, StyleSettings,
};

pub const DEFAULT_PROMPT: &str = "Cinematic masterpiece, Hollywood movie still, \
    35mm anamorphic lens, shallow depth of field, professional color grading, \
    dramatic chiaroscuro lighting, high dynamic range, hyper-realistic skin textures, \
    film grain, atmospheric smoke, extremely detailed, 8k resolution, \
    award-winning cinematography.";

pub const DEFAULT_SWAP_PROMPT: &str = "Replace the face of the person in the first image \
    with the face from the second image. Keep the pose, clothing, lighting and background \
    of the first image and blend skin tone and lighting naturally.";

pub const CINEMATIC_KEYWORDS: [&str; 5] =
    ["cinema", "35mm", "anamorphic", "studio lighting", "color grade"];

/// Named starting prompts selectable instead of free text.
pub const PRESETS: [(&str, &str); 1] = [(
    "cinema_standard",
    "Cinema style, blockbuster movie aesthetic, high-end cinematography, dramatic lighting",
)];

pub fn preset_prompt(id: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset_id, _)| *preset_id == id.trim())
        .map(|(_, prompt)| *prompt)
}

pub fn lighting_phrase(lighting: LightingIntensity) -> &'static str {
    match lighting {
        LightingIntensity::Soft => "soft wrap-around studio lighting, ethereal glow",
        LightingIntensity::Cinematic => {
            "classic three-point Hollywood lighting, rim light, volumetric lighting"
        }
        LightingIntensity::Dramatic => {
            "high-contrast noir lighting, deep shadows, moody atmosphere"
        }
        LightingIntensity::Intense => {
            "vibrant backlight, sharp highlights, high-energy studio lights"
        }
    }
}

pub fn grading_phrase(grading: ColorGradingStyle) -> &'static str {
    match grading {
        ColorGradingStyle::None => "",
        ColorGradingStyle::WarmVintage => "warm vintage movie grading, sepia highlights",
        ColorGradingStyle::CoolNoir => "cool blue cinematic grading, high contrast, moody noir",
        ColorGradingStyle::TealOrange => "teal and orange blockbuster color grade, cinematic look",
        ColorGradingStyle::ClassicBw => "high-end black and white cinematography, rich film grain",
    }
}

pub fn quality_modifier(quality: QualityMode) -> &'static str {
    match quality {
        QualityMode::Standard => "",
        QualityMode::High => ", ultra-sharp focus, masterpiece quality, photorealistic",
    }
}

/// Everything a generation call needs besides the images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSpec {
    pub text: String,
    pub aspect_ratio: AspectRatio,
    pub style: Option<StyleSettings>,
}

impl PromptSpec {
    pub fn new(text: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            text: text.into(),
            aspect_ratio,
            style: None,
        }
    }

    pub fn with_style(mut self, style: StyleSettings) -> Self {
        self.style = Some(style);
        self
    }
}

/// Source of the prompt for a run. Evaluated once when a batch starts.
pub trait PromptFactory {
    fn prompt_spec(&self) -> PromptSpec;
}

impl PromptFactory for PromptSpec {
    fn prompt_spec(&self) -> PromptSpec {
        self.clone()
    }
}

/// Portrait restyle prompt composed from free text or a preset plus style knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortraitPrompt {
    pub custom_prompt: Option<String>,
    pub preset_id: Option<String>,
    pub style: StyleSettings,
    pub aspect_ratio: AspectRatio,
}

impl PortraitPrompt {
    pub fn compose(&self) -> String {
        let custom = self
            .custom_prompt
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        let base = match custom {
            Some(text) => text,
            None => self
                .preset_id
                .as_deref()
                .and_then(preset_prompt)
                .unwrap_or(DEFAULT_PROMPT),
        };

        let style = &self.style;
        let mut prompt = base.to_string();
        if style.skin_texture {
            prompt.push_str(", ultra-realistic skin texture, 8k movie resolution");
        }
        if style.face_detail > 60 {
            prompt.push_str(", high-fidelity cinematic facial details");
        }
        if style.creativity_level < 30 {
            prompt.push_str(", professional cinema retouch");
        } else if style.creativity_level > 70 {
            prompt.push_str(", intense cinematic transformation");
        }
        prompt.push_str(", ");
        prompt.push_str(lighting_phrase(style.lighting));
        if style.color_grading != ColorGradingStyle::None {
            prompt.push_str(", ");
            prompt.push_str(grading_phrase(style.color_grading));
        }
        prompt.push_str(quality_modifier(style.quality));
        prompt
    }
}

impl PromptFactory for PortraitPrompt {
    fn prompt_spec(&self) -> PromptSpec {
        PromptSpec::new(self.compose(), self.aspect_ratio).with_style(self.style)
    }
}

pub fn face_swap_prompt(custom: Option<&str>, quality: QualityMode) -> String {
    let base = custom
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(DEFAULT_SWAP_PROMPT);
    format!("{base}{}", quality_modifier(quality))
}

/// Keywords completing the last space-separated word of `text`.
pub fn suggest_keywords(text: &str) -> Vec<&'static str> {
    let last_word = text.rsplit(' ').next().unwrap_or_default().to_lowercase();
    if last_word.chars().count() <= 1 {
        return Vec::new();
    }
    CINEMATIC_KEYWORDS
        .iter()
        .copied()
        .filter(|keyword| keyword.to_lowercase().starts_with(&last_word))
        .collect()
}

/// Replaces the last word of `text` with `keyword` and leaves the cursor
/// after a trailing `", "`.
pub fn accept_suggestion(text: &str, keyword: &str) -> String {
    let mut words: Vec<&str> = text.split(' ').collect();
    words.pop();
    let head = words.join(" ");
    if words.is_empty() {
        format!("{keyword}, ")
    } else {
        format!("{head} {keyword}, ")
    }
}

#[cfg(test)]
mod tests {
    use studio_contracts::{
        AspectRatio, ColorGradingStyle, LightingIntensity, QualityMode, StyleSettings,
    };

    use super::{
        accept_suggestion, face_swap_prompt, suggest_keywords, PortraitPrompt, PromptFactory,
        DEFAULT_PROMPT, DEFAULT_SWAP_PROMPT,
    };

    #[test]
    fn default_style_composes_every_modifier() {
        let prompt = PortraitPrompt::default().compose();
        assert!(prompt.starts_with(DEFAULT_PROMPT));
        assert!(prompt.contains(", ultra-realistic skin texture, 8k movie resolution"));
        assert!(prompt.contains(", high-fidelity cinematic facial details"));
        assert!(!prompt.contains("professional cinema retouch"));
        assert!(!prompt.contains("intense cinematic transformation"));
        assert!(prompt.contains("rim light, volumetric lighting"));
        assert!(prompt.contains(", teal and orange blockbuster color grade"));
        assert!(prompt.ends_with(", ultra-sharp focus, masterpiece quality, photorealistic"));
    }

    #[test]
    fn minimal_style_appends_only_lighting() {
        let portrait = PortraitPrompt {
            custom_prompt: Some("  moody portrait ".to_string()),
            preset_id: Some("cinema_standard".to_string()),
            style: StyleSettings {
                skin_texture: false,
                face_detail: 60,
                creativity_level: 50,
                lighting: LightingIntensity::Soft,
                color_grading: ColorGradingStyle::None,
                quality: QualityMode::Standard,
            },
            aspect_ratio: AspectRatio::Auto,
        };
        assert_eq!(
            portrait.compose(),
            "moody portrait, soft wrap-around studio lighting, ethereal glow"
        );
    }

    #[test]
    fn preset_applies_only_without_custom_text() {
        let portrait = PortraitPrompt {
            preset_id: Some("cinema_standard".to_string()),
            style: StyleSettings {
                creativity_level: 90,
                ..StyleSettings::default()
            },
            ..PortraitPrompt::default()
        };
        let prompt = portrait.compose();
        assert!(prompt.starts_with("Cinema style, blockbuster movie aesthetic"));
        assert!(prompt.contains(", intense cinematic transformation"));

        let unknown = PortraitPrompt {
            preset_id: Some("missing".to_string()),
            ..PortraitPrompt::default()
        };
        assert!(unknown.compose().starts_with(DEFAULT_PROMPT));
    }

    #[test]
    fn low_creativity_adds_retouch() {
        let portrait = PortraitPrompt {
            style: StyleSettings {
                creativity_level: 10,
                ..StyleSettings::default()
            },
            ..PortraitPrompt::default()
        };
        assert!(portrait.compose().contains(", professional cinema retouch"));
    }

    #[test]
    fn prompt_spec_carries_ratio_and_style() {
        let portrait = PortraitPrompt {
            aspect_ratio: AspectRatio::Wide,
            ..PortraitPrompt::default()
        };
        let spec = portrait.prompt_spec();
        assert_eq!(spec.aspect_ratio, AspectRatio::Wide);
        assert_eq!(spec.style, Some(StyleSettings::default()));
        assert_eq!(spec.text, portrait.compose());
    }

    #[test]
    fn face_swap_prompt_falls_back_to_default() {
        assert_eq!(face_swap_prompt(Some("swap"), QualityMode::Standard), "swap");
        let prompt = face_swap_prompt(Some("   "), QualityMode::High);
        assert!(prompt.starts_with(DEFAULT_SWAP_PROMPT));
        assert!(prompt.ends_with("photorealistic"));
    }

    #[test]
    fn keyword_suggestions_match_last_word_prefix() {
        assert_eq!(suggest_keywords("a moody CIN"), vec!["cinema"]);
        assert_eq!(suggest_keywords("shot on 35"), vec!["35mm"]);
        assert!(suggest_keywords("portrait s").is_empty());
        assert!(suggest_keywords("portrait ").is_empty());
        assert!(suggest_keywords("xyz").is_empty());
    }

    #[test]
    fn accepting_a_suggestion_replaces_the_last_word() {
        assert_eq!(accept_suggestion("a moody cin", "cinema"), "a moody cinema, ");
        assert_eq!(accept_suggestion("ana", "anamorphic"), "anamorphic, ");
    }
}
