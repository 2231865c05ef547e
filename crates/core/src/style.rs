//! Style catalogue: the closed set of stylization presets and their
//! prompt and sampler parameters.
//!
//! The table is static and read-only. Lookups by identifier come in two
//! flavours: [`Style::parse`] is strict and returns `None` for unknown
//! identifiers, while [`Style::resolve`] falls back to
//! [`DEFAULT_STYLE`] so that an unrecognised request still produces a
//! usable job.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Style used when a request names an identifier outside the catalogue.
pub const DEFAULT_STYLE: Style = Style::Cartoon;

/// Suffix appended to every positive prompt so the sampler keeps the
/// subject recognisable as a portrait.
pub const PORTRAIT_SUFFIX: &str = "portrait, person, character design, high quality";

/// A stylization preset offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Style {
    Pixel,
    Cartoon,
    Cute,
    Anime,
    Watercolor,
    Sketch,
    PopArt,
    Minimalist,
}

/// Prompt and sampler parameters for one style.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StyleConfig {
    pub positive_prompt: &'static str,
    pub negative_prompt: &'static str,
    /// Denoise strength for image-to-image, in `(0, 1]`.
    pub strength: f32,
    /// Classifier-free guidance scale (`cfg`), always positive.
    pub guidance_scale: f32,
    /// Sampler step count.
    pub steps: u32,
}

/// Display metadata shown on the style picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StyleOption {
    pub id: Style,
    pub name: &'static str,
    pub description: &'static str,
    pub is_premium: bool,
}

const PIXEL: StyleConfig = StyleConfig {
    positive_prompt:
        "pixel art, 8-bit, retro game style, pixelated, sharp pixels, digital art, vibrant colors",
    negative_prompt: "blurry, smooth, gradient, photorealistic, 3d render",
    strength: 0.75,
    guidance_scale: 7.0,
    steps: 25,
};

const CARTOON: StyleConfig = StyleConfig {
    positive_prompt: "cartoon style, animated, cel shading, vibrant colors, clean lines, stylized, disney pixar style",
    negative_prompt: "realistic, photograph, blurry, dark, gritty",
    strength: 0.7,
    guidance_scale: 8.0,
    steps: 30,
};

const CUTE: StyleConfig = StyleConfig {
    positive_prompt:
        "kawaii, chibi style, adorable, cute, pastel colors, soft, anime style, big eyes, sweet",
    negative_prompt: "scary, dark, realistic, gritty, harsh",
    strength: 0.65,
    guidance_scale: 7.5,
    steps: 28,
};

const ANIME: StyleConfig = StyleConfig {
    positive_prompt:
        "anime style, manga illustration, cel shaded, expressive eyes, clean lineart, vibrant colors",
    negative_prompt: "photorealistic, 3d render, blurry, deformed",
    strength: 0.7,
    guidance_scale: 7.5,
    steps: 28,
};

const WATERCOLOR: StyleConfig = StyleConfig {
    positive_prompt: "watercolor painting, soft washes, paper texture, flowing pigments, delicate brushwork",
    negative_prompt: "photograph, sharp digital edges, 3d render, harsh contrast",
    strength: 0.7,
    guidance_scale: 7.0,
    steps: 28,
};

const SKETCH: StyleConfig = StyleConfig {
    positive_prompt:
        "pencil sketch, hand drawn, line art, graphite, artistic sketch, black and white drawing",
    negative_prompt: "colorful, photorealistic, digital, blurry",
    strength: 0.8,
    guidance_scale: 6.0,
    steps: 20,
};

const POP_ART: StyleConfig = StyleConfig {
    positive_prompt:
        "pop art, andy warhol style, bold flat colors, halftone dots, thick outlines, comic print",
    negative_prompt: "photorealistic, muted colors, blurry, soft shading",
    strength: 0.75,
    guidance_scale: 8.0,
    steps: 25,
};

const MINIMALIST: StyleConfig = StyleConfig {
    positive_prompt:
        "minimalist illustration, clean geometric shapes, flat colors, simple lines, negative space",
    negative_prompt: "cluttered, detailed texture, photorealistic, noisy",
    strength: 0.7,
    guidance_scale: 6.5,
    steps: 22,
};

impl Style {
    /// Every style, in picker order.
    pub const ALL: [Style; 8] = [
        Style::Pixel,
        Style::Cartoon,
        Style::Cute,
        Style::Anime,
        Style::Watercolor,
        Style::Sketch,
        Style::PopArt,
        Style::Minimalist,
    ];

    /// Stable identifier used on the wire and in requests.
    pub fn id(self) -> &'static str {
        match self {
            Style::Pixel => "pixel",
            Style::Cartoon => "cartoon",
            Style::Cute => "cute",
            Style::Anime => "anime",
            Style::Watercolor => "watercolor",
            Style::Sketch => "sketch",
            Style::PopArt => "pop-art",
            Style::Minimalist => "minimalist",
        }
    }

    /// Look up a style by identifier. Case-insensitive, surrounding
    /// whitespace ignored.
    pub fn parse(id: &str) -> Option<Style> {
        let id = id.trim();
        Style::ALL
            .into_iter()
            .find(|style| style.id().eq_ignore_ascii_case(id))
    }

    /// Like [`parse`](Self::parse) but never fails: unknown identifiers
    /// resolve to [`DEFAULT_STYLE`].
    pub fn resolve(id: &str) -> Style {
        Style::parse(id).unwrap_or(DEFAULT_STYLE)
    }

    /// Prompt and sampler parameters for this style.
    pub fn config(self) -> &'static StyleConfig {
        match self {
            Style::Pixel => &PIXEL,
            Style::Cartoon => &CARTOON,
            Style::Cute => &CUTE,
            Style::Anime => &ANIME,
            Style::Watercolor => &WATERCOLOR,
            Style::Sketch => &SKETCH,
            Style::PopArt => &POP_ART,
            Style::Minimalist => &MINIMALIST,
        }
    }

    /// Picker metadata for this style.
    pub fn option(self) -> StyleOption {
        let (name, description, is_premium) = match self {
            Style::Pixel => ("Pixel Art", "8-bit/16-bit retro gaming style", false),
            Style::Cartoon => ("Cartoon", "Classic animated cartoon style", false),
            Style::Cute => ("Cute/Kawaii", "Adorable, chibi-style characters", false),
            Style::Anime => ("Anime", "Japanese anime/manga style", true),
            Style::Watercolor => ("Watercolor", "Artistic watercolor painting style", true),
            Style::Sketch => ("Sketch", "Hand-drawn sketch style", false),
            Style::PopArt => ("Pop Art", "Andy Warhol-inspired style", true),
            Style::Minimalist => ("Minimalist", "Clean, simple geometric style", false),
        };
        StyleOption {
            id: self,
            name,
            description,
            is_premium,
        }
    }

    pub fn is_premium(self) -> bool {
        self.option().is_premium
    }

    /// Full positive prompt sent to the text encoder.
    pub fn positive_prompt(self) -> String {
        format!("{}, {PORTRAIT_SUFFIX}", self.config().positive_prompt)
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for Style {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::parse(s).ok_or_else(|| {
            let valid: Vec<&str> = Style::ALL.iter().map(|s| s.id()).collect();
            CoreError::Validation(format!(
                "Invalid style '{s}'. Must be one of: {}",
                valid.join(", ")
            ))
        })
    }
}

/// Styles available without a subscription.
pub fn free_styles() -> Vec<StyleOption> {
    Style::ALL
        .into_iter()
        .filter(|s| !s.is_premium())
        .map(Style::option)
        .collect()
}

/// Styles that require a premium subscription.
pub fn premium_styles() -> Vec<StyleOption> {
    Style::ALL
        .into_iter()
        .filter(|s| s.is_premium())
        .map(Style::option)
        .collect()
}
