//! Target display languages for incoming captions.
//!
//! Captions travel between peers as English text; each side translates what
//! it receives into its own selected language. The service codes here are
//! the `langpair` targets understood by the translation endpoint.

use clap::ValueEnum;

/// Languages the caption translator can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TargetLang {
    Spanish,
    French,
    German,
    Japanese,
    Portuguese,
    Italian,
    Urdu,
}

impl TargetLang {
    pub const ALL: [TargetLang; 7] = [
        TargetLang::Spanish,
        TargetLang::French,
        TargetLang::German,
        TargetLang::Japanese,
        TargetLang::Portuguese,
        TargetLang::Italian,
        TargetLang::Urdu,
    ];

    /// Code sent to the translation service as the `langpair` target.
    pub fn service_code(self) -> &'static str {
        match self {
            TargetLang::Spanish => "es",
            TargetLang::French => "fr",
            TargetLang::German => "de",
            TargetLang::Japanese => "ja",
            TargetLang::Portuguese => "pt",
            TargetLang::Italian => "it",
            TargetLang::Urdu => "ur",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TargetLang::Spanish => "Spanish",
            TargetLang::French => "French",
            TargetLang::German => "German",
            TargetLang::Japanese => "Japanese",
            TargetLang::Portuguese => "Portuguese",
            TargetLang::Italian => "Italian",
            TargetLang::Urdu => "Urdu",
        }
    }

    /// Next language in selector order, wrapping at the end.
    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|lang| *lang == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}
