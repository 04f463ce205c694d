//! Supported conversation languages

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A language the pipeline can listen to and speak in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
    Es,
    Fr,
    De,
    Zh,
}

impl Language {
    /// Every supported language, in display order
    pub const ALL: [Self; 6] = [Self::En, Self::Hi, Self::Es, Self::Fr, Self::De, Self::Zh];

    /// ISO 639-1 code sent to recognition backends
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
            Self::Es => "es",
            Self::Fr => "fr",
            Self::De => "de",
            Self::Zh => "zh",
        }
    }

    /// Code expected by Google Translate TTS
    #[must_use]
    pub const fn tts_code(self) -> &'static str {
        match self {
            Self::Zh => "zh-CN",
            other => other.code(),
        }
    }

    /// English display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Hi => "Hindi",
            Self::Es => "Spanish",
            Self::Fr => "French",
            Self::De => "German",
            Self::Zh => "Chinese",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Accepts either the code ("hi") or the display name ("Hindi")
impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|lang| {
                lang.code().eq_ignore_ascii_case(needle) || lang.name().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| Error::Language(needle.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_code_and_name() {
        assert_eq!("hi".parse::<Language>().unwrap(), Language::Hi);
        assert_eq!("German".parse::<Language>().unwrap(), Language::De);
        assert_eq!(" ZH ".parse::<Language>().unwrap(), Language::Zh);
        assert!("pt".parse::<Language>().is_err());
    }

    #[test]
    fn test_tts_code() {
        assert_eq!(Language::Zh.tts_code(), "zh-CN");
        assert_eq!(Language::Fr.tts_code(), "fr");
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&Language::Es).unwrap();
        assert_eq!(json, "\"es\"");
        let lang: Language = serde_json::from_str("\"de\"").unwrap();
        assert_eq!(lang, Language::De);
    }
}
