//! Supported UI languages and provider code vocabularies.
//! The set is closed: anything outside it is a configuration error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TranslateError;

/// Languages the UI can be rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Language {
    En,
    Es,
    Fr,
    De,
    Zh,
    Ja,
    Ko,
    Ar,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::En,
        Language::Es,
        Language::Fr,
        Language::De,
        Language::Zh,
        Language::Ja,
        Language::Ko,
        Language::Ar,
    ];

    /// Internal code, also used on the wire and in cache keys.
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Es => "ES",
            Language::Fr => "FR",
            Language::De => "DE",
            Language::Zh => "ZH",
            Language::Ja => "JA",
            Language::Ko => "KO",
            Language::Ar => "AR",
        }
    }

    /// English display name for language pickers.
    pub fn name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish",
            Language::Fr => "French",
            Language::De => "German",
            Language::Zh => "Chinese",
            Language::Ja => "Japanese",
            Language::Ko => "Korean",
            Language::Ar => "Arabic",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| TranslateError::UnsupportedLanguage(trimmed.to_string()))
    }
}

/// DeepL source/target codes.
pub fn deepl_code(lang: Language) -> Option<&'static str> {
    use Language::*;
    let code = match lang {
        En => "EN",
        Es => "ES",
        Fr => "FR",
        De => "DE",
        Zh => "ZH",
        Ja => "JA",
        Ko => "KO",
        Ar => "AR",
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_case_insensitively() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Es);
        assert_eq!(" ZH ".parse::<Language>().unwrap(), Language::Zh);
    }

    #[test]
    fn rejects_unknown_codes() {
        let err = "PT".parse::<Language>().unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedLanguage(ref c) if c == "PT"));
        assert!(!err.is_transient());
    }

    #[test]
    fn serde_uses_upper_case_codes() {
        let json = serde_json::to_string(&Language::Ja).unwrap();
        assert_eq!(json, "\"JA\"");
        let back: Language = serde_json::from_str("\"KO\"").unwrap();
        assert_eq!(back, Language::Ko);
    }

    #[test]
    fn every_language_has_a_deepl_code() {
        for lang in Language::ALL {
            assert_eq!(deepl_code(lang), Some(lang.code()));
            assert_eq!(lang.to_string(), lang.code());
        }
    }
}
