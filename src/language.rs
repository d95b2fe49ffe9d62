use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Ms,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ms => "ms",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::En),
            "ms" => Some(Language::Ms),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    pub language: Language,
    pub confidence: f64,
}

static MALAY_MARKERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    marker_regex(&[
        "yang", "dan", "untuk", "saya", "anda", "adalah", "dengan", "ini", "itu", "tidak",
        "boleh", "apa", "bagaimana", "kepada", "dalam", "akan", "ada", "kami", "mereka", "juga",
        "atau", "dari", "sahaja", "pelaburan", "melabur", "wang", "simpanan", "saham", "halal",
        "haram", "terima", "kasih", "sila", "kerana", "lebih", "bagi",
    ])
});

static ENGLISH_MARKERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    marker_regex(&[
        "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is", "are",
        "what", "how", "you", "this", "that", "my", "should", "can", "investment", "invest",
        "money", "savings", "stock", "stocks", "please", "thanks", "because", "which",
    ])
});

fn marker_regex(words: &[&str]) -> Option<Regex> {
    Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|")))
        .map_err(|err| {
            tracing::error!(error = %err, "language marker pattern failed to compile")
        })
        .ok()
}

fn count_markers(markers: &Option<Regex>, text: &str) -> usize {
    markers.as_ref().map_or(0, |re| re.find_iter(text).count())
}

/// Classifies `text` as Malay or English by counting marker words.
///
/// Ties, including text with no markers at all, resolve to English with
/// confidence 0.5.
pub fn detect_language(text: &str) -> Detection {
    let ms = count_markers(&MALAY_MARKERS, text);
    let en = count_markers(&ENGLISH_MARKERS, text);
    let total = ms + en;
    let language = if ms > en { Language::Ms } else { Language::En };
    let confidence = if total == 0 {
        0.5
    } else {
        0.5 + 0.5 * (ms.abs_diff(en) as f64) / (total as f64)
    };
    Detection {
        language,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_patterns_compile() {
        assert!(MALAY_MARKERS.is_some());
        assert!(ENGLISH_MARKERS.is_some());
    }

    #[test]
    fn malay_sentence_is_detected() {
        let d = detect_language("Apakah pelaburan yang patuh Syariah untuk saya?");
        assert_eq!(d.language, Language::Ms);
        assert!(d.confidence > 0.5);
    }

    #[test]
    fn english_sentence_is_detected() {
        let d = detect_language("What is the best Shariah compliant investment for me?");
        assert_eq!(d.language, Language::En);
        assert!(d.confidence > 0.5);
    }

    #[test]
    fn no_markers_defaults_to_english() {
        let d = detect_language("Sukuk REIT 2025");
        assert_eq!(d.language, Language::En);
        assert_eq!(d.confidence, 0.5);
        assert_eq!(detect_language("").language, Language::En);
    }

    #[test]
    fn markers_match_whole_words_only() {
        // "dana" and "other" contain markers as substrings only.
        let d = detect_language("dana other");
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn codes_round_trip() {
        assert_eq!(Language::from_code("ms"), Some(Language::Ms));
        assert_eq!(Language::from_code("auto"), None);
        assert_eq!(Language::En.code(), "en");
        assert_eq!(serde_json::to_string(&Language::Ms).unwrap(), r#""ms""#);
    }
}
