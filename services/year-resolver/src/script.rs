//!
//! src/script.rs  
//!
//! Detects the dominant writing system of artist and album names so 
//! that non-Latin queries can be routed to the providers that index them 
//!

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Arabic, 
    Chinese, 
    Cyrillic, 
    Devanagari, 
    Greek, 
    Hebrew, 
    Japanese, 
    Korean, 
    Latin, 
    Thai, 
    Mixed, 
    Unknown
}

impl ScriptType {
    /// Scripts with a Unicode-range detector, in counting order 
    pub const DETECTED: [ScriptType; 10] = [
        ScriptType::Arabic, 
        ScriptType::Chinese, 
        ScriptType::Cyrillic, 
        ScriptType::Devanagari, 
        ScriptType::Greek, 
        ScriptType::Hebrew, 
        ScriptType::Japanese, 
        ScriptType::Korean, 
        ScriptType::Latin, 
        ScriptType::Thai
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptType::Arabic     => "arabic",
            ScriptType::Chinese    => "chinese",
            ScriptType::Cyrillic   => "cyrillic",
            ScriptType::Devanagari => "devanagari",
            ScriptType::Greek      => "greek",
            ScriptType::Hebrew     => "hebrew",
            ScriptType::Japanese   => "japanese",
            ScriptType::Korean     => "korean",
            ScriptType::Latin      => "latin",
            ScriptType::Thai       => "thai",
            ScriptType::Mixed      => "mixed",
            ScriptType::Unknown    => "unknown"
        }
    }

    pub fn parse(s: &str) -> Option<ScriptType> {
        let s = s.trim().to_ascii_lowercase();
        ScriptType::DETECTED.iter()
            .chain([ScriptType::Mixed, ScriptType::Unknown].iter())
            .copied()
            .find(|t| t.as_str() == s)
    }

    /// Non-Latin, single-script classification 
    pub fn is_non_latin(self) -> bool {
        !matches!(self, ScriptType::Latin | ScriptType::Mixed | ScriptType::Unknown)
    }
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_han(c: char) -> bool {
    matches!(c as u32, 
        0x3400..=0x4DBF | 0x4E00..=0x9FFF | 0xF900..=0xFAFF | 0x20000..=0x2FA1F)
}

fn is_kana(c: char) -> bool {
    matches!(c as u32, 
        0x3040..=0x309F | 0x30A0..=0x30FF | 0x31F0..=0x31FF | 0xFF66..=0xFF9F)
}

fn matches_script(script: ScriptType, c: char) -> bool {
    let cp = c as u32; 
    match script {
        ScriptType::Arabic => matches!(cp, 
            0x0600..=0x06FF | 0x0750..=0x077F | 0x08A0..=0x08FF 
            | 0xFB50..=0xFDFF | 0xFE70..=0xFEFF),
        ScriptType::Chinese => is_han(c),
        ScriptType::Cyrillic => matches!(cp, 0x0400..=0x052F | 0x2DE0..=0x2DFF | 0xA640..=0xA69F),
        ScriptType::Devanagari => matches!(cp, 0x0900..=0x097F | 0xA8E0..=0xA8FF),
        ScriptType::Greek => matches!(cp, 0x0370..=0x03FF | 0x1F00..=0x1FFF),
        ScriptType::Hebrew => matches!(cp, 0x0590..=0x05FF | 0xFB1D..=0xFB4F),
        ScriptType::Japanese => is_kana(c) || is_han(c),
        ScriptType::Korean => matches!(cp, 
            0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F | 0xA960..=0xA97F),
        ScriptType::Latin => c.is_ascii_alphabetic() || matches!(cp, 
            0x00C0..=0x00D6 | 0x00D8..=0x00F6 | 0x00F8..=0x024F | 0x1E00..=0x1EFF),
        ScriptType::Thai => matches!(cp, 0x0E00..=0x0E7F),
        ScriptType::Mixed | ScriptType::Unknown => false
    }
}

/// Share of Latin characters below which a Latin/other pair counts as the other 
/// script, and above `1 - LATIN_MINORITY_SHARE` as Latin 
const LATIN_MINORITY_SHARE: f64 = 0.25; 

/// Classifies `text` into its dominant writing system. Never panics; empty or 
/// purely non-alphabetic input is `Unknown`. 
pub fn classify_script(text: &str) -> ScriptType {
    let mut counts = [0_usize; 10];
    let mut kana = 0_usize; 

    for c in text.chars().filter(|c| c.is_alphabetic()) {
        if is_kana(c) {
            kana += 1; 
        }
        for (slot, script) in ScriptType::DETECTED.iter().enumerate() {
            if matches_script(*script, c) {
                counts[slot] += 1; 
            }
        }
    }

    let chinese = 1; 
    let japanese = 6; 
    if counts[chinese] > 0 && counts[japanese] > 0 {
        // Han is shared, kana decides 
        if kana > 0 {
            counts[chinese] = 0; 
        } else {
            counts[japanese] = 0; 
        }
    }

    let present: Vec<(ScriptType, usize)> = ScriptType::DETECTED.iter()
        .copied()
        .zip(counts)
        .filter(|(_, n)| *n > 0)
        .collect();

    match present.as_slice() {
        [] => ScriptType::Unknown,
        [(only, _)] => *only,
        [(a, na), (b, nb)] if *a == ScriptType::Latin || *b == ScriptType::Latin => {
            let (latin, other, other_script) = if *a == ScriptType::Latin {
                (*na, *nb, *b)
            } else {
                (*nb, *na, *a)
            };
            let latin_share = latin as f64 / (latin + other) as f64; 
            if latin_share < LATIN_MINORITY_SHARE {
                other_script
            } else if latin_share > 1.0 - LATIN_MINORITY_SHARE {
                ScriptType::Latin
            } else {
                ScriptType::Mixed
            }
        }
        _ => {
            let max = present.iter().map(|(_, n)| *n).max().unwrap_or(0);
            let mut leaders = present.iter().filter(|(_, n)| *n == max);
            match (leaders.next(), leaders.next()) {
                (Some((script, _)), None) => *script,
                _ => ScriptType::Mixed
            }
        }
    }
}

/// True when two names are written in different scripts and at least one of 
/// them is non-Latin, i.e. a provider-side transliteration is plausible 
pub fn is_cross_script(a: ScriptType, b: ScriptType) -> bool {
    if matches!(a, ScriptType::Unknown | ScriptType::Mixed) 
        || matches!(b, ScriptType::Unknown | ScriptType::Mixed) {
        return false; 
    }
    a != b && (a.is_non_latin() || b.is_non_latin())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_single_scripts() {
        assert_eq!(classify_script("Radiohead"), ScriptType::Latin);
        assert_eq!(classify_script("Кино"), ScriptType::Cyrillic);
        assert_eq!(classify_script("방탄소년단"), ScriptType::Korean);
        assert_eq!(classify_script("عمرو دياب"), ScriptType::Arabic);
        assert_eq!(classify_script("שלום חנוך"), ScriptType::Hebrew);
        assert_eq!(classify_script("Χάρις Αλεξίου"), ScriptType::Greek);
        assert_eq!(classify_script("คาราบาว"), ScriptType::Thai);
        assert_eq!(classify_script("लता मंगेशकर"), ScriptType::Devanagari);
        assert_eq!(classify_script("Sigur Rós"), ScriptType::Latin);
    }

    #[test]
    fn kana_separates_japanese_from_chinese() {
        assert_eq!(classify_script("周杰倫"), ScriptType::Chinese);
        assert_eq!(classify_script("宇多田ヒカル"), ScriptType::Japanese);
        assert_eq!(classify_script("ひとりぼっち"), ScriptType::Japanese);
    }

    #[test]
    fn latin_pairs_use_share_thresholds() {
        // 1 latin letter against 4 cyrillic 
        assert_eq!(classify_script("Dкино"), ScriptType::Cyrillic);
        // 8 latin letters against 1 cyrillic 
        assert_eq!(classify_script("Moscowww д"), ScriptType::Latin);
        assert_eq!(classify_script("Mumiy Троль"), ScriptType::Mixed);
    }

    #[test]
    fn ties_between_non_latin_scripts_are_mixed() {
        assert_eq!(classify_script("ab αβ вг"), ScriptType::Mixed);
        assert_eq!(classify_script("αβγ вг"), ScriptType::Greek);
    }

    #[test]
    fn degenerate_input_is_unknown() {
        assert_eq!(classify_script(""), ScriptType::Unknown);
        assert_eq!(classify_script("   "), ScriptType::Unknown);
        assert_eq!(classify_script("!!! ... 1999"), ScriptType::Unknown);
        assert_eq!(classify_script("\u{0}\u{7}\t\n"), ScriptType::Unknown);
    }

    #[test]
    fn classification_is_idempotent() {
        for text in ["Мумий Тролль", "BTS 방탄소년단", "", "Björk"] {
            assert_eq!(classify_script(text), classify_script(text));
        }
    }

    #[test]
    fn cross_script_requires_a_non_latin_side() {
        assert!(is_cross_script(ScriptType::Cyrillic, ScriptType::Latin));
        assert!(is_cross_script(ScriptType::Japanese, ScriptType::Korean));
        assert!(!is_cross_script(ScriptType::Latin, ScriptType::Latin));
        assert!(!is_cross_script(ScriptType::Unknown, ScriptType::Cyrillic));
    }
}
