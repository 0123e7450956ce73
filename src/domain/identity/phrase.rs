//! Phrase naming and speech normalization.
//!
//! A phrase artifact is named by a readable filename derived from the phrase
//! itself, so the object key can be rebuilt from the text without a lookup
//! table. The text sent to synthesis goes through a separate normalization
//! that never feeds back into the filename.

use regex::Regex;
use std::sync::OnceLock;

use super::{truncated_md5, AUDIO_FINGERPRINT_LEN};

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\''];

fn ellipsis_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\.{2,}|…").expect("ellipsis pattern is valid"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// At least one cased letter and no lowercase letters
fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_uppercase) && !text.chars().any(char::is_lowercase)
}

fn spell_out(letters: &str) -> String {
    letters
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text to hand to the synthesis backend for a phrase.
///
/// Dots and ellipses become spaces and whitespace collapses. An all-caps
/// phrase is spelled letter by letter (`SPF` -> `S P F`); in mixed text the
/// same rule applies to each all-caps word.
pub fn format_phrase_for_tts(phrase: &str) -> String {
    let phrase = collapse_whitespace(&phrase.replace(['.', '…'], " "));

    if phrase.chars().count() > 1 && is_all_caps(&phrase) {
        return spell_out(&phrase);
    }

    phrase
        .split(' ')
        .map(|word| {
            let letters: String = word.chars().filter(|c| c.is_alphabetic()).collect();
            if letters.chars().count() > 1 && is_all_caps(&letters) && word.contains(&letters) {
                word.replacen(&letters, &spell_out(&letters), 1)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Filename stem (no extension) for a phrase artifact.
///
/// `break the ice` -> `break_the_ice`, `S.P.F.` -> `SPF`,
/// `What's up?` -> `whats_up`. Case is kept only for acronyms.
pub fn clean_phrase_filename(phrase: &str) -> String {
    // Runs of dots read as a pause; single dots are abbreviation marks.
    let phrase = ellipsis_pattern().replace_all(phrase, " ").replace('.', "");
    let phrase = collapse_whitespace(&phrase);

    let mut cleaned: String = phrase
        .replace(' ', "_")
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect();

    let letters: String = phrase.chars().filter(|c| c.is_alphabetic()).collect();
    if !(letters.chars().count() > 1 && is_all_caps(&letters)) {
        cleaned = cleaned.to_lowercase();
    }

    cleaned.trim_matches('_').to_string()
}

/// 8-char fingerprint of the phrase filename; punctuation variants collide on purpose
pub fn phrase_fingerprint(phrase: &str) -> String {
    truncated_md5(&clean_phrase_filename(phrase), AUDIO_FINGERPRINT_LEN)
}
