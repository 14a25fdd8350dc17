//! Text sanitization and locale folding.
//!
//! [`TextSanitizer`] turns free-form condition text into stable identifiers,
//! slugs and display strings.  Every instance owns its own fold table so
//! callers can extend it without touching other instances.
//!
//! Characters outside the fold table fall back to their canonical
//! decomposition with combining marks dropped (`Ș` → `S`, `Ő` → `O`).
//!
//! Folding is strictly one character in, one character out.  The sentence
//! normalizer relies on that to map positions found in folded text back onto
//! the raw sentence.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Lowercase diacritic → ASCII pairs.  Uppercase variants are derived when
/// the table is built.
const FOLD_PAIRS: &[(char, char)] = &[
    // Polish
    ('ą', 'a'),
    ('ć', 'c'),
    ('ę', 'e'),
    ('ł', 'l'),
    ('ń', 'n'),
    ('ó', 'o'),
    ('ś', 's'),
    ('ź', 'z'),
    ('ż', 'z'),
    // Western European
    ('à', 'a'),
    ('á', 'a'),
    ('â', 'a'),
    ('ã', 'a'),
    ('ä', 'a'),
    ('å', 'a'),
    ('ç', 'c'),
    ('è', 'e'),
    ('é', 'e'),
    ('ê', 'e'),
    ('ë', 'e'),
    ('ì', 'i'),
    ('í', 'i'),
    ('î', 'i'),
    ('ï', 'i'),
    ('ñ', 'n'),
    ('ò', 'o'),
    ('ô', 'o'),
    ('õ', 'o'),
    ('ö', 'o'),
    ('ù', 'u'),
    ('ú', 'u'),
    ('û', 'u'),
    ('ü', 'u'),
    ('ý', 'y'),
    ('ÿ', 'y'),
    // Czech / Slovak neighbours that show up in Polish business text
    ('č', 'c'),
    ('ď', 'd'),
    ('ě', 'e'),
    ('ň', 'n'),
    ('ř', 'r'),
    ('š', 's'),
    ('ť', 't'),
    ('ů', 'u'),
    ('ž', 'z'),
];

/// Returned by [`TextSanitizer::sanitize_id`] for empty input.
pub const INVALID_ID: &str = "invalid_id";

/// Returned by [`TextSanitizer::sanitize_id`] when nothing survives.
pub const FALLBACK_ID: &str = "sanitized_id";

/// Returned by [`TextSanitizer::sanitize_slug`] when nothing survives.
pub const FALLBACK_SLUG: &str = "slug";

/// Which sanitizer to apply in [`TextSanitizer::batch_sanitize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeMethod {
    #[default]
    Id,
    Display,
    Slug,
}

impl FromStr for SanitizeMethod {
    type Err = std::convert::Infallible;

    /// Unknown method names fall back to [`SanitizeMethod::Id`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "display" => Self::Display,
            "slug" => Self::Slug,
            _ => Self::Id,
        })
    }
}

/// Result of [`TextSanitizer::sanitize_email`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailCheck {
    pub is_valid: bool,
    pub sanitized: String,
}

/// Locale-aware text sanitizer.
#[derive(Debug, Clone)]
pub struct TextSanitizer {
    fold_map: HashMap<char, char>,
}

impl TextSanitizer {
    /// Create a sanitizer with the built-in fold table.
    pub fn new() -> Self {
        let mut fold_map = HashMap::with_capacity(FOLD_PAIRS.len() * 2);
        for &(from, to) in FOLD_PAIRS {
            fold_map.insert(from, to);
            let mut upper_from = from.to_uppercase();
            let mut upper_to = to.to_uppercase();
            if let (Some(uf), None, Some(ut), None) = (
                upper_from.next(),
                upper_from.next(),
                upper_to.next(),
                upper_to.next(),
            ) {
                fold_map.insert(uf, ut);
            }
        }
        Self { fold_map }
    }

    /// Add or override a fold mapping (both characters must be single
    /// code points).
    pub fn with_fold(mut self, from: char, to: char) -> Self {
        self.fold_map.insert(from, to);
        self
    }

    /// Strip diacritics from a single character, preserving case.
    pub fn strip_char(&self, c: char) -> char {
        match self.fold_map.get(&c) {
            Some(&folded) => folded,
            None => decomposed_base(c),
        }
    }

    /// Diacritic- and case-fold a single character.
    pub fn fold_char(&self, c: char) -> char {
        let stripped = self.strip_char(c);
        let lower = stripped.to_lowercase().next().unwrap_or(stripped);
        self.strip_char(lower)
    }

    /// Diacritic- and case-fold a string.  The output has exactly as many
    /// characters as the input.
    pub fn fold(&self, text: &str) -> String {
        text.chars().map(|c| self.fold_char(c)).collect()
    }

    /// Turn arbitrary text into an identifier made of `[A-Za-z0-9_]`.
    ///
    /// Runs of invalid characters collapse into a single `_`, and leading or
    /// trailing underscores are trimmed.  Applying it twice is a no-op.
    pub fn sanitize_id(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return INVALID_ID.to_owned();
        }

        let mut out = String::with_capacity(trimmed.len());
        for c in trimmed.chars() {
            let c = self.strip_char(c);
            let c = if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            };
            if c == '_' && out.ends_with('_') {
                continue;
            }
            out.push(c);
        }

        let out = out.trim_matches('_');
        if out.is_empty() {
            FALLBACK_ID.to_owned()
        } else {
            out.to_owned()
        }
    }

    /// Clean text for display: trims, drops angle brackets and collapses
    /// whitespace.
    pub fn sanitize_display(&self, text: &str) -> String {
        text.trim()
            .chars()
            .filter(|c| *c != '<' && *c != '>')
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Lowercase, folded, hyphen-separated URL slug.
    pub fn sanitize_slug(&self, text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return FALLBACK_SLUG.to_owned();
        }

        let mut out = String::with_capacity(trimmed.len());
        for c in self.fold(trimmed).chars() {
            let c = if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            };
            if c == '-' && out.ends_with('-') {
                continue;
            }
            out.push(c);
        }

        let out = out.trim_matches('-');
        if out.is_empty() {
            FALLBACK_SLUG.to_owned()
        } else {
            out.to_owned()
        }
    }

    /// Trim and lowercase an email address and check its basic shape
    /// (`local@domain.tld`, no whitespace).
    pub fn sanitize_email(&self, email: &str) -> EmailCheck {
        let sanitized = email.trim().to_lowercase();
        EmailCheck {
            is_valid: is_plausible_email(&sanitized),
            sanitized,
        }
    }

    /// Apply one sanitizer to every input.
    pub fn batch_sanitize<S: AsRef<str>>(&self, texts: &[S], method: SanitizeMethod) -> Vec<String> {
        texts
            .iter()
            .map(|t| match method {
                SanitizeMethod::Id => self.sanitize_id(t.as_ref()),
                SanitizeMethod::Display => self.sanitize_display(t.as_ref()),
                SanitizeMethod::Slug => self.sanitize_slug(t.as_ref()),
            })
            .collect()
    }
}

impl Default for TextSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Base character of `c` when its canonical decomposition is that base
/// followed only by combining marks; `c` itself otherwise.
fn decomposed_base(c: char) -> char {
    if c.is_ascii() {
        return c;
    }
    let mut parts = std::iter::once(c).nfd();
    match parts.next() {
        Some(base) if parts.all(is_combining_mark) => base,
        _ => c,
    }
}

fn is_plausible_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    // At least one dot with something on both sides.
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sanitize_id_folds_polish() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize_id("Wpłata klienta nastąpi"), "Wplata_klienta_nastapi");
        assert_eq!(s.sanitize_id("  Żółć!!  gęś "), "Zolc_ges");
    }

    #[test]
    fn sanitize_id_fallbacks() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize_id("   "), INVALID_ID);
        assert_eq!(s.sanitize_id("!!!"), FALLBACK_ID);
    }

    #[test]
    fn fold_is_one_to_one() {
        let s = TextSanitizer::new();
        let raw = "Kiedy KLIENT zapłaci, WYŚLIJ fakturę";
        let folded = s.fold(raw);
        assert_eq!(folded, "kiedy klient zaplaci, wyslij fakture");
        assert_eq!(folded.chars().count(), raw.chars().count());
    }

    #[test]
    fn folds_letters_outside_the_table() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize_id("Ștefan plătește"), "Stefan_plateste");
        assert_eq!(s.sanitize_id("Őrség"), "Orseg");
        assert_eq!(s.sanitize_id("Hà Nội"), "Ha_Noi");
        assert_eq!(s.fold("Ștefan plătește"), "stefan plateste");
        // No combining marks in the decomposition: left alone.
        assert_eq!(s.fold("서울"), "서울");
    }

    #[test]
    fn custom_fold_is_per_instance() {
        let custom = TextSanitizer::new().with_fold('ß', 's');
        let plain = TextSanitizer::new();
        assert_eq!(custom.sanitize_id("Straße"), "Strase");
        assert_eq!(plain.sanitize_id("Straße"), "Stra_e");
    }

    #[test]
    fn slug_and_display() {
        let s = TextSanitizer::new();
        assert_eq!(s.sanitize_slug("Wyślij Fakturę Teraz!"), "wyslij-fakture-teraz");
        assert_eq!(s.sanitize_slug("???"), FALLBACK_SLUG);
        assert_eq!(s.sanitize_display("  <b>hello</b>   world "), "bhello/b world");
    }

    #[test]
    fn email_shape() {
        let s = TextSanitizer::new();
        let ok = s.sanitize_email("  Jan.Kowalski@Firma.PL ");
        assert!(ok.is_valid);
        assert_eq!(ok.sanitized, "jan.kowalski@firma.pl");
        assert!(!s.sanitize_email("no-at-sign.pl").is_valid);
        assert!(!s.sanitize_email("a@b").is_valid);
        assert!(!s.sanitize_email("a@.pl").is_valid);
    }

    #[test]
    fn batch_uses_method() {
        let s = TextSanitizer::new();
        let out = s.batch_sanitize(&["Ała ma", "x y"], "slug".parse().unwrap());
        assert_eq!(out, vec!["ala-ma", "x-y"]);
        let ids = s.batch_sanitize(&["a b"], "unknown".parse().unwrap());
        assert_eq!(ids, vec!["a_b"]);
    }

    proptest! {
        #[test]
        fn sanitize_id_is_a_fixed_point(input in "\\PC{0,40}") {
            let s = TextSanitizer::new();
            let once = s.sanitize_id(&input);
            prop_assert_eq!(s.sanitize_id(&once), once);
        }

        #[test]
        fn fold_preserves_char_count(input in "\\PC{0,40}") {
            let s = TextSanitizer::new();
            prop_assert_eq!(s.fold(&input).chars().count(), input.chars().count());
        }
    }
}
