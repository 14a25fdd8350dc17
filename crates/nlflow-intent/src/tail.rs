//! Splitting a sentence tail into individual actions.

use nlflow_kernel::TextSanitizer;

use crate::grammar::{Grammar, normalize_whitespace};
use crate::lang::Lang;

/// Split `tail` into actions.
///
/// Conjunction lists are tried with the hinted language first; the first
/// list that cuts the tail in two or more wins.  A tail that stays in one
/// piece is re-scanned for embedded action verbs.
pub fn split_actions(grammar: &Grammar, tail: &str, lang: Lang) -> Vec<String> {
    let tail = normalize_whitespace(tail);
    if tail.is_empty() {
        return Vec::new();
    }

    let mut parts = vec![tail.clone()];
    for re in grammar.conjunctions_for(lang) {
        let pieces: Vec<String> = re.split(&tail).map(normalize_whitespace).collect();
        if pieces.len() > 1 {
            parts = pieces;
            break;
        }
    }

    let parts: Vec<String> = parts
        .iter()
        .map(|p| clean_fragment(p))
        .filter(|p| !p.is_empty())
        .collect();

    if parts.len() == 1 {
        promote_verbs(grammar, &parts[0])
    } else {
        parts
    }
}

/// Cut a single fragment at every embedded action verb.
///
/// Words before the first verb stay with that verb's fragment.  A piece
/// that is only a verb is glued to the piece after it, and a verb repeated
/// back to back collapses into one.
pub fn promote_verbs(grammar: &Grammar, fragment: &str) -> Vec<String> {
    let starts: Vec<usize> = grammar
        .verbs()
        .find_iter(fragment)
        .map(|m| m.start())
        .filter(|&s| s == 0 || fragment[..s].ends_with(char::is_whitespace))
        .collect();

    if starts.len() < 2 {
        return vec![fragment.to_owned()];
    }

    let mut cuts = Vec::with_capacity(starts.len() + 1);
    cuts.push(0);
    cuts.extend(starts[1..].iter().copied());
    cuts.push(fragment.len());

    let pieces: Vec<String> = cuts
        .windows(2)
        .map(|w| clean_fragment(&fragment[w[0]..w[1]]))
        .filter(|p| !p.is_empty())
        .collect();

    let mut out: Vec<String> = Vec::with_capacity(pieces.len());
    let mut pending: Option<String> = None;
    for piece in pieces {
        let piece = match pending.take() {
            Some(verb) if starts_with_same_word(&verb, &piece) => piece,
            Some(verb) => format!("{verb} {piece}"),
            None => piece,
        };
        if grammar.is_bare_verb(&piece) {
            pending = Some(piece);
        } else {
            out.push(piece);
        }
    }
    if let Some(verb) = pending {
        out.push(verb);
    }
    out
}

/// Recover from a tail that collapsed into a bare verb.
///
/// Finds the folded condition inside the folded raw sentence, takes what
/// follows it in the raw text and splits that again.  Returns `None` unless
/// the retry yields more than one action or a longer single action.
pub fn recover_isolated_verb(
    grammar: &Grammar,
    sanitizer: &TextSanitizer,
    raw: &str,
    condition: &str,
    actions: &[String],
    lang: Lang,
) -> Option<Vec<String>> {
    let [only] = actions else {
        return None;
    };
    if !grammar.is_bare_verb(only) {
        return None;
    }

    let raw = normalize_whitespace(raw);
    let folded_raw = sanitizer.fold(&raw);
    let folded_condition = sanitizer.fold(condition.trim());
    if folded_condition.is_empty() {
        return None;
    }

    // Folding keeps the character count, so a char offset in the folded
    // text is the same char offset in the raw text.
    let byte_pos = folded_raw.find(&folded_condition)?;
    let end_char = folded_raw[..byte_pos].chars().count() + folded_condition.chars().count();
    let end_byte = raw
        .char_indices()
        .nth(end_char)
        .map_or(raw.len(), |(i, _)| i);

    let rest = grammar.strip_leading_separator(&raw[end_byte..]);
    let retried = split_actions(grammar, rest, lang);

    let longer = retried.len() == 1 && retried[0].chars().count() > only.chars().count();
    if retried.len() > 1 || longer {
        Some(retried)
    } else {
        None
    }
}

/// Drop trailing periods and stray separators from an action fragment.
fn clean_fragment(fragment: &str) -> String {
    fragment
        .trim()
        .trim_end_matches(['.', ',', ';'])
        .trim()
        .to_owned()
}

fn starts_with_same_word(verb: &str, piece: &str) -> bool {
    let first = piece.split_whitespace().next().unwrap_or_default();
    first.to_lowercase() == verb.trim().to_lowercase()
}
