//! Language tables: condition markers, connectors, conjunctions and action
//! verbs for every supported language.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A language hint, identified by its ISO 639-3 code on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Lang {
    #[serde(rename = "pol")]
    Pl,
    #[serde(rename = "eng")]
    En,
    #[serde(rename = "spa")]
    Es,
    #[serde(rename = "deu")]
    De,
    #[serde(rename = "fra")]
    Fr,
    #[serde(rename = "ita")]
    It,
    #[serde(rename = "por")]
    Pt,
    /// Undetermined: every language table is consulted.
    #[default]
    #[serde(rename = "und")]
    Und,
}

impl Lang {
    /// Every concrete language, in the order tables are consulted when the
    /// language is undetermined.
    pub const KNOWN: [Lang; 7] = [
        Lang::Pl,
        Lang::En,
        Lang::Es,
        Lang::De,
        Lang::Fr,
        Lang::It,
        Lang::Pt,
    ];

    /// ISO 639-3 code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Pl => "pol",
            Self::En => "eng",
            Self::Es => "spa",
            Self::De => "deu",
            Self::Fr => "fra",
            Self::It => "ita",
            Self::Pt => "por",
            Self::Und => "und",
        }
    }

    /// Words that open a condition clause.
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Pl => &["gdy", "kiedy", "jeśli", "jesli", "jeżeli", "jezeli"],
            Self::En => &["when", "whenever", "if"],
            Self::Es => &["cuando", "si"],
            Self::De => &["wenn", "falls"],
            Self::Fr => &["quand", "lorsque", "si"],
            Self::It => &["quando", "se"],
            Self::Pt => &["quando", "se"],
            Self::Und => &[],
        }
    }

    /// Words that join actions in a sentence tail.
    pub fn conjunctions(self) -> &'static [&'static str] {
        match self {
            Self::Pl => &["i", "oraz", "a także", "następnie"],
            Self::En => &["and", "then"],
            Self::Es => &["y", "entonces", "luego"],
            Self::De => &["und", "dann"],
            Self::Fr => &["et", "puis", "alors"],
            Self::It => &["e", "poi", "allora"],
            Self::Pt => &["e", "então", "depois"],
            Self::Und => &[],
        }
    }

    /// Imperative verbs that start an action.
    pub fn action_verbs(self) -> &'static [&'static str] {
        match self {
            Self::Pl => &[
                "wyślij",
                "wyslij",
                "powiadom",
                "zaktualizuj",
                "dodaj",
                "wystaw",
                "uruchom",
                "prześlij",
                "przeslij",
                "wykonaj",
                "utwórz",
                "utworz",
                "zamów",
                "zamow",
                "przypisz",
            ],
            Self::En => &[
                "send", "notify", "create", "update", "add", "run", "dispatch", "email",
            ],
            Self::Es => &["envía", "envia", "notifica", "crea", "actualiza", "añade"],
            Self::De => &["sende", "benachrichtige", "erstelle", "aktualisiere"],
            Self::Fr => &["envoie", "notifie", "crée", "créer", "ajoute"],
            Self::It => &["invia", "crea", "aggiorna", "aggiungi"],
            Self::Pt => &["envie", "notifique", "crie", "atualize", "adicione"],
            Self::Und => &[],
        }
    }

    /// Languages to consult for this hint: the hint alone, or all of them
    /// when undetermined.
    pub fn candidates(self) -> Vec<Lang> {
        match self {
            Self::Und => Self::KNOWN.to_vec(),
            lang => vec![lang],
        }
    }

    /// Languages in preference order: the hint first, then the rest.
    pub fn preference_order(self) -> Vec<Lang> {
        let mut order = Vec::with_capacity(Self::KNOWN.len());
        if self != Self::Und {
            order.push(self);
        }
        order.extend(Self::KNOWN.iter().copied().filter(|l| *l != self));
        order
    }

    /// Guess the language of `text` from the words it uses.
    ///
    /// Scores every language by whole-word hits on its markers, conjunctions
    /// and verbs; Polish diacritics count extra.  Returns [`Lang::Und`] when
    /// nothing scores.
    pub fn detect(text: &str) -> Lang {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.is_empty() {
            return Lang::Und;
        }

        let mut best = (Lang::Und, 0usize);
        for lang in Self::KNOWN {
            let vocabulary: Vec<&str> = lang
                .markers()
                .iter()
                .chain(lang.conjunctions())
                .chain(lang.action_verbs())
                .copied()
                .collect();
            let mut score = words.iter().filter(|w| vocabulary.contains(w)).count();
            if lang == Lang::Pl {
                score += 2 * lower.chars().filter(|c| "ąćęłńśźż".contains(*c)).count();
            }
            if score > best.1 {
                best = (lang, score);
            }
        }
        best.0
    }
}

impl FromStr for Lang {
    type Err = std::convert::Infallible;

    /// Accepts two- and three-letter codes; anything else is undetermined.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "pl" | "pol" => Self::Pl,
            "en" | "eng" => Self::En,
            "es" | "spa" => Self::Es,
            "de" | "deu" | "ger" => Self::De,
            "fr" | "fra" | "fre" => Self::Fr,
            "it" | "ita" => Self::It,
            "pt" | "por" => Self::Pt,
            _ => Self::Und,
        })
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Connector words that may separate a condition from its actions.
pub const CONNECTORS: &[&str] = &["to", "wtedy", "then"];

/// Condition used when a sentence has no recognizable trigger clause.
pub const ON_DEMAND_CONDITION: &str = "na żądanie";
