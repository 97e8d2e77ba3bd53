//! Language selection and stop-word sets.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Stop words the Gopher rules look for in English text.
pub const ENGLISH_STOP_WORDS: &[&str] = &["the", "be", "to", "of", "and", "that", "have", "with"];

/// Common Russian function words.
pub const RUSSIAN_STOP_WORDS: &[&str] = &[
    "от", "конечно", "ей", "можно", "вам", "так", "почти", "тем", "будет", "их", "нее", "моя",
    "всех", "него", "совсем", "во", "другой", "бы", "им", "не", "про", "же", "на", "или", "она",
    "раз", "кто", "нет", "много", "более", "куда", "хоть", "тоже", "чего", "нас", "мы", "тогда",
    "до", "тут", "разве", "перед", "этом", "лучше", "нельзя", "себе", "какой", "чтобы", "какая",
    "но", "ну", "меня", "чтоб", "когда", "три", "тебя", "где", "надо", "без", "уже", "вас",
    "вдруг", "может", "была", "ни", "еще", "потом", "больше", "он", "никогда", "для", "мой",
    "мне", "через", "вот", "был", "ведь", "после", "ней", "если", "были", "опять", "ли", "об",
    "сейчас", "этого", "сам", "свою", "со", "иногда", "только", "чем", "ему", "впрочем", "всю",
    "потому", "один", "из", "уж", "они", "нибудь", "да", "них", "чуть", "будто", "себя", "быть",
    "между", "его", "эту", "хорошо", "есть", "эти", "этот", "при", "все", "даже", "того", "по",
    "ним", "как", "зачем", "два", "такой", "теперь", "там", "над", "вы", "здесь", "тот", "всегда",
    "ты", "наконец", "этой", "ее", "что", "ничего", "всего", "том", "под", "за", "то", "было",
];

/// Document language, selecting language-specific defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English
    #[default]
    English,
    /// Russian
    Russian,
}

impl Language {
    /// Default stop-word list.
    #[must_use]
    pub fn stop_words(&self) -> &'static [&'static str] {
        match self {
            Self::English => ENGLISH_STOP_WORDS,
            Self::Russian => RUSSIAN_STOP_WORDS,
        }
    }

    /// Default stop words as an owned lookup set.
    #[must_use]
    pub fn stop_word_set(&self) -> HashSet<String> {
        self.stop_words().iter().map(|w| (*w).to_string()).collect()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::English => write!(f, "english"),
            Self::Russian => write!(f, "russian"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "english" | "en" => Ok(Self::English),
            "russian" | "ru" => Ok(Self::Russian),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}
