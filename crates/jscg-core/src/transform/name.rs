use serde::Serialize;

pub const DEFAULT_PREFIX: &str = "gen";
pub const NUMBER_PREFIX: &str = "n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    UpperSeen,
    MultipleUpperSeen,
    LowerSeen,
    DigitSeen,
}

/// Split an identifier into fragments at case changes and punctuation.
///
/// A run of two or more capitals followed by a lowercase letter or digit
/// gives up its last capital to the next fragment, so `JSONValue` splits
/// into `JSON` and `Value`. Only ASCII letters and digits are kept.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut state = State::Initial;

    for ch in input.chars() {
        let upper = ch.is_ascii_uppercase();
        let lower = ch.is_ascii_lowercase();
        let digit = ch.is_ascii_digit();

        state = match state {
            State::Initial => {
                if upper || lower || digit {
                    current.push(ch);
                }
                if upper {
                    State::UpperSeen
                } else if lower {
                    State::LowerSeen
                } else if digit {
                    State::DigitSeen
                } else {
                    State::Initial
                }
            }
            State::UpperSeen => {
                if upper || lower || digit {
                    current.push(ch);
                }
                if upper {
                    State::MultipleUpperSeen
                } else if lower {
                    State::LowerSeen
                } else if digit {
                    State::DigitSeen
                } else {
                    fragments.push(std::mem::take(&mut current));
                    State::Initial
                }
            }
            State::MultipleUpperSeen => {
                if upper {
                    current.push(ch);
                    State::MultipleUpperSeen
                } else if lower || digit {
                    // current holds at least two capitals here
                    let last = current.pop().unwrap_or_default();
                    fragments.push(std::mem::take(&mut current));
                    current.push(last);
                    current.push(ch);
                    if lower {
                        State::LowerSeen
                    } else {
                        State::DigitSeen
                    }
                } else {
                    fragments.push(std::mem::take(&mut current));
                    State::Initial
                }
            }
            State::LowerSeen | State::DigitSeen => {
                if upper {
                    fragments.push(std::mem::take(&mut current));
                    current.push(ch);
                    State::UpperSeen
                } else if lower {
                    current.push(ch);
                    State::LowerSeen
                } else if digit {
                    current.push(ch);
                    State::DigitSeen
                } else {
                    fragments.push(std::mem::take(&mut current));
                    State::Initial
                }
            }
        };
    }
    if !current.is_empty() {
        fragments.push(current);
    }
    fragments
}

/// An identifier split into fragments, renderable in any case convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Name {
    original: String,
    fragments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated: Option<u32>,
    #[serde(skip)]
    default_prefix: String,
    #[serde(skip)]
    number_prefix: String,
}

impl Name {
    /// A name with the default prefixes. An empty name renders as the bare
    /// default prefix; use [`NameGenerator`] to number empty names.
    pub fn new(original: &str) -> Self {
        Self::with_prefixes(original, DEFAULT_PREFIX, NUMBER_PREFIX)
    }

    pub fn with_prefixes(original: &str, default_prefix: &str, number_prefix: &str) -> Self {
        Self {
            original: original.to_string(),
            fragments: tokenize(original),
            generated: None,
            default_prefix: default_prefix.to_string(),
            number_prefix: number_prefix.to_string(),
        }
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The same name with `suffix` appended to its last fragment.
    pub fn with_suffix(&self, suffix: u32) -> Self {
        let base = if self.fragments.is_empty() {
            self.fallback()
        } else {
            self.original.clone()
        };
        Self::with_prefixes(
            &format!("{base}{suffix}"),
            &self.default_prefix,
            &self.number_prefix,
        )
    }

    pub fn lower_camel_case(&self) -> String {
        self.joined("", uncapitalise, capitalise)
    }

    pub fn upper_camel_case(&self) -> String {
        self.joined("", capitalise, capitalise)
    }

    pub fn lower_snake_case(&self) -> String {
        self.joined("_", to_lower, to_lower)
    }

    pub fn upper_snake_case(&self) -> String {
        self.joined("_", to_upper, to_upper)
    }

    pub fn capital_snake_case(&self) -> String {
        self.joined("_", capitalise, capitalise)
    }

    pub fn lower_kebab_case(&self) -> String {
        self.joined("-", to_lower, to_lower)
    }

    pub fn upper_kebab_case(&self) -> String {
        self.joined("-", to_upper, to_upper)
    }

    pub fn capital_kebab_case(&self) -> String {
        self.joined("-", capitalise, capitalise)
    }

    fn fallback(&self) -> String {
        match self.generated {
            Some(n) => format!("{}{n}", self.default_prefix),
            None => self.default_prefix.clone(),
        }
    }

    fn joined(
        &self,
        separator: &str,
        first: fn(&str) -> String,
        rest: fn(&str) -> String,
    ) -> String {
        let Some((head, tail)) = self.fragments.split_first() else {
            return first(&self.fallback());
        };
        let head = if head.starts_with(|c: char| c.is_ascii_digit()) {
            format!("{}{head}", self.number_prefix)
        } else {
            head.clone()
        };
        let mut out = first(&head);
        for fragment in tail {
            out.push_str(separator);
            out.push_str(&rest(fragment));
        }
        out
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {
            let mut out = String::with_capacity(s.len());
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
            out
        }
        _ => s.to_string(),
    }
}

/// Lowercase an all-capitals fragment entirely, otherwise only its first
/// letter.
fn uncapitalise(s: &str) -> String {
    if !s.chars().any(|c| c.is_ascii_lowercase()) {
        return to_lower(s);
    }
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_uppercase() => {
            let mut out = String::with_capacity(s.len());
            out.push(first.to_ascii_lowercase());
            out.push_str(chars.as_str());
            out
        }
        _ => s.to_string(),
    }
}

fn to_lower(s: &str) -> String {
    s.to_ascii_lowercase()
}

fn to_upper(s: &str) -> String {
    s.to_ascii_uppercase()
}

/// Hands out names for one compilation run, numbering the empty ones.
#[derive(Debug)]
pub struct NameGenerator {
    counter: u32,
    default_prefix: String,
    number_prefix: String,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, NUMBER_PREFIX)
    }
}

impl NameGenerator {
    pub fn new(default_prefix: &str, number_prefix: &str) -> Self {
        Self {
            counter: 0,
            default_prefix: default_prefix.to_string(),
            number_prefix: number_prefix.to_string(),
        }
    }

    pub fn name(&mut self, original: &str) -> Name {
        let mut name = Name::with_prefixes(original, &self.default_prefix, &self.number_prefix);
        if name.is_empty() {
            self.counter += 1;
            name.generated = Some(self.counter);
        }
        name
    }

    /// How many fallback names this generator has produced.
    pub fn generated(&self) -> u32 {
        self.counter
    }
}

/// Naive singularization used for array item class names.
pub fn singularize(word: &str) -> String {
    if word.ends_with("ies") && word.len() > 3 {
        format!("{}y", &word[..word.len() - 3])
    } else if word.ends_with("ses") || word.ends_with("xes") || word.ends_with("zes") {
        word[..word.len() - 2].to_string()
    } else if word.ends_with('s') && !word.ends_with("ss") && word.len() > 1 {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}
