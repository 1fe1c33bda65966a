//! Free-form text → safe FTS5 query strings.
//!
//! FTS5 treats a pile of punctuation as syntax (`"`, `*`, `(`, `:` …) and the
//! uppercase words AND/OR/NOT/NEAR as operators; raw user input routinely
//! throws `fts5: syntax error`. Everything that reaches MATCH goes through
//! [`normalize`] first.

/// Characters FTS5 would parse as operators or reject outright.
const SPECIAL: &[char] = &[
    '"', '*', '(', ')', '{', '}', '[', ']', ':', '^', '~', '!', '&', '|', '@', '#', '$', '%', '+',
    '=', '\\', '<', '>', ',', ';', '?', '/', '-', '`', '.', '\'',
];

/// Reserved FTS5 operator words, matched case-insensitively.
const OPERATORS: &[&str] = &["and", "or", "not", "near"];

/// Closed stop-word list: common English function words that add noise to an
/// implicit-AND query.
const STOP_WORDS: &[&str] = &[
    "a", "an", "are", "as", "at", "be", "but", "by", "do", "for", "from", "had", "has", "have",
    "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on",
    "our", "she", "so", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "to", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will", "with",
    "you", "your",
];

fn strip_special(input: &str) -> String {
    input
        .chars()
        .map(|c| if SPECIAL.contains(&c) { ' ' } else { c })
        .collect()
}

fn is_operator(token: &str) -> bool {
    OPERATORS.iter().any(|op| token.eq_ignore_ascii_case(op))
}

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Tokens the normalizer would emit for `input`: special characters stripped,
/// lowercased, length > 1, no stop words, no operator words.
pub fn normalize_tokens(input: &str) -> Vec<String> {
    strip_special(input)
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !is_stop_word(t) && !is_operator(t))
        .map(str::to_string)
        .collect()
}

/// Produce a sanitized FTS5 query string (implicit AND), or "" for no query.
///
/// Fallbacks when filtering eats every token: keep length->1 non-operator
/// tokens of the special-stripped text, then the alphanumeric-whitespace
/// residue of the original. All output is lowercased, which neutralizes the
/// reserved operator words (FTS5 operators are uppercase-only).
pub fn normalize(input: &str) -> String {
    let tokens = normalize_tokens(input);
    if !tokens.is_empty() {
        return tokens.join(" ");
    }

    // Fallback 1: same stripping, but let stop words back in.
    let loose: Vec<String> = strip_special(input)
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !is_operator(t))
        .map(str::to_string)
        .collect();
    if !loose.is_empty() {
        return loose.join(" ");
    }

    // Fallback 2: alphanumeric-whitespace residue of the original.
    input
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
