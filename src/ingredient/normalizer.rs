/// Tokens that carry no ingredient identity: quantities and sizes, colors,
/// preparation states, qualities, packaging, salt/fat qualifiers and
/// function words.
#[rustfmt::skip]
pub const STOP_WORDS: &[&str] = &[
    // size / quantity
    "large", "small", "medium", "extra", "whole",
    "sliced", "diced", "chopped", "minced", "ground",
    // colors
    "black", "white", "red", "green", "dark", "light",
    // preparation state
    "fresh", "dried", "frozen", "canned", "raw", "cooked",
    "grilled", "fried", "roasted", "crushed", "shredded", "grated",
    // quality
    "organic", "natural", "pure", "virgin", "premium",
    "old", "new", "aged",
    // packaging
    "can", "jar", "bottle", "bag",
    // salt / fat
    "unsalted", "salted", "low", "reduced", "free",
    // function words
    "with", "without", "and", "the",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Map a raw ingredient string to its canonical token string.
///
/// Lowercases, blanks out everything that is not alphanumeric or whitespace,
/// then drops stop words and single-character tokens. When nothing survives
/// the lowercased, trimmed input is returned instead, so a non-blank input
/// never yields an empty label.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();

    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let tokens: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 1 && !is_stop_word(t))
        .collect();

    if tokens.is_empty() {
        lowered
    } else {
        tokens.join(" ")
    }
}
