use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::normalizer::normalize;

#[derive(Debug, Error)]
pub enum RecipeSourceError {
    #[error("Recipe source unavailable: {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Failed reading recipe source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A recipe as read from the source: ingredients in listed order, unnormalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecipe {
    pub id: i64,
    pub ingredients: Vec<String>,
}

impl RawRecipe {
    pub fn new<I, S>(id: i64, ingredients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id,
            ingredients: ingredients.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from the stored list text. Unparseable text gives no ingredients.
    pub fn from_literal(id: i64, text: &str) -> Self {
        let ingredients = parse_ingredient_list(text).unwrap_or_else(|| {
            debug!(recipe_id = id, "Unparseable ingredient list; treating as empty");
            Vec::new()
        });
        Self { id, ingredients }
    }

    pub fn normalized(&self) -> NormalizedRecipe {
        NormalizedRecipe::from_raw(self)
    }
}

/// Canonical tokens of one recipe, first occurrence order, no duplicates.
/// Items that normalize to nothing are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecipe {
    pub id: i64,
    pub ingredients: Vec<String>,
}

impl NormalizedRecipe {
    pub fn from_raw(raw: &RawRecipe) -> Self {
        let mut seen = HashSet::with_capacity(raw.ingredients.len());
        let ingredients = raw
            .ingredients
            .iter()
            .map(|ing| normalize(ing))
            .filter(|ing| !ing.is_empty() && seen.insert(ing.clone()))
            .collect();
        Self {
            id: raw.id,
            ingredients,
        }
    }
}

/// Parse a bracketed literal list of quoted strings, e.g.
/// `['flour', "baker's chocolate"]`.
///
/// Items may use single or double quotes with backslash escapes. Returns
/// `None` for anything else, including non-string items.
pub fn parse_ingredient_list(text: &str) -> Option<Vec<String>> {
    let mut chars = text.trim().chars().peekable();
    if chars.next()? != '[' {
        return None;
    }

    let mut items = Vec::new();
    loop {
        skip_whitespace(&mut chars);
        match chars.next()? {
            ']' => break,
            quote @ ('\'' | '"') => {
                items.push(parse_quoted(&mut chars, quote)?);
                skip_whitespace(&mut chars);
                match chars.next()? {
                    ',' => continue,
                    ']' => break,
                    _ => return None,
                }
            }
            _ => return None,
        }
    }

    if chars.any(|c| !c.is_whitespace()) {
        return None;
    }
    Some(items)
}

fn skip_whitespace(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn parse_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> Option<String> {
    let mut out = String::new();
    loop {
        match chars.next()? {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                other => out.push(other),
            },
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
}

/// Recipes read from a tabular source.
#[derive(Debug, Clone, Default)]
pub struct RecipeBatch {
    pub recipes: Vec<RawRecipe>,
    /// Rows whose ingredient list could not be parsed.
    pub malformed_rows: usize,
}

/// Read recipes from a CSV file with `id` and `ingredients` columns.
///
/// Only failing to open or read the file is an error. A missing `id` falls
/// back to the row index; a missing or malformed `ingredients` cell yields an
/// empty ingredient list.
pub fn read_recipes(path: &Path) -> Result<RecipeBatch, RecipeSourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|source| RecipeSourceError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?;

    let headers = reader
        .byte_headers()
        .map_err(|source| RecipeSourceError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        })?
        .clone();
    let column = |name: &str| {
        headers.iter().position(|h| {
            std::str::from_utf8(h)
                .map(|h| h.trim_start_matches('\u{feff}').trim() == name)
                .unwrap_or(false)
        })
    };
    let id_col = column("id");
    let ingredients_col = column("ingredients");

    let mut batch = RecipeBatch::default();
    for (row, record) in reader.byte_records().enumerate() {
        let record = record.map_err(|source| RecipeSourceError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let id = id_col
            .and_then(|i| record.get(i))
            .and_then(|b| std::str::from_utf8(b).ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(row as i64);

        let recipe = match ingredients_col.and_then(|i| record.get(i)) {
            Some(bytes) => {
                let parsed = parse_ingredient_list(&String::from_utf8_lossy(bytes));
                if parsed.is_none() {
                    batch.malformed_rows += 1;
                    debug!(recipe_id = id, "Unparseable ingredient list; treating as empty");
                }
                RawRecipe {
                    id,
                    ingredients: parsed.unwrap_or_default(),
                }
            }
            None => RawRecipe {
                id,
                ingredients: Vec::new(),
            },
        };
        batch.recipes.push(recipe);
    }

    info!(
        recipes = batch.recipes.len(),
        malformed = batch.malformed_rows,
        "Loaded recipes from {}",
        path.display()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_quoted_list() {
        assert_eq!(
            parse_ingredient_list("['flour', 'sugar', 'eggs']"),
            Some(vec!["flour".to_string(), "sugar".to_string(), "eggs".to_string()])
        );
    }

    #[test]
    fn parses_mixed_quotes_and_escapes() {
        assert_eq!(
            parse_ingredient_list(r#"["baker's chocolate", 'it\'s', "say \"hi\""]"#),
            Some(vec![
                "baker's chocolate".to_string(),
                "it's".to_string(),
                "say \"hi\"".to_string(),
            ])
        );
    }

    #[test]
    fn accepts_empty_list_and_trailing_comma() {
        assert_eq!(parse_ingredient_list("[]"), Some(vec![]));
        assert_eq!(parse_ingredient_list(" [ 'a' , ] "), Some(vec!["a".to_string()]));
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_ingredient_list(""), None);
        assert_eq!(parse_ingredient_list("invalid string"), None);
        assert_eq!(parse_ingredient_list("['unterminated"), None);
        assert_eq!(parse_ingredient_list("[1, 2]"), None);
        assert_eq!(parse_ingredient_list("['a' 'b']"), None);
        assert_eq!(parse_ingredient_list("['a'] trailing"), None);
    }

    #[test]
    fn malformed_literal_gives_empty_recipe() {
        let recipe = RawRecipe::from_literal(7, "not a list");
        assert_eq!(recipe.id, 7);
        assert!(recipe.ingredients.is_empty());
    }

    #[test]
    fn normalization_dedups_in_first_seen_order() {
        let raw = RawRecipe::new(1, ["Salt", "fresh salt", "Pepper", "salt"]);
        assert_eq!(raw.normalized().ingredients, vec!["salt", "pepper"]);
    }

    #[test]
    fn blank_items_are_dropped() {
        let raw = RawRecipe::new(2, ["flour", "   ", "", "Sugar"]);
        assert_eq!(raw.normalized().ingredients, vec!["flour", "sugar"]);
    }
}
