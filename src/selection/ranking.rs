use std::collections::HashSet;

use crate::types::matrix::{FrequencyEntry, FrequencyTable};

/// Entries whose label is in `allowed`, the `n` most frequent first.
///
/// Equal frequencies keep their table order. A label listed more than once
/// counts only at its highest-ranked position.
pub fn top_by_frequency<'a>(
    table: &'a FrequencyTable,
    allowed: &HashSet<&str>,
    n: usize,
) -> Vec<&'a FrequencyEntry> {
    let mut ranked: Vec<&FrequencyEntry> = table
        .entries()
        .iter()
        .filter(|e| allowed.contains(e.ingredient.as_str()))
        .collect();
    ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency));

    debug_assert!(ranked.windows(2).all(|w| w[0].frequency >= w[1].frequency));

    let mut seen = HashSet::with_capacity(ranked.len());
    ranked.retain(|e| seen.insert(e.ingredient.as_str()));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_keep_table_order() {
        let table = FrequencyTable::from_pairs([("a", 1), ("b", 5), ("c", 5), ("d", 9)]);
        let allowed: HashSet<&str> = ["a", "b", "c", "d"].into_iter().collect();
        let top: Vec<&str> = top_by_frequency(&table, &allowed, 3)
            .into_iter()
            .map(|e| e.ingredient.as_str())
            .collect();
        assert_eq!(top, vec!["d", "b", "c"]);
    }

    #[test]
    fn filters_before_truncating() {
        let table = FrequencyTable::from_pairs([("x", 100), ("a", 2), ("b", 1)]);
        let allowed: HashSet<&str> = ["a", "b"].into_iter().collect();
        let top = top_by_frequency(&table, &allowed, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].ingredient, "a");
    }

    #[test]
    fn repeated_labels_count_once() {
        let table = FrequencyTable::from_pairs([("a", 3), ("b", 2), ("a", 1)]);
        let allowed: HashSet<&str> = ["a", "b"].into_iter().collect();
        let top: Vec<&str> = top_by_frequency(&table, &allowed, 5)
            .into_iter()
            .map(|e| e.ingredient.as_str())
            .collect();
        assert_eq!(top, vec!["a", "b"]);
    }
}
