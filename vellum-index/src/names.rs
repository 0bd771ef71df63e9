//! Column-name resolution and deduplication.

use rustc_hash::FxHashMap;

/// Placeholder name for column `pos` (1-based).
#[inline]
pub fn placeholder(pos: usize) -> String {
    format!("X{pos}")
}

/// Generate `X1..XC` for a headerless file.
pub fn generated(ncols: usize) -> Vec<String> {
    (1..=ncols).map(placeholder).collect()
}

/// Deterministic repair of header names: trim whitespace, substitute
/// `X{pos}` for empty names, and disambiguate duplicates by appending
/// `...{pos}`, where `pos` is the 1-based index in the original header.
/// Every member of a duplicated group gets the suffix.
pub fn dedup(raw: Vec<String>) -> Vec<String> {
    let trimmed: Vec<String> = raw
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let t = name.trim();
            if t.is_empty() {
                placeholder(i + 1)
            } else {
                t.to_string()
            }
        })
        .collect();

    let mut counts: FxHashMap<&str, usize> = FxHashMap::default();
    for name in &trimmed {
        *counts.entry(name.as_str()).or_default() += 1;
    }

    trimmed
        .iter()
        .enumerate()
        .map(|(i, name)| {
            if counts[name.as_str()] > 1 {
                format!("{name}...{}", i + 1)
            } else {
                name.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn trims_and_fills_empty_names() {
        assert_eq!(
            dedup(names(&[" a ", "", "b"])),
            names(&["a", "X2", "b"])
        );
    }

    #[test]
    fn suffixes_every_duplicate() {
        assert_eq!(
            dedup(names(&["x", "y", "x"])),
            names(&["x...1", "y", "x...3"])
        );
    }

    #[test]
    fn unique_names_pass_through() {
        assert_eq!(dedup(names(&["a", "b", "c"])), names(&["a", "b", "c"]));
    }
}
