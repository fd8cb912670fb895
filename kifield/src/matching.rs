//! Case-insensitive fuzzy matching of field and column names.

use similar::TextDiff;

/// Cutoff used when culling field names against include/exclude lists.
pub const FILTER_CUTOFF: f32 = 0.6;

/// Cutoff used when deciding whether a field updates an existing workbook
/// column or gets a new one.
pub const COLUMN_CUTOFF: f32 = 0.3;

/// Similarity ratio in `[0, 1]` between two names, ignoring case.
///
/// The ratio is `2 * M / (len(a) + len(b))` where `M` counts the characters
/// of a minimal character diff, i.e. the longest common subsequence. That is
/// never lower than a longest-block matcher scores the same pair, so labels
/// sharing scattered letters can clear [`COLUMN_CUTOFF`]: `Tolerance` scores
/// 1/3 against `Footprint`.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }
    TextDiff::from_chars(a.as_str(), b.as_str()).ratio()
}

/// A candidate that scored at or above the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'c> {
    /// Position of the candidate in the input sequence.
    pub index: usize,
    pub candidate: &'c str,
    pub score: f32,
}

/// Up to `max_results` candidates scoring at least `cutoff` against `label`,
/// best first. Equal scores keep input order.
pub fn closest_matches<'c, I>(label: &str, candidates: I, max_results: usize, cutoff: f32) -> Vec<Match<'c>>
where
    I: IntoIterator<Item = &'c str>,
{
    let mut matches: Vec<Match<'c>> = candidates
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| Match {
            index,
            candidate,
            score: similarity(label, candidate),
        })
        .filter(|m| m.score >= cutoff)
        .collect();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches.truncate(max_results);
    matches
}

/// The single best candidate, if any scores at least `cutoff`.
pub fn closest_match<'c, I>(label: &str, candidates: I, cutoff: f32) -> Option<Match<'c>>
where
    I: IntoIterator<Item = &'c str>,
{
    closest_matches(label, candidates, 1, cutoff).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_ignores_case() {
        assert_eq!(similarity("Value", "value"), 1.0);
        let m = closest_match("FOOTPRINT", ["value", "footprint"], 0.9).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(m.candidate, "footprint");
    }

    #[test]
    fn test_close_spelling_matches() {
        let m = closest_match("Tolerance", ["Refs", "Value", "Tolerence"], COLUMN_CUTOFF).unwrap();
        assert_eq!(m.candidate, "Tolerence");
    }

    #[test]
    fn test_scattered_letters_near_column_cutoff() {
        let footprint = similarity("Tolerance", "Footprint");
        assert!((footprint - 1.0 / 3.0).abs() < 1e-6);
        assert!(footprint >= COLUMN_CUTOFF);
        let value = similarity("Tolerance", "Value");
        assert!((value - 2.0 / 7.0).abs() < 1e-6);
        assert!(value < COLUMN_CUTOFF);
    }

    #[test]
    fn test_nothing_above_cutoff() {
        assert!(closest_match("manufacturer", ["x", "y"], FILTER_CUTOFF).is_none());
        assert!(closest_match("anything", Vec::<&str>::new(), 0.0).is_none());
    }

    #[test]
    fn test_zero_cutoff_always_returns_best() {
        let m = closest_match("refs", ["Part", "Ref", "Qty"], 0.0).unwrap();
        assert_eq!(m.candidate, "Ref");
    }

    #[test]
    fn test_results_are_ranked_and_truncated() {
        let found = closest_matches("value", ["val", "value", "values", "xyz"], 2, 0.5);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].candidate, "value");
        assert_eq!(found[1].candidate, "values");
    }
}
