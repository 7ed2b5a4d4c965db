//! Aggregation helpers shared by the dashboard, analytics, and export
//! endpoints. Counting itself is pushed into SQL; what lives here is the
//! arithmetic and predicate plumbing that has to behave identically
//! everywhere it is used.

/// Resolution rate as a percentage rounded to two decimal places.
///
/// Returns `0.0` when no cases are assigned; a zero denominator is a normal
/// state for a new officer, not an error.
pub fn resolution_rate(resolved: i64, assigned: i64) -> f64 {
    if assigned <= 0 {
        return 0.0;
    }
    #[expect(clippy::cast_precision_loss, reason = "case counts are small")]
    let rate = resolved as f64 / assigned as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// Turn a raw search term into a `LIKE` pattern for substring containment,
/// escaping the wildcard characters so user input matches literally. Pair
/// with `ESCAPE '\'` in the query.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_rate_rounds_to_two_places() {
        assert!((resolution_rate(2, 3) - 66.67).abs() < f64::EPSILON);
        assert!((resolution_rate(1, 2) - 50.0).abs() < f64::EPSILON);
        assert!((resolution_rate(3, 3) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn resolution_rate_zero_denominator() {
        assert!(resolution_rate(0, 0).abs() < f64::EPSILON);
        assert!(resolution_rate(5, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("theft"), "%theft%");
        assert_eq!(like_pattern("100%"), "%100\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
    }
}
