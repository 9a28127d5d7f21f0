pub mod images;
pub mod patients;
pub mod predictions;
pub mod users;

/// Build an `ILIKE` pattern matching `term` as a literal substring.
pub(crate) fn contains_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
