//! Statement text helpers.
//!
//! Inputs are always names taken from a `TableSchema`; quoting still escapes
//! embedded double quotes since catalog names may legally contain them.

use crate::catalog::ColumnDescriptor;

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Comma-separated quoted column list; `1` for an empty projection so the
/// statement stays well-formed and still reports row presence.
pub(crate) fn select_list(columns: &[&ColumnDescriptor]) -> String {
    if columns.is_empty() {
        return "1".to_string();
    }
    columns
        .iter()
        .map(|column| quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `?1, ?2, ...` starting at `first`.
pub(crate) fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}
