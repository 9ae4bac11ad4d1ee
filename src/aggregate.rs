use crate::models::{SeriesRecord, SeriesTable};

/// Concatenate per-endpoint contributions in input order.
///
/// Empty contributions are dropped. Returns `None` when nothing is left, in which
/// case there is no table to load.
pub fn aggregate(contributions: Vec<Vec<SeriesRecord>>) -> Option<SeriesTable> {
    let rows: Vec<SeriesRecord> = contributions
        .into_iter()
        .filter(|c| !c.is_empty())
        .flatten()
        .collect();

    if rows.is_empty() {
        None
    } else {
        Some(SeriesTable::from_rows(rows))
    }
}
