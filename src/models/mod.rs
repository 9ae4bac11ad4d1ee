use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

/// Civil timezone the upstream series are published in
pub const SOURCE_TZ: Tz = chrono_tz::America::Buenos_Aires;

/// Default number of days the trailing window looks back
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// One upstream series and the label its rows are stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    pub concept: &'static str,
}

impl Endpoint {
    pub const fn new(path: &'static str, concept: &'static str) -> Self {
        Self { path, concept }
    }
}

/// Series loaded on every run, in load order
pub const ENDPOINTS: [Endpoint; 6] = [
    Endpoint::new("/plazo_fijo", "Plazos fijos (m)"),
    Endpoint::new("/depositos", "Depositos (m)"),
    Endpoint::new("/cajas_ahorro", "Cajas Ahorro (m)"),
    Endpoint::new("/cuentas_corrientes", "Cuentas corrientes (m)"),
    Endpoint::new("/usd", "Dolar blue"),
    Endpoint::new("/usd_of", "Dolar oficial"),
];

/// Look up a configured endpoint by its path
pub fn find_endpoint(path: &str) -> Option<Endpoint> {
    ENDPOINTS.iter().copied().find(|e| e.path == path)
}

/// API observation as returned on the wire: `{"d": "2024-01-31", "v": 812.5}`
#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    #[serde(rename = "d")]
    pub date: String,
    #[serde(rename = "v")]
    pub value: f64,
}

/// Normalized row: (Date, Concept, Value)
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRecord {
    pub date: NaiveDate,
    pub concept: String,
    pub value: f64,
}

impl SeriesRecord {
    pub fn new(date: NaiveDate, concept: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            concept: concept.into(),
            value,
        }
    }
}

/// Inclusive range of dates kept from each series.
///
/// The bounds are the instants `now - lookback` and `now - 1 day` in the source
/// timezone. A record is kept when local midnight of its date falls between them,
/// so with a 30 day look-back the kept dates are `today - 29 ..= today - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl FetchWindow {
    /// Window for the given local wall-clock time
    pub fn trailing(now: NaiveDateTime, lookback_days: u32) -> Self {
        let lower = now - Duration::days(i64::from(lookback_days));
        let upper = now - Duration::days(1);

        let start = if lower.time() == NaiveTime::MIN {
            lower.date()
        } else {
            lower.date() + Duration::days(1)
        };

        Self {
            start,
            end: upper.date(),
        }
    }

    /// Window for an instant, evaluated in the source timezone
    pub fn at(now: DateTime<Utc>, lookback_days: u32) -> Self {
        Self::trailing(now.with_timezone(&SOURCE_TZ).naive_local(), lookback_days)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Aggregated rows ready for loading, column order (Date, Concept, Value)
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    rows: Vec<SeriesRecord>,
}

impl SeriesTable {
    pub const COLUMNS: [&'static str; 3] = ["Date", "Concept", "Value"];

    pub(crate) fn from_rows(rows: Vec<SeriesRecord>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[SeriesRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Earliest and latest date present
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|r| r.date).min()?;
        let max = self.rows.iter().map(|r| r.date).max()?;
        Some((min, max))
    }

    /// Distinct concepts in first-seen order
    pub fn concepts(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.concept.as_str()) {
                seen.push(row.concept.as_str());
            }
        }
        seen
    }
}

impl fmt::Display for SeriesTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index_width = self.rows.len().saturating_sub(1).to_string().len();
        let concept_width = self
            .rows
            .iter()
            .map(|r| r.concept.chars().count())
            .chain(std::iter::once(Self::COLUMNS[1].len()))
            .max()
            .unwrap_or_default();

        writeln!(
            f,
            "{:>iw$}  {:<10}  {:<cw$}  {:>14}",
            "",
            Self::COLUMNS[0],
            Self::COLUMNS[1],
            Self::COLUMNS[2],
            iw = index_width,
            cw = concept_width,
        )?;
        for (index, row) in self.rows.iter().enumerate() {
            writeln!(
                f,
                "{:>iw$}  {}  {:<cw$}  {:>14.2}",
                index,
                row.date,
                row.concept,
                row.value,
                iw = index_width,
                cw = concept_width,
            )?;
        }
        write!(f, "[{} rows x {} columns]", self.rows.len(), Self::COLUMNS.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trailing_window_excludes_today_and_thirtieth_day() {
        let now = date(2024, 3, 31).and_hms_opt(14, 30, 0).unwrap();
        let window = FetchWindow::trailing(now, 30);

        assert_eq!(window.start, date(2024, 3, 2));
        assert_eq!(window.end, date(2024, 3, 30));
        assert_eq!(window.days_count(), 29);
        assert!(!window.contains(date(2024, 3, 1)));
        assert!(!window.contains(date(2024, 3, 31)));
    }

    #[test]
    fn test_trailing_window_at_exact_midnight_includes_lower_bound() {
        let now = date(2024, 3, 31).and_hms_opt(0, 0, 0).unwrap();
        let window = FetchWindow::trailing(now, 30);

        assert_eq!(window.start, date(2024, 3, 1));
        assert_eq!(window.end, date(2024, 3, 30));
    }

    #[test]
    fn test_window_uses_buenos_aires_date() {
        // 02:00 UTC on Apr 1 is still Mar 31 in Buenos Aires (UTC-3)
        let now = Utc.with_ymd_and_hms(2024, 4, 1, 2, 0, 0).unwrap();
        let window = FetchWindow::at(now, 30);

        assert_eq!(window.end, date(2024, 3, 30));
    }

    #[test]
    fn test_find_endpoint() {
        assert_eq!(find_endpoint("/usd").map(|e| e.concept), Some("Dolar blue"));
        assert!(find_endpoint("/nope").is_none());
    }

    #[test]
    fn test_observation_uses_wire_names() {
        let obs: Vec<Observation> =
            serde_json::from_str(r#"[{"d": "2024-01-31", "v": 812.5}]"#).unwrap();
        assert_eq!(obs[0].date, "2024-01-31");
        assert_eq!(obs[0].value, 812.5);
    }

    #[test]
    fn test_table_display_has_header_and_index() {
        let table = SeriesTable::from_rows(vec![
            SeriesRecord::new(date(2024, 3, 1), "Dolar blue", 1000.0),
            SeriesRecord::new(date(2024, 3, 2), "Dolar blue", 1010.5),
        ]);
        let text = table.to_string();

        assert!(text.lines().next().unwrap().contains("Concept"));
        assert!(text.contains("1  2024-03-02  Dolar blue"));
        assert!(text.ends_with("[2 rows x 3 columns]"));
    }
}
