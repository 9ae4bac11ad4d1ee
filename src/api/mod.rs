use chrono::NaiveDate;

use crate::error::FetchError;
use crate::models::{Endpoint, FetchWindow, Observation, SeriesRecord};

pub mod bcra_client;
pub use bcra_client::BcraClient;

/// Source of time series, one endpoint at a time
#[async_trait::async_trait]
pub trait SeriesProvider {
    /// Fetch one endpoint's series, normalized and restricted to `window`
    async fn fetch_series(
        &self,
        endpoint: &Endpoint,
        window: &FetchWindow,
    ) -> Result<Vec<SeriesRecord>, FetchError>;
}

/// Convert raw observations into records labelled with `concept`, keeping
/// only dates inside `window`. Order is preserved.
pub fn normalize(
    observations: Vec<Observation>,
    concept: &str,
    window: &FetchWindow,
) -> Result<Vec<SeriesRecord>, FetchError> {
    let mut records = Vec::new();
    for obs in observations {
        let date = NaiveDate::parse_from_str(obs.date.trim(), "%Y-%m-%d")
            .map_err(|_| FetchError::InvalidDate(obs.date.clone()))?;
        if window.contains(date) {
            records.push(SeriesRecord::new(date, concept, obs.value));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn window() -> FetchWindow {
        FetchWindow {
            start: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 3, 30).unwrap(),
        }
    }

    fn obs(date: &str, value: f64) -> Observation {
        Observation {
            date: date.to_string(),
            value,
        }
    }

    #[test]
    fn test_normalize_filters_and_labels() {
        let records = normalize(
            vec![
                obs("2024-03-01", 1.0),
                obs("2024-03-02", 2.0),
                obs("2024-03-30", 3.0),
                obs("2024-03-31", 4.0),
            ],
            "Dolar blue",
            &window(),
        )
        .unwrap();

        assert_eq!(
            records,
            vec![
                SeriesRecord::new(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), "Dolar blue", 2.0),
                SeriesRecord::new(NaiveDate::from_ymd_opt(2024, 3, 30).unwrap(), "Dolar blue", 3.0),
            ]
        );
    }

    #[test]
    fn test_normalize_keeps_api_order() {
        let records = normalize(
            vec![obs("2024-03-20", 1.0), obs("2024-03-10", 2.0)],
            "x",
            &window(),
        )
        .unwrap();
        assert_eq!(records[0].value, 1.0);
        assert_eq!(records[1].value, 2.0);
    }

    #[test]
    fn test_normalize_rejects_bad_date() {
        let result = normalize(vec![obs("31/03/2024", 1.0)], "x", &window());
        assert_matches!(result, Err(FetchError::InvalidDate(d)) if d == "31/03/2024");
    }
}
