//! Historical ridership series and the CSV loader that produces them.
//!
//! A series keeps the raw cell text of every column so that the value column
//! can be chosen (and converted to numbers) at inference time. Loading never
//! fails outward: any problem yields an empty series, which the predictor
//! reads as "data unavailable".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Timestamp layouts accepted in the timestamp column, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Cell contents read as a missing value rather than as text.
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

fn is_missing(raw: &str) -> bool {
    MISSING_MARKERS.contains(&raw.trim())
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("timestamp column '{0}' not found")]
    MissingTimestampColumn(String),
    #[error("row {row}: unparseable timestamp '{value}'")]
    BadTimestamp { row: usize, value: String },
}

/// Rule for picking the value column out of a table's headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueColumn {
    /// Header must equal the name exactly.
    Exact(String),
    /// First header (in file order) containing any of the needles,
    /// compared case-insensitively.
    ContainsAny(Vec<String>),
}

impl ValueColumn {
    pub fn matches(&self, header: &str) -> bool {
        match self {
            ValueColumn::Exact(name) => header == name,
            ValueColumn::ContainsAny(needles) => {
                let header = header.to_lowercase();
                needles
                    .iter()
                    .any(|needle| header.contains(&needle.to_lowercase()))
            }
        }
    }
}

/// One sampling interval of history.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: NaiveDateTime,
    fields: Vec<String>,
}

impl Observation {
    pub fn new(timestamp: NaiveDateTime, fields: Vec<String>) -> Self {
        Self { timestamp, fields }
    }

    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Chronologically ordered history for one granularity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    headers: Vec<String>,
    observations: Vec<Observation>,
}

/// A cell of the value column that is not a number.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("row {row}: non-numeric value '{value}'")]
pub struct NonNumeric {
    pub row: usize,
    pub value: String,
}

impl TimeSeries {
    /// Build a series, sorting observations by timestamp.
    ///
    /// The sort is stable so rows sharing a timestamp keep file order.
    pub fn new(headers: Vec<String>, mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|obs| obs.timestamp);
        Self {
            headers,
            observations,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Index of the first header accepted by `rule`.
    pub fn find_column(&self, rule: &ValueColumn) -> Option<usize> {
        self.headers.iter().position(|h| rule.matches(h))
    }

    /// Numeric values of a column in chronological order.
    ///
    /// Blank cells and the usual NA markers become `NaN`, which the
    /// forecasting pipeline treats as missing context. Thousands separators
    /// are tolerated; any other text that does not parse as a finite float is
    /// reported with its (chronological) row index.
    pub fn values(&self, column: usize) -> Result<Vec<f64>, NonNumeric> {
        self.observations
            .iter()
            .enumerate()
            .map(|(row, obs)| {
                let raw = obs.field(column).unwrap_or("");
                if is_missing(raw) {
                    return Ok(f64::NAN);
                }
                raw.trim()
                    .replace(',', "")
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| NonNumeric {
                        row,
                        value: raw.to_string(),
                    })
            })
            .collect()
    }
}

/// Something that can produce a granularity's history.
pub trait DataLoader: Send + Sync {
    /// Load the series. Failures are logged and produce an empty series.
    fn load(&self) -> TimeSeries;
}

/// Reads a headed CSV file from a fixed path.
#[derive(Debug, Clone)]
pub struct CsvDataLoader {
    path: PathBuf,
    timestamp_column: String,
}

impl CsvDataLoader {
    pub fn new(path: impl Into<PathBuf>, timestamp_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            timestamp_column: timestamp_column.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Strict variant of [`DataLoader::load`] that reports why loading failed.
    pub fn try_load(&self) -> Result<TimeSeries, LoadError> {
        let csv_err = |source| LoadError::Csv {
            path: self.path.clone(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&self.path)
            .map_err(csv_err)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_err)?
            .iter()
            .map(str::to_string)
            .collect();

        let ts_index = headers
            .iter()
            .position(|h| h == &self.timestamp_column)
            .ok_or_else(|| LoadError::MissingTimestampColumn(self.timestamp_column.clone()))?;

        let mut observations = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let raw_ts = record.get(ts_index).unwrap_or("");
            let timestamp = parse_timestamp(raw_ts).ok_or_else(|| LoadError::BadTimestamp {
                row,
                value: raw_ts.to_string(),
            })?;
            observations.push(Observation::new(
                timestamp,
                record.iter().map(str::to_string).collect(),
            ));
        }

        Ok(TimeSeries::new(headers, observations))
    }
}

impl DataLoader for CsvDataLoader {
    fn load(&self) -> TimeSeries {
        tracing::info!(path = %self.path.display(), "Loading ridership history");
        match self.try_load() {
            Ok(series) => {
                tracing::info!(
                    path = %self.path.display(),
                    records = series.len(),
                    "Ridership history loaded"
                );
                series
            }
            Err(e) => {
                tracing::error!(path = %self.path.display(), error = %e, "Failed to load ridership history");
                TimeSeries::empty()
            }
        }
    }
}

/// Loader returning a fixed series, counting how often it is asked.
#[derive(Debug, Default)]
pub struct MockDataLoader {
    series: TimeSeries,
    calls: AtomicUsize,
}

impl MockDataLoader {
    pub fn new(series: TimeSeries) -> Self {
        Self {
            series,
            calls: AtomicUsize::new(0),
        }
    }

    /// Series with one column of values at consecutive hours from 2024-01-01.
    pub fn with_column(name: &str, values: &[&str]) -> Self {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        let observations = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let ts = start + chrono::Duration::hours(i as i64);
                Observation::new(ts, vec![ts.to_string(), v.to_string()])
            })
            .collect();
        Self::new(TimeSeries::new(
            vec!["timestamp".to_string(), name.to_string()],
            observations,
        ))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DataLoader for MockDataLoader {
    fn load(&self) -> TimeSeries {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.series.clone()
    }
}

/// Parse a timestamp cell in any of the supported layouts.
///
/// Offsets in RFC 3339 values are dropped after conversion to that offset's
/// wall-clock time. Date-only values map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use chrono::{Datelike, Timelike};
    use tempfile::NamedTempFile;

    use super::*;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    // ==================== Timestamp Parsing ====================

    #[test]
    fn test_parse_timestamp_mta_hourly_format() {
        let ts = parse_timestamp("02/01/2022 05:00:00 PM").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2022, 2, 1));
        assert_eq!(ts.hour(), 17);
    }

    #[test]
    fn test_parse_timestamp_iso_and_date_only() {
        assert_eq!(parse_timestamp("2022-02-01 08:00:00").unwrap().hour(), 8);
        assert_eq!(parse_timestamp("2022-02-01T08:30:00").unwrap().minute(), 30);
        assert_eq!(parse_timestamp("2020-03-01").unwrap().hour(), 0);
        assert_eq!(parse_timestamp("03/01/2020").unwrap().month(), 3);
        assert_eq!(parse_timestamp("2022-02-01T08:00:00+02:00").unwrap().hour(), 8);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("yesterday").is_none());
        assert!(parse_timestamp("13/45/2020").is_none());
    }

    // ==================== Column Rules ====================

    #[test]
    fn test_exact_rule_is_case_sensitive() {
        let rule = ValueColumn::Exact("ridership".to_string());
        assert!(rule.matches("ridership"));
        assert!(!rule.matches("Ridership"));
        assert!(!rule.matches("ridership_total"));
    }

    #[test]
    fn test_contains_rule_is_case_insensitive() {
        let rule = ValueColumn::ContainsAny(vec!["ridership".to_string(), "total".to_string()]);
        assert!(rule.matches("Subways: Total Estimated Ridership"));
        assert!(rule.matches("TOTAL"));
        assert!(!rule.matches("Date"));
    }

    #[test]
    fn test_find_column_takes_first_match_in_file_order() {
        let series = TimeSeries::new(
            vec!["Date".into(), "Buses: Total".into(), "Subways: Ridership".into()],
            Vec::new(),
        );
        let rule = ValueColumn::ContainsAny(vec!["ridership".into(), "total".into()]);
        assert_eq!(series.find_column(&rule), Some(1));
    }

    // ==================== Loading ====================

    #[test]
    fn test_load_sorts_chronologically() {
        let file = write_csv(
            "transit_timestamp,ridership\n\
             2022-02-01 10:00:00,30\n\
             2022-02-01 08:00:00,10\n\
             2022-02-01 09:00:00,20\n",
        );
        let loader = CsvDataLoader::new(file.path(), "transit_timestamp");
        let series = loader.load();

        assert_eq!(series.len(), 3);
        let col = series.find_column(&ValueColumn::Exact("ridership".into())).unwrap();
        assert_eq!(series.values(col).unwrap(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_load_missing_file_yields_empty_series() {
        let loader = CsvDataLoader::new("/nonexistent/ridership.csv", "Date");
        assert!(loader.load().is_empty());
        assert!(matches!(loader.try_load(), Err(LoadError::Csv { .. })));
    }

    #[test]
    fn test_load_missing_timestamp_column_yields_empty_series() {
        let file = write_csv("when,ridership\n2022-02-01,10\n");
        let loader = CsvDataLoader::new(file.path(), "Date");

        assert!(loader.load().is_empty());
        assert!(matches!(
            loader.try_load(),
            Err(LoadError::MissingTimestampColumn(c)) if c == "Date"
        ));
    }

    #[test]
    fn test_load_bad_timestamp_yields_empty_series() {
        let file = write_csv("Date,total\n2020-03-01,10\nnot-a-date,20\n");
        let loader = CsvDataLoader::new(file.path(), "Date");

        assert!(loader.load().is_empty());
        assert!(matches!(
            loader.try_load(),
            Err(LoadError::BadTimestamp { row: 1, .. })
        ));
    }

    #[test]
    fn test_load_keeps_malformed_values_for_later() {
        let file = write_csv("Date,total\n2020-03-01,10\n2020-03-02,ten\n");
        let series = CsvDataLoader::new(file.path(), "Date").load();

        assert_eq!(series.len(), 2);
        assert_eq!(
            series.values(1),
            Err(NonNumeric {
                row: 1,
                value: "ten".to_string()
            })
        );
    }

    #[test]
    fn test_values_read_blank_and_na_cells_as_missing() {
        let file = write_csv(
            "Date,total\n2020-03-01,10\n2020-03-02,\n2020-03-03,NA\n2020-03-04,n/a\n\
             2020-03-05,null\n2020-03-06,NaN\n2020-03-07,40\n",
        );
        let series = CsvDataLoader::new(file.path(), "Date").load();

        let values = series.values(1).unwrap();
        assert_eq!(values.len(), 7);
        assert_eq!(values[0], 10.0);
        assert!(values[1..6].iter().all(|v| v.is_nan()));
        assert_eq!(values[6], 40.0);
    }

    #[test]
    fn test_short_row_pads_missing_trailing_field() {
        let file = write_csv("Date,mode,total\n2020-03-01,bus,10\n2020-03-02,bus\n2020-03-03,bus,30\n");
        let loader = CsvDataLoader::new(file.path(), "Date");

        let series = loader.try_load().unwrap();
        assert_eq!(series.len(), 3);

        let values = series.values(2).unwrap();
        assert_eq!(values[0], 10.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 30.0);
    }

    #[test]
    fn test_values_accept_thousands_separators() {
        let file = write_csv("Date,total\n2020-03-01,\"5,498,809\"\n");
        let series = CsvDataLoader::new(file.path(), "Date").load();

        assert_eq!(series.values(1).unwrap(), vec![5_498_809.0]);
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let file = write_csv("Date,total\n");
        let series = CsvDataLoader::new(file.path(), "Date").load();

        assert!(series.is_empty());
        assert_eq!(series.headers().len(), 2);
    }
}
