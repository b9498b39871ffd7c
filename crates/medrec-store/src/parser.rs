//! Generic data file parser.
//!
//! Provides a streaming parser for tab-delimited data files with a header
//! row.

use std::fs::File;
use std::io::{BufReader, Read};
use std::marker::PhantomData;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::types::{LoadConfig, StoreError, StoreResult};

/// Trait for types that can be parsed from a data file row.
pub trait TsvRecord: Sized {
    /// Expected column names for this record type.
    const EXPECTED_COLUMNS: &'static [&'static str];

    /// Parse a record from a CSV StringRecord.
    fn from_record(record: &StringRecord) -> StoreResult<Self>;

    /// Returns true if this record passes the given load config.
    fn passes_filter(&self, config: &LoadConfig) -> bool;
}

/// A streaming parser for data files.
///
/// Rows are read one at a time; rows rejected by
/// [`TsvRecord::passes_filter`] are skipped.
pub struct TsvParser<R: Read, T: TsvRecord> {
    reader: Reader<R>,
    config: LoadConfig,
    records_read: usize,
    _marker: PhantomData<T>,
}

impl<T: TsvRecord> TsvParser<BufReader<File>, T> {
    /// Creates a new parser from a file path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or has invalid headers.
    pub fn from_path<P: AsRef<Path>>(path: P, config: LoadConfig) -> StoreResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(StoreError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), config)
    }
}

impl<R: Read, T: TsvRecord> TsvParser<R, T> {
    /// Creates a new parser from a reader.
    pub fn from_reader(reader: R, config: LoadConfig) -> StoreResult<Self> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .quoting(false)
            .trim(csv::Trim::None)
            .from_reader(reader);

        Self::validate_headers(&mut csv_reader)?;

        Ok(Self {
            reader: csv_reader,
            config,
            records_read: 0,
            _marker: PhantomData,
        })
    }

    /// Validates that the file has the expected column headers.
    fn validate_headers(reader: &mut Reader<R>) -> StoreResult<()> {
        let headers = reader.headers()?;
        let expected = T::EXPECTED_COLUMNS;

        if headers.len() < expected.len() {
            return Err(StoreError::InvalidHeader {
                expected: expected.len(),
                found: headers.len(),
            });
        }

        for (i, expected_col) in expected.iter().enumerate() {
            let found = headers.get(i).unwrap_or("");
            // Handle UTF-8 BOM at start of file
            let found = found.trim_start_matches('\u{feff}');
            if found != *expected_col {
                return Err(StoreError::UnexpectedColumn {
                    position: i,
                    expected: expected_col.to_string(),
                    found: found.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Returns the number of records read so far.
    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Parses all records into a Vec, stopping at the first malformed row.
    pub fn parse_all(self) -> StoreResult<Vec<T>> {
        self.collect()
    }

    /// Parses records in batches, calling the callback for each batch.
    pub fn parse_batched<F>(mut self, mut callback: F) -> StoreResult<usize>
    where
        F: FnMut(Vec<T>) -> StoreResult<()>,
    {
        let batch_size = self.config.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0;

        for record in self.by_ref() {
            batch.push(record?);
            if batch.len() >= batch_size {
                total += batch.len();
                callback(std::mem::replace(&mut batch, Vec::with_capacity(batch_size)))?;
            }
        }

        if !batch.is_empty() {
            total += batch.len();
            callback(batch)?;
        }

        Ok(total)
    }
}

impl<R: Read, T: TsvRecord> Iterator for TsvParser<R, T> {
    type Item = StoreResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut record = StringRecord::new();
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    self.records_read += 1;

                    // Skip empty records
                    if record.is_empty() || record.iter().all(|f| f.trim().is_empty()) {
                        continue;
                    }

                    match T::from_record(&record) {
                        Ok(parsed) => {
                            if parsed.passes_filter(&self.config) {
                                return Some(Ok(parsed));
                            }
                            tracing::trace!(row = self.records_read, "skipping filtered row");
                            continue;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

/// Helper functions for parsing field values.
///
/// Functions prefixed with `optional_` map an empty field to `None`.
pub mod parse {
    use chrono::{NaiveDate, NaiveDateTime};
    use csv::StringRecord;

    use crate::types::{StoreError, StoreResult};

    /// Returns the trimmed field at `index`, or "" when the row is short.
    pub fn field(record: &StringRecord, index: usize) -> &str {
        record.get(index).unwrap_or("").trim()
    }

    /// Parses an identifier.
    pub fn id(value: &str) -> StoreResult<u32> {
        value.parse::<u32>().map_err(|_| StoreError::InvalidId {
            value: value.to_string(),
        })
    }

    /// Parses an optional identifier.
    pub fn optional_id(value: &str) -> StoreResult<Option<u32>> {
        if value.is_empty() {
            return Ok(None);
        }
        id(value).map(Some)
    }

    /// Parses a boolean from "0" or "1". An empty field is false.
    pub fn boolean(value: &str) -> StoreResult<bool> {
        match value {
            "0" | "" => Ok(false),
            "1" => Ok(true),
            _ => Err(StoreError::InvalidBoolean {
                value: value.to_string(),
            }),
        }
    }

    /// Parses a `YYYY-MM-DD` date.
    pub fn date(value: &str) -> StoreResult<NaiveDate> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| StoreError::InvalidDate {
            value: value.to_string(),
        })
    }

    /// Parses an optional date.
    pub fn optional_date(value: &str) -> StoreResult<Option<NaiveDate>> {
        if value.is_empty() {
            return Ok(None);
        }
        date(value).map(Some)
    }

    /// Parses a datetime (`YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS`, or a
    /// bare date meaning midnight).
    pub fn datetime(value: &str) -> StoreResult<NaiveDateTime> {
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(parsed);
            }
        }
        date(value)?
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| StoreError::InvalidDate {
                value: value.to_string(),
            })
    }

    /// Parses an optional datetime.
    pub fn optional_datetime(value: &str) -> StoreResult<Option<NaiveDateTime>> {
        if value.is_empty() {
            return Ok(None);
        }
        datetime(value).map(Some)
    }

    /// Parses a decimal number.
    pub fn decimal(value: &str) -> StoreResult<f64> {
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| StoreError::InvalidNumber {
                value: value.to_string(),
            })
    }

    /// Parses an optional decimal number.
    pub fn optional_decimal(value: &str) -> StoreResult<Option<f64>> {
        if value.is_empty() {
            return Ok(None);
        }
        decimal(value).map(Some)
    }

    /// Returns `None` for an empty field, the owned text otherwise.
    pub fn optional_text(value: &str) -> Option<String> {
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[derive(Debug, PartialEq)]
    struct Pair {
        id: u32,
        voided: bool,
    }

    impl TsvRecord for Pair {
        const EXPECTED_COLUMNS: &'static [&'static str] = &["id", "voided"];

        fn from_record(record: &StringRecord) -> StoreResult<Self> {
            Ok(Pair {
                id: parse::id(parse::field(record, 0))?,
                voided: parse::boolean(parse::field(record, 1))?,
            })
        }

        fn passes_filter(&self, config: &LoadConfig) -> bool {
            config.include_voided || !self.voided
        }
    }

    #[test]
    fn test_parser_skips_voided_and_blank_rows() {
        let data = "id\tvoided\n1\t0\n\n2\t1\n3\t0\n";
        let parser =
            TsvParser::<_, Pair>::from_reader(data.as_bytes(), LoadConfig::default()).unwrap();
        let rows = parser.parse_all().unwrap();
        assert_eq!(rows.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_parser_keeps_voided_when_configured() {
        let data = "id\tvoided\n1\t0\n2\t1\n";
        let config = LoadConfig {
            include_voided: true,
            ..Default::default()
        };
        let rows = TsvParser::<_, Pair>::from_reader(data.as_bytes(), config)
            .unwrap()
            .parse_all()
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_parser_rejects_wrong_header() {
        let data = "identifier\tvoided\n1\t0\n";
        let err = TsvParser::<_, Pair>::from_reader(data.as_bytes(), LoadConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::UnexpectedColumn { position: 0, .. }));

        let data = "id\n1\n";
        let err = TsvParser::<_, Pair>::from_reader(data.as_bytes(), LoadConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::InvalidHeader { expected: 2, found: 1 }));
    }

    #[test]
    fn test_parser_propagates_bad_row() {
        let data = "id\tvoided\n1\t0\nx\t0\n";
        let result = TsvParser::<_, Pair>::from_reader(data.as_bytes(), LoadConfig::default())
            .unwrap()
            .parse_all();
        assert!(matches!(result, Err(StoreError::InvalidId { .. })));
    }

    #[test]
    fn test_parse_batched() {
        let data = "id\tvoided\n1\t0\n2\t0\n3\t0\n";
        let config = LoadConfig {
            batch_size: 2,
            ..Default::default()
        };
        let mut batches = Vec::new();
        let total = TsvParser::<_, Pair>::from_reader(data.as_bytes(), config)
            .unwrap()
            .parse_batched(|batch| {
                batches.push(batch.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(batches, vec![2, 1]);
    }

    #[test]
    fn test_parse_dates() {
        assert_eq!(
            parse::date("2024-02-29").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(parse::date("20240229").is_err());
        assert_eq!(parse::optional_date("").unwrap(), None);

        let midnight = parse::datetime("2024-01-02").unwrap();
        assert_eq!(
            midnight,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(
            parse::datetime("2024-01-02 10:30:00").unwrap(),
            parse::datetime("2024-01-02T10:30:00").unwrap()
        );
        assert!(parse::datetime("yesterday").is_err());
    }

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse::id("42").unwrap(), 42);
        assert!(parse::id("-1").is_err());
        assert_eq!(parse::optional_id("").unwrap(), None);
        assert!(parse::boolean("1").unwrap());
        assert!(!parse::boolean("").unwrap());
        assert!(parse::boolean("yes").is_err());
        assert_eq!(parse::decimal("3.5").unwrap(), 3.5);
        assert!(parse::decimal("NaN").is_err());
        assert_eq!(parse::optional_text(""), None);
    }
}
