//! Parse staged files into typed tables and hand them to a sink
//!
//! Tokenising is delegated to the `csv` crate. The loader's own logic is
//! header clean-up, column type inference ([`table`]) and destination
//! table naming ([`derive_table_name`]).

use std::fs::File;
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::{LoadError, ParseError};
use crate::storage::{basename, StagedFile};

pub mod sink;
pub mod table;

pub use sink::{MySqlSink, TableSink};
pub use table::{Column, ColumnType, TableBatch, Value};

/// Default namespace token for derived table names.
pub const DEFAULT_TABLE_PREFIX: &str = "table_from_";

/// Default field delimiter.
pub const DEFAULT_DELIMITER: u8 = b',';

/// `table_from_<stem>` where stem is the key's file name up to its first `.`
///
/// ```
/// use tabload::loader::derive_table_name;
/// assert_eq!(derive_table_name("table_from_", "prefix/report-2024.csv"), "table_from_report-2024");
/// ```
pub fn derive_table_name(prefix: &str, object_key: &str) -> String {
    let file_name = basename(object_key);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    format!("{}{}", prefix, stem)
}

/// Tabular parser plus load-mode policy (always full replace)
#[derive(Debug, Clone)]
pub struct TabularLoader {
    table_prefix: String,
    delimiter: u8,
}

impl Default for TabularLoader {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            delimiter: DEFAULT_DELIMITER,
        }
    }
}

impl TabularLoader {
    pub fn new(table_prefix: impl Into<String>, delimiter: u8) -> Self {
        Self {
            table_prefix: table_prefix.into(),
            delimiter,
        }
    }

    pub fn derive_table_name(&self, object_key: &str) -> String {
        derive_table_name(&self.table_prefix, object_key)
    }

    /// Parse a staged file; the batch is named after its source key
    pub fn parse(&self, staged: &StagedFile) -> Result<TableBatch, ParseError> {
        self.parse_path(&staged.local_path, self.derive_table_name(&staged.source_key))
    }

    /// Parse `path` as delimited text with a header row
    ///
    /// Blocking; run it off the async executor.
    pub fn parse_path(&self, path: &Path, table_name: String) -> Result<TableBatch, ParseError> {
        let open_err = |source| ParseError::Open {
            path: path.to_path_buf(),
            source,
        };
        let malformed = |source| ParseError::Malformed {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(open_err)?;
        if file.metadata().map_err(open_err)?.len() == 0 {
            return Err(ParseError::Empty {
                path: path.to_path_buf(),
            });
        }

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(ParseError::Empty {
                path: path.to_path_buf(),
            });
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(malformed)?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let batch = TableBatch::from_raw(table_name, headers, rows);
        debug!(
            table = %batch.name,
            columns = batch.columns.len(),
            rows = batch.row_count(),
            "Parsed {}",
            path.display()
        );
        Ok(batch)
    }

    /// Write `batch` to `sink`, replacing any prior table of the same name
    #[instrument(skip_all, fields(table = %batch.name, rows = batch.row_count()))]
    pub async fn load(&self, batch: &TableBatch, sink: &dyn TableSink) -> Result<u64, LoadError> {
        let written = sink.replace_table(batch).await?;
        debug!(written, "Table replaced");
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> StagedFile {
        let path = dir.path().join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        StagedFile {
            source_key: format!("q/{}", name),
            local_path: path,
            bytes_written: content.len() as u64,
        }
    }

    #[test]
    fn test_derive_table_name() {
        assert_eq!(
            derive_table_name(DEFAULT_TABLE_PREFIX, "prefix/report-2024.csv"),
            "table_from_report-2024"
        );
        assert_eq!(derive_table_name("table_from_", "a.csv"), "table_from_a");
        assert_eq!(derive_table_name("table_from_", "x/data.tar.gz"), "table_from_data");
        assert_eq!(derive_table_name("t_", "x/README"), "t_README");
    }

    #[test]
    fn test_derive_table_name_collision_is_allowed() {
        let loader = TabularLoader::default();
        assert_eq!(
            loader.derive_table_name("2023/sales.csv"),
            loader.derive_table_name("2024/sales.csv")
        );
    }

    #[test]
    fn test_parse_valid_csv() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "a.csv", b"id,name,score\n1,ana,9.5\n2,bea,7\n3,cris,\n");

        let batch = TabularLoader::default().parse(&staged).unwrap();
        assert_eq!(batch.name, "table_from_a");
        assert_eq!(batch.row_count(), 3);
        assert_eq!(batch.columns[0].column_type, ColumnType::Integer);
        assert_eq!(batch.columns[1].column_type, ColumnType::Text);
        assert_eq!(batch.columns[2].column_type, ColumnType::Float);
        assert_eq!(batch.rows[2][2], Value::Null);
    }

    #[test]
    fn test_parse_custom_delimiter() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "semi.csv", b"a;b\n1;2\n");

        let batch = TabularLoader::new("t_", b';').parse(&staged).unwrap();
        assert_eq!(batch.name, "t_semi");
        assert_eq!(batch.columns.len(), 2);
        assert_eq!(batch.rows[0], vec![Value::Integer(1), Value::Integer(2)]);
    }

    #[test]
    fn test_parse_header_only_is_empty_table() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "h.csv", b"id,name\n");

        let batch = TabularLoader::default().parse(&staged).unwrap();
        assert_eq!(batch.columns.len(), 2);
        assert_eq!(batch.row_count(), 0);
    }

    #[test]
    fn test_parse_empty_file_fails() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "b.csv", b"");

        let err = TabularLoader::default().parse(&staged).unwrap_err();
        assert!(matches!(err, ParseError::Empty { .. }));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_parse_ragged_rows_fail() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "r.csv", b"a,b\n1,2\n3,4,5\n");

        let err = TabularLoader::default().parse(&staged).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_invalid_utf8_fails() {
        let dir = TempDir::new().unwrap();
        let staged = write_file(&dir, "u.csv", b"a,b\n1,\xff\xfe\n");

        let err = TabularLoader::default().parse(&staged).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
    }

    #[test]
    fn test_parse_missing_file_fails() {
        let loader = TabularLoader::default();
        let err = loader
            .parse_path(Path::new("/nonexistent/tabload/x.csv"), "t".to_string())
            .unwrap_err();
        assert!(matches!(err, ParseError::Open { .. }));
    }
}
