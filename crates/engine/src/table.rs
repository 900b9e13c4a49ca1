//! Delimited-text input and output.
//!
//! Input tables carry one column per input parameter plus one per validation
//! parameter, in any order. Output tables carry the input parameters followed
//! by the output parameters.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;
use tracing::warn;

use crate::config::EntityConfiguration;
use crate::error::TableError;

/// One data row of an input table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRow {
    /// One-based line number in the file (the header is line 1).
    pub line: usize,
    pub inputs: IndexMap<String, String>,
    /// Non-empty expected values for validation parameters.
    pub validations: IndexMap<String, String>,
}

/// Parse a delimiter argument. Accepts any single-byte character and the
/// escape `\t`.
pub fn parse_delimiter(delimiter: &str) -> Result<u8, TableError> {
    match delimiter {
        "\\t" => Ok(b'\t'),
        other => match other.as_bytes() {
            [byte] => Ok(*byte),
            _ => Err(TableError::InvalidDelimiter(other.to_string())),
        },
    }
}

pub fn read_input_rows_from_path(
    path: impl AsRef<Path>,
    delimiter: u8,
    configuration: &EntityConfiguration,
) -> Result<Vec<InputRow>, TableError> {
    read_input_rows(File::open(path)?, delimiter, configuration)
}

/// Read and check an input table.
///
/// # Errors
/// The header must name exactly the input and validation parameters of the
/// configuration; every row must carry a non-empty value for each input
/// parameter.
pub fn read_input_rows<R: Read>(
    reader: R,
    delimiter: u8,
    configuration: &EntityConfiguration,
) -> Result<Vec<InputRow>, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let header = reader.headers()?.clone();
    if header.is_empty() {
        return Err(TableError::MissingHeader);
    }

    let expected = configuration.input_columns();
    if header.len() != expected.len() {
        return Err(TableError::ColumnCount {
            expected,
            found: header.iter().map(str::to_string).collect(),
        });
    }

    let mut seen = IndexSet::with_capacity(header.len());
    for column in header.iter() {
        if !expected.iter().any(|name| name == column) {
            return Err(TableError::UnknownColumn(column.to_string()));
        }
        if !seen.insert(column) {
            return Err(TableError::DuplicateColumn(column.to_string()));
        }
    }

    let column_index = |name: &str| header.iter().position(|column| column == name);
    let input_columns = configuration
        .input_parameters
        .iter()
        .filter_map(|name| column_index(name.as_str()).map(|index| (name, index)))
        .collect::<Vec<_>>();
    let validation_columns = configuration
        .validation_parameters
        .iter()
        .filter_map(|name| column_index(name.as_str()).map(|index| (name, index)))
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (offset, record) in reader.records().enumerate() {
        let record = record?;
        let line = offset + 2;

        let mut inputs = IndexMap::with_capacity(input_columns.len());
        for (name, index) in &input_columns {
            match record.get(*index) {
                Some(value) if !value.is_empty() => {
                    inputs.insert((*name).clone(), value.to_string());
                }
                _ => {
                    return Err(TableError::MissingValue {
                        row: line,
                        parameter: (*name).clone(),
                    });
                }
            }
        }

        let validations = validation_columns
            .iter()
            .filter_map(|(name, index)| {
                record
                    .get(*index)
                    .filter(|value| !value.is_empty())
                    .map(|value| ((*name).clone(), value.to_string()))
            })
            .collect();

        rows.push(InputRow {
            line,
            inputs,
            validations,
        });
    }
    Ok(rows)
}

/// Render one output cell.
///
/// Absent and `null` values become empty cells, strings are written without
/// quotes and every other value is written as compact JSON.
pub fn render_cell(value: Option<&Value>) -> Result<String, serde_json::Error> {
    match value {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => serde_json::to_string(other),
    }
}

/// Result of writing rows to a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: usize,
    pub skipped: usize,
}

/// Writes a header and then rows, skipping rows the csv encoder rejects.
pub struct TableWriter<W: Write> {
    writer: csv::Writer<W>,
    outcome: WriteOutcome,
}

impl TableWriter<File> {
    pub fn create(path: impl AsRef<Path>, delimiter: u8, header: &[String]) -> Result<Self, TableError> {
        Self::new(File::create(path)?, delimiter, header)
    }
}

impl<W: Write> TableWriter<W> {
    pub fn new(inner: W, delimiter: u8, header: &[String]) -> Result<Self, TableError> {
        let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(inner);
        writer.write_record(header)?;
        Ok(Self {
            writer,
            outcome: WriteOutcome::default(),
        })
    }

    /// Write one row. I/O failures are returned; any other encoding failure
    /// is logged and the row is skipped.
    pub fn write_row(&mut self, label: &str, cells: &[String]) -> Result<(), TableError> {
        match self.writer.write_record(cells) {
            Ok(()) => self.outcome.written += 1,
            Err(error) if error.is_io_error() => return Err(error.into()),
            Err(error) => {
                warn!(entity = %label, %error, "encoding error while writing row; row skipped");
                self.outcome.skipped += 1;
            }
        }
        Ok(())
    }

    pub fn record_skipped(&mut self) {
        self.outcome.skipped += 1;
    }

    pub fn finish(mut self) -> Result<WriteOutcome, TableError> {
        self.writer.flush()?;
        Ok(self.outcome)
    }

    /// Flush and return the underlying writer together with the outcome.
    pub fn into_inner(self) -> Result<(W, WriteOutcome), TableError> {
        let outcome = self.outcome;
        let inner = self
            .writer
            .into_inner()
            .map_err(|error| TableError::Io(error.into_error()))?;
        Ok((inner, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::CallbackRegistry;
    use serde_json::json;

    fn configuration() -> EntityConfiguration {
        EntityConfiguration::from_value(
            json!({
                "name": "gh_repo_commits",
                "input_parameters": ["owner", "repo"],
                "output_parameter_mapping": {"sha": [".", ["sha"]], "message": [".", ["commit", "message"]]},
                "uri_template": "https://api.example.com/repos/{owner}/{repo}",
                "pre_request_callbacks": [],
                "post_request_callbacks": [],
                "api_key": "",
                "ignore_duplicates": false,
                "delay": [0, 0],
                "validation_parameters": ["sha"]
            }),
            &CallbackRegistry::empty(),
        )
        .expect("configuration")
    }

    #[test]
    fn reads_rows_in_any_column_order() {
        let input = "sha,repo,owner\nabc,cargo,rust-lang\n,serde,serde-rs\n";
        let rows = read_input_rows(input.as_bytes(), b',', &configuration()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].inputs.get("owner").map(String::as_str), Some("rust-lang"));
        assert_eq!(rows[0].inputs.keys().collect::<Vec<_>>(), vec!["owner", "repo"]);
        assert_eq!(rows[0].validations.get("sha").map(String::as_str), Some("abc"));
        assert!(rows[1].validations.is_empty());
    }

    #[test]
    fn reads_custom_delimiter() {
        let input = "owner;repo;sha\nrust-lang;cargo;abc\n";
        let rows = read_input_rows(input.as_bytes(), b';', &configuration()).unwrap();
        assert_eq!(rows[0].inputs.get("repo").map(String::as_str), Some("cargo"));
    }

    #[test]
    fn header_must_match_exactly() {
        let configuration = configuration();

        let error = read_input_rows("owner,repo\nrust-lang,cargo\n".as_bytes(), b',', &configuration).unwrap_err();
        assert!(matches!(error, TableError::ColumnCount { .. }));

        let error = read_input_rows("owner,repo,branch\na,b,c\n".as_bytes(), b',', &configuration).unwrap_err();
        assert!(matches!(error, TableError::UnknownColumn(column) if column == "branch"));

        let error = read_input_rows("owner,owner,repo\na,b,c\n".as_bytes(), b',', &configuration).unwrap_err();
        assert!(matches!(error, TableError::DuplicateColumn(column) if column == "owner"));

        let error = read_input_rows("".as_bytes(), b',', &configuration).unwrap_err();
        assert!(matches!(error, TableError::MissingHeader));
    }

    #[test]
    fn empty_input_value_is_fatal() {
        let error = read_input_rows("owner,repo,sha\nrust-lang,,abc\n".as_bytes(), b',', &configuration()).unwrap_err();
        match error {
            TableError::MissingValue { row, parameter } => {
                assert_eq!(row, 2);
                assert_eq!(parameter, "repo");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parses_delimiters() {
        assert_eq!(parse_delimiter(",").unwrap(), b',');
        assert_eq!(parse_delimiter("\\t").unwrap(), b'\t');
        assert!(matches!(parse_delimiter("::"), Err(TableError::InvalidDelimiter(_))));
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn renders_cells() {
        assert_eq!(render_cell(None).unwrap(), "");
        assert_eq!(render_cell(Some(&Value::Null)).unwrap(), "");
        assert_eq!(render_cell(Some(&json!("octocat"))).unwrap(), "octocat");
        assert_eq!(render_cell(Some(&json!(3.5))).unwrap(), "3.5");
        assert_eq!(render_cell(Some(&json!([{"sha": "a"}]))).unwrap(), r#"[{"sha":"a"}]"#);
    }

    #[test]
    fn writes_header_and_quoted_rows() {
        let header = vec!["id".to_string(), "name".to_string()];
        let mut writer = TableWriter::new(Vec::new(), b',', &header).unwrap();
        writer.write_row("gh_users{id=1}", &["1".to_string(), "a, b".to_string()]).unwrap();
        writer.record_skipped();

        let (bytes, outcome) = writer.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "id,name\n1,\"a, b\"\n");
        assert_eq!(outcome, WriteOutcome { written: 1, skipped: 1 });
    }
}
