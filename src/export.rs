/*!
 * Export of analysis results
 *
 * Result rows are plain serde types, so a single exporter handles every
 * analysis. JSON and JSON Lines accept any shape; CSV needs flat rows such as
 * [`CoverageDesertResult`](crate::data_types::CoverageDesertResult) or
 * [`ExpansionOpportunity`](crate::expansion::ExpansionOpportunity).
 */

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{ExportFormat, HomeHealthError, Result};

/// Writes a sequence of serialisable rows in one format
pub trait ResultExporter {
    fn format(&self) -> ExportFormat;

    /// Write `rows` to any sink
    fn write_rows<T: Serialize, W: Write>(&self, rows: &[T], writer: W) -> Result<()>;

    /// Write `rows` to a new file at `path`
    fn export<T: Serialize>(&self, rows: &[T], path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| HomeHealthError::Io {
            message: format!("cannot create {}", path.display()),
            source: e,
        })?;
        self.write_rows(rows, BufWriter::new(file))?;
        info!(path = %path.display(), rows = rows.len(), format = %self.format(), "exported results");
        Ok(())
    }
}

/// JSON array or JSON Lines
pub struct JsonExporter {
    pub pretty_print: bool,
    /// One compact record per line
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            pretty_print: true,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.pretty_print = false;
        self
    }
}

impl ResultExporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        if self.json_lines {
            ExportFormat::JsonLines
        } else {
            ExportFormat::Json
        }
    }

    fn write_rows<T: Serialize, W: Write>(&self, rows: &[T], writer: W) -> Result<()> {
        let mut writer = writer;
        if self.json_lines {
            for row in rows {
                serde_json::to_writer(&mut writer, row)?;
                writeln!(writer)?;
            }
        } else if self.pretty_print {
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writeln!(writer)?;
        } else {
            serde_json::to_writer(&mut writer, rows)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Delimited text with a header row taken from the field names
pub struct CsvExporter {
    pub include_headers: bool,
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }
}

impl ResultExporter for CsvExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }

    fn write_rows<T: Serialize, W: Write>(&self, rows: &[T], writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.include_headers)
            .from_writer(writer);
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Write rows in `format` to `writer`
pub fn write_rows<T: Serialize, W: Write>(rows: &[T], format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Json => JsonExporter::new().write_rows(rows, writer),
        ExportFormat::JsonLines => JsonExporter::new().as_json_lines().write_rows(rows, writer),
        ExportFormat::Csv => CsvExporter::new().write_rows(rows, writer),
    }
}

/// Write rows in `format` to a new file
pub fn export_rows<T: Serialize>(rows: &[T], format: ExportFormat, path: &Path) -> Result<()> {
    match format {
        ExportFormat::Json => JsonExporter::new().export(rows, path),
        ExportFormat::JsonLines => JsonExporter::new().as_json_lines().export(rows, path),
        ExportFormat::Csv => CsvExporter::new().export(rows, path),
    }
}

/// Write a single report.
///
/// JSON is pretty-printed; JSON Lines puts the report on one line; CSV writes
/// one row and fails for reports with nested lists.
pub fn write_report<T: Serialize, W: Write>(report: &T, format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Json => {
            let mut writer = writer;
            serde_json::to_writer_pretty(&mut writer, report)?;
            writeln!(writer)?;
            writer.flush()?;
            Ok(())
        }
        ExportFormat::JsonLines => JsonExporter::new().as_json_lines().write_rows(std::slice::from_ref(report), writer),
        ExportFormat::Csv => CsvExporter::new()
            .write_rows(std::slice::from_ref(report), writer)
            .map_err(|e| HomeHealthError::Export {
                message: format!("report cannot be written as a single CSV row: {}", e),
                format: ExportFormat::Csv,
            }),
    }
}

/// Fixed-width text table for terminal output
#[derive(Debug, Clone, Default)]
pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.as_ref().to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row; short rows are padded with blanks, extra cells dropped
    pub fn add_row(&mut self, cells: Vec<String>) {
        let mut cells = cells;
        cells.resize(self.headers.len(), String::new());
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|col| {
                self.rows
                    .iter()
                    .map(|row| row[col].chars().count())
                    .chain(std::iter::once(self.headers[col].chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = String::new();
        out.push_str(&line(&self.headers));
        out.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        out.push_str(&line(&rule));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&line(row));
            out.push('\n');
        }
        out
    }
}

/// Blank for missing values
pub fn cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Fixed-precision cell, blank for missing values
pub fn float_cell(value: Option<f64>, places: usize) -> String {
    value
        .map(|v| format!("{:.*}", places, v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Row {
        zip_code: &'static str,
        population: Option<u64>,
        score: f64,
    }

    #[derive(Serialize)]
    struct Nested {
        name: &'static str,
        items: Vec<u32>,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { zip_code: "00501", population: Some(120), score: 41.5 },
            Row { zip_code: "39201", population: None, score: 12.0 },
        ]
    }

    #[test]
    fn test_csv_rows() {
        let mut out = Vec::new();
        write_rows(&rows(), ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "zip_code,population,score");
        assert_eq!(lines[1], "00501,120,41.5");
        assert_eq!(lines[2], "39201,,12.0");
    }

    #[test]
    fn test_json_lines() {
        let mut out = Vec::new();
        write_rows(&rows(), ExportFormat::JsonLines, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let parsed: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["population"], serde_json::Value::Null);
    }

    #[test]
    fn test_export_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("rows.json");
        export_rows(&rows(), ExportFormat::Json, &path).unwrap();
        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[0]["zip_code"], "00501");
    }

    #[test]
    fn test_nested_report_rejected_as_csv() {
        let report = Nested { name: "x", items: vec![1, 2] };
        let err = write_report(&report, ExportFormat::Csv, Vec::<u8>::new()).unwrap_err();
        assert!(matches!(err, HomeHealthError::Export { format: ExportFormat::Csv, .. }));

        let mut out = Vec::new();
        write_report(&report, ExportFormat::Json, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("\"items\""));
    }

    #[test]
    fn test_text_table_alignment() {
        let mut table = TextTable::new(&["ZIP", "Score"]);
        table.add_row(vec!["00501".to_string(), float_cell(Some(41.456), 1)]);
        table.add_row(vec!["39201".to_string()]);
        let rendered = table.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "ZIP    Score");
        assert_eq!(lines[1], "-----  -----");
        assert_eq!(lines[2], "00501  41.5");
        assert_eq!(lines[3], "39201");
        assert_eq!(cell::<u32>(None), "");
    }
}
