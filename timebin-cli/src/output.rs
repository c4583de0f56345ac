//! Output formatting abstraction for text vs JSON rendering
//!
//! Reports (config, function listings) flow through [`OutputWriter`].
//! Data rows flow through [`RowSink`], which writes FSDB for `text` and one
//! JSON object per line for `json`.

use std::io::Write;

use serde::Serialize;
use serde_json::{Map, Value};

use timebin_core::types::{Field, Row};

use crate::cli::OutputFormat;
use crate::error::CliError;
use crate::io::FsdbWriter;

/// Abstraction for writing CLI reports in different formats.
pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Render a payload to stdout.
    ///
    /// For `Text` format, delegates to `Render::render_text()`.
    /// For `Json` format, serialises via `serde_json`.
    pub fn render<T: Render + Serialize>(&self, payload: &T) -> Result<(), CliError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        match self.format {
            OutputFormat::Text => {
                payload.render_text(&mut handle)?;
            }
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut handle, payload)?;
                writeln!(handle)?;
            }
        }
        Ok(())
    }
}

/// Trait for human-readable text rendering.
///
/// Implemented by every CLI report payload alongside `serde::Serialize`.
pub trait Render {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()>;
}

/// Destination for data rows.
pub enum RowSink<W: Write> {
    Fsdb(FsdbWriter<W>),
    Json {
        out: W,
        columns: Vec<String>,
        rows: u64,
    },
}

impl<W: Write> RowSink<W> {
    pub fn new(format: OutputFormat, out: W, columns: Vec<String>) -> Result<Self, CliError> {
        Ok(match format {
            OutputFormat::Text => Self::Fsdb(FsdbWriter::new(out, columns.as_slice())?),
            OutputFormat::Json => Self::Json {
                out,
                columns,
                rows: 0,
            },
        })
    }

    pub fn write_row(&mut self, row: &Row) -> Result<(), CliError> {
        match self {
            Self::Fsdb(writer) => writer.write_row(row)?,
            Self::Json { out, columns, rows } => {
                serde_json::to_writer(&mut *out, &row_object(columns, row))?;
                writeln!(out)?;
                *rows += 1;
            }
        }
        Ok(())
    }

    /// Flush and return the number of rows written.
    pub fn finish(self, command: &str) -> Result<u64, CliError> {
        match self {
            Self::Fsdb(writer) => Ok(writer.finish(command)?),
            Self::Json { mut out, rows, .. } => {
                out.flush()?;
                Ok(rows)
            }
        }
    }
}

/// `{column: value}` for one row. Extra fields get positional names.
fn row_object(columns: &[String], row: &Row) -> Map<String, Value> {
    row.fields()
        .iter()
        .enumerate()
        .map(|(pos, field)| {
            let name = columns
                .get(pos)
                .cloned()
                .unwrap_or_else(|| format!("col{pos}"));
            (name, field_value(field))
        })
        .collect()
}

fn field_value(field: &Field) -> Value {
    match field {
        Field::Int(n) => Value::from(*n),
        Field::Float(x) => serde_json::Number::from_f64(*x).map_or(Value::Null, Value::Number),
        Field::Text(s) if s.is_empty() => Value::Null,
        Field::Text(s) => Value::String(s.clone()),
        Field::Empty => Value::Null,
    }
}
