//! FSDB row streams
//!
//! The data commands read and write FSDB-style tables: a header line
//! `#fsdb -F t col1 col2 ...` followed by one row per line. `-F t` separates
//! fields with tabs; `-F s` (or no `-F`) splits on runs of whitespace.
//! Later lines starting with `#` are comments. A field written as `-` is empty.
//!
//! A file without an FSDB header is read as tab separated with the first line
//! used as the column names.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::Path;

use timebin_core::error::{StageError, TimebinError};
use timebin_core::types::{Field, Row, Schema};

use crate::error::CliError;

/// Marker written for empty fields
pub const EMPTY_FIELD: &str = "-";

/// Field separator declared by the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    Tab,
    Whitespace,
}

impl Separator {
    fn split<'a>(self, line: &'a str) -> Box<dyn Iterator<Item = &'a str> + 'a> {
        match self {
            Self::Tab => Box::new(line.split('\t')),
            Self::Whitespace => Box::new(line.split_whitespace()),
        }
    }
}

/// Open a path for reading, `-` meaning stdin.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>, CliError> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        let file = File::open(path).map_err(|e| {
            CliError::Io(io::Error::new(
                e.kind(),
                format!("cannot open {}: {e}", path.display()),
            ))
        })?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Open a path for writing, `-` meaning stdout.
pub fn open_output(path: &Path) -> Result<Box<dyn Write + Send>, CliError> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufWriter::new(io::stdout())))
    } else {
        let file = File::create(path).map_err(|e| {
            CliError::Io(io::Error::new(
                e.kind(),
                format!("cannot create {}: {e}", path.display()),
            ))
        })?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Reads rows from an FSDB stream after parsing its header.
pub struct FsdbReader<R> {
    lines: Lines<R>,
    schema: Schema,
    separator: Separator,
    line_number: usize,
}

impl<R: BufRead> FsdbReader<R> {
    /// Read the header line. An empty stream is an error.
    pub fn new(reader: R) -> Result<Self, CliError> {
        let mut lines = reader.lines();
        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(CliError::Data("input is empty (no header)".to_owned())),
            }
        };
        let (schema, separator) = parse_header(&header)?;
        tracing::debug!(columns = ?schema.columns(), ?separator, "read input header");
        Ok(Self {
            lines,
            schema,
            separator,
            line_number: 1,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn parse_row(&self, line: &str) -> Row {
        self.separator
            .split(line)
            .map(|field| match field {
                "" | EMPTY_FIELD => Field::Empty,
                text => Field::Text(text.to_owned()),
            })
            .collect()
    }
}

impl<R: BufRead> Iterator for FsdbReader<R> {
    type Item = Result<Row, TimebinError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(TimebinError::Io(e))),
            };
            self.line_number += 1;
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let row = self.parse_row(&line);
            if row.len() != self.schema.len() {
                tracing::warn!(
                    line = self.line_number,
                    fields = row.len(),
                    expected = self.schema.len(),
                    "row width differs from header"
                );
            }
            return Some(Ok(row));
        }
    }
}

/// Parse `#fsdb [-F t|s] col...` or a plain tab separated header.
pub fn parse_header(line: &str) -> Result<(Schema, Separator), CliError> {
    let Some(rest) = line.strip_prefix("#fsdb") else {
        let columns: Vec<&str> = line.split('\t').map(str::trim).collect();
        return Ok((Schema::new(columns), Separator::Tab));
    };

    let mut separator = Separator::Whitespace;
    let mut columns = Vec::new();
    let mut tokens = rest.split_whitespace();
    while let Some(token) = tokens.next() {
        match token {
            "-F" => {
                separator = match tokens.next() {
                    Some("t") => Separator::Tab,
                    Some("s" | "S" | "D") => Separator::Whitespace,
                    other => {
                        return Err(CliError::Data(format!(
                            "unsupported FSDB separator {:?}",
                            other.unwrap_or("")
                        )));
                    }
                };
            }
            _ if token.starts_with("-F") => {
                separator = if &token[2..] == "t" {
                    Separator::Tab
                } else {
                    Separator::Whitespace
                };
            }
            // 그 밖의 옵션은 무시
            _ if token.starts_with('-') => {}
            // `name:type` 형식의 타입 표시는 버림
            _ => columns.push(token.split(':').next().unwrap_or(token)),
        }
    }
    if columns.is_empty() {
        return Err(CliError::Data("FSDB header names no columns".to_owned()));
    }
    Ok((Schema::new(columns), separator))
}

/// Build the error for a row that cannot be turned into a stage input.
pub fn malformed(stage: &str, line: usize, reason: impl std::fmt::Display) -> TimebinError {
    TimebinError::Stage(StageError::Malformed {
        stage: stage.to_owned(),
        reason: format!("row {line}: {reason}"),
    })
}

/// Writes rows as a tab separated FSDB stream.
pub struct FsdbWriter<W: Write> {
    out: W,
    rows: u64,
}

impl<W: Write> FsdbWriter<W> {
    /// Write the header line.
    pub fn new<S: AsRef<str>>(mut out: W, columns: &[S]) -> io::Result<Self> {
        write!(out, "#fsdb -F t")?;
        for column in columns {
            write!(out, " {}", column.as_ref())?;
        }
        writeln!(out)?;
        Ok(Self { out, rows: 0 })
    }

    pub fn write_row(&mut self, row: &Row) -> io::Result<()> {
        let mut first = true;
        for field in row.fields() {
            if !first {
                self.out.write_all(b"\t")?;
            }
            first = false;
            if field.is_empty() {
                self.out.write_all(EMPTY_FIELD.as_bytes())?;
            } else {
                write!(self.out, "{field}")?;
            }
        }
        writeln!(self.out)?;
        self.rows += 1;
        Ok(())
    }

    /// Write a trailing comment naming the producing command and flush.
    pub fn finish(mut self, command: &str) -> io::Result<u64> {
        writeln!(self.out, "#  | timebin {command}")?;
        self.out.flush()?;
        Ok(self.rows)
    }
}
