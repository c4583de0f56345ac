//! Command handlers -- one module per subcommand

pub mod aggregate;
pub mod config;
pub mod count;
pub mod edges;
pub mod functions;
pub mod relate;
pub mod run;

use std::io::Write;
use std::path::Path;

use tracing::info;

use timebin_core::error::TimebinError;
use timebin_core::spec::AnalysisSpec;
use timebin_core::types::Row;

use crate::error::CliError;
use crate::output::RowSink;

/// Load an analysis specification file.
pub(crate) async fn load_spec(path: &Path) -> Result<AnalysisSpec, CliError> {
    info!(path = %path.display(), "loading analysis specification");
    Ok(AnalysisSpec::from_file(path).await?)
}

/// Write every stage output to the sink. The first error stops the stream.
pub(crate) fn write_rows<I, T, W>(
    items: I,
    mut sink: RowSink<W>,
    into_row: impl Fn(T) -> Row,
    command: &str,
) -> Result<u64, CliError>
where
    I: Iterator<Item = Result<T, TimebinError>>,
    W: Write,
{
    for item in items {
        sink.write_row(&into_row(item?))?;
    }
    let rows = sink.finish(command)?;
    info!(command, rows, "output written");
    Ok(rows)
}

/// Owned column names for a fixed header.
pub(crate) fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| (*c).to_owned()).collect()
}
