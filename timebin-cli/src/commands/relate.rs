//! `timebin relate` command handler

use timebin_core::config::TimebinConfig;
use timebin_core::pipeline::Stage;
use timebin_pipeline::{FunctionRegistry, RelationRow, RelationshipAnalyzer};

use super::aggregate::tuples;
use super::{load_spec, write_rows};
use crate::cli::RelateArgs;
use crate::error::CliError;
use crate::io::{FsdbReader, open_input, open_output};
use crate::output::{OutputWriter, RowSink};

/// Execute the `relate` command.
pub async fn execute(
    args: RelateArgs,
    _config: &TimebinConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let spec = load_spec(&args.spec).await?;
    let analyzer = RelationshipAnalyzer::from_spec(
        spec.relationship_analysis()?,
        &FunctionRegistry::with_defaults(),
    )?;

    let reader = FsdbReader::new(open_input(&args.stream.input)?)?;
    let sink = RowSink::new(
        writer.format(),
        open_output(&args.stream.output_file)?,
        analyzer.header(),
    )?;
    let mut rows = analyzer.process(tuples(reader, "relationship"));
    write_rows(rows.by_ref(), sink, RelationRow::into_row, "relate")?;

    let stats = rows.stage().stats();
    tracing::info!(
        tuples = stats.tuples_in,
        bundles = stats.bundles,
        rows = stats.rows_out,
        empty = stats.rows_empty,
        "relationship analysis finished"
    );
    Ok(())
}
