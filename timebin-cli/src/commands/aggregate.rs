//! `timebin aggregate` command handler

use timebin_core::config::TimebinConfig;
use timebin_core::error::TimebinError;
use timebin_core::pipeline::Stage;
use timebin_core::spec::{AggregatorEntry, AggregatorSpec};
use timebin_core::types::{Row, TUPLE_COLUMNS, Tuple};
use timebin_pipeline::{Aggregator, FunctionRegistry};

use super::{header, load_spec, write_rows};
use crate::cli::AggregateArgs;
use crate::error::CliError;
use crate::io::{FsdbReader, malformed, open_input, open_output};
use crate::output::{OutputWriter, RowSink};

/// Strategy used when neither a specification nor `-a` is given
const DEFAULT_STRATEGY: &str = "sum";

/// Execute the `aggregate` command.
pub async fn execute(
    args: AggregateArgs,
    _config: &TimebinConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let spec = match &args.spec {
        Some(path) => load_spec(path).await?.aggregator()?.clone(),
        None => spec_from_entries(&args.aggregators),
    };
    let aggregator = Aggregator::from_spec(&spec, &FunctionRegistry::with_defaults())?;

    let reader = FsdbReader::new(open_input(&args.stream.input)?)?;
    if reader.schema().len() < TUPLE_COLUMNS.len() {
        return Err(CliError::Data(format!(
            "aggregate expects {} columns ({}), input has {}",
            TUPLE_COLUMNS.len(),
            TUPLE_COLUMNS.join(", "),
            reader.schema().len()
        )));
    }

    let sink = RowSink::new(
        writer.format(),
        open_output(&args.stream.output_file)?,
        header(&TUPLE_COLUMNS),
    )?;
    let mut refined = aggregator.process(tuples(reader, "aggregator"));
    write_rows(refined.by_ref(), sink, Tuple::into_row, "aggregate")?;

    let stats = refined.stage().stats();
    tracing::info!(
        tuples_in = stats.tuples_in,
        tuples_out = stats.tuples_out,
        bins = stats.bins_flushed,
        "aggregation finished"
    );
    Ok(())
}

/// `-a` strategies in the `name:arg,...` short form.
pub(crate) fn spec_from_entries(entries: &[String]) -> AggregatorSpec {
    let aggregators = if entries.is_empty() {
        vec![AggregatorEntry::Short(DEFAULT_STRATEGY.to_owned())]
    } else {
        entries.iter().cloned().map(AggregatorEntry::Short).collect()
    };
    AggregatorSpec { aggregators }
}

/// Read `(timebin, index, key, subkey, value)` rows as tuples.
pub(crate) fn tuples<I>(
    rows: I,
    stage: &'static str,
) -> impl Iterator<Item = Result<Tuple, TimebinError>>
where
    I: Iterator<Item = Result<Row, TimebinError>>,
{
    rows.enumerate().map(move |(n, row)| {
        let row = row?;
        Tuple::from_row(&row).map_err(|reason| malformed(stage, n + 1, reason))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebin_core::row;

    #[test]
    fn defaults_to_summing() {
        let spec = spec_from_entries(&[]);
        assert_eq!(spec.aggregators.len(), 1);
        assert_eq!(spec.aggregators[0].to_def().function, "sum");
    }

    #[test]
    fn short_entries_keep_arguments() {
        let spec = spec_from_entries(&["sum".to_owned(), "unique:srcips,srcip_unique".to_owned()]);
        let def = spec.aggregators[1].to_def();
        assert_eq!(def.function, "unique");
        assert_eq!(def.arguments.len(), 2);
    }

    #[test]
    fn malformed_tuple_rows_name_the_row() {
        let rows = vec![
            Ok(row![60, "i", "k", "", 1]),
            Ok(row![60, "i", "k", "", "many"]),
        ];
        let parsed: Vec<_> = tuples(rows.into_iter(), "aggregator").collect();
        assert!(parsed[0].is_ok());
        let err = parsed[1].as_ref().expect_err("non-numeric value");
        assert!(err.to_string().contains("row 2"));
    }
}
