//! `timebin count` command handler

use timebin_core::config::TimebinConfig;
use timebin_core::pipeline::Stage;
use timebin_core::spec::{AnalysisSpec, ArgSpec, FeatureCounterSpec, OutputSpec};
use timebin_core::types::{TUPLE_COLUMNS, Tuple};
use timebin_pipeline::{CounterConfig, CounterConfigBuilder, FeatureCounter, FunctionRegistry, ReleaseMode};

use super::{header, load_spec, write_rows};
use crate::cli::CountArgs;
use crate::error::CliError;
use crate::io::{FsdbReader, open_input, open_output};
use crate::output::{OutputWriter, RowSink};

/// Execute the `count` command.
pub async fn execute(
    args: CountArgs,
    config: &TimebinConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let spec = match &args.spec {
        Some(path) => load_spec(path).await?,
        None => AnalysisSpec {
            feature_counter: Some(spec_from_indices(&args.indices)?),
            ..AnalysisSpec::default()
        },
    };
    let counter_config = counter_config(&spec, config, &args)?;

    let reader = FsdbReader::new(open_input(&args.stream.input)?)?;
    let registry = FunctionRegistry::with_defaults();
    let counter = FeatureCounter::new(
        counter_config,
        spec.feature_counter()?,
        reader.schema(),
        &registry,
    )?;

    let sink = RowSink::new(
        writer.format(),
        open_output(&args.stream.output_file)?,
        header(&TUPLE_COLUMNS),
    )?;
    let mut tuples = counter.process(reader);
    write_rows(tuples.by_ref(), sink, Tuple::into_row, "count")?;

    let stats = tuples.stage().stats();
    tracing::info!(
        rows = stats.rows,
        filtered = stats.filtered,
        skipped = stats.skipped,
        tuples = stats.tuples_out,
        "feature counting finished"
    );
    Ok(())
}

/// Specification values, overridden by command-line flags.
fn counter_config(
    spec: &AnalysisSpec,
    config: &TimebinConfig,
    args: &CountArgs,
) -> Result<CounterConfig, CliError> {
    let base = CounterConfig::from_spec(spec, &config.defaults);
    let mut builder = CounterConfigBuilder::new()
        .time_column(base.time_column)
        .bin_size(base.bin_size)
        .mode(if args.bulk {
            ReleaseMode::Bulk
        } else {
            ReleaseMode::Incremental
        });
    if let Some(column) = &args.time_column {
        builder = builder.time_column(column.as_str());
    }
    if let Some(secs) = args.bin_size {
        builder = builder.bin_size(secs);
    }
    Ok(builder.build()?)
}

/// Build a `featureCounter` section from `-s` definitions.
pub(crate) fn spec_from_indices(indices: &[String]) -> Result<FeatureCounterSpec, CliError> {
    if indices.is_empty() {
        return Err(CliError::Config(
            "either --spec or at least one --index is required".to_owned(),
        ));
    }
    let outputs = indices
        .iter()
        .map(|definition| parse_index(definition))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FeatureCounterSpec {
        filters: Vec::new(),
        outputs,
    })
}

/// Parse `name:function[:arg,...[:value[:arg,...]]]`.
///
/// Arguments containing `:` or `,` need a specification file.
pub(crate) fn parse_index(definition: &str) -> Result<(String, OutputSpec), CliError> {
    let mut parts = definition.split(':');
    let name = parts.next().unwrap_or_default();
    let function = parts.next().unwrap_or_default();
    if name.is_empty() || function.is_empty() {
        return Err(CliError::Config(format!(
            "index '{definition}' must be name:function[:args[:value[:args]]]"
        )));
    }
    let arguments = split_args(parts.next());
    let mut output = OutputSpec::new(function, arguments);
    if let Some(value) = parts.next().filter(|v| !v.is_empty()) {
        output = output.with_value(value, split_args(parts.next()));
    }
    if parts.next().is_some() {
        return Err(CliError::Config(format!(
            "index '{definition}' has too many ':' separated parts"
        )));
    }
    Ok((name.to_owned(), output))
}

fn split_args(list: Option<&str>) -> Vec<ArgSpec> {
    list.unwrap_or_default()
        .split(',')
        .filter(|a| !a.is_empty())
        .map(ArgSpec::from)
        .collect()
}
