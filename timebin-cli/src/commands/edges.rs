//! `timebin edges` command handler
//!
//! Three modes share one configuration:
//! - default: wide rows `(time, key, col...)` through the edge detector
//! - `--explode`: wide rows to long-format `(series, time, value)` rows
//! - `--grouped`: long-format rows grouped by series through a detector per series

use timebin_core::config::TimebinConfig;
use timebin_core::pipeline::Stage;
use timebin_core::spec::ArgSpec;
use timebin_edge_detect::grouped::LONG_COLUMNS;
use timebin_edge_detect::{
    EdgeDetectConfig, EdgeDetectConfigBuilder, EdgeDetector, EdgeEvent, GroupedEdgeDetector,
    LongFormat,
};

use super::{header, load_spec, write_rows};
use crate::cli::EdgesArgs;
use crate::error::CliError;
use crate::io::{FsdbReader, open_input, open_output};
use crate::output::{OutputWriter, RowSink};

/// Execute the `edges` command.
pub async fn execute(
    args: EdgesArgs,
    config: &TimebinConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let base = match &args.spec {
        Some(path) => EdgeDetectConfig::from_spec(&load_spec(path).await?, &config.defaults)?,
        None => EdgeDetectConfig {
            time_column: ArgSpec::Text(config.defaults.time_column.clone()),
            bin_size: config.defaults.bin_size,
            ..EdgeDetectConfig::default()
        },
    };
    let edge_config = apply_overrides(base, &args)?;

    let reader = FsdbReader::new(open_input(&args.stream.input)?)?;
    let out = open_output(&args.stream.output_file)?;

    if args.explode {
        let columns: Vec<String> = edge_config.column_names().map(str::to_owned).collect();
        let format = LongFormat::new(
            reader.schema(),
            &edge_config.time_column,
            &edge_config.key_column,
            &columns,
        )?;
        let sink = RowSink::new(writer.format(), out, header(&LONG_COLUMNS))?;
        let long_rows = reader.flat_map(move |row| match row {
            Ok(row) => format
                .to_long_rows(&row)
                .into_iter()
                .map(Ok)
                .collect::<Vec<_>>(),
            Err(e) => vec![Err(e)],
        });
        write_rows(long_rows, sink, |row| row, "edges --explode")?;
        return Ok(());
    }

    if args.grouped {
        let detector = GroupedEdgeDetector::new(edge_config)?;
        let sink = RowSink::new(writer.format(), out, detector.header())?;
        let mut events = detector.process(reader);
        write_rows(events.by_ref(), sink, EdgeEvent::into_row, "edges --grouped")?;
        let stats = events.stage().stats();
        tracing::info!(
            rows = stats.rows,
            skipped = stats.skipped,
            series = stats.groups,
            events = stats.events,
            "grouped edge detection finished"
        );
        return Ok(());
    }

    let detector = EdgeDetector::new(&edge_config, reader.schema())?;
    let sink = RowSink::new(writer.format(), out, detector.header())?;
    let mut events = detector.process(reader);
    write_rows(events.by_ref(), sink, EdgeEvent::into_row, "edges")?;
    let stats = events.stage().stats();
    tracing::info!(
        rows = stats.rows,
        skipped = stats.skipped,
        bins = stats.bins,
        events = stats.events,
        "edge detection finished"
    );
    Ok(())
}

/// Command-line flags win over the specification.
pub(crate) fn apply_overrides(
    base: EdgeDetectConfig,
    args: &EdgesArgs,
) -> Result<EdgeDetectConfig, CliError> {
    let mut builder = EdgeDetectConfigBuilder::from_config(base);
    if let Some(column) = &args.time_column {
        builder = builder.time_column(column.as_str());
    }
    if let Some(column) = &args.key_column {
        builder = builder.key_column(column.as_str());
    }
    if let Some(secs) = args.bin_size {
        builder = builder.bin_size(secs);
    }
    if let Some(size) = args.window_size {
        builder = builder.window_size(size);
    }
    if let Some(size) = args.middle_size {
        builder = builder.middle_size(size);
    }
    if let Some(value) = args.zero_jump {
        builder = builder.zero_jump(value);
    }
    if let Some(value) = args.scale_height {
        builder = builder.scale_height(value);
    }
    if let Some(value) = args.min_value {
        builder = builder.min_value(value);
    }
    if !args.columns.is_empty() {
        builder = builder.replace_columns(args.columns.iter().cloned());
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use timebin_core::spec::ColumnThresholds;

    fn edges_args(extra: &[&str]) -> EdgesArgs {
        let argv = ["timebin", "edges"].iter().chain(extra).copied();
        match Cli::try_parse_from(argv).expect("valid arguments").command {
            Commands::Edges(args) => args,
            _ => panic!("expected Edges command"),
        }
    }

    #[test]
    fn flags_override_specification_values() {
        let base = EdgeDetectConfigBuilder::new()
            .window_size(5)
            .zero_jump(20.0)
            .column_with(ColumnThresholds {
                name: "count".to_owned(),
                zero_jump: Some(3.0),
                ..ColumnThresholds::default()
            })
            .build()
            .expect("valid");
        let config = apply_overrides(
            base,
            &edges_args(&["-w", "2", "-z", "7", "--columns", "count,ratio", "-k", "domain"]),
        )
        .expect("valid");

        assert_eq!(config.window_size, 2);
        assert_eq!(config.zero_jump, Some(7.0));
        assert_eq!(config.key_column, ArgSpec::from("domain"));
        assert_eq!(config.column_names().collect::<Vec<_>>(), vec!["count", "ratio"]);
        // 이름이 같은 컬럼의 오버라이드는 유지됨
        assert_eq!(config.thresholds_for("count").zero_jump, Some(3.0));
        assert_eq!(config.thresholds_for("ratio").zero_jump, Some(7.0));
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = apply_overrides(EdgeDetectConfig::default(), &edges_args(&["-w", "0"]));
        assert!(result.is_err());
    }
}
