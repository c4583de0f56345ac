//! `timebin run` command handler
//!
//! Runs every section of a specification as a concurrent pipeline:
//!
//! ```text
//! reader (blocking) -> counter -> [aggregator] -> [relationship] -> sink
//! ```
//!
//! Each stage is a tokio task connected by bounded channels. Ctrl-C cancels
//! the pipeline; stages discard their in-flight bins and report how many.

use std::io::Write;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use timebin_core::config::TimebinConfig;
use timebin_core::error::TimebinError;
use timebin_core::types::{Row, TUPLE_COLUMNS, Tuple};
use timebin_pipeline::runner::Item;
use timebin_pipeline::{
    Aggregator, CounterConfig, FeatureCounter, FunctionRegistry, RelationRow,
    RelationshipAnalyzer, ReleaseMode, RunOutcome, RunReport, spawn_stage,
};

use super::{header, load_spec};
use crate::cli::RunArgs;
use crate::error::CliError;
use crate::io::{FsdbReader, open_input, open_output};
use crate::output::{OutputWriter, RowSink};

type StageHandle = JoinHandle<Result<RunReport, TimebinError>>;

/// Execute the `run` command.
pub async fn execute(
    args: RunArgs,
    config: &TimebinConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let spec = load_spec(&args.spec).await?;
    let registry = FunctionRegistry::with_defaults();

    let reader = FsdbReader::new(open_input(&args.stream.input)?)?;
    let schema = reader.schema().clone();

    let mut counter_config = CounterConfig::from_spec(&spec, &config.defaults);
    counter_config.mode = if args.bulk {
        ReleaseMode::Bulk
    } else {
        ReleaseMode::Incremental
    };

    // 모든 스테이지를 행을 읽기 전에 구성해 설정 에러를 먼저 드러냄
    let counter = FeatureCounter::new(counter_config, spec.feature_counter()?, &schema, &registry)?;
    let aggregator = spec
        .aggregator
        .as_ref()
        .map(|section| Aggregator::from_spec(section, &registry))
        .transpose()?;
    let analyzer = spec
        .relationship_analysis
        .as_ref()
        .map(|section| RelationshipAnalyzer::from_spec(section, &registry))
        .transpose()?;

    let capacity = config.defaults.channel_capacity;
    let cancel = CancellationToken::new();
    let mut handles: Vec<StageHandle> = Vec::new();

    let (rows_tx, rows_rx) = mpsc::channel(capacity.max(1));
    let feeder = tokio::task::spawn_blocking(move || feed(reader, rows_tx));

    let (handle, mut tuples_rx) = spawn_stage(counter, rows_rx, capacity, cancel.clone());
    handles.push(handle);
    if let Some(aggregator) = aggregator {
        let (handle, refined_rx) = spawn_stage(aggregator, tuples_rx, capacity, cancel.clone());
        handles.push(handle);
        tuples_rx = refined_rx;
    }

    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling pipeline");
                cancel.cancel();
            }
        })
    };

    let out = open_output(&args.stream.output_file)?;
    let drained = match analyzer {
        Some(analyzer) => {
            let sink = RowSink::new(writer.format(), out, analyzer.header())?;
            let (handle, rows_rx) = spawn_stage(analyzer, tuples_rx, capacity, cancel.clone());
            handles.push(handle);
            drain(rows_rx, sink, RelationRow::into_row).await
        }
        None => {
            let sink = RowSink::new(writer.format(), out, header(&TUPLE_COLUMNS))?;
            drain(tuples_rx, sink, Tuple::into_row).await
        }
    };
    if drained.is_err() {
        cancel.cancel();
    }

    let mut discarded = 0;
    let mut join_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(report)) => {
                info!(
                    stage = report.stage,
                    received = report.received,
                    emitted = report.emitted,
                    outcome = ?report.outcome,
                    "stage finished"
                );
                if let RunOutcome::Cancelled { discarded: n } = report.outcome {
                    discarded += n;
                }
            }
            Ok(Err(e)) => {
                join_error.get_or_insert(CliError::from(e));
            }
            Err(e) => {
                join_error.get_or_insert(CliError::Command(format!("stage task failed: {e}")));
            }
        }
    }
    interrupt.abort();
    // 리더는 하류 채널이 닫히면 스스로 멈춤
    if let Err(e) = feeder.await {
        warn!(error = %e, "reader task failed");
    }

    // 출력 에러가 스테이지 에러보다 원인에 가까움
    let rows = drained?;
    if let Some(e) = join_error {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(CliError::Command(format!(
            "interrupted: discarded {discarded} in-flight slots"
        )));
    }
    info!(rows, "pipeline finished");
    Ok(())
}

/// Send every input row into the pipeline. Stops after the first error or
/// when the counter stage has gone away.
fn feed<R>(reader: FsdbReader<R>, tx: mpsc::Sender<Item<Row>>)
where
    R: std::io::BufRead,
{
    for row in reader {
        let failed = row.is_err();
        if tx.blocking_send(row).is_err() || failed {
            break;
        }
    }
}

/// Write everything the last stage emits. The first error stops the drain.
async fn drain<T, W>(
    mut rx: mpsc::Receiver<Item<T>>,
    mut sink: RowSink<W>,
    into_row: impl Fn(T) -> Row,
) -> Result<u64, CliError>
where
    W: Write,
{
    while let Some(item) = rx.recv().await {
        sink.write_row(&into_row(item?))?;
    }
    Ok(sink.finish("run")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn feed_sends_every_row() {
        let input = "#fsdb -F t time qname\n60\ta.example\n120\tb.example\n";
        let reader = FsdbReader::new(Cursor::new(input.as_bytes().to_vec())).expect("header");
        let (tx, mut rx) = mpsc::channel(8);
        feed(reader, tx);

        let times: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|row| row.expect("ok").text(0).into_owned())
            .collect();
        assert_eq!(times, vec!["60", "120"]);
    }

    #[tokio::test]
    async fn drain_writes_rows_and_reports_count() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Tuple::new(60, "count", "a", "", 2.0)))
            .await
            .expect("send");
        tx.send(Ok(Tuple::new(60, "count", "b", "", 1.0)))
            .await
            .expect("send");
        drop(tx);

        let mut buf = Vec::new();
        let sink = RowSink::new(
            crate::cli::OutputFormat::Text,
            &mut buf,
            header(&TUPLE_COLUMNS),
        )
        .expect("sink");
        let rows = drain(rx, sink, Tuple::into_row).await.expect("drain");
        assert_eq!(rows, 2);
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.contains("count\ta"));
    }

    #[tokio::test]
    async fn drain_stops_on_upstream_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Err(TimebinError::Io(std::io::Error::other("read failed"))))
            .await
            .expect("send");
        drop(tx);

        let sink = RowSink::new(
            crate::cli::OutputFormat::Text,
            Vec::new(),
            header(&TUPLE_COLUMNS),
        )
        .expect("sink");
        let result = drain(rx, sink, Tuple::into_row).await;
        assert!(matches!(result, Err(CliError::Core(TimebinError::Io(_)))));
    }
}
