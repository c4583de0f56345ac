//! 채널 기반 스테이지 실행기
//!
//! [`StageRunner`]는 [`Stage`] 하나를 bounded `tokio::mpsc` 채널 사이에서 구동합니다.
//! 채널에는 `Result<T, TimebinError>`가 흐르므로, 앞 스테이지의 에러가 뒤 스테이지로
//! 그대로 전달됩니다.
//!
//! # 종료 규칙
//! - 입력 채널이 닫힘: `finish`로 진행 중인 구간을 모두 내보내고 정상 종료
//! - 스테이지 또는 상류 에러: 진행 중인 구간을 버리고 에러를 하류로 전달
//! - 취소 토큰 발동: 진행 중인 구간을 **버리고** 버린 슬롯 수를 `warn`으로 기록
//!
//! ```ignore
//! let (rows_tx, rows_rx) = mpsc::channel(1024);
//! let (counter_task, tuples_rx) = spawn_stage(counter, rows_rx, 1024, cancel.clone());
//! let (aggregator_task, refined_rx) = spawn_stage(aggregator, tuples_rx, 1024, cancel.clone());
//! ```

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use timebin_core::error::{StageError, TimebinError};
use timebin_core::metrics as m;
use timebin_core::pipeline::Stage;

/// 채널 항목
pub type Item<T> = Result<T, TimebinError>;

/// 실행 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 입력이 끝나 모든 구간을 내보냄
    Completed,
    /// 에러로 중단되어 진행 중인 구간을 버림 (에러는 하류로 전달됨)
    Failed,
    /// 취소되어 진행 중인 구간을 버림
    Cancelled {
        /// 버린 슬롯 수
        discarded: usize,
    },
}

/// 스테이지 실행 보고
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub stage: &'static str,
    /// 받은 입력 수
    pub received: u64,
    /// 내보낸 출력 수
    pub emitted: u64,
    pub outcome: RunOutcome,
}

/// 채널 사이에서 스테이지를 구동하는 실행기
pub struct StageRunner<S: Stage> {
    stage: S,
    rx: mpsc::Receiver<Item<S::Input>>,
    tx: mpsc::Sender<Item<S::Output>>,
    received: u64,
    emitted: u64,
}

impl<S> StageRunner<S>
where
    S: Stage,
{
    pub fn new(
        stage: S,
        rx: mpsc::Receiver<Item<S::Input>>,
        tx: mpsc::Sender<Item<S::Output>>,
    ) -> Self {
        Self {
            stage,
            rx,
            tx,
            received: 0,
            emitted: 0,
        }
    }

    /// 입력이 끝나거나, 에러가 나거나, 취소될 때까지 실행합니다.
    ///
    /// 하류 채널이 닫혀 출력을 보낼 수 없으면 `Err`를 반환합니다.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<RunReport, TimebinError> {
        let stage = self.stage.name();
        let mut out = Vec::new();
        tracing::info!(stage, "stage started");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    let discarded = self.stage.discard();
                    metrics::counter!(m::STAGE_SLOTS_DISCARDED_TOTAL, m::LABEL_STAGE => stage)
                        .increment(discarded as u64);
                    tracing::warn!(stage, discarded, "stage cancelled, in-flight bins discarded");
                    return Ok(self.report(RunOutcome::Cancelled { discarded }));
                }
                item = self.rx.recv() => match item {
                    Some(Ok(input)) => {
                        self.received += 1;
                        if let Err(e) = self.stage.push(input, &mut out) {
                            return self.fail(e).await;
                        }
                        self.send_all(&mut out).await?;
                    }
                    Some(Err(e)) => return self.fail(e).await,
                    None => {
                        if let Err(e) = self.stage.finish(&mut out) {
                            return self.fail(e).await;
                        }
                        self.send_all(&mut out).await?;
                        tracing::info!(
                            stage,
                            received = self.received,
                            emitted = self.emitted,
                            "stage completed"
                        );
                        return Ok(self.report(RunOutcome::Completed));
                    }
                },
            }
        }
    }

    async fn send_all(&mut self, out: &mut Vec<S::Output>) -> Result<(), TimebinError> {
        for item in out.drain(..) {
            self.tx.send(Ok(item)).await.map_err(|e| {
                TimebinError::Stage(StageError::ChannelSend(format!(
                    "{}: {e}",
                    self.stage.name()
                )))
            })?;
            self.emitted += 1;
        }
        Ok(())
    }

    async fn fail(mut self, err: TimebinError) -> Result<RunReport, TimebinError> {
        let stage = self.stage.name();
        let discarded = self.stage.discard();
        tracing::error!(stage, discarded, error = %err, "stage failed, in-flight bins discarded");
        if self.tx.send(Err(err)).await.is_err() {
            return Err(TimebinError::Stage(StageError::ChannelSend(format!(
                "{stage}: downstream closed while reporting an error"
            ))));
        }
        Ok(self.report(RunOutcome::Failed))
    }

    fn report(&self, outcome: RunOutcome) -> RunReport {
        RunReport {
            stage: self.stage.name(),
            received: self.received,
            emitted: self.emitted,
            outcome,
        }
    }
}

/// 스테이지를 tokio 태스크로 띄우고 출력 채널을 반환합니다.
pub fn spawn_stage<S>(
    stage: S,
    rx: mpsc::Receiver<Item<S::Input>>,
    capacity: usize,
    cancel: CancellationToken,
) -> (
    JoinHandle<Result<RunReport, TimebinError>>,
    mpsc::Receiver<Item<S::Output>>,
)
where
    S: Stage + Send + 'static,
    S::Input: Send + 'static,
    S::Output: Send + 'static,
{
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    let runner = StageRunner::new(stage, rx, tx);
    let handle = tokio::spawn(runner.run(cancel));
    (handle, out_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use timebin_core::types::Tuple;

    use crate::aggregator::Aggregator;

    async fn collect<T>(mut rx: mpsc::Receiver<Item<T>>) -> Vec<Item<T>> {
        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn completed_run_flushes_last_bin() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (handle, out_rx) = spawn_stage(Aggregator::summing(), rx, 8, cancel);

        for (bin, v) in [(60, 32.0), (60, 10.0), (120, 100.0)] {
            tx.send(Ok(Tuple::new(bin, "i", "k", "s", v))).await.expect("send");
        }
        drop(tx);

        let out = collect(out_rx).await;
        let report = handle.await.expect("join").expect("run");
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.received, 3);
        assert_eq!(report.emitted, 2);
        let values: Vec<_> = out.into_iter().map(|r| r.expect("ok").value).collect();
        assert_eq!(values, vec![42.0, 100.0]);
    }

    #[tokio::test]
    async fn stage_error_is_forwarded_downstream() {
        let (tx, rx) = mpsc::channel(8);
        let (handle, out_rx) = spawn_stage(Aggregator::summing(), rx, 8, CancellationToken::new());

        tx.send(Ok(Tuple::new(120, "i", "k", "", 1.0))).await.expect("send");
        tx.send(Ok(Tuple::new(60, "i", "k", "", 1.0))).await.expect("send");
        drop(tx);

        let out = collect(out_rx).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].as_ref().is_err_and(|e| e.is_out_of_order()));
        let report = handle.await.expect("join").expect("run");
        assert_eq!(report.outcome, RunOutcome::Failed);
    }

    #[tokio::test]
    async fn upstream_error_is_passed_through() {
        let (tx, rx) = mpsc::channel(8);
        let (handle, out_rx) = spawn_stage(Aggregator::summing(), rx, 8, CancellationToken::new());

        tx.send(Ok(Tuple::new(0, "i", "k", "", 1.0))).await.expect("send");
        tx.send(Err(TimebinError::Io(std::io::Error::other("read failed"))))
            .await
            .expect("send");
        drop(tx);

        let out = collect(out_rx).await;
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], Err(TimebinError::Io(_))));
        assert_eq!(
            handle.await.expect("join").expect("run").outcome,
            RunOutcome::Failed
        );
    }

    #[tokio::test]
    async fn cancellation_discards_in_flight_bin() {
        let (tx, rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let (handle, mut out_rx) = spawn_stage(Aggregator::summing(), rx, 8, cancel.clone());

        tx.send(Ok(Tuple::new(0, "i", "k", "", 1.0))).await.expect("send");
        tx.send(Ok(Tuple::new(60, "i", "k", "", 1.0))).await.expect("send");

        // 0 구간이 내보내졌으면 두 튜플 모두 처리된 상태
        let first = out_rx.recv().await.expect("flushed bin").expect("ok");
        assert_eq!(first.time_bin, 0);

        cancel.cancel();
        let report = handle.await.expect("join").expect("run");
        assert_eq!(report.outcome, RunOutcome::Cancelled { discarded: 1 });
        assert!(out_rx.recv().await.is_none());
        drop(tx);
    }

    #[tokio::test]
    async fn closed_downstream_is_an_error() {
        let (tx, rx) = mpsc::channel(8);
        let (handle, out_rx) = spawn_stage(Aggregator::summing(), rx, 8, CancellationToken::new());
        drop(out_rx);

        tx.send(Ok(Tuple::new(0, "i", "k", "", 1.0))).await.expect("send");
        drop(tx);

        let result = handle.await.expect("join");
        assert!(result.is_err());
    }
}
