//! 스테이지 trait -- 스트리밍 변환 단계의 공통 계약
//!
//! 모든 스테이지(Feature Counter, Aggregator, Relationship Analyzer, Edge Detector)는
//! [`Stage`]를 구현합니다. 입력을 하나씩 밀어 넣고(`push`), 완성된 출력을
//! 호출자가 준 버퍼에 쌓습니다. 입력이 끝나면 `finish`로 진행 중인 구간을
//! 모두 내보내고, 중단할 때는 `discard`로 명시적으로 버립니다.
//!
//! [`StageIter`]는 스테이지와 입력 반복자를 묶어 지연 평가되는 출력 반복자로
//! 만듭니다. 스테이지끼리 반복자로 이어 붙일 수 있습니다.
//!
//! ```ignore
//! let tuples = counter.process(rows.map(Ok));
//! let refined = aggregator.process(tuples);
//! for row in relationship.process(refined) {
//!     println!("{:?}", row?);
//! }
//! ```

use std::collections::VecDeque;

use crate::error::TimebinError;

/// 스트리밍 변환 단계
pub trait Stage {
    /// 입력 단위
    type Input;
    /// 출력 단위
    type Output;

    /// 스테이지 이름 (로그와 에러 메시지에 사용)
    fn name(&self) -> &'static str;

    /// 입력 하나를 처리합니다. 완성된 구간이 있으면 `out`에 추가합니다.
    fn push(
        &mut self,
        input: Self::Input,
        out: &mut Vec<Self::Output>,
    ) -> Result<(), TimebinError>;

    /// 입력이 끝났습니다. 진행 중인 구간을 모두 `out`에 내보냅니다.
    fn finish(&mut self, out: &mut Vec<Self::Output>) -> Result<(), TimebinError>;

    /// 진행 중인 상태를 내보내지 않고 버립니다. 버린 슬롯 수를 반환합니다.
    fn discard(&mut self) -> usize;

    /// 입력 반복자를 받아 지연 평가되는 출력 반복자를 만듭니다.
    fn process<I>(self, input: I) -> StageIter<Self, I::IntoIter>
    where
        Self: Sized,
        I: IntoIterator<Item = Result<Self::Input, TimebinError>>,
    {
        StageIter::new(self, input.into_iter())
    }
}

/// 스테이지를 풀(pull) 방식 반복자로 감싼 어댑터
///
/// 입력 반복자가 에러를 내거나 스테이지가 에러를 반환하면, 그 에러를 한 번
/// 내보낸 뒤 반복을 끝냅니다. 부분적으로 쌓인 구간은 내보내지 않습니다.
pub struct StageIter<S: Stage, I> {
    stage: S,
    input: I,
    pending: VecDeque<S::Output>,
    scratch: Vec<S::Output>,
    finished: bool,
}

impl<S, I> StageIter<S, I>
where
    S: Stage,
    I: Iterator<Item = Result<S::Input, TimebinError>>,
{
    pub fn new(stage: S, input: I) -> Self {
        Self {
            stage,
            input,
            pending: VecDeque::new(),
            scratch: Vec::new(),
            finished: false,
        }
    }

    /// 내부 스테이지를 참조합니다.
    pub fn stage(&self) -> &S {
        &self.stage
    }

    fn fail(&mut self, err: TimebinError) -> Option<Result<S::Output, TimebinError>> {
        self.finished = true;
        let dropped = self.stage.discard();
        tracing::error!(stage = self.stage.name(), dropped, error = %err, "stage aborted");
        Some(Err(err))
    }
}

impl<S, I> Iterator for StageIter<S, I>
where
    S: Stage,
    I: Iterator<Item = Result<S::Input, TimebinError>>,
{
    type Item = Result<S::Output, TimebinError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(Ok(item));
            }
            if self.finished {
                return None;
            }
            match self.input.next() {
                Some(Ok(input)) => {
                    if let Err(e) = self.stage.push(input, &mut self.scratch) {
                        return self.fail(e);
                    }
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.finished = true;
                    if let Err(e) = self.stage.finish(&mut self.scratch) {
                        self.pending.clear();
                        self.scratch.clear();
                        return Some(Err(e));
                    }
                }
            }
            self.pending.extend(self.scratch.drain(..));
        }
    }
}
