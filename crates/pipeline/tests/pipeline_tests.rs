//! 통합 테스트 -- Feature Counter → Aggregator → Relationship Analyzer 전체 흐름 검증

use proptest::prelude::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use timebin_core::config::DefaultsConfig;
use timebin_core::pipeline::Stage;
use timebin_core::row;
use timebin_core::spec::{AnalysisSpec, ArgSpec, FeatureCounterSpec, OutputSpec};
use timebin_core::types::{Row, Schema, Tuple};
use timebin_pipeline::{
    Aggregator, CounterConfig, CounterConfigBuilder, FeatureCounter, FunctionRegistry,
    RelationRow, RelationshipAnalyzer, ReleaseMode, RunOutcome, spawn_stage,
};

const DNS_SPEC: &str = include_str!("../../../specs/dns-features.yaml");

fn dns_schema() -> Schema {
    Schema::new(["time", "qname", "srcip"])
}

fn dns_rows() -> Vec<Row> {
    vec![
        row![1, "www.example.com", "10.0.0.1"],
        row![2, "mail.example.com.", "10.0.0.2"],
        row![3, "foo.other.com", "10.0.0.1"],
        row![4, "printer.local", "10.0.0.9"],
        row![61, "www.example.com", "10.0.0.1"],
    ]
}

fn column<'a>(analyzer_header: &'a [String], row: &'a RelationRow, name: &str) -> Option<f64> {
    let pos = analyzer_header.iter().position(|c| c == name)?;
    row.values[pos - 3]
}

/// YAML 명세 하나로 세 스테이지를 이어서 실행합니다.
#[test]
fn dns_spec_runs_end_to_end() {
    let spec = AnalysisSpec::parse(DNS_SPEC).expect("sample spec parses");
    let registry = FunctionRegistry::with_defaults();
    let config = CounterConfig::from_spec(&spec, &DefaultsConfig::default());

    let counter = FeatureCounter::new(
        config,
        spec.feature_counter().expect("section"),
        &dns_schema(),
        &registry,
    )
    .expect("counter");
    let aggregator =
        Aggregator::from_spec(spec.aggregator().expect("section"), &registry).expect("aggregator");
    let analyzer =
        RelationshipAnalyzer::from_spec(spec.relationship_analysis().expect("section"), &registry)
            .expect("analyzer");
    let header = analyzer.header();

    let rows: Vec<RelationRow> = analyzer
        .process(aggregator.process(counter.process(dns_rows().into_iter().map(Ok))))
        .collect::<Result<_, _>>()
        .expect("no errors");

    let first_bin: Vec<_> = rows.iter().filter(|r| r.time_bin == 0).collect();
    assert_eq!(first_bin.len(), 2);

    let example = first_bin[0];
    assert_eq!(example.key, "example.com");
    assert_eq!(example.subkey, "");
    assert_eq!(column(&header, example, "count"), Some(2.0));
    assert_eq!(column(&header, example, "reg_fraction"), Some(2.0 / 3.0));
    assert_eq!(column(&header, example, "prefix_fraction"), Some(1.0));
    assert_eq!(column(&header, example, "srcip_fraction"), Some(2.0 / 3.0));

    let other = first_bin[1];
    assert_eq!(other.key, "other.com");
    assert_eq!(column(&header, other, "count"), Some(1.0));
    assert_eq!(column(&header, other, "reg_fraction"), Some(1.0 / 3.0));

    let second_bin: Vec<_> = rows.iter().filter(|r| r.time_bin == 60).collect();
    assert_eq!(second_bin.len(), 1);
    assert_eq!(second_bin[0].key, "example.com");
    assert_eq!(column(&header, second_bin[0], "max_count"), Some(2.0));
}

#[test]
fn aggregator_sums_example_tuples() {
    let tuples = vec![
        Tuple::new(60, "i", "k", "s", 32.0),
        Tuple::new(60, "i", "k", "s", 10.0),
        Tuple::new(120, "i", "k", "s", 100.0),
    ];
    let out: Vec<Tuple> = Aggregator::summing()
        .process(tuples.into_iter().map(Ok))
        .collect::<Result<_, _>>()
        .expect("no errors");
    assert_eq!(
        out,
        vec![
            Tuple::new(60, "i", "k", "s", 42.0),
            Tuple::new(120, "i", "k", "s", 100.0),
        ]
    );
}

#[test]
fn backward_time_through_chain_is_fatal() {
    let tuples = vec![
        Tuple::new(120, "i", "k", "s", 1.0),
        Tuple::new(60, "i", "k", "s", 1.0),
    ];
    let results: Vec<_> = Aggregator::summing().process(tuples.into_iter().map(Ok)).collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].as_ref().is_err_and(|e| e.is_out_of_order()));
}

#[test]
fn unknown_function_fails_before_reading_rows() {
    let spec = FeatureCounterSpec {
        filters: Vec::new(),
        outputs: vec![("x".to_owned(), OutputSpec::new("no_such_fn", vec![]))],
    };
    let result = FeatureCounter::new(
        CounterConfig::default(),
        &spec,
        &Schema::new(["time", "name"]),
        &FunctionRegistry::with_defaults(),
    );
    assert!(result.is_err());
}

/// 채널로 이어진 스테이지 태스크가 동기 반복자와 같은 결과를 냅니다.
#[tokio::test]
async fn spawned_stages_match_iterator_chain() {
    let spec = AnalysisSpec::parse(DNS_SPEC).expect("sample spec parses");
    let registry = FunctionRegistry::with_defaults();
    let build = || {
        let counter = FeatureCounter::new(
            CounterConfig::from_spec(&spec, &DefaultsConfig::default()),
            spec.feature_counter().expect("section"),
            &dns_schema(),
            &registry,
        )
        .expect("counter");
        let aggregator = Aggregator::from_spec(spec.aggregator().expect("section"), &registry)
            .expect("aggregator");
        let analyzer = RelationshipAnalyzer::from_spec(
            spec.relationship_analysis().expect("section"),
            &registry,
        )
        .expect("analyzer");
        (counter, aggregator, analyzer)
    };

    let (counter, aggregator, analyzer) = build();
    let expected: Vec<RelationRow> = analyzer
        .process(aggregator.process(counter.process(dns_rows().into_iter().map(Ok))))
        .collect::<Result<_, _>>()
        .expect("no errors");

    let (counter, aggregator, analyzer) = build();
    let cancel = CancellationToken::new();
    let (rows_tx, rows_rx) = mpsc::channel(4);
    let (counter_task, tuples_rx) = spawn_stage(counter, rows_rx, 4, cancel.clone());
    let (aggregator_task, refined_rx) = spawn_stage(aggregator, tuples_rx, 4, cancel.clone());
    let (analyzer_task, mut out_rx) = spawn_stage(analyzer, refined_rx, 4, cancel.clone());

    tokio::spawn(async move {
        for row in dns_rows() {
            if rows_tx.send(Ok(row)).await.is_err() {
                break;
            }
        }
    });

    let mut actual = Vec::new();
    while let Some(item) = out_rx.recv().await {
        actual.push(item.expect("no errors"));
    }
    assert_eq!(actual, expected);

    for task in [counter_task.await, aggregator_task.await] {
        let report = task.expect("join").expect("run");
        assert_eq!(report.outcome, RunOutcome::Completed);
    }
    let report = analyzer_task.await.expect("join").expect("run");
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.emitted, expected.len() as u64);
}

fn identity_counter(mode: ReleaseMode) -> FeatureCounter {
    let spec = FeatureCounterSpec {
        filters: Vec::new(),
        outputs: vec![(
            "name".to_owned(),
            OutputSpec::new("identity", vec![ArgSpec::Int(1)]),
        )],
    };
    let config = CounterConfigBuilder::new()
        .time_column(ArgSpec::Int(0))
        .bin_size(10)
        .mode(mode)
        .build()
        .expect("valid");
    FeatureCounter::new(
        config,
        &spec,
        &Schema::new(["time", "name"]),
        &FunctionRegistry::with_defaults(),
    )
    .expect("valid")
}

fn sorted_rows() -> impl Strategy<Value = Vec<(i64, u8)>> {
    prop::collection::vec((0i64..200, 0u8..5), 0..60).prop_map(|mut rows| {
        rows.sort_by_key(|(t, _)| *t);
        rows
    })
}

proptest! {
    /// 시간순 입력이면 bulk와 incremental 모드의 출력이 같다
    #[test]
    fn bulk_and_incremental_agree_on_sorted_input(rows in sorted_rows()) {
        let to_rows = || rows.iter().map(|(t, k)| Ok(row![*t, format!("key{k}")]));
        let bulk: Vec<Tuple> = identity_counter(ReleaseMode::Bulk)
            .process(to_rows())
            .collect::<Result<_, _>>()
            .expect("no errors");
        let incremental: Vec<Tuple> = identity_counter(ReleaseMode::Incremental)
            .process(to_rows())
            .collect::<Result<_, _>>()
            .expect("no errors");
        prop_assert_eq!(bulk, incremental);
    }

    /// 개수의 합은 입력 행 수와 같다
    #[test]
    fn counts_add_up_to_row_count(rows in sorted_rows()) {
        let input = rows.iter().map(|(t, k)| Ok(row![*t, format!("key{k}")]));
        let out: Vec<Tuple> = identity_counter(ReleaseMode::Incremental)
            .process(input)
            .collect::<Result<_, _>>()
            .expect("no errors");
        let total: f64 = out.iter().map(|t| t.value).sum();
        prop_assert_eq!(total, rows.len() as f64);
    }

    /// 합계 재집계는 값의 총합을 보존한다
    #[test]
    fn summing_preserves_total(values in prop::collection::vec((0i64..5, 0u8..3, 0u32..100), 0..50)) {
        let mut values = values;
        values.sort_by_key(|(bin, _, _)| *bin);
        let tuples = values
            .iter()
            .map(|(bin, key, v)| Ok(Tuple::new(bin * 60, "i", &format!("k{key}"), "", f64::from(*v))));
        let out: Vec<Tuple> = Aggregator::summing()
            .process(tuples)
            .collect::<Result<_, _>>()
            .expect("no errors");
        let expected: f64 = values.iter().map(|(_, _, v)| f64::from(*v)).sum();
        let actual: f64 = out.iter().map(|t| t.value).sum();
        prop_assert_eq!(actual, expected);
    }
}
