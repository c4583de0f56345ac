//! DNS 도메인 분류와 DNS 전용 함수
//!
//! [`DomainClassifier`]는 도메인 이름을 `(prefix, domain, suffix)`로 나눕니다.
//! 기본 구현 [`SuffixList`]는 public suffix list 텍스트 형식을 읽습니다.
//!
//! ```text
//! www.images.example.co.uk → prefix "www.images", domain "example.co.uk", suffix "co.uk"
//! ```
//!
//! 분류기는 레지스트리 생성 시 주입되며 PSL 추출 함수와 DNS 관계 함수가 공유합니다.

use std::collections::HashSet;
use std::sync::Arc;

use timebin_core::spec::Arg;
use timebin_core::types::Row;

use super::relationship::{lookup_lenient, ratio};
use super::{column_arg, optional_text, require_args, text_arg};
use crate::bundle::{Bundle, SlotValues};
use crate::error::AnalysisError;
use crate::registry::{Extractor, FunctionRegistry, RelationshipFn};

/// 내장 접미사 목록 (public suffix list 형식)
const BUILTIN_RULES: &str = "\
// generic
com
net
org
edu
gov
mil
int
info
biz
io
dev
app
arpa
in-addr.arpa
ip6.arpa

// country codes
us
ca
de
fr
nl
ru
cn
kr
co.kr
or.kr
jp
co.jp
ne.jp
or.jp
uk
co.uk
org.uk
ac.uk
gov.uk
au
com.au
net.au
org.au
br
com.br

// wildcard and exception
*.ck
!www.ck
";

pub(crate) fn register(registry: &mut FunctionRegistry, classifier: Arc<dyn DomainClassifier>) {
    for (name, shape) in PslShape::ALL {
        let classifier = Arc::clone(&classifier);
        registry.register_extractor(name, move |args| {
            Ok(Box::new(PslExtractor::new(name, args, shape, Arc::clone(&classifier))?))
        });
    }
    registry.register_extractor("dns_label_count", |args| {
        Ok(Box::new(LabelCount::new(args)?))
    });

    let c = Arc::clone(&classifier);
    registry.register_relationship("dnsRegistrationFraction", move |args| {
        Ok(Box::new(RegistrationFraction::new(args, Arc::clone(&c))?))
    });
    registry.register_relationship("dnsPrefixFraction", |args| {
        Ok(Box::new(PrefixFraction::new(args)))
    });
    registry.register_relationship("dnsSrcipFraction", |args| {
        Ok(Box::new(SrcipFraction::new(args)?))
    });
    registry.register_relationship("dnsDDoSMetric", move |args| {
        Ok(Box::new(DdosMetric::new(args, Arc::clone(&classifier))?))
    });
}

// =============================================================================
// 분류기
// =============================================================================

/// 도메인 이름 분해 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainParts {
    /// 등록 도메인 앞부분 (`www.images`). 없으면 빈 문자열
    pub prefix: String,
    /// 등록 도메인 (`example.co.uk`). 이름 자체가 접미사면 빈 문자열
    pub domain: String,
    /// 공개 접미사 (`co.uk`)
    pub suffix: String,
}

/// 도메인 이름 분류기
pub trait DomainClassifier: Send + Sync {
    /// 이름을 분해합니다. 알 수 없는 접미사면 `None`입니다.
    fn split(&self, name: &str) -> Option<DomainParts>;
}

/// public suffix list 규칙 집합
#[derive(Debug, Clone, Default)]
pub struct SuffixList {
    rules: HashSet<String>,
    wildcards: HashSet<String>,
    exceptions: HashSet<String>,
}

impl SuffixList {
    /// PSL 텍스트를 파싱합니다.
    ///
    /// `//` 주석과 빈 줄은 무시하고, 각 줄의 첫 단어만 규칙으로 봅니다.
    pub fn parse(text: &str) -> Self {
        let mut list = Self::default();
        for line in text.lines() {
            let Some(rule) = line.split_whitespace().next() else {
                continue;
            };
            if rule.starts_with("//") {
                continue;
            }
            let rule = rule.to_lowercase();
            if let Some(exception) = rule.strip_prefix('!') {
                list.exceptions.insert(exception.to_owned());
            } else if let Some(parent) = rule.strip_prefix("*.") {
                list.wildcards.insert(parent.to_owned());
            } else {
                list.rules.insert(rule);
            }
        }
        tracing::debug!(
            rules = list.rules.len(),
            wildcards = list.wildcards.len(),
            exceptions = list.exceptions.len(),
            "parsed suffix list"
        );
        list
    }

    /// 내장 목록
    pub fn builtin() -> Self {
        Self::parse(BUILTIN_RULES)
    }

    pub fn len(&self) -> usize {
        self.rules.len() + self.wildcards.len() + self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 가장 긴 접미사가 시작하는 라벨 번호
    fn suffix_label(&self, name: &str, offsets: &[usize]) -> Option<usize> {
        for (i, &start) in offsets.iter().enumerate() {
            let candidate = &name[start..];
            if self.exceptions.contains(candidate) {
                return (i + 1 < offsets.len()).then_some(i + 1);
            }
            if self.rules.contains(candidate) {
                return Some(i);
            }
            if let Some(&parent) = offsets.get(i + 1)
                && self.wildcards.contains(&name[parent..])
            {
                return Some(i);
            }
        }
        None
    }
}

impl DomainClassifier for SuffixList {
    fn split(&self, name: &str) -> Option<DomainParts> {
        let name = name.trim().trim_end_matches('.').to_lowercase();
        if name.is_empty() || name.split('.').any(str::is_empty) {
            return None;
        }

        let offsets: Vec<usize> = std::iter::once(0)
            .chain(name.match_indices('.').map(|(i, _)| i + 1))
            .collect();
        let s = self.suffix_label(&name, &offsets)?;
        let suffix = name[offsets[s]..].to_owned();
        if s == 0 {
            return Some(DomainParts {
                suffix,
                ..DomainParts::default()
            });
        }

        let domain_start = offsets[s - 1];
        let prefix = if domain_start == 0 {
            String::new()
        } else {
            name[..domain_start - 1].to_owned()
        };
        Some(DomainParts {
            prefix,
            domain: name[domain_start..].to_owned(),
            suffix,
        })
    }
}

// =============================================================================
// 추출 함수
// =============================================================================

/// PSL 추출 함수의 `(key, subkey)` 형태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PslShape {
    /// `(suffix, "")`
    Registration,
    /// `(domain, "")`
    Domain,
    /// `(domain, prefix)`
    DomainAndPrefix,
    /// `(suffix, domain)`
    RegistrationAndDomain,
    /// `(domain, row[col2])`
    DomainAndColumn,
    /// `(suffix, row[col2])`
    RegistrationAndColumn,
}

impl PslShape {
    pub const ALL: [(&'static str, PslShape); 7] = [
        ("PSL_registration", Self::Registration),
        ("PSL_domain", Self::Domain),
        ("PSL_prefix", Self::DomainAndPrefix),
        ("PSL_dom_and_pre", Self::DomainAndPrefix),
        ("PSL_reg_and_dom", Self::RegistrationAndDomain),
        ("PSL_dom_and_srcip", Self::DomainAndColumn),
        ("PSL_reg_and_srcip", Self::RegistrationAndColumn),
    ];

    fn needs_second_column(self) -> bool {
        matches!(self, Self::DomainAndColumn | Self::RegistrationAndColumn)
    }
}

/// 도메인 이름 컬럼을 분류기로 나눠 키를 만듭니다.
pub struct PslExtractor {
    column: usize,
    second: Option<usize>,
    shape: PslShape,
    classifier: Arc<dyn DomainClassifier>,
}

impl PslExtractor {
    pub fn new(
        function: &str,
        args: &[Arg],
        shape: PslShape,
        classifier: Arc<dyn DomainClassifier>,
    ) -> Result<Self, AnalysisError> {
        let second = if shape.needs_second_column() {
            Some(column_arg(function, args, 1)?)
        } else {
            None
        };
        Ok(Self {
            column: column_arg(function, args, 0)?,
            second,
            shape,
            classifier,
        })
    }
}

impl Extractor for PslExtractor {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        let parts = self.classifier.split(&row.text(self.column))?;
        let column = || self.second.map(|c| row.text(c).into_owned()).unwrap_or_default();
        Some(match self.shape {
            PslShape::Registration => (parts.suffix, String::new()),
            PslShape::Domain => (parts.domain, String::new()),
            PslShape::DomainAndPrefix => (parts.domain, parts.prefix),
            PslShape::RegistrationAndDomain => (parts.suffix, parts.domain),
            PslShape::DomainAndColumn => (parts.domain, column()),
            PslShape::RegistrationAndColumn => (parts.suffix, column()),
        })
    }
}

/// 도메인 이름의 라벨 수 (`www.example.com` → `"3"`). 끝의 `.`은 세지 않습니다.
pub struct LabelCount {
    column: usize,
}

impl LabelCount {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            column: column_arg("dns_label_count", args, 0)?,
        })
    }
}

impl Extractor for LabelCount {
    fn extract(&mut self, row: &Row) -> Option<(String, String)> {
        let name = row.text(self.column);
        let labels = name.split('.').count();
        let labels = if name.is_empty() || name.ends_with('.') {
            labels - 1
        } else {
            labels
        };
        Some((labels.to_string(), String::new()))
    }
}

// =============================================================================
// 관계 함수
// =============================================================================

/// 도메인 값 / 그 도메인의 접미사 값 (`count(example.com) / count(com)`)
pub struct RegistrationFraction {
    index: String,
    registration_index: String,
    classifier: Arc<dyn DomainClassifier>,
}

impl RegistrationFraction {
    pub fn new(args: &[Arg], classifier: Arc<dyn DomainClassifier>) -> Result<Self, AnalysisError> {
        const NAME: &str = "dnsRegistrationFraction";
        require_args(NAME, args, 2)?;
        Ok(Self {
            index: text_arg(NAME, args, 0)?,
            registration_index: text_arg(NAME, args, 1)?,
            classifier,
        })
    }
}

impl RelationshipFn for RegistrationFraction {
    fn evaluate(&mut self, bundle: &Bundle, key: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let numerator = *slot.get(&self.index)?;
        let parts = self.classifier.split(key)?;
        ratio(
            numerator,
            bundle.lookup(&parts.suffix, "", &self.registration_index),
        )
    }
}

/// 도메인별 고유 prefix 수 / 도메인 요청 수
///
/// 인자: `[domain_index = "psldom", unique_index = "pslpre_unique"]`
pub struct PrefixFraction {
    domain_index: String,
    unique_index: String,
}

impl PrefixFraction {
    pub fn new(args: &[Arg]) -> Self {
        Self {
            domain_index: optional_text(args, 0).unwrap_or_else(|| "psldom".to_owned()),
            unique_index: optional_text(args, 1).unwrap_or_else(|| "pslpre_unique".to_owned()),
        }
    }
}

impl RelationshipFn for PrefixFraction {
    fn evaluate(&mut self, bundle: &Bundle, key: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let requests = *slot.get(&self.domain_index)?;
        let unique = bundle
            .lookup(key, "unique", &self.unique_index)
            .filter(|u| *u != 0.0)?;
        ratio(unique, Some(requests))
    }
}

/// 현재 슬롯 값 / 전체 패킷 수
///
/// 인자: `[index, total_key = "2", total_index = "allpackets"]`
pub struct SrcipFraction {
    index: String,
    total_key: String,
    total_index: String,
}

impl SrcipFraction {
    pub fn new(args: &[Arg]) -> Result<Self, AnalysisError> {
        Ok(Self {
            index: text_arg("dnsSrcipFraction", args, 0)?,
            total_key: optional_text(args, 1).unwrap_or_else(|| "2".to_owned()),
            total_index: optional_text(args, 2).unwrap_or_else(|| "allpackets".to_owned()),
        })
    }
}

impl RelationshipFn for SrcipFraction {
    fn evaluate(&mut self, bundle: &Bundle, _: &str, _: &str, slot: &SlotValues) -> Option<f64> {
        let numerator = *slot.get(&self.index)?;
        ratio(numerator, bundle.lookup(&self.total_key, "", &self.total_index))
    }
}

/// DDoS 지표: `unique(prefix of domain) / count(suffix)`
///
/// 인자: `[domain_index, suffix_index, unique_index, min_requests]`.
/// 접미사 요청 수가 `min_requests`보다 적거나, 참조 값 중 하나라도 없거나 0이면
/// `None`입니다. 보조 키가 있는 슬롯은 평가하지 않습니다.
pub struct DdosMetric {
    domain_index: String,
    suffix_index: String,
    unique_index: String,
    min_requests: f64,
    classifier: Arc<dyn DomainClassifier>,
}

impl DdosMetric {
    pub fn new(args: &[Arg], classifier: Arc<dyn DomainClassifier>) -> Result<Self, AnalysisError> {
        const NAME: &str = "dnsDDoSMetric";
        require_args(NAME, args, 4)?;
        let min_requests = args[3].number().ok_or_else(|| {
            AnalysisError::invalid_args(NAME, format!("min_requests '{}' is not a number", args[3].text()))
        })?;
        Ok(Self {
            domain_index: text_arg(NAME, args, 0)?,
            suffix_index: text_arg(NAME, args, 1)?,
            unique_index: text_arg(NAME, args, 2)?,
            min_requests,
            classifier,
        })
    }
}

impl RelationshipFn for DdosMetric {
    fn evaluate(&mut self, bundle: &Bundle, key: &str, subkey: &str, _: &SlotValues) -> Option<f64> {
        if !subkey.is_empty() {
            return None;
        }
        let parts = self.classifier.split(key)?;
        if parts.domain.is_empty() {
            return None;
        }

        let domain_requests = lookup_lenient(bundle, &parts.suffix, "", &self.domain_index);
        let suffix_requests = lookup_lenient(bundle, &parts.suffix, "", &self.suffix_index)?;
        let unique_prefixes = lookup_lenient(bundle, &parts.domain, "", &self.unique_index);

        if suffix_requests < self.min_requests {
            return None;
        }
        match (domain_requests, unique_prefixes) {
            (Some(d), Some(u)) if d != 0.0 && u != 0.0 && suffix_requests != 0.0 => {
                Some(u / suffix_requests)
            }
            _ => None,
        }
    }
}
