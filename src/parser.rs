//! Metric extraction from captured benchmark output.
//!
//! Two line contracts are understood:
//!
//! - **v1 (legacy text)**: human-readable labeled lines, one fixed shape per
//!   metric (`递归方法: 结果 = 102334155, 用时 = 0.482931 秒`).
//! - **v2 (structured)**: `@metric <name>=<value> [unit]`, one metric per line.
//!
//! Every rule runs independently. A rule that does not match, or whose capture
//! is not a finite number, leaves only its own metric absent.

use crate::schema::MetricSet;
use crate::BenchmarkKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Newest line contract understood by [`parse`].
pub const CONTRACT_VERSION: u32 = 2;

/// Prefix of a structured (v2) metric line.
pub const STRUCTURED_PREFIX: &str = "@metric";

const NUM: &str = r"(-?[0-9]+(?:\.[0-9]+)?)";

/// One labeled-line pattern populating one metric from capture group 1.
#[derive(Debug)]
pub struct ExtractionRule {
    pub metric: &'static str,
    pattern: Regex,
}

impl ExtractionRule {
    fn new(metric: &'static str, template: &str) -> Option<Self> {
        let source = template.replace("{num}", NUM);
        match Regex::new(&source) {
            Ok(pattern) => Some(Self { metric, pattern }),
            Err(e) => {
                tracing::error!(metric, error = %e, "invalid extraction pattern");
                None
            }
        }
    }

    /// First finite value this rule finds in `text`.
    pub fn extract(&self, text: &str) -> Option<f64> {
        let caps = self.pattern.captures(text)?;
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        value.is_finite().then_some(value)
    }
}

fn build(rules: &[(&'static str, &str)]) -> Vec<ExtractionRule> {
    rules
        .iter()
        .filter_map(|(metric, template)| ExtractionRule::new(metric, template))
        .collect()
}

static FIBONACCI_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    build(&[
        ("recursive_time", r"递归方法: 结果 = -?[0-9]+, 用时 = {num} 秒"),
        ("iterative_time", r"迭代方法: 结果 = -?[0-9]+, 用时 = {num} 秒"),
    ])
});

static MATRIX_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    build(&[
        ("mathjs_time", r"mathjs实现: 用时 = {num} 秒"),
        ("numpy_time", r"NumPy实现: 用时 = {num} 秒"),
        ("blocked_time", r"分块实现: 用时 = {num} 秒"),
        ("manual_time", r"(?:手动实现: 用时|矩阵乘法完成，用时) = {num} 秒"),
    ])
});

static MEMORY_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    build(&[
        ("initial_memory", r"初始内存使用: (?:RSS = )?{num} MB"),
        ("after_creation_memory", r"数组创建后内存使用: (?:RSS = )?{num} MB"),
        ("memory_increase", r"数组创建后内存使用: [^\n]*?\(增加 {num} MB\)"),
        ("creation_time", r"数组创建时间: {num} 秒"),
        ("operation_time", r"操作时间: {num} 秒"),
    ])
});

static FILE_IO_RULES: Lazy<Vec<ExtractionRule>> = Lazy::new(|| {
    build(&[
        ("write_time", r"写入完成, 用时: {num} 秒"),
        ("write_speed", r"写入速度: {num} MB/秒"),
        ("read_time", r"读取完成, 读取了 [0-9.]+ ?MB, 用时: {num} 秒"),
        ("read_speed", r"读取速度: {num} MB/秒"),
    ])
});

static STRUCTURED_LINE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?m)^@metric[ \t]+([A-Za-z_][A-Za-z0-9_.]*)=([^\s]+)(?:[ \t]+[^\s]+)?[ \t]*\r?$")
        .map_err(|e| tracing::error!(error = %e, "invalid structured metric pattern"))
        .ok()
});

/// Legacy text rules for `kind`, in evaluation order.
pub fn rules(kind: BenchmarkKind) -> &'static [ExtractionRule] {
    match kind {
        BenchmarkKind::Fibonacci => &FIBONACCI_RULES,
        BenchmarkKind::Matrix => &MATRIX_RULES,
        BenchmarkKind::Memory => &MEMORY_RULES,
        BenchmarkKind::FileIo => &FILE_IO_RULES,
        BenchmarkKind::Http => &[],
    }
}

/// Names of the metrics `kind` can yield through legacy rules.
pub fn metric_names(kind: BenchmarkKind) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = rules(kind).iter().map(|r| r.metric).collect();
    names.dedup();
    names
}

/// Extracts every metric it can find in `raw`. Never fails; unparseable text
/// yields an empty set.
pub fn parse(kind: BenchmarkKind, raw: &str) -> MetricSet {
    let mut metrics = parse_structured(raw);

    for rule in rules(kind) {
        if metrics.contains(rule.metric) {
            continue;
        }
        match rule.extract(raw) {
            Some(value) => {
                metrics.insert_if_absent(rule.metric, value);
            }
            None => tracing::debug!(%kind, metric = rule.metric, "no match"),
        }
    }

    metrics
}

/// Collects `@metric name=value [unit]` lines. The first occurrence of a name wins.
pub fn parse_structured(raw: &str) -> MetricSet {
    let mut metrics = MetricSet::new();
    let Some(line) = STRUCTURED_LINE.as_ref() else {
        return metrics;
    };

    for caps in line.captures_iter(raw) {
        let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        match value.as_str().parse::<f64>() {
            Ok(v) if v.is_finite() => {
                metrics.insert_if_absent(name.as_str(), v);
            }
            _ => tracing::debug!(metric = name.as_str(), value = value.as_str(), "unparseable structured value"),
        }
    }

    metrics
}

/// Formats one structured (v2) metric line.
pub fn structured_line(metric: &str, value: f64, unit: &str) -> String {
    if unit.is_empty() {
        format!("{STRUCTURED_PREFIX} {metric}={value}")
    } else {
        format!("{STRUCTURED_PREFIX} {metric}={value} {unit}")
    }
}
