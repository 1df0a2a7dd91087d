use super::{measure, Emitter};
use std::io;

pub const DEFAULT_N: u32 = 40;

pub fn fibonacci_recursive(n: u32) -> u128 {
    if n <= 1 {
        return n as u128;
    }
    fibonacci_recursive(n - 1).wrapping_add(fibonacci_recursive(n - 2))
}

pub fn fibonacci_iterative(n: u32) -> u128 {
    if n <= 1 {
        return n as u128;
    }
    let (mut a, mut b) = (0u128, 1u128);
    for _ in 2..=n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    b
}

pub fn run(out: &mut Emitter<'_>, n: u32) -> io::Result<()> {
    out.line(format!("计算斐波那契数列第 {n} 项"))?;

    let recursive = measure(|| fibonacci_recursive(n));
    out.line(format!(
        "递归方法: 结果 = {}, 用时 = {:.6} 秒",
        recursive.value,
        recursive.secs()
    ))?;
    out.metric("recursive_time", recursive.secs(), "s")?;

    let iterative = measure(|| fibonacci_iterative(n));
    out.line(format!(
        "迭代方法: 结果 = {}, 用时 = {:.6} 秒",
        iterative.value,
        iterative.secs()
    ))?;
    out.metric("iterative_time", iterative.secs(), "s")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benches::test_support::capture;
    use crate::benches::OutputFormat;
    use crate::{parser, BenchmarkKind};

    #[test]
    fn test_variants_agree() {
        for n in 0..25 {
            assert_eq!(fibonacci_recursive(n), fibonacci_iterative(n));
        }
        assert_eq!(fibonacci_iterative(40), 102_334_155);
        assert_eq!(fibonacci_iterative(150), 9_969_216_677_189_303_386_214_405_760_200);
    }

    #[test]
    fn test_output_matches_parser_contract() {
        let (stdout, stderr) = capture(OutputFormat::Legacy, |e| run(e, 20).unwrap());
        assert!(stderr.is_empty());
        assert!(stdout.contains("递归方法: 结果 = 6765, 用时 = "));

        let metrics = parser::parse(BenchmarkKind::Fibonacci, &stdout);
        assert!(metrics.get("recursive_time").is_some());
        assert!(metrics.get("iterative_time").is_some());
    }

    #[test]
    fn test_structured_format_adds_metric_lines() {
        let (stdout, _) = capture(OutputFormat::Structured, |e| run(e, 10).unwrap());
        assert_eq!(stdout.lines().filter(|l| l.starts_with("@metric")).count(), 2);
    }
}
