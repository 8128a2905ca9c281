use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::rules::{self, Severity};

/// Static code-quality counts and derived percentages, computed without
/// ever executing the submission.
#[derive(Debug, Clone, Serialize)]
pub struct QualityMetrics {
    /// Non-blank lines.
    pub total_lines: usize,
    /// Recognized instruction mnemonics.
    pub instruction_count: usize,
    /// Distinct instruction mnemonics.
    pub distinct_instructions: usize,
    pub comment_lines: usize,
    /// Comment lines over non-blank lines, 0.0 to 1.0.
    pub comment_ratio: f64,
    /// Distinct register names referenced.
    pub distinct_registers: usize,
    pub efficiency_score: f64,
    pub readability_score: f64,
    pub maintainability_score: f64,
}

/// One informational finding from the security scan. Unlike the screener,
/// the analyzer never blocks; it annotates.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityIssue {
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    /// 1-based line number of the offending line.
    pub line: usize,
    pub recommendation: String,
}

static INSTRUCTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(mov|movzx|movsx|lea|add|sub|mul|imul|div|idiv|inc|dec|neg|adc|sbb|and|or|xor|not|shl|shr|sal|sar|rol|ror|cmp|test|jmp|je|jne|jz|jnz|jg|jge|jl|jle|ja|jae|jb|jbe|js|jns|call|ret|push|pop|loop|nop|xchg|cdq|cqo|int|syscall|hlt|cli|sti|in|out|rdmsr|wrmsr)\b",
    )
    .unwrap()
});

static REGISTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(r[a-d]x|r[sd]i|r[sb]p|r(?:8|9|1[0-5])[bwd]?|e[a-d]x|e[sd]i|e[sb]p|[a-d]x|[a-d][lh]|[sd]il|[sb]pl)\b",
    )
    .unwrap()
});

static INDEXED_MEMORY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\s*\w+\s*[+*]\s*\w+").unwrap());

/// Splits a line into its code part and drops the `;` comment tail.
fn code_part(line: &str) -> &str {
    line.split(';').next().unwrap_or("").trim_end()
}

fn is_comment_line(line: &str) -> bool {
    line.trim_start().starts_with(';')
}

fn is_label_line(line: &str) -> bool {
    code_part(line).trim().ends_with(':')
}

fn is_directive_line(line: &str) -> bool {
    let code = code_part(line).trim_start().to_lowercase();
    ["section", "segment", "global", "extern", "bits", "default", "%"]
        .iter()
        .any(|d| code.starts_with(d))
}

/// The mnemonic of an instruction line, if the line holds one.
fn mnemonic(line: &str) -> Option<String> {
    if is_comment_line(line) || is_label_line(line) || is_directive_line(line) {
        return None;
    }
    let code = code_part(line).trim_start();
    INSTRUCTION_RE
        .find(code)
        .map(|m| m.as_str().to_lowercase())
}

/// Counts recognized instruction lines in the source.
pub fn instruction_count(source: &str) -> usize {
    source.lines().filter_map(mnemonic).count()
}

/// Distinct register names referenced anywhere outside comments.
pub fn distinct_registers(source: &str) -> usize {
    let mut registers: Vec<String> = source
        .lines()
        .filter(|line| !is_comment_line(line))
        .flat_map(|line| {
            REGISTER_RE
                .find_iter(code_part(line))
                .map(|m| m.as_str().to_lowercase())
        })
        .collect();
    registers.sort();
    registers.dedup();
    registers.len()
}

/// Comment lines over non-blank lines, 0.0 when the source is empty.
pub fn comment_ratio(source: &str) -> f64 {
    let non_blank = source.lines().filter(|l| !l.trim().is_empty()).count();
    if non_blank == 0 {
        return 0.0;
    }
    let with_comment = source
        .lines()
        .filter(|l| !l.trim().is_empty() && l.contains(';'))
        .count();
    with_comment as f64 / non_blank as f64
}

/// Whether every instruction line is either unindented or indented by at
/// least four columns. Labels, directives, comments, and blanks are exempt.
pub fn has_consistent_indentation(source: &str) -> bool {
    source
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| !is_comment_line(line) && !is_label_line(line) && !is_directive_line(line))
        .all(|line| {
            let indent = line.len() - line.trim_start().len();
            indent == 0 || indent >= 4
        })
}

/// Counts compare-then-conditional-branch pairs: a `cmp` or `test`
/// followed by a conditional jump before any other branching instruction.
pub fn comparison_branch_pairs(source: &str) -> usize {
    let mut pairs = 0;
    let mut pending_compare = false;
    for m in source.lines().filter_map(mnemonic) {
        match m.as_str() {
            "cmp" | "test" => pending_compare = true,
            "jmp" | "call" | "ret" => pending_compare = false,
            m if m.starts_with('j') => {
                if pending_compare {
                    pairs += 1;
                    pending_compare = false;
                }
            }
            _ => {}
        }
    }
    pairs
}

/// Computes static quality metrics for a submission.
pub fn analyze_quality(source: &str) -> QualityMetrics {
    let total_lines = source.lines().filter(|l| !l.trim().is_empty()).count();
    let comment_lines = source
        .lines()
        .filter(|l| !l.trim().is_empty() && l.contains(';'))
        .count();
    let ratio = comment_ratio(source);

    let mut mnemonics: Vec<String> = source.lines().filter_map(mnemonic).collect();
    let instruction_count = mnemonics.len();
    mnemonics.sort();
    mnemonics.dedup();
    let distinct_instructions = mnemonics.len();
    let distinct_registers = distinct_registers(source);

    let efficiency_score = match instruction_count {
        0 => 0.0,
        1..=25 => 100.0,
        26..=50 => 85.0,
        51..=100 => 70.0,
        _ => 50.0,
    };

    let indent_bonus = if has_consistent_indentation(source) && total_lines > 0 {
        30.0
    } else {
        0.0
    };
    let readability_score = ((ratio.min(0.5) / 0.5) * 70.0 + indent_bonus).min(100.0);

    let diversity = if instruction_count == 0 {
        0.0
    } else {
        ((distinct_instructions as f64 / 10.0).min(1.0)) * 100.0
    };
    let maintainability_score =
        (0.4 * readability_score + 0.3 * efficiency_score + 0.3 * diversity).min(100.0);

    QualityMetrics {
        total_lines,
        instruction_count,
        distinct_instructions,
        comment_lines,
        comment_ratio: ratio,
        distinct_registers,
        efficiency_score,
        readability_score,
        maintainability_score,
    }
}

/// Scans for security findings without blocking anything.
///
/// Denylist matches are annotated with the severity from the shared rule
/// table; on top of that, two heuristics flag unconditional jumps in code
/// that never compares anything, and indexed memory access with no bounds
/// comparison in sight.
pub fn analyze_security(source: &str) -> Vec<SecurityIssue> {
    let mut issues: Vec<SecurityIssue> = rules::scan(source)
        .into_iter()
        .map(|m| SecurityIssue {
            kind: m.rule.kind.to_string(),
            severity: m.rule.severity,
            description: format!("{} (`{}`)", m.rule.message, m.line_text),
            line: m.line,
            recommendation: m.rule.recommendation.to_string(),
        })
        .collect();

    let has_compare = source.lines().filter_map(mnemonic).any(|m| m == "cmp" || m == "test");

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        if let Some(m) = mnemonic(line) {
            if m == "jmp" && !has_compare {
                issues.push(SecurityIssue {
                    kind: "unbounded-jump".to_string(),
                    severity: Severity::Medium,
                    description: format!(
                        "unconditional jump with no comparison anywhere (`{}`)",
                        code_part(line).trim()
                    ),
                    line: line_no,
                    recommendation: "guard jumps with a cmp/test so loops can terminate"
                        .to_string(),
                });
            }
        }
        if !is_comment_line(line)
            && INDEXED_MEMORY_RE.is_match(code_part(line))
            && !has_compare
        {
            issues.push(SecurityIssue {
                kind: "unchecked-indexed-access".to_string(),
                severity: Severity::Low,
                description: format!(
                    "indexed memory access without a bounds comparison (`{}`)",
                    code_part(line).trim()
                ),
                line: line_no,
                recommendation: "compare the index against the buffer bound before dereferencing"
                    .to_string(),
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
section .text
global _start
_start:
    mov rax, 1      ; counter
    mov rbx, 10     ; bound
loop_top:
    cmp rax, rbx
    jge done
    inc rax
    jmp loop_top
done:
    ret
";

    #[test]
    fn test_quality_counts() {
        let metrics = analyze_quality(SAMPLE);
        assert_eq!(metrics.instruction_count, 7);
        assert_eq!(metrics.distinct_instructions, 6);
        assert_eq!(metrics.comment_lines, 2);
        assert!(metrics.distinct_registers >= 2);
        assert!(metrics.efficiency_score >= 85.0);
    }

    #[test]
    fn test_empty_source_has_zero_metrics() {
        let metrics = analyze_quality("");
        assert_eq!(metrics.total_lines, 0);
        assert_eq!(metrics.instruction_count, 0);
        assert_eq!(metrics.comment_ratio, 0.0);
    }

    #[test]
    fn test_comparison_branch_pairs() {
        assert_eq!(comparison_branch_pairs(SAMPLE), 1);
        assert_eq!(comparison_branch_pairs("    jmp somewhere\n"), 0);
        let two = "cmp rax, 1\nje a\ncmp rbx, 2\njne b\n";
        assert_eq!(comparison_branch_pairs(two), 2);
    }

    #[test]
    fn test_indentation_check() {
        assert!(has_consistent_indentation(SAMPLE));
        assert!(!has_consistent_indentation("  mov rax, 1\n"));
        assert!(has_consistent_indentation("label:\n    mov rax, 1\n"));
    }

    #[test]
    fn test_security_scan_annotates_denylist() {
        let issues = analyze_security("    hlt\n");
        assert!(issues.iter().any(|i| i.kind == "privileged-instruction"));
        let hlt = issues
            .iter()
            .find(|i| i.kind == "privileged-instruction")
            .unwrap();
        assert_eq!(hlt.severity, Severity::High);
        assert_eq!(hlt.line, 1);
    }

    #[test]
    fn test_unbounded_jump_heuristic() {
        let issues = analyze_security("top:\n    jmp top\n");
        assert!(issues.iter().any(|i| i.kind == "unbounded-jump"));
        // With a comparison present the heuristic stays quiet.
        let issues = analyze_security(SAMPLE);
        assert!(!issues.iter().any(|i| i.kind == "unbounded-jump"));
    }

    #[test]
    fn test_unchecked_indexed_access_heuristic() {
        let issues = analyze_security("    mov rax, [rbx + rcx]\n");
        assert!(issues.iter().any(|i| i.kind == "unchecked-indexed-access"));
    }
}
