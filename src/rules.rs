use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Severity of a denylist rule or heuristic finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One entry of the instruction denylist.
///
/// The same table drives both the security screener (which blocks) and the
/// static analyzer (which annotates), so the two can never drift apart.
#[derive(Debug)]
pub struct DenyRule {
    /// Family of the rule, e.g. "privileged-instruction".
    pub kind: &'static str,
    pub severity: Severity,
    /// Human-readable name of the matched construct.
    pub pattern: &'static str,
    /// Regex applied to the submission text.
    pub regex: &'static str,
    pub message: &'static str,
    pub recommendation: &'static str,
}

/// Denylisted instruction families for user-submitted x86-64 assembly.
///
/// Submissions run as ordinary user processes, so most of these would fault
/// anyway; screening them out up front gives a clear diagnostic instead of a
/// SIGILL and keeps deliberate probing cheap to reject.
pub static DENY_RULES: &[DenyRule] = &[
    DenyRule {
        kind: "privileged-instruction",
        severity: Severity::High,
        pattern: "hlt",
        regex: r"(?im)^\s*hlt\b",
        message: "halt instruction is not permitted",
        recommendation: "terminate via the exit convention provided by the runtime",
    },
    DenyRule {
        kind: "privileged-instruction",
        severity: Severity::High,
        pattern: "cli",
        regex: r"(?im)^\s*cli\b",
        message: "disabling interrupts is not permitted",
        recommendation: "remove interrupt-flag manipulation",
    },
    DenyRule {
        kind: "privileged-instruction",
        severity: Severity::High,
        pattern: "sti",
        regex: r"(?im)^\s*sti\b",
        message: "enabling interrupts is not permitted",
        recommendation: "remove interrupt-flag manipulation",
    },
    DenyRule {
        kind: "privileged-instruction",
        severity: Severity::High,
        pattern: "in/out",
        regex: r"(?im)^\s*(?:in|out|insb|insw|insd|outsb|outsw|outsd)\b",
        message: "port I/O instructions are not permitted",
        recommendation: "use standard input/output instead of port I/O",
    },
    DenyRule {
        kind: "interrupt",
        severity: Severity::High,
        pattern: "int",
        regex: r"(?im)^\s*int\b",
        message: "software interrupts are not permitted",
        recommendation: "use the I/O facilities provided by the exercise runtime",
    },
    DenyRule {
        kind: "syscall",
        severity: Severity::Medium,
        pattern: "syscall",
        regex: r"(?im)^\s*(?:syscall|sysenter)\b",
        message: "direct system calls are not permitted",
        recommendation: "use the I/O facilities provided by the exercise runtime",
    },
    DenyRule {
        kind: "control-register",
        severity: Severity::High,
        pattern: "cr0-cr4",
        regex: r"(?i)\bmov\b[^;\n]*\bcr[0-4]\b",
        message: "control register access is not permitted",
        recommendation: "remove control register manipulation",
    },
    DenyRule {
        kind: "msr",
        severity: Severity::Medium,
        pattern: "rdmsr/wrmsr",
        regex: r"(?im)^\s*(?:rdmsr|wrmsr)\b",
        message: "model-specific register access is not permitted",
        recommendation: "remove MSR access",
    },
    DenyRule {
        kind: "descriptor-table",
        severity: Severity::High,
        pattern: "lgdt/lidt",
        regex: r"(?im)^\s*(?:lgdt|lidt|lldt|sgdt|sidt|sldt)\b",
        message: "descriptor table operations are not permitted",
        recommendation: "remove descriptor table manipulation",
    },
];

static COMPILED_RULES: Lazy<Vec<(Regex, &'static DenyRule)>> = Lazy::new(|| {
    DENY_RULES
        .iter()
        .map(|rule| {
            let re = Regex::new(rule.regex)
                .unwrap_or_else(|e| panic!("invalid deny rule regex `{}`: {e}", rule.regex));
            (re, rule)
        })
        .collect()
});

/// Returns the first denylist rule the source matches, if any.
pub fn find_violation(source: &str) -> Option<&'static DenyRule> {
    COMPILED_RULES
        .iter()
        .find(|(re, _)| re.is_match(source))
        .map(|(_, rule)| *rule)
}

/// A single denylist match with its location in the source.
#[derive(Debug)]
pub struct RuleMatch {
    pub rule: &'static DenyRule,
    /// 1-based line number of the first offending line.
    pub line: usize,
    pub line_text: String,
}

/// Returns every denylist match in the source, one entry per matching rule.
pub fn scan(source: &str) -> Vec<RuleMatch> {
    let mut matches = Vec::new();
    for (re, rule) in COMPILED_RULES.iter() {
        if let Some(m) = re.find(source) {
            let line = source[..m.start()].matches('\n').count() + 1;
            let line_text = source
                .lines()
                .nth(line - 1)
                .unwrap_or_default()
                .trim()
                .to_string();
            matches.push(RuleMatch {
                rule,
                line,
                line_text,
            });
        }
    }
    matches
}
