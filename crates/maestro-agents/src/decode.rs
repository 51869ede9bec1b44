//! Reply decoding: strict JSON first, heuristic text recovery second.
//!
//! Providers are asked for fenced JSON but do not always comply. Decoding is
//! therefore total: when the reply carries no parseable JSON the recovery
//! path mines code fences, severity keywords and advice sections, and still
//! returns an output that conforms to the role's contract. Callers can tell
//! the two apart through [`DecodePath`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::contract::{
    AgentOutput, BugCategory, DebuggerOutput, GeneratedCode, IssueSeverity, ProposedFix, QaIssue,
    QaOutput, QaVerdict,
};
use crate::role::AgentRole;

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json[ \t]*\r?\n?(.*?)```").expect("valid regex"));

static CODE_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+.#-]*)[ \t]*\r?\n(.*?)```").expect("valid regex"));

/// Keyword buckets checked in order; the first bucket with a hit wins.
const CRITICAL_KEYWORDS: &[&str] = &[
    "critical",
    "severe",
    "blocker",
    "crash",
    "data loss",
    "vulnerability",
    "exploit",
];

const MAJOR_KEYWORDS: &[&str] = &[
    "major",
    "significant",
    "broken",
    "error",
    "bug",
    "incorrect",
    "fail",
];

const MINOR_KEYWORDS: &[&str] = &["minor", "cosmetic", "style", "nit", "typo", "suggestion"];

/// How a reply was turned into output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodePath {
    /// The reply carried JSON that matched the contract.
    Strict,
    /// The contract was reconstructed from plain text.
    Heuristic,
}

impl std::fmt::Display for DecodePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodePath::Strict => write!(f, "strict"),
            DecodePath::Heuristic => write!(f, "heuristic"),
        }
    }
}

/// A decoded value plus the path that produced it.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    /// The contract-conforming value.
    pub value: T,
    /// Which decode path succeeded.
    pub path: DecodePath,
}

/// Decodes a provider reply into the role's output contract.
///
/// Never fails: strict JSON decoding is attempted first, then the heuristic
/// recovery path, which always produces a conforming value.
pub fn decode_output(role: AgentRole, reply: &str) -> Decoded<AgentOutput> {
    if let Some(value) = decode_strict(role, reply) {
        debug!(role = %role, "reply decoded strictly");
        return Decoded {
            value,
            path: DecodePath::Strict,
        };
    }
    debug!(role = %role, "no usable json in reply, recovering from text");
    Decoded {
        value: recover(role, reply),
        path: DecodePath::Heuristic,
    }
}

fn decode_strict(role: AgentRole, reply: &str) -> Option<AgentOutput> {
    let json = json_candidate(reply)?;
    match role {
        AgentRole::Frontend | AgentRole::Backend => {
            let mut code: GeneratedCode = serde_json::from_str(&json).ok()?;
            if code.code.trim().is_empty() {
                return None;
            }
            if code.language.is_empty() {
                code.language = default_language(role).to_string();
            }
            Some(match role {
                AgentRole::Frontend => AgentOutput::Frontend(code),
                _ => AgentOutput::Backend(code),
            })
        }
        AgentRole::Qa => {
            let mut output: QaOutput = serde_json::from_str(&json).ok()?;
            output.score = output.score.clamp(0.0, 10.0);
            Some(AgentOutput::Qa(output))
        }
        AgentRole::Debugger => {
            let mut output: DebuggerOutput = serde_json::from_str(&json).ok()?;
            if output.diagnosis.trim().is_empty() {
                return None;
            }
            for fix in &mut output.fixes {
                fix.confidence = fix.confidence.min(100);
            }
            Some(AgentOutput::Debugger(output))
        }
    }
}

/// Extracts the most plausible JSON object from a reply.
///
/// Preference order: a ```json fence, any fence whose body starts with `{`,
/// then the first balanced object embedded in prose.
fn json_candidate(reply: &str) -> Option<String> {
    if let Some(caps) = JSON_FENCE_RE.captures(reply) {
        if let Some(body) = caps.get(1) {
            let trimmed = body.as_str().trim();
            if trimmed.starts_with('{') {
                return Some(trimmed.to_string());
            }
        }
    }
    for block in fenced_blocks(reply) {
        if block.body.trim_start().starts_with('{') {
            return Some(block.body.trim().to_string());
        }
    }
    first_json_object(reply).map(|s| s.to_string())
}

/// Finds the first balanced `{...}` in `text`, respecting string literals.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, byte) in text.bytes().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

struct FencedBlock {
    lang: String,
    body: String,
    /// Last non-empty prose line before the fence, if any.
    label: Option<String>,
}

fn fenced_blocks(reply: &str) -> Vec<FencedBlock> {
    let mut blocks = Vec::new();
    for caps in CODE_FENCE_RE.captures_iter(reply) {
        let Some(whole) = caps.get(0) else { continue };
        let lang = caps
            .get(1)
            .map(|m| m.as_str().trim().to_lowercase())
            .unwrap_or_default();
        let body = caps
            .get(2)
            .map(|m| m.as_str().trim_end().to_string())
            .unwrap_or_default();
        if body.trim().is_empty() {
            continue;
        }
        blocks.push(FencedBlock {
            lang,
            body,
            label: preceding_line(reply, whole.start()),
        });
    }
    blocks
}

fn preceding_line(text: &str, offset: usize) -> Option<String> {
    let line = text[..offset]
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())?;
    let cleaned = line
        .trim_start_matches(['#', '-', '*', '>'])
        .trim()
        .trim_end_matches(':')
        .trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Reply text with code fences removed, for prose-level scanning.
fn prose_of(reply: &str) -> String {
    CODE_FENCE_RE.replace_all(reply, "\n").into_owned()
}

/// Classifies text by severity keywords. Buckets are checked critical
/// first, so stronger words win over weaker ones in the same text.
fn classify_severity(text: &str) -> Option<IssueSeverity> {
    let lower = text.to_lowercase();
    for (keywords, severity) in [
        (CRITICAL_KEYWORDS, IssueSeverity::Critical),
        (MAJOR_KEYWORDS, IssueSeverity::Major),
        (MINOR_KEYWORDS, IssueSeverity::Minor),
    ] {
        if keywords.iter().any(|k| lower.contains(k)) {
            return Some(severity);
        }
    }
    None
}

/// Classifies text into a bug category by keyword buckets, first match wins.
fn classify_category(text: &str) -> BugCategory {
    let lower = text.to_lowercase();
    let buckets: &[(&[&str], BugCategory)] = &[
        (
            &["type error", "typeerror", "type mismatch", "not assignable"],
            BugCategory::TypeError,
        ),
        (
            &[
                "runtime",
                "exception",
                "panic",
                "crash",
                "stack trace",
                "null pointer",
                "undefined is not",
            ],
            BugCategory::RuntimeError,
        ),
        (
            &["logic", "off by one", "off-by-one", "wrong result", "incorrect output"],
            BugCategory::LogicError,
        ),
        (
            &["security", "vulnerab", "injection", "xss", "csrf", "exploit"],
            BugCategory::SecurityIssue,
        ),
        (
            &["performance", "slow", "latency", "memory leak", "n+1", "bottleneck"],
            BugCategory::PerformanceIssue,
        ),
        (
            &["integration", "schema mismatch", "version conflict", "incompatible"],
            BugCategory::IntegrationIssue,
        ),
    ];
    for (keywords, category) in buckets {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *category;
        }
    }
    BugCategory::General
}

/// Collects bullet items that follow a heading mentioning prevention or
/// testing. A non-bullet prose line ends the section.
fn extract_tips(prose: &str) -> Vec<String> {
    let mut tips = Vec::new();
    let mut in_section = false;
    for line in prose.lines() {
        let trimmed = line.trim();
        let is_heading = trimmed.starts_with('#') || trimmed.ends_with(':');
        if is_heading {
            let lower = trimmed.to_lowercase();
            in_section = lower.contains("prevent") || lower.contains("test");
            continue;
        }
        if !in_section {
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }
        match strip_bullet(trimmed) {
            Some(item) => tips.push(item.to_string()),
            None => in_section = false,
        }
    }
    tips
}

fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    // numbered items: "1. text" / "2) text"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(stripped) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(stripped.trim());
        }
    }
    None
}

fn default_language(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Frontend => "tsx",
        AgentRole::Backend => "ts",
        _ => "text",
    }
}

/// Heuristic recovery. Always produces a contract-conforming output.
fn recover(role: AgentRole, reply: &str) -> AgentOutput {
    match role {
        AgentRole::Frontend | AgentRole::Backend => {
            let code = recover_code(role, reply);
            match role {
                AgentRole::Frontend => AgentOutput::Frontend(code),
                _ => AgentOutput::Backend(code),
            }
        }
        AgentRole::Qa => AgentOutput::Qa(recover_qa(reply)),
        AgentRole::Debugger => AgentOutput::Debugger(recover_debugger(reply)),
    }
}

fn recover_code(role: AgentRole, reply: &str) -> GeneratedCode {
    let blocks: Vec<FencedBlock> = fenced_blocks(reply)
        .into_iter()
        .filter(|b| b.lang != "json")
        .collect();
    let notes = extract_tips(&prose_of(reply));
    if blocks.is_empty() {
        return GeneratedCode {
            code: reply.trim().to_string(),
            language: default_language(role).to_string(),
            notes,
        };
    }
    let language = blocks
        .iter()
        .find(|b| !b.lang.is_empty())
        .map(|b| b.lang.clone())
        .unwrap_or_else(|| default_language(role).to_string());
    let code = blocks
        .iter()
        .map(|b| b.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    GeneratedCode {
        code,
        language,
        notes,
    }
}

fn recover_qa(reply: &str) -> QaOutput {
    let prose = prose_of(reply);
    let tips = extract_tips(&prose);

    let mut issues = Vec::new();
    for line in prose.lines() {
        let Some(item) = strip_bullet(line.trim()) else {
            continue;
        };
        if item.len() < 4 {
            continue;
        }
        let index = issues.len();
        issues.push(QaIssue {
            severity: classify_severity(item).unwrap_or_default(),
            category: classify_category(item).as_str().to_string(),
            message: item.to_string(),
            recommendation: tips.get(index).cloned().unwrap_or_default(),
        });
    }
    if issues.is_empty() {
        if let Some(severity) = classify_severity(&prose) {
            let message = prose
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or("review produced no structured findings")
                .to_string();
            issues.push(QaIssue {
                severity,
                category: classify_category(&prose).as_str().to_string(),
                message,
                recommendation: tips.first().cloned().unwrap_or_default(),
            });
        }
    }

    let lower = prose.to_lowercase();
    let blocking = issues.iter().any(|i| i.severity.is_blocking());
    let overall_status = if blocking || lower.contains("fail") {
        QaVerdict::Fail
    } else if lower.contains("pass") {
        QaVerdict::Pass
    } else {
        QaVerdict::Fail
    };

    let mut score = 10.0f32;
    for issue in &issues {
        score -= match issue.severity {
            IssueSeverity::Critical => 3.0,
            IssueSeverity::Major => 2.0,
            IssueSeverity::Minor => 0.5,
        };
    }
    if issues.is_empty() {
        score = match overall_status {
            QaVerdict::Pass => 7.0,
            QaVerdict::Fail => 4.0,
        };
    }

    QaOutput {
        overall_status,
        score: score.clamp(0.0, 10.0),
        issues,
    }
}

fn recover_debugger(reply: &str) -> DebuggerOutput {
    let prose = prose_of(reply);
    let diagnosis = first_paragraph(&prose)
        .unwrap_or_else(|| "no diagnosis provided".to_string());

    let mut fixes: Vec<ProposedFix> = fenced_blocks(reply)
        .into_iter()
        .filter(|b| b.lang != "json")
        .map(|block| ProposedFix {
            description: block.label.unwrap_or_else(|| "proposed patch".to_string()),
            patch: block.body,
            impact: String::new(),
            confidence: 65,
        })
        .collect();
    for tip in extract_tips(&prose) {
        fixes.push(ProposedFix {
            description: tip,
            patch: String::new(),
            impact: "preventive".to_string(),
            confidence: 50,
        });
    }

    DebuggerOutput {
        severity: classify_severity(&prose).unwrap_or_default(),
        category: classify_category(&prose),
        diagnosis,
        fixes,
    }
}

fn first_paragraph(prose: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in prose.lines() {
        let trimmed = line.trim().trim_start_matches('#').trim();
        if trimmed.is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        lines.push(trimmed);
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_decode_from_json_fence() {
        let reply = "Here you go:\n```json\n{\"code\": \"const x = 1;\", \"language\": \"tsx\", \"notes\": []}\n```";
        let decoded = decode_output(AgentRole::Frontend, reply);
        assert_eq!(decoded.path, DecodePath::Strict);
        let code = decoded.value.as_code().unwrap();
        assert_eq!(code.code, "const x = 1;");
    }

    #[test]
    fn test_strict_decode_fills_default_language() {
        let reply = "```json\n{\"code\": \"app.get('/x')\"}\n```";
        let decoded = decode_output(AgentRole::Backend, reply);
        assert_eq!(decoded.path, DecodePath::Strict);
        assert_eq!(decoded.value.as_code().unwrap().language, "ts");
    }

    #[test]
    fn test_strict_decode_from_embedded_object() {
        let reply = "The review: {\"overall_status\": \"fail\", \"score\": 3, \"issues\": []} as requested.";
        let decoded = decode_output(AgentRole::Qa, reply);
        assert_eq!(decoded.path, DecodePath::Strict);
        assert!(!decoded.value.as_qa().unwrap().passed());
    }

    #[test]
    fn test_strict_decode_clamps_score() {
        let reply = "{\"overall_status\": \"pass\", \"score\": 42, \"issues\": []}";
        let decoded = decode_output(AgentRole::Qa, reply);
        assert_eq!(decoded.value.as_qa().unwrap().score, 10.0);
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_the_scan() {
        let reply = r#"{"overall_status": "pass", "score": 9, "issues": [{"severity": "minor", "message": "brace } in text"}]}"#;
        let decoded = decode_output(AgentRole::Qa, reply);
        assert_eq!(decoded.path, DecodePath::Strict);
        assert_eq!(decoded.value.as_qa().unwrap().issues.len(), 1);
    }

    #[test]
    fn test_code_recovery_joins_fenced_blocks() {
        let reply = "First part:\n```tsx\nconst A = 1;\n```\nSecond part:\n```tsx\nconst B = 2;\n```";
        let decoded = decode_output(AgentRole::Frontend, reply);
        assert_eq!(decoded.path, DecodePath::Heuristic);
        let code = decoded.value.as_code().unwrap();
        assert!(code.code.contains("const A = 1;"));
        assert!(code.code.contains("const B = 2;"));
        assert_eq!(code.language, "tsx");
    }

    #[test]
    fn test_code_recovery_without_fences_takes_whole_reply() {
        let decoded = decode_output(AgentRole::Backend, "just some text");
        assert_eq!(decoded.path, DecodePath::Heuristic);
        let code = decoded.value.as_code().unwrap();
        assert_eq!(code.code, "just some text");
        assert_eq!(code.language, "ts");
    }

    #[test]
    fn test_qa_recovery_classifies_bullets_by_keyword() {
        let reply = "Review findings:\n- critical vulnerability in the login handler\n- minor style issue in naming";
        let decoded = decode_output(AgentRole::Qa, reply);
        assert_eq!(decoded.path, DecodePath::Heuristic);
        let qa = decoded.value.as_qa().unwrap();
        assert_eq!(qa.issues.len(), 2);
        assert_eq!(qa.issues[0].severity, IssueSeverity::Critical);
        assert_eq!(qa.issues[1].severity, IssueSeverity::Minor);
        assert!(!qa.passed());
    }

    #[test]
    fn test_qa_recovery_critical_wins_over_minor_in_same_line() {
        let reply = "- a minor looking but actually critical flaw";
        let qa = decode_output(AgentRole::Qa, reply);
        assert_eq!(
            qa.value.as_qa().unwrap().issues[0].severity,
            IssueSeverity::Critical
        );
    }

    #[test]
    fn test_qa_recovery_plain_pass_text() {
        let decoded = decode_output(AgentRole::Qa, "Everything looks good, this is a pass.");
        let qa = decoded.value.as_qa().unwrap();
        assert!(qa.passed());
        assert_eq!(qa.score, 7.0);
        assert!(qa.issues.is_empty());
    }

    #[test]
    fn test_tips_collected_after_prevention_heading() {
        let reply = "Some analysis.\n\nHow to prevent this:\n- add an integration test\n- validate inputs at the boundary\n\nUnrelated paragraph.";
        let tips = extract_tips(reply);
        assert_eq!(tips.len(), 2);
        assert_eq!(tips[0], "add an integration test");
    }

    #[test]
    fn test_tips_section_ends_at_prose() {
        let reply = "Testing:\n- cover the empty case\nThis sentence ends the list.\n- this bullet is not a tip";
        let tips = extract_tips(reply);
        assert_eq!(tips, vec!["cover the empty case".to_string()]);
    }

    #[test]
    fn test_debugger_recovery_classifies_and_patches() {
        let reply = "The handler crashes on a null pointer when the body is empty.\n\nApply this fix:\n```ts\nif (!body) return res.status(400);\n```";
        let decoded = decode_output(AgentRole::Debugger, reply);
        assert_eq!(decoded.path, DecodePath::Heuristic);
        let debug = decoded.value.as_debugger().unwrap();
        assert_eq!(debug.category, BugCategory::RuntimeError);
        assert_eq!(debug.severity, IssueSeverity::Critical);
        assert_eq!(debug.fixes.len(), 1);
        assert_eq!(debug.fixes[0].description, "Apply this fix");
        assert!(debug.fixes[0].patch.contains("status(400)"));
        assert_eq!(debug.fixes[0].confidence, 65);
    }

    #[test]
    fn test_debugger_recovery_turns_tips_into_preventive_fixes() {
        let reply = "Race condition in the cache.\n\nPreventive measures:\n- take the lock before the read";
        let debug = decode_output(AgentRole::Debugger, reply);
        let output = debug.value.as_debugger().unwrap();
        assert_eq!(output.fixes.len(), 1);
        assert_eq!(output.fixes[0].confidence, 50);
        assert_eq!(output.fixes[0].impact, "preventive");
    }

    #[test]
    fn test_recovery_never_panics_on_junk() {
        for reply in ["", "```", "{{{{", "}{", "```json\nnot json\n```", "🦀🦀🦀"] {
            for role in [
                AgentRole::Frontend,
                AgentRole::Backend,
                AgentRole::Qa,
                AgentRole::Debugger,
            ] {
                let decoded = decode_output(role, reply);
                assert_eq!(decoded.value.role(), role);
            }
        }
    }

    #[test]
    fn test_empty_debugger_reply_gets_placeholder_diagnosis() {
        let decoded = decode_output(AgentRole::Debugger, "");
        let output = decoded.value.as_debugger().unwrap();
        assert_eq!(output.diagnosis, "no diagnosis provided");
        assert_eq!(output.category, BugCategory::General);
        assert_eq!(output.severity, IssueSeverity::Minor);
    }

    #[test]
    fn test_category_bucket_order_is_stable() {
        assert_eq!(classify_category("a type mismatch"), BugCategory::TypeError);
        assert_eq!(classify_category("sql injection risk"), BugCategory::SecurityIssue);
        assert_eq!(classify_category("n+1 query storm"), BugCategory::PerformanceIssue);
        assert_eq!(classify_category("nothing matches here"), BugCategory::General);
    }
}
