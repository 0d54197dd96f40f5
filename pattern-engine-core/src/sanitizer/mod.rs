//! C8: Sanitizer / Trust — validates pattern content on ingest, rejects
//! prompt-injection payloads, and assigns a trust level.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

use crate::config::{SanitizeAction, SecurityConfig, TrustLevel};
use crate::error::{Error, Result};
use crate::pattern::MAX_CONTENT_BYTES;

/// Risk level of a deny-pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Risk {
    Low,
    Medium,
    High,
}

struct DenyRule {
    name: &'static str,
    pattern: &'static str,
    risk: Risk,
}

/// Default deny patterns: instruction override, role hijack, special
/// tokens, and external-link exfiltration shapes.
const DENY_RULES: &[DenyRule] = &[
    DenyRule {
        name: "instruction_override",
        pattern: r"(?i)ignore (all )?previous instructions",
        risk: Risk::High,
    },
    DenyRule {
        name: "instruction_override_system",
        pattern: r"(?i)disregard (the )?(system|above) prompt",
        risk: Risk::High,
    },
    DenyRule {
        name: "role_hijack",
        pattern: r"(?i)you are now\b",
        risk: Risk::High,
    },
    DenyRule {
        name: "role_hijack_pretend",
        pattern: r"(?i)pretend (to be|you are)\b",
        risk: Risk::Medium,
    },
    DenyRule {
        name: "special_token",
        pattern: r"<\|[^|>]*\|>",
        risk: Risk::High,
    },
    DenyRule {
        name: "special_token_inst",
        pattern: r"\[/?INST\]",
        risk: Risk::High,
    },
    DenyRule {
        name: "exfiltration_link",
        pattern: r"(?i)https?://[^\s]+\?(data|token|secret|key)=",
        risk: Risk::Medium,
    },
];

fn compiled_rules() -> &'static Vec<(Regex, Risk, &'static str)> {
    static RULES: OnceLock<Vec<(Regex, Risk, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        DENY_RULES
            .iter()
            .filter_map(|rule| {
                Regex::new(rule.pattern)
                    .map(|re| (re, rule.risk, rule.name))
                    .ok()
            })
            .collect()
    })
}

/// A deny-pattern match found during sanitization.
#[derive(Debug, Clone)]
pub struct Detection {
    pub rule: &'static str,
    pub risk: Risk,
    pub matched_text: String,
}

/// Outcome of running content through the sanitizer.
#[derive(Debug, Clone)]
pub struct SanitizeOutcome {
    pub content: String,
    pub detections: Vec<Detection>,
    pub trust: TrustLevel,
}

/// Run the sanitizer pipeline: normalise Unicode, scan deny patterns,
/// enforce length, assign trust. Does not compute the content hash —
/// callers must call `Pattern::rehash()` after sanitization so the hash
/// always reflects post-strip content.
pub fn sanitize(
    raw_content: &str,
    source_trust: TrustLevel,
    config: &SecurityConfig,
) -> Result<SanitizeOutcome> {
    // 1. Normalise Unicode (NFC), then strip control characters. NFC runs
    // first so combining-character/alternate-composition tricks can't
    // evade the deny-pattern scan in step 2.
    let normalised: String = raw_content
        .nfc()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    // 2. Scan deny patterns.
    let mut detections = Vec::new();
    let mut content = normalised;
    for (regex, risk, name) in compiled_rules() {
        if let Some(m) = regex.find(&content) {
            detections.push(Detection {
                rule: name,
                risk: *risk,
                matched_text: m.as_str().to_string(),
            });
        }
    }

    if !detections.is_empty() {
        let worst = detections.iter().map(|d| d.risk).max().unwrap_or(Risk::Low);
        match config.sanitize_on_detect {
            SanitizeAction::Reject => {
                return Err(Error::SecurityReject(format!(
                    "{} deny-pattern match(es), worst risk {worst:?}",
                    detections.len()
                )));
            }
            SanitizeAction::Strip => {
                for (regex, _, _) in compiled_rules() {
                    content = regex.replace_all(&content, "[redacted]").into_owned();
                }
            }
            SanitizeAction::Warn => {
                warn!(count = detections.len(), "sanitizer detected but did not strip content");
            }
        }
    }

    // 3. Enforce length.
    if content.len() > config.max_content_chars.max(MAX_CONTENT_BYTES.min(config.max_content_chars)) {
        return Err(Error::SecurityReject(format!(
            "content exceeds {} chars",
            config.max_content_chars
        )));
    }

    Ok(SanitizeOutcome {
        content,
        detections,
        trust: source_trust,
    })
}

/// Whether `trust` meets or exceeds `minimum` (trust levels are totally
/// ordered: untrusted < community < verified < team < owner).
#[must_use]
pub fn meets_minimum_trust(trust: TrustLevel, minimum: TrustLevel) -> bool {
    trust >= minimum
}
