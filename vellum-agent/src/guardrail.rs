//! Input/output guardrails and their composites.
//!
//! A guardrail inspects text and either passes it (possibly
//! transformed), passes it with a warning, or blocks it. Input
//! guardrails run on the user text before the first LLM call; output
//! guardrails run on every assistant textual response.

use std::sync::Arc;

use regex::Regex;
use tracing::warn;

/// Outcome of one guardrail check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardrailVerdict {
    /// Allowed; carries the (possibly transformed) text.
    Ok(String),
    /// Allowed with a warning; carries the original text.
    Warn(String),
    /// Blocked, with the reason.
    Fail(String),
}

/// A validator over model input or output text.
pub trait Guardrail: Send + Sync {
    /// Name used in logs and failure reasons.
    fn name(&self) -> &str;

    /// Check the text.
    fn check(&self, text: &str) -> GuardrailVerdict;
}

/// Run a guardrail chain the way the agent does: thread transformed
/// text forward, log warnings, stop on the first failure.
pub(crate) fn run_chain(
    guardrails: &[Arc<dyn Guardrail>],
    text: &str,
) -> Result<String, String> {
    let mut current = text.to_string();
    for guardrail in guardrails {
        match guardrail.check(&current) {
            GuardrailVerdict::Ok(transformed) => current = transformed,
            GuardrailVerdict::Warn(original) => {
                warn!(guardrail = guardrail.name(), "guardrail warning");
                current = original;
            }
            GuardrailVerdict::Fail(reason) => {
                return Err(format!("guardrail '{}' blocked: {reason}", guardrail.name()));
            }
        }
    }
    Ok(current)
}

// ─── Composites ──────────────────────────────────────────────────────────────

struct AllGuardrail {
    name: String,
    inner: Vec<Arc<dyn Guardrail>>,
}

impl Guardrail for AllGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, text: &str) -> GuardrailVerdict {
        let mut current = text.to_string();
        let mut failures = Vec::new();
        let mut warned = false;
        for guardrail in &self.inner {
            match guardrail.check(&current) {
                GuardrailVerdict::Ok(transformed) => current = transformed,
                GuardrailVerdict::Warn(original) => {
                    warned = true;
                    current = original;
                }
                GuardrailVerdict::Fail(reason) => {
                    failures.push(format!("{}: {reason}", guardrail.name()));
                }
            }
        }
        if !failures.is_empty() {
            GuardrailVerdict::Fail(failures.join("; "))
        } else if warned {
            GuardrailVerdict::Warn(current)
        } else {
            GuardrailVerdict::Ok(current)
        }
    }
}

struct AnyGuardrail {
    name: String,
    inner: Vec<Arc<dyn Guardrail>>,
}

impl Guardrail for AnyGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, text: &str) -> GuardrailVerdict {
        let mut failures = Vec::new();
        for guardrail in &self.inner {
            match guardrail.check(text) {
                verdict @ (GuardrailVerdict::Ok(_) | GuardrailVerdict::Warn(_)) => {
                    return verdict;
                }
                GuardrailVerdict::Fail(reason) => {
                    failures.push(format!("{}: {reason}", guardrail.name()));
                }
            }
        }
        GuardrailVerdict::Fail(failures.join("; "))
    }
}

struct SequentialGuardrail {
    name: String,
    inner: Vec<Arc<dyn Guardrail>>,
}

impl Guardrail for SequentialGuardrail {
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, text: &str) -> GuardrailVerdict {
        let mut current = text.to_string();
        let mut warned = false;
        for guardrail in &self.inner {
            match guardrail.check(&current) {
                GuardrailVerdict::Ok(transformed) => current = transformed,
                GuardrailVerdict::Warn(original) => {
                    warned = true;
                    current = original;
                }
                GuardrailVerdict::Fail(reason) => {
                    return GuardrailVerdict::Fail(format!("{}: {reason}", guardrail.name()));
                }
            }
        }
        if warned {
            GuardrailVerdict::Warn(current)
        } else {
            GuardrailVerdict::Ok(current)
        }
    }
}

/// AND-composite: every guardrail runs, failures accumulate.
#[must_use]
pub fn all(guardrails: Vec<Arc<dyn Guardrail>>) -> Arc<dyn Guardrail> {
    Arc::new(AllGuardrail {
        name: "all".into(),
        inner: guardrails,
    })
}

/// OR-composite: the first success wins; all must fail to block.
#[must_use]
pub fn any(guardrails: Vec<Arc<dyn Guardrail>>) -> Arc<dyn Guardrail> {
    Arc::new(AnyGuardrail {
        name: "any".into(),
        inner: guardrails,
    })
}

/// Chain-composite: short-circuits on the first failure, feeding each
/// transform into the next check.
#[must_use]
pub fn sequential(guardrails: Vec<Arc<dyn Guardrail>>) -> Arc<dyn Guardrail> {
    Arc::new(SequentialGuardrail {
        name: "sequential".into(),
        inner: guardrails,
    })
}

// ─── Presets ─────────────────────────────────────────────────────────────────

struct PatternGuardrail {
    name: &'static str,
    patterns: Vec<Regex>,
    reason: &'static str,
}

impl Guardrail for PatternGuardrail {
    fn name(&self) -> &str {
        self.name
    }

    fn check(&self, text: &str) -> GuardrailVerdict {
        if self.patterns.iter().any(|p| p.is_match(text)) {
            GuardrailVerdict::Fail(self.reason.to_string())
        } else {
            GuardrailVerdict::Ok(text.to_string())
        }
    }
}

/// Blocks text carrying obvious personally identifying information:
/// email addresses, phone numbers, and SSN-shaped identifiers.
#[must_use]
pub fn pii_guardrail() -> Arc<dyn Guardrail> {
    Arc::new(PatternGuardrail {
        name: "pii",
        patterns: vec![
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("static pattern"),
            Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("static pattern"),
            Regex::new(r"\+?\d[\d\s().-]{8,}\d").expect("static pattern"),
        ],
        reason: "text contains personally identifying information",
    })
}

/// Blocks common prompt-injection phrasings.
#[must_use]
pub fn injection_guardrail() -> Arc<dyn Guardrail> {
    Arc::new(PatternGuardrail {
        name: "injection",
        patterns: vec![
            Regex::new(r"(?i)ignore\s+(all\s+)?(previous|prior|above)\s+instructions")
                .expect("static pattern"),
            Regex::new(r"(?i)disregard\s+(your|the|all)\s+(instructions|rules|guidelines)")
                .expect("static pattern"),
            Regex::new(r"(?i)reveal\s+(your|the)\s+system\s+prompt").expect("static pattern"),
        ],
        reason: "text looks like a prompt injection attempt",
    })
}

struct LengthGuardrail {
    max_chars: usize,
}

impl Guardrail for LengthGuardrail {
    fn name(&self) -> &str {
        "length"
    }

    fn check(&self, text: &str) -> GuardrailVerdict {
        if text.len() > self.max_chars {
            GuardrailVerdict::Fail(format!(
                "text is {} chars, limit is {}",
                text.len(),
                self.max_chars
            ))
        } else {
            GuardrailVerdict::Ok(text.to_string())
        }
    }
}

/// Blocks text longer than `max_chars`.
#[must_use]
pub fn length_guardrail(max_chars: usize) -> Arc<dyn Guardrail> {
    Arc::new(LengthGuardrail { max_chars })
}
