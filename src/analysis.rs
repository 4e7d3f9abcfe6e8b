//! Canonical analysis record shared by every screen, narrator and report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel issue string used when nothing was found.
pub const NONE_VISIBLE: &str = "None visible";
/// Narration for a clean frame.
pub const COMPLIANT_NARRATION: &str = "No visible issues detected. Area appears compliant.";

pub const ERROR_CATEGORY: &str = "Error";
pub const ERROR_ISSUE: &str = "Analysis error";
pub const ERROR_COMPLIANCE: &str = "Unable to check compliance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Warning,
}

impl Severity {
    /// Map a provider's severity word. Unknown or missing words become `Warning`.
    pub fn from_provider(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Severity::Warning;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" | "severe" | "urgent" => Severity::Critical,
            "high" | "major" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" | "minor" => Severity::Low,
            _ => Severity::Warning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Warning => "warning",
        }
    }

    /// Critical and high findings lead the narration.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Severity::Critical | Severity::High)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Structural,
    Electrical,
    Plumbing,
    FireSafety,
    General,
}

impl Category {
    /// Map provider vocabulary onto the fixed category set.
    ///
    /// Words are matched whole, left to right; the first recognized word
    /// decides. Nothing recognized means `General`.
    pub fn from_provider(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Category::General;
        };
        raw.to_ascii_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .find_map(Self::from_word)
            .unwrap_or(Category::General)
    }

    fn from_word(word: &str) -> Option<Self> {
        let category = match word {
            "structural" | "structure" | "foundation" | "framing" | "rebar" | "beam" => {
                Category::Structural
            }
            "electrical" | "electric" | "wiring" | "circuit" | "outlet" => Category::Electrical,
            "plumbing" | "drain" | "drainage" | "sewer" => Category::Plumbing,
            "fire" | "firesafety" | "safety" | "egress" | "smoke" | "sprinkler" => {
                Category::FireSafety
            }
            "general" => Category::General,
            _ => return None,
        };
        Some(category)
    }

    /// Slug form, as serialized on a `Violation`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Structural => "structural",
            Category::Electrical => "electrical",
            Category::Plumbing => "plumbing",
            Category::FireSafety => "fire-safety",
            Category::General => "general",
        }
    }

    /// Display form, used for `Analysis::category`.
    pub fn label(&self) -> &'static str {
        match self {
            Category::FireSafety => "fire safety",
            other => other.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: String,
    /// Code reference; `"Unknown"` when the provider gave none.
    pub code: String,
    pub issue: String,
    pub severity: Severity,
    pub category: Category,
}

/// Which adapter produced an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Primary,
    Secondary,
    Degraded,
}

/// Canonical output. Built once by the normalizer and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub category: String,
    /// Never empty: `["None visible"]` when there are no findings.
    pub issues: Vec<String>,
    pub violations: Vec<Violation>,
    pub compliance: String,
    pub narration: String,
    /// 0–100.
    pub confidence: u8,
    pub timestamp: DateTime<Utc>,
    /// Diagnostic echo of the provider payload. Not for parsing.
    pub raw_text: String,
    pub provider: Provenance,
}

impl Analysis {
    /// A renderable result for when no real analysis could be produced.
    pub fn degraded(
        narration: impl Into<String>,
        raw_text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            category: ERROR_CATEGORY.into(),
            issues: vec![ERROR_ISSUE.into()],
            violations: Vec::new(),
            compliance: ERROR_COMPLIANCE.into(),
            narration: narration.into(),
            confidence: 0,
            timestamp,
            raw_text: raw_text.into(),
            provider: Provenance::Degraded,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.provider == Provenance::Degraded
    }

    pub fn has_urgent_violation(&self) -> bool {
        self.violations.iter().any(|v| v.severity.is_urgent())
    }
}
