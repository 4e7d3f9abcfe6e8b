//! Maps a provider result onto the canonical `Analysis`.
//!
//! Provider-agnostic: two providers describing the same violation produce the
//! same category and a narration of the same shape.

use chrono::{DateTime, Utc};

use crate::ai::{AnalysisContext, RawProviderResult, RawViolation, UNAVAILABLE_NARRATION};
use crate::analysis::{
    Analysis, Category, Provenance, Severity, Violation, COMPLIANT_NARRATION, NONE_VISIBLE,
};

const UNKNOWN_CODE: &str = "Unknown";
const UNSPECIFIED_ISSUE: &str = "Unspecified issue";

/// Normalize, stamping the current time.
pub fn normalize(
    raw: &RawProviderResult,
    provider: Provenance,
    context: &AnalysisContext,
) -> Analysis {
    normalize_at(raw, provider, context, Utc::now())
}

/// Normalize with an explicit timestamp. Same inputs, same output.
pub fn normalize_at(
    raw: &RawProviderResult,
    provider: Provenance,
    context: &AnalysisContext,
    timestamp: DateTime<Utc>,
) -> Analysis {
    if let Some(error) = &raw.error {
        log::debug!("Normalizing unavailable result: {}", error);
        let narration = raw.narration.as_deref().unwrap_or(UNAVAILABLE_NARRATION);
        return Analysis::degraded(narration, raw.raw_text.clone(), timestamp);
    }

    let violations: Vec<Violation> = raw
        .violations
        .iter()
        .enumerate()
        .map(|(i, v)| to_violation(v, i, context))
        .collect();

    let summary = raw.summary.trim();
    let lead = lead_violation(&violations);

    let category = match lead {
        Some(v) => v.category.label().to_string(),
        None => Category::from_provider(raw.category.as_deref()).label().to_string(),
    };

    let issues = if violations.is_empty() {
        vec![NONE_VISIBLE.to_string()]
    } else {
        violations
            .iter()
            .map(|v| format!("{}: {}", v.code, v.issue))
            .collect()
    };

    let compliance = if !summary.is_empty() {
        summary.to_string()
    } else if violations.is_empty() {
        "No violations detected".to_string()
    } else {
        format!("{} potential violation(s) found", violations.len())
    };

    Analysis {
        category,
        issues,
        narration: narration(&violations, summary),
        compliance,
        violations,
        confidence: normalize_confidence(raw.confidence),
        timestamp,
        raw_text: raw.raw_text.clone(),
        provider,
    }
}

fn to_violation(raw: &RawViolation, index: usize, context: &AnalysisContext) -> Violation {
    let id = raw.id.clone().unwrap_or_else(|| {
        format!("{}-{}-{}", context.session_id, context.frame_number, index + 1)
    });
    let code = raw
        .code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(UNKNOWN_CODE)
        .to_string();
    let issue = match raw.issue.trim() {
        "" => UNSPECIFIED_ISSUE.to_string(),
        s => s.to_string(),
    };

    Violation {
        id,
        code,
        issue,
        severity: Severity::from_provider(raw.severity.as_deref()),
        category: Category::from_provider(raw.category.as_deref()),
    }
}

/// First critical/high violation, else the first violation.
fn lead_violation(violations: &[Violation]) -> Option<&Violation> {
    violations
        .iter()
        .find(|v| v.severity.is_urgent())
        .or_else(|| violations.first())
}

fn narration(violations: &[Violation], summary: &str) -> String {
    let Some(lead) = lead_violation(violations) else {
        return COMPLIANT_NARRATION.to_string();
    };
    let issue = lead.issue.trim_end_matches('.');

    let sentence = if lead.severity.is_urgent() {
        format!(
            "{} issue detected: {}. {}",
            lead.severity.as_str().to_uppercase(),
            issue,
            summary
        )
    } else {
        format!("Found {} issue(s): {}. {}", violations.len(), issue, summary)
    };
    sentence.trim_end().to_string()
}

/// Providers report either 0–100 or 0–1; clamp to a 0–100 integer.
fn normalize_confidence(raw: f64) -> u8 {
    if !raw.is_finite() || raw <= 0.0 {
        return 0;
    }
    let scaled = if raw < 1.0 { raw * 100.0 } else { raw };
    scaled.round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> AnalysisContext {
        AnalysisContext {
            project_type: "residential".into(),
            jurisdiction: "Honolulu".into(),
            session_id: "sess".into(),
            frame_number: 3,
        }
    }

    fn violation(code: &str, issue: &str, severity: &str, category: &str) -> RawViolation {
        RawViolation {
            id: None,
            code: Some(code.into()),
            issue: issue.into(),
            severity: Some(severity.into()),
            category: Some(category.into()),
        }
    }

    #[test]
    fn empty_result_is_compliant() {
        let raw = RawProviderResult {
            summary: "No violations detected".into(),
            confidence: 95.0,
            ..Default::default()
        };
        let a = normalize(&raw, Provenance::Primary, &ctx());
        assert_eq!(a.issues, vec!["None visible".to_string()]);
        assert_eq!(a.narration, "No visible issues detected. Area appears compliant.");
        assert_eq!(a.category, "general");
        assert_eq!(a.compliance, "No violations detected");
        assert_eq!(a.confidence, 95);
        assert!(a.violations.is_empty());
    }

    #[test]
    fn critical_violation_leads_narration() {
        let raw = RawProviderResult {
            violations: vec![violation("HBC 1808.3", "Missing rebar", "critical", "structural")],
            summary: "Structural deficiency".into(),
            confidence: 80.0,
            ..Default::default()
        };
        let a = normalize(&raw, Provenance::Primary, &ctx());
        assert_eq!(a.category, "structural");
        assert_eq!(a.issues, vec!["HBC 1808.3: Missing rebar".to_string()]);
        assert!(a.narration.starts_with("CRITICAL issue detected: Missing rebar."));
        assert_eq!(
            a.narration,
            "CRITICAL issue detected: Missing rebar. Structural deficiency"
        );
        assert_eq!(a.violations[0].id, "sess-3-1");
        assert_eq!(a.confidence, 80);
    }

    #[test]
    fn non_urgent_violations_are_counted() {
        let raw = RawProviderResult {
            violations: vec![
                violation("IRC R311.7", "Uneven stair risers", "medium", "general"),
                violation("", "Peeling paint", "low", "finish"),
            ],
            summary: "Minor issues".into(),
            ..Default::default()
        };
        let a = normalize(&raw, Provenance::Secondary, &ctx());
        assert_eq!(a.narration, "Found 2 issue(s): Uneven stair risers. Minor issues");
        assert_eq!(
            a.issues,
            vec![
                "IRC R311.7: Uneven stair risers".to_string(),
                "Unknown: Peeling paint".to_string()
            ]
        );
        assert_eq!(a.issues.len(), a.violations.len());
    }

    #[test]
    fn urgent_violation_preferred_over_first() {
        let raw = RawProviderResult {
            violations: vec![
                violation("A", "Scuffed wall", "low", "general"),
                violation("NEC 406.4", "Exposed live wire.", "high", "electrical"),
            ],
            ..Default::default()
        };
        let a = normalize(&raw, Provenance::Primary, &ctx());
        assert_eq!(a.category, "electrical");
        assert_eq!(a.narration, "HIGH issue detected: Exposed live wire.");
        assert_eq!(a.compliance, "2 potential violation(s) found");
    }

    #[test]
    fn provider_vocabulary_is_unified() {
        let primary = RawProviderResult {
            violations: vec![violation("IRC R314", "No smoke alarm", "high", "safety")],
            summary: "s".into(),
            ..Default::default()
        };
        let secondary = RawProviderResult {
            violations: vec![violation("IRC R314", "No smoke alarm", "HIGH", "fire-safety")],
            summary: "s".into(),
            ..Default::default()
        };
        let ts = Utc::now();
        let a = normalize_at(&primary, Provenance::Primary, &ctx(), ts);
        let b = normalize_at(&secondary, Provenance::Secondary, &ctx(), ts);
        assert_eq!(a.category, "fire safety");
        assert_eq!(a.category, b.category);
        assert_eq!(a.narration, b.narration);
        assert_eq!(a.violations, b.violations);
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = RawProviderResult {
            violations: vec![violation("X", "Y", "critical", "plumbing")],
            summary: "Z".into(),
            confidence: 0.42,
            raw_text: "{...}".into(),
            ..Default::default()
        };
        let ts = Utc::now();
        let a = normalize_at(&raw, Provenance::Primary, &ctx(), ts);
        let b = normalize_at(&raw, Provenance::Primary, &ctx(), ts);
        assert_eq!(a, b);
        assert_eq!(a.confidence, 42);
        assert_eq!(a.raw_text, "{...}");
    }

    #[test]
    fn unavailable_becomes_degraded() {
        let raw = RawProviderResult::unavailable("primary and secondary failed");
        let a = normalize(&raw, Provenance::Degraded, &ctx());
        assert_eq!(a.category, "Error");
        assert_eq!(a.issues, vec!["Analysis error".to_string()]);
        assert_eq!(a.compliance, "Unable to check compliance");
        assert_eq!(a.narration, UNAVAILABLE_NARRATION);
        assert!(a.is_degraded());
    }

    #[test]
    fn provider_ids_are_kept() {
        let mut v = violation("C", "I", "low", "general");
        v.id = Some("v-99".into());
        let raw = RawProviderResult {
            violations: vec![v],
            ..Default::default()
        };
        let a = normalize(&raw, Provenance::Primary, &ctx());
        assert_eq!(a.violations[0].id, "v-99");
    }

    #[test]
    fn confidence_scaling() {
        assert_eq!(normalize_confidence(0.0), 0);
        assert_eq!(normalize_confidence(-5.0), 0);
        assert_eq!(normalize_confidence(f64::NAN), 0);
        assert_eq!(normalize_confidence(0.875), 88);
        assert_eq!(normalize_confidence(1.0), 1);
        assert_eq!(normalize_confidence(73.4), 73);
        assert_eq!(normalize_confidence(250.0), 100);
    }
}
