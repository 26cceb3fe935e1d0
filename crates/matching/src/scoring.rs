use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use relance_core::types::{Document, Line};

use crate::normalize;

/// A scored pairing between a document and one candidate line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub document_id: Uuid,
    pub line_id: Uuid,
    pub confidence: f64,
    pub reasons: Vec<String>,
}

/// Per-signal contribution, in hundredths of confidence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub amount_points: u32,
    pub date_points: u32,
    pub text_points: u32,
    pub reasons: Vec<String>,
}

impl ScoreBreakdown {
    pub fn total_points(&self) -> u32 {
        (self.amount_points + self.date_points + self.text_points).min(100)
    }

    /// Confidence in [0, 1].
    pub fn confidence(&self) -> f64 {
        f64::from(self.total_points()) / 100.0
    }
}

/// Scores documents against lines with three independent signals: amount
/// proximity, date proximity, and vendor/label text overlap.
///
/// Points are summed as integers so threshold comparisons are exact.
#[derive(Debug, Clone, Default)]
pub struct MatchScorer;

impl MatchScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score(&self, document: &Document, line: &Line) -> ScoreBreakdown {
        let mut breakdown = ScoreBreakdown::default();

        if let Some(amount) = document.amount {
            let (points, reason) = Self::amount_signal(amount, line.amount);
            breakdown.amount_points = points;
            breakdown.reasons.extend(reason);
        }

        if let Some(date) = document.document_date {
            let (points, reason) = Self::date_signal(date, line.transaction_date);
            breakdown.date_points = points;
            breakdown.reasons.extend(reason);
        }

        if let Some(vendor) = document.vendor.as_deref() {
            let (points, reason) = Self::text_signal(vendor, &line.label);
            breakdown.text_points = points;
            breakdown.reasons.extend(reason);
        }

        breakdown
    }

    /// Scores every candidate, keeps those at or above `min_confidence`, and
    /// ranks by confidence, then oldest line, then line id.
    pub fn rank(
        &self,
        document: &Document,
        candidates: &[Line],
        min_confidence: f64,
    ) -> Vec<MatchProposal> {
        let mut scored: Vec<(&Line, ScoreBreakdown)> = candidates
            .iter()
            .map(|line| (line, self.score(document, line)))
            .filter(|(_, s)| s.confidence() >= min_confidence)
            .collect();

        scored.sort_by(|(la, sa), (lb, sb)| {
            sb.total_points()
                .cmp(&sa.total_points())
                .then_with(|| la.created_at.cmp(&lb.created_at))
                .then_with(|| la.id.cmp(&lb.id))
        });

        scored
            .into_iter()
            .map(|(line, s)| MatchProposal {
                document_id: document.id,
                line_id: line.id,
                confidence: s.confidence(),
                reasons: s.reasons,
            })
            .collect()
    }

    fn amount_signal(doc_amount: Decimal, line_amount: Decimal) -> (u32, Option<String>) {
        let diff = (doc_amount - line_amount).abs();
        if diff < Decimal::new(1, 2) {
            (50, Some("Exact amount match".to_string()))
        } else if diff < Decimal::ONE {
            (40, Some(format!("Amount within 1.00 (diff {})", diff)))
        } else if diff < Decimal::new(5, 0) {
            (20, Some(format!("Amount within 5.00 (diff {})", diff)))
        } else {
            (0, None)
        }
    }

    fn date_signal(doc_date: NaiveDate, line_date: NaiveDate) -> (u32, Option<String>) {
        let days = (doc_date - line_date).num_days().abs();
        if days < 1 {
            (30, Some("Same date".to_string()))
        } else if days < 7 {
            (20, Some(format!("Date within a week ({} days)", days)))
        } else if days < 30 {
            (10, Some(format!("Date within a month ({} days)", days)))
        } else {
            (0, None)
        }
    }

    fn text_signal(vendor: &str, label: &str) -> (u32, Option<String>) {
        let vendor_norm = normalize::normalize(vendor);
        let label_norm = normalize::normalize(label);
        if vendor_norm.is_empty() || label_norm.is_empty() {
            return (0, None);
        }

        if label_norm.contains(&vendor_norm) || vendor_norm.contains(&label_norm) {
            return (20, Some(format!("Vendor '{}' found in label", vendor_norm)));
        }

        normalize::tokens(vendor)
            .into_iter()
            .find(|t| t.chars().count() > 3 && label_norm.contains(t.as_str()))
            .map(|t| (10, Some(format!("Vendor keyword '{}' found in label", t))))
            .unwrap_or((0, None))
    }
}
