use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use relance_core::clock::Clock;
use relance_core::config::MatchingConfig;
use relance_core::error::{RelanceError, RelanceResult};
use relance_core::event_bus::{make_event, EventSink, OutreachEventType};
use relance_core::state_machine::LineStateMachine;
use relance_core::store::{DocumentStore, LineStore};
use relance_core::types::{Document, Line, LineStatus, MatchStatus, OcrStatus};

use crate::scoring::{MatchProposal, MatchScorer};

const LINE_WRITE_ATTEMPTS: u32 = 3;

/// What `auto_match` did with the best proposal.
#[derive(Debug, Clone)]
pub enum MatchDecision {
    /// Linked and line moved to received without review.
    AutoMatched(MatchProposal),
    /// Linked for human review; line untouched.
    Proposed(MatchProposal),
    NoMatch,
}

impl MatchDecision {
    pub fn proposal(&self) -> Option<&MatchProposal> {
        match self {
            MatchDecision::AutoMatched(p) | MatchDecision::Proposed(p) => Some(p),
            MatchDecision::NoMatch => None,
        }
    }

    pub fn is_auto_matched(&self) -> bool {
        matches!(self, MatchDecision::AutoMatched(_))
    }
}

/// Reconciles documents against the open lines of the document's client.
/// Writes for one client are serialised so two documents cannot claim the
/// same line concurrently.
pub struct MatchingEngine {
    lines: Arc<dyn LineStore>,
    documents: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    scorer: MatchScorer,
    config: MatchingConfig,
    event_sink: Arc<dyn EventSink>,
    client_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl MatchingEngine {
    pub fn new(
        lines: Arc<dyn LineStore>,
        documents: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            lines,
            documents,
            clock,
            scorer: MatchScorer::new(),
            config,
            event_sink: relance_core::event_bus::noop_sink(),
            client_locks: DashMap::new(),
        }
    }

    /// Attach an event sink for emitting match events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Ranked proposals at or above the proposal threshold. Candidates are
    /// the client's lines that are not yet validated; a document without a
    /// client never matches. Has no side effects.
    pub async fn find_matches(&self, document: &Document) -> RelanceResult<Vec<MatchProposal>> {
        let client_id = match document.client_id {
            Some(id) => id,
            None => {
                debug!(document_id = %document.id, "Document has no client, skipping match");
                return Ok(Vec::new());
            }
        };

        let candidates: Vec<Line> = self
            .lines
            .list_lines_for_client(client_id)
            .await?
            .into_iter()
            .filter(|l| l.client_id == Some(client_id) && LineStateMachine::is_matchable(l.status))
            .collect();

        let proposals = self
            .scorer
            .rank(document, &candidates, self.config.proposal_threshold);

        debug!(
            document_id = %document.id,
            candidates = candidates.len(),
            proposals = proposals.len(),
            "Scored document against open lines"
        );
        Ok(proposals)
    }

    /// Acts on the best proposal: auto-match at or above the auto threshold,
    /// otherwise link for review. Persists the document either way.
    pub async fn auto_match(&self, document: &mut Document) -> RelanceResult<MatchDecision> {
        if document.ocr_status != OcrStatus::Completed {
            debug!(document_id = %document.id, status = ?document.ocr_status, "Extraction not complete");
            return Ok(MatchDecision::NoMatch);
        }
        if matches!(
            document.match_status,
            MatchStatus::AutoMatched | MatchStatus::Approved
        ) {
            return Err(RelanceError::Validation(format!(
                "document {} is already matched",
                document.id
            )));
        }
        let client_id = match document.client_id {
            Some(id) => id,
            None => return Ok(MatchDecision::NoMatch),
        };

        let lock = self.client_lock(client_id);
        let _guard = lock.lock().await;

        let best = match self.find_matches(document).await?.into_iter().next() {
            Some(p) => p,
            None => {
                info!(document_id = %document.id, "No candidate line above threshold");
                return Ok(MatchDecision::NoMatch);
            }
        };

        let now = self.clock.now();
        if best.confidence >= self.config.auto_match_threshold {
            match self.receive_line(best.line_id, now).await {
                Ok(line) => {
                    document.match_status = MatchStatus::AutoMatched;
                    document.match_confidence = Some(best.confidence);
                    document.line_id = Some(best.line_id);
                    document.updated_at = now;
                    self.documents.update_document(document).await?;

                    info!(
                        document_id = %document.id,
                        line_id = %best.line_id,
                        confidence = best.confidence,
                        "Document auto-matched"
                    );
                    metrics::counter!("matching.auto_matched").increment(1);
                    self.event_sink.emit(
                        make_event(OutreachEventType::DocumentAutoMatched, Some(line.id), now)
                            .with_document(document.id)
                            .with_detail(format!("{:.2}", best.confidence)),
                    );
                    return Ok(MatchDecision::AutoMatched(best));
                }
                Err(e @ RelanceError::InvalidTransition { .. }) => {
                    warn!(
                        document_id = %document.id,
                        line_id = %best.line_id,
                        error = %e,
                        "Best line cannot be auto-matched, sending to review"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        document.match_status = MatchStatus::Pending;
        document.match_confidence = Some(best.confidence);
        document.line_id = Some(best.line_id);
        document.updated_at = now;
        self.documents.update_document(document).await?;

        info!(
            document_id = %document.id,
            line_id = %best.line_id,
            confidence = best.confidence,
            "Match proposed for review"
        );
        metrics::counter!("matching.proposed").increment(1);
        self.event_sink.emit(
            make_event(OutreachEventType::DocumentProposed, Some(best.line_id), now)
                .with_document(document.id)
                .with_detail(format!("{:.2}", best.confidence)),
        );
        Ok(MatchDecision::Proposed(best))
    }

    /// Human approval of a pending proposal: the document is approved and the
    /// line moves to received unless it is already there.
    pub async fn approve(&self, document_id: Uuid) -> RelanceResult<Document> {
        let mut document = self.documents.get_document(document_id).await?;
        let line_id = Self::reviewable_line(&document)?;
        let lock = self.client_lock(document.client_id.unwrap_or(line_id));
        let _guard = lock.lock().await;

        let now = self.clock.now();
        let line = self.lines.get_line(line_id).await?;
        if line.status != LineStatus::Received {
            self.receive_line(line_id, now).await?;
        }

        document.match_status = MatchStatus::Approved;
        document.updated_at = now;
        self.documents.update_document(&document).await?;

        info!(document_id = %document_id, line_id = %line_id, "Match approved");
        self.event_sink.emit(
            make_event(OutreachEventType::DocumentApproved, Some(line_id), now)
                .with_document(document_id),
        );
        Ok(document)
    }

    /// Human rejection of a pending proposal: the document is unlinked and
    /// the line is left as it was.
    pub async fn reject(&self, document_id: Uuid) -> RelanceResult<Document> {
        let mut document = self.documents.get_document(document_id).await?;
        let line_id = Self::reviewable_line(&document)?;

        let now = self.clock.now();
        document.match_status = MatchStatus::Rejected;
        document.line_id = None;
        document.updated_at = now;
        self.documents.update_document(&document).await?;

        info!(document_id = %document_id, line_id = %line_id, "Match rejected");
        self.event_sink.emit(
            make_event(OutreachEventType::DocumentRejected, Some(line_id), now)
                .with_document(document_id),
        );
        Ok(document)
    }

    fn reviewable_line(document: &Document) -> RelanceResult<Uuid> {
        match (document.match_status, document.line_id) {
            (MatchStatus::Pending, Some(line_id)) => Ok(line_id),
            (status, _) => Err(RelanceError::Validation(format!(
                "document {} has no proposal awaiting review (status {})",
                document.id,
                status.as_str()
            ))),
        }
    }

    /// Moves a line to received. Outreach bookkeeping may bump the line's
    /// version between our read and write, so a conflict re-reads it.
    async fn receive_line(&self, line_id: Uuid, now: DateTime<Utc>) -> RelanceResult<Line> {
        let mut attempt = 1;
        loop {
            let mut line = self.lines.get_line(line_id).await?;
            line.transition_to(LineStatus::Received, now)?;
            match self.lines.update_line(&line).await {
                Ok(stored) => return Ok(stored),
                Err(e) if e.is_conflict() && attempt < LINE_WRITE_ATTEMPTS => {
                    debug!(line_id = %line_id, attempt, "Line changed underneath, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn client_lock(&self, client_id: Uuid) -> Arc<Mutex<()>> {
        self.client_locks.entry(client_id).or_default().clone()
    }
}
