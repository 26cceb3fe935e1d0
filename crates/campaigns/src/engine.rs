use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relance_channels::ChannelDispatcher;
use relance_core::clock::Clock;
use relance_core::error::{RelanceError, RelanceResult};
use relance_core::event_bus::{make_event, EventSink, OutreachEventType};
use relance_core::state_machine::LineStateMachine;
use relance_core::store::{CampaignStore, ExecutionStore, LineStore};
use relance_core::types::{Campaign, CampaignTrigger, Execution, ExecutionStatus, StopReason};

use crate::quiet_hours::QuietHoursPolicy;
use crate::state_machine::ExecutionStateMachine;
use crate::stop_policy::{StopDecision, StopPolicy};
use crate::types::{AdvanceOutcome, CampaignStats, CycleReport};

const LINE_WRITE_ATTEMPTS: u32 = 3;

/// Core scheduler: enrolls pending lines and advances due executions.
///
/// `run_cycle` is driven by an external timer. Overlapping calls are
/// rejected by a run lock so one due execution is never dispatched twice.
pub struct CampaignEngine {
    lines: Arc<dyn LineStore>,
    campaigns: Arc<dyn CampaignStore>,
    executions: Arc<dyn ExecutionStore>,
    dispatcher: Arc<ChannelDispatcher>,
    clock: Arc<dyn Clock>,
    state_machine: ExecutionStateMachine,
    stop_policy: StopPolicy,
    quiet_hours: QuietHoursPolicy,
    event_sink: Arc<dyn EventSink>,
    run_lock: Mutex<()>,
}

impl std::fmt::Debug for CampaignEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CampaignEngine")
            .field("stop_policy", &self.stop_policy)
            .field("quiet_hours", &self.quiet_hours)
            .finish()
    }
}

impl CampaignEngine {
    pub fn new(
        lines: Arc<dyn LineStore>,
        campaigns: Arc<dyn CampaignStore>,
        executions: Arc<dyn ExecutionStore>,
        dispatcher: Arc<ChannelDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lines,
            campaigns,
            executions,
            dispatcher,
            clock,
            state_machine: ExecutionStateMachine::new(),
            stop_policy: StopPolicy::default(),
            quiet_hours: QuietHoursPolicy::default(),
            event_sink: relance_core::event_bus::noop_sink(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    pub fn with_quiet_hours(mut self, policy: QuietHoursPolicy) -> Self {
        self.quiet_hours = policy;
        self
    }

    /// Attach an event sink for emitting outreach events.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// One scheduler tick: enrollment, then advancement. Per-item failures
    /// are logged and counted; only failing to list campaigns or active
    /// executions aborts the cycle.
    pub async fn run_cycle(&self) -> RelanceResult<CycleReport> {
        let _guard = match self.run_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Previous cycle still in flight, skipping tick");
                return Ok(CycleReport::skipped());
            }
        };

        let now = self.clock.now();
        let mut report = CycleReport::default();

        self.enroll(now, &mut report).await?;
        self.advance(now, &mut report).await?;

        info!(
            enrolled = report.enrolled,
            dispatched = report.dispatched,
            deferred = report.deferred,
            stopped = report.stopped,
            completed = report.completed,
            failed = report.failed,
            errors = report.errors,
            "Campaign cycle finished"
        );
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Enrollment
    // ------------------------------------------------------------------

    async fn enroll(&self, now: DateTime<Utc>, report: &mut CycleReport) -> RelanceResult<()> {
        let tenants = self.campaigns.active_tenants().await?;

        for tenant_id in tenants {
            let campaigns = match self.campaigns.list_active(tenant_id).await {
                Ok(c) => c,
                Err(e) => {
                    error!(tenant_id = %tenant_id, error = %e, "Failed to list campaigns");
                    report.errors += 1;
                    continue;
                }
            };

            for campaign in campaigns
                .iter()
                .filter(|c| c.trigger == CampaignTrigger::OnLinePending)
            {
                if let Err(e) = campaign.validate() {
                    warn!(campaign_id = %campaign.id, error = %e, "Skipping invalid campaign");
                    report.errors += 1;
                    continue;
                }
                self.enroll_campaign(campaign, now, report).await;
            }
        }
        Ok(())
    }

    async fn enroll_campaign(&self, campaign: &Campaign, now: DateTime<Utc>, report: &mut CycleReport) {
        let line_ids = match self
            .executions
            .find_unenrolled_lines(campaign.id, campaign.tenant_id)
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                error!(campaign_id = %campaign.id, error = %e, "Failed to find unenrolled lines");
                report.errors += 1;
                return;
            }
        };

        for line_id in line_ids {
            let execution = Execution::enroll(campaign.id, line_id, now);
            match self.executions.create_execution(&execution).await {
                Ok(()) => {
                    report.enrolled += 1;
                    metrics::counter!("outreach.enrolled").increment(1);
                    info!(
                        execution_id = %execution.id,
                        campaign_id = %campaign.id,
                        line_id = %line_id,
                        "Line enrolled"
                    );
                    self.event_sink.emit(
                        make_event(OutreachEventType::ExecutionEnrolled, Some(line_id), now)
                            .with_execution(execution.id),
                    );
                }
                Err(e) if e.is_conflict() => {
                    debug!(campaign_id = %campaign.id, line_id = %line_id, "Already enrolled");
                }
                Err(e) => {
                    error!(campaign_id = %campaign.id, line_id = %line_id, error = %e, "Enrollment failed");
                    report.errors += 1;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Advancement
    // ------------------------------------------------------------------

    async fn advance(&self, now: DateTime<Utc>, report: &mut CycleReport) -> RelanceResult<()> {
        let active = self.executions.find_active().await?;
        let mut campaigns: HashMap<Uuid, Campaign> = HashMap::new();

        for execution in active {
            let execution_id = execution.id;
            match self.advance_execution(execution, now, &mut campaigns).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.errors += 1;
                    if e.is_transient() {
                        warn!(execution_id = %execution_id, error = %e, "Step will be retried next tick");
                    } else {
                        error!(execution_id = %execution_id, error = %e, "Failed to advance execution");
                    }
                }
            }
        }
        Ok(())
    }

    /// Stop check, schedule gate, quiet-hours gate, then at most one step.
    async fn advance_execution(
        &self,
        mut execution: Execution,
        now: DateTime<Utc>,
        campaigns: &mut HashMap<Uuid, Campaign>,
    ) -> RelanceResult<AdvanceOutcome> {
        let line = match self.lines.get_line(execution.line_id).await {
            Ok(line) => line,
            Err(e) if e.is_not_found() => return self.fail_execution(execution, now, e).await,
            Err(e) => return Err(e),
        };

        if let StopDecision::Stop(reason) = self.stop_policy.evaluate(line.status) {
            self.state_machine
                .apply(&mut execution, ExecutionStatus::Stopped, Some(reason), now)?;
            self.executions.update_execution(&execution).await?;

            metrics::counter!("outreach.stopped", "reason" => reason.as_str()).increment(1);
            info!(
                execution_id = %execution.id,
                line_id = %line.id,
                reason = %reason,
                "Execution stopped"
            );
            self.event_sink.emit(
                make_event(OutreachEventType::ExecutionStopped, Some(line.id), now)
                    .with_execution(execution.id)
                    .with_detail(reason.as_str()),
            );
            return Ok(AdvanceOutcome::Stopped(reason));
        }

        if !execution.is_due(now) {
            return Ok(AdvanceOutcome::NotDue);
        }

        let campaign = match self.load_campaign(execution.campaign_id, campaigns).await {
            Ok(c) => c,
            Err(e) if e.is_not_found() => return self.fail_execution(execution, now, e).await,
            Err(e) => return Err(e),
        };

        if campaign.quiet_hours && self.quiet_hours.is_quiet_at(now) {
            metrics::counter!("outreach.quiet_hours_deferred").increment(1);
            debug!(execution_id = %execution.id, "Quiet hours, dispatch deferred");
            return Ok(AdvanceOutcome::Deferred);
        }

        let step = match campaign.step(execution.current_step_order + 1) {
            Some(step) => step,
            None => {
                self.complete(&mut execution, now)?;
                self.executions.update_execution(&execution).await?;
                self.record_completion(&execution, now);
                return Ok(AdvanceOutcome::Exhausted);
            }
        };

        let recipient = line.client_id.ok_or_else(|| {
            RelanceError::Validation(format!("line {} has no responsible party", line.id))
        })?;

        // A dispatch error returns here, leaving the execution untouched.
        let message_id = self
            .dispatcher
            .send(step.channel, &step.template_id, &step.config, recipient)
            .await?;

        execution.current_step_order = step.order;
        execution.last_step_executed_at = Some(now);
        let completed = match campaign.step(step.order + 1) {
            Some(next) => {
                self.state_machine
                    .apply(&mut execution, ExecutionStatus::Running, None, now)?;
                execution.next_step_scheduled_at =
                    Some(now + Duration::hours(i64::from(next.delay_hours)));
                false
            }
            None => {
                self.complete(&mut execution, now)?;
                true
            }
        };

        if let Err(e) = self.executions.update_execution(&execution).await {
            error!(
                execution_id = %execution.id,
                step_order = step.order,
                message_id = %message_id,
                error = %e,
                "Step sent but execution could not be saved"
            );
            return Err(e);
        }
        if completed {
            self.record_completion(&execution, now);
        }

        info!(
            execution_id = %execution.id,
            line_id = %line.id,
            step_order = step.order,
            channel = %step.channel,
            message_id = %message_id,
            "Step dispatched"
        );
        self.event_sink.emit(
            make_event(OutreachEventType::StepDispatched, Some(line.id), now)
                .with_execution(execution.id)
                .with_detail(format!("step {} via {}", step.order, step.channel)),
        );

        self.record_contact(line.id, now).await;

        Ok(AdvanceOutcome::Dispatched {
            order: step.order,
            completed,
        })
    }

    fn complete(&self, execution: &mut Execution, now: DateTime<Utc>) -> RelanceResult<()> {
        self.state_machine.apply(
            execution,
            ExecutionStatus::Completed,
            Some(StopReason::SequenceExhausted),
            now,
        )
    }

    /// Called once the completed execution is persisted.
    fn record_completion(&self, execution: &Execution, now: DateTime<Utc>) {
        metrics::counter!("outreach.completed").increment(1);
        info!(execution_id = %execution.id, "Sequence exhausted");
        self.event_sink.emit(
            make_event(OutreachEventType::ExecutionCompleted, Some(execution.line_id), now)
                .with_execution(execution.id)
                .with_detail(StopReason::SequenceExhausted.as_str()),
        );
    }

    /// An execution whose line or campaign vanished can never progress.
    async fn fail_execution(
        &self,
        mut execution: Execution,
        now: DateTime<Utc>,
        cause: RelanceError,
    ) -> RelanceResult<AdvanceOutcome> {
        warn!(execution_id = %execution.id, error = %cause, "Execution references missing data");
        self.state_machine
            .apply(&mut execution, ExecutionStatus::Failed, None, now)?;
        self.executions.update_execution(&execution).await?;
        self.event_sink.emit(
            make_event(OutreachEventType::ExecutionFailed, Some(execution.line_id), now)
                .with_execution(execution.id)
                .with_detail(cause.to_string()),
        );
        Ok(AdvanceOutcome::Failed)
    }

    /// Outreach bookkeeping on the line. The line is read again after the
    /// dispatch so a document matched in the meantime is never overwritten;
    /// a versioned write that loses a race is retried on a fresh copy. The
    /// step already went out, so failures are logged rather than propagated.
    async fn record_contact(&self, line_id: Uuid, now: DateTime<Utc>) {
        let mut attempt = 1;
        loop {
            let mut line = match self.lines.get_line(line_id).await {
                Ok(line) => line,
                Err(e) => {
                    warn!(line_id = %line_id, error = %e, "Could not reload line after dispatch");
                    return;
                }
            };
            if !LineStateMachine::accepts_outreach(line.status) {
                debug!(line_id = %line_id, status = %line.status, "Line status not updated");
                return;
            }
            if let Err(e) = line.mark_contacted(now) {
                warn!(line_id = %line_id, error = %e, "Could not mark line contacted");
                return;
            }
            match self.lines.update_line(&line).await {
                Ok(_) => return,
                Err(e) if e.is_conflict() && attempt < LINE_WRITE_ATTEMPTS => {
                    debug!(line_id = %line_id, attempt, "Line changed during dispatch, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    error!(line_id = %line_id, error = %e, "Failed to save contacted line");
                    return;
                }
            }
        }
    }

    async fn load_campaign<'a>(
        &self,
        id: Uuid,
        cache: &'a mut HashMap<Uuid, Campaign>,
    ) -> RelanceResult<&'a Campaign> {
        if !cache.contains_key(&id) {
            let campaign = self.campaigns.get_campaign(id).await?;
            cache.insert(id, campaign);
        }
        cache
            .get(&id)
            .ok_or_else(|| RelanceError::not_found("campaign", id))
    }

    // ------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------

    /// Computes aggregate statistics for a campaign from its executions.
    pub async fn campaign_stats(&self, campaign_id: Uuid) -> RelanceResult<CampaignStats> {
        let executions = self.executions.list_for_campaign(campaign_id).await?;

        let mut stats = CampaignStats {
            campaign_id,
            total_enrolled: executions.len() as u64,
            pending: 0,
            running: 0,
            stopped: 0,
            completed: 0,
            failed: 0,
            stop_reasons: HashMap::new(),
            avg_steps_executed: 0.0,
        };

        let mut total_steps: u64 = 0;
        for exec in &executions {
            match exec.status {
                ExecutionStatus::Pending => stats.pending += 1,
                ExecutionStatus::Running => stats.running += 1,
                ExecutionStatus::Stopped => stats.stopped += 1,
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
            }
            if let Some(reason) = exec.stop_reason {
                *stats
                    .stop_reasons
                    .entry(reason.as_str().to_string())
                    .or_insert(0) += 1;
            }
            total_steps += u64::from(exec.current_step_order);
        }

        if !executions.is_empty() {
            stats.avg_steps_executed = total_steps as f64 / executions.len() as f64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use relance_channels::{ChannelSender, RecordingSender, SendRequest};
    use relance_core::channels::OutreachChannel;
    use relance_core::clock::ManualClock;
    use relance_core::event_bus::CaptureSink;
    use relance_core::types::{CampaignStep, Line, LineStatus};
    use relance_store::memory::InMemoryStore;
    use rust_decimal::Decimal;
    use tokio::sync::Notify;

    struct Harness {
        store: Arc<InMemoryStore>,
        sender: Arc<RecordingSender>,
        clock: Arc<ManualClock>,
        sink: Arc<CaptureSink>,
        engine: CampaignEngine,
        tenant_id: Uuid,
    }

    // Tuesday, inside business hours.
    fn tuesday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, 9, 0, 0).unwrap()
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let sender = Arc::new(RecordingSender::new());
        let clock = Arc::new(ManualClock::new(tuesday_morning()));
        let sink = Arc::new(CaptureSink::new());
        let dispatcher = Arc::new(ChannelDispatcher::single(sender.clone()));
        let engine = CampaignEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            dispatcher,
            clock.clone(),
        )
        .with_event_sink(sink.clone());
        Harness {
            store,
            sender,
            clock,
            sink,
            engine,
            tenant_id: Uuid::new_v4(),
        }
    }

    fn step(order: u32, delay_hours: u32) -> CampaignStep {
        CampaignStep {
            order,
            delay_hours,
            channel: OutreachChannel::Message,
            template_id: format!("reminder-{order}"),
            config: serde_json::json!({}),
        }
    }

    fn campaign(h: &Harness, steps: Vec<CampaignStep>, quiet_hours: bool) -> Campaign {
        let campaign = Campaign {
            id: Uuid::new_v4(),
            tenant_id: h.tenant_id,
            name: "Missing receipts".to_string(),
            trigger: CampaignTrigger::OnLinePending,
            is_active: true,
            quiet_hours,
            steps,
            created_at: tuesday_morning(),
            updated_at: tuesday_morning(),
        };
        h.store.insert_campaign(campaign.clone());
        campaign
    }

    fn line(h: &Harness) -> Line {
        let line = Line::new(
            h.tenant_id,
            Some(Uuid::new_v4()),
            Decimal::new(4999, 2),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            "CB AMAZON 0103",
            tuesday_morning(),
        );
        h.store.insert_line(line.clone());
        line
    }

    fn set_status(h: &Harness, line_id: Uuid, status: LineStatus) {
        let mut line = h.store.line(&line_id).unwrap();
        line.status = status;
        h.store.insert_line(line);
    }

    #[tokio::test]
    async fn test_first_cycle_enrolls_and_dispatches_step_one() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let l = line(&h);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(h.sender.count(), 1);
        assert_eq!(h.sender.sent()[0].template_id, "reminder-1");
        assert_eq!(h.sender.sent()[0].recipient, l.client_id.unwrap());

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Running);
        assert_eq!(exec.current_step_order, 1);
        assert_eq!(exec.last_step_executed_at, Some(tuesday_morning()));
        assert_eq!(
            exec.next_step_scheduled_at,
            Some(tuesday_morning() + Duration::hours(48))
        );

        let stored = h.store.line(&l.id).unwrap();
        assert_eq!(stored.status, LineStatus::Contacted);
        assert_eq!(stored.contact_count, 1);
        assert_eq!(h.sink.count_type(OutreachEventType::ExecutionEnrolled), 1);
        assert_eq!(h.sink.count_type(OutreachEventType::StepDispatched), 1);
    }

    #[tokio::test]
    async fn test_enrollment_is_idempotent() {
        let h = harness();
        campaign(&h, vec![step(1, 0), step(2, 48)], false);
        line(&h);

        h.engine.run_cycle().await.unwrap();
        let second = h.engine.run_cycle().await.unwrap();

        assert_eq!(second.enrolled, 0);
        assert_eq!(h.store.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_step_waits_for_its_delay() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let l = line(&h);

        h.engine.run_cycle().await.unwrap();
        h.clock.advance(Duration::hours(47));
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.not_due, 1);
        assert_eq!(h.sender.count(), 1);

        h.clock.advance(Duration::hours(1));
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.completed, 1);

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.stop_reason, Some(StopReason::SequenceExhausted));
        assert_eq!(exec.current_step_order, 2);
        assert!(exec.next_step_scheduled_at.is_none());
        assert_eq!(h.store.line(&l.id).unwrap().contact_count, 2);
    }

    #[tokio::test]
    async fn test_one_step_per_cycle_even_when_overdue() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 1), step(3, 1)], false);
        let l = line(&h);

        h.engine.run_cycle().await.unwrap();
        h.clock.advance(Duration::hours(5));
        h.engine.run_cycle().await.unwrap();

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.current_step_order, 2);
        assert_eq!(h.sender.count(), 2);
    }

    #[tokio::test]
    async fn test_quiet_hours_defer_without_rescheduling() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0)], true);
        let l = line(&h);
        // Saturday
        h.clock.set(Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap());

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(report.deferred, 1);
        assert_eq!(h.sender.count(), 0);

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.current_step_order, 0);
        let scheduled = exec.next_step_scheduled_at;

        // Monday morning
        h.clock.set(Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap());
        h.engine.run_cycle().await.unwrap();
        assert_eq!(h.sender.count(), 1);
        assert_eq!(scheduled, Some(Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_quiet_hours_ignored_when_campaign_opts_out() {
        let h = harness();
        campaign(&h, vec![step(1, 0)], false);
        line(&h);
        h.clock.set(Utc.with_ymd_and_hms(2024, 3, 16, 10, 0, 0).unwrap());

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_leaves_execution_unchanged() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let l = line(&h);
        h.sender.set_failing(true);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.enrolled, 1);
        assert_eq!(report.errors, 1);

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.current_step_order, 0);
        assert!(exec.last_step_executed_at.is_none());
        assert_eq!(h.store.line(&l.id).unwrap().status, LineStatus::Pending);

        h.sender.set_failing(false);
        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(h.store.execution_for(c.id, l.id).unwrap().current_step_order, 1);
    }

    #[tokio::test]
    async fn test_failure_on_one_execution_does_not_block_others() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0)], false);
        let orphan = line(&h);
        let ok = line(&h);
        let mut no_client = h.store.line(&orphan.id).unwrap();
        no_client.client_id = None;
        h.store.insert_line(no_client);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(
            h.store.execution_for(c.id, ok.id).unwrap().status,
            ExecutionStatus::Completed
        );
        assert_eq!(
            h.store.execution_for(c.id, orphan.id).unwrap().current_step_order,
            0
        );
    }

    #[tokio::test]
    async fn test_stop_conditions_by_line_status() {
        let cases = [
            (LineStatus::Received, StopReason::ResolvedByDocument),
            (LineStatus::Validated, StopReason::ManuallyValidated),
            (LineStatus::Rejected, StopReason::ClientRefusal),
            (LineStatus::Expired, StopReason::LineExpired),
        ];
        for (status, reason) in cases {
            let h = harness();
            let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
            let l = line(&h);

            h.engine.run_cycle().await.unwrap();
            set_status(&h, l.id, status);

            let report = h.engine.run_cycle().await.unwrap();
            assert_eq!(report.stopped, 1, "status {status}");

            let exec = h.store.execution_for(c.id, l.id).unwrap();
            assert_eq!(exec.status, ExecutionStatus::Stopped);
            assert_eq!(exec.stop_reason, Some(reason));
            assert!(exec.next_step_scheduled_at.is_none());
            assert_eq!(h.sender.count(), 1);
        }
    }

    #[tokio::test]
    async fn test_stop_applies_before_schedule_gate() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let l = line(&h);

        h.engine.run_cycle().await.unwrap();
        set_status(&h, l.id, LineStatus::Rejected);
        // Next step is 48h away; the stop still lands this tick.
        h.clock.advance(Duration::minutes(1));
        h.engine.run_cycle().await.unwrap();

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Stopped);
        assert_eq!(h.sink.count_type(OutreachEventType::ExecutionStopped), 1);
    }

    #[tokio::test]
    async fn test_received_keeps_outreach_when_policy_disabled() {
        let h = harness();
        let engine = CampaignEngine::new(
            h.store.clone(),
            h.store.clone(),
            h.store.clone(),
            Arc::new(ChannelDispatcher::single(h.sender.clone())),
            h.clock.clone(),
        )
        .with_stop_policy(StopPolicy {
            stop_on_document_received: false,
            stop_on_expired: true,
        });
        let c = campaign(&h, vec![step(1, 0), step(2, 1)], false);
        let l = line(&h);

        engine.run_cycle().await.unwrap();
        set_status(&h, l.id, LineStatus::Received);
        h.clock.advance(Duration::hours(1));
        engine.run_cycle().await.unwrap();

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.current_step_order, 2);
        let stored = h.store.line(&l.id).unwrap();
        assert_eq!(stored.status, LineStatus::Received);
        assert_eq!(stored.contact_count, 2);
    }

    #[tokio::test]
    async fn test_gap_in_steps_exhausts_sequence() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(3, 0)], false);
        let l = line(&h);
        // Gapped campaigns fail validation, so seed the execution directly.
        let exec = Execution::enroll(c.id, l.id, tuesday_morning());
        h.store.create_execution(&exec).await.unwrap();

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.enrolled, 0);
        assert_eq!(report.errors, 1);
        assert_eq!(report.dispatched, 1);

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.current_step_order, 1);
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(exec.stop_reason, Some(StopReason::SequenceExhausted));
        assert_eq!(h.sender.count(), 1);
    }

    #[tokio::test]
    async fn test_missing_line_fails_execution() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let l = line(&h);
        h.engine.run_cycle().await.unwrap();
        h.store.remove_line(&l.id);

        let report = h.engine.run_cycle().await.unwrap();
        assert_eq!(report.failed, 1);

        let exec = h.store.execution_for(c.id, l.id).unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.stop_reason.is_none());
        assert_eq!(h.sink.count_type(OutreachEventType::ExecutionFailed), 1);
    }

    #[tokio::test]
    async fn test_deactivated_campaign_keeps_running_executions() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 1)], false);
        let l = line(&h);
        h.engine.run_cycle().await.unwrap();

        h.store.set_campaign_active(&c.id, false);
        let late = line(&h);
        h.clock.advance(Duration::hours(1));
        let report = h.engine.run_cycle().await.unwrap();

        assert_eq!(report.enrolled, 0);
        assert!(h.store.execution_for(c.id, late.id).is_none());
        assert_eq!(h.store.execution_for(c.id, l.id).unwrap().current_step_order, 2);
    }

    #[tokio::test]
    async fn test_step_order_never_decreases_or_overshoots() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 2), step(3, 2)], false);
        let l = line(&h);

        let mut last = 0;
        for _ in 0..6 {
            h.engine.run_cycle().await.unwrap();
            let exec = h.store.execution_for(c.id, l.id).unwrap();
            assert!(exec.current_step_order >= last);
            assert!(exec.current_step_order <= c.max_step_order());
            last = exec.current_step_order;
            h.clock.advance(Duration::hours(2));
        }
        assert_eq!(last, 3);
        assert_eq!(h.sender.count(), 3);
    }

    /// Holds a dispatch open until the test releases it.
    struct GatedSender {
        entered: Notify,
        gate: Notify,
    }

    #[async_trait::async_trait]
    impl ChannelSender for GatedSender {
        async fn send(&self, _request: &SendRequest) -> anyhow::Result<String> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok("gated".to_string())
        }
    }

    #[tokio::test]
    async fn test_overlapping_cycle_is_skipped() {
        let h = harness();
        let gated = Arc::new(GatedSender {
            entered: Notify::new(),
            gate: Notify::new(),
        });
        let engine = CampaignEngine::new(
            h.store.clone(),
            h.store.clone(),
            h.store.clone(),
            Arc::new(ChannelDispatcher::single(gated.clone())),
            h.clock.clone(),
        );
        campaign(&h, vec![step(1, 0)], false);
        line(&h);

        let overlapping = async {
            gated.entered.notified().await;
            let report = engine.run_cycle().await;
            gated.gate.notify_one();
            report
        };
        let (first, second) = tokio::join!(engine.run_cycle(), overlapping);

        let first = first.unwrap();
        let second = second.unwrap();
        assert!(!first.skipped);
        assert_eq!(first.dispatched, 1);
        assert!(second.skipped);
        assert_eq!(second.dispatched, 0);
    }

    /// Execution store whose saves fail while `failing` is set.
    struct FlakyExecutions {
        inner: Arc<InMemoryStore>,
        failing: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ExecutionStore for FlakyExecutions {
        async fn create_execution(&self, execution: &Execution) -> RelanceResult<()> {
            self.inner.create_execution(execution).await
        }

        async fn update_execution(&self, execution: &Execution) -> RelanceResult<Execution> {
            if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RelanceError::Persistence("disk full".to_string()));
            }
            self.inner.update_execution(execution).await
        }

        async fn find_active(&self) -> RelanceResult<Vec<Execution>> {
            self.inner.find_active().await
        }

        async fn find_unenrolled_lines(
            &self,
            campaign_id: Uuid,
            tenant_id: Uuid,
        ) -> RelanceResult<Vec<Uuid>> {
            self.inner.find_unenrolled_lines(campaign_id, tenant_id).await
        }

        async fn list_for_campaign(&self, campaign_id: Uuid) -> RelanceResult<Vec<Execution>> {
            self.inner.list_for_campaign(campaign_id).await
        }
    }

    #[tokio::test]
    async fn test_completion_reported_only_once_saved() {
        let h = harness();
        let executions = Arc::new(FlakyExecutions {
            inner: h.store.clone(),
            failing: std::sync::atomic::AtomicBool::new(true),
        });
        let sink = Arc::new(CaptureSink::new());
        let engine = CampaignEngine::new(
            h.store.clone(),
            h.store.clone(),
            executions.clone(),
            Arc::new(ChannelDispatcher::single(h.sender.clone())),
            h.clock.clone(),
        )
        .with_event_sink(sink.clone());
        let c = campaign(&h, vec![step(1, 0)], false);
        let l = line(&h);

        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(report.completed, 0);
        assert_eq!(sink.count_type(OutreachEventType::ExecutionCompleted), 0);
        assert_eq!(
            h.store.execution_for(c.id, l.id).unwrap().status,
            ExecutionStatus::Pending
        );

        executions
            .failing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        let report = engine.run_cycle().await.unwrap();
        assert_eq!(report.completed, 1);
        assert_eq!(sink.count_type(OutreachEventType::ExecutionCompleted), 1);
        assert_eq!(
            h.store.execution_for(c.id, l.id).unwrap().status,
            ExecutionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_campaign_stats() {
        let h = harness();
        let c = campaign(&h, vec![step(1, 0), step(2, 48)], false);
        let stopped = line(&h);
        line(&h);

        h.engine.run_cycle().await.unwrap();
        set_status(&h, stopped.id, LineStatus::Validated);
        h.engine.run_cycle().await.unwrap();

        let stats = h.engine.campaign_stats(c.id).await.unwrap();
        assert_eq!(stats.total_enrolled, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.stopped, 1);
        assert_eq!(stats.stop_reasons.get("manually-validated"), Some(&1));
        assert!((stats.avg_steps_executed - 1.0).abs() < f64::EPSILON);
    }
}
