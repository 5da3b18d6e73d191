use crate::core::context::RunContext;
use crate::core::notifier::Notifier;
use crate::domain::model::{BookingConfirmation, Location, PollRound, ProbeReport};
use crate::domain::ports::{CandidateHandler, LocationProbe};
use crate::utils::error::{Result, SchedulerError};
use chrono::NaiveDate;
use rand::Rng;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub concurrency: usize,
    pub interval: Duration,
    pub jitter: Duration,
}

impl QueueSettings {
    /// 間隔加上 `[0, jitter]` 的隨機延遲，避免與其他請求同步爆量
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        self.interval + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

enum TaskResult {
    Probed(ProbeReport),
    Failed {
        location: Location,
        error: SchedulerError,
    },
    Booked(BookingConfirmation),
    Fatal(SchedulerError),
}

#[derive(Debug)]
pub enum RoundOutcome {
    Completed(RoundSummary),
    Booked(BookingConfirmation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundSummary {
    pub round: PollRound,
    pub polled: usize,
    pub failed: usize,
    /// 所有據點中最早的可預約日
    pub best: Option<(Location, NaiveDate)>,
    /// 已保留過但未完成預約，之後的候選都會被略過
    pub stalled: bool,
}

impl RoundSummary {
    fn new(round: PollRound, reports: &[ProbeReport], failed: usize, stalled: bool) -> Self {
        let best = reports
            .iter()
            .filter_map(|report| report.next_available.map(|date| (report, date)))
            .min_by(|(a, a_date), (b, b_date)| {
                a_date
                    .cmp(b_date)
                    .then(a.location.distance.total_cmp(&b.location.distance))
            })
            .map(|(report, date)| (report.location.clone(), date));

        Self {
            round,
            polled: reports.len() + failed,
            failed,
            best,
            stalled,
        }
    }
}

impl fmt::Display for RoundSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "🔎 Round #{} ({}) · {} locations polled",
            self.round.number,
            self.round.started_at.format("%H:%M:%S"),
            self.polled
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        match &self.best {
            Some((location, date)) => write!(
                f,
                "\nBest so far: {} on {} ({:.1} mi)",
                location.name,
                date.format("%m/%d/%Y"),
                location.distance
            ),
            None => write!(f, "\nNo openings found"),
        }?;
        if self.stalled {
            write!(
                f,
                "\n⚠️ A slot was held but not booked; no further bookings will be attempted"
            )?;
        }
        Ok(())
    }
}

/// 輪詢佇列
///
/// 每輪對每個據點派出一個探測工作，同時進行的數量受 `concurrency` 限制。
/// 第一個找到候選時段的工作會暫停派工並交給預約流程；暫停期間
/// 進行中的工作照常完成。整輪結束後才計算摘要並休息到下一輪。
pub struct PollingQueue<P, H>
where
    P: LocationProbe + 'static,
    H: CandidateHandler + 'static,
{
    prober: Arc<P>,
    handler: Arc<H>,
    notifier: Arc<Notifier>,
    context: Arc<RunContext>,
    settings: QueueSettings,
}

impl<P, H> PollingQueue<P, H>
where
    P: LocationProbe + 'static,
    H: CandidateHandler + 'static,
{
    pub fn new(
        prober: Arc<P>,
        handler: Arc<H>,
        notifier: Arc<Notifier>,
        context: Arc<RunContext>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            prober,
            handler,
            notifier,
            context,
            settings,
        }
    }

    /// 持續輪詢直到預約成功或發生致命錯誤
    pub async fn run(&self, locations: &[Location]) -> Result<BookingConfirmation> {
        let mut round = PollRound::first();
        loop {
            match self.run_round(round, locations).await? {
                RoundOutcome::Booked(confirmation) => return Ok(confirmation),
                RoundOutcome::Completed(summary) => {
                    tracing::info!("{}", summary.to_string().replace('\n', " · "));
                    if let Err(e) = self.notifier.report(&summary.to_string(), false).await {
                        tracing::warn!("⚠️ Failed to publish round summary: {}", e);
                    }
                }
            }

            let delay = self.settings.next_delay();
            tracing::debug!("💤 Sleeping {:?} before round #{}", delay, round.number + 1);
            tokio::time::sleep(delay).await;
            round = round.next();
        }
    }

    fn can_dispatch(&self, pending: &VecDeque<Location>, in_flight: usize) -> bool {
        !pending.is_empty()
            && in_flight < self.settings.concurrency
            && !self.context.gate.is_paused()
            && !self.context.state.is_booked()
    }

    pub async fn run_round(&self, round: PollRound, locations: &[Location]) -> Result<RoundOutcome> {
        let mut pending: VecDeque<Location> = locations.iter().cloned().collect();
        let mut in_flight: JoinSet<TaskResult> = JoinSet::new();
        let mut reports = Vec::with_capacity(locations.len());
        let mut failed = 0;

        tracing::debug!("🔁 Round #{} dispatching {} probes", round.number, pending.len());

        loop {
            while self.can_dispatch(&pending, in_flight.len()) {
                if let Some(location) = pending.pop_front() {
                    in_flight.spawn(probe_task(
                        self.prober.clone(),
                        self.handler.clone(),
                        self.context.clone(),
                        location,
                    ));
                }
            }

            if in_flight.is_empty() {
                if pending.is_empty() || self.context.state.is_booked() {
                    break;
                }
                // 暫停中且沒有進行中的工作，等待恢復
                self.context.gate.wait_until_running().await;
                continue;
            }

            let waiting_for_resume = self.context.gate.is_paused() && !pending.is_empty();
            tokio::select! {
                joined = in_flight.join_next() => match joined {
                    Some(Ok(TaskResult::Probed(report))) => reports.push(report),
                    Some(Ok(TaskResult::Failed { location, error })) => {
                        if error.is_transport() {
                            tracing::warn!("⚠️ Network fault probing {}: {}", location.name, error);
                        } else {
                            tracing::warn!("⚠️ Probe for {} failed: {}", location.name, error);
                        }
                        failed += 1;
                    }
                    Some(Ok(TaskResult::Booked(confirmation))) => {
                        in_flight.abort_all();
                        return Ok(RoundOutcome::Booked(confirmation));
                    }
                    Some(Ok(TaskResult::Fatal(error))) => {
                        in_flight.abort_all();
                        return Err(error);
                    }
                    Some(Err(join_error)) => {
                        tracing::error!("❌ Probe task aborted: {}", join_error);
                        failed += 1;
                    }
                    None => {}
                },
                () = self.context.gate.wait_until_running(), if waiting_for_resume => {}
            }
        }

        let state = &self.context.state;
        let stalled = state.is_holding() && !state.is_booked();
        Ok(RoundOutcome::Completed(RoundSummary::new(
            round, &reports, failed, stalled,
        )))
    }
}

async fn probe_task<P, H>(
    prober: Arc<P>,
    handler: Arc<H>,
    context: Arc<RunContext>,
    location: Location,
) -> TaskResult
where
    P: LocationProbe + 'static,
    H: CandidateHandler + 'static,
{
    let report = match prober.probe(&location).await {
        Ok(report) => report,
        Err(error) => return TaskResult::Failed { location, error },
    };

    let Some(candidate) = report.candidate.clone() else {
        return TaskResult::Probed(report);
    };

    if context.state.is_holding() {
        tracing::debug!(
            "⏭️ {}: a hold was already placed this run, ignoring candidate",
            location.name
        );
        return TaskResult::Probed(report);
    }
    if !context.gate.pause() {
        tracing::debug!(
            "⏭️ {}: another candidate is being reserved, ignoring",
            location.name
        );
        return TaskResult::Probed(report);
    }

    tracing::info!("⏸️ Polling paused to reserve slot at {}", location.name);
    match handler.on_candidate(candidate).await {
        Ok(Some(confirmation)) => TaskResult::Booked(confirmation),
        Ok(None) => TaskResult::Probed(report),
        Err(error) => TaskResult::Fatal(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::{Candidate, Slot};
    use async_trait::async_trait;
    use chrono::Duration as Days;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 15).unwrap()
    }

    fn location(id: u64, name: &str) -> Location {
        Location {
            id,
            name: name.to_string(),
            distance: id as f64,
        }
    }

    fn candidate_for(location: &Location, offset: i64) -> Candidate {
        let date = today() + Days::days(offset);
        Candidate {
            location: location.clone(),
            slot: Slot {
                slot_id: location.id * 10,
                start_date_time: date.and_hms_opt(9, 0, 0).unwrap(),
                formatted_start_date_time: format!("{} 9:00 AM", date),
                duration: 20,
            },
        }
    }

    enum Scripted {
        Open { offset: i64, in_window: bool },
        Closed,
        Fail,
    }

    /// 依據點 id 回傳預先設定的結果
    struct ScriptedProbe {
        script: HashMap<u64, Scripted>,
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(script: Vec<(u64, Scripted)>) -> Self {
            Self {
                script: script.into_iter().collect(),
                delay: Duration::from_millis(10),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LocationProbe for ScriptedProbe {
        async fn probe(&self, location: &Location) -> Result<ProbeReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.script.get(&location.id) {
                Some(Scripted::Open { offset, in_window }) => Ok(ProbeReport {
                    location: location.clone(),
                    next_available: Some(today() + Days::days(*offset)),
                    candidate: in_window.then(|| candidate_for(location, *offset)),
                }),
                Some(Scripted::Fail) => Err(SchedulerError::ApiError {
                    endpoint: "/api/AvailableLocationDates".to_string(),
                    status: 500,
                    body: String::new(),
                }),
                Some(Scripted::Closed) | None => Ok(ProbeReport {
                    location: location.clone(),
                    next_available: None,
                    candidate: None,
                }),
            }
        }
    }

    #[derive(Clone, Copy)]
    enum HandlerMode {
        Book,
        FailHold,
        Fatal,
    }

    /// 模擬預約流程：記錄候選並依模式回應，失敗時恢復派工
    struct RecordingHandler {
        context: Arc<RunContext>,
        mode: HandlerMode,
        candidates: Mutex<Vec<Candidate>>,
        delay: Duration,
    }

    impl RecordingHandler {
        fn new(context: Arc<RunContext>, mode: HandlerMode) -> Self {
            Self {
                context,
                mode,
                candidates: Mutex::new(Vec::new()),
                delay: Duration::from_millis(30),
            }
        }

        fn candidates(&self) -> Vec<Candidate> {
            self.candidates.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CandidateHandler for RecordingHandler {
        async fn on_candidate(&self, candidate: Candidate) -> Result<Option<BookingConfirmation>> {
            assert!(self.context.gate.is_paused(), "handler runs while paused");
            self.candidates.lock().unwrap().push(candidate.clone());
            tokio::time::sleep(self.delay).await;

            match self.mode {
                HandlerMode::Book => {
                    self.context.state.mark_holding();
                    self.context.state.mark_booked();
                    Ok(Some(BookingConfirmation {
                        confirmation_number: "CONF1".to_string(),
                        location_name: candidate.location.name,
                        slot_display: candidate.slot.formatted_start_date_time,
                        link: "https://public.example.com/?b=CONF1".to_string(),
                    }))
                }
                HandlerMode::FailHold => {
                    self.context.gate.resume();
                    Ok(None)
                }
                HandlerMode::Fatal => Err(SchedulerError::CancellationFailed {
                    confirmation: "OLD".to_string(),
                    reason: "status 500".to_string(),
                }),
            }
        }
    }

    fn settings(concurrency: usize) -> QueueSettings {
        QueueSettings {
            concurrency,
            interval: Duration::from_millis(10),
            jitter: Duration::ZERO,
        }
    }

    fn queue(
        probe: Arc<ScriptedProbe>,
        handler: Arc<RecordingHandler>,
        context: Arc<RunContext>,
        concurrency: usize,
    ) -> PollingQueue<ScriptedProbe, RecordingHandler> {
        PollingQueue::new(
            probe,
            handler,
            Arc::new(Notifier::disabled()),
            context,
            settings(concurrency),
        )
    }

    #[tokio::test]
    async fn test_round_respects_concurrency_bound_and_counts_failures() {
        let context = Arc::new(RunContext::new());
        let probe = Arc::new(ScriptedProbe::new(vec![
            (1, Scripted::Closed),
            (2, Scripted::Fail),
            (3, Scripted::Open { offset: 9, in_window: false }),
            (4, Scripted::Open { offset: 6, in_window: false }),
            (5, Scripted::Closed),
        ]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::Book));
        let locations: Vec<_> = (1..=5).map(|id| location(id, &format!("L{id}"))).collect();

        let outcome = queue(probe.clone(), handler.clone(), context, 2)
            .run_round(PollRound::first(), &locations)
            .await
            .unwrap();

        assert!(probe.max_active.load(Ordering::SeqCst) <= 2);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 5);
        assert!(handler.candidates().is_empty());
        match outcome {
            RoundOutcome::Completed(summary) => {
                assert_eq!(summary.polled, 5);
                assert_eq!(summary.failed, 1);
                let (best, date) = summary.best.unwrap();
                assert_eq!(best.name, "L4");
                assert_eq!(date, today() + Days::days(6));
            }
            RoundOutcome::Booked(_) => panic!("nothing should be booked"),
        }
    }

    #[tokio::test]
    async fn test_candidate_in_window_is_booked_and_round_stops() {
        // 範例：A 第 3 天有時段，B 第 10 天在區間外
        let context = Arc::new(RunContext::new());
        let probe = Arc::new(ScriptedProbe::new(vec![
            (1, Scripted::Open { offset: 3, in_window: true }),
            (2, Scripted::Open { offset: 10, in_window: false }),
        ]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::Book));
        let locations = vec![location(1, "A"), location(2, "B")];

        let confirmation = queue(probe, handler.clone(), context.clone(), 4)
            .run(&locations)
            .await
            .unwrap();

        assert_eq!(confirmation.location_name, "A");
        let candidates = handler.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].location.name, "A");
        assert!(context.state.is_booked());
    }

    #[tokio::test]
    async fn test_concurrent_discoveries_trigger_a_single_reservation() {
        let context = Arc::new(RunContext::new());
        let probe = Arc::new(ScriptedProbe::new(vec![
            (1, Scripted::Open { offset: 1, in_window: true }),
            (2, Scripted::Open { offset: 2, in_window: true }),
            (3, Scripted::Open { offset: 3, in_window: true }),
        ]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::FailHold));
        let locations: Vec<_> = (1..=3).map(|id| location(id, &format!("L{id}"))).collect();

        let outcome = queue(probe.clone(), handler.clone(), context.clone(), 3)
            .run_round(PollRound::first(), &locations)
            .await
            .unwrap();

        // 三個探測同時完成，只有一個能把佇列從 Running 切到 Paused
        assert_eq!(handler.candidates().len(), 1);
        assert!(!context.gate.is_paused());
        assert!(matches!(outcome, RoundOutcome::Completed(ref s) if s.polled == 3));
    }

    #[tokio::test]
    async fn test_pause_blocks_new_dispatch_until_resumed() {
        let context = Arc::new(RunContext::new());
        let probe = Arc::new(ScriptedProbe::new(vec![
            (1, Scripted::Open { offset: 1, in_window: true }),
            (2, Scripted::Closed),
            (3, Scripted::Closed),
        ]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::FailHold));
        let locations: Vec<_> = (1..=3).map(|id| location(id, &format!("L{id}"))).collect();

        // 一次只派一個：L1 暫停後，L2、L3 必須等到恢復後才派出
        let outcome = queue(probe.clone(), handler.clone(), context.clone(), 1)
            .run_round(PollRound::first(), &locations)
            .await
            .unwrap();

        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(outcome, RoundOutcome::Completed(ref s) if s.polled == 3 && s.failed == 0));
    }

    #[tokio::test]
    async fn test_holding_latch_suppresses_further_reservations() {
        let context = Arc::new(RunContext::new());
        context.state.mark_holding();
        let probe = Arc::new(ScriptedProbe::new(vec![(1, Scripted::Open { offset: 1, in_window: true })]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::Book));

        queue(probe, handler.clone(), context.clone(), 1)
            .run_round(PollRound::first(), &[location(1, "A")])
            .await
            .unwrap();

        assert!(handler.candidates().is_empty());
        assert!(!context.gate.is_paused());
    }

    #[tokio::test]
    async fn test_fatal_handler_error_ends_the_run() {
        let context = Arc::new(RunContext::new());
        let probe = Arc::new(ScriptedProbe::new(vec![(1, Scripted::Open { offset: 1, in_window: true })]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::Fatal));

        let result = queue(probe, handler, context, 1).run(&[location(1, "A")]).await;
        assert!(matches!(result, Err(SchedulerError::CancellationFailed { .. })));
    }

    #[test]
    fn test_next_delay_stays_within_jitter_window() {
        let settings = QueueSettings {
            concurrency: 1,
            interval: Duration::from_secs(10),
            jitter: Duration::from_secs(3),
        };
        for _ in 0..50 {
            let delay = settings.next_delay();
            assert!(delay >= Duration::from_secs(10));
            assert!(delay <= Duration::from_secs(13));
        }
        assert_eq!(
            QueueSettings { jitter: Duration::ZERO, ..settings }.next_delay(),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_round_after_abandoned_hold_reports_stalled() {
        let context = Arc::new(RunContext::new());
        assert!(context.state.mark_holding());
        let probe = Arc::new(ScriptedProbe::new(vec![(
            1,
            Scripted::Open { offset: 2, in_window: true },
        )]));
        let handler = Arc::new(RecordingHandler::new(context.clone(), HandlerMode::Book));

        let outcome = queue(probe, handler.clone(), context, 1)
            .run_round(PollRound::first(), &[location(1, "A")])
            .await
            .unwrap();

        assert!(handler.candidates().is_empty());
        match outcome {
            RoundOutcome::Completed(summary) => {
                assert!(summary.stalled);
                assert!(summary.to_string().contains("no further bookings"));
            }
            RoundOutcome::Booked(_) => panic!("nothing should be booked"),
        }
    }

    #[test]
    fn test_summary_without_openings() {
        let summary = RoundSummary::new(PollRound::first(), &[], 2, false);
        let text = summary.to_string();
        assert!(text.contains("Round #1"));
        assert!(text.contains("2 failed"));
        assert!(text.contains("No openings found"));
        assert!(!text.contains("no further bookings"));
    }
}
