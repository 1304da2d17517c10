// Dual-channel data source - keeps one dashboard session's report current
//
// A single task owns the reconciler, the connection tracker and the push
// session. Everything else (connects, pulls, push readers, timers) runs in its
// own task and only posts messages to the inbox, so all state changes happen
// in one place and in arrival order.
use crate::application::channels::{
    ChannelError, PullClient, PushEmitter, PushEvent, PushSession, PushTransport,
};
use crate::application::connection::{
    ConnectionState, ConnectionTracker, DisconnectReason, Followups, ReconnectPolicy,
};
use crate::application::reconciler::{Outcome, Reconciler};
use crate::application::timers::Timers;
use crate::domain::query::QueryParams;
use crate::domain::report::{DataKind, ViewState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const INBOX_CAPACITY: usize = 100;
const COMMAND_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub settle_delay: Duration,
    pub fallback_delay: Duration,
    pub reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub cycle_timeout: Duration,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            fallback_delay: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: 3,
            cycle_timeout: Duration::from_secs(10),
        }
    }
}

impl SourceSettings {
    fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.max_reconnect_attempts,
            reconnect_delay: self.reconnect_delay,
            fallback_delay: self.fallback_delay,
        }
    }
}

/// Where the displayed data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DataStatus {
    Loading,
    Live,
    Remote,
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Channel {
    Push,
    Pull,
}

/// How one kind fared in the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum KindResult {
    Reconciled { channel: Channel, outcome: Outcome },
    RequestFailed,
}

impl KindResult {
    pub fn is_accepted(self) -> bool {
        matches!(self, KindResult::Reconciled { outcome, .. } if outcome.is_accepted())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub view: ViewState,
    pub connection: ConnectionState,
    pub status: DataStatus,
    pub loading: bool,
    pub initial_load: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub params: QueryParams,
    pub cycle: u64,
    pub outcomes: BTreeMap<DataKind, KindResult>,
}

impl DashboardSnapshot {
    pub fn accepted_kinds(&self) -> usize {
        self.outcomes.values().filter(|r| r.is_accepted()).count()
    }
}

#[derive(Debug, Error)]
#[error("data source task has stopped")]
pub struct SourceStopped;

#[derive(Debug)]
enum Command {
    SetParams(QueryParams),
    Refresh,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKind {
    Settle,
    Reconnect,
    Fallback,
    CycleDeadline,
}

enum Message {
    Connected {
        epoch: u64,
        session: PushSession,
    },
    ConnectFailed {
        epoch: u64,
        error: ChannelError,
    },
    Push {
        epoch: u64,
        event: PushEvent,
    },
    PushClosed {
        epoch: u64,
    },
    Pulled {
        generation: u64,
        cycle: u64,
        kind: DataKind,
        result: Result<Value, ChannelError>,
    },
    /// `stamp` is the push epoch, or the cycle id for the cycle deadline
    Timer {
        kind: TimerKind,
        stamp: u64,
    },
}

/// Cheap handle to a running data source. Dropping every handle tears the source down.
#[derive(Clone)]
pub struct DataSourceHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<DashboardSnapshot>,
}

impl DataSourceHandle {
    pub async fn set_params(&self, params: QueryParams) -> Result<(), SourceStopped> {
        self.send(Command::SetParams(params)).await
    }

    pub async fn refresh(&self) -> Result<(), SourceStopped> {
        self.send(Command::Refresh).await
    }

    pub async fn shutdown(&self) -> Result<(), SourceStopped> {
        self.send(Command::Shutdown).await
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshots.borrow().clone()
    }

    async fn send(&self, command: Command) -> Result<(), SourceStopped> {
        self.commands.send(command).await.map_err(|_| SourceStopped)
    }
}

pub struct DataSource;

impl DataSource {
    /// Start a data source task for one dashboard session
    pub fn spawn(
        push: Arc<dyn PushTransport>,
        pull: Arc<dyn PullClient>,
        settings: SourceSettings,
        params: QueryParams,
    ) -> (DataSourceHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);

        let reconciler = Reconciler::new();
        let tracker = ConnectionTracker::new(settings.reconnect_policy());
        let initial = DashboardSnapshot {
            view: reconciler.view().clone(),
            connection: tracker.state(),
            status: DataStatus::Loading,
            loading: true,
            initial_load: true,
            last_updated: None,
            params: params.clone(),
            cycle: 0,
            outcomes: BTreeMap::new(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let task = SourceTask {
            push,
            pull,
            settings,
            reconciler,
            tracker,
            params,
            generation: 0,
            epoch: 0,
            cycle: Cycle::new(0),
            status: DataStatus::Loading,
            loading: true,
            session: None,
            connecting: None,
            pulls: Vec::new(),
            timers: Timers::new(inbox_tx.clone()),
            inbox: inbox_tx,
            snapshots: snapshot_tx,
        };
        let join = tokio::spawn(task.run(command_rx, inbox_rx));

        let handle = DataSourceHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (handle, join)
    }
}

struct ActiveSession {
    emitter: Arc<dyn PushEmitter>,
    reader: JoinHandle<()>,
}

struct Cycle {
    id: u64,
    open: bool,
    pending_pulls: HashSet<DataKind>,
    live: HashSet<DataKind>,
    fresh: bool,
    outcomes: BTreeMap<DataKind, KindResult>,
}

impl Cycle {
    fn new(id: u64) -> Self {
        Self {
            id,
            open: id > 0,
            pending_pulls: HashSet::new(),
            live: HashSet::new(),
            fresh: false,
            outcomes: BTreeMap::new(),
        }
    }

    fn is_resolved(&self) -> bool {
        self.pending_pulls.is_empty() && self.outcomes.len() == DataKind::ALL.len()
    }
}

struct SourceTask {
    push: Arc<dyn PushTransport>,
    pull: Arc<dyn PullClient>,
    settings: SourceSettings,
    reconciler: Reconciler,
    tracker: ConnectionTracker,
    params: QueryParams,
    /// Bumped on every params change; pulls issued for older params are stale
    generation: u64,
    /// Bumped on every connect; events from older sessions are stale
    epoch: u64,
    cycle: Cycle,
    status: DataStatus,
    loading: bool,
    session: Option<ActiveSession>,
    connecting: Option<JoinHandle<()>>,
    pulls: Vec<JoinHandle<()>>,
    timers: Timers<TimerKind, Message>,
    inbox: mpsc::Sender<Message>,
    snapshots: watch::Sender<DashboardSnapshot>,
}

impl SourceTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut inbox: mpsc::Receiver<Message>,
    ) {
        tracing::info!("Starting report data source");
        self.connect_fresh();
        self.start_cycle();
        self.publish();

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetParams(params)) => self.set_params(params),
                    Some(Command::Refresh) => self.refresh(),
                    Some(Command::Shutdown) | None => break,
                },
                Some(message) = inbox.recv() => self.handle(message),
            }
            self.publish();
        }

        self.teardown().await;
    }

    fn set_params(&mut self, params: QueryParams) {
        if params == self.params {
            tracing::debug!("Query params unchanged, ignoring");
            return;
        }
        tracing::info!(
            "Query params changed to {} / {}",
            params.time_range.as_str(),
            params.driver_filter.as_str()
        );
        self.params = params;
        self.generation += 1;
        self.abort_pulls();
        self.connect_fresh();
        self.start_cycle();
    }

    fn refresh(&mut self) {
        tracing::info!("Refresh requested");
        if !self.tracker.is_connected() {
            self.connect_fresh();
        }
        self.start_cycle();
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::Connected { epoch, session } => self.on_connected(epoch, session),
            Message::ConnectFailed { epoch, error } => {
                if epoch != self.epoch {
                    return;
                }
                tracing::warn!("Realtime handshake failed: {}", error);
                let followups = self.tracker.on_handshake_failed();
                self.schedule(followups);
            }
            Message::Push { epoch, event } => {
                if epoch == self.epoch {
                    self.on_push_event(event);
                }
            }
            Message::PushClosed { epoch } => {
                if epoch == self.epoch {
                    self.on_push_event(PushEvent::Disconnected(DisconnectReason::TransportClose));
                }
            }
            Message::Pulled {
                generation,
                cycle,
                kind,
                result,
            } => self.on_pulled(generation, cycle, kind, result),
            Message::Timer { kind, stamp } => self.on_timer(kind, stamp),
        }
    }

    fn on_connected(&mut self, epoch: u64, session: PushSession) {
        if epoch != self.epoch {
            let emitter = session.emitter;
            tokio::spawn(async move { emitter.close().await });
            return;
        }
        self.connecting = None;
        self.tracker.on_connected();
        tracing::info!("Realtime channel connected");

        let PushSession { mut events, emitter } = session;
        let inbox = self.inbox.clone();
        let reader = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if inbox.send(Message::Push { epoch, event }).await.is_err() {
                    return;
                }
            }
            let _ = inbox.send(Message::PushClosed { epoch }).await;
        });
        self.session = Some(ActiveSession { emitter, reader });

        self.timers.schedule(
            TimerKind::Settle,
            self.settings.settle_delay,
            Message::Timer {
                kind: TimerKind::Settle,
                stamp: epoch,
            },
        );
    }

    fn on_push_event(&mut self, event: PushEvent) {
        match event {
            PushEvent::Data { kind, payload } => {
                self.on_result(kind, Channel::Push, &payload);
            }
            PushEvent::Disconnected(reason) => {
                tracing::info!("Realtime channel disconnected: {:?}", reason);
                self.drop_session();
                let followups = self.tracker.on_disconnect(&reason);
                self.schedule(followups);
            }
            PushEvent::Failed(error) => {
                tracing::warn!("Realtime channel failed: {}", error);
                self.drop_session();
                let followups = self.tracker.on_transport_error();
                self.schedule(followups);
            }
        }
    }

    fn on_pulled(
        &mut self,
        generation: u64,
        cycle: u64,
        kind: DataKind,
        result: Result<Value, ChannelError>,
    ) {
        if generation != self.generation || cycle != self.cycle.id {
            tracing::debug!("Discarding stale {:?} response from cycle {}", kind, cycle);
            return;
        }
        self.cycle.pending_pulls.remove(&kind);

        match result {
            Ok(_) if self.cycle.live.contains(&kind) => {
                tracing::debug!("Ignoring pulled {:?}, already live this cycle", kind);
            }
            Ok(payload) => self.on_result(kind, Channel::Pull, &payload),
            Err(error) => {
                tracing::warn!("Failed to fetch {:?}: {}", kind, error);
                self.cycle
                    .outcomes
                    .entry(kind)
                    .or_insert(KindResult::RequestFailed);
            }
        }

        if self.cycle.is_resolved() {
            self.finish_cycle();
        }
    }

    /// Reconcile a payload that belongs to the current cycle
    fn on_result(&mut self, kind: DataKind, channel: Channel, payload: &Value) {
        let outcome = self.reconciler.reconcile(Some(payload), kind);
        tracing::debug!("Reconciled {:?} from {:?}: {:?}", kind, channel, outcome);

        if outcome.is_fresh() {
            self.loading = false;
            match channel {
                Channel::Push => {
                    self.status = DataStatus::Live;
                    self.cycle.live.insert(kind);
                }
                Channel::Pull if self.cycle.live.is_empty() => self.status = DataStatus::Remote,
                Channel::Pull => {}
            }
        }

        self.cycle.fresh |= outcome.is_fresh();
        self.cycle
            .outcomes
            .insert(kind, KindResult::Reconciled { channel, outcome });
        if self.cycle.is_resolved() {
            self.finish_cycle();
        }
    }

    fn on_timer(&mut self, kind: TimerKind, stamp: u64) {
        match kind {
            TimerKind::CycleDeadline => {
                if stamp == self.cycle.id {
                    tracing::debug!("Cycle {} deadline reached", stamp);
                    self.finish_cycle();
                }
            }
            _ if stamp != self.epoch => {}
            TimerKind::Settle => {
                if self.tracker.is_connected() {
                    self.emit_requests();
                }
            }
            TimerKind::Fallback => {
                if !self.tracker.is_connected() {
                    tracing::info!("Falling back to pull channel");
                    self.start_cycle();
                }
            }
            TimerKind::Reconnect => {
                if self.tracker.begin_reconnect() {
                    tracing::info!(
                        "Reconnecting realtime channel (attempt {})",
                        self.tracker.attempts()
                    );
                    self.open_connection();
                } else {
                    tracing::warn!("Realtime reconnect attempts exhausted, using pull channel only");
                }
            }
        }
    }

    fn start_cycle(&mut self) {
        self.abort_pulls();
        self.cycle = Cycle::new(self.cycle.id + 1);
        self.loading = true;
        self.timers.schedule(
            TimerKind::CycleDeadline,
            self.settings.cycle_timeout,
            Message::Timer {
                kind: TimerKind::CycleDeadline,
                stamp: self.cycle.id,
            },
        );
        tracing::debug!("Starting cycle {}", self.cycle.id);

        if !self.tracker.is_connected() {
            self.pull_all();
        } else if !self.timers.is_pending(TimerKind::Settle) {
            self.emit_requests();
        }
    }

    fn finish_cycle(&mut self) {
        if !self.cycle.open {
            return;
        }
        self.cycle.open = false;
        self.timers.cancel(TimerKind::CycleDeadline);
        self.loading = false;
        if !self.cycle.fresh {
            self.status = DataStatus::Cached;
        }
        tracing::info!(
            "Cycle {} finished: {} of {} kinds accepted, status {:?}",
            self.cycle.id,
            self.cycle.outcomes.values().filter(|r| r.is_accepted()).count(),
            DataKind::ALL.len(),
            self.status
        );
    }

    fn pull_all(&mut self) {
        self.pulls.retain(|handle| !handle.is_finished());
        for request in self.params.requests() {
            let kind = request.kind();
            self.cycle.pending_pulls.insert(kind);

            let client = self.pull.clone();
            let inbox = self.inbox.clone();
            let generation = self.generation;
            let cycle = self.cycle.id;
            self.pulls.push(tokio::spawn(async move {
                let result = client.fetch(&request).await;
                let _ = inbox
                    .send(Message::Pulled {
                        generation,
                        cycle,
                        kind,
                        result,
                    })
                    .await;
            }));
        }
    }

    fn emit_requests(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        for request in self.params.requests() {
            let emitter = session.emitter.clone();
            tokio::spawn(async move {
                if let Err(e) = emitter.emit(&request).await {
                    tracing::warn!("Failed to emit {}: {}", request.event_name(), e);
                }
            });
        }
    }

    fn connect_fresh(&mut self) {
        self.close_session();
        self.timers.cancel(TimerKind::Reconnect);
        self.timers.cancel(TimerKind::Fallback);
        self.tracker.begin_fresh();
        self.open_connection();
    }

    fn open_connection(&mut self) {
        self.drop_session();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        self.epoch += 1;
        let epoch = self.epoch;
        let transport = self.push.clone();
        let inbox = self.inbox.clone();
        self.connecting = Some(tokio::spawn(async move {
            let message = match transport.connect().await {
                Ok(session) => Message::Connected { epoch, session },
                Err(error) => Message::ConnectFailed { epoch, error },
            };
            let _ = inbox.send(message).await;
        }));
    }

    fn schedule(&mut self, followups: Followups) {
        if let Some(delay) = followups.fallback_pull {
            self.timers.schedule(
                TimerKind::Fallback,
                delay,
                Message::Timer {
                    kind: TimerKind::Fallback,
                    stamp: self.epoch,
                },
            );
        }
        if let Some(delay) = followups.reconnect {
            self.timers.schedule(
                TimerKind::Reconnect,
                delay,
                Message::Timer {
                    kind: TimerKind::Reconnect,
                    stamp: self.epoch,
                },
            );
        }
    }

    /// Forget the current session without telling the server
    fn drop_session(&mut self) -> Option<Arc<dyn PushEmitter>> {
        self.timers.cancel(TimerKind::Settle);
        self.session.take().map(|session| {
            session.reader.abort();
            session.emitter
        })
    }

    fn close_session(&mut self) {
        if let Some(emitter) = self.drop_session() {
            tokio::spawn(async move { emitter.close().await });
        }
    }

    fn abort_pulls(&mut self) {
        for handle in self.pulls.drain(..) {
            handle.abort();
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(DashboardSnapshot {
            view: self.reconciler.view().clone(),
            connection: self.tracker.state(),
            status: self.status,
            loading: self.loading,
            initial_load: self.reconciler.is_initial_load(),
            last_updated: self.reconciler.last_updated(),
            params: self.params.clone(),
            cycle: self.cycle.id,
            outcomes: self.cycle.outcomes.clone(),
        });
    }

    async fn teardown(mut self) {
        tracing::info!("Stopping report data source");
        self.timers.cancel_all();
        self.abort_pulls();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        if let Some(emitter) = self.drop_session() {
            emitter.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::query::{ReportRequest, TimeRange};
    use crate::domain::report::SummaryTotals;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn params() -> QueryParams {
        QueryParams::for_range(
            TimeRange::Week,
            Utc.with_ymd_and_hms(2026, 10, 15, 12, 0, 0).unwrap(),
        )
    }

    fn summary(total: f64) -> Value {
        json!({"totalEarnings": total, "totalRides": 50, "earningsChange": 2.5})
    }

    fn earnings(label: &str) -> Value {
        json!({
            "chartData": [{"name": label, "earnings": 120, "rides": 6, "cancellations": 1}],
            "summary": {}
        })
    }

    fn drivers() -> Value {
        json!({"tableData": [{"id": "d1", "name": "Ana", "rides": 6, "earnings": 120}]})
    }

    /// Pull client answering from a per-kind script, optionally after a delay
    struct FakePull {
        responses: Mutex<HashMap<DataKind, Option<Value>>>,
        delay: Duration,
        calls: Mutex<Vec<DataKind>>,
    }

    impl FakePull {
        fn new(responses: Vec<(DataKind, Option<Value>)>) -> Arc<Self> {
            Self::delayed(responses, Duration::ZERO)
        }

        fn delayed(responses: Vec<(DataKind, Option<Value>)>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().collect()),
                delay,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn healthy() -> Arc<Self> {
            Self::new(vec![
                (DataKind::Summary, Some(summary(1000.0))),
                (DataKind::EarningsSeries, Some(earnings("Mon"))),
                (DataKind::DriverTable, Some(drivers())),
            ])
        }

        fn calls(&self, kind: DataKind) -> usize {
            self.calls.lock().unwrap().iter().filter(|k| **k == kind).count()
        }
    }

    #[async_trait]
    impl PullClient for FakePull {
        async fn fetch(&self, request: &ReportRequest) -> Result<Value, ChannelError> {
            self.calls.lock().unwrap().push(request.kind());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let ReportRequest::Earnings { time_range, .. } = request {
                if self.responses.lock().unwrap().get(&DataKind::EarningsSeries).is_none() {
                    return Ok(earnings(time_range.as_str()));
                }
            }
            match self.responses.lock().unwrap().get(&request.kind()) {
                Some(Some(payload)) => Ok(payload.clone()),
                _ => Err(ChannelError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }

    struct FakeEmitter {
        emitted: Arc<Mutex<Vec<&'static str>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PushEmitter for FakeEmitter {
        async fn emit(&self, request: &ReportRequest) -> Result<(), ChannelError> {
            self.emitted.lock().unwrap().push(request.event_name());
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Push transport that accepts or refuses handshakes from a script and
    /// refuses once the script runs out
    struct FakePush {
        script: Mutex<VecDeque<bool>>,
        connects: AtomicUsize,
        sessions: Mutex<Vec<mpsc::Sender<PushEvent>>>,
        emitted: Arc<Mutex<Vec<&'static str>>>,
        closed: Arc<AtomicBool>,
    }

    impl FakePush {
        fn scripted(script: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                connects: AtomicUsize::new(0),
                sessions: Mutex::new(Vec::new()),
                emitted: Arc::new(Mutex::new(Vec::new())),
                closed: Arc::new(AtomicBool::new(false)),
            })
        }

        fn unreachable() -> Arc<Self> {
            Self::scripted(Vec::new())
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        fn latest_session(&self) -> mpsc::Sender<PushEvent> {
            self.sessions.lock().unwrap().last().cloned().unwrap()
        }

        fn emitted(&self) -> Vec<&'static str> {
            self.emitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PushTransport for FakePush {
        async fn connect(&self) -> Result<PushSession, ChannelError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.script.lock().unwrap().pop_front().unwrap_or(false) {
                return Err(ChannelError::Handshake("refused".to_string()));
            }
            let (tx, rx) = mpsc::channel(16);
            self.sessions.lock().unwrap().push(tx);
            Ok(PushSession {
                events: rx,
                emitter: Arc::new(FakeEmitter {
                    emitted: self.emitted.clone(),
                    closed: self.closed.clone(),
                }),
            })
        }
    }

    fn spawn(push: Arc<FakePush>, pull: Arc<FakePull>) -> (DataSourceHandle, JoinHandle<()>) {
        DataSource::spawn(push, pull, SourceSettings::default(), params())
    }

    async fn advance(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_channel_used_when_push_unavailable() {
        let push = FakePush::unreachable();
        let pull = FakePull::healthy();
        let (handle, _join) = spawn(push.clone(), pull.clone());

        advance(100).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Error);
        assert_eq!(snapshot.status, DataStatus::Remote);
        assert!(!snapshot.loading);
        assert!(!snapshot.initial_load);
        assert_eq!(snapshot.view.summary.total_earnings, 1000.0);
        assert_eq!(snapshot.view.series[0].label, "Mon");
        assert_eq!(snapshot.view.drivers.len(), 1);
        assert_eq!(snapshot.accepted_kinds(), 3);
        assert_eq!(pull.calls(DataKind::Summary), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_driver_pull_does_not_block_other_kinds() {
        let push = FakePush::unreachable();
        let pull = FakePull::new(vec![
            (DataKind::Summary, Some(summary(1000.0))),
            (DataKind::EarningsSeries, Some(earnings("Mon"))),
            (DataKind::DriverTable, None),
        ]);
        let (handle, _join) = spawn(push, pull);

        advance(100).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.view.summary.total_earnings, 1000.0);
        assert_eq!(snapshot.view.series.len(), 1);
        assert!(snapshot.view.drivers.is_empty());
        assert_eq!(snapshot.accepted_kinds(), 2);
        assert_eq!(
            snapshot.outcomes.get(&DataKind::DriverTable),
            Some(&KindResult::RequestFailed)
        );
        assert!(!snapshot.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_triggers_fallback_pull() {
        let push = FakePush::unreachable();
        let pull = FakePull::healthy();
        let (_handle, _join) = spawn(push, pull.clone());

        advance(100).await;
        assert_eq!(pull.calls(DataKind::EarningsSeries), 1);

        advance(1000).await;
        assert_eq!(pull.calls(DataKind::EarningsSeries), 2);
        assert_eq!(pull.calls(DataKind::DriverTable), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_requests_emitted_after_settle_delay() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::healthy();
        let (handle, _join) = spawn(push.clone(), pull);

        advance(100).await;
        assert_eq!(handle.snapshot().connection, ConnectionState::Connected);
        assert!(push.emitted().is_empty());

        advance(500).await;
        assert_eq!(
            push.emitted(),
            vec![
                "requestReportsSummary",
                "requestEarningsReport",
                "requestDriverPerformance"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_results_are_live_and_preferred_over_pull() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::delayed(
            vec![
                (DataKind::Summary, Some(summary(1000.0))),
                (DataKind::EarningsSeries, Some(earnings("pulled"))),
                (DataKind::DriverTable, Some(drivers())),
            ],
            Duration::from_secs(2),
        );
        let (handle, _join) = spawn(push.clone(), pull);

        advance(600).await;
        let session = push.latest_session();
        session
            .send(PushEvent::Data {
                kind: DataKind::EarningsSeries,
                payload: earnings("pushed"),
            })
            .await
            .unwrap();
        advance(100).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, DataStatus::Live);
        assert_eq!(snapshot.view.series[0].label, "pushed");

        // Pulled results land later; earnings stays the live version
        advance(2000).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, DataStatus::Live);
        assert_eq!(snapshot.view.series[0].label, "pushed");
        assert_eq!(snapshot.view.summary.total_earnings, 1000.0);
        assert_eq!(
            snapshot.outcomes.get(&DataKind::EarningsSeries),
            Some(&KindResult::Reconciled {
                channel: Channel::Push,
                outcome: Outcome::Fresh
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_from_earlier_cycle_cannot_overwrite_live_data() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::delayed(
            vec![
                (DataKind::Summary, Some(summary(1000.0))),
                (DataKind::EarningsSeries, Some(earnings("pulled"))),
                (DataKind::DriverTable, Some(drivers())),
            ],
            Duration::from_secs(3),
        );
        let (handle, _join) = spawn(push.clone(), pull.clone());

        // Cycle 1 pulled while connecting; cycle 2 runs over push
        advance(1000).await;
        handle.refresh().await.unwrap();
        advance(10).await;
        push.latest_session()
            .send(PushEvent::Data {
                kind: DataKind::EarningsSeries,
                payload: earnings("pushed"),
            })
            .await
            .unwrap();
        advance(10).await;
        assert_eq!(handle.snapshot().cycle, 2);

        advance(3000).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, DataStatus::Live);
        assert_eq!(snapshot.view.series[0].label, "pushed");
        assert_eq!(snapshot.view.summary, SummaryTotals::default());
        assert_eq!(pull.calls(DataKind::EarningsSeries), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_push_update_keeps_last_good_state() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::healthy();
        let (handle, _join) = spawn(push.clone(), pull);

        advance(100).await;
        let before = handle.snapshot().view;
        push.latest_session()
            .send(PushEvent::Data {
                kind: DataKind::Summary,
                payload: json!({"totalEarnings": 1, "totalRides": 1, "isSampleData": true}),
            })
            .await
            .unwrap();
        advance(100).await;

        assert_eq!(handle.snapshot().view, before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_close_schedules_reconnect() {
        let push = FakePush::scripted(vec![true, true]);
        let (handle, _join) = spawn(push.clone(), FakePull::healthy());

        advance(1000).await;
        push.latest_session()
            .send(PushEvent::Disconnected(DisconnectReason::from_wire("transport close")))
            .await
            .unwrap();
        advance(100).await;
        assert_eq!(handle.snapshot().connection, ConnectionState::Disconnected);
        assert_eq!(push.connects(), 1);

        advance(5000).await;
        assert_eq!(push.connects(), 2);
        assert_eq!(handle.snapshot().connection, ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_initiated_close_does_not_reconnect() {
        let push = FakePush::scripted(vec![true, true]);
        let (handle, _join) = spawn(push.clone(), FakePull::healthy());

        advance(1000).await;
        push.latest_session()
            .send(PushEvent::Disconnected(DisconnectReason::from_wire("client-initiated")))
            .await
            .unwrap();
        advance(30_000).await;

        assert_eq!(push.connects(), 1);
        assert_eq!(handle.snapshot().connection, ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_capped_until_refresh() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::healthy();
        let (handle, _join) = spawn(push.clone(), pull.clone());

        advance(1000).await;
        push.latest_session()
            .send(PushEvent::Disconnected(DisconnectReason::ServerInitiated))
            .await
            .unwrap();
        advance(60_000).await;

        // First connect plus three reconnect attempts
        assert_eq!(push.connects(), 4);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Error);
        assert_eq!(snapshot.status, DataStatus::Remote);

        handle.refresh().await.unwrap();
        advance(100).await;
        assert_eq!(push.connects(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_without_valid_data_ends_cached() {
        let placeholder = json!({"isSampleData": true, "totalEarnings": 1, "totalRides": 1});
        let pull = FakePull::new(vec![
            (DataKind::Summary, Some(placeholder.clone())),
            (DataKind::EarningsSeries, Some(placeholder.clone())),
            (DataKind::DriverTable, Some(placeholder)),
        ]);
        let (handle, _join) = spawn(FakePush::unreachable(), pull);

        advance(100).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, DataStatus::Cached);
        assert!(!snapshot.loading);
        assert!(snapshot.initial_load);
        assert_eq!(snapshot.view, ViewState::default());
        assert_eq!(snapshot.accepted_kinds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_deadline_clears_loading_when_push_is_silent() {
        let push = FakePush::scripted(vec![true, true]);
        let pull = FakePull::delayed(Vec::new(), Duration::from_secs(60));
        let (handle, _join) = spawn(push, pull);

        advance(9_000).await;
        assert!(handle.snapshot().loading);

        advance(2_000).await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.status, DataStatus::Cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_params_change_discards_stale_responses() {
        let push = FakePush::unreachable();
        let pull = FakePull::delayed(
            vec![
                (DataKind::Summary, Some(summary(1000.0))),
                (DataKind::DriverTable, Some(drivers())),
            ],
            Duration::from_secs(2),
        );
        let (handle, _join) = spawn(push, pull.clone());

        advance(500).await;
        let mut month = params();
        month.time_range = TimeRange::Month;
        handle.set_params(month.clone()).await.unwrap();
        advance(5000).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.params, month);
        assert_eq!(snapshot.view.series[0].label, "month");
        assert!(pull.calls(DataKind::EarningsSeries) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_while_connected_uses_push_only() {
        let push = FakePush::scripted(vec![true]);
        let pull = FakePull::healthy();
        let (handle, _join) = spawn(push.clone(), pull.clone());

        advance(1000).await;
        handle.refresh().await.unwrap();
        advance(100).await;

        assert_eq!(pull.calls(DataKind::Summary), 1);
        assert_eq!(push.connects(), 1);
        assert_eq!(push.emitted().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_session_and_stops_task() {
        let push = FakePush::scripted(vec![true]);
        let (handle, join) = spawn(push.clone(), FakePull::healthy());
        let mut updates = handle.subscribe();

        advance(1000).await;
        handle.shutdown().await.unwrap();
        join.await.unwrap();

        assert!(push.closed.load(Ordering::SeqCst));
        assert!(updates.has_changed().is_err());
        assert!(handle.refresh().await.is_err());

        // No timers left behind to reconnect
        advance(30_000).await;
        assert_eq!(push.connects(), 1);
    }
}
