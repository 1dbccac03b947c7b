use super::state::{ConnectionPhase, ConnectionState, DropKind, Effect, SyncEvent, transition};
use crate::config::SyncPolicy;
use crate::domain::ports::{
    ChangeFeedRef, FeedMessage, FeedStatus, FeedSubscription, NotificationKind,
    NotificationSinkRef, RefreshTriggerRef,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Keeps the payment view live: owns the change-feed subscription, the
/// reconnect timer and the debounce timer, and turns bursts of change
/// notifications into single refresh triggers.
///
/// All timers belong to one background task started by [`SyncManager::start`]
/// and torn down by [`SyncManager::stop`]. Connection state is published on a
/// watch channel so callers can observe degraded mode.
pub struct SyncManager {
    policy: SyncPolicy,
    feed: ChangeFeedRef,
    refresher: RefreshTriggerRef,
    notifier: NotificationSinkRef,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    runner: Option<Runner>,
}

struct Runner {
    commands: mpsc::UnboundedSender<SyncEvent>,
    handle: JoinHandle<()>,
}

impl SyncManager {
    pub fn new(
        policy: SyncPolicy,
        feed: ChangeFeedRef,
        refresher: RefreshTriggerRef,
        notifier: NotificationSinkRef,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::default());
        Self {
            policy,
            feed,
            refresher,
            notifier,
            state_tx: Arc::new(state_tx),
            runner: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connects, or reconnects after the manager gave up. No-op while connected.
    pub fn start(&mut self) {
        let running = self
            .runner
            .as_ref()
            .is_some_and(|runner| !runner.handle.is_finished());
        if !running {
            self.runner = Some(self.spawn());
        }
        if let Some(runner) = &self.runner
            && runner.commands.send(SyncEvent::Start).is_err()
        {
            warn!("sync driver is gone; start ignored");
        }
    }

    /// Cancels all timers, drops the subscription and waits for the driver to
    /// exit. Safe to call any number of times.
    pub async fn stop(&mut self) {
        let Some(runner) = self.runner.take() else {
            return;
        };
        let _ = runner.commands.send(SyncEvent::Stop);
        drop(runner.commands);
        if let Err(e) = runner.handle.await {
            warn!(error = %e, "sync driver ended abnormally");
        }
    }

    fn spawn(&self) -> Runner {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            policy: self.policy.clone(),
            feed: Arc::clone(&self.feed),
            refresher: Arc::clone(&self.refresher),
            notifier: Arc::clone(&self.notifier),
            state_tx: Arc::clone(&self.state_tx),
            state: self.state(),
            subscription: None,
            reconnect: None,
            debounce: None,
            timer_tx,
            next_token: 0,
        };
        let handle = tokio::spawn(driver.run(command_rx, timer_rx));
        Runner { commands, handle }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Reconnect,
    Debounce,
}

#[derive(Debug)]
struct TimerFired {
    kind: TimerKind,
    token: u64,
}

/// Pending sleep; aborted when replaced or dropped.
struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct Driver {
    policy: SyncPolicy,
    feed: ChangeFeedRef,
    refresher: RefreshTriggerRef,
    notifier: NotificationSinkRef,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state: ConnectionState,
    subscription: Option<FeedSubscription>,
    reconnect: Option<Timer>,
    debounce: Option<Timer>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    next_token: u64,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SyncEvent>,
        mut timers: mpsc::UnboundedReceiver<TimerFired>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SyncEvent::Stop) | None => {
                        self.dispatch(SyncEvent::Stop).await;
                        break;
                    }
                    Some(event) => self.dispatch(event).await,
                },
                Some(fired) = timers.recv() => {
                    if let Some(event) = self.fire(fired) {
                        self.dispatch(event).await;
                    }
                }
                message = next_message(&mut self.subscription) => {
                    let event = match message {
                        Some(FeedMessage::Status(FeedStatus::Subscribed)) => SyncEvent::SubscribeAck,
                        Some(FeedMessage::Status(FeedStatus::Closed)) => SyncEvent::Dropped(DropKind::Closed),
                        Some(FeedMessage::Status(FeedStatus::ChannelError(reason))) => {
                            SyncEvent::Dropped(DropKind::Error(reason))
                        }
                        Some(FeedMessage::Change(change)) => SyncEvent::Change(change),
                        None => {
                            self.subscription = None;
                            SyncEvent::Dropped(DropKind::Closed)
                        }
                    };
                    self.dispatch(event).await;
                }
            }
        }
        debug!("sync driver stopped");
    }

    /// Runs the transition function to a fixed point, executing effects as
    /// they are produced. Effects may feed events back in.
    async fn dispatch(&mut self, event: SyncEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let (next, effects) = transition(&self.state, event, Instant::now(), &self.policy);
            if next != self.state {
                debug!(
                    from = ?self.state.phase,
                    to = ?next.phase,
                    attempt = next.attempt_count,
                    "connection state changed"
                );
                if next.phase == ConnectionPhase::Subscribed {
                    info!("realtime change feed subscribed");
                }
                self.state = next.clone();
                self.state_tx.send_replace(next);
            }
            for effect in effects {
                if let Some(follow_up) = self.execute(effect).await {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<SyncEvent> {
        match effect {
            Effect::Subscribe => {
                self.drop_subscription();
                match self.feed.subscribe(&self.policy.collections).await {
                    Ok(subscription) => {
                        self.subscription = Some(subscription);
                        None
                    }
                    Err(e) => {
                        warn!(error = %e, attempt = self.state.attempt_count, "subscribe failed");
                        Some(SyncEvent::Dropped(DropKind::Error(e.to_string())))
                    }
                }
            }
            Effect::Unsubscribe => {
                self.drop_subscription();
                None
            }
            Effect::ScheduleReconnect(delay) => {
                info!(
                    attempt = self.state.attempt_count,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect scheduled"
                );
                self.schedule(TimerKind::Reconnect, delay);
                None
            }
            Effect::CancelReconnect => {
                self.reconnect = None;
                None
            }
            Effect::ScheduleDebounce(delay) => {
                self.schedule(TimerKind::Debounce, delay);
                None
            }
            Effect::CancelDebounce => {
                self.debounce = None;
                None
            }
            Effect::Refresh => {
                debug!("change burst settled, refreshing");
                self.refresher.trigger();
                None
            }
            Effect::GiveUp { attempts } => {
                if let Some(reason) = self.state.degraded_reason() {
                    error!(error = %reason, "realtime updates disabled");
                }
                self.notifier.notify(
                    NotificationKind::Error,
                    &format!(
                        "Realtime updates unavailable after {attempts} attempts. Use manual refresh."
                    ),
                );
                None
            }
        }
    }

    fn drop_subscription(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn slot(&mut self, kind: TimerKind) -> &mut Option<Timer> {
        match kind {
            TimerKind::Reconnect => &mut self.reconnect,
            TimerKind::Debounce => &mut self.debounce,
        }
    }

    fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.next_token += 1;
        let token = self.next_token;
        let tx = self.timer_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, token });
        });
        // Replacing the slot drops, and so aborts, the previous timer.
        *self.slot(kind) = Some(Timer { token, handle });
    }

    /// Maps a fired timer to its event, ignoring timers that were replaced or
    /// cancelled after they had already sent.
    fn fire(&mut self, fired: TimerFired) -> Option<SyncEvent> {
        let slot = self.slot(fired.kind);
        if slot.as_ref().is_none_or(|timer| timer.token != fired.token) {
            return None;
        }
        slot.take();
        Some(match fired.kind {
            TimerKind::Reconnect => SyncEvent::ReconnectDue,
            TimerKind::Debounce => SyncEvent::DebounceElapsed,
        })
    }
}

async fn next_message(subscription: &mut Option<FeedSubscription>) -> Option<FeedMessage> {
    match subscription {
        Some(subscription) => subscription.next().await,
        None => std::future::pending().await,
    }
}
