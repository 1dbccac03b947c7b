//! Connection lifecycle as a pure `(state, event) -> (state, effects)` function.
//!
//! Nothing in this module touches a timer or a socket. The driver in
//! `manager.rs` feeds events in and executes the returned effects, which keeps
//! every rule here testable with a hand-made clock.

use crate::config::SyncPolicy;
use crate::domain::ports::ChangeEvent;
use crate::error::ConnectionError;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Subscribed,
    Closed,
    Error,
    /// Terminal until an explicit `start()`.
    GivenUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: ConnectionPhase,
    /// Drops since the last successful subscription.
    pub attempt_count: u32,
    pub last_attempt: Option<Instant>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            attempt_count: 0,
            last_attempt: None,
        }
    }
}

impl ConnectionState {
    /// True once automatic reconnection has stopped.
    pub fn is_degraded(&self) -> bool {
        self.phase == ConnectionPhase::GivenUp
    }

    /// Why automatic reconnection stopped, once it has.
    pub fn degraded_reason(&self) -> Option<ConnectionError> {
        self.is_degraded().then_some(ConnectionError::GaveUp {
            attempts: self.attempt_count,
        })
    }

    fn with_phase(&self, phase: ConnectionPhase) -> Self {
        Self {
            phase,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropKind {
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Start,
    /// The pending reconnect timer fired.
    ReconnectDue,
    SubscribeAck,
    Dropped(DropKind),
    Change(ChangeEvent),
    /// The pending debounce timer fired.
    DebounceElapsed,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Subscribe,
    Unsubscribe,
    /// Replaces any pending reconnect timer.
    ScheduleReconnect(Duration),
    CancelReconnect,
    /// Replaces any pending debounce timer.
    ScheduleDebounce(Duration),
    CancelDebounce,
    Refresh,
    GiveUp { attempts: u32 },
}

pub fn transition(
    state: &ConnectionState,
    event: SyncEvent,
    now: Instant,
    policy: &SyncPolicy,
) -> (ConnectionState, Vec<Effect>) {
    use ConnectionPhase::*;

    match (state.phase, event) {
        (Connecting | Subscribed, SyncEvent::Start) => (state.clone(), vec![]),
        (GivenUp, SyncEvent::Start) => {
            // Leave GivenUp first so a cooldown-deferred attempt still fires.
            let reset = ConnectionState {
                phase: Disconnected,
                attempt_count: 0,
                last_attempt: state.last_attempt,
            };
            attempt(&reset, now, policy, vec![])
        }
        (Closed | Error, SyncEvent::Start) => attempt(state, now, policy, vec![Effect::CancelReconnect]),
        (Disconnected, SyncEvent::Start) => attempt(state, now, policy, vec![]),

        (Disconnected | Closed | Error, SyncEvent::ReconnectDue) => attempt(state, now, policy, vec![]),

        (Connecting, SyncEvent::SubscribeAck) => (
            ConnectionState {
                phase: Subscribed,
                attempt_count: 0,
                last_attempt: state.last_attempt,
            },
            vec![],
        ),

        (Connecting | Subscribed, SyncEvent::Dropped(kind)) => {
            let phase = match kind {
                DropKind::Closed => Closed,
                DropKind::Error(_) => Error,
            };
            let attempts = state.attempt_count.saturating_add(1);
            if attempts <= policy.max_attempts {
                let next = ConnectionState {
                    phase,
                    attempt_count: attempts,
                    last_attempt: state.last_attempt,
                };
                (
                    next,
                    vec![
                        Effect::Unsubscribe,
                        Effect::ScheduleReconnect(policy.backoff(attempts)),
                    ],
                )
            } else {
                let next = ConnectionState {
                    phase: GivenUp,
                    attempt_count: attempts,
                    last_attempt: state.last_attempt,
                };
                (
                    next,
                    vec![
                        Effect::Unsubscribe,
                        Effect::CancelReconnect,
                        Effect::GiveUp { attempts },
                    ],
                )
            }
        }

        (Connecting | Subscribed, SyncEvent::Change(_)) => (
            state.clone(),
            vec![Effect::ScheduleDebounce(policy.debounce())],
        ),

        (Disconnected, SyncEvent::DebounceElapsed) => (state.clone(), vec![]),
        (_, SyncEvent::DebounceElapsed) => (state.clone(), vec![Effect::Refresh]),

        // Teardown effects are emitted even when already disconnected: a
        // deferred reconnect may still be pending.
        (_, SyncEvent::Stop) => (
            ConnectionState {
                phase: Disconnected,
                attempt_count: 0,
                last_attempt: state.last_attempt,
            },
            vec![
                Effect::CancelReconnect,
                Effect::CancelDebounce,
                Effect::Unsubscribe,
            ],
        ),

        // Late acks, drops from a torn-down subscription, stray timers.
        _ => (state.clone(), vec![]),
    }
}

/// Enters `Connecting` unless the cooldown since the last attempt is still open,
/// in which case the attempt is deferred to the end of the window.
fn attempt(
    state: &ConnectionState,
    now: Instant,
    policy: &SyncPolicy,
    mut effects: Vec<Effect>,
) -> (ConnectionState, Vec<Effect>) {
    if let Some(last) = state.last_attempt {
        let elapsed = now.saturating_duration_since(last);
        if elapsed < policy.cooldown() {
            effects.push(Effect::ScheduleReconnect(policy.cooldown() - elapsed));
            return (state.clone(), effects);
        }
    }
    let next = ConnectionState {
        last_attempt: Some(now),
        ..state.with_phase(ConnectionPhase::Connecting)
    };
    effects.push(Effect::Subscribe);
    (next, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::ChangeOperation;
    use chrono::Utc;

    fn policy() -> SyncPolicy {
        SyncPolicy::default()
    }

    fn change() -> SyncEvent {
        SyncEvent::Change(ChangeEvent {
            collection: "customer_payments".into(),
            operation: ChangeOperation::Insert,
            timestamp: Utc::now(),
        })
    }

    fn connected(now: Instant) -> ConnectionState {
        let (state, _) = transition(&ConnectionState::default(), SyncEvent::Start, now, &policy());
        let (state, _) = transition(&state, SyncEvent::SubscribeAck, now, &policy());
        state
    }

    #[test]
    fn test_start_subscribes_and_ack_resets_attempts() {
        let now = Instant::now();
        let (state, effects) = transition(&ConnectionState::default(), SyncEvent::Start, now, &policy());
        assert_eq!(state.phase, ConnectionPhase::Connecting);
        assert_eq!(state.last_attempt, Some(now));
        assert_eq!(effects, vec![Effect::Subscribe]);

        let dropped = ConnectionState {
            attempt_count: 2,
            ..state
        };
        let (state, effects) = transition(&dropped, SyncEvent::SubscribeAck, now, &policy());
        assert_eq!(state.phase, ConnectionPhase::Subscribed);
        assert_eq!(state.attempt_count, 0);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = SyncPolicy {
            max_attempts: 4,
            ..SyncPolicy::default()
        };
        let mut now = Instant::now();
        let mut state = connected(now);
        let mut delays = Vec::new();

        for _ in 0..4 {
            let (next, effects) = transition(&state, SyncEvent::Dropped(DropKind::Closed), now, &policy);
            assert_eq!(next.phase, ConnectionPhase::Closed);
            match effects.as_slice() {
                [Effect::Unsubscribe, Effect::ScheduleReconnect(delay)] => delays.push(*delay),
                other => panic!("unexpected effects {other:?}"),
            }
            now += delays[delays.len() - 1];
            let (next, effects) = transition(&next, SyncEvent::ReconnectDue, now, &policy);
            assert_eq!(effects, vec![Effect::Subscribe]);
            state = next;
        }

        let secs: Vec<u64> = delays.iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![10, 20, 40, 80]);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = policy();
        let now = Instant::now();
        let state = ConnectionState {
            phase: ConnectionPhase::Connecting,
            attempt_count: policy.max_attempts,
            last_attempt: Some(now),
        };

        let (state, effects) = transition(
            &state,
            SyncEvent::Dropped(DropKind::Error("socket reset".into())),
            now,
            &policy,
        );
        assert_eq!(state.phase, ConnectionPhase::GivenUp);
        assert_eq!(
            state.degraded_reason(),
            Some(ConnectionError::GaveUp { attempts: 3 })
        );
        assert_eq!(
            effects,
            vec![
                Effect::Unsubscribe,
                Effect::CancelReconnect,
                Effect::GiveUp { attempts: 3 }
            ]
        );

        // No automatic path out.
        let (after, effects) = transition(&state, SyncEvent::ReconnectDue, now, &policy);
        assert_eq!(after, state);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_start_from_given_up_resets_count() {
        let now = Instant::now();
        let state = ConnectionState {
            phase: ConnectionPhase::GivenUp,
            attempt_count: 3,
            last_attempt: Some(now - Duration::from_secs(60)),
        };
        let (state, effects) = transition(&state, SyncEvent::Start, now, &policy());
        assert_eq!(state.phase, ConnectionPhase::Connecting);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(effects, vec![Effect::Subscribe]);
    }

    #[test]
    fn test_cooldown_defers_attempt() {
        let now = Instant::now();
        let state = ConnectionState {
            phase: ConnectionPhase::Closed,
            attempt_count: 1,
            last_attempt: Some(now),
        };
        let later = now + Duration::from_secs(2);

        let (next, effects) = transition(&state, SyncEvent::ReconnectDue, later, &policy());
        assert_eq!(next, state);
        assert_eq!(effects, vec![Effect::ScheduleReconnect(Duration::from_secs(3))]);

        let (next, effects) = transition(&state, SyncEvent::ReconnectDue, now + Duration::from_secs(5), &policy());
        assert_eq!(next.phase, ConnectionPhase::Connecting);
        assert_eq!(effects, vec![Effect::Subscribe]);
    }

    #[test]
    fn test_changes_reschedule_one_debounce() {
        let now = Instant::now();
        let state = connected(now);
        for _ in 0..5 {
            let (next, effects) = transition(&state, change(), now, &policy());
            assert_eq!(next, state);
            assert_eq!(effects, vec![Effect::ScheduleDebounce(Duration::from_secs(3))]);
        }
        let (_, effects) = transition(&state, SyncEvent::DebounceElapsed, now, &policy());
        assert_eq!(effects, vec![Effect::Refresh]);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let now = Instant::now();
        let (stopped, effects) = transition(&connected(now), SyncEvent::Stop, now, &policy());
        assert_eq!(stopped.phase, ConnectionPhase::Disconnected);
        assert_eq!(
            effects,
            vec![
                Effect::CancelReconnect,
                Effect::CancelDebounce,
                Effect::Unsubscribe
            ]
        );

        let (again, effects) = transition(&stopped, SyncEvent::Stop, now, &policy());
        assert_eq!(again, stopped);
        assert_eq!(
            effects,
            vec![
                Effect::CancelReconnect,
                Effect::CancelDebounce,
                Effect::Unsubscribe
            ]
        );

        let (after, effects) = transition(&stopped, SyncEvent::DebounceElapsed, now, &policy());
        assert_eq!(after, stopped);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_restart_inside_cooldown_after_give_up() {
        let policy = policy();
        let gave_up_at = Instant::now();
        let state = ConnectionState {
            phase: ConnectionPhase::GivenUp,
            attempt_count: 3,
            last_attempt: Some(gave_up_at),
        };

        let (deferred, effects) =
            transition(&state, SyncEvent::Start, gave_up_at + Duration::from_secs(2), &policy);
        assert_eq!(deferred.phase, ConnectionPhase::Disconnected);
        assert_eq!(deferred.attempt_count, 0);
        assert!(!deferred.is_degraded());
        assert_eq!(effects, vec![Effect::ScheduleReconnect(Duration::from_secs(3))]);

        let (next, effects) = transition(
            &deferred,
            SyncEvent::ReconnectDue,
            gave_up_at + Duration::from_secs(5),
            &policy,
        );
        assert_eq!(next.phase, ConnectionPhase::Connecting);
        assert_eq!(effects, vec![Effect::Subscribe]);
    }

    #[test]
    fn test_stop_cancels_deferred_start() {
        let now = Instant::now();
        let state = ConnectionState {
            phase: ConnectionPhase::Disconnected,
            attempt_count: 0,
            last_attempt: Some(now),
        };
        let (pending, effects) =
            transition(&state, SyncEvent::Start, now + Duration::from_secs(1), &policy());
        assert_eq!(effects, vec![Effect::ScheduleReconnect(Duration::from_secs(4))]);

        let (stopped, effects) = transition(&pending, SyncEvent::Stop, now, &policy());
        assert_eq!(stopped.phase, ConnectionPhase::Disconnected);
        assert!(effects.contains(&Effect::CancelReconnect));
    }
}
