//! Lifecycle state machine for the voice session
//!
//! All lifecycle transitions go through the `reduce()` function, which
//! returns a new state and a list of effects for the session controller to
//! execute. Every attempt to start gets a fresh session id, and events that
//! carry another id are dropped, so a late close from a previous session can
//! never tear down the current one.

use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

/// Authoritative lifecycle state of the voice session.
#[derive(Debug, Clone, Default)]
pub enum State {
    #[default]
    Idle,
    Connecting {
        session_id: Uuid,
    },
    Active {
        session_id: Uuid,
        started_at: Instant,
    },
    /// Stopped by the user; a new session may be started
    Closed {
        session_id: Uuid,
    },
}

/// Coarse status exposed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Active,
    Closed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Active => "active",
            SessionStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

impl State {
    pub fn status(&self) -> SessionStatus {
        match self {
            State::Idle => SessionStatus::Idle,
            State::Connecting { .. } => SessionStatus::Connecting,
            State::Active { .. } => SessionStatus::Active,
            State::Closed { .. } => SessionStatus::Closed,
        }
    }

    pub fn session_id(&self) -> Option<Uuid> {
        match self {
            State::Idle => None,
            State::Connecting { session_id }
            | State::Active { session_id, .. }
            | State::Closed { session_id } => Some(*session_id),
        }
    }
}

/// Events that can trigger lifecycle transitions.
#[derive(Debug, Clone)]
pub enum Event {
    /// User asked to start a session
    Start,
    /// User asked to stop (always accepted)
    Stop,
    /// Remote stream confirmed setup
    StreamOpened { id: Uuid },
    /// Device acquisition or connection failed while connecting
    StartFailed { id: Uuid, err: String },
    /// Server closed the stream
    RemoteClosed { id: Uuid, reason: Option<String> },
    /// Transport error mid-session
    TransportFailed { id: Uuid, err: String },
    /// Microphone or speaker stream died mid-session
    DeviceFailed { id: Uuid, err: String },
}

/// Effects to be executed by the session controller after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Acquire devices and open the stream for this session
    Connect { id: Uuid },
    /// Open the capture gate and start the inbound loop
    Activate { id: Uuid },
    /// Abandon an in-flight connect
    AbortConnect { id: Uuid },
    /// Release devices, stream and playback state of this session
    Release { id: Uuid },
    /// A start was requested while connecting or active
    RejectStart,
    /// Publish the new status to observers
    Notify,
}

/// Reducer function: (state, event) -> (next_state, effects)
///
/// Key rules:
/// - Never mutate state directly
/// - Ignore events with stale session IDs
/// - Always emit Notify after state changes
pub fn reduce(state: &State, event: Event) -> (State, Vec<Effect>) {
    use Effect::*;
    use Event::*;
    use State::*;

    match (state, event) {
        // -----------------
        // Start
        // -----------------
        (Idle | Closed { .. }, Start) => {
            let id = Uuid::new_v4();
            (Connecting { session_id: id }, vec![Connect { id }, Notify])
        }
        (Connecting { .. } | Active { .. }, Start) => (state.clone(), vec![RejectStart]),

        // -----------------
        // Connecting
        // -----------------
        (Connecting { session_id }, StreamOpened { id }) if *session_id == id => (
            Active {
                session_id: id,
                started_at: Instant::now(),
            },
            vec![Activate { id }, Notify],
        ),
        (Connecting { session_id }, StartFailed { id, err }) if *session_id == id => {
            log::warn!("Session {} failed to start: {}", id, err);
            (Idle, vec![Notify])
        }
        // Stop while connecting abandons the attempt
        (Connecting { session_id }, Stop) => (
            Closed {
                session_id: *session_id,
            },
            vec![AbortConnect { id: *session_id }, Notify],
        ),

        // -----------------
        // Active
        // -----------------
        (
            Active {
                session_id,
                started_at,
            },
            Stop,
        ) => {
            log::info!(
                "Session {} stopped by user after {:?}",
                session_id,
                started_at.elapsed()
            );
            (
                Closed {
                    session_id: *session_id,
                },
                vec![Release { id: *session_id }, Notify],
            )
        }
        (Active { session_id, .. }, RemoteClosed { id, reason }) if *session_id == id => {
            log::info!(
                "Session {} closed by server ({})",
                id,
                reason.as_deref().unwrap_or("no reason")
            );
            (Idle, vec![Release { id }, Notify])
        }
        (Active { session_id, .. }, TransportFailed { id, err }) if *session_id == id => {
            log::warn!("Session {} transport failed: {}", id, err);
            (Idle, vec![Release { id }, Notify])
        }
        (Active { session_id, .. }, DeviceFailed { id, err }) if *session_id == id => {
            log::warn!("Session {} lost an audio device: {}", id, err);
            (Idle, vec![Release { id }, Notify])
        }

        // -----------------
        // Idempotent stop
        // -----------------
        (Idle, Stop) => (Idle, vec![]),
        (Closed { .. }, Stop) => (state.clone(), vec![]),

        // -----------------
        // Stale or unhandled: no transition
        // -----------------
        _ => (state.clone(), vec![]),
    }
}
