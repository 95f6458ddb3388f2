//! Session change events.
//!
//! The identity provider publishes session transitions on a
//! [`SessionEventBus`]. Consumers hold a [`SessionSubscription`]; dropping it
//! unsubscribes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::Session;

/// Kind of session change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionTransition {
    SignedUp,
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

impl SessionTransition {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionTransition::SignedUp => "signed_up",
            SessionTransition::SignedIn => "signed_in",
            SessionTransition::TokenRefreshed => "token_refreshed",
            SessionTransition::SignedOut => "signed_out",
        }
    }

    /// Whether the transition carries an authenticated session.
    pub fn establishes_session(&self) -> bool {
        !matches!(self, SessionTransition::SignedOut)
    }
}

/// A session transition with the session it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub event_id: Uuid,
    pub transition: SessionTransition,
    /// The session after the transition. `None` for sign-out and for
    /// sign-ups awaiting email confirmation.
    pub session: Option<Session>,
    pub occurred_at: DateTime<Utc>,
}

impl SessionEvent {
    pub fn new(transition: SessionTransition, session: Option<Session>) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            transition,
            session,
            occurred_at: Utc::now(),
        }
    }
}

/// Broadcast bus for session transitions.
///
/// Receivers that fall behind skip the missed events and keep going.
#[derive(Debug, Clone)]
pub struct SessionEventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a transition. Dropped silently when nobody is listening.
    pub fn emit(&self, event: SessionEvent) {
        tracing::debug!(
            transition = event.transition.as_str(),
            event_id = %event.event_id,
            subscriber_count = self.tx.receiver_count(),
            "Session event emit"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SessionEventBus {
    fn default() -> Self {
        Self::new(crate::defaults::SESSION_EVENT_CAPACITY)
    }
}

/// A live subscription to session transitions.
#[derive(Debug)]
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn session(email: &str) -> Session {
        Session {
            identity: Identity::new(email).unwrap(),
            email_verified: true,
        }
    }

    #[tokio::test]
    async fn test_emit_subscribe() {
        let bus = SessionEventBus::new(8);
        let mut sub = bus.subscribe();

        bus.emit(SessionEvent::new(
            SessionTransition::SignedIn,
            Some(session("alice@x.com")),
        ));

        let event = sub.next().await.unwrap();
        assert_eq!(event.transition, SessionTransition::SignedIn);
        assert_eq!(
            event.session.unwrap().identity.as_str(),
            "alice@x.com"
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let bus = SessionEventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(SessionEvent::new(SessionTransition::SignedOut, None));

        assert_eq!(a.next().await.unwrap().transition, SessionTransition::SignedOut);
        assert_eq!(b.next().await.unwrap().transition, SessionTransition::SignedOut);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let bus = SessionEventBus::new(8);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_ends_subscription() {
        let bus = SessionEventBus::new(8);
        let mut sub = bus.subscribe();
        drop(bus);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_continues() {
        let bus = SessionEventBus::new(2);
        let mut sub = bus.subscribe();

        for _ in 0..5 {
            bus.emit(SessionEvent::new(
                SessionTransition::TokenRefreshed,
                Some(session("a@x.com")),
            ));
        }
        bus.emit(SessionEvent::new(SessionTransition::SignedOut, None));

        // The oldest events are gone; the subscriber still reaches the latest.
        let mut last = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await
        {
            last = Some(event.transition);
        }
        assert_eq!(last, Some(SessionTransition::SignedOut));
    }

    #[test]
    fn test_establishes_session() {
        assert!(SessionTransition::SignedIn.establishes_session());
        assert!(SessionTransition::TokenRefreshed.establishes_session());
        assert!(!SessionTransition::SignedOut.establishes_session());
    }
}
