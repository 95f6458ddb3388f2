//! Session lifecycle hook.
//!
//! Watches session transitions and makes sure every identity that signs in
//! on this device has key material. Provisioning runs once per identity per
//! process; token refreshes for the identity already seen are ignored.
//! Failures are logged and left for the next sign-in or an explicit
//! [`SessionLifecycleHook::retry`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use shield_core::{
    Identity, IdentityProvider, ProvisionOutcome, Result, SessionEvent, SessionSubscription,
    SessionTransition,
};

use crate::key_store::KeyStore;

/// What the hook did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookAction {
    Provisioned(ProvisionOutcome),
    /// Identity already provisioned in this process, or a token refresh for
    /// the identity last seen.
    AlreadyHandled,
    /// Email not confirmed yet; nothing done, nothing remembered.
    SkippedUnverified,
    /// Provisioning failed. Not remembered, so the next sign-in tries again.
    Failed(String),
    VaultCleared,
    /// No session attached to the event.
    Ignored,
}

#[derive(Debug, Default)]
struct HookState {
    handled: HashSet<Identity>,
    in_flight: HashSet<Identity>,
    last_seen: Option<Identity>,
}

/// Reacts to session transitions with key provisioning.
pub struct SessionLifecycleHook {
    keys: Arc<KeyStore>,
    state: Mutex<HookState>,
}

impl SessionLifecycleHook {
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            state: Mutex::new(HookState::default()),
        }
    }

    pub async fn handle(&self, event: &SessionEvent) -> HookAction {
        if event.transition == SessionTransition::SignedOut {
            return self.on_signed_out().await;
        }

        let Some(session) = &event.session else {
            debug!(
                subsystem = "session",
                transition = event.transition.as_str(),
                "Session event without a session, ignoring"
            );
            return HookAction::Ignored;
        };
        let identity = &session.identity;

        if !session.email_verified {
            info!(
                subsystem = "session",
                identity = %identity,
                "Email not verified, deferring key provisioning"
            );
            return HookAction::SkippedUnverified;
        }

        {
            let mut state = self.state.lock().await;
            let refresh_of_last = event.transition == SessionTransition::TokenRefreshed
                && state.last_seen.as_ref() == Some(identity);
            state.last_seen = Some(identity.clone());
            if refresh_of_last
                || state.handled.contains(identity)
                || state.in_flight.contains(identity)
            {
                debug!(
                    subsystem = "session",
                    identity = %identity,
                    transition = event.transition.as_str(),
                    "Identity already handled"
                );
                return HookAction::AlreadyHandled;
            }
            state.in_flight.insert(identity.clone());
        }

        let provisioned = self.provision(identity).await;
        self.state.lock().await.in_flight.remove(identity);
        match provisioned {
            Ok(outcome) => HookAction::Provisioned(outcome),
            Err(e) => {
                error!(
                    subsystem = "session",
                    identity = %identity,
                    transition = event.transition.as_str(),
                    error = %e,
                    "Key provisioning failed, will retry on next sign-in"
                );
                HookAction::Failed(e.to_string())
            }
        }
    }

    /// Provision `identity` now, outside the event flow. Errors surface.
    pub async fn retry(&self, identity: &Identity) -> Result<ProvisionOutcome> {
        self.provision(identity).await
    }

    /// Handle the provider's current session as if it had just signed in.
    ///
    /// Covers sessions restored before the subscription existed.
    pub async fn sync_with(&self, provider: &dyn IdentityProvider) -> HookAction {
        match provider.current_session().await {
            Some(session) => {
                self.handle(&SessionEvent::new(SessionTransition::SignedIn, Some(session)))
                    .await
            }
            None => HookAction::Ignored,
        }
    }

    pub async fn is_provisioned(&self, identity: &Identity) -> bool {
        self.state.lock().await.handled.contains(identity)
    }

    /// Run the hook on its own task until cancelled or the bus closes.
    pub fn spawn(self: Arc<Self>, mut subscription: SessionSubscription) -> HookHandle {
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!(subsystem = "session", "Session hook cancelled");
                        break;
                    }
                    event = subscription.next() => match event {
                        Some(event) => {
                            self.handle(&event).await;
                        }
                        None => {
                            debug!(subsystem = "session", "Session bus closed, hook stopping");
                            break;
                        }
                    }
                }
            }
        });
        HookHandle {
            cancel: cancel_tx,
            task,
        }
    }

    async fn provision(&self, identity: &Identity) -> Result<ProvisionOutcome> {
        let outcome = self.keys.ensure_key_exists(identity).await?;
        self.state.lock().await.handled.insert(identity.clone());
        info!(
            subsystem = "session",
            identity = %identity,
            outcome = outcome.as_str(),
            "Identity provisioned"
        );
        Ok(outcome)
    }

    async fn on_signed_out(&self) -> HookAction {
        let previous = self.state.lock().await.last_seen.take();
        match self.keys.vault().clear().await {
            Ok(()) => {
                info!(
                    subsystem = "session",
                    identity = previous.as_ref().map(|i| i.as_str()).unwrap_or("unknown"),
                    "Signed out, local vault cleared"
                );
                HookAction::VaultCleared
            }
            Err(e) => {
                warn!(subsystem = "session", error = %e, "Vault clear on sign-out failed");
                HookAction::Failed(e.to_string())
            }
        }
    }
}

/// Handle to a running hook task. Dropping it stops the task.
pub struct HookHandle {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl HookHandle {
    /// Stop the hook and wait for its task to finish.
    pub async fn cancel(self) {
        let _ = self.cancel.send(());
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::MemoryVault;
    use shield_core::{KeyCodec, KeySize, LocalKeyVault, RetryPolicy, Session};
    use shield_db::InMemoryKeyRepository;
    use std::time::Duration;

    fn id(s: &str) -> Identity {
        Identity::new(s).unwrap()
    }

    fn event(transition: SessionTransition, email: &str, verified: bool) -> SessionEvent {
        SessionEvent::new(
            transition,
            Some(Session {
                identity: id(email),
                email_verified: verified,
            }),
        )
    }

    fn hook() -> (SessionLifecycleHook, Arc<InMemoryKeyRepository>, Arc<MemoryVault>) {
        let repo = Arc::new(InMemoryKeyRepository::new());
        let vault = Arc::new(MemoryVault::new());
        let keys = Arc::new(KeyStore::new(
            repo.clone(),
            vault.clone(),
            KeyCodec::new(KeySize::Rsa1024),
            RetryPolicy::new(2, Duration::from_millis(1)),
            16,
        ));
        (SessionLifecycleHook::new(keys), repo, vault)
    }

    #[tokio::test]
    async fn test_sign_in_provisions_once() {
        let (hook, repo, _) = hook();
        let signed_in = event(SessionTransition::SignedIn, "a@x.com", true);

        assert_eq!(
            hook.handle(&signed_in).await,
            HookAction::Provisioned(ProvisionOutcome::Generated)
        );
        assert_eq!(hook.handle(&signed_in).await, HookAction::AlreadyHandled);
        assert!(hook.is_provisioned(&id("a@x.com")).await);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_events_provision_once() {
        let (hook, repo, vault) = hook();
        let signed_in = event(SessionTransition::SignedIn, "a@x.com", true);

        let (first, second) = tokio::join!(hook.handle(&signed_in), hook.handle(&signed_in));
        let mut actions = vec![first, second];
        actions.sort_by_key(|a| matches!(a, HookAction::Provisioned(_)));
        assert_eq!(
            actions,
            vec![
                HookAction::AlreadyHandled,
                HookAction::Provisioned(ProvisionOutcome::Generated)
            ]
        );
        assert_eq!(repo.len().await, 1);
        assert!(vault.get().await.unwrap().is_some());
        assert!(hook
            .keys
            .local_key_is_authoritative(&id("a@x.com"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_provisioning_clears_in_flight() {
        let (hook, repo, _) = hook();
        let signed_in = event(SessionTransition::SignedIn, "a@x.com", true);
        repo.failures().set_unavailable(true);
        assert!(matches!(hook.handle(&signed_in).await, HookAction::Failed(_)));

        repo.failures().set_unavailable(false);
        assert_eq!(
            hook.handle(&signed_in).await,
            HookAction::Provisioned(ProvisionOutcome::Generated)
        );
    }

    #[tokio::test]
    async fn test_token_refresh_filtered() {
        let (hook, repo, _) = hook();
        hook.handle(&event(SessionTransition::SignedIn, "a@x.com", true))
            .await;
        let calls = repo.failures().call_count();

        let refreshed = event(SessionTransition::TokenRefreshed, "a@x.com", true);
        assert_eq!(hook.handle(&refreshed).await, HookAction::AlreadyHandled);
        assert_eq!(repo.failures().call_count(), calls);
    }

    #[tokio::test]
    async fn test_unverified_skipped_then_provisioned() {
        let (hook, repo, _) = hook();
        assert_eq!(
            hook.handle(&event(SessionTransition::SignedUp, "a@x.com", false))
                .await,
            HookAction::SkippedUnverified
        );
        assert!(repo.is_empty().await);

        assert_eq!(
            hook.handle(&event(SessionTransition::SignedIn, "a@x.com", true))
                .await,
            HookAction::Provisioned(ProvisionOutcome::Generated)
        );
    }

    #[tokio::test]
    async fn test_failure_not_remembered() {
        let (hook, repo, _) = hook();
        repo.failures().set_unavailable(true);

        let action = hook
            .handle(&event(SessionTransition::SignedIn, "a@x.com", true))
            .await;
        assert!(matches!(action, HookAction::Failed(_)));
        assert!(!hook.is_provisioned(&id("a@x.com")).await);

        repo.failures().set_unavailable(false);
        assert_eq!(
            hook.retry(&id("a@x.com")).await.unwrap(),
            ProvisionOutcome::Generated
        );
        assert!(hook.is_provisioned(&id("a@x.com")).await);
    }

    #[tokio::test]
    async fn test_sign_out_clears_vault() {
        let (hook, _, vault) = hook();
        hook.handle(&event(SessionTransition::SignedIn, "a@x.com", true))
            .await;
        assert!(vault.get().await.unwrap().is_some());

        let signed_out = SessionEvent::new(SessionTransition::SignedOut, None);
        assert_eq!(hook.handle(&signed_out).await, HookAction::VaultCleared);
        assert!(vault.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_event_without_session_ignored() {
        let (hook, _, _) = hook();
        let pending = SessionEvent::new(SessionTransition::SignedUp, None);
        assert_eq!(hook.handle(&pending).await, HookAction::Ignored);
    }
}
