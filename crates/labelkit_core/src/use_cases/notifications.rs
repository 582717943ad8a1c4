use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::config::NotificationSettings;
use crate::entities::{
    Notification, NotificationDraft, NotificationKey, SessionSnapshot, TokenAccount,
};
use crate::error::Error;
use crate::ports::NotificationStore;
use crate::use_cases::alerts::derive_alerts;

/// What `add_notification` did with a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Created(Uuid),
    /// Message and timestamp of the live notification with the same key were
    /// replaced
    Updated(Uuid),
    /// The key was dismissed earlier
    Suppressed,
}

#[derive(Debug, Default)]
struct NotificationState {
    /// Most recent first
    notifications: Vec<Notification>,
    suppressed: BTreeSet<NotificationKey>,
}

impl NotificationState {
    fn apply(&mut self, draft: NotificationDraft, now: DateTime<Utc>) -> AddOutcome {
        let key = draft.key();

        if self.suppressed.contains(&key) {
            return AddOutcome::Suppressed;
        }

        if let Some(existing) = self.notifications.iter_mut().find(|n| n.key() == key) {
            existing.message = draft.message;
            existing.timestamp = now;
            return AddOutcome::Updated(existing.id);
        }

        let notification = draft.into_notification(now);
        let id = notification.id;
        self.notifications.insert(0, notification);
        AddOutcome::Created(id)
    }
}

/// Deduplicating notification list with suppression memory.
///
/// At most one live notification exists per `(title, category)`. Removing a
/// notification suppresses its key until `clear_suppressed` is called.
pub struct NotificationCenter<N>
where
    N: NotificationStore,
{
    store: Arc<N>,
    settings: NotificationSettings,
    state: Mutex<NotificationState>,
    published: watch::Sender<Vec<Notification>>,
}

impl<N> NotificationCenter<N>
where
    N: NotificationStore,
{
    pub fn new(store: Arc<N>, settings: NotificationSettings) -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            store,
            settings,
            state: Mutex::new(NotificationState::default()),
            published,
        }
    }

    /// Reload the persisted list and suppressed keys. Unreadable data is
    /// logged and replaced by an empty collection.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        let notifications = self.store.load_notifications().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to load notifications");
            Vec::new()
        });
        let suppressed = self.store.load_suppressed().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to load suppressed notification keys");
            BTreeSet::new()
        });

        debug!(
            notifications = notifications.len(),
            suppressed = suppressed.len(),
            "notifications loaded"
        );

        let mut state = self.state.lock().await;
        state.notifications = notifications;
        state.suppressed = suppressed;
        self.published.send_replace(state.notifications.clone());
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.published.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.published.subscribe()
    }

    pub fn unread_count(&self) -> usize {
        self.published.borrow().iter().filter(|n| !n.read).count()
    }

    pub async fn suppressed(&self) -> BTreeSet<NotificationKey> {
        self.state.lock().await.suppressed.clone()
    }

    pub async fn add_notification(&self, draft: NotificationDraft) -> AddOutcome {
        let mut state = self.state.lock().await;
        let outcome = state.apply(draft, Utc::now());

        if outcome != AddOutcome::Suppressed {
            self.persist_notifications(&state).await;
            self.published.send_replace(state.notifications.clone());
        }
        outcome
    }

    /// Run the derivation rules against the latest snapshots.
    #[instrument(skip_all)]
    pub async fn evaluate(
        &self,
        session: &SessionSnapshot,
        account: Option<&TokenAccount>,
    ) -> Vec<AddOutcome> {
        let now = Utc::now();
        let drafts = derive_alerts(session, account, now, &self.settings);
        if drafts.is_empty() {
            return Vec::new();
        }

        let mut state = self.state.lock().await;
        let outcomes: Vec<AddOutcome> = drafts
            .into_iter()
            .map(|draft| state.apply(draft, now))
            .collect();

        if outcomes.iter().any(|o| *o != AddOutcome::Suppressed) {
            self.persist_notifications(&state).await;
            self.published.send_replace(state.notifications.clone());
        }
        outcomes
    }

    /// Returns false when no notification has this id
    pub async fn mark_as_read(&self, id: Uuid) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        let Some(notification) = state.notifications.iter_mut().find(|n| n.id == id) else {
            return Ok(false);
        };
        notification.read = true;

        let saved = self.store.save_notifications(&state.notifications).await;
        self.published.send_replace(state.notifications.clone());
        saved.map(|()| true)
    }

    /// Returns how many notifications changed
    pub async fn mark_all_as_read(&self) -> Result<usize, Error> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for notification in state.notifications.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }

        if changed > 0 {
            let saved = self.store.save_notifications(&state.notifications).await;
            self.published.send_replace(state.notifications.clone());
            saved?;
        }
        Ok(changed)
    }

    /// Remove a notification and suppress its key
    pub async fn remove_notification(&self, id: Uuid) -> Result<bool, Error> {
        let mut state = self.state.lock().await;
        let Some(index) = state.notifications.iter().position(|n| n.id == id) else {
            return Ok(false);
        };

        let removed = state.notifications.remove(index);
        debug!(key = %removed.key(), "notification dismissed");
        state.suppressed.insert(removed.key());

        let saved = self.persist_all(&state).await;
        self.published.send_replace(state.notifications.clone());
        saved.map(|()| true)
    }

    /// Remove every live notification, suppressing each key
    pub async fn clear_all(&self) -> Result<usize, Error> {
        let mut state = self.state.lock().await;
        let removed: Vec<Notification> = state.notifications.drain(..).collect();
        state.suppressed.extend(removed.iter().map(Notification::key));

        let saved = self.persist_all(&state).await;
        self.published.send_replace(Vec::new());
        saved.map(|()| removed.len())
    }

    /// Forget every dismissed key so derived alerts may reappear
    pub async fn clear_suppressed(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.suppressed.clear();
        self.store.save_suppressed(&state.suppressed).await
    }

    /// Writes both files even if the first write fails. The in-memory state
    /// stays authoritative either way; the first error is returned.
    async fn persist_all(&self, state: &NotificationState) -> Result<(), Error> {
        let notifications = self.store.save_notifications(&state.notifications).await;
        let suppressed = self.store.save_suppressed(&state.suppressed).await;
        notifications.and(suppressed)
    }

    async fn persist_notifications(&self, state: &NotificationState) {
        if let Err(e) = self.store.save_notifications(&state.notifications).await {
            warn!(error = %e, "failed to persist notifications");
        }
    }
}
