//! Message thread synchronizer: polls one conversation, sends with optimistic
//! placeholders, and merges both into a single published [`ThreadView`].

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

use crate::api::error::ApiError;
use crate::api::models::{CurrentUser, LocalId, Message, PendingMessage, ThreadEntry};
use crate::api::{ChatApi, DEFAULT_LIMIT, DEFAULT_PAGE};
use crate::sync::poller::Poller;
use crate::sync::Phase;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(5);
pub const DEFAULT_NOTICE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ThreadView {
    pub conversation_id: Option<String>,
    pub phase: Phase,
    pub entries: Arc<Vec<ThreadEntry>>,
    pub draft: String,
    pub error: Option<String>,
    /// Set while the "your message was filtered" notice should be visible.
    pub filtered_notice: bool,
    notice_seq: u64,
}

impl Default for ThreadView {
    fn default() -> Self {
        Self {
            conversation_id: None,
            phase: Phase::Idle,
            entries: Arc::new(Vec::new()),
            draft: String::new(),
            error: None,
            filtered_notice: false,
            notice_seq: 0,
        }
    }
}

impl ThreadView {
    fn loading(conversation_id: String) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            phase: Phase::Loading,
            ..Self::default()
        }
    }

    fn is_for(&self, conversation_id: &str) -> bool {
        self.conversation_id.as_deref() == Some(conversation_id)
    }

    pub fn pending_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_optimistic()).count()
    }
}

/// Merges a server snapshot with the entries still awaiting confirmation.
///
/// Returns `None` when the confirmed part of `current` already equals
/// `snapshot`, so callers can keep the existing list untouched. Otherwise the
/// result is the snapshot followed by the pending entries in their original
/// order.
pub fn reconcile(current: &[ThreadEntry], snapshot: &[Message]) -> Option<Vec<ThreadEntry>> {
    let (pending, confirmed): (Vec<&ThreadEntry>, Vec<&ThreadEntry>) =
        current.iter().partition(|e| e.is_optimistic());

    let unchanged = confirmed.len() == snapshot.len()
        && confirmed
            .iter()
            .zip(snapshot)
            .all(|(entry, msg)| matches!(entry, ThreadEntry::Confirmed(c) if c == msg));
    if unchanged {
        return None;
    }

    Some(
        snapshot
            .iter()
            .cloned()
            .map(ThreadEntry::Confirmed)
            .chain(pending.into_iter().cloned())
            .collect(),
    )
}

/// Replaces the placeholder `temp_id` with the server record in place. If a
/// poll already delivered that record, the placeholder is just dropped.
pub fn confirm_pending(entries: &[ThreadEntry], temp_id: &LocalId, confirmed: Message) -> Vec<ThreadEntry> {
    let already_known = entries
        .iter()
        .any(|e| matches!(e, ThreadEntry::Confirmed(m) if m.id == confirmed.id));
    let mut confirmed = Some(confirmed);
    entries
        .iter()
        .filter_map(|e| match e {
            ThreadEntry::Pending(p) if &p.temp_id == temp_id => {
                if already_known {
                    None
                } else {
                    confirmed.take().map(ThreadEntry::Confirmed)
                }
            }
            other => Some(other.clone()),
        })
        .collect()
}

pub fn discard_pending(entries: &[ThreadEntry], temp_id: &LocalId) -> Vec<ThreadEntry> {
    entries
        .iter()
        .filter(|e| !matches!(e, ThreadEntry::Pending(p) if &p.temp_id == temp_id))
        .cloned()
        .collect()
}

fn has_pending(entries: &[ThreadEntry], temp_id: &LocalId) -> bool {
    entries
        .iter()
        .any(|e| matches!(e, ThreadEntry::Pending(p) if &p.temp_id == temp_id))
}

struct Shared<A> {
    api: Arc<A>,
    me: CurrentUser,
    state: Arc<watch::Sender<ThreadView>>,
    notice_period: Duration,
}

impl<A: ChatApi> Shared<A> {
    async fn poll(&self, conversation_id: &str) {
        let result = self
            .api
            .get_messages(conversation_id, DEFAULT_PAGE, DEFAULT_LIMIT)
            .await;
        match result {
            Ok(page) => {
                self.state.send_if_modified(|view| {
                    if !view.is_for(conversation_id) {
                        return false;
                    }
                    let mut changed = false;
                    if let Some(next) = reconcile(&view.entries, &page.messages) {
                        debug!(
                            "conversation {conversation_id}: {} server messages, {} pending",
                            page.messages.len(),
                            view.pending_count()
                        );
                        view.entries = Arc::new(next);
                        changed = true;
                    }
                    if view.phase != Phase::Ready {
                        view.phase = Phase::Ready;
                        changed = true;
                    }
                    if view.error.take().is_some() {
                        changed = true;
                    }
                    changed
                });
            }
            Err(e) => {
                warn!("failed to fetch messages for {conversation_id}: {e}");
                let text = e.to_string();
                self.state.send_if_modified(|view| {
                    if !view.is_for(conversation_id) {
                        return false;
                    }
                    let changed = view.phase != Phase::Ready || view.error.as_deref() != Some(text.as_str());
                    view.phase = Phase::Ready;
                    view.error = Some(text);
                    changed
                });
            }
        }
    }
}

/// Keeps the open conversation's [`ThreadView`] in step with the server.
pub struct MessageSync<A> {
    shared: Arc<Shared<A>>,
    poll_period: Duration,
    poller: Mutex<Option<Poller>>,
}

impl<A: ChatApi + 'static> MessageSync<A> {
    pub fn new(api: Arc<A>, me: CurrentUser) -> Self {
        let (state, _) = watch::channel(ThreadView::default());
        Self {
            shared: Arc::new(Shared {
                api,
                me,
                state: Arc::new(state),
                notice_period: DEFAULT_NOTICE_PERIOD,
            }),
            poll_period: DEFAULT_POLL_PERIOD,
            poller: Mutex::new(None),
        }
    }

    pub fn poll_every(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn filtered_notice_for(mut self, period: Duration) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.notice_period = period;
        }
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ThreadView> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> ThreadView {
        self.shared.state.borrow().clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.shared.state.borrow().conversation_id.clone()
    }

    /// Switches to `conversation_id`: resets the thread, fetches right away and
    /// then on every poll period. Reopening the active conversation is a no-op.
    pub fn open(&self, conversation_id: impl Into<String>) {
        let conversation_id = conversation_id.into();
        let mut poller = self.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() && self.conversation_id().as_deref() == Some(conversation_id.as_str()) {
            return;
        }
        *poller = None;
        info!("opening conversation {conversation_id}");
        self.shared
            .state
            .send_replace(ThreadView::loading(conversation_id.clone()));

        let shared = self.shared.clone();
        *poller = Some(Poller::spawn("messages", self.poll_period, move || {
            let shared = shared.clone();
            let conversation_id = conversation_id.clone();
            async move { shared.poll(&conversation_id).await }
        }));
    }

    pub fn close(&self) {
        *self.poller.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.shared.state.send_replace(ThreadView::default());
    }

    /// Fetches the open conversation once, outside the timer.
    pub async fn refresh(&self) {
        if let Some(id) = self.conversation_id() {
            self.shared.poll(&id).await;
        }
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        let text = text.into();
        self.shared.state.send_if_modified(|view| {
            if view.draft == text {
                return false;
            }
            view.draft = text;
            true
        });
    }

    /// Sends whatever is currently in the draft.
    pub async fn submit(&self) -> Result<Option<Message>, ApiError> {
        let draft = self.shared.state.borrow().draft.clone();
        self.send(&draft).await
    }

    /// Shows `text` immediately as a pending entry, then swaps in the server's
    /// record or rolls back (restoring `text` as the draft) if the send fails.
    ///
    /// Returns `Ok(None)` without touching anything when the text is blank or
    /// no conversation is open.
    pub async fn send(&self, text: &str) -> Result<Option<Message>, ApiError> {
        let body = text.trim();
        if body.is_empty() {
            return Ok(None);
        }
        let Some(conversation_id) = self.conversation_id() else {
            return Ok(None);
        };

        let pending = PendingMessage::new(&self.shared.me, body);
        let temp_id = pending.temp_id.clone();
        self.shared.state.send_modify(|view| {
            let mut next = view.entries.as_ref().clone();
            next.push(ThreadEntry::Pending(pending));
            view.entries = Arc::new(next);
            view.draft.clear();
            view.error = None;
        });
        debug!("queued {temp_id} in {conversation_id}");

        match self.shared.api.send_message(&conversation_id, body).await {
            Ok(receipt) => {
                let confirmed = receipt.message.clone();
                let mut notice_seq = None;
                self.shared.state.send_if_modified(|view| {
                    if !view.is_for(&conversation_id) || !has_pending(&view.entries, &temp_id) {
                        return false;
                    }
                    view.entries = Arc::new(confirm_pending(&view.entries, &temp_id, confirmed));
                    if receipt.is_filtered {
                        view.notice_seq += 1;
                        view.filtered_notice = true;
                        notice_seq = Some(view.notice_seq);
                    }
                    true
                });
                if let Some(seq) = notice_seq {
                    info!("message {} was filtered by the server", receipt.message.id);
                    self.clear_notice_later(seq);
                }
                Ok(Some(receipt.message))
            }
            Err(e) => {
                warn!("send to {conversation_id} failed: {e}");
                let restored = text.to_string();
                let error = e.to_string();
                self.shared.state.send_if_modified(|view| {
                    if !view.is_for(&conversation_id) || !has_pending(&view.entries, &temp_id) {
                        return false;
                    }
                    view.entries = Arc::new(discard_pending(&view.entries, &temp_id));
                    view.draft = restored;
                    view.error = Some(error);
                    true
                });
                Err(e)
            }
        }
    }

    fn clear_notice_later(&self, seq: u64) {
        let state = self.shared.state.clone();
        let period = self.shared.notice_period;
        tokio::spawn(async move {
            tokio::time::sleep(period).await;
            state.send_if_modified(|view| {
                if view.notice_seq != seq || !view.filtered_notice {
                    return false;
                }
                view.filtered_notice = false;
                true
            });
        });
    }
}
