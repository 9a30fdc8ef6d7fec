use log::{debug, info, warn};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::error::ApiError;
use crate::api::models::{Conversation, CurrentUser, Role, UserSummary};
use crate::api::ChatApi;
use crate::sync::poller::Poller;
use crate::sync::Phase;

pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoleFilter {
    #[default]
    All,
    Brand,
    Influencer,
}

impl RoleFilter {
    pub fn matches(self, role: Option<&Role>) -> bool {
        match self {
            RoleFilter::All => true,
            RoleFilter::Brand => role == Some(&Role::Brand),
            RoleFilter::Influencer => role == Some(&Role::Influencer),
        }
    }
}

impl FromStr for RoleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(RoleFilter::All),
            "brand" => Ok(RoleFilter::Brand),
            "influencer" => Ok(RoleFilter::Influencer),
            other => Err(format!("unknown role filter '{other}' (use all, brand or influencer)")),
        }
    }
}

impl fmt::Display for RoleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoleFilter::All => "all",
            RoleFilter::Brand => "brand",
            RoleFilter::Influencer => "influencer",
        })
    }
}

/// Client-side search over an already fetched list: `query` matches the other
/// participant's name or the last message (case-insensitive), `role` must
/// match the other participant's role exactly.
pub fn filter_conversations(
    conversations: &[Conversation],
    me: &str,
    query: &str,
    role: RoleFilter,
) -> Vec<Conversation> {
    let needle = query.to_lowercase();
    conversations
        .iter()
        .filter(|c| {
            let other = c.other_participant(me);
            if !role.matches(other.map(|d| &d.role)) {
                return false;
            }
            if needle.is_empty() {
                return true;
            }
            let name_hit = other.is_some_and(|d| d.name.to_lowercase().contains(&needle));
            let text_hit = c
                .last_message
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(&needle));
            name_hit || text_hit
        })
        .cloned()
        .collect()
}

/// Users `me` may start a new conversation with: not `me`, not already a
/// participant of a held conversation, first occurrence wins.
pub fn eligible_candidates(
    users: Vec<UserSummary>,
    me: &CurrentUser,
    conversations: &[Conversation],
) -> Vec<UserSummary> {
    let mut seen = HashSet::new();
    users
        .into_iter()
        .filter(|u| u.id != me.id)
        .filter(|u| !conversations.iter().any(|c| c.includes(&u.id)))
        .filter(|u| seen.insert(u.id.clone()))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ConversationListView {
    pub phase: Phase,
    pub conversations: Arc<Vec<Conversation>>,
    pub error: Option<String>,
}

impl Default for ConversationListView {
    fn default() -> Self {
        Self {
            phase: Phase::Loading,
            conversations: Arc::new(Vec::new()),
            error: None,
        }
    }
}

struct Shared<A> {
    api: Arc<A>,
    state: watch::Sender<ConversationListView>,
}

impl<A: ChatApi> Shared<A> {
    async fn poll(&self) {
        match self.api.get_conversations().await {
            Ok(list) => {
                self.state.send_if_modified(|view| {
                    let mut changed = false;
                    if *view.conversations != list {
                        debug!("conversation list changed ({} entries)", list.len());
                        view.conversations = Arc::new(list);
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
                warn!("failed to fetch conversations: {e}");
                let text = e.to_string();
                self.state.send_if_modified(|view| {
                    let changed =
                        view.phase != Phase::Error || view.error.as_deref() != Some(text.as_str());
                    view.phase = Phase::Error;
                    view.error = Some(text);
                    changed
                });
            }
        }
    }
}

/// Keeps the signed-in user's conversation list fresh.
pub struct ConversationSync<A> {
    shared: Arc<Shared<A>>,
    me: CurrentUser,
    poller: Option<Poller>,
}

impl<A: ChatApi + 'static> ConversationSync<A> {
    pub fn new(api: Arc<A>, me: CurrentUser) -> Self {
        let (state, _) = watch::channel(ConversationListView::default());
        Self {
            shared: Arc::new(Shared { api, state }),
            me,
            poller: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ConversationListView> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> ConversationListView {
        self.shared.state.borrow().clone()
    }

    /// Shows cached conversations until the first poll answers.
    pub fn seed(&self, cached: Vec<Conversation>) {
        self.shared.state.send_if_modified(|view| {
            if view.phase == Phase::Ready || cached.is_empty() {
                return false;
            }
            view.conversations = Arc::new(cached);
            true
        });
    }

    pub fn start(&mut self, period: Duration) {
        let shared = self.shared.clone();
        self.poller = Some(Poller::spawn("conversations", period, move || {
            let shared = shared.clone();
            async move { shared.poll().await }
        }));
    }

    pub fn stop(&mut self) {
        self.poller = None;
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(Poller::is_running)
    }

    pub async fn refresh(&self) {
        self.shared.poll().await;
    }

    pub fn filtered(&self, query: &str, role: RoleFilter) -> Vec<Conversation> {
        let view = self.shared.state.borrow();
        filter_conversations(&view.conversations, &self.me.id, query, role)
    }

    /// Fetches everyone the current user could start a conversation with.
    pub async fn candidates(&self) -> Result<Vec<UserSummary>, ApiError> {
        let mut users = Vec::new();
        for role in self.me.role.counterparts() {
            users.extend(self.shared.api.list_users(role).await?);
        }
        let held = self.shared.state.borrow().conversations.clone();
        Ok(eligible_candidates(users, &self.me, &held))
    }

    /// Creates (or fetches) the conversation with `participant_id`, adds it to
    /// the front of the list if it is new, and returns its id for selection.
    pub async fn start_conversation(&self, participant_id: &str) -> Result<String, ApiError> {
        let conversation = self.shared.api.create_conversation(participant_id).await?;
        let id = conversation.id.clone();
        let inserted = self.shared.state.send_if_modified(|view| {
            if view.conversations.iter().any(|c| c.id == conversation.id) {
                return false;
            }
            let mut next = Vec::with_capacity(view.conversations.len() + 1);
            next.push(conversation);
            next.extend(view.conversations.iter().cloned());
            view.conversations = Arc::new(next);
            true
        });
        if inserted {
            info!("started conversation {id} with {participant_id}");
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::ParticipantDetail;
    use std::collections::HashMap;

    fn conv(id: &str, other: &str, name: &str, role: Role, last: Option<&str>) -> Conversation {
        let mut details = HashMap::new();
        details.insert(
            "me".to_string(),
            ParticipantDetail {
                name: "Me".into(),
                role: Role::Influencer,
            },
        );
        details.insert(
            other.to_string(),
            ParticipantDetail {
                name: name.into(),
                role,
            },
        );
        Conversation {
            id: id.into(),
            participants: vec!["me".into(), other.into()],
            participant_details: details,
            last_message: last.map(str::to_string),
            last_message_time: None,
        }
    }

    fn sample() -> Vec<Conversation> {
        vec![
            conv("c1", "b1", "Acme Shoes", Role::Brand, Some("Loved your reel")),
            conv("c2", "i1", "Jo Creates", Role::Influencer, Some("rates?")),
            conv("c3", "b2", "Zeta Labs", Role::Brand, None),
            conv("c4", "g1", "Ugo", Role::UgcCreator, Some("acme brief attached")),
        ]
    }

    fn ids(list: &[Conversation]) -> Vec<&str> {
        list.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn brand_filter_keeps_only_brand_counterparts() {
        let out = filter_conversations(&sample(), "me", "", RoleFilter::Brand);
        assert_eq!(ids(&out), vec!["c1", "c3"]);
        assert!(out
            .iter()
            .all(|c| c.other_participant("me").map(|d| &d.role) == Some(&Role::Brand)));
    }

    #[test]
    fn query_matches_name_or_last_message_case_insensitively() {
        let out = filter_conversations(&sample(), "me", "ACME", RoleFilter::All);
        assert_eq!(ids(&out), vec!["c1", "c4"]);

        let out = filter_conversations(&sample(), "me", "acme", RoleFilter::Brand);
        assert_eq!(ids(&out), vec!["c1"]);
    }

    #[test]
    fn query_spaces_are_part_of_the_needle() {
        let out = filter_conversations(&sample(), "me", " creates", RoleFilter::All);
        assert_eq!(ids(&out), vec!["c2"]);

        let out = filter_conversations(&sample(), "me", "reel ", RoleFilter::All);
        assert!(out.is_empty());
    }

    #[test]
    fn influencer_filter_does_not_include_ugc_creators() {
        let out = filter_conversations(&sample(), "me", "", RoleFilter::Influencer);
        assert_eq!(ids(&out), vec!["c2"]);
    }

    #[test]
    fn role_filter_parses_known_values() {
        assert_eq!("Brand".parse::<RoleFilter>(), Ok(RoleFilter::Brand));
        assert_eq!("".parse::<RoleFilter>(), Ok(RoleFilter::All));
        assert!("agency".parse::<RoleFilter>().is_err());
    }

    #[test]
    fn candidates_exclude_self_existing_and_duplicates() {
        let me = CurrentUser {
            id: "me".into(),
            name: "Me".into(),
            role: Role::Influencer,
        };
        let user = |id: &str| UserSummary {
            id: id.into(),
            name: id.to_uppercase(),
            role: Role::Brand,
        };
        let users = vec![user("me"), user("b1"), user("b9"), user("b9"), user("b7")];
        let out = eligible_candidates(users, &me, &sample());
        let out_ids: Vec<&str> = out.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(out_ids, vec!["b9", "b7"]);
    }
}
