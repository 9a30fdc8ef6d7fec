use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Marketplace account role as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Brand,
    Influencer,
    UgcCreator,
    Other(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Brand => "brand",
            Role::Influencer => "influencer",
            Role::UgcCreator => "ugc_creator",
            Role::Other(s) => s,
        }
    }

    /// Roles this role may open a conversation with.
    pub fn counterparts(&self) -> &'static [Role] {
        const CREATORS: &[Role] = &[Role::Influencer, Role::UgcCreator];
        const BRANDS: &[Role] = &[Role::Brand];
        match self {
            Role::Brand => CREATORS,
            _ => BRANDS,
        }
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "brand" => Role::Brand,
            "influencer" => Role::Influencer,
            "ugc_creator" | "ugccreator" | "ugc-creator" | "ugc" => Role::UgcCreator,
            _ => Role::Other(s),
        }
    }
}

impl From<Role> for String {
    fn from(r: Role) -> Self {
        r.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantDetail {
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub participant_details: HashMap<String, ParticipantDetail>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<DateTime<Utc>>,
}

impl Conversation {
    pub fn other_participant_id(&self, me: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != me)
    }

    /// Display record of whoever in this conversation is not `me`.
    pub fn other_participant(&self, me: &str) -> Option<&ParticipantDetail> {
        self.other_participant_id(me)
            .and_then(|id| self.participant_details.get(id))
    }

    pub fn includes(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Server-persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(alias = "_id")]
    pub id: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub is_filtered: bool,
    #[serde(default)]
    pub read: bool,
}

const LOCAL_ID_PREFIX: &str = "temp-";
const LOCAL_ID_SUFFIX_LEN: usize = 9;

/// Client-side id of a message the server has not acknowledged yet.
/// Always `temp-` prefixed so it never collides with a server id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalId(String);

impl LocalId {
    pub fn generate() -> Self {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..LOCAL_ID_SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(format!(
            "{}{}-{}",
            LOCAL_ID_PREFIX,
            Utc::now().timestamp_millis(),
            suffix
        ))
    }

    pub fn is_local(id: &str) -> bool {
        id.starts_with(LOCAL_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub temp_id: LocalId,
    pub sender_id: String,
    pub sender_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingMessage {
    pub fn new(sender: &CurrentUser, text: impl Into<String>) -> Self {
        Self {
            temp_id: LocalId::generate(),
            sender_id: sender.id.clone(),
            sender_name: sender.name.clone(),
            message: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One row of a message thread: either confirmed by the server or still in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadEntry {
    Confirmed(Message),
    Pending(PendingMessage),
}

impl ThreadEntry {
    pub fn id(&self) -> &str {
        match self {
            ThreadEntry::Confirmed(m) => &m.id,
            ThreadEntry::Pending(p) => p.temp_id.as_str(),
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, ThreadEntry::Pending(_))
    }

    pub fn sender_id(&self) -> &str {
        match self {
            ThreadEntry::Confirmed(m) => &m.sender_id,
            ThreadEntry::Pending(p) => &p.sender_id,
        }
    }

    pub fn sender_name(&self) -> &str {
        match self {
            ThreadEntry::Confirmed(m) => &m.sender_name,
            ThreadEntry::Pending(p) => &p.sender_name,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ThreadEntry::Confirmed(m) => &m.message,
            ThreadEntry::Pending(p) => &p.message,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ThreadEntry::Confirmed(m) => m.timestamp,
            ThreadEntry::Pending(p) => p.timestamp,
        }
    }
}

/// The signed-in account, taken from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub role: Role,
}

/// Entry of the user directory offered by the "new conversation" flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationsResponse {
    #[serde(default)]
    pub conversations: Vec<Conversation>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationResponse {
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<Message>,
    pub conversation: Conversation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message: Message,
    #[serde(default)]
    pub is_filtered: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum UsersResponse {
    Wrapped { users: Vec<UserSummary> },
    Bare(Vec<UserSummary>),
}

impl UsersResponse {
    pub fn into_users(self) -> Vec<UserSummary> {
        match self {
            UsersResponse::Wrapped { users } => users,
            UsersResponse::Bare(users) => users,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_prefixed_and_distinct() {
        let a = LocalId::generate();
        let b = LocalId::generate();
        assert!(LocalId::is_local(a.as_str()));
        assert!(!LocalId::is_local("65f1c0ffee"));
        assert_ne!(a, b);
    }

    #[test]
    fn conversation_accepts_mongo_style_payload() {
        let json = serde_json::json!({
            "_id": "c1",
            "participants": ["u1", "u2"],
            "participantDetails": {
                "u1": { "name": "Acme", "role": "brand" },
                "u2": { "name": "Jo", "role": "ugc_creator" }
            },
            "lastMessage": "hi",
            "lastMessageTime": "2024-05-01T10:00:00Z"
        });
        let conv: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(conv.id, "c1");
        let other = conv.other_participant("u1").unwrap();
        assert_eq!(other.name, "Jo");
        assert_eq!(other.role, Role::UgcCreator);
        assert_eq!(conv.other_participant_id("u2"), Some("u1"));
    }

    #[test]
    fn unknown_roles_survive_round_trip() {
        let role: Role = serde_json::from_str("\"agency\"").unwrap();
        assert_eq!(role, Role::Other("agency".into()));
        assert_eq!(serde_json::to_string(&role).unwrap(), "\"agency\"");
    }

    #[test]
    fn brands_reach_creators_and_creators_reach_brands() {
        assert_eq!(Role::Brand.counterparts(), &[Role::Influencer, Role::UgcCreator]);
        assert_eq!(Role::UgcCreator.counterparts(), &[Role::Brand]);
        assert_eq!(Role::Influencer.counterparts(), &[Role::Brand]);
    }

    #[test]
    fn users_response_accepts_wrapped_and_bare() {
        let wrapped: UsersResponse = serde_json::from_str(
            r#"{"users":[{"_id":"u9","name":"Zed","role":"brand"}]}"#,
        )
        .unwrap();
        let bare: UsersResponse =
            serde_json::from_str(r#"[{"id":"u9","name":"Zed","role":"brand"}]"#).unwrap();
        assert_eq!(wrapped.into_users(), bare.into_users());
    }
}
