#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use marketplace_chat::api::error::ApiError;
use marketplace_chat::api::models::{
    Conversation, CurrentUser, Message, MessagePage, ParticipantDetail, Role, SendReceipt,
    UserSummary,
};
use marketplace_chat::api::ChatApi;

pub fn brand() -> CurrentUser {
    CurrentUser {
        id: "me".into(),
        name: "Acme".into(),
        role: Role::Brand,
    }
}

pub fn conversation(id: &str, other: &str, other_name: &str, other_role: Role) -> Conversation {
    let mut details = HashMap::new();
    details.insert(
        "me".to_string(),
        ParticipantDetail {
            name: "Acme".into(),
            role: Role::Brand,
        },
    );
    details.insert(
        other.to_string(),
        ParticipantDetail {
            name: other_name.into(),
            role: other_role,
        },
    );
    Conversation {
        id: id.into(),
        participants: vec!["me".into(), other.into()],
        participant_details: details,
        last_message: None,
        last_message_time: None,
    }
}

pub fn server_message(id: &str, sender: &str, text: &str) -> Message {
    Message {
        id: id.into(),
        sender_id: sender.into(),
        sender_name: sender.to_uppercase(),
        message: text.into(),
        timestamp: Utc::now(),
        is_filtered: false,
        read: false,
    }
}

/// In-memory stand-in for the chat server.
pub struct FakeApi {
    pub conversations: Mutex<Vec<Conversation>>,
    pub messages: Mutex<HashMap<String, Vec<Message>>>,
    pub users: Mutex<Vec<UserSummary>>,
    pub fail_fetches: AtomicBool,
    pub fail_sends: AtomicBool,
    pub filter_sends: AtomicBool,
    pub send_gate: Semaphore,
    pub message_fetches: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(Vec::new()),
            messages: Mutex::new(HashMap::new()),
            users: Mutex::new(Vec::new()),
            fail_fetches: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            filter_sends: AtomicBool::new(false),
            send_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            message_fetches: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Sends block until `send_gate.add_permits` is called.
    pub fn holding_sends() -> Self {
        Self {
            send_gate: Semaphore::new(0),
            ..Self::new()
        }
    }

    pub fn with_conversation(self, conv: Conversation, messages: Vec<Message>) -> Self {
        self.messages.lock().unwrap().insert(conv.id.clone(), messages);
        self.conversations.lock().unwrap().push(conv);
        self
    }

    pub fn push_server_message(&self, conversation_id: &str, msg: Message) {
        self.messages
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default()
            .push(msg);
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn create_conversation(&self, participant_id: &str) -> Result<Conversation, ApiError> {
        let mut convs = self.conversations.lock().unwrap();
        if let Some(existing) = convs.iter().find(|c| c.includes("me") && c.includes(participant_id)) {
            return Ok(existing.clone());
        }
        let name = self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == participant_id)
            .map(|u| u.name.clone())
            .unwrap_or_else(|| participant_id.to_string());
        let created = conversation(&self.next("srv-c"), participant_id, &name, Role::Influencer);
        convs.insert(0, created.clone());
        Ok(created)
    }

    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".into()));
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, ApiError> {
        self.conversations
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == conversation_id)
            .cloned()
            .ok_or_else(|| ApiError::from_response(StatusCode::NOT_FOUND, r#"{"error":"Conversation not found"}"#))
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        self.message_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(ApiError::Network("connection refused".into()));
        }
        let all = self
            .messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        let skip = ((page.max(1) - 1) * limit) as usize;
        let messages = all.into_iter().skip(skip).take(limit as usize).collect();
        let conversation = self.get_conversation(conversation_id).await?;
        Ok(MessagePage {
            messages,
            conversation,
        })
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<SendReceipt, ApiError> {
        self.send_gate
            .acquire()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?
            .forget();
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ApiError::from_response(
                StatusCode::FORBIDDEN,
                r#"{"error":"You are not part of this conversation"}"#,
            ));
        }
        let filtered = self.filter_sends.load(Ordering::SeqCst);
        let mut msg = server_message(&self.next("srv-m"), "me", text);
        msg.sender_name = "Acme".into();
        if filtered {
            msg.message = "Call me at [phone removed]".into();
            msg.is_filtered = true;
        }
        self.push_server_message(conversation_id, msg.clone());
        Ok(SendReceipt {
            message: msg,
            is_filtered: filtered,
        })
    }

    async fn list_users(&self, role: &Role) -> Result<Vec<UserSummary>, ApiError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| &u.role == role)
            .cloned()
            .collect())
    }
}

pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, mut pred: F)
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|v| pred(v)))
        .await
        .expect("condition not reached in time")
        .expect("sender dropped");
}
