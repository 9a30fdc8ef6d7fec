pub mod client;
pub mod error;
pub mod models;
pub mod session;

use async_trait::async_trait;

use crate::api::error::ApiError;
use crate::api::models::{Conversation, MessagePage, Role, SendReceipt, UserSummary};

pub use client::{ApiClient, DEFAULT_LIMIT, DEFAULT_PAGE};
pub use session::Session;

/// Conversation/message operations the synchronizers depend on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Returns the conversation between the caller and `participant_id`,
    /// creating it on first contact.
    async fn create_conversation(&self, participant_id: &str) -> Result<Conversation, ApiError>;

    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, ApiError>;

    async fn get_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError>;

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<SendReceipt, ApiError>;

    /// User directory filtered by role, for starting new conversations.
    async fn list_users(&self, role: &Role) -> Result<Vec<UserSummary>, ApiError>;
}
