use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

use crate::api::error::ApiError;
use crate::api::models::{
    Conversation, ConversationResponse, ConversationsResponse, MessagePage, Role, SendReceipt,
    UserSummary, UsersResponse,
};
use crate::api::session::Session;
use crate::api::ChatApi;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 50;

pub struct ApiClient {
    http: HttpClient,
    api_base: Url,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Session, timeout: Duration) -> Result<Self, ApiError> {
        let api_base = Url::parse(&Self::base_api(base_url))
            .map_err(|e| ApiError::InvalidUrl(format!("{base_url}: {e}")))?;
        if api_base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(base_url.to_string()));
        }
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_base,
            session,
        })
    }

    fn base_api(base_url: &str) -> String {
        let trimmed = base_url.trim_end_matches('/');
        if trimmed.ends_with("/api") {
            trimmed.to_string()
        } else {
            format!("{}/api", trimmed)
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn chat_endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut all = Vec::with_capacity(segments.len() + 1);
        all.push("chat");
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    fn with_auth(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.session.token().ok_or(ApiError::MissingToken)?;
        Ok(req.bearer_auth(token))
    }

    /// Sends `req` and decodes a successful body, normalizing every failure into `ApiError`.
    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = self.with_auth(req)?.send().await.map_err(|e| {
            warn!("request failed before a response: {e}");
            ApiError::Network(e.to_string())
        })?;
        let status = resp.status();
        debug!("{} {}", status.as_u16(), resp.url().path());
        if status == StatusCode::UNAUTHORIZED {
            self.session.expire();
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let raw = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response(status, &raw));
        }
        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn create_conversation(&self, participant_id: &str) -> Result<Conversation, ApiError> {
        let url = self.chat_endpoint(&["conversations"])?;
        let body = serde_json::json!({ "participantId": participant_id });
        let resp: ConversationResponse = self.execute(self.http.post(url).json(&body)).await?;
        Ok(resp.conversation)
    }

    async fn get_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        let url = self.chat_endpoint(&["conversations"])?;
        let resp: ConversationsResponse = self.execute(self.http.get(url)).await?;
        Ok(resp.conversations)
    }

    async fn get_conversation(&self, conversation_id: &str) -> Result<Conversation, ApiError> {
        let url = self.chat_endpoint(&["conversations", conversation_id])?;
        let resp: ConversationResponse = self.execute(self.http.get(url)).await?;
        Ok(resp.conversation)
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<MessagePage, ApiError> {
        let url = self.chat_endpoint(&["conversations", conversation_id, "messages"])?;
        let req = self
            .http
            .get(url)
            .query(&[("page", page), ("limit", limit)]);
        self.execute(req).await
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<SendReceipt, ApiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ApiError::EmptyMessage);
        }
        let url = self.chat_endpoint(&["conversations", conversation_id, "messages"])?;
        let body = serde_json::json!({ "message": text });
        self.execute(self.http.post(url).json(&body)).await
    }

    async fn list_users(&self, role: &Role) -> Result<Vec<UserSummary>, ApiError> {
        let url = self.endpoint(&["users"])?;
        let req = self.http.get(url).query(&[("role", role.as_str())]);
        let resp: UsersResponse = self.execute(req).await?;
        Ok(resp.into_users())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ApiClient {
        ApiClient::new(base, Session::new(Some("t".into())), Duration::from_secs(1)).unwrap()
    }

    #[test]
    fn base_api_is_appended_once() {
        assert_eq!(ApiClient::base_api("https://x.io/"), "https://x.io/api");
        assert_eq!(ApiClient::base_api("https://x.io/api/"), "https://x.io/api");
    }

    #[test]
    fn chat_endpoints_escape_ids() {
        let c = client("https://x.io");
        let url = c.chat_endpoint(&["conversations", "a/b", "messages"]).unwrap();
        assert_eq!(url.as_str(), "https://x.io/api/chat/conversations/a%2Fb/messages");
    }

    #[test]
    fn rejects_unparseable_base() {
        let err = ApiClient::new("not a url", Session::new(None), Duration::from_secs(1));
        assert!(matches!(err, Err(ApiError::InvalidUrl(_))));
    }
}
