use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::client::ClientError;
use crate::error::ErrorBody;
use crate::models::{Conversation, ConversationSummary, Message, MessagePage};
use crate::routes::conversations::{SeenResponse, UnreadTotal};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin REST client. Every request carries the session's bearer token and a
/// fixed timeout; a timed-out send surfaces [`ClientError::Timeout`] and is
/// never retried automatically.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub async fn conversations(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Vec<ConversationSummary>, ClientError> {
        let url = format!(
            "{}/api/v1/conversations?page={page}&limit={limit}",
            self.base_url
        );
        self.execute(self.http.get(url)).await
    }

    pub async fn conversation(&self, id: Uuid) -> Result<Conversation, ClientError> {
        let url = format!("{}/api/v1/conversations/{id}", self.base_url);
        self.execute(self.http.get(url)).await
    }

    pub async fn create_direct(&self, participant_id: Uuid) -> Result<Conversation, ClientError> {
        let url = format!("{}/api/v1/conversations", self.base_url);
        self.execute(
            self.http
                .post(url)
                .json(&json!({ "participant_id": participant_id })),
        )
        .await
    }

    pub async fn create_group(
        &self,
        name: &str,
        participant_ids: &[Uuid],
        image_url: Option<&str>,
    ) -> Result<Conversation, ClientError> {
        let url = format!("{}/api/v1/conversations/group", self.base_url);
        self.execute(self.http.post(url).json(&json!({
            "name": name,
            "participant_ids": participant_ids,
            "image_url": image_url,
        })))
        .await
    }

    pub async fn messages(
        &self,
        conversation_id: Uuid,
        cursor: Option<Uuid>,
        limit: i64,
    ) -> Result<MessagePage, ClientError> {
        let mut url = format!(
            "{}/api/v1/conversations/{conversation_id}/messages?limit={limit}",
            self.base_url
        );
        if let Some(cursor) = cursor {
            url.push_str(&format!("&cursor={cursor}"));
        }
        self.execute(self.http.get(url)).await
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<Message, ClientError> {
        let url = format!(
            "{}/api/v1/conversations/{conversation_id}/messages",
            self.base_url
        );
        self.execute(self.http.post(url).json(&json!({
            "content": content,
            "image_url": image_url,
        })))
        .await
    }

    pub async fn mark_seen(&self, conversation_id: Uuid) -> Result<SeenResponse, ClientError> {
        let url = format!(
            "{}/api/v1/conversations/{conversation_id}/seen",
            self.base_url
        );
        self.execute(self.http.put(url)).await
    }

    pub async fn unread_total(&self) -> Result<UnreadTotal, ClientError> {
        let url = format!("{}/api/v1/conversations/unread/count", self.base_url);
        self.execute(self.http.get(url)).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| ClientError::Transport(e.to_string()))
        } else {
            Err(map_api_error(status, response).await)
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::Connection(e.to_string())
    } else {
        ClientError::Transport(e.to_string())
    }
}

async fn map_api_error(status: StatusCode, response: reqwest::Response) -> ClientError {
    match response.json::<ErrorBody>().await {
        Ok(body) => ClientError::Api {
            status: status.as_u16(),
            kind: body.error,
            message: body.message,
        },
        Err(_) => ClientError::Api {
            status: status.as_u16(),
            kind: "unknown".into(),
            message: format!("http status {status}"),
        },
    }
}
