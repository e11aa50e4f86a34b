// HTTP document store.
//
//   GET  {base}/documents/{id}   → document
//   POST {base}/documents        → document (created)
//   PUT  {base}/documents/{id}   → document (full field overwrite)
//
// An empty title travels as `null`.

use chrono::{DateTime, Utc};
use draftkeep_common::types::{Attachment, Category, Document, DocumentId, DraftFields};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{DocumentStore, StoreError};
use crate::config::RemoteConfig;

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpStore {
    pub fn new(base_url: Url, client: Client) -> Self {
        Self { client, base_url: with_trailing_slash(base_url), auth_token: None }
    }

    /// Build a store from the `[remote]` config section.
    pub fn from_config(config: &RemoteConfig) -> Result<Self, StoreError> {
        let raw = config
            .base_url
            .as_deref()
            .ok_or_else(|| StoreError::Transport("no remote base_url configured".into()))?;
        let base_url = Url::parse(raw)
            .map_err(|error| StoreError::Transport(format!("invalid base_url `{raw}`: {error}")))?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;
        Ok(Self::new(base_url, client))
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|error| StoreError::Transport(format!("invalid endpoint `{path}`: {error}")))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        id: Option<DocumentId>,
    ) -> Result<Document, StoreError> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let response = check_status(response, id).await?;
        let payload: DocumentPayload =
            response.json().await.map_err(|error| StoreError::Decode(error.to_string()))?;
        Ok(payload.into())
    }
}

impl DocumentStore for HttpStore {
    async fn fetch_document(&self, id: DocumentId) -> Result<Document, StoreError> {
        let url = self.endpoint(&format!("documents/{id}"))?;
        self.send(self.client.get(url), Some(id)).await
    }

    async fn create_document(&self, fields: &DraftFields) -> Result<Document, StoreError> {
        let url = self.endpoint("documents")?;
        self.send(self.client.post(url).json(&FieldsBody::from(fields)), None).await
    }

    async fn update_document(
        &self,
        id: DocumentId,
        fields: &DraftFields,
    ) -> Result<Document, StoreError> {
        let url = self.endpoint(&format!("documents/{id}"))?;
        self.send(self.client.put(url).json(&FieldsBody::from(fields)), Some(id)).await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn transport_error(error: reqwest::Error) -> StoreError {
    if error.is_decode() {
        StoreError::Decode(error.to_string())
    } else {
        StoreError::Transport(error.to_string())
    }
}

async fn check_status(response: Response, id: Option<DocumentId>) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    let message = message.trim().to_string();
    Err(match (status, id) {
        (StatusCode::NOT_FOUND, Some(id)) => StoreError::NotFound(id),
        (StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY, _) => {
            StoreError::Rejected(message)
        }
        _ => StoreError::Status { code: status.as_u16(), message },
    })
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct FieldsBody<'a> {
    title: Option<&'a str>,
    body: &'a str,
    tags: &'a [String],
    category: Option<Category>,
    attachments: &'a [Attachment],
}

impl<'a> From<&'a DraftFields> for FieldsBody<'a> {
    fn from(fields: &'a DraftFields) -> Self {
        Self {
            title: Some(fields.title.as_str()).filter(|title| !title.is_empty()),
            body: &fields.body,
            tags: &fields.tags,
            category: fields.category,
            attachments: &fields.attachments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocumentPayload {
    id: DocumentId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default)]
    attachments: Vec<Attachment>,
    updated_at: DateTime<Utc>,
}

impl From<DocumentPayload> for Document {
    fn from(payload: DocumentPayload) -> Self {
        Self {
            id: payload.id,
            fields: DraftFields {
                title: payload.title.unwrap_or_default(),
                body: payload.body,
                tags: payload.tags,
                category: payload.category,
                attachments: payload.attachments,
            },
            updated_at: payload.updated_at,
        }
    }
}
