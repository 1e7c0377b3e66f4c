//! REST 后端
//!
//! 通过 PostgREST 风格的 HTTP 接口实现持久写入、全量读取和资料批量查询，
//! 通知通过边缘函数发送。

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::config::{BackendConfig, NotificationConfig};
use crate::error::{AppError, Result};
use crate::models::annotation::{Annotation, NewAnnotation};
use crate::models::identity::Identity;
use crate::models::notification::Notification;
use crate::storage::repository::{AnnotationRepository, IdentityRepository, Notifier};

/// Columns readable without elevated privilege; `text` is withheld.
const PUBLIC_NOTE_COLUMNS: &str = "id,user_id,x,y,z,created_at";

/// PostgREST error body
#[derive(Debug, Default, Deserialize)]
struct RestErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Map a non-success response onto the error taxonomy.
fn map_error(status: StatusCode, body: &str) -> AppError {
    let parsed: RestErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.to_string());
    let detail = format!("{} ({})", message, status.as_u16());

    let code = parsed.code.as_deref();

    if code == Some("23505") || status == StatusCode::CONFLICT {
        AppError::Conflict(detail)
    } else if code == Some("42501")
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        AppError::Authorization(detail)
    } else if status == StatusCode::NOT_FOUND {
        AppError::NotFound(detail)
    } else if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::BAD_GATEWAY
        || status == StatusCode::SERVICE_UNAVAILABLE
        || status == StatusCode::GATEWAY_TIMEOUT
    {
        AppError::Connection(detail)
    } else {
        AppError::Database(detail)
    }
}

/// PostgREST `in` filter value, e.g. `in.("a","b")`
fn in_filter(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

pub struct RestBackend {
    client: reqwest::Client,
    config: BackendConfig,
    function_path: String,
    access_token: RwLock<Option<String>>,
}

impl RestBackend {
    pub fn new(config: BackendConfig, notification: &NotificationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout.max(1)))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            function_path: notification.function_path.clone(),
            access_token: RwLock::new(None),
        })
    }

    /// Use a signed-in user's token instead of the anon key
    pub fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write() = token;
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url(), table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .access_token
            .read()
            .clone()
            .unwrap_or_else(|| self.config.anon_key.clone());
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_error(status, &body))
    }
}

#[async_trait]
impl AnnotationRepository for RestBackend {
    async fn insert(&self, note: &NewAnnotation) -> Result<Annotation> {
        let url = self.table_url(&self.config.notes_table);
        debug!("POST {}", url);

        let response = self
            .authorized(self.client.post(&url))
            .query(&[("select", "*")])
            .header("Prefer", "return=representation")
            .header("Accept", "application/vnd.pgrst.object+json")
            .json(note)
            .send()
            .await?;

        let created: Annotation = Self::check(response).await?.json().await?;
        Ok(created)
    }

    async fn fetch_all(&self) -> Result<Vec<Annotation>> {
        let url = self.table_url(&self.config.notes_table);
        let columns = if self.config.privileged {
            "*"
        } else {
            PUBLIC_NOTE_COLUMNS
        };
        debug!("GET {} select={}", url, columns);

        let response = self
            .authorized(self.client.get(&url))
            .query(&[("select", columns), ("order", "created_at.desc")])
            .send()
            .await?;

        let notes: Vec<Annotation> = Self::check(response).await?.json().await?;
        Ok(notes)
    }
}

#[async_trait]
impl IdentityRepository for RestBackend {
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Identity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}?select=*&id={}",
            self.table_url(&self.config.profiles_table),
            urlencoding::encode(&in_filter(ids))
        );
        debug!("GET {}", url);

        let response = self.authorized(self.client.get(&url)).send().await?;
        let identities: Vec<Identity> = Self::check(response).await?.json().await?;
        Ok(identities)
    }
}

#[async_trait]
impl Notifier for RestBackend {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let url = format!("{}{}", self.base_url(), self.function_path);
        debug!("POST {} to={}", url, notification.to);

        let response = self
            .authorized(self.client.post(&url))
            .json(notification)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}
