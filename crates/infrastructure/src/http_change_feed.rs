//! HTTP client for the external CRM changes feed.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use registra_application::{ChangeFeed, ChangeFeedRequest, ChangeFeedStream};
use registra_core::{AppError, AppResult};
use registra_domain::{ChangeBatch, ChangedItem, EntityRef, EntitySnapshot, roll_up_changes};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Paged CRM changes client implementing the change feed port.
///
/// Each stream pulls pages on demand; nothing polls in the background, and
/// the whole feed is never materialized at once.
#[derive(Clone)]
pub struct HttpChangeFeed {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpChangeFeed {
    /// Creates a feed client for the CRM API at the given base URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build change feed HTTP client: {error}"))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

#[async_trait]
impl ChangeFeed for HttpChangeFeed {
    async fn open(&self, request: ChangeFeedRequest) -> AppResult<Box<dyn ChangeFeedStream>> {
        let next_token = request.resume_token.clone();
        Ok(Box::new(HttpChangeFeedStream {
            http_client: self.http_client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            request,
            next_token,
            drained: false,
        }))
    }
}

struct HttpChangeFeedStream {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request: ChangeFeedRequest,
    next_token: Option<String>,
    drained: bool,
}

#[async_trait]
impl ChangeFeedStream for HttpChangeFeedStream {
    async fn next_batch(&mut self) -> AppResult<Option<ChangeBatch>> {
        if self.drained {
            return Ok(None);
        }

        let endpoint = format!(
            "{}/api/data/v1/changes/{}",
            self.base_url, self.request.entity_logical_name
        );
        let mut http_request = self
            .http_client
            .get(endpoint)
            .query(&[("changesKey", self.request.changes_key.as_str())])
            .query(&[("pageSize", self.request.page_size.to_string().as_str())])
            .query(&[("columns", self.request.columns.join(",").as_str())]);
        if let Some(token) = &self.next_token {
            http_request = http_request.query(&[("token", token.as_str())]);
        }
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("x-api-key", api_key);
        }

        let response = http_request.send().await.map_err(|error| {
            AppError::FeedUnavailable(format!("failed to call changes endpoint: {error}"))
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::FeedUnavailable(format!(
                "changes endpoint returned status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Internal(format!(
                "changes endpoint returned status {}: {body}",
                status.as_u16()
            )));
        }

        let page = response.json::<ChangesPage>().await.map_err(|error| {
            AppError::Internal(format!("failed to parse changes endpoint response: {error}"))
        })?;

        let items = convert_page_items(
            page.items,
            self.request.modified_since,
            self.request.roll_up_changes,
        );
        debug!(
            entity_logical_name = self.request.entity_logical_name.as_str(),
            item_count = items.len(),
            has_more = page.has_more,
            "fetched change feed page"
        );

        if !page.has_more {
            self.drained = true;
        }
        self.next_token = Some(page.next_token.clone());

        Ok(Some(ChangeBatch {
            items,
            resume_token: page.next_token,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangesPage {
    items: Vec<WireChangedItem>,
    next_token: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(
    tag = "changeType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
enum WireChangedItem {
    NewOrUpdated {
        entity: WireEntitySnapshot,
    },
    RemovedOrDeleted {
        entity_logical_name: String,
        id: Uuid,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntitySnapshot {
    entity_logical_name: String,
    id: Uuid,
    attributes: BTreeMap<String, Value>,
    modified_on: DateTime<Utc>,
}

/// Applies the modified-since filter and the batch rollup policy.
fn convert_page_items(
    items: Vec<WireChangedItem>,
    modified_since: Option<DateTime<Utc>>,
    roll_up: bool,
) -> Vec<ChangedItem> {
    let converted: Vec<ChangedItem> = items
        .into_iter()
        .filter_map(|item| match item {
            WireChangedItem::NewOrUpdated { entity } => {
                if let Some(cutoff) = modified_since {
                    if entity.modified_on < cutoff {
                        return None;
                    }
                }
                Some(ChangedItem::NewOrUpdated(EntitySnapshot {
                    entity_logical_name: entity.entity_logical_name,
                    id: entity.id,
                    attributes: entity.attributes,
                    modified_on: entity.modified_on,
                }))
            }
            WireChangedItem::RemovedOrDeleted {
                entity_logical_name,
                id,
            } => Some(ChangedItem::RemovedOrDeleted(EntityRef {
                entity_logical_name,
                id,
            })),
        })
        .collect();

    if roll_up {
        roll_up_changes(converted)
    } else {
        converted
    }
}
