//! HTTP client for the external CRM audit history API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use registra_application::AuditSource;
use registra_core::{AppError, AppResult};
use registra_domain::{AuditAction, AuditAttributeChange, AuditDetail, AuditDetailCollection};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// CRM audit API client implementing the audit source port.
#[derive(Clone)]
pub struct HttpAuditSource {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAuditSource {
    /// Creates an audit client for the CRM API at the given base URL.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| {
                AppError::Internal(format!("failed to build audit HTTP client: {error}"))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
        })
    }
}

#[async_trait]
impl AuditSource for HttpAuditSource {
    async fn get_audit_detail(
        &self,
        entity_logical_name: &str,
        primary_id_attribute: &str,
        id: Uuid,
    ) -> AppResult<AuditDetailCollection> {
        let endpoint = format!(
            "{}/api/data/v1/audit/{entity_logical_name}/{id}",
            self.base_url
        );
        let mut http_request = self
            .http_client
            .get(endpoint)
            .query(&[("primaryIdAttribute", primary_id_attribute)]);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.header("x-api-key", api_key);
        }

        let response = http_request.send().await.map_err(|error| {
            AppError::AuditFetchFailed(format!("failed to call audit endpoint: {error}"))
        })?;

        // The CRM reports "no audit history" as 404; that is an empty
        // collection, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(AuditDetailCollection::empty());
        }
        if !response.status().is_success() {
            return Err(AppError::AuditFetchFailed(format!(
                "audit endpoint returned status {}",
                response.status().as_u16()
            )));
        }

        let body = response.json::<AuditHistory>().await.map_err(|error| {
            AppError::AuditFetchFailed(format!("failed to parse audit endpoint response: {error}"))
        })?;

        let mut details = Vec::with_capacity(body.details.len());
        for detail in body.details {
            details.push(detail.try_into_detail()?);
        }

        Ok(AuditDetailCollection::new(details))
    }
}

#[derive(Debug, Deserialize)]
struct AuditHistory {
    details: Vec<WireAuditDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAuditDetail {
    audit_id: Uuid,
    action: String,
    user_id: Option<Uuid>,
    recorded_on: DateTime<Utc>,
    #[serde(default)]
    changed_attributes: Vec<WireAttributeChange>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAttributeChange {
    attribute: String,
    old_value: Option<Value>,
    new_value: Option<Value>,
}

impl WireAuditDetail {
    fn try_into_detail(self) -> AppResult<AuditDetail> {
        let action = match self.action.as_str() {
            "create" => AuditAction::Create,
            "update" => AuditAction::Update,
            "delete" => AuditAction::Delete,
            other => {
                return Err(AppError::AuditFetchFailed(format!(
                    "audit record {} carries unrecognized action '{other}'",
                    self.audit_id
                )));
            }
        };

        Ok(AuditDetail {
            audit_id: self.audit_id,
            action,
            user_id: self.user_id,
            recorded_on: self.recorded_on,
            changed_attributes: self
                .changed_attributes
                .into_iter()
                .map(|change| AuditAttributeChange {
                    attribute: change.attribute,
                    old_value: change.old_value,
                    new_value: change.new_value,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use registra_domain::AuditAction;
    use serde_json::json;
    use uuid::Uuid;

    use super::AuditHistory;

    #[test]
    fn audit_history_parses_and_converts() {
        let raw = json!({
            "details": [
                {
                    "auditId": Uuid::new_v4(),
                    "action": "update",
                    "userId": Uuid::new_v4(),
                    "recordedOn": "2026-01-05T12:00:00Z",
                    "changedAttributes": [
                        { "attribute": "lastname", "oldValue": "Byron", "newValue": "Lovelace" }
                    ]
                },
                {
                    "auditId": Uuid::new_v4(),
                    "action": "create",
                    "userId": null,
                    "recordedOn": "2026-01-01T09:00:00Z"
                }
            ]
        });

        let history = match serde_json::from_value::<AuditHistory>(raw) {
            Ok(history) => history,
            Err(error) => panic!("audit fixture should parse: {error}"),
        };
        assert_eq!(history.details.len(), 2);

        let detail = match history.details.into_iter().next() {
            Some(detail) => detail,
            None => panic!("fixture should have details"),
        };
        let converted = match detail.try_into_detail() {
            Ok(converted) => converted,
            Err(error) => panic!("detail should convert: {error}"),
        };
        assert_eq!(converted.action, AuditAction::Update);
        assert_eq!(converted.changed_attributes.len(), 1);
        assert_eq!(converted.changed_attributes[0].attribute, "lastname");
    }

    #[test]
    fn unrecognized_actions_fail_the_fetch() {
        let raw = json!({
            "details": [
                {
                    "auditId": Uuid::new_v4(),
                    "action": "merge",
                    "userId": null,
                    "recordedOn": "2026-01-01T09:00:00Z"
                }
            ]
        });

        let history = match serde_json::from_value::<AuditHistory>(raw) {
            Ok(history) => history,
            Err(error) => panic!("audit fixture should parse: {error}"),
        };
        let detail = match history.details.into_iter().next() {
            Some(detail) => detail,
            None => panic!("fixture should have details"),
        };
        assert!(detail.try_into_detail().is_err());
    }
}
