//! Typed access to the requisition REST endpoints.
//!
//! `RequisitionApi` is the seam the workbench drives. `ApiClient` speaks HTTP to a
//! remote backend; the in-process implementation lives in `local`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use reqflow_core::config::AppConfig;
use reqflow_core::domain::actor::ProjectId;
use reqflow_core::domain::contract::ContractItemId;
use reqflow_core::domain::payload::{
    ApprovalPayload, ApprovalStage, BatchDeleteReport, ListQuery, NewRequisition, Page,
    QuotePayload,
};
use reqflow_core::domain::requisition::{Requisition, RequisitionId};
use reqflow_core::errors::ApplicationError;
use reqflow_core::reservation::Availability;
use reqflow_core::validation::{ValidationErrors, ValidationIssue};
use reqflow_core::workflow::WorkflowLogEntry;

pub const QUANTITY_CONFLICT: &str = "quantity no longer available";

#[async_trait]
pub trait RequisitionApi: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ApplicationError>;
    async fn get(&self, id: RequisitionId) -> Result<Requisition, ApplicationError>;
    async fn create(&self, new: &NewRequisition) -> Result<Requisition, ApplicationError>;
    /// Replaces a draft's header and line items.
    async fn update(
        &self,
        id: RequisitionId,
        new: &NewRequisition,
    ) -> Result<Requisition, ApplicationError>;
    async fn submit(&self, id: RequisitionId) -> Result<Requisition, ApplicationError>;
    async fn quote(
        &self,
        id: RequisitionId,
        payload: &QuotePayload,
    ) -> Result<Requisition, ApplicationError>;
    /// The reason travels as `approval_notes` of a rejected decision, which is the body
    /// the return endpoint accepts.
    async fn return_requisition(
        &self,
        id: RequisitionId,
        reason: &str,
    ) -> Result<Requisition, ApplicationError>;
    async fn decide(
        &self,
        id: RequisitionId,
        stage: ApprovalStage,
        payload: &ApprovalPayload,
    ) -> Result<Requisition, ApplicationError>;
    async fn delete(&self, id: RequisitionId) -> Result<(), ApplicationError>;
    async fn batch_delete(
        &self,
        ids: &[RequisitionId],
    ) -> Result<BatchDeleteReport, ApplicationError>;
    async fn history(&self, id: RequisitionId) -> Result<Vec<WorkflowLogEntry>, ApplicationError>;
    async fn specifications(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<Vec<Availability>, ApplicationError>;
    async fn contract_item(&self, id: ContractItemId) -> Result<Availability, ApplicationError>;
    async fn health(&self) -> Result<(), ApplicationError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    health_url: String,
    token: Option<SecretString>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("health_url", &self.health_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, ApplicationError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let base_url = config.api.base_url.trim().trim_end_matches('/').to_string();
        let health_url = format!("{}{}", origin(&base_url), config.connectivity.health_path);

        Ok(Self { http, base_url, health_url, token: config.api.token.clone() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        target: &Target,
    ) -> Result<T, ApplicationError> {
        let body = self.execute_raw(builder, target).await?;
        serde_json::from_str(&body).map_err(|error| {
            warn!(
                event_name = "api.response_malformed",
                entity = target.entity,
                id = %target.id,
                error = %error,
                "response body did not match the expected shape"
            );
            ApplicationError::Remote {
                status: StatusCode::OK.as_u16(),
                message: format!("malformed {} response: {error}", target.entity),
            }
        })
    }

    async fn execute_raw(
        &self,
        builder: RequestBuilder,
        target: &Target,
    ) -> Result<String, ApplicationError> {
        let started = Instant::now();
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let url = response.url().path().to_string();
        let body = response.text().await.map_err(transport_error)?;

        debug!(
            event_name = "api.call",
            path = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "api call finished"
        );

        if status.is_success() {
            return Ok(body);
        }

        let error = map_status(status, &body, target);
        warn!(
            event_name = "api.call_failed",
            path = %url,
            status = status.as_u16(),
            kind = error.kind().as_str(),
            error = %error,
            "api call failed"
        );
        Err(error)
    }
}

#[async_trait]
impl RequisitionApi for ApiClient {
    async fn list(&self, query: &ListQuery) -> Result<Page<Requisition>, ApplicationError> {
        let builder = self.request(Method::GET, "/purchases/").query(query);
        self.execute(builder, &Target::new("requisition list", "")).await
    }

    async fn get(&self, id: RequisitionId) -> Result<Requisition, ApplicationError> {
        let builder = self.request(Method::GET, &format!("/purchases/{id}"));
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn create(&self, new: &NewRequisition) -> Result<Requisition, ApplicationError> {
        let builder = self.request(Method::POST, "/purchases/").json(new);
        self.execute(builder, &Target::new("requisition", "new")).await
    }

    async fn update(
        &self,
        id: RequisitionId,
        new: &NewRequisition,
    ) -> Result<Requisition, ApplicationError> {
        let builder = self.request(Method::PUT, &format!("/purchases/{id}")).json(new);
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn submit(&self, id: RequisitionId) -> Result<Requisition, ApplicationError> {
        let builder =
            self.request(Method::POST, &format!("/purchases/{id}/submit")).json(&json!({}));
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn quote(
        &self,
        id: RequisitionId,
        payload: &QuotePayload,
    ) -> Result<Requisition, ApplicationError> {
        let builder = self.request(Method::POST, &format!("/purchases/{id}/quote")).json(payload);
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn return_requisition(
        &self,
        id: RequisitionId,
        reason: &str,
    ) -> Result<Requisition, ApplicationError> {
        let body = ApprovalPayload::reject(reason);
        let builder = self.request(Method::POST, &format!("/purchases/{id}/return")).json(&body);
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn decide(
        &self,
        id: RequisitionId,
        stage: ApprovalStage,
        payload: &ApprovalPayload,
    ) -> Result<Requisition, ApplicationError> {
        let path = match stage {
            ApprovalStage::Dept => format!("/purchases/{id}/dept-approve"),
            ApprovalStage::Final => format!("/purchases/{id}/final-approve"),
        };
        let builder = self.request(Method::POST, &path).json(payload);
        self.execute(builder, &Target::requisition(id)).await
    }

    async fn delete(&self, id: RequisitionId) -> Result<(), ApplicationError> {
        let builder = self.request(Method::DELETE, &format!("/purchases/{id}"));
        self.execute_raw(builder, &Target::requisition(id)).await.map(|_| ())
    }

    async fn batch_delete(
        &self,
        ids: &[RequisitionId],
    ) -> Result<BatchDeleteReport, ApplicationError> {
        let builder = self.request(Method::POST, "/purchases/batch-delete").json(ids);
        self.execute(builder, &Target::new("requisition batch", ids.len())).await
    }

    async fn history(&self, id: RequisitionId) -> Result<Vec<WorkflowLogEntry>, ApplicationError> {
        let builder = self.request(Method::GET, &format!("/purchases/{id}/workflow-logs"));
        let envelope: WorkflowLogsEnvelope = self.execute(builder, &Target::requisition(id)).await?;
        Ok(envelope
            .logs
            .into_iter()
            .map(|mut entry| {
                entry.requisition_id = envelope.request_id.unwrap_or(id);
                entry
            })
            .collect())
    }

    async fn specifications(
        &self,
        project_id: ProjectId,
        item_name: &str,
    ) -> Result<Vec<Availability>, ApplicationError> {
        let builder = self
            .request(Method::GET, "/purchases/specifications/by-material")
            .query(&[("project_id", project_id.0.to_string()), ("item_name", item_name.to_string())]);
        let envelope: SpecificationsEnvelope =
            self.execute(builder, &Target::new("material", item_name)).await?;
        let name = envelope.item_name.unwrap_or_else(|| item_name.to_string());
        Ok(envelope
            .specifications
            .into_iter()
            .map(|mut option| {
                if option.item_name.is_empty() {
                    option.item_name = name.clone();
                }
                option
            })
            .collect())
    }

    async fn contract_item(&self, id: ContractItemId) -> Result<Availability, ApplicationError> {
        let builder =
            self.request(Method::GET, &format!("/purchases/contract-items/{id}/details"));
        let details: ContractItemDetails =
            self.execute(builder, &Target::new("contract item", id)).await?;
        Ok(details.into_availability())
    }

    async fn health(&self) -> Result<(), ApplicationError> {
        let builder = self.http.get(&self.health_url);
        self.execute_raw(builder, &Target::new("health endpoint", "")).await.map(|_| ())
    }
}

#[derive(Clone, Debug)]
struct Target {
    entity: &'static str,
    id: String,
}

impl Target {
    fn new(entity: &'static str, id: impl ToString) -> Self {
        Self { entity, id: id.to_string() }
    }

    fn requisition(id: RequisitionId) -> Self {
        Self::new("requisition", id)
    }
}

#[derive(Debug, Deserialize)]
struct WorkflowLogsEnvelope {
    #[serde(default)]
    request_id: Option<RequisitionId>,
    #[serde(default)]
    logs: Vec<WorkflowLogEntry>,
}

#[derive(Debug, Deserialize)]
struct SpecificationsEnvelope {
    #[serde(default)]
    item_name: Option<String>,
    #[serde(default)]
    specifications: Vec<Availability>,
}

#[derive(Debug, Deserialize)]
struct ContractItemDetails {
    item: ContractItemBody,
    purchased_quantity: rust_decimal::Decimal,
    remaining_quantity: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize)]
struct ContractItemBody {
    id: ContractItemId,
    #[serde(default)]
    item_name: String,
    #[serde(default)]
    specification: Option<String>,
    #[serde(default)]
    brand_model: Option<String>,
    #[serde(default)]
    unit: Option<String>,
    #[serde(alias = "total_quantity")]
    quantity: rust_decimal::Decimal,
    #[serde(default)]
    unit_price: Option<rust_decimal::Decimal>,
}

impl ContractItemDetails {
    fn into_availability(self) -> Availability {
        Availability {
            contract_item_id: self.item.id,
            item_name: self.item.item_name,
            specification: self.item.specification,
            brand_model: self.item.brand_model,
            unit: self.item.unit,
            unit_price: self.item.unit_price,
            total_quantity: self.item.quantity,
            committed_quantity: self.purchased_quantity,
            remaining_quantity: self.remaining_quantity.max(rust_decimal::Decimal::ZERO),
        }
    }
}

/// Scheme and authority of a base url, e.g. `http://host:8000` for `http://host:8000/api/v1`.
fn origin(base_url: &str) -> &str {
    let authority_start = base_url.find("://").map(|index| index + 3).unwrap_or(0);
    match base_url[authority_start..].find('/') {
        Some(offset) => &base_url[..authority_start + offset],
        None => base_url,
    }
}

fn transport_error(error: reqwest::Error) -> ApplicationError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("could not connect: {error}")
    } else {
        error.to_string()
    };
    ApplicationError::Connectivity(message)
}

fn map_status(status: StatusCode, body: &str, target: &Target) -> ApplicationError {
    let detail = ErrorBody::parse(body);
    let message = detail.message.clone().unwrap_or_else(|| {
        status.canonical_reason().unwrap_or("request failed").to_string()
    });

    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            let issues = if detail.issues.is_empty() {
                ValidationErrors::single("request", message)
            } else {
                detail.issues
            };
            ApplicationError::from(issues)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApplicationError::Forbidden(message),
        StatusCode::NOT_FOUND => ApplicationError::not_found(target.entity, &target.id),
        StatusCode::CONFLICT => {
            let lowered = message.to_lowercase();
            if lowered.contains("quantity") || lowered.contains("remaining") {
                ApplicationError::Conflict(format!("{QUANTITY_CONFLICT}: {message}"))
            } else {
                ApplicationError::Conflict(message)
            }
        }
        _ => ApplicationError::Remote { status: status.as_u16(), message },
    }
}

#[derive(Debug, Default)]
struct ErrorBody {
    message: Option<String>,
    issues: ValidationErrors,
}

impl ErrorBody {
    /// Understands `{"detail": "..."}`, framework-style `{"detail": [{"loc": [..], "msg": ..}]}`
    /// and `{"issues": [{"field": .., "message": ..}]}` bodies.
    fn parse(body: &str) -> Self {
        let Ok(value) = serde_json::from_str::<Value>(body) else {
            let trimmed = body.trim();
            return Self {
                message: (!trimmed.is_empty()).then(|| trimmed.to_string()),
                ..Self::default()
            };
        };

        let mut parsed = Self::default();
        match value.get("detail") {
            Some(Value::String(detail)) => parsed.message = Some(detail.clone()),
            Some(Value::Array(entries)) => {
                for entry in entries {
                    let field = entry
                        .get("loc")
                        .and_then(Value::as_array)
                        .map(|parts| {
                            parts
                                .iter()
                                .filter(|part| part.as_str() != Some("body"))
                                .map(|part| match part {
                                    Value::String(text) => text.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join(".")
                        })
                        .unwrap_or_else(|| "request".to_string());
                    let message =
                        entry.get("msg").and_then(Value::as_str).unwrap_or("invalid value");
                    parsed.issues.push(field, message);
                }
            }
            _ => {}
        }

        if let Some(issues) = value.get("issues").cloned() {
            if let Ok(issues) = serde_json::from_value::<Vec<ValidationIssue>>(issues) {
                parsed.issues.issues.extend(issues);
            }
        }
        if parsed.message.is_none() && !parsed.issues.is_empty() {
            parsed.message = Some(parsed.issues.to_string());
        }
        parsed
    }
}
