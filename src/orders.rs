//! Order submission — two-phase create/confirm against the WMS, plus the
//! external file service.
//!
//! Create may return several candidate results; only candidates flagged
//! `new` are confirmed. An order id becomes visible on the context only
//! after the WMS finalizes a candidate, so a failure anywhere in the
//! protocol leaves no partially bound order behind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{IntakeError, OrderError};
use crate::ledger::ProcessingLedger;
use crate::rules::OrderDirection;

/// Substring the WMS puts in free-text errors for already-imported
/// documents. The WMS has no typed signal for this yet.
pub const DUPLICATE_MARKER: &str = "уже существует";

impl OrderError {
    /// Whether the service rejected the document as a duplicate.
    pub fn is_duplicate(&self) -> bool {
        self.to_string().contains(DUPLICATE_MARKER)
    }
}

/// Per-message order state, reset for every processed message.
#[derive(Debug, Default, Clone)]
pub struct OrderContext {
    /// Set only after the WMS confirms order creation.
    pub order_id: Option<String>,
    /// WMS depositor id recognized from data-file content.
    pub partner_wms_id: Option<String>,
    pub direction: Option<OrderDirection>,
    /// Carrier name from the transport-request manifest.
    pub carrier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depositor {
    pub id: String,
}

/// A tentative order returned by the WMS create call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResult {
    /// Whether this submission created a fresh order (as opposed to
    /// matching an existing one).
    pub new: bool,
    pub application_date: String,
    pub depositor: Depositor,
    #[serde(default)]
    pub temp_file: Option<String>,
    #[serde(default)]
    pub delivery_date: Option<String>,
    #[serde(default)]
    pub shipment_date_plan: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

/// A durable order after the confirm call.
#[derive(Debug, Clone, Deserialize)]
pub struct FinalizedOrder {
    pub id: String,
}

/// Fields submitted on the create call.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub company: Option<String>,
    /// Full order-type label for the direction.
    pub receipt: String,
    pub file_name: String,
    pub file_data: Vec<u8>,
    pub shipment_date: String,
    pub delivery_date: String,
}

/// The WMS order endpoints, consumed as an opaque capability.
#[async_trait]
pub trait OrderService: Send + Sync {
    async fn create_order(
        &self,
        direction: OrderDirection,
        request: &CreateOrderRequest,
    ) -> Result<Vec<CandidateResult>, OrderError>;

    async fn finalize_order(
        &self,
        direction: OrderDirection,
        candidate: &CandidateResult,
    ) -> Result<FinalizedOrder, OrderError>;
}

/// A stored file record returned by the external file service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileRecord {
    pub id: String,
    pub extension: String,
    #[serde(default)]
    pub temp_file: Option<String>,
}

/// The external file-storage service.
#[async_trait]
pub trait FileService: Send + Sync {
    async fn upload(
        &self,
        file_name: &str,
        data: &[u8],
        direction: OrderDirection,
        partner_id: &str,
        timestamp: i64,
        order_id: Option<&str>,
    ) -> Result<StoredFileRecord, OrderError>;

    /// Clear the temp-file marker of a provisional record and bind it to a
    /// confirmed order. Returns `false` when no provisional record exists
    /// for the token.
    async fn bind_order(&self, temp_file: &str, order_id: &str) -> Result<bool, OrderError>;
}

/// Drives the create/confirm protocol and the audit trail.
pub struct OrderSubmitter {
    orders: Arc<dyn OrderService>,
    files: Arc<dyn FileService>,
    ledger: Arc<ProcessingLedger>,
}

impl OrderSubmitter {
    pub fn new(
        orders: Arc<dyn OrderService>,
        files: Arc<dyn FileService>,
        ledger: Arc<ProcessingLedger>,
    ) -> Self {
        Self {
            orders,
            files,
            ledger,
        }
    }

    /// Submit a document and confirm every fresh candidate.
    ///
    /// `ctx.order_id` is set only after a candidate has been finalized.
    pub async fn submit(
        &self,
        ctx: &mut OrderContext,
        direction: OrderDirection,
        request: CreateOrderRequest,
    ) -> Result<(), IntakeError> {
        let candidates = self.orders.create_order(direction, &request).await?;
        debug!(count = candidates.len(), "Create returned candidates");

        for candidate in candidates {
            if !candidate.new {
                debug!("Candidate matched an existing order, ignoring");
                continue;
            }

            let mut confirm = candidate.clone();
            confirm.delivery_date = Some(candidate.application_date.clone());
            confirm.shipment_date_plan = Some(candidate.application_date.clone());
            confirm.carrier = ctx.carrier.clone();

            let finalized = self.orders.finalize_order(direction, &confirm).await?;

            self.ledger
                .log_order(
                    &finalized.id,
                    &confirm.depositor.id,
                    direction.slug(),
                    Utc::now(),
                )
                .await?;

            if let Some(token) = confirm.temp_file.as_deref()
                && !self.files.bind_order(token, &finalized.id).await?
            {
                debug!(token, "No provisional file record for temp token");
            }

            info!(order_id = %finalized.id, direction = direction.slug(), "Order confirmed");
            ctx.order_id = Some(finalized.id);
        }
        Ok(())
    }
}

// ── HTTP implementations ────────────────────────────────────────────

/// WMS order endpoints over HTTP.
pub struct WmsClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl WmsClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn endpoint(&self, direction: OrderDirection, suffix: &str) -> String {
        let kind = match direction {
            OrderDirection::Inbound => "income",
            OrderDirection::Outbound => "outcome",
        };
        format!("{}/orders/{kind}{suffix}", self.base_url)
    }
}

#[async_trait]
impl OrderService for WmsClient {
    async fn create_order(
        &self,
        direction: OrderDirection,
        request: &CreateOrderRequest,
    ) -> Result<Vec<CandidateResult>, OrderError> {
        let mut form = Form::new()
            .text("receipt", request.receipt.clone())
            .text("shipment_date", request.shipment_date.clone())
            .text("deliveryDate", request.delivery_date.clone())
            .part(
                "file",
                Part::bytes(request.file_data.clone()).file_name(request.file_name.clone()),
            );
        if let Some(company) = &request.company {
            form = form.text("company", company.clone());
        }

        let response = self
            .client
            .post(self.endpoint(direction, ""))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::Service(body));
        }
        response
            .json()
            .await
            .map_err(|e| OrderError::InvalidResponse(e.to_string()))
    }

    async fn finalize_order(
        &self,
        direction: OrderDirection,
        candidate: &CandidateResult,
    ) -> Result<FinalizedOrder, OrderError> {
        let response = self
            .client
            .post(self.endpoint(direction, "/confirm"))
            .bearer_auth(&self.token)
            .json(candidate)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::Service(body));
        }
        response
            .json()
            .await
            .map_err(|e| OrderError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct BindResponse {
    #[serde(default)]
    bound: bool,
}

/// External file service over HTTP.
pub struct FilesClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl FilesClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }
}

#[async_trait]
impl FileService for FilesClient {
    async fn upload(
        &self,
        file_name: &str,
        data: &[u8],
        direction: OrderDirection,
        partner_id: &str,
        timestamp: i64,
        order_id: Option<&str>,
    ) -> Result<StoredFileRecord, OrderError> {
        let mut form = Form::new()
            .text("direction", direction.slug())
            .text("company", partner_id.to_string())
            .text("timestamp", timestamp.to_string())
            .part(
                "file",
                Part::bytes(data.to_vec()).file_name(file_name.to_string()),
            );
        if let Some(order_id) = order_id {
            form = form.text("orderId", order_id.to_string());
        }

        let response = self
            .client
            .post(format!("{}/files", self.base_url))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::FileService(body));
        }
        response
            .json()
            .await
            .map_err(|e| OrderError::InvalidResponse(e.to_string()))
    }

    async fn bind_order(&self, temp_file: &str, order_id: &str) -> Result<bool, OrderError> {
        let response = self
            .client
            .post(format!("{}/files/bind", self.base_url))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "tempFile": temp_file,
                "orderId": order_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrderError::FileService(body));
        }
        let bind: BindResponse = response
            .json()
            .await
            .map_err(|e| OrderError::InvalidResponse(e.to_string()))?;
        Ok(bind.bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_result_uses_wms_field_names() {
        let json = r#"{
            "new": true,
            "applicationDate": "2024-05-03",
            "depositor": {"id": "7e40e90a"},
            "tempFile": "tmp-123",
            "shipmentDatePlan": null
        }"#;
        let candidate: CandidateResult = serde_json::from_str(json).unwrap();
        assert!(candidate.new);
        assert_eq!(candidate.application_date, "2024-05-03");
        assert_eq!(candidate.temp_file.as_deref(), Some("tmp-123"));

        let back = serde_json::to_value(&candidate).unwrap();
        assert_eq!(back["applicationDate"], "2024-05-03");
        assert_eq!(back["tempFile"], "tmp-123");
    }

    #[test]
    fn duplicate_detection_keys_on_marker() {
        let err = OrderError::Service("Заявка №в-123 уже существует".to_string());
        assert!(err.is_duplicate());

        let other = OrderError::Service("внутренняя ошибка сервера".to_string());
        assert!(!other.is_duplicate());
    }

    #[test]
    fn wms_endpoints_per_direction() {
        let client = WmsClient::new("http://wms.local/api/", "t");
        assert_eq!(
            client.endpoint(OrderDirection::Inbound, ""),
            "http://wms.local/api/orders/income"
        );
        assert_eq!(
            client.endpoint(OrderDirection::Outbound, "/confirm"),
            "http://wms.local/api/orders/outcome/confirm"
        );
    }
}
