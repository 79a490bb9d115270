use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::{ProjectId, UserId};
use crate::domain::contract::ContractItemId;
use crate::domain::requisition::{ItemType, LineItemId, RequisitionId, RequisitionStatus};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub item_type: ItemType,
    #[serde(default)]
    pub contract_item_id: Option<ContractItemId>,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub specification: Option<String>,
    #[serde(default, alias = "brand")]
    pub brand_model: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl NewLineItem {
    pub fn main(contract_item_id: i64, quantity: Decimal) -> Self {
        Self {
            item_type: ItemType::Main,
            contract_item_id: Some(ContractItemId(contract_item_id)),
            item_name: String::new(),
            specification: None,
            brand_model: None,
            unit: None,
            quantity,
            remarks: None,
        }
    }

    pub fn auxiliary(item_name: impl Into<String>, unit: impl Into<String>, quantity: Decimal) -> Self {
        Self {
            item_type: ItemType::Auxiliary,
            contract_item_id: None,
            item_name: item_name.into(),
            specification: None,
            brand_model: None,
            unit: Some(unit.into()),
            quantity,
            remarks: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub project_id: ProjectId,
    #[serde(default)]
    pub required_date: Option<NaiveDate>,
    #[serde(default)]
    pub remarks: Option<String>,
    pub items: Vec<NewLineItem>,
}

/// Supplier quote for one line item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuote {
    pub item_id: LineItemId,
    pub unit_price: Decimal,
    #[serde(default)]
    pub supplier_name: Option<String>,
    #[serde(default)]
    pub supplier_contact_person: Option<String>,
    #[serde(default)]
    pub supplier_contact: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotePayload {
    pub items: Vec<ItemQuote>,
    #[serde(default)]
    pub quote_notes: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStage {
    Dept,
    Final,
}

impl ApprovalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dept => "dept",
            Self::Final => "final",
        }
    }
}

impl fmt::Display for ApprovalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

/// Body shared by the return, dept-approve and final-approve endpoints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPayload {
    pub approval_status: Decision,
    #[serde(default)]
    pub approval_notes: Option<String>,
}

impl ApprovalPayload {
    pub fn approve(notes: Option<String>) -> Self {
        Self { approval_status: Decision::Approved, approval_notes: notes }
    }

    pub fn reject(notes: impl Into<String>) -> Self {
        Self { approval_status: Decision::Rejected, approval_notes: Some(notes.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequisitionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub page: u32,
    pub size: u32,
}

impl ListQuery {
    pub const DEFAULT_SIZE: u32 = 10;
    pub const MAX_SIZE: u32 = 100;
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            project_id: None,
            status: None,
            requester_id: None,
            search: None,
            page: 1,
            size: Self::DEFAULT_SIZE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, page: u32, size: u32) -> Self {
        let pages = if size == 0 { 0 } else { total.div_ceil(u64::from(size)) as u32 };
        Self { items, total, page, size, pages }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteFailure {
    pub id: RequisitionId,
    #[serde(default)]
    pub request_code: Option<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDeleteReport {
    pub deleted_count: usize,
    pub total_requested: usize,
    #[serde(default, alias = "failed_requests")]
    pub failed: Vec<BatchDeleteFailure>,
}
