use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::actor::{ProjectId, Role, UserId};
use crate::domain::contract::ContractItemId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequisitionId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineItemId(pub i64);

impl fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LineItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    PriceQuoted,
    DeptApproved,
    FinalApproved,
    Rejected,
    Cancelled,
    Completed,
}

impl RequisitionStatus {
    pub const ALL: [RequisitionStatus; 8] = [
        Self::Draft,
        Self::Submitted,
        Self::PriceQuoted,
        Self::DeptApproved,
        Self::FinalApproved,
        Self::Rejected,
        Self::Cancelled,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::PriceQuoted => "price_quoted",
            Self::DeptApproved => "dept_approved",
            Self::FinalApproved => "final_approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalApproved | Self::Rejected | Self::Cancelled | Self::Completed)
    }

    /// Rejected and cancelled requisitions release their reserved contract quantity.
    pub fn reserves_quantity(&self) -> bool {
        !matches!(self, Self::Rejected | Self::Cancelled)
    }

    pub fn is_pending_approval(&self) -> bool {
        matches!(self, Self::Submitted | Self::PriceQuoted)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::FinalApproved | Self::Completed)
    }
}

impl fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown requisition status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for RequisitionStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or(UnknownStatus(normalized))
    }
}

/// The station whose action is currently required.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    ProjectManager,
    Purchaser,
    DeptManager,
    GeneralManager,
    Completed,
}

impl WorkflowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectManager => "project_manager",
            Self::Purchaser => "purchaser",
            Self::DeptManager => "dept_manager",
            Self::GeneralManager => "general_manager",
            Self::Completed => "completed",
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            Self::ProjectManager => Some(Role::ProjectManager),
            Self::Purchaser => Some(Role::Purchaser),
            Self::DeptManager => Some(Role::DeptManager),
            Self::GeneralManager => Some(Role::GeneralManager),
            Self::Completed => None,
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Main,
    Auxiliary,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Auxiliary => "auxiliary",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionLineItem {
    pub id: LineItemId,
    pub request_id: RequisitionId,
    #[serde(default)]
    pub contract_item_id: Option<ContractItemId>,
    pub item_type: ItemType,
    pub item_name: String,
    #[serde(default)]
    pub specification: Option<String>,
    #[serde(default, alias = "brand")]
    pub brand_model: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
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
    #[serde(default)]
    pub received_quantity: Decimal,
    #[serde(default)]
    pub remarks: Option<String>,
}

impl RequisitionLineItem {
    pub fn is_main(&self) -> bool {
        self.item_type == ItemType::Main
    }
}

/// Requisition header plus its owned line items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub request_code: String,
    pub project_id: ProjectId,
    pub requester_id: UserId,
    pub status: RequisitionStatus,
    #[serde(default)]
    pub current_step: Option<WorkflowStep>,
    #[serde(default)]
    pub total_amount: Option<Decimal>,
    pub request_date: NaiveDate,
    #[serde(default)]
    pub required_date: Option<NaiveDate>,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub approval_notes: Option<String>,
    #[serde(default)]
    pub items: Vec<RequisitionLineItem>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Requisition {
    /// Sum of priced line totals, or `None` while nothing has been priced.
    pub fn computed_total(&self) -> Option<Decimal> {
        let priced: Vec<Decimal> = self.items.iter().filter_map(|item| item.total_price).collect();
        if priced.is_empty() {
            None
        } else {
            Some(priced.into_iter().sum())
        }
    }

    pub fn recompute_total(&mut self) {
        self.total_amount = self.computed_total();
    }

    pub fn amount_for(&self, item_type: ItemType) -> Decimal {
        self.items
            .iter()
            .filter(|item| item.item_type == item_type)
            .filter_map(|item| item.total_price)
            .sum()
    }

    pub fn item(&self, item_id: LineItemId) -> Option<&RequisitionLineItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Strips supplier pricing for roles without price visibility.
    pub fn redacted_for(mut self, role: Role) -> Self {
        if role.can_view_prices() {
            return self;
        }
        self.total_amount = None;
        for item in &mut self.items {
            item.unit_price = None;
            item.total_price = None;
            item.payment_method = None;
            item.supplier_contact = None;
            item.supplier_contact_person = None;
        }
        self
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        ItemType, LineItemId, Requisition, RequisitionId, RequisitionLineItem, RequisitionStatus,
    };
    use crate::domain::actor::{ProjectId, UserId};
    use crate::domain::contract::ContractItemId;

    pub fn line(id: i64, item_type: ItemType, quantity: i64) -> RequisitionLineItem {
        RequisitionLineItem {
            id: LineItemId(id),
            request_id: RequisitionId(1),
            contract_item_id: (item_type == ItemType::Main).then_some(ContractItemId(100 + id)),
            item_type,
            item_name: format!("item-{id}"),
            specification: None,
            brand_model: None,
            unit: Some("m".to_string()),
            quantity: Decimal::from(quantity),
            unit_price: None,
            total_price: None,
            supplier_name: None,
            supplier_contact_person: None,
            supplier_contact: None,
            payment_method: None,
            estimated_delivery: None,
            received_quantity: Decimal::ZERO,
            remarks: None,
        }
    }

    pub fn requisition(status: RequisitionStatus, items: Vec<RequisitionLineItem>) -> Requisition {
        Requisition {
            id: RequisitionId(1),
            request_code: "PR202610180001".to_string(),
            project_id: ProjectId(3),
            requester_id: UserId(7),
            status,
            current_step: crate::workflow::step_for(status),
            total_amount: None,
            request_date: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap_or_default(),
            required_date: None,
            remarks: None,
            approval_notes: None,
            items,
            created_at: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
            updated_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::fixtures::{line, requisition};
    use super::{ItemType, RequisitionStatus};
    use crate::domain::actor::Role;

    #[test]
    fn status_parses_wire_names_and_rejects_unknown() {
        for status in RequisitionStatus::ALL {
            assert_eq!(status.as_str().parse::<RequisitionStatus>(), Ok(status));
        }
        assert!("archived".parse::<RequisitionStatus>().is_err());
    }

    #[test]
    fn total_is_absent_until_an_item_is_priced() {
        let mut req = requisition(
            RequisitionStatus::Submitted,
            vec![line(1, ItemType::Main, 4), line(2, ItemType::Auxiliary, 2)],
        );
        req.recompute_total();
        assert_eq!(req.total_amount, None);

        req.items[0].unit_price = Some(Decimal::new(1250, 2));
        req.items[0].total_price = Some(Decimal::new(5000, 2));
        req.items[1].total_price = Some(Decimal::new(300, 2));
        req.recompute_total();
        assert_eq!(req.total_amount, Some(Decimal::new(5300, 2)));
        assert_eq!(req.amount_for(ItemType::Main), Decimal::new(5000, 2));
        assert_eq!(req.amount_for(ItemType::Auxiliary), Decimal::new(300, 2));
    }

    #[test]
    fn project_manager_view_hides_prices() {
        let mut req = requisition(RequisitionStatus::PriceQuoted, vec![line(1, ItemType::Main, 4)]);
        req.items[0].unit_price = Some(Decimal::TEN);
        req.items[0].total_price = Some(Decimal::from(40));
        req.items[0].supplier_name = Some("Acme Cabling".to_string());
        req.recompute_total();

        let redacted = req.clone().redacted_for(Role::ProjectManager);
        assert_eq!(redacted.total_amount, None);
        assert_eq!(redacted.items[0].unit_price, None);
        assert_eq!(redacted.items[0].total_price, None);
        assert_eq!(redacted.items[0].supplier_name.as_deref(), Some("Acme Cabling"));

        let visible = req.redacted_for(Role::DeptManager);
        assert_eq!(visible.total_amount, Some(Decimal::from(40)));
    }
}
