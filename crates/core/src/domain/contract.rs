use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ProjectId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractItemId(pub i64);

impl fmt::Display for ContractItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bill-of-materials line from a project's signed contract. Read-only here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLineItem {
    pub id: ContractItemId,
    pub project_id: ProjectId,
    pub item_name: String,
    #[serde(default)]
    pub specification: Option<String>,
    #[serde(default)]
    pub brand_model: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    pub total_quantity: Decimal,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
}

impl ContractLineItem {
    pub fn new(
        id: i64,
        project_id: i64,
        item_name: impl Into<String>,
        total_quantity: Decimal,
    ) -> Self {
        Self {
            id: ContractItemId(id),
            project_id: ProjectId(project_id),
            item_name: item_name.into(),
            specification: None,
            brand_model: None,
            unit: None,
            total_quantity,
            unit_price: None,
        }
    }

    pub fn with_specification(mut self, specification: impl Into<String>) -> Self {
        self.specification = Some(specification.into());
        self
    }

    pub fn with_brand_model(mut self, brand_model: impl Into<String>) -> Self {
        self.brand_model = Some(brand_model.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}
