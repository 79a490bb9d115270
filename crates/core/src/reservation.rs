//! Contract quantity reservation.
//!
//! A contract line's remaining quantity is its total minus everything committed by
//! requisitions that still hold a reservation (anything not rejected or cancelled).

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::contract::{ContractItemId, ContractLineItem};
use crate::domain::requisition::{Requisition, RequisitionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub contract_item_id: ContractItemId,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub specification: Option<String>,
    #[serde(default)]
    pub brand_model: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: Option<Decimal>,
    pub total_quantity: Decimal,
    #[serde(alias = "purchased_quantity")]
    pub committed_quantity: Decimal,
    pub remaining_quantity: Decimal,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("contract item {0} was not found")]
    NotFound(ContractItemId),
    #[error("requested quantity {requested} must be greater than zero")]
    NonPositive { requested: Decimal },
    #[error("contract item {contract_item_id} has no remaining quantity")]
    Exhausted { contract_item_id: ContractItemId },
    #[error(
        "requested quantity {requested} exceeds remaining {remaining} for contract item {contract_item_id}"
    )]
    Exceeds { contract_item_id: ContractItemId, requested: Decimal, remaining: Decimal },
}

/// Result of fitting a requested quantity into what is still available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuantityFit {
    Accepted { quantity: Decimal },
    Adjusted { requested: Decimal, quantity: Decimal },
}

impl QuantityFit {
    pub fn quantity(&self) -> Decimal {
        match self {
            Self::Accepted { quantity } | Self::Adjusted { quantity, .. } => *quantity,
        }
    }

    pub fn was_adjusted(&self) -> bool {
        matches!(self, Self::Adjusted { .. })
    }
}

impl Availability {
    /// Aggregates commitments from every requisition that still reserves quantity.
    /// `exclude` leaves one requisition out so a draft can be re-validated against itself.
    pub fn compute<'a>(
        contract: &ContractLineItem,
        requisitions: impl IntoIterator<Item = &'a Requisition>,
        exclude: Option<RequisitionId>,
    ) -> Self {
        let committed: Decimal = requisitions
            .into_iter()
            .filter(|requisition| Some(requisition.id) != exclude)
            .filter(|requisition| requisition.status.reserves_quantity())
            .flat_map(|requisition| requisition.items.iter())
            .filter(|item| item.contract_item_id == Some(contract.id))
            .map(|item| item.quantity)
            .sum();

        Self {
            contract_item_id: contract.id,
            item_name: contract.item_name.clone(),
            specification: contract.specification.clone(),
            brand_model: contract.brand_model.clone(),
            unit: contract.unit.clone(),
            unit_price: contract.unit_price,
            total_quantity: contract.total_quantity,
            committed_quantity: committed,
            remaining_quantity: (contract.total_quantity - committed).max(Decimal::ZERO),
        }
    }

    pub fn can_purchase(&self) -> bool {
        self.remaining_quantity > Decimal::ZERO
    }

    /// Strict check used at write time: never adjusts, only accepts or refuses.
    pub fn check(&self, requested: Decimal) -> Result<(), ReservationError> {
        if requested <= Decimal::ZERO {
            return Err(ReservationError::NonPositive { requested });
        }
        if requested > self.remaining_quantity {
            return Err(ReservationError::Exceeds {
                contract_item_id: self.contract_item_id,
                requested,
                remaining: self.remaining_quantity,
            });
        }
        Ok(())
    }

    /// Edit-time fitting: quantities above the remaining amount are clamped down to it.
    pub fn fit(&self, requested: Decimal) -> Result<QuantityFit, ReservationError> {
        if requested <= Decimal::ZERO {
            return Err(ReservationError::NonPositive { requested });
        }
        if self.remaining_quantity <= Decimal::ZERO {
            return Err(ReservationError::Exhausted { contract_item_id: self.contract_item_id });
        }
        if requested > self.remaining_quantity {
            return Ok(QuantityFit::Adjusted { requested, quantity: self.remaining_quantity });
        }
        Ok(QuantityFit::Accepted { quantity: requested })
    }
}

/// Running tally for validating several lines of one requisition together.
#[derive(Debug, Default)]
pub struct CumulativeReservation {
    claimed: HashMap<ContractItemId, Decimal>,
}

impl CumulativeReservation {
    pub fn claim(
        &mut self,
        availability: &Availability,
        quantity: Decimal,
    ) -> Result<(), ReservationError> {
        if quantity <= Decimal::ZERO {
            return Err(ReservationError::NonPositive { requested: quantity });
        }
        let already = self.claimed.get(&availability.contract_item_id).copied().unwrap_or_default();
        let total = already + quantity;
        if total > availability.remaining_quantity {
            return Err(ReservationError::Exceeds {
                contract_item_id: availability.contract_item_id,
                requested: total,
                remaining: availability.remaining_quantity,
            });
        }
        self.claimed.insert(availability.contract_item_id, total);
        Ok(())
    }
}

/// Selectable specifications for one material name under a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "selection", content = "options", rename_all = "snake_case")]
pub enum SpecificationChoice {
    None,
    AutoSelected(Availability),
    ChooseOne(Vec<Availability>),
}

impl SpecificationChoice {
    pub fn from_options(mut options: Vec<Availability>) -> Self {
        match options.len() {
            0 => Self::None,
            1 => match options.pop() {
                Some(only) => Self::AutoSelected(only),
                None => Self::None,
            },
            _ => Self::ChooseOne(options),
        }
    }

    pub fn options(&self) -> Vec<&Availability> {
        match self {
            Self::None => Vec::new(),
            Self::AutoSelected(option) => vec![option],
            Self::ChooseOne(options) => options.iter().collect(),
        }
    }

    /// The option a quantity can be validated against, if one has been settled.
    pub fn selected(&self, choice: Option<ContractItemId>) -> Option<&Availability> {
        match (self, choice) {
            (Self::AutoSelected(option), _) => Some(option),
            (Self::ChooseOne(options), Some(id)) => {
                options.iter().find(|option| option.contract_item_id == id)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Availability, CumulativeReservation, QuantityFit, ReservationError, SpecificationChoice};
    use crate::domain::contract::{ContractItemId, ContractLineItem};
    use crate::domain::requisition::fixtures::{line, requisition};
    use crate::domain::requisition::{ItemType, Requisition, RequisitionId, RequisitionStatus};

    fn cable() -> ContractLineItem {
        ContractLineItem::new(101, 3, "Cat6 cable", Decimal::from(100))
            .with_specification("UTP 4P")
            .with_unit("m")
    }

    fn committing(id: i64, status: RequisitionStatus, quantity: i64) -> Requisition {
        let mut req = requisition(status, vec![line(1, ItemType::Main, quantity)]);
        req.id = RequisitionId(id);
        req
    }

    #[test]
    fn remaining_subtracts_active_commitments_only() {
        let reqs = vec![
            committing(1, RequisitionStatus::Submitted, 40),
            committing(2, RequisitionStatus::Rejected, 30),
            committing(3, RequisitionStatus::Cancelled, 10),
        ];
        let availability = Availability::compute(&cable(), &reqs, None);
        assert_eq!(availability.committed_quantity, Decimal::from(40));
        assert_eq!(availability.remaining_quantity, Decimal::from(60));
        assert!(availability.can_purchase());
    }

    #[test]
    fn excluded_requisition_does_not_count_against_itself() {
        let reqs = vec![committing(1, RequisitionStatus::Draft, 40)];
        let availability = Availability::compute(&cable(), &reqs, Some(RequisitionId(1)));
        assert_eq!(availability.remaining_quantity, Decimal::from(100));
    }

    #[test]
    fn remaining_never_goes_negative() {
        let reqs = vec![
            committing(1, RequisitionStatus::FinalApproved, 80),
            committing(2, RequisitionStatus::Submitted, 50),
        ];
        let availability = Availability::compute(&cable(), &reqs, None);
        assert_eq!(availability.remaining_quantity, Decimal::ZERO);
        assert!(!availability.can_purchase());
    }

    #[test]
    fn over_request_is_refused_strictly_and_clamped_when_fitting() {
        let reqs = vec![committing(1, RequisitionStatus::Submitted, 40)];
        let availability = Availability::compute(&cable(), &reqs, None);

        assert!(matches!(
            availability.check(Decimal::from(80)),
            Err(ReservationError::Exceeds { remaining, .. }) if remaining == Decimal::from(60)
        ));
        assert_eq!(
            availability.fit(Decimal::from(80)),
            Ok(QuantityFit::Adjusted { requested: Decimal::from(80), quantity: Decimal::from(60) })
        );
        assert_eq!(
            availability.fit(Decimal::from(20)),
            Ok(QuantityFit::Accepted { quantity: Decimal::from(20) })
        );
        assert!(matches!(availability.fit(Decimal::ZERO), Err(ReservationError::NonPositive { .. })));
    }

    #[test]
    fn exhausted_item_cannot_be_fitted() {
        let reqs = vec![committing(1, RequisitionStatus::Submitted, 100)];
        let availability = Availability::compute(&cable(), &reqs, None);
        assert_eq!(
            availability.fit(Decimal::ONE),
            Err(ReservationError::Exhausted { contract_item_id: ContractItemId(101) })
        );
    }

    #[test]
    fn cumulative_claims_share_one_remaining_amount() {
        let availability = Availability::compute(&cable(), &Vec::<Requisition>::new(), None);
        let mut tally = CumulativeReservation::default();
        assert!(tally.claim(&availability, Decimal::from(60)).is_ok());
        assert!(tally.claim(&availability, Decimal::from(40)).is_ok());
        assert!(matches!(
            tally.claim(&availability, Decimal::ONE),
            Err(ReservationError::Exceeds { .. })
        ));
    }

    #[test]
    fn single_option_is_auto_selected() {
        let only = Availability::compute(&cable(), &Vec::<Requisition>::new(), None);
        let choice = SpecificationChoice::from_options(vec![only.clone()]);
        assert_eq!(choice.selected(None), Some(&only));

        let other = Availability::compute(
            &ContractLineItem::new(102, 3, "Cat6 cable", Decimal::from(50))
                .with_specification("FTP 4P"),
            &Vec::<Requisition>::new(),
            None,
        );
        let choice = SpecificationChoice::from_options(vec![only, other]);
        assert_eq!(choice.selected(None), None);
        assert_eq!(
            choice.selected(Some(ContractItemId(102))).map(|option| option.total_quantity),
            Some(Decimal::from(50))
        );
        assert_eq!(SpecificationChoice::from_options(Vec::new()), SpecificationChoice::None);
    }
}
