use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::actor::ProjectId;
use crate::domain::requisition::{ItemType, Requisition};

/// Per-project requisition counters. Amounts only include approved requisitions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    pub project_id: ProjectId,
    pub total_requests: u64,
    pub pending_approval: u64,
    pub approved: u64,
    pub total_amount: Decimal,
    pub main_material_amount: Decimal,
    pub auxiliary_material_amount: Decimal,
}

impl ProjectStatistics {
    pub fn compute<'a>(
        project_id: ProjectId,
        requisitions: impl IntoIterator<Item = &'a Requisition>,
    ) -> Self {
        let mut stats = Self {
            project_id,
            total_requests: 0,
            pending_approval: 0,
            approved: 0,
            total_amount: Decimal::ZERO,
            main_material_amount: Decimal::ZERO,
            auxiliary_material_amount: Decimal::ZERO,
        };

        for requisition in requisitions.into_iter().filter(|req| req.project_id == project_id) {
            stats.total_requests += 1;
            if requisition.status.is_pending_approval() {
                stats.pending_approval += 1;
            }
            if requisition.status.is_approved() {
                stats.approved += 1;
                stats.total_amount += requisition.computed_total().unwrap_or_default();
                stats.main_material_amount += requisition.amount_for(ItemType::Main);
                stats.auxiliary_material_amount += requisition.amount_for(ItemType::Auxiliary);
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::ProjectStatistics;
    use crate::domain::actor::ProjectId;
    use crate::domain::requisition::fixtures::{line, requisition};
    use crate::domain::requisition::{ItemType, RequisitionStatus};

    #[test]
    fn amounts_only_count_approved_requisitions() {
        let mut approved = requisition(
            RequisitionStatus::FinalApproved,
            vec![line(1, ItemType::Main, 2), line(2, ItemType::Auxiliary, 1)],
        );
        approved.items[0].total_price = Some(Decimal::from(200));
        approved.items[1].total_price = Some(Decimal::from(15));

        let mut quoted = requisition(RequisitionStatus::PriceQuoted, vec![line(3, ItemType::Main, 9)]);
        quoted.items[0].total_price = Some(Decimal::from(900));

        let draft = requisition(RequisitionStatus::Draft, vec![line(4, ItemType::Main, 1)]);
        let mut elsewhere = requisition(RequisitionStatus::Completed, vec![line(5, ItemType::Main, 1)]);
        elsewhere.project_id = ProjectId(99);

        let reqs = vec![approved, quoted, draft, elsewhere];
        let stats = ProjectStatistics::compute(ProjectId(3), &reqs);

        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.pending_approval, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.total_amount, Decimal::from(215));
        assert_eq!(stats.main_material_amount, Decimal::from(200));
        assert_eq!(stats.auxiliary_material_amount, Decimal::from(15));
    }
}
