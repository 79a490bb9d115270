use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use reqflow_core::domain::requisition::RequisitionId;
use reqflow_core::errors::ApplicationError;

/// Tracks requisitions with a workflow action awaiting its response.
///
/// A second action on the same requisition is refused until the first guard drops,
/// which is the client-side half of double-submission protection.
#[derive(Clone, Debug, Default)]
pub struct InFlightActions {
    pending: Arc<Mutex<HashSet<RequisitionId>>>,
}

impl InFlightActions {
    pub fn begin(&self, requisition_id: RequisitionId) -> Result<InFlightGuard, ApplicationError> {
        if !lock(&self.pending).insert(requisition_id) {
            return Err(ApplicationError::ActionInFlight { requisition_id });
        }
        Ok(InFlightGuard { requisition_id, pending: Arc::clone(&self.pending) })
    }

    pub fn is_pending(&self, requisition_id: RequisitionId) -> bool {
        lock(&self.pending).contains(&requisition_id)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

#[derive(Debug)]
pub struct InFlightGuard {
    requisition_id: RequisitionId,
    pending: Arc<Mutex<HashSet<RequisitionId>>>,
}

impl InFlightGuard {
    pub fn requisition_id(&self) -> RequisitionId {
        self.requisition_id
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.requisition_id);
    }
}

fn lock(pending: &Mutex<HashSet<RequisitionId>>) -> MutexGuard<'_, HashSet<RequisitionId>> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
