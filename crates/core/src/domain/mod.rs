pub mod actor;
pub mod contract;
pub mod payload;
pub mod requisition;
