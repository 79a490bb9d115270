pub mod api;
pub mod connectivity;
pub mod in_flight;
pub mod local;
pub mod precheck;
pub mod schedule;
pub mod workbench;

pub use api::{ApiClient, RequisitionApi, QUANTITY_CONFLICT};
pub use connectivity::{check_once, ConnectionMonitor, ConnectionState, ConnectionStatus, HealthProbe};
pub use in_flight::{InFlightActions, InFlightGuard};
pub use local::InProcessApi;
pub use precheck::Precheck;
pub use schedule::{LatestWins, ScheduledTask, Ticket};
pub use workbench::{RequisitionView, Workbench};
