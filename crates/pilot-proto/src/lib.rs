pub mod control;
pub mod function;
pub mod mission;
pub mod status;

pub use control::ControlVector;
pub use function::{FunctionCall, FunctionResult};
pub use mission::{Mission, Waypoint};
pub use status::{Battery, ConnectionState, FlightMode, Position, VehicleStatus};
