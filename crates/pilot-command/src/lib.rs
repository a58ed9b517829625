pub mod command;
pub mod directive;
pub mod dispatch;
pub mod doctor;
pub mod schema;
pub mod session;

pub use command::{Command, DispatchError};
pub use dispatch::FunctionDispatcher;
pub use session::{Backend, ControlSession, SessionConfig};
