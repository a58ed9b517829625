use pilot_proto::{FunctionCall, FunctionResult};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{info, warn};

use crate::command::Command;
use crate::directive;
use crate::session::ControlSession;

/// Turns function calls into session operations. Every outcome, including
/// validation and flight failures, comes back as a [`FunctionResult`].
pub struct FunctionDispatcher {
    session: Arc<ControlSession>,
}

impl FunctionDispatcher {
    pub fn new(session: Arc<ControlSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<ControlSession> {
        &self.session
    }

    /// `None` when the text carries no directive.
    pub fn dispatch_text(&self, text: &str) -> Option<FunctionResult> {
        let call = directive::parse(text)?;
        Some(self.dispatch(&call))
    }

    pub fn dispatch(&self, call: &FunctionCall) -> FunctionResult {
        info!("dispatch: {}", call.name);
        match Command::from_call(call) {
            Ok(cmd) => self.execute(cmd),
            Err(e) => {
                warn!("dispatch: rejected {}: {}", call.name, e);
                FunctionResult::failed(format!("{} not executed", call.name), e.to_string())
            }
        }
    }

    pub fn execute(&self, cmd: Command) -> FunctionResult {
        let name = cmd.name();
        match catch_unwind(AssertUnwindSafe(|| self.run(cmd))) {
            Ok(res) => res,
            Err(_) => {
                warn!("dispatch: {} panicked", name);
                FunctionResult::failed(format!("{} failed", name), format!("Error executing {}: internal fault", name))
            }
        }
    }

    fn run(&self, cmd: Command) -> FunctionResult {
        let s = &self.session;
        match cmd {
            Command::ArmAndTakeoff { altitude } => match s.arm_and_takeoff(altitude) {
                Ok(reached) => FunctionResult::ok_with(
                    format!("Successfully took off to {}m! The drone is now airborne.", altitude),
                    serde_json::json!({ "altitude": reached }),
                ),
                Err(e) => FunctionResult::failed("Takeoff failed", e.to_string()),
            },
            Command::Land => match s.land() {
                Ok(()) => FunctionResult::ok("Landing initiated"),
                Err(e) => FunctionResult::failed("Landing failed", e.to_string()),
            },
            Command::ReturnToLaunch => match s.return_to_launch() {
                Ok(()) => FunctionResult::ok("Returning to launch point"),
                Err(e) => FunctionResult::failed("Return to launch failed", e.to_string()),
            },
            Command::GotoLocation { latitude, longitude, altitude } => {
                match s.goto_location(latitude, longitude, altitude) {
                    Ok(()) => FunctionResult::ok(format!("Flying to ({}, {}) at {}m", latitude, longitude, altitude)),
                    Err(e) => FunctionResult::failed("Navigation failed", e.to_string()),
                }
            }
            Command::GetStatus => {
                if !s.is_connected() {
                    return FunctionResult::failed("Status unavailable", "not connected to a vehicle");
                }
                match serde_json::to_value(s.status()) {
                    Ok(v) => FunctionResult::ok_with("Vehicle status", v),
                    Err(e) => FunctionResult::failed("Status unavailable", e.to_string()),
                }
            }
            Command::SetAirspeed { speed } => match s.set_airspeed(speed) {
                Ok(()) => FunctionResult::ok(format!("Airspeed set to {} m/s", speed)),
                Err(e) => FunctionResult::failed("Failed to set airspeed", e.to_string()),
            },
        }
    }
}
