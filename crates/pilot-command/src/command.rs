use pilot_fc::{MAX_AIRSPEED_MS, MAX_ALTITUDE_M};
use pilot_proto::FunctionCall;
use serde_json::Value;

use crate::schema;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Missing {param} parameter")]
    MissingArgument { param: &'static str },
    #[error("Invalid {param} parameter: {reason}")]
    InvalidArgument { param: &'static str, reason: String },
}

/// A validated operation. The text directive is only a serialization of
/// this; nothing executes from raw arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ArmAndTakeoff { altitude: f32 },
    Land,
    ReturnToLaunch,
    GotoLocation { latitude: f64, longitude: f64, altitude: f32 },
    GetStatus,
    SetAirspeed { speed: f32 },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::ArmAndTakeoff { .. } => "arm_and_takeoff",
            Command::Land => "land",
            Command::ReturnToLaunch => "return_to_launch",
            Command::GotoLocation { .. } => "goto_location",
            Command::GetStatus => "get_status",
            Command::SetAirspeed { .. } => "set_airspeed",
        }
    }

    /// Validates `call` against the schema table. Extra arguments are ignored.
    pub fn from_call(call: &FunctionCall) -> Result<Self, DispatchError> {
        let schema = schema::lookup(&call.name).ok_or_else(|| DispatchError::UnknownFunction(call.name.clone()))?;
        for p in schema.params.iter().filter(|p| p.required) {
            if call.arguments.get(p.name).map_or(true, Value::is_null) {
                return Err(DispatchError::MissingArgument { param: p.name });
            }
        }
        let num = |param: &'static str| number(call, param);

        Ok(match schema.name {
            "arm_and_takeoff" => {
                let altitude = narrow(num("altitude")?, "altitude", MAX_ALTITUDE_M)?;
                check(altitude > 0.0, "altitude", "must be positive")?;
                Command::ArmAndTakeoff { altitude }
            }
            "land" => Command::Land,
            "return_to_launch" => Command::ReturnToLaunch,
            "goto_location" => {
                let latitude = num("latitude")?;
                let longitude = num("longitude")?;
                let altitude = narrow(num("altitude")?, "altitude", MAX_ALTITUDE_M)?;
                check((-90.0..=90.0).contains(&latitude), "latitude", "must be within [-90, 90]")?;
                check((-180.0..=180.0).contains(&longitude), "longitude", "must be within [-180, 180]")?;
                check(altitude >= 0.0, "altitude", "must not be negative")?;
                Command::GotoLocation { latitude, longitude, altitude }
            }
            "get_status" => Command::GetStatus,
            "set_airspeed" => {
                let speed = narrow(num("speed")?, "speed", MAX_AIRSPEED_MS)?;
                check(speed > 0.0, "speed", "must be positive")?;
                Command::SetAirspeed { speed }
            }
            other => return Err(DispatchError::UnknownFunction(other.to_string())),
        })
    }

    pub fn to_call(&self) -> FunctionCall {
        let call = FunctionCall::new(self.name());
        match *self {
            Command::ArmAndTakeoff { altitude } => call.arg("altitude", altitude),
            Command::GotoLocation { latitude, longitude, altitude } => {
                call.arg("latitude", latitude).arg("longitude", longitude).arg("altitude", altitude)
            }
            Command::SetAirspeed { speed } => call.arg("speed", speed),
            Command::Land | Command::ReturnToLaunch | Command::GetStatus => call,
        }
    }
}

fn number(call: &FunctionCall, param: &'static str) -> Result<f64, DispatchError> {
    let v = call
        .arguments
        .get(param)
        .and_then(Value::as_f64)
        .ok_or_else(|| DispatchError::InvalidArgument { param, reason: "expected a number".into() })?;
    check(v.is_finite(), param, "must be finite")?;
    Ok(v)
}

/// Values are carried as f32 from here on; bound them before the cast.
fn narrow(v: f64, param: &'static str, max: f32) -> Result<f32, DispatchError> {
    if v > max as f64 {
        return Err(DispatchError::InvalidArgument { param, reason: format!("must not exceed {}", max) });
    }
    let n = v as f32;
    check(n.is_finite(), param, "must be finite")?;
    Ok(n)
}

fn check(ok: bool, param: &'static str, reason: &str) -> Result<(), DispatchError> {
    if ok {
        Ok(())
    } else {
        Err(DispatchError::InvalidArgument { param, reason: reason.to_string() })
    }
}
