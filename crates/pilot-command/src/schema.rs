use pilot_proto::function::{ARGS_MARKER, NAME_MARKER};
use serde_json::{json, Map, Value};
use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn required(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec { name, description, required: true }
}

pub const SCHEMAS: &[FunctionSchema] = &[
    FunctionSchema {
        name: "arm_and_takeoff",
        description: "Arm the drone and take off to a specified altitude. The drone must be connected first.",
        params: &[required("altitude", "Target altitude in meters (e.g., 20 for 20 meters)")],
    },
    FunctionSchema {
        name: "land",
        description: "Land the drone at its current location.",
        params: &[],
    },
    FunctionSchema {
        name: "return_to_launch",
        description: "Return the drone to its launch/home location and land.",
        params: &[],
    },
    FunctionSchema {
        name: "goto_location",
        description: "Fly the drone to a specific GPS coordinate at a given altitude.",
        params: &[
            required("latitude", "Target latitude in decimal degrees"),
            required("longitude", "Target longitude in decimal degrees"),
            required("altitude", "Target altitude in meters"),
        ],
    },
    FunctionSchema {
        name: "get_status",
        description: "Get the current status of the drone including mode, armed state, altitude, battery, and GPS location.",
        params: &[],
    },
    FunctionSchema {
        name: "set_airspeed",
        description: "Set the target airspeed of the drone.",
        params: &[required("speed", "Target airspeed in m/s")],
    },
];

pub fn lookup(name: &str) -> Option<&'static FunctionSchema> {
    SCHEMAS.iter().find(|s| s.name == name)
}

impl FunctionSchema {
    /// JSON-schema form for providers with native function calling.
    /// Every parameter is a number.
    pub fn to_json(&self) -> Value {
        let mut props = Map::new();
        for p in self.params {
            props.insert(p.name.to_string(), json!({ "type": "number", "description": p.description }));
        }
        let required: Vec<&str> = self.params.iter().filter(|p| p.required).map(|p| p.name).collect();
        let mut parameters = json!({ "type": "object", "properties": props });
        if !required.is_empty() {
            parameters["required"] = json!(required);
        }
        json!({ "name": self.name, "description": self.description, "parameters": parameters })
    }
}

/// Instruction text for models without native function calling.
pub fn render_prompt() -> String {
    let mut out = String::from("You have access to the following drone control functions:\n\n");
    for f in SCHEMAS {
        let _ = writeln!(out, "**{}**", f.name);
        let _ = writeln!(out, "Description: {}", f.description);
        if f.params.is_empty() {
            out.push_str("Parameters: None\n");
        } else {
            out.push_str("Parameters:\n");
            for p in f.params {
                let req = if p.required { " (required)" } else { "" };
                let _ = writeln!(out, "  - {}: {}{}", p.name, p.description, req);
            }
        }
        out.push('\n');
    }
    let _ = write!(
        out,
        "To execute a function, respond with:\n{} function_name\n{} {{\"param1\": value1, \"param2\": value2}}\n\n\
         After executing the function, I will provide you with the result, and you should explain it to the user in natural language.\n",
        NAME_MARKER, ARGS_MARKER
    );
    out
}
