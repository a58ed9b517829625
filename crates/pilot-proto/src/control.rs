use serde::{Deserialize, Serialize};
use std::fmt;

pub const ATTITUDE_LIMIT: f32 = 2.0;
pub const THROTTLE_LIMIT: f32 = 1.0;

/// One actuation command for the streaming simulator.
///
/// roll/pitch/yaw are bounded to [-2, 2], throttle to [-1, 1]. Values that
/// pass through [`ControlVector::clamped`] are always finite and in range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlVector {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub throttle: f32,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PacketError {
    #[error("expected 4 fields, got {0}")]
    FieldCount(usize),
    #[error("field {index} is not a number: {value:?}")]
    BadField { index: usize, value: String },
}

impl ControlVector {
    pub const NEUTRAL: ControlVector = ControlVector { roll: 0.0, pitch: 0.0, yaw: 0.0, throttle: 0.0 };

    pub fn new(roll: f32, pitch: f32, yaw: f32, throttle: f32) -> Self {
        Self { roll, pitch, yaw, throttle }.clamped()
    }

    /// Throttle only, attitude neutral.
    pub fn throttle(throttle: f32) -> Self {
        Self::new(0.0, 0.0, 0.0, throttle)
    }

    pub fn clamped(self) -> Self {
        Self {
            roll: clamp_axis(self.roll, ATTITUDE_LIMIT),
            pitch: clamp_axis(self.pitch, ATTITUDE_LIMIT),
            yaw: clamp_axis(self.yaw, ATTITUDE_LIMIT),
            throttle: clamp_axis(self.throttle, THROTTLE_LIMIT),
        }
    }

    /// Wire form: `roll pitch yaw throttle`, 6 fractional digits each.
    pub fn to_packet(&self) -> String {
        let v = self.clamped();
        format!("{:.6} {:.6} {:.6} {:.6}", v.roll, v.pitch, v.yaw, v.throttle)
    }

    pub fn from_packet(s: &str) -> Result<Self, PacketError> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(PacketError::FieldCount(fields.len()));
        }
        let mut vals = [0.0f32; 4];
        for (i, f) in fields.iter().enumerate() {
            vals[i] = f.parse::<f32>().map_err(|_| PacketError::BadField { index: i, value: f.to_string() })?;
        }
        Ok(Self::new(vals[0], vals[1], vals[2], vals[3]))
    }
}

impl fmt::Display for ControlVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "roll={:+.3} pitch={:+.3} yaw={:+.3} throttle={:+.3}", self.roll, self.pitch, self.yaw, self.throttle)
    }
}

fn clamp_axis(v: f32, limit: f32) -> f32 {
    if v.is_nan() {
        return 0.0;
    }
    v.clamp(-limit, limit)
}
