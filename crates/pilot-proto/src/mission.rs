use serde::{Deserialize, Serialize};

/// One mission leg. Altitude is relative to home.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f32,
    /// Hold time at the waypoint, seconds.
    #[serde(default)]
    pub delay: f32,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WaypointError {
    #[error("latitude {0} outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} outside [-180, 180]")]
    Longitude(f64),
    #[error("altitude {0} must be >= 0")]
    Altitude(f32),
    #[error("delay {0} must be >= 0")]
    Delay(f32),
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64, alt: f32, delay: f32) -> Result<Self, WaypointError> {
        let wp = Self { lat, lon, alt, delay };
        wp.validate()?;
        Ok(wp)
    }

    pub fn validate(&self) -> Result<(), WaypointError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(WaypointError::Latitude(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(WaypointError::Longitude(self.lon));
        }
        if !(self.alt >= 0.0) {
            return Err(WaypointError::Altitude(self.alt));
        }
        if !(self.delay >= 0.0) {
            return Err(WaypointError::Delay(self.delay));
        }
        Ok(())
    }
}

/// Ordered list of legs. The home position, when known, is flown as the
/// implicit first item and is not part of `waypoints`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mission {
    pub home: Option<Waypoint>,
    pub waypoints: Vec<Waypoint>,
}

impl Mission {
    pub fn new(waypoints: Vec<Waypoint>) -> Result<Self, WaypointError> {
        for wp in &waypoints {
            wp.validate()?;
        }
        Ok(Self { home: None, waypoints })
    }

    pub fn with_home(mut self, lat: f64, lon: f64) -> Self {
        self.home = Some(Waypoint { lat, lon, alt: 0.0, delay: 0.0 });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Items in upload order: home first (if set), then every waypoint.
    pub fn items(&self) -> impl Iterator<Item = &Waypoint> {
        self.home.iter().chain(self.waypoints.iter())
    }
}
