use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Device record as returned by `GET /api/devices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,

    #[serde(default)]
    pub name: String,

    /// Identifier the OsmAnd endpoint matches on
    pub unique_id: String,

    #[serde(default)]
    pub disabled: bool,

    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Device {
    /// String value of attribute `key`; non-string values are ignored.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// One position push through the OsmAnd protocol
#[derive(Debug, Clone, PartialEq)]
pub struct LocationUpdate {
    /// Traccar unique identifier of the target device
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub speed_knots: Option<f64>,
    pub bearing: Option<u16>,
    pub altitude_meters: Option<f64>,
    pub accuracy_meters: Option<f64>,
    /// Free-form attributes stored with the position
    pub attributes: Vec<(&'static str, String)>,
}

impl LocationUpdate {
    /// Query parameters understood by Traccar's OsmAnd decoder
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("id", self.device_id.clone()),
            ("lat", self.latitude.to_string()),
            ("lon", self.longitude.to_string()),
            ("timestamp", self.timestamp.timestamp().to_string()),
        ];

        if let Some(speed) = self.speed_knots {
            pairs.push(("speed", speed.to_string()));
        }
        if let Some(bearing) = self.bearing {
            pairs.push(("bearing", bearing.to_string()));
        }
        if let Some(altitude) = self.altitude_meters {
            pairs.push(("altitude", altitude.to_string()));
        }
        if let Some(accuracy) = self.accuracy_meters {
            pairs.push(("accuracy", accuracy.to_string()));
        }

        pairs.extend(self.attributes.iter().cloned());
        pairs
    }
}
