//! Traffic record types.
//!
//! The server dataset is loosely shaped: coordinates sometimes arrive as
//! strings, severities go missing, and levels outside the known three show
//! up. Deserialization here is lenient so one odd field never drops a whole
//! dataset.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Severity used when none (or an unusable one) is given.
pub const DEFAULT_SEVERITY: u32 = 1;

/// Congestion level of a traffic record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    /// Free-flowing or minor.
    Low,
    /// Noticeable slowdown.
    Medium,
    /// Jam.
    High,
    /// Any other string; kept verbatim, styled like [`Level::Low`].
    Other(String),
    /// A non-string JSON value such as `3`, held as its JSON text so it is
    /// written back with its original type. Styled like [`Level::Low`].
    Raw(String),
}

impl Level {
    /// The string form, exactly as it is stored.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Other(s) | Self::Raw(s) => s,
        }
    }
}

impl From<&str> for Level {
    fn from(s: &str) -> Self {
        match s {
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Raw(json) => serde_json::from_str::<Value>(json)
                .map_err(<S::Error as serde::ser::Error>::custom)?
                .serialize(serializer),
            _ => serializer.serialize_str(self.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::String(s) => Level::from(s.as_str()),
            other => Level::Raw(other.to_string()),
        })
    }
}

/// One traffic incident, from the baseline or from the override layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    /// Identifier, unique within its source.
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,

    /// Display title.
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,

    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Severity, at least 1; scales the marker.
    #[serde(
        default = "default_severity",
        deserialize_with = "lenient_severity"
    )]
    pub severity: u32,

    /// Level; missing stays missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<Level>,

    /// Latitude in degrees; non-finite when the source value was unusable.
    #[serde(default = "nan", deserialize_with = "lenient_coordinate")]
    pub lat: f64,

    /// Longitude in degrees; non-finite when the source value was unusable.
    #[serde(default = "nan", deserialize_with = "lenient_coordinate")]
    pub lng: f64,
}

impl TrafficRecord {
    /// The level string as stored, or `None` when absent.
    #[must_use]
    pub fn level_str(&self) -> Option<&str> {
        self.level.as_ref().map(Level::as_str)
    }

    /// Whether the record is exactly `high`.
    #[must_use]
    pub fn is_high(&self) -> bool {
        self.level == Some(Level::High)
    }

    /// Whether the record is anything other than exactly `low`.
    ///
    /// Records with a missing or unrecognised level count as not low.
    #[must_use]
    pub fn is_above_low(&self) -> bool {
        self.level != Some(Level::Low)
    }

    /// Whether both coordinates are finite and can be placed on a map.
    #[must_use]
    pub fn is_well_placed(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// User-supplied fields for a new override record.
///
/// Anything left `None` is filled with the override defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewRecord {
    /// Display title.
    pub title: Option<String>,
    /// Longer description.
    pub description: Option<String>,
    /// Severity.
    pub severity: Option<u32>,
    /// Level.
    pub level: Option<Level>,
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
}

impl NewRecord {
    /// Start a new record with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Set the position.
    #[must_use]
    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.lat = Some(lat);
        self.lng = Some(lng);
        self
    }

    /// Set the level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    /// Set the severity.
    #[must_use]
    pub fn with_severity(mut self, severity: u32) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

fn default_severity() -> u32 {
    DEFAULT_SEVERITY
}

fn nan() -> f64 {
    f64::NAN
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn lenient_coordinate<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    })
}

fn lenient_severity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let parsed = match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 1.0).map(|f| f.floor() as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(parsed
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v >= 1)
        .unwrap_or(DEFAULT_SEVERITY))
}
