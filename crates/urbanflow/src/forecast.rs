//! Time-of-day traffic forecast for a planned trip.

use std::fmt;

use serde::Serialize;

/// Expected congestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Congestion {
    /// Roads are clear.
    Normal,
    /// Midday congestion.
    Medium,
    /// Rush hour.
    Heavy,
}

impl Congestion {
    /// Congestion expected at a given hour of the day (0-23).
    #[must_use]
    pub fn at_hour(hour: u32) -> Self {
        match hour {
            8..=10 | 17..=19 => Self::Heavy,
            12..=14 => Self::Medium,
            _ => Self::Normal,
        }
    }

    /// Fraction added to the travel time.
    #[must_use]
    pub fn delay_factor(self) -> f64 {
        match self {
            Self::Heavy => 0.3,
            Self::Medium => 0.15,
            Self::Normal => 0.0,
        }
    }

    /// Advice for someone about to set off.
    #[must_use]
    pub fn recommendation(self) -> &'static str {
        match self {
            Self::Heavy => {
                "Heavy traffic: consider travelling at another time or taking public transport."
            }
            Self::Medium => "Moderate traffic: delaying the trip a little may help.",
            Self::Normal => "Roads are clear: now is a good time to leave.",
        }
    }
}

impl fmt::Display for Congestion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Normal => "normal",
            Self::Medium => "medium",
            Self::Heavy => "heavy",
        })
    }
}

/// Forecast for one trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    /// Expected congestion.
    pub level: Congestion,
    /// Extra minutes on top of the planned travel time.
    pub delay: f64,
    /// Advice text.
    pub recommended: &'static str,
}

/// Forecast a trip of `time_minutes` starting at `hour`.
#[must_use]
pub fn predict(time_minutes: f64, hour: u32) -> Forecast {
    let level = Congestion::at_hour(hour);
    Forecast {
        level,
        delay: time_minutes * level.delay_factor(),
        recommended: level.recommendation(),
    }
}
