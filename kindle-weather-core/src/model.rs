use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    Fahrenheit,
    Celsius,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Fahrenheit => "°F",
            TemperatureUnit::Celsius => "°C",
        }
    }

    /// Interpret the `units` attribute of an NDFD `<temperature>` element.
    pub fn from_ndfd(units: &str) -> Self {
        if units.eq_ignore_ascii_case("celsius") {
            TemperatureUnit::Celsius
        } else {
            TemperatureUnit::Fahrenheit
        }
    }
}

/// Whole degrees, the resolution the NDFD daily summary reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperature {
    pub degrees: i32,
    pub unit: TemperatureUnit,
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.degrees, self.unit.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyForecast {
    pub high: Temperature,
    pub low: Temperature,
    /// Free-form `weather-summary` text; may be empty.
    pub condition: String,
    /// Icon token as found in the feed. Not yet checked against the allowlist.
    pub icon: String,
}

/// One parsed forecast. Immutable once built by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub starts_on: NaiveDate,
    pub days: Vec<DailyForecast>,
}
