//! Icon allowlist.
//!
//! Icon identifiers come straight out of the provider's XML and end up inside
//! SVG markup, so they are only usable once this module has vouched for them.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::model::{DailyForecast, Temperature, WeatherReading};

/// NWS forecast icon names, plus `na` for days the feed leaves blank.
pub const DEFAULT_ICONS: &[&str] = &[
    "bkn", "blizzard", "cold", "du", "fg", "few", "fu", "fzra", "fzrara", "hi_bkn", "hi_few",
    "hi_moclr", "hi_nshwrs", "hi_nskc", "hi_ntsra", "hi_sct", "hi_shwrs", "hi_skc", "hi_tsra",
    "hot", "hz", "ip", "mix", "na", "nbkn", "nfew", "nfg", "novc", "nra", "nrasn", "nsct",
    "nscttsra", "nshra", "nskc", "nsn", "ntsra", "nwind", "ovc", "ra", "ra_sn", "raip", "rasn",
    "sct", "scttsra", "shra", "skc", "sn", "tsra", "wind",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("icon identifier '{0}' is not in the allowlist")]
    UnknownIcon(String),

    #[error("allowlist entry '{0}' must only contain a-z, 0-9, '_' or '-'")]
    InvalidEntry(String),

    #[error("icon allowlist is empty")]
    Empty,
}

/// An icon identifier that has passed the allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IconId(String);

impl IconId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedDay {
    pub high: Temperature,
    pub low: Temperature,
    pub condition: String,
    pub icon: IconId,
}

/// A reading whose icons are all allowlisted. Only [`IconAllowlist`] builds these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedReading {
    starts_on: NaiveDate,
    days: Vec<ValidatedDay>,
}

impl ValidatedReading {
    pub fn starts_on(&self) -> NaiveDate {
        self.starts_on
    }

    pub fn days(&self) -> &[ValidatedDay] {
        &self.days
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconAllowlist {
    icons: BTreeSet<String>,
}

impl IconAllowlist {
    pub fn new<I, S>(entries: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut icons = BTreeSet::new();
        for entry in entries {
            let entry = entry.into();
            if !is_icon_token(&entry) {
                return Err(ValidationError::InvalidEntry(entry));
            }
            icons.insert(entry);
        }

        if icons.is_empty() {
            return Err(ValidationError::Empty);
        }

        Ok(Self { icons })
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.icons.contains(candidate)
    }

    pub fn len(&self) -> usize {
        self.icons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.icons.is_empty()
    }

    pub fn validate(&self, candidate: &str) -> Result<IconId, ValidationError> {
        if self.contains(candidate) {
            Ok(IconId(candidate.to_owned()))
        } else {
            Err(ValidationError::UnknownIcon(candidate.to_owned()))
        }
    }

    /// Check every day's icon; the first unknown one fails the whole reading.
    pub fn validate_reading(
        &self,
        reading: &WeatherReading,
    ) -> Result<ValidatedReading, ValidationError> {
        let days = reading
            .days
            .iter()
            .map(|day| self.validate_day(day))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedReading { starts_on: reading.starts_on, days })
    }

    fn validate_day(&self, day: &DailyForecast) -> Result<ValidatedDay, ValidationError> {
        Ok(ValidatedDay {
            high: day.high,
            low: day.low,
            condition: day.condition.clone(),
            icon: self.validate(&day.icon)?,
        })
    }
}

impl Default for IconAllowlist {
    fn default() -> Self {
        Self { icons: DEFAULT_ICONS.iter().map(|s| s.to_string()).collect() }
    }
}

fn is_icon_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}
