//! NDFD "by day" XML parsing.
//!
//! The document is untrusted. `<!DOCTYPE>` is refused outright, so no entity
//! can be declared, and text is unescaped with the predefined XML entities
//! only. Nothing is ever resolved against the network or the filesystem.

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use thiserror::Error;
use tracing::debug;

use crate::model::{DailyForecast, Temperature, TemperatureUnit, WeatherReading};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("weather feed is not valid UTF-8 (first bad byte at {0})")]
    Encoding(usize),

    #[error("weather feed declares a DOCTYPE, which is not accepted")]
    DoctypeForbidden,

    #[error("malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("weather feed did not contain {0}")]
    MissingField(&'static str),

    #[error("weather feed has {found} {field} value(s), {expected} required")]
    Incomplete { field: &'static str, expected: usize, found: usize },

    #[error("weather feed has no {field} value for day {day}")]
    NilValue { field: &'static str, day: usize },

    #[error("invalid temperature value '{0}'")]
    InvalidTemperature(String),

    #[error("invalid start-valid-time '{0}'")]
    InvalidDate(String),
}

const MAXIMUM: &str = "maximum temperature";
const MINIMUM: &str = "minimum temperature";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemperatureKind {
    Maximum,
    Minimum,
}

#[derive(Debug)]
struct TemperatureSeries {
    unit: TemperatureUnit,
    values: Vec<Option<i32>>,
}

/// Where the pending text of the current element should go.
#[derive(Debug)]
enum Capture {
    Value(String),
    IconLink(String),
    StartTime(String),
}

#[derive(Debug, Default)]
struct Collector {
    stack: Vec<String>,
    current_temperature: Option<TemperatureKind>,
    highs: Option<TemperatureSeries>,
    lows: Option<TemperatureSeries>,
    conditions: Vec<String>,
    icons: Vec<String>,
    start_time: Option<String>,
    capture: Option<Capture>,
}

/// Parse an NDFD `NDFDgenByDay` response into a reading of `num_days` days.
pub fn parse_forecast(xml: &[u8], num_days: usize) -> Result<WeatherReading, ParseError> {
    let text = std::str::from_utf8(xml).map_err(|e| ParseError::Encoding(e.valid_up_to()))?;

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut collector = Collector::default();

    loop {
        let event = reader.read_event().map_err(|e| ParseError::Xml {
            position: reader.error_position(),
            message: e.to_string(),
        })?;
        let xml_err = |message: String| ParseError::Xml {
            position: reader.buffer_position(),
            message,
        };

        match event {
            Event::DocType(_) => return Err(ParseError::DoctypeForbidden),
            Event::Start(e) => collector.open(&e, false).map_err(xml_err)?,
            Event::Empty(e) => collector.open(&e, true).map_err(xml_err)?,
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| xml_err(e.to_string()))?;
                collector.text(&text);
            }
            Event::CData(e) => {
                let text = std::str::from_utf8(e.as_ref()).map_err(|e| xml_err(e.to_string()))?;
                collector.text(text);
            }
            Event::End(_) => collector.close()?,
            Event::Eof => {
                if let Some(open) = collector.stack.last() {
                    return Err(xml_err(format!("document ends inside <{open}>")));
                }
                break;
            }
            _ => {}
        }
    }

    collector.finish(num_days)
}

impl Collector {
    fn parent_is(&self, name: &str) -> bool {
        self.stack.last().is_some_and(|top| top == name)
    }

    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> Result<(), String> {
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        match name.as_str() {
            "temperature" => {
                let kind = match attribute(e, "type")?.as_deref() {
                    Some("maximum") => Some(TemperatureKind::Maximum),
                    Some("minimum") => Some(TemperatureKind::Minimum),
                    _ => None,
                };
                let unit = attribute(e, "units")?
                    .map(|u| TemperatureUnit::from_ndfd(&u))
                    .unwrap_or(TemperatureUnit::Fahrenheit);

                // Only the first series of each kind counts.
                self.current_temperature = match kind {
                    Some(TemperatureKind::Maximum) if self.highs.is_none() => {
                        self.highs = Some(TemperatureSeries { unit, values: Vec::new() });
                        kind
                    }
                    Some(TemperatureKind::Minimum) if self.lows.is_none() => {
                        self.lows = Some(TemperatureSeries { unit, values: Vec::new() });
                        kind
                    }
                    _ => None,
                };
                if empty {
                    self.current_temperature = None;
                }
            }
            "value" if self.parent_is("temperature") => {
                if empty {
                    self.push_temperature(None);
                } else {
                    self.capture = Some(Capture::Value(String::new()));
                }
            }
            "weather-conditions" if self.parent_is("weather") => {
                let summary = attribute(e, "weather-summary")?.unwrap_or_default();
                self.conditions.push(summary);
            }
            "icon-link" if self.parent_is("conditions-icon") => {
                if empty {
                    self.icons.push(icon_token(""));
                } else {
                    self.capture = Some(Capture::IconLink(String::new()));
                }
            }
            "start-valid-time" if self.start_time.is_none() && !empty => {
                self.capture = Some(Capture::StartTime(String::new()));
            }
            _ => {}
        }

        if !empty {
            self.stack.push(name);
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        match &mut self.capture {
            Some(Capture::Value(buf) | Capture::IconLink(buf) | Capture::StartTime(buf)) => {
                buf.push_str(text)
            }
            None => {}
        }
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let name = self.stack.pop().unwrap_or_default();

        match (name.as_str(), self.capture.take()) {
            ("value", Some(Capture::Value(raw))) => {
                let raw = raw.trim();
                if raw.is_empty() {
                    self.push_temperature(None);
                } else {
                    let degrees = raw
                        .parse::<i32>()
                        .map_err(|_| ParseError::InvalidTemperature(raw.to_string()))?;
                    self.push_temperature(Some(degrees));
                }
            }
            ("icon-link", Some(Capture::IconLink(link))) => self.icons.push(icon_token(&link)),
            ("start-valid-time", Some(Capture::StartTime(raw))) => {
                self.start_time = Some(raw.trim().to_string())
            }
            ("temperature", _) => self.current_temperature = None,
            (_, pending) => self.capture = pending,
        }
        Ok(())
    }

    fn push_temperature(&mut self, value: Option<i32>) {
        let series = match self.current_temperature {
            Some(TemperatureKind::Maximum) => self.highs.as_mut(),
            Some(TemperatureKind::Minimum) => self.lows.as_mut(),
            None => None,
        };
        if let Some(series) = series {
            series.values.push(value);
        }
    }

    fn finish(self, num_days: usize) -> Result<WeatherReading, ParseError> {
        let raw_start = self.start_time.ok_or(ParseError::MissingField("start-valid-time"))?;
        let starts_on = raw_start
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .ok_or_else(|| ParseError::InvalidDate(raw_start.clone()))?;

        let highs = series_values(self.highs, MAXIMUM, num_days)?;
        let lows = series_values(self.lows, MINIMUM, num_days)?;

        let mut conditions = self.conditions.into_iter();
        let mut icons = self.icons.into_iter();

        let days = highs
            .into_iter()
            .zip(lows)
            .map(|(high, low)| DailyForecast {
                high,
                low,
                condition: conditions.next().unwrap_or_default(),
                icon: icons.next().unwrap_or_else(|| icon_token("")),
            })
            .collect::<Vec<_>>();

        debug!(%starts_on, days = days.len(), "parsed forecast");

        Ok(WeatherReading { starts_on, days })
    }
}

fn series_values(
    series: Option<TemperatureSeries>,
    field: &'static str,
    num_days: usize,
) -> Result<Vec<Temperature>, ParseError> {
    let series = series.ok_or(ParseError::MissingField(field))?;

    if series.values.len() < num_days {
        return Err(ParseError::Incomplete {
            field,
            expected: num_days,
            found: series.values.len(),
        });
    }

    series
        .values
        .into_iter()
        .take(num_days)
        .enumerate()
        .map(|(i, v)| {
            v.map(|degrees| Temperature { degrees, unit: series.unit })
                .ok_or(ParseError::NilValue { field, day: i + 1 })
        })
        .collect()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, String> {
    match e.try_get_attribute(name).map_err(|err| err.to_string())? {
        Some(attr) => {
            let value = attr.unescape_value().map_err(|err| err.to_string())?;
            Ok(Some(value.into_owned()))
        }
        None => Ok(None),
    }
}

/// `https://.../fcicons/nra30.jpg` → `nra`. Blank links map to `na`.
fn icon_token(link: &str) -> String {
    let file = link.trim().rsplit('/').next().unwrap_or_default();
    let stem = file.split('.').next().unwrap_or_default();
    let token = stem.trim_end_matches(|c: char| c.is_ascii_digit()).to_lowercase();

    if token.is_empty() { "na".to_string() } else { token }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = include_str!("../tests/fixtures/ndfd_by_day.xml");

    #[test]
    fn parses_fixture() {
        let reading = parse_forecast(FIXTURE.as_bytes(), 4).expect("fixture parses");

        assert_eq!(reading.starts_on, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        assert_eq!(reading.days.len(), 4);

        let highs: Vec<i32> = reading.days.iter().map(|d| d.high.degrees).collect();
        let lows: Vec<i32> = reading.days.iter().map(|d| d.low.degrees).collect();
        let icons: Vec<&str> = reading.days.iter().map(|d| d.icon.as_str()).collect();

        assert_eq!(highs, [72, 80, 77, 68]);
        assert_eq!(lows, [55, 61, 60, 52]);
        assert_eq!(icons, ["sct", "tsra", "ra", "few"]);
        assert_eq!(reading.days[0].condition, "Partly Sunny");
        assert_eq!(reading.days[1].condition, "T-storms & Rain");
        assert_eq!(reading.days[0].high.to_string(), "72°F");
    }

    #[test]
    fn fewer_days_than_available_is_fine() {
        let reading = parse_forecast(FIXTURE.as_bytes(), 2).unwrap();
        assert_eq!(reading.days.len(), 2);
    }

    #[test]
    fn more_days_than_available_is_incomplete() {
        let err = parse_forecast(FIXTURE.as_bytes(), 5).unwrap_err();
        assert_eq!(err, ParseError::Incomplete { field: MAXIMUM, expected: 5, found: 4 });
    }

    #[test]
    fn rejects_external_entity_declaration() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE dwml [ <!ENTITY xxe SYSTEM "file:///etc/passwd"> ]>
<dwml><data><time-layout><start-valid-time>&xxe;</start-valid-time></time-layout></data></dwml>"#;

        let err = parse_forecast(xml.as_bytes(), 1).unwrap_err();
        assert_eq!(err, ParseError::DoctypeForbidden);
    }

    #[test]
    fn rejects_entity_expansion_bomb() {
        let xml = r#"<!DOCTYPE lolz [<!ENTITY lol "lol"><!ENTITY lol2 "&lol;&lol;&lol;">]>
<dwml>&lol2;</dwml>"#;
        assert_eq!(parse_forecast(xml.as_bytes(), 1).unwrap_err(), ParseError::DoctypeForbidden);
    }

    #[test]
    fn undeclared_entity_is_an_error_not_a_lookup() {
        let xml = "<dwml><data><time-layout><start-valid-time>&xxe;</start-valid-time>\
                   </time-layout></data></dwml>";
        let err = parse_forecast(xml.as_bytes(), 1).unwrap_err();
        assert!(matches!(err, ParseError::Xml { .. }), "got {err:?}");
    }

    #[test]
    fn missing_start_time_is_an_error() {
        let xml = FIXTURE.replace("start-valid-time", "other-time");
        let err = parse_forecast(xml.as_bytes(), 4).unwrap_err();
        assert_eq!(err, ParseError::MissingField("start-valid-time"));
    }

    #[test]
    fn missing_minimum_series_is_an_error() {
        let xml = FIXTURE.replace(r#"type="minimum""#, r#"type="dew point""#);
        let err = parse_forecast(xml.as_bytes(), 4).unwrap_err();
        assert_eq!(err, ParseError::MissingField(MINIMUM));
    }

    #[test]
    fn nil_temperature_is_an_error() {
        let xml = FIXTURE.replace("<value>80</value>", r#"<value xsi:nil="true"/>"#);
        let err = parse_forecast(xml.as_bytes(), 4).unwrap_err();
        assert_eq!(err, ParseError::NilValue { field: MAXIMUM, day: 2 });
    }

    #[test]
    fn non_numeric_temperature_is_an_error() {
        let xml = FIXTURE.replace("<value>80</value>", "<value>hot</value>");
        let err = parse_forecast(xml.as_bytes(), 4).unwrap_err();
        assert_eq!(err, ParseError::InvalidTemperature("hot".into()));
    }

    #[test]
    fn mismatched_end_tag_is_an_error() {
        let truncated = &FIXTURE[..FIXTURE.len() / 2];
        let xml = format!("{truncated}</wrong>");
        assert!(matches!(parse_forecast(xml.as_bytes(), 4), Err(ParseError::Xml { .. })));
    }

    #[test]
    fn truncated_document_is_an_error() {
        let end = FIXTURE.find("</parameters>").unwrap() + "</parameters>".len();
        let err = parse_forecast(FIXTURE[..end].as_bytes(), 4).unwrap_err();
        assert!(
            matches!(err, ParseError::Xml { ref message, .. } if message.contains("<data>")),
            "got {err:?}"
        );
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        let err = parse_forecast(&[b'<', 0xff, 0xfe], 1).unwrap_err();
        assert_eq!(err, ParseError::Encoding(1));
    }

    #[test]
    fn missing_icons_default_to_na() {
        let xml = FIXTURE.replace("icon-link", "icon-href");
        let reading = parse_forecast(xml.as_bytes(), 4).unwrap();
        assert!(reading.days.iter().all(|d| d.icon == "na"));
    }

    #[test]
    fn icon_token_normalisation() {
        assert_eq!(icon_token("https://forecast.weather.gov/images/wtf/nra30.jpg"), "nra");
        assert_eq!(icon_token("http://x/y/SCT.png"), "sct");
        assert_eq!(icon_token("  few  "), "few");
        assert_eq!(icon_token(""), "na");
        assert_eq!(icon_token("http://x/y/40.jpg"), "na");
        // left for the allowlist to reject
        assert_eq!(icon_token("http://x/\"><script>.jpg"), "\"><script>");
    }
}
