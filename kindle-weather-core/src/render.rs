use chrono::{Datelike, Days, Weekday};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path, path::PathBuf, str::FromStr};
use thiserror::Error;
use tracing::debug;

use crate::allowlist::ValidatedReading;

const BUILTIN_TEMPLATE: &str = include_str!("../assets/weather-template.svg");

/// Placeholder suffix for each day, first day first.
const DAY_WORDS: [&str; 7] = ["ONE", "TWO", "THREE", "FOUR", "FIVE", "SIX", "SEVEN"];

const PLACEHOLDER_KINDS: [&str; 5] = ["ICON", "HIGH", "LOW", "CONDITION", "DAY"];

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to read SVG template: {path}")]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("SVG template has no '{0}' placeholder")]
    MissingPlaceholder(String),

    #[error("SVG template has a '{0}' placeholder but the forecast has no such day")]
    UnfilledPlaceholder(String),

    #[error("cannot render {0} days, the template supports at most 7")]
    TooManyDays(usize),

    #[error("forecast dates run past the supported calendar range")]
    DateOutOfRange,

    #[error("failed to rasterize SVG: {0}")]
    Rasterize(String),

    #[error("output format '{0}' is not supported by this build")]
    FormatUnsupported(OutputFormat),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Svg => "svg",
            OutputFormat::Png => "png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "svg" => Ok(OutputFormat::Svg),
            "png" => Ok(OutputFormat::Png),
            _ => Err(format!("Unknown output format '{s}'. Supported formats: svg, png.")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub format: OutputFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct Template {
    source: String,
}

impl Template {
    /// The portrait 600x800 layout shipped with the crate.
    pub fn builtin() -> Self {
        Self { source: BUILTIN_TEMPLATE.to_string() }
    }

    pub fn from_path(path: &Path) -> Result<Self, RenderError> {
        let source = fs::read_to_string(path)
            .map_err(|source| RenderError::Template { path: path.to_path_buf(), source })?;
        Ok(Self { source })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl From<String> for Template {
    fn from(source: String) -> Self {
        Self { source }
    }
}

#[derive(Debug, Clone)]
pub struct Renderer {
    template: Template,
    format: OutputFormat,
}

impl Renderer {
    pub fn new(template: Template, format: OutputFormat) -> Self {
        Self { template, format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn render(&self, reading: &ValidatedReading) -> Result<RenderedImage, RenderError> {
        let svg = self.render_svg(reading)?;

        let bytes = match self.format {
            OutputFormat::Svg => svg.into_bytes(),
            OutputFormat::Png => rasterize(&svg)?,
        };

        debug!(format = %self.format, bytes = bytes.len(), "rendered weather image");

        Ok(RenderedImage { format: self.format, bytes })
    }

    /// Fill the template. Every value is inserted in one pass, so text that
    /// happens to look like a placeholder is never expanded a second time.
    pub fn render_svg(&self, reading: &ValidatedReading) -> Result<String, RenderError> {
        let days = reading.days();
        if days.len() > DAY_WORDS.len() {
            return Err(RenderError::TooManyDays(days.len()));
        }

        let template = self.template.as_str();

        // A day the template lays out but the reading lacks would reach the
        // display as raw placeholder text.
        for word in &DAY_WORDS[days.len()..] {
            for kind in PLACEHOLDER_KINDS {
                let key = format!("{kind}_{word}");
                if template.contains(&key) {
                    return Err(RenderError::UnfilledPlaceholder(key));
                }
            }
        }

        let mut substitutions: Vec<(String, String)> = Vec::with_capacity(days.len() * 5);

        for (i, (day, word)) in days.iter().zip(DAY_WORDS).enumerate() {
            let date = reading
                .starts_on()
                .checked_add_days(Days::new(i as u64))
                .ok_or(RenderError::DateOutOfRange)?;

            let required = [
                (format!("ICON_{word}"), day.icon.as_str().to_string()),
                (format!("HIGH_{word}"), escape(day.high.to_string().as_str()).into_owned()),
                (format!("LOW_{word}"), escape(day.low.to_string().as_str()).into_owned()),
            ];
            for (key, value) in required {
                if !template.contains(&key) {
                    return Err(RenderError::MissingPlaceholder(key));
                }
                substitutions.push((key, value));
            }

            substitutions.push((
                format!("CONDITION_{word}"),
                escape(day.condition.as_str()).into_owned(),
            ));
            substitutions.push((format!("DAY_{word}"), weekday_name(date.weekday()).to_string()));
        }

        // Longest first so no key can shadow a longer one sharing its prefix.
        substitutions.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(substitute(template, &substitutions))
    }
}

fn substitute(template: &str, substitutions: &[(String, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while let Some(c) = rest.chars().next() {
        for (key, value) in substitutions {
            if rest.starts_with(key.as_str()) {
                out.push_str(value);
                rest = &rest[key.len()..];
                continue 'scan;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[cfg(feature = "png")]
fn rasterize(svg: &str) -> Result<Vec<u8>, RenderError> {
    use resvg::{tiny_skia, usvg};

    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree =
        usvg::Tree::from_str(svg, &options).map_err(|e| RenderError::Rasterize(e.to_string()))?;

    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| RenderError::Rasterize("SVG has an empty canvas".to_string()))?;
    pixmap.fill(tiny_skia::Color::WHITE);

    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    pixmap.encode_png().map_err(|e| RenderError::Rasterize(e.to_string()))
}

#[cfg(not(feature = "png"))]
fn rasterize(_svg: &str) -> Result<Vec<u8>, RenderError> {
    Err(RenderError::FormatUnsupported(OutputFormat::Png))
}
