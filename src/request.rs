use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_PATH: &str = "output.pdf";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("unknown paper format '{0}' (expected one of: {formats})", formats = PaperFormat::names())]
    UnknownFormat(String),
    #[error("failed to parse length '{0}'")]
    InvalidLength(String),
}

pub type Result<T> = std::result::Result<T, RequestError>;

/// Paper presets understood by the renderer, sizes in inches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaperFormat {
    Letter,
    Legal,
    Tabloid,
    Ledger,
    A0,
    A1,
    A2,
    A3,
    #[default]
    A4,
    A5,
    A6,
}

impl PaperFormat {
    pub const ALL: [PaperFormat; 11] = [
        PaperFormat::Letter,
        PaperFormat::Legal,
        PaperFormat::Tabloid,
        PaperFormat::Ledger,
        PaperFormat::A0,
        PaperFormat::A1,
        PaperFormat::A2,
        PaperFormat::A3,
        PaperFormat::A4,
        PaperFormat::A5,
        PaperFormat::A6,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PaperFormat::Letter => "Letter",
            PaperFormat::Legal => "Legal",
            PaperFormat::Tabloid => "Tabloid",
            PaperFormat::Ledger => "Ledger",
            PaperFormat::A0 => "A0",
            PaperFormat::A1 => "A1",
            PaperFormat::A2 => "A2",
            PaperFormat::A3 => "A3",
            PaperFormat::A4 => "A4",
            PaperFormat::A5 => "A5",
            PaperFormat::A6 => "A6",
        }
    }

    /// (width, height) in inches.
    pub fn size_inches(&self) -> (f64, f64) {
        match self {
            PaperFormat::Letter => (8.5, 11.0),
            PaperFormat::Legal => (8.5, 14.0),
            PaperFormat::Tabloid => (11.0, 17.0),
            PaperFormat::Ledger => (17.0, 11.0),
            PaperFormat::A0 => (33.1, 46.8),
            PaperFormat::A1 => (23.4, 33.1),
            PaperFormat::A2 => (16.54, 23.4),
            PaperFormat::A3 => (11.7, 16.54),
            PaperFormat::A4 => (8.27, 11.7),
            PaperFormat::A5 => (5.83, 8.27),
            PaperFormat::A6 => (4.13, 5.83),
        }
    }

    fn names() -> String {
        Self::ALL
            .iter()
            .map(|f| f.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for PaperFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| RequestError::UnknownFormat(s.to_string()))
    }
}

impl fmt::Display for PaperFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A CSS-style length such as `2cm`, `0.5in`, `12mm`, `40px` or `40`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Length {
    inches: f64,
}

impl Length {
    const PIXELS_PER_INCH: f64 = 96.0;

    pub fn inches(&self) -> f64 {
        self.inches
    }

    fn pixels_per_unit(unit: &str) -> Option<f64> {
        match unit {
            "px" => Some(1.0),
            "in" => Some(96.0),
            "cm" => Some(37.8),
            "mm" => Some(3.78),
            _ => None,
        }
    }
}

impl FromStr for Length {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();

        // A unit is always two ASCII letters; anything else is a bare pixel count.
        let (value, per_unit) = match text.len().checked_sub(2) {
            Some(split) if text.is_char_boundary(split) => {
                let unit = text[split..].to_ascii_lowercase();
                match Self::pixels_per_unit(&unit) {
                    Some(px) => (&text[..split], px),
                    None => (text, 1.0),
                }
            }
            _ => (text, 1.0),
        };

        // a missing number counts as zero, so "" and "cm" are both 0
        let value = value.trim();
        let value: f64 = if value.is_empty() {
            0.0
        } else {
            value
                .parse()
                .map_err(|_| RequestError::InvalidLength(s.to_string()))?
        };

        if !value.is_finite() {
            return Err(RequestError::InvalidLength(s.to_string()));
        }

        Ok(Self {
            inches: value * per_unit / Self::PIXELS_PER_INCH,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: "2cm".to_string(),
            right: "1cm".to_string(),
            bottom: "2cm".to_string(),
            left: "1cm".to_string(),
        }
    }
}

/// Everything one conversion needs, built once from the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionRequest {
    pub html: String,
    pub format: PaperFormat,
    pub margins: Margins,
    pub path: PathBuf,
}

impl ConversionRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            format: PaperFormat::default(),
            margins: Margins::default(),
            path: PathBuf::from(DEFAULT_PATH),
        }
    }
}
