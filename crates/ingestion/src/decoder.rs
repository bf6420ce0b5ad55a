//! Scan decoders.
//!
//! Decoding is blocking work; the pipeline runs decoders on the blocking
//! thread pool.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use emissions_common::parse_instant;

use crate::error::DecodeError;
use crate::sample::{RawSample, Scan};

/// Reads the samples of one variable from a source file.
pub trait ScanDecoder: Send + Sync {
    fn decode(&self, path: &Path, variable: &str) -> Result<Scan, DecodeError>;
}

/// Decoder for comma-separated point dumps.
///
/// The first non-comment line is a header naming the columns `longitude`,
/// `latitude`, `timestamp`, `quality` and the measurement, either as `value`
/// or under the variable name. Other columns are ignored and fields may be
/// quoted. Blank lines and lines starting with `#` are skipped. Rows whose
/// measurement field is empty are masked: they are not samples, but the
/// scan reports how many there were.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextScanDecoder;

struct Columns {
    value: usize,
    longitude: usize,
    latitude: usize,
    timestamp: usize,
    quality: usize,
}

impl Columns {
    fn from_header(header: &StringRecord, variable: &str) -> Result<Self, DecodeError> {
        if header.iter().all(str::is_empty) {
            return Err(DecodeError::Header("file has no header".to_string()));
        }

        let names: Vec<String> = header.iter().map(str::to_ascii_lowercase).collect();

        let find = |wanted: &str| names.iter().position(|name| name == wanted);
        let require = |wanted: &str| {
            find(wanted).ok_or_else(|| DecodeError::Header(format!("missing column '{}'", wanted)))
        };

        let value = find(variable.to_ascii_lowercase().as_str())
            .or_else(|| find("value"))
            .ok_or_else(|| {
                DecodeError::Header(format!("missing column 'value' or '{}'", variable))
            })?;

        Ok(Self {
            value,
            longitude: require("longitude")?,
            latitude: require("latitude")?,
            timestamp: require("timestamp")?,
            quality: require("quality")?,
        })
    }
}

impl TextScanDecoder {
    /// Decode dump text that was already read into memory.
    pub fn decode_str(&self, text: &str, variable: &str) -> Result<Scan, DecodeError> {
        self.decode_reader(text.as_bytes(), variable)
    }

    /// Decode a dump from any reader.
    pub fn decode_reader<R: Read>(&self, source: R, variable: &str) -> Result<Scan, DecodeError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .comment(Some(b'#'))
            .trim(Trim::All)
            .flexible(false)
            .from_reader(source);

        let header = reader
            .headers()
            .map_err(|e| DecodeError::Header(e.to_string()))?
            .clone();
        let columns = Columns::from_header(&header, variable)?;

        let mut samples = Vec::new();
        let mut masked = 0;
        for result in reader.records() {
            let record = result.map_err(|e| DecodeError::Record {
                line: e.position().map_or(0, |p| p.line() as usize),
                message: e.to_string(),
            })?;
            let line = record.position().map_or(0, |p| p.line() as usize);

            match parse_record(&columns, &record)
                .map_err(|message| DecodeError::Record { line, message })?
            {
                Some(sample) => samples.push(sample),
                None => masked += 1,
            }
        }

        Ok(Scan::with_masked(samples, masked))
    }
}

impl ScanDecoder for TextScanDecoder {
    fn decode(&self, path: &Path, variable: &str) -> Result<Scan, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.decode_reader(file, variable)
    }
}

fn parse_record(columns: &Columns, record: &StringRecord) -> Result<Option<RawSample>, String> {
    let field = |index: usize, name: &str| {
        record
            .get(index)
            .ok_or_else(|| format!("missing field '{}'", name))
    };

    let value = field(columns.value, "value")?;
    if value.is_empty() {
        return Ok(None);
    }
    let value = parse_float(value, "value")?;

    let longitude = parse_float(field(columns.longitude, "longitude")?, "longitude")?;
    let latitude = parse_float(field(columns.latitude, "latitude")?, "latitude")?;
    if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
        return Err(format!("coordinate ({}, {}) out of range", longitude, latitude));
    }

    let timestamp = parse_instant(field(columns.timestamp, "timestamp")?)
        .map_err(|e| e.to_string())?;

    let quality_field = field(columns.quality, "quality")?;
    let quality: u8 = quality_field
        .parse()
        .ok()
        .filter(|q| *q <= 100)
        .ok_or_else(|| format!("invalid quality '{}'", quality_field))?;

    Ok(Some(RawSample {
        value,
        longitude,
        latitude,
        timestamp,
        quality,
    }))
}

/// Finite float; `NaN` and infinities are rejected.
fn parse_float(text: &str, name: &str) -> Result<f64, String> {
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid {} '{}'", name, text))
}
