//! Event shapes accepted from the scanner.
//!
//! Each struct is both the JSON body of an inbound request and the payload of
//! the matching [`ScanEvent`] variant.

use serde::{Deserialize, Deserializer, Serialize};

/// Body of `PUT /v1/scan/start`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStart {
    /// Identifier echoed in every downstream payload of this scan
    pub algorithm_id: String,

    /// Slide being scanned
    pub slide_name: String,

    /// Stain applied to the slide (e.g. "H&E")
    pub stain_name: String,

    /// Tissue of origin
    pub organ_name: String,

    /// Width in pixels of each submitted tile
    #[serde(deserialize_with = "lenient_i64")]
    pub tile_width: i64,

    /// Height in pixels of each submitted tile
    #[serde(deserialize_with = "lenient_i64")]
    pub tile_height: i64,

    /// Directory the scanner expects algorithm output in
    pub path_to_output: String,
}

/// Body of `POST /v1/scan/image-tile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSubmitted {
    pub slide_name: String,
    pub tile_name: String,

    /// Filesystem path of the tile image, as seen by this process
    pub tile_image_path: String,

    #[serde(deserialize_with = "lenient_i64")]
    pub row_idx: i64,

    #[serde(deserialize_with = "lenient_i64")]
    pub col_idx: i64,
}

/// Body of `PUT /v1/scan/end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEnd {
    pub slide_name: String,
}

/// Body of `PUT /v1/scan/abort`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanAbort {
    pub slide_name: String,
}

/// One step of a scan's lifecycle, as queued for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    Start(ScanStart),
    Tile(TileSubmitted),
    End(ScanEnd),
    Abort(ScanAbort),
}

impl ScanEvent {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::Start(_) => "start",
            ScanEvent::Tile(_) => "tile",
            ScanEvent::End(_) => "end",
            ScanEvent::Abort(_) => "abort",
        }
    }

    /// Slide named by the event.
    pub fn slide_name(&self) -> &str {
        match self {
            ScanEvent::Start(e) => &e.slide_name,
            ScanEvent::Tile(e) => &e.slide_name,
            ScanEvent::End(e) => &e.slide_name,
            ScanEvent::Abort(e) => &e.slide_name,
        }
    }
}

impl From<ScanStart> for ScanEvent {
    fn from(event: ScanStart) -> Self {
        ScanEvent::Start(event)
    }
}

impl From<TileSubmitted> for ScanEvent {
    fn from(event: TileSubmitted) -> Self {
        ScanEvent::Tile(event)
    }
}

impl From<ScanEnd> for ScanEvent {
    fn from(event: ScanEnd) -> Self {
        ScanEvent::End(event)
    }
}

impl From<ScanAbort> for ScanEvent {
    fn from(event: ScanAbort) -> Self {
        ScanEvent::Abort(event)
    }
}

/// Accept integers sent as JSON numbers (including whole floats like `3.0`)
/// or numeric strings.
///
/// Scanners derive tile indices from file names and frequently send them as
/// strings (`"row_idx": "1192"`).
fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        Float(f64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        NumberOrString::Float(f) => Err(serde::de::Error::custom(format!(
            "expected an integer, got {}",
            f
        ))),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got '{}'", s))),
    }
}
