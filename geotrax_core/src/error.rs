use std::{num::TryFromIntError, path::PathBuf};

use quick_xml::encoding::EncodingError;
use quick_xml::events::attributes::AttrError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeotraxError {
    #[error(transparent)]
    XmlError(#[from] quick_xml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error("Mandatory attribute {0} was not found on the element")]
    MandatoryAttributeNotFound(String),
    #[error("Could not parse {from} into type {dest_type}")]
    ParseFailure { from: String, dest_type: String },
    #[error("Unexpected Start element {0}")]
    UnexpectedStartElement(String),
    #[error("Did not find the {0} element")]
    ElementNotFound(String),
    #[error("Did not find an Event::Text element, buffer position = {0}, event={1}")]
    MissingText(u64, String),
    #[error("Date could not be parsed: {0}")]
    DateParseFailure(String),
    #[error("{0} is not a valid fix type. Valid values are 'none', '2d', '3d', 'dgps', 'pps'")]
    InvalidFixType(String),
    #[error("Invalid latitude of {0}. Valid range is -90.0..=90.0")]
    InvalidLatitude(f64),
    #[error("Invalid longitude of {0}. Valid range is -180.0..=180.0")]
    InvalidLongitude(f64),
    #[error("Unexpected event received from Xml parser: {0}")]
    UnexpectedEvent(String),
    #[error("Unexpected EOF. Check file for corruption")]
    UnexpectedEof,
    #[error("Could not create file {path:?}")]
    CreateFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not perform a numeric conversion: {0}")]
    NumericConversionError(String),

    #[error("{0:?} is not recognized as a DEM file")]
    UnrecognizedDemFile(PathBuf),
    #[error("DEM file {path:?} has unexpected size of {size} bytes")]
    DemWrongSize { path: PathBuf, size: u64 },
    #[error("Malformed DEM header: {0}")]
    DemHeader(String),
    #[error("Malformed DEM column record: {0}")]
    DemColumnRecord(String),

    #[error("gpsbabel was not found (looked for {0:?})")]
    BabelNotFound(PathBuf),
    #[error("Child process failed: {0}")]
    ChildProcess(String),
    #[error("Download of {url} failed with HTTP status {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("An existing target layer is required for this acquisition mode")]
    TargetLayerRequired,
}

impl From<AttrError> for GeotraxError {
    fn from(value: AttrError) -> Self {
        Self::XmlError(value.into())
    }
}

impl From<EncodingError> for GeotraxError {
    fn from(value: EncodingError) -> Self {
        Self::XmlError(value.into())
    }
}

impl From<TryFromIntError> for GeotraxError {
    fn from(value: TryFromIntError) -> Self {
        Self::NumericConversionError(value.to_string())
    }
}
