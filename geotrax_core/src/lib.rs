#![forbid(unsafe_code)]

//! The engine behind a GPS data manager: track/route/waypoint model and
//! analytics, DEM elevation services, and the acquire pipeline that
//! pulls data in from files, URLs, devices and external converters.

pub mod acquire;
pub mod analytics;
pub mod babel;
pub mod bbox;
pub mod coord;
pub mod dem;
pub mod download;
mod error;
pub mod gpx_writer;
pub mod progress;
pub mod read;
pub mod track;
pub mod trw;
pub mod waypoint;

pub use error::GeotraxError;
