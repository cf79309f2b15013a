//! SRTM HGT parsing. A `.hgt` file (possibly inside a `.zip`) is a bare
//! square array of 16-bit big-endian samples; the file *name* encodes the
//! south-west corner.

use std::io::{Cursor, Read};
use std::fs;
use std::path::Path;

use log::info;
use logging_timer::time;
use zip::ZipArchive;

use super::{Dem, DemColumn, DemHorizontalUnit, DemVerticalUnit};
use crate::error::GeotraxError;

const SECS_PER_DEGREE: f64 = 3600.0;
const NUM_ROWS_3SEC: usize = 1201;
const NUM_ROWS_1SEC: usize = 3601;

/// Decode an SRTM file name like `N41E056.hgt` or `S22W136.hgt.zip` into
/// the south-west corner `(min_north, min_east)` in arc-seconds. Anything
/// not matching the pattern is `None`.
pub(super) fn parse_hgt_name(name: &str) -> Option<(f64, f64)> {
    let bytes = name.as_bytes();
    if name.len() != "S01E006.hgt".len() && name.len() != "S01E006.hgt.zip".len() {
        return None;
    }
    if bytes[0] != b'N' && bytes[0] != b'S' {
        return None;
    }
    if bytes[3] != b'E' && bytes[3] != b'W' {
        return None;
    }
    let suffix = &name[7..];
    if suffix != ".hgt" && suffix != ".hgt.zip" {
        return None;
    }

    let lat: f64 = name[1..3].parse().ok()?;
    let lon: f64 = name[4..7].parse().ok()?;

    let mut min_north = lat * SECS_PER_DEGREE;
    if bytes[0] == b'S' {
        min_north = -min_north;
    }
    let mut min_east = lon * SECS_PER_DEGREE;
    if bytes[3] == b'W' {
        min_east = -min_east;
    }
    Some((min_north, min_east))
}

#[time]
pub(super) fn read_srtm(path: &Path) -> Result<Dem, GeotraxError> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| GeotraxError::UnrecognizedDemFile(path.to_owned()))?;
    let (min_north, min_east) = parse_hgt_name(name)
        .ok_or_else(|| GeotraxError::UnrecognizedDemFile(path.to_owned()))?;

    info!("Reading SRTM DEM {:?}", path);
    let raw = fs::read(path)?;

    let contents = if name.ends_with(".zip") {
        let mut archive = ZipArchive::new(Cursor::new(raw))?;
        let mut entry = archive.by_index(0)?;
        let mut decompressed = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut decompressed)?;
        decompressed
    } else {
        raw
    };

    // The number of samples decides whether this is the 1-arc-second or
    // the 3-arc-second dataset; users mix both in one directory, so the
    // file size is the only reliable signal.
    let arcsec = if contents.len() == NUM_ROWS_3SEC * NUM_ROWS_3SEC * 2 {
        3
    } else if contents.len() == NUM_ROWS_1SEC * NUM_ROWS_1SEC * 2 {
        1
    } else {
        return Err(GeotraxError::DemWrongSize {
            path: path.to_owned(),
            size: contents.len() as u64,
        });
    };

    let num_rows = if arcsec == 3 { NUM_ROWS_3SEC } else { NUM_ROWS_1SEC };
    let num_cols = num_rows;

    let mut columns: Vec<DemColumn> = (0..num_cols)
        .map(|col| DemColumn {
            east: min_east + f64::from(arcsec) * col as f64,
            south: min_north,
            points: vec![0; num_rows],
        })
        .collect();

    // Samples run west-to-east starting at the northern edge; the grid
    // stores them column-major with row 0 at the southern edge.
    let mut point = 0;
    for row in (0..num_rows).rev() {
        for column in columns.iter_mut() {
            column.points[row] =
                i16::from_be_bytes([contents[2 * point], contents[2 * point + 1]]);
            point += 1;
        }
    }

    Ok(Dem {
        horiz_units: DemHorizontalUnit::LatLonArcSeconds,
        orig_vert_units: DemVerticalUnit::Decimeters,
        scale_x: f64::from(arcsec),
        scale_y: f64::from(arcsec),
        min_east,
        max_east: min_east + 3600.0,
        min_north,
        max_north: min_north + 3600.0,
        utm_zone: None,
        utm_band: None,
        columns,
    })
}
