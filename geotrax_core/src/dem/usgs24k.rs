//! USGS 24K text DEM parsing. The file is a stream of 1024-byte records:
//! one class-A header, then class-B column headers and continuation
//! records. FORTRAN `D` exponent markers are rewritten to `E` before any
//! numeric parsing.

use std::fs;
use std::path::Path;
use std::str::SplitWhitespace;

use log::info;
use logging_timer::time;

use super::{Dem, DemColumn, DemHorizontalUnit, DemVerticalUnit};
use crate::error::GeotraxError;

const DEM_BLOCK_SIZE: usize = 1024;

/// Whitespace-separated numeric fields of one record.
struct Tokens<'a> {
    iter: SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            iter: text.split_whitespace(),
        }
    }

    fn next_f64(&mut self) -> Option<f64> {
        self.iter.next().and_then(|t| t.parse().ok())
    }

    fn next_i64(&mut self) -> Option<i64> {
        self.iter.next().and_then(|t| t.parse().ok())
    }
}

fn fix_exponentiation(block: &[u8]) -> String {
    String::from_utf8_lossy(block).replace('D', "E")
}

fn parse_header(text: &str) -> Result<Dem, GeotraxError> {
    let miss = |what: &str| GeotraxError::DemHeader(format!("missing {what}"));

    // The first 144 bytes are the quadrangle name, followed by filler.
    let after_name = text.get(149..).ok_or_else(|| miss("header fields"))?;
    let mut tokens = Tokens::new(after_name);

    // DEM level code, pattern code, planimetric reference system: unused.
    for what in ["level code", "pattern code", "planimetric reference"] {
        tokens.next_i64().ok_or_else(|| miss(what))?;
    }

    let zone = tokens.next_i64().ok_or_else(|| miss("zone"))?;

    // Fields 5-19 are projection parameters we do not use.
    for _ in 0..15 {
        tokens.next_f64().ok_or_else(|| miss("projection parameter"))?;
    }

    let horiz_code = tokens.next_f64().ok_or_else(|| miss("horizontal unit code"))?;
    let horiz_units = match horiz_code as i64 {
        2 => DemHorizontalUnit::UtmMeters,
        3 => DemHorizontalUnit::LatLonArcSeconds,
        other => {
            return Err(GeotraxError::DemHeader(format!(
                "unsupported horizontal unit code {other}"
            )))
        }
    };
    tokens.next_f64().ok_or_else(|| miss("vertical unit code"))?;

    // These spacings hold for the 1:24k and 1:250k USGS series, which is
    // all this parser takes on.
    let (scale, orig_vert_units) = match horiz_units {
        DemHorizontalUnit::UtmMeters => (10.0, DemVerticalUnit::Decimeters),
        DemHorizontalUnit::LatLonArcSeconds => (3.0, DemVerticalUnit::Meters),
    };

    tokens.next_f64().ok_or_else(|| miss("filler"))?;

    // Four corner points; their min/max give the extent.
    let east = tokens.next_f64().ok_or_else(|| miss("corner east"))?;
    let north = tokens.next_f64().ok_or_else(|| miss("corner north"))?;
    let (mut min_east, mut max_east) = (east, east);
    let (mut min_north, mut max_north) = (north, north);
    for _ in 0..3 {
        let east = tokens.next_f64().ok_or_else(|| miss("corner east"))?;
        let north = tokens.next_f64().ok_or_else(|| miss("corner north"))?;
        min_east = min_east.min(east);
        max_east = max_east.max(east);
        min_north = min_north.min(north);
        max_north = max_north.max(north);
    }

    let is_utm = horiz_units == DemHorizontalUnit::UtmMeters;
    Ok(Dem {
        horiz_units,
        orig_vert_units,
        scale_x: scale,
        scale_y: scale,
        min_east,
        max_east,
        min_north,
        max_north,
        utm_zone: is_utm.then_some(zone as u8),
        // The header does not record the hemisphere; assume north.
        utm_band: is_utm.then_some('N'),
        columns: Vec::new(),
    })
}

/// `1 x n_rows 1 east_west south x x x DATA...`
fn parse_block_as_header(
    tokens: &mut Tokens<'_>,
    dem: &mut Dem,
    cur_row: &mut Option<usize>,
) -> Result<(), GeotraxError> {
    let miss = |what: &str| GeotraxError::DemColumnRecord(format!("missing {what}"));

    let record_type = tokens.next_f64().ok_or_else(|| miss("record type"))?;
    if record_type != 1.0 {
        return Err(GeotraxError::DemColumnRecord(format!(
            "class-B record type {record_type}, expected 1"
        )));
    }
    tokens.next_f64().ok_or_else(|| miss("filler"))?;
    let n_rows = tokens.next_f64().ok_or_else(|| miss("n_rows"))? as usize;
    let ones = tokens.next_f64().ok_or_else(|| miss("column count"))?;
    if ones != 1.0 {
        return Err(GeotraxError::DemColumnRecord(format!(
            "class-B column count {ones}, expected 1"
        )));
    }
    let east_west = tokens.next_f64().ok_or_else(|| miss("easting"))?;
    let south = tokens.next_f64().ok_or_else(|| miss("southing"))?;
    for _ in 0..3 {
        tokens.next_f64().ok_or_else(|| miss("filler"))?;
    }

    // Rows below the column's first sample hold no data.
    let mut first_row = ((south - dem.min_north) / dem.scale_y).floor() as i64;
    if south > dem.max_north || first_row < 0 {
        first_row = 0;
    }
    let first_row = first_row as usize;

    let points = vec![Dem::INVALID_ELEVATION; n_rows + first_row];
    dem.columns.push(DemColumn {
        east: east_west,
        south,
        points,
    });

    *cur_row = Some(first_row);
    parse_block_as_cont(tokens, dem, cur_row);
    Ok(())
}

fn parse_block_as_cont(tokens: &mut Tokens<'_>, dem: &mut Dem, cur_row: &mut Option<usize>) {
    let Some(mut row) = *cur_row else {
        return;
    };
    let decimeters = dem.orig_vert_units == DemVerticalUnit::Decimeters;
    let Some(column) = dem.columns.last_mut() else {
        return;
    };

    while row < column.points.len() {
        match tokens.next_i64() {
            Some(value) => {
                column.points[row] = if decimeters {
                    (value / 10) as i16
                } else {
                    value as i16
                };
                row += 1;
            }
            None => {
                // Record exhausted mid-column; the next one continues it.
                *cur_row = Some(row);
                return;
            }
        }
    }
    // Column complete, expecting a new column header next.
    *cur_row = None;
}

#[time]
pub(super) fn read_24k(path: &Path) -> Result<Dem, GeotraxError> {
    info!("Reading USGS 24K DEM {:?}", path);
    let bytes = fs::read(path)?;
    if bytes.len() < DEM_BLOCK_SIZE {
        return Err(GeotraxError::DemHeader("truncated file".to_string()));
    }

    let header_text = fix_exponentiation(&bytes[..DEM_BLOCK_SIZE]);
    let mut dem = parse_header(&header_text)?;

    let mut cur_row: Option<usize> = None;
    for block in bytes[DEM_BLOCK_SIZE..].chunks(DEM_BLOCK_SIZE) {
        let text = fix_exponentiation(block);
        let mut tokens = Tokens::new(&text);
        if dem.columns.is_empty() || cur_row.is_none() {
            parse_block_as_header(&mut tokens, &mut dem, &mut cur_row)?;
        } else {
            parse_block_as_cont(&mut tokens, &mut dem, &mut cur_row);
        }
    }

    // The header's nominal spacing loses to the observed column spacing.
    if dem.horiz_units == DemHorizontalUnit::UtmMeters && dem.columns.len() >= 2 {
        dem.scale_x = dem.columns[1].east - dem.columns[0].east;
        dem.scale_y = dem.scale_x;
    }

    // Long-standing origin offset in the 10 m DEM series, kept for
    // compatibility with existing files.
    if dem.horiz_units == DemHorizontalUnit::UtmMeters && dem.scale_y == 10.0 {
        dem.min_east -= 100.0;
        dem.min_north += 200.0;
    }

    Ok(dem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad_block(text: &str) -> Vec<u8> {
        let mut block = text.as_bytes().to_vec();
        assert!(block.len() <= DEM_BLOCK_SIZE);
        block.resize(DEM_BLOCK_SIZE, b' ');
        block
    }

    fn header_block(horiz_code: i32, corners: &str) -> Vec<u8> {
        let mut text = " ".repeat(149);
        // level, pattern, planimetric, zone.
        text.push_str("1 1 1 11 ");
        // 15 projection parameters.
        text.push_str(&"0.0 ".repeat(15));
        // horizontal unit, vertical unit, filler, corners.
        text.push_str(&format!("{horiz_code} 2 0.0 {corners}"));
        pad_block(&text)
    }

    fn latlon_file(blocks: &[&str]) -> Vec<u8> {
        let mut bytes = header_block(3, "0.0 0.0 0.0 6.0 6.0 6.0 6.0 0.0");
        for b in blocks {
            bytes.extend(pad_block(b));
        }
        bytes
    }

    fn read_bytes(bytes: &[u8]) -> Result<Dem, GeotraxError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q1234.dem");
        fs::write(&path, bytes).unwrap();
        read_24k(&path)
    }

    #[test]
    fn two_column_latlon_grid() {
        let dem = read_bytes(&latlon_file(&[
            "1 0 3 1 0.0 0.0 0 0 0 10 11 12",
            "1 0 3 1 3.0 0.0 0 0 0 20 21 22",
        ]))
        .unwrap();

        assert_eq!(dem.horiz_units, DemHorizontalUnit::LatLonArcSeconds);
        assert_eq!(dem.n_columns(), 2);
        assert_eq!(dem.scale_x, 3.0);
        assert_eq!(dem.columns[0].points, vec![10, 11, 12]);
        assert_eq!(dem.columns[1].points, vec![20, 21, 22]);
        assert_eq!(dem.min_east, 0.0);
        assert_eq!(dem.max_north, 6.0);
    }

    #[test]
    fn column_continues_across_records() {
        let dem = read_bytes(&latlon_file(&[
            "1 0 3 1 0.0 0.0 0 0 0 10",
            "11 12",
            "1 0 3 1 3.0 0.0 0 0 0 20 21 22",
        ]))
        .unwrap();
        assert_eq!(dem.columns[0].points, vec![10, 11, 12]);
        assert_eq!(dem.columns[1].points, vec![20, 21, 22]);
    }

    #[test]
    fn short_column_is_padded_with_sentinel() {
        let dem = read_bytes(&latlon_file(&[
            // South edge at northing 3: one leading no-data row.
            "1 0 2 1 0.0 3.0 0 0 0 11 12",
        ]))
        .unwrap();
        assert_eq!(
            dem.columns[0].points,
            vec![Dem::INVALID_ELEVATION, 11, 12]
        );
    }

    #[test]
    fn bad_class_b_marker_aborts() {
        let err = read_bytes(&latlon_file(&["2 0 3 1 0.0 0.0 0 0 0 10 11 12"]));
        assert!(matches!(err, Err(GeotraxError::DemColumnRecord(_))));
    }

    #[test]
    fn fortran_exponents_are_rewritten() {
        let dem = read_bytes(&latlon_file(&["1 0 3 1 0.0D0 0.0D0 0 0 0 10 11 12"])).unwrap();
        assert_eq!(dem.columns[0].east, 0.0);
    }

    #[test]
    fn utm_ten_metre_grid_gets_origin_correction_and_decimeters() {
        let mut bytes = header_block(
            2,
            "1000.0 2000.0 1000.0 2030.0 1020.0 2030.0 1020.0 2000.0",
        );
        for b in [
            "1 0 3 1 1000.0 2000.0 0 0 0 100 110 120",
            "1 0 3 1 1010.0 2000.0 0 0 0 200 210 220",
        ] {
            bytes.extend(pad_block(b));
        }
        let dem = read_bytes(&bytes).unwrap();

        assert_eq!(dem.horiz_units, DemHorizontalUnit::UtmMeters);
        assert_eq!(dem.utm_zone, Some(11));
        assert_eq!(dem.scale_x, 10.0);
        // Decimetre inputs arrive as metres.
        assert_eq!(dem.columns[0].points, vec![10, 11, 12]);
        // The 10 m series origin shift.
        assert_eq!(dem.min_east, 1000.0 - 100.0);
        assert_eq!(dem.min_north, 2000.0 + 200.0);
    }
}
