//! Digital Elevation Model storage and queries. Two on-disk formats
//! (SRTM HGT and USGS 24K) parse into the same column-major grid, which
//! answers elevation queries keyed by geodetic coordinates with a choice
//! of interpolations.

use std::path::Path;

use log::error;

use crate::bbox::LatLonBBox;
use crate::coord::{Coord, LatLon, Utm};
use crate::error::GeotraxError;

pub mod cache;
mod srtm;
mod usgs24k;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemHorizontalUnit {
    LatLonArcSeconds,
    UtmMeters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemVerticalUnit {
    Meters,
    Decimeters,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemInterpolation {
    None,
    /// Inverse-distance over the four surrounding grid nodes.
    Simple,
    /// Shepard's method (inverse squared distance) over the same nodes.
    #[default]
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemSourceType {
    Srtm,
    Unknown,
}

/// One column of samples at constant easting. Row `r` of `points` sits at
/// northing `south + r * scale_y`.
#[derive(Debug, Clone)]
pub struct DemColumn {
    pub east: f64,
    pub south: f64,
    pub points: Vec<i16>,
}

#[derive(Debug, Clone)]
pub struct Dem {
    pub horiz_units: DemHorizontalUnit,
    pub orig_vert_units: DemVerticalUnit,
    /// Sample spacing in horizontal units.
    pub scale_x: f64,
    pub scale_y: f64,
    /// Extent in horizontal units (arc-seconds or UTM metres).
    pub min_east: f64,
    pub max_east: f64,
    pub min_north: f64,
    pub max_north: f64,
    /// Only present for UTM grids.
    pub utm_zone: Option<u8>,
    pub utm_band: Option<char>,
    pub columns: Vec<DemColumn>,
}

impl Dem {
    /// Sentinel for "no data here".
    pub const INVALID_ELEVATION: i16 = i16::MIN;

    /// Detection is by file name only: `[NS]dd[EW]ddd.hgt[.zip]` is SRTM.
    /// Everything else needs an explicit parser choice by the caller.
    pub fn recognize_source_type(path: &Path) -> DemSourceType {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return DemSourceType::Unknown;
        };
        if srtm::parse_hgt_name(name).is_some() {
            DemSourceType::Srtm
        } else {
            DemSourceType::Unknown
        }
    }

    /// Load a DEM, picking the parser from the file name: SRTM-named
    /// files parse as HGT, anything else is tried as USGS 24K text.
    pub fn read_from_file(path: &Path) -> Result<Dem, GeotraxError> {
        match Self::recognize_source_type(path) {
            DemSourceType::Srtm => srtm::read_srtm(path),
            DemSourceType::Unknown => usgs24k::read_24k(path),
        }
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Raw grid access; anything out of range is the sentinel.
    pub fn elev_at_col_row(&self, col: i64, row: i64) -> i16 {
        if col < 0 || row < 0 {
            return Self::INVALID_ELEVATION;
        }
        let (col, row) = (col as usize, row as usize);
        match self.columns.get(col) {
            Some(column) => column.points.get(row).copied().unwrap_or(Self::INVALID_ELEVATION),
            None => Self::INVALID_ELEVATION,
        }
    }

    pub fn east_north_to_col_row(&self, east: f64, north: f64) -> (i64, i64) {
        (
            ((east - self.min_east) / self.scale_x).floor() as i64,
            ((north - self.min_north) / self.scale_y).floor() as i64,
        )
    }

    fn contains_east_north(&self, east: f64, north: f64) -> bool {
        east >= self.min_east
            && east <= self.max_east
            && north >= self.min_north
            && north <= self.max_north
    }

    pub fn elev_at_east_north_no_interpolation(&self, east: f64, north: f64) -> i16 {
        if !self.contains_east_north(east, north) {
            return Self::INVALID_ELEVATION;
        }
        let (col, row) = self.east_north_to_col_row(east, north);
        self.elev_at_col_row(col, row)
    }

    /// The four grid nodes around `(east, north)` in SW/NW/NE/SE order
    /// with their elevations and metric distances from the query point.
    /// `None` when outside the extent or when any node is the sentinel.
    fn ref_points_elevation_distance(
        &self,
        east: f64,
        north: f64,
    ) -> Option<([i16; 4], [f64; 4])> {
        if !self.contains_east_north(east, north) {
            return None;
        }

        let (col, row) = self.east_north_to_col_row(east, north);
        let node_east = self.min_east + self.scale_x * col as f64;
        let node_north = self.min_north + self.scale_y * row as f64;

        // sw, nw, ne, se
        let nodes = [
            (col, row, node_east, node_north),
            (col, row + 1, node_east, node_north + self.scale_y),
            (
                col + 1,
                row + 1,
                node_east + self.scale_x,
                node_north + self.scale_y,
            ),
            (col + 1, row, node_east + self.scale_x, node_north),
        ];

        let mut elevations = [0i16; 4];
        let mut distances = [0f64; 4];
        for (i, (c, r, e, n)) in nodes.into_iter().enumerate() {
            let elev = self.elev_at_col_row(c, r);
            if elev == Self::INVALID_ELEVATION {
                return None;
            }
            elevations[i] = elev;
            distances[i] = match self.horiz_units {
                DemHorizontalUnit::LatLonArcSeconds => LatLon::distance(
                    &LatLon::new(north / 3600.0, east / 3600.0),
                    &LatLon::new(n / 3600.0, e / 3600.0),
                ),
                DemHorizontalUnit::UtmMeters => {
                    ((east - e).powi(2) + (north - n).powi(2)).sqrt()
                }
            };
        }
        Some((elevations, distances))
    }

    /// Inverse-distance weighting over the four surrounding nodes. A node
    /// closer than one metre wins outright.
    pub fn elev_at_east_north_simple_interpolation(&self, east: f64, north: f64) -> i16 {
        let Some((elevations, distances)) = self.ref_points_elevation_distance(east, north)
        else {
            return Self::INVALID_ELEVATION;
        };

        for i in 0..4 {
            if distances[i] < 1.0 {
                return elevations[i];
            }
        }

        let t: f64 = (0..4).map(|i| f64::from(elevations[i]) / distances[i]).sum();
        let b: f64 = (0..4).map(|i| 1.0 / distances[i]).sum();
        (t / b) as i16
    }

    /// Shepard interpolation: inverse squared distance weighting.
    pub fn elev_at_east_north_shepard_interpolation(&self, east: f64, north: f64) -> i16 {
        let Some((elevations, distances)) = self.ref_points_elevation_distance(east, north)
        else {
            return Self::INVALID_ELEVATION;
        };

        for i in 0..4 {
            if distances[i] < 1.0 {
                return elevations[i];
            }
        }

        let mut t = 0.0;
        let mut b = 0.0;
        for i in 0..4 {
            let w = (1.0 / distances[i]).powi(2);
            t += w * f64::from(elevations[i]);
            b += w;
        }
        (t / b) as i16
    }

    /// Elevation for an arbitrary coordinate, converted into this grid's
    /// horizontal units first. A UTM grid quietly answers the sentinel
    /// for queries in a different zone.
    pub fn elev_by_coord(&self, coord: &Coord, method: DemInterpolation) -> i16 {
        let (east, north) = match self.horiz_units {
            DemHorizontalUnit::LatLonArcSeconds => {
                let ll = coord.to_latlon();
                (ll.lon * 3600.0, ll.lat * 3600.0)
            }
            DemHorizontalUnit::UtmMeters => {
                let utm = coord.to_utm();
                match self.utm_zone {
                    Some(zone) if zone == utm.zone => (utm.easting, utm.northing),
                    Some(_) => return Self::INVALID_ELEVATION,
                    None => {
                        error!("UTM DEM without a zone");
                        return Self::INVALID_ELEVATION;
                    }
                }
            }
        };

        match method {
            DemInterpolation::None => self.elev_at_east_north_no_interpolation(east, north),
            DemInterpolation::Simple => {
                self.elev_at_east_north_simple_interpolation(east, north)
            }
            DemInterpolation::Best => {
                self.elev_at_east_north_shepard_interpolation(east, north)
            }
        }
    }

    /// The grid's extent as a geographic bounding box.
    pub fn bbox(&self) -> LatLonBBox {
        match self.horiz_units {
            DemHorizontalUnit::LatLonArcSeconds => LatLonBBox::new(
                self.max_north / 3600.0,
                self.min_north / 3600.0,
                self.max_east / 3600.0,
                self.min_east / 3600.0,
            ),
            DemHorizontalUnit::UtmMeters => {
                let zone = self.utm_zone.unwrap_or(1);
                let band = self.utm_band.unwrap_or('N');
                let ne = Utm::new(self.max_east, self.max_north, zone, band).to_latlon();
                let sw = Utm::new(self.min_east, self.min_north, zone, band).to_latlon();
                LatLonBBox::new(ne.lat, sw.lat, ne.lon, sw.lon)
            }
        }
    }

    pub fn intersects(&self, other: &LatLonBBox) -> bool {
        self.bbox().intersects(other)
    }
}
