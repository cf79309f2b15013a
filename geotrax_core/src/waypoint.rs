use std::path::PathBuf;

use crate::coord::{Coord, CoordMode};
use crate::dem::cache::DemCache;
use crate::dem::DemInterpolation;

/// A single named position. Waypoints are not ordered and carry no
/// segment structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub coord: Coord,
    pub altitude: Option<f64>,
    pub name: String,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    pub image_path: Option<PathBuf>,
    pub symbol: Option<String>,
    pub visible: bool,
}

impl Waypoint {
    pub fn new(name: impl Into<String>, coord: Coord) -> Self {
        Self {
            coord,
            altitude: None,
            name: name.into(),
            comment: None,
            description: None,
            source: None,
            url: None,
            image_path: None,
            symbol: None,
            visible: true,
        }
    }

    pub fn convert(&mut self, mode: CoordMode) {
        self.coord.convert(mode);
    }

    /// Fill the altitude from loaded DEM data. Returns true if a value was
    /// applied.
    pub fn apply_dem_data(&mut self, cache: &DemCache, skip_existing: bool) -> bool {
        if skip_existing && self.altitude.is_some() {
            return false;
        }
        match cache.elev_by_coord(&self.coord, DemInterpolation::Best) {
            Some(elev) => {
                self.altitude = Some(f64::from(elev));
                true
            }
            None => false,
        }
    }
}
