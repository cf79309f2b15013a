//! Geographic bounding boxes in degrees, with an explicit rule for the
//! antimeridian: `east < west` means the box crosses 180°.

use crate::coord::LatLon;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLonBBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    valid: bool,
}

impl Default for LatLonBBox {
    fn default() -> Self {
        Self::invalid()
    }
}

impl LatLonBBox {
    pub fn invalid() -> Self {
        Self {
            north: f64::NAN,
            south: f64::NAN,
            east: f64::NAN,
            west: f64::NAN,
            valid: false,
        }
    }

    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        let mut bbox = Self {
            north,
            south,
            east,
            west,
            valid: false,
        };
        bbox.validate();
        bbox
    }

    /// A degenerate box covering a single position.
    pub fn from_point(pos: &LatLon) -> Self {
        Self::new(pos.lat, pos.lat, pos.lon, pos.lon)
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn invalidate(&mut self) {
        *self = Self::invalid();
    }

    /// Normalize so that south <= north. Longitudes are left alone:
    /// east < west is a legitimate box that wraps the antimeridian.
    pub fn validate(&mut self) {
        if self.north.is_nan() || self.south.is_nan() || self.east.is_nan() || self.west.is_nan()
        {
            self.valid = false;
            return;
        }
        if self.south > self.north {
            std::mem::swap(&mut self.south, &mut self.north);
        }
        self.valid = true;
    }

    fn crosses_antimeridian(&self) -> bool {
        self.east < self.west
    }

    /// Grow the box to cover `pos`. Seeds the box if it is invalid.
    pub fn expand_with(&mut self, pos: &LatLon) {
        if !self.valid {
            *self = Self::from_point(pos);
            return;
        }
        if pos.lat > self.north {
            self.north = pos.lat;
        }
        if pos.lat < self.south {
            self.south = pos.lat;
        }
        if pos.lon > self.east {
            self.east = pos.lon;
        }
        if pos.lon < self.west {
            self.west = pos.lon;
        }
    }

    /// Grow the box to cover `other` entirely.
    pub fn expand_with_bbox(&mut self, other: &LatLonBBox) {
        if !other.valid {
            return;
        }
        self.expand_with(&LatLon::new(other.south, other.west));
        self.expand_with(&LatLon::new(other.north, other.east));
    }

    fn lon_contained(&self, lon: f64) -> bool {
        if self.crosses_antimeridian() {
            lon >= self.west || lon <= self.east
        } else {
            (self.west..=self.east).contains(&lon)
        }
    }

    pub fn contains(&self, pos: &LatLon) -> bool {
        self.valid
            && pos.lat <= self.north
            && pos.lat >= self.south
            && self.lon_contained(pos.lon)
    }

    /// Longitude intervals of the box, split at the antimeridian when the
    /// box wraps.
    fn lon_intervals(&self) -> [(f64, f64); 2] {
        if self.crosses_antimeridian() {
            [(self.west, 180.0), (-180.0, self.east)]
        } else {
            [(self.west, self.east), (self.west, self.east)]
        }
    }

    pub fn intersects(&self, other: &LatLonBBox) -> bool {
        if !self.valid || !other.valid {
            return false;
        }
        if self.south > other.north || other.south > self.north {
            return false;
        }
        for (w1, e1) in self.lon_intervals() {
            for (w2, e2) in other.lon_intervals() {
                if w1 <= e2 && w2 <= e1 {
                    return true;
                }
            }
        }
        false
    }

    pub fn center(&self) -> Option<LatLon> {
        if !self.valid {
            return None;
        }
        Some(LatLon::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        ))
    }
}

impl std::fmt::Display for LatLonBBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.valid {
            write!(
                f,
                "N{:.4} S{:.4} E{:.4} W{:.4}",
                self.north, self.south, self.east, self.west
            )
        } else {
            write!(f, "(invalid bbox)")
        }
    }
}
