//! The track model: an ordered sequence of trackpoints with segment
//! markers, plus the lifecycle operations that maintain the invariants:
//! the first point of a non-empty track carries `new_segment`, and the
//! cached bbox (when valid) covers every point.

use log::debug;

use crate::bbox::LatLonBBox;
use crate::coord::{Coord, CoordMode};
use crate::error::GeotraxError;

/// Epoch seconds of 1901-01-01T00:00:00Z, the anchor that
/// [`Track::anonymize_times`] shifts the first timestamp onto.
pub const ANONYMOUS_EPOCH: i64 = -2_177_452_800;

/// GPS fix kind as carried by GPX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixType {
    None,
    TwoDimensional,
    ThreeDimensional,
    Dgps,
    Pps,
}

impl TryFrom<String> for FixType {
    type Error = GeotraxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "none" => Ok(FixType::None),
            "2d" => Ok(FixType::TwoDimensional),
            "3d" => Ok(FixType::ThreeDimensional),
            "dgps" => Ok(FixType::Dgps),
            "pps" => Ok(FixType::Pps),
            _ => Err(GeotraxError::InvalidFixType(value)),
        }
    }
}

impl std::fmt::Display for FixType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FixType::None => "none",
            FixType::TwoDimensional => "2d",
            FixType::ThreeDimensional => "3d",
            FixType::Dgps => "dgps",
            FixType::Pps => "pps",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trackpoint {
    pub coord: Coord,
    pub name: Option<String>,
    /// Seconds since the Unix epoch. All analytics run at one-second
    /// resolution, matching the GPX subset we consume.
    pub timestamp: Option<i64>,
    /// Metres above the geoid.
    pub altitude: Option<f64>,
    /// Instantaneous speed, m/s.
    pub speed: Option<f64>,
    /// Course over ground, radians.
    pub course: Option<f64>,
    pub fix: Option<FixType>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
    pub num_satellites: Option<u32>,
    /// Marks the start of a new segment within the owning track.
    pub new_segment: bool,
}

impl Trackpoint {
    pub fn new(coord: Coord) -> Self {
        Self {
            coord,
            name: None,
            timestamp: None,
            altitude: None,
            speed: None,
            course: None,
            fix: None,
            hdop: None,
            vdop: None,
            pdop: None,
            num_satellites: None,
            new_segment: false,
        }
    }

    /// Strip everything a route point must not carry.
    fn clear_motion_fields(&mut self) {
        self.timestamp = None;
        self.speed = None;
        self.course = None;
        self.fix = None;
        self.hdop = None;
        self.vdop = None;
        self.pdop = None;
        self.num_satellites = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Track {
    pub name: String,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub type_: Option<String>,
    /// Routes have no time/speed semantics; their points never carry
    /// timestamps, speed or course.
    pub is_route: bool,
    /// Draw colour hint carried through GPX extensions; rendering itself
    /// is not this crate's concern.
    pub draw_color: Option<String>,
    pub points: Vec<Trackpoint>,
    pub bbox: LatLonBBox,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn new_route(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_route: true,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn first_point(&self) -> Option<&Trackpoint> {
        self.points.first()
    }

    pub fn last_point(&self) -> Option<&Trackpoint> {
        self.points.last()
    }

    /// Append a trackpoint. The very first point seeds the bbox (and gets
    /// its `new_segment` flag set, establishing the invariant); later
    /// points update the bbox only when `recalc_bbox` is given, so bulk
    /// loaders can defer to one [`Track::calculate_bounds`] at the end.
    pub fn add_trackpoint(&mut self, mut tp: Trackpoint, recalc_bbox: bool) {
        if self.is_route {
            tp.clear_motion_fields();
        }
        let first = self.points.is_empty();
        if first {
            tp.new_segment = true;
        }
        self.points.push(tp);
        if first {
            self.calculate_bounds();
        } else if recalc_bbox {
            self.recalculate_bounds_last_point();
        }
    }

    /// Grow the bbox with just the newest point.
    pub fn recalculate_bounds_last_point(&mut self) {
        if let Some(tp) = self.points.last() {
            self.bbox.expand_with(&tp.coord.to_latlon());
        }
    }

    /// Single pass over all points; resets the bbox to its exact value.
    pub fn calculate_bounds(&mut self) {
        self.bbox.invalidate();
        for tp in &self.points {
            self.bbox.expand_with(&tp.coord.to_latlon());
        }
        debug!("Bounds of track '{}': {}", self.name, self.bbox);
    }

    /// Sum of distances between consecutive points, skipping hops that
    /// cross a segment boundary.
    pub fn length(&self) -> f64 {
        let mut len = 0.0;
        for pair in self.points.windows(2) {
            if !pair[1].new_segment {
                len += Coord::distance(&pair[0].coord, &pair[1].coord);
            }
        }
        len
    }

    /// Sum of distances between consecutive points including the jumps
    /// between segments.
    pub fn length_including_gaps(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| Coord::distance(&pair[0].coord, &pair[1].coord))
            .sum()
    }

    /// In-segment length accumulated from the start up to (and including)
    /// the point at `index`.
    pub fn length_to_point(&self, index: usize) -> f64 {
        let mut len = 0.0;
        for (i, pair) in self.points.windows(2).enumerate() {
            if i + 1 > index {
                break;
            }
            if !pair[1].new_segment {
                len += Coord::distance(&pair[0].coord, &pair[1].coord);
            }
        }
        len
    }

    pub fn segment_count(&self) -> usize {
        self.points.iter().filter(|tp| tp.new_segment).count()
    }

    /// Clears every segment marker except the first, forming one
    /// continuous track. Returns how many markers were removed.
    pub fn merge_segments(&mut self) -> usize {
        let mut merged = 0;
        for tp in self.points.iter_mut().skip(1) {
            if tp.new_segment {
                tp.new_segment = false;
                merged += 1;
            }
        }
        merged
    }

    /// Split into one fresh track per segment. The points of the returned
    /// tracks are disjoint subranges of the original, each with a computed
    /// bbox.
    pub fn split_into_segments(&self) -> Vec<Track> {
        let mut tracks = Vec::new();
        let mut first = 0;
        while first < self.points.len() {
            let mut last = first + 1;
            while last < self.points.len() && !self.points[last].new_segment {
                last += 1;
            }
            let mut segment = Track {
                name: self.name.clone(),
                comment: self.comment.clone(),
                description: self.description.clone(),
                source: self.source.clone(),
                type_: self.type_.clone(),
                is_route: self.is_route,
                draw_color: self.draw_color.clone(),
                points: self.points[first..last].to_vec(),
                bbox: LatLonBBox::invalid(),
            };
            if let Some(tp) = segment.points.first_mut() {
                tp.new_segment = true;
            }
            segment.calculate_bounds();
            tracks.push(segment);
            first = last;
        }
        tracks
    }

    /// Reverse the point order, re-establishing the segment-marker
    /// invariant: the flags that marked the first point of each segment
    /// end up on what is now the first point of each reversed segment.
    pub fn reverse(&mut self) {
        if self.points.is_empty() {
            return;
        }
        self.points.reverse();

        let n = self.points.len();
        for i in (1..n).rev() {
            if self.points[i].new_segment {
                self.points[i].new_segment = false;
                if i + 1 < n {
                    self.points[i + 1].new_segment = true;
                }
            }
        }
        self.points[0].new_segment = true;
    }

    pub fn dup_point_count(&self) -> usize {
        self.points
            .windows(2)
            .filter(|pair| pair[0].coord == pair[1].coord)
            .count()
    }

    /// Delete adjacent points with the same position, preserving segment
    /// markers: when the deleted point opened a segment, the marker moves
    /// to the point after it. Returns the number of deleted points.
    pub fn remove_dup_points(&mut self) -> usize {
        let removed = self.remove_adjacent_where(|a, b| a.coord == b.coord);
        self.calculate_bounds();
        removed
    }

    pub fn same_time_point_count(&self) -> usize {
        self.points
            .windows(2)
            .filter(|pair| {
                matches!(
                    (pair[0].timestamp, pair[1].timestamp),
                    (Some(a), Some(b)) if a == b
                )
            })
            .count()
    }

    /// Delete adjacent points with the same defined timestamp, with the
    /// same segment-marker preservation as [`Track::remove_dup_points`].
    pub fn remove_same_time_points(&mut self) -> usize {
        let removed = self.remove_adjacent_where(|a, b| {
            matches!((a.timestamp, b.timestamp), (Some(x), Some(y)) if x == y)
        });
        self.calculate_bounds();
        removed
    }

    fn remove_adjacent_where(
        &mut self,
        matches: impl Fn(&Trackpoint, &Trackpoint) -> bool,
    ) -> usize {
        let mut removed = 0;
        let mut i = 0;
        while i + 1 < self.points.len() {
            if matches(&self.points[i], &self.points[i + 1]) {
                if self.points[i + 1].new_segment && i + 2 < self.points.len() {
                    self.points[i + 2].new_segment = true;
                }
                self.points.remove(i + 1);
                removed += 1;
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Strip timestamps, speed, course, DOPs and fix information from
    /// every point, turning the track into a route.
    pub fn to_routepoints(&mut self) {
        for tp in &mut self.points {
            tp.clear_motion_fields();
        }
        self.is_route = true;
    }

    /// If the first and last points have timestamps, assign interior
    /// timestamps proportional to cumulative distance so the simulated
    /// speed is constant. Integer rounding can collide timestamps, so the
    /// pass finishes with [`Track::remove_same_time_points`].
    pub fn interpolate_times(&mut self) {
        let Some(first) = self.points.first().and_then(|tp| tp.timestamp) else {
            return;
        };
        let Some(last) = self.points.last().and_then(|tp| tp.timestamp) else {
            return;
        };
        let span = (last - first) as f64;
        let total = self.length_including_gaps();
        if total <= 0.0 {
            return;
        }

        let mut cur_dist = 0.0;
        for i in 1..self.points.len().saturating_sub(1) {
            cur_dist += Coord::distance(&self.points[i - 1].coord, &self.points[i].coord);
            self.points[i].timestamp = Some(first + (cur_dist / total * span) as i64);
        }
        self.remove_same_time_points();
    }

    /// Shift all timestamps by one offset so the first timestamp lands on
    /// 1901-01-01T00:00:00Z, preserving every relative interval.
    pub fn anonymize_times(&mut self) {
        let mut offset = None;
        for tp in &mut self.points {
            if let Some(ts) = tp.timestamp {
                let off = *offset.get_or_insert(ts - ANONYMOUS_EPOCH);
                tp.timestamp = Some(ts - off);
            }
        }
    }

    /// Walking back from the end, find the last adjacent duplicate-position
    /// pair and truncate the track there, returning the duplicate's
    /// position. Without any duplicate the track is cleared and the first
    /// point's position returned.
    pub fn cut_back_to_double_point(&mut self) -> Option<Coord> {
        if self.points.is_empty() {
            return None;
        }
        for i in (1..self.points.len()).rev() {
            if self.points[i].coord == self.points[i - 1].coord {
                let coord = self.points[i].coord;
                self.points.truncate(i);
                return Some(coord);
            }
        }
        let coord = self.points[0].coord;
        self.points.clear();
        Some(coord)
    }

    /// Splice all of `from`'s points onto the end of this track, leaving
    /// `from` empty, then refresh the bounds.
    pub fn append_stolen_points(&mut self, from: &mut Track) {
        self.points.append(&mut from.points);
        self.calculate_bounds();
    }

    pub fn convert(&mut self, mode: CoordMode) {
        for tp in &mut self.points {
            tp.coord.convert(mode);
        }
    }
}
