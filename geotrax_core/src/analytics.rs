//! Derived track computations: durations and speeds, the densely-sampled
//! chunk maps backing profile graphs, point lookup by distance/percentage/
//! time, and DEM-driven elevation enrichment.
//!
//! The chunk-map algorithms are ports of long-lived field-tested code;
//! their quirks (notably the elevation-by-time map accumulating rather
//! than averaging) are kept on purpose.

use log::warn;
use logging_timer::time;

use crate::coord::Coord;
use crate::dem::cache::DemCache;
use crate::dem::DemInterpolation;
use crate::track::{Track, Trackpoint};

/// Chunk maps refuse absurd sampling requests.
pub const MAX_CHUNKS: u16 = 16_000;

/// Crazily large altitudes (seen from some devices after an upload/
/// re-download cycle) are treated as unknown.
const ALTITUDE_SANITY_LIMIT: f64 = 1E9;

/// An elevation-by-distance profile. `below_minimum` flags samples at or
/// below sea level, or below the caller's configured minimum; what to do
/// with that (colouring, usually) is the caller's business.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationMap {
    pub samples: Vec<f64>,
    pub below_minimum: Vec<bool>,
}

impl Track {
    /// Span between the first and last timestamp. May be negative if the
    /// track has been reversed.
    pub fn duration_including_gaps(&self) -> Option<i64> {
        let first = self.first_point().and_then(|tp| tp.timestamp)?;
        let last = self.last_point().and_then(|tp| tp.timestamp)?;
        Some(last - first)
    }

    /// Sum of in-segment time deltas, in seconds.
    pub fn duration_moving(&self) -> i64 {
        let mut duration = 0;
        for pair in self.points.windows(2) {
            if let (Some(t0), Some(t1)) = (pair[0].timestamp, pair[1].timestamp) {
                if !pair[1].new_segment {
                    duration += (t1 - t0).abs();
                }
            }
        }
        duration
    }

    /// Positive first-to-last span as used by the time-partitioned maps.
    fn map_duration(&self) -> Option<f64> {
        let first = self.first_point().and_then(|tp| tp.timestamp)?;
        let last = self.last_point().and_then(|tp| tp.timestamp)?;
        let duration = last - first;
        if duration < 0 {
            warn!(
                "Track '{}' has a negative duration: unsorted timestamps?",
                self.name
            );
            return None;
        }
        if duration == 0 {
            return None;
        }
        Some(duration as f64)
    }

    /// Total in-segment distance over total in-segment time, m/s.
    pub fn average_speed(&self) -> f64 {
        let mut len = 0.0;
        let mut time = 0;
        for pair in self.points.windows(2) {
            if let (Some(t0), Some(t1)) = (pair[0].timestamp, pair[1].timestamp) {
                if !pair[1].new_segment {
                    len += Coord::distance(&pair[0].coord, &pair[1].coord);
                    time += (t1 - t0).abs();
                }
            }
        }
        if time == 0 {
            0.0
        } else {
            (len / time as f64).abs()
        }
    }

    /// Moving average: inter-point intervals of `stop_length_seconds` or
    /// more are treated as stopped time and skipped entirely. GPS units
    /// and bike computers report this flavour of average.
    pub fn average_speed_moving(&self, stop_length_seconds: i64) -> f64 {
        let mut len = 0.0;
        let mut time = 0;
        for pair in self.points.windows(2) {
            if let (Some(t0), Some(t1)) = (pair[0].timestamp, pair[1].timestamp) {
                if !pair[1].new_segment && (t1 - t0) < stop_length_seconds {
                    len += Coord::distance(&pair[0].coord, &pair[1].coord);
                    time += (t1 - t0).abs();
                }
            }
        }
        if time == 0 {
            0.0
        } else {
            (len / time as f64).abs()
        }
    }

    /// Fastest inter-point speed in m/s, 0.0 when no pair is timestamped.
    pub fn max_speed(&self) -> f64 {
        self.pairwise_speeds()
            .fold(0.0, |max, (_, speed)| if speed > max { speed } else { max })
    }

    /// Speeds between consecutive in-segment timestamped pairs, keyed by
    /// the index of the later point.
    fn pairwise_speeds(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.points.windows(2).enumerate().filter_map(|(i, pair)| {
            let (t0, t1) = (pair[0].timestamp?, pair[1].timestamp?);
            if pair[1].new_segment || t1 == t0 {
                return None;
            }
            let speed = Coord::distance(&pair[0].coord, &pair[1].coord) / (t1 - t0).abs() as f64;
            Some((i + 1, speed))
        })
    }

    pub fn tp_by_max_speed(&self) -> Option<&Trackpoint> {
        let mut best: Option<(usize, f64)> = None;
        for (i, speed) in self.pairwise_speeds() {
            if best.map_or(true, |(_, s)| speed > s) {
                best = Some((i, speed));
            }
        }
        best.map(|(i, _)| &self.points[i])
    }

    pub fn tp_by_max_alt(&self) -> Option<&Trackpoint> {
        self.points
            .iter()
            .filter(|tp| tp.altitude.is_some())
            .max_by(|a, b| {
                a.altitude
                    .unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&b.altitude.unwrap_or(f64::NEG_INFINITY))
            })
    }

    pub fn tp_by_min_alt(&self) -> Option<&Trackpoint> {
        self.points
            .iter()
            .filter(|tp| tp.altitude.is_some())
            .min_by(|a, b| {
                a.altitude
                    .unwrap_or(f64::INFINITY)
                    .total_cmp(&b.altitude.unwrap_or(f64::INFINITY))
            })
    }

    pub fn minmax_altitude(&self) -> Option<(f64, f64)> {
        let mut result: Option<(f64, f64)> = None;
        for alt in self.points.iter().filter_map(|tp| tp.altitude) {
            result = Some(match result {
                None => (alt, alt),
                Some((min, max)) => (min.min(alt), max.max(alt)),
            });
        }
        result
    }

    /// Total climb and descent in metres over points with known altitude.
    pub fn total_elevation_gain(&self) -> Option<(f64, f64)> {
        let mut up = 0.0;
        let mut down = 0.0;
        let mut any = false;
        let mut prev: Option<f64> = None;
        for alt in self.points.iter().map(|tp| tp.altitude) {
            if let Some(alt) = alt {
                any = true;
                if let Some(p) = prev {
                    let diff = alt - p;
                    if diff > 0.0 {
                        up += diff;
                    } else {
                        down -= diff;
                    }
                }
                prev = Some(alt);
            }
        }
        any.then_some((up, down))
    }

    /// Mean elevation over `num_chunks` equal slices of the total length
    /// (gaps included). Walks the track integrating elevation over
    /// distance; points with unknown (or absurd) altitude take the last
    /// known value along the walk, and leading unknowns take the first
    /// known value. Returns `None` for degenerate tracks: fewer than two
    /// points with a sane altitude, or zero total length.
    #[time]
    pub fn make_elevation_map_samples(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        let n = self.points.len();
        if n < 2 || num_chunks == 0 {
            return None;
        }

        let usable = self
            .points
            .iter()
            .filter(|tp| matches!(tp.altitude, Some(a) if a < ALTITUDE_SANITY_LIMIT))
            .count();
        if usable < 2 {
            return None;
        }

        let total_length = self.length_including_gaps();
        let chunk_length = total_length / f64::from(num_chunks);
        if chunk_length <= 0.0 {
            return None;
        }

        // Propagate the last known good altitude over unknown points.
        let mut effective: Vec<Option<f64>> = Vec::with_capacity(n);
        let mut last_known: Option<f64> = None;
        for tp in &self.points {
            if let Some(a) = tp.altitude.filter(|a| *a < ALTITUDE_SANITY_LIMIT) {
                last_known = Some(a);
            }
            effective.push(last_known);
        }
        // Leading unknowns take the first known value; the usable check
        // above guarantees one exists.
        let first_known = effective.iter().find_map(|a| *a).unwrap_or(0.0);
        let effective: Vec<f64> = effective
            .into_iter()
            .map(|a| a.unwrap_or(first_known))
            .collect();

        let alt = |i: usize| effective[i];
        let num_chunks = num_chunks as usize;
        let mut pts = vec![0.0; num_chunks];

        let mut current_dist = 0.0;
        let mut current_area_under_curve = 0.0;
        let mut current_chunk = 0;

        let mut i = 0;
        let mut current_seg_length =
            Coord::distance(&self.points[0].coord, &self.points[1].coord);
        let mut altitude1 = alt(0);
        let mut altitude2 = alt(1);
        let mut dist_along_seg = 0.0;
        let mut ignore_it = false;

        while current_chunk < num_chunks {
            if current_seg_length > 0.0 && current_seg_length - dist_along_seg > chunk_length {
                // The entire chunk fits inside the current inter-point
                // segment: the average altitude is the linear
                // interpolation at the chunk's midpoint.
                dist_along_seg += chunk_length;
                pts[current_chunk] = if ignore_it {
                    altitude1
                } else {
                    altitude1
                        + (altitude2 - altitude1)
                            * ((dist_along_seg - chunk_length / 2.0) / current_seg_length)
                };
                current_chunk += 1;
            } else {
                // Finish the current segment and integrate over as many
                // whole segments as fit into the rest of the chunk.
                if current_seg_length > 0.0 {
                    let altitude_at = altitude1
                        + (altitude2 - altitude1) / current_seg_length * dist_along_seg;
                    current_dist = current_seg_length - dist_along_seg;
                    current_area_under_curve = current_dist * (altitude_at + altitude2) * 0.5;
                } else {
                    current_dist = 0.0;
                    current_area_under_curve = 0.0;
                }

                i += 1;
                while i + 1 < n {
                    current_seg_length =
                        Coord::distance(&self.points[i].coord, &self.points[i + 1].coord);
                    altitude1 = alt(i);
                    altitude2 = alt(i + 1);
                    ignore_it = self.points[i + 1].new_segment;

                    if chunk_length - current_dist >= current_seg_length {
                        current_dist += current_seg_length;
                        current_area_under_curve +=
                            current_seg_length * (altitude1 + altitude2) * 0.5;
                        i += 1;
                    } else {
                        break;
                    }
                }

                dist_along_seg = chunk_length - current_dist;
                if ignore_it || i + 1 >= n {
                    pts[current_chunk] = if current_dist > 0.0 {
                        current_area_under_curve / current_dist
                    } else {
                        altitude1
                    };
                    if i + 1 >= n {
                        let last = pts[current_chunk];
                        for p in pts.iter_mut().skip(current_chunk + 1) {
                            *p = last;
                        }
                        break;
                    }
                } else {
                    current_area_under_curve += dist_along_seg
                        * (altitude1
                            + (altitude2 - altitude1) * dist_along_seg / current_seg_length);
                    pts[current_chunk] = current_area_under_curve / chunk_length;
                }

                current_dist = 0.0;
                current_chunk += 1;
            }
        }

        Some(pts)
    }

    /// The elevation-by-distance map with below-minimum flags attached.
    pub fn make_elevation_map(&self, num_chunks: u16, minimum_altitude: f64) -> Option<ElevationMap> {
        let samples = self.make_elevation_map_samples(num_chunks)?;
        let below_minimum = samples
            .iter()
            .map(|&e| e <= 0.0 || e < minimum_altitude)
            .collect();
        Some(ElevationMap {
            samples,
            below_minimum,
        })
    }

    /// Percent gradient per distance chunk, derived from the elevation
    /// map; the last element repeats.
    #[time]
    pub fn make_gradient_map(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        if num_chunks == 0 {
            return None;
        }
        let chunk_length = self.length_including_gaps() / f64::from(num_chunks);
        if chunk_length <= 0.0 {
            return None;
        }
        let altitudes = self.make_elevation_map_samples(num_chunks)?;

        let num_chunks = num_chunks as usize;
        let mut pts = vec![0.0; num_chunks];
        let mut current_gradient = 0.0;
        for i in 0..num_chunks - 1 {
            current_gradient = 100.0 * (altitudes[i + 1] - altitudes[i]) / chunk_length;
            pts[i] = current_gradient;
        }
        pts[num_chunks - 1] = current_gradient;
        Some(pts)
    }

    /// Cumulative distance and timestamp at every timestamped point.
    /// Distance keeps accumulating through unstamped points.
    fn distance_time_profile(&self) -> (Vec<f64>, Vec<f64>) {
        let mut s = Vec::new();
        let mut t = Vec::new();
        let mut cum = 0.0;
        for (i, tp) in self.points.iter().enumerate() {
            if i > 0 {
                cum += Coord::distance(&self.points[i - 1].coord, &tp.coord);
            }
            if let Some(ts) = tp.timestamp {
                s.push(cum);
                t.push(ts as f64);
            }
        }
        (s, t)
    }

    /// Average speed per time chunk. Chunks containing no new points
    /// repeat the previous value (0 for the first chunk).
    #[time]
    pub fn make_speed_map(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        let duration = self.map_duration()?;
        if num_chunks == 0 {
            return None;
        }
        let (s, t) = self.distance_time_profile();
        if t.len() < 2 {
            return None;
        }

        let chunk_size = duration / f64::from(num_chunks);
        let num_chunks = num_chunks as usize;
        let mut out = vec![0.0; num_chunks];
        let mut tp_index = 0;
        for i in 0..num_chunks {
            let threshold = t[0] + i as f64 * chunk_size;
            if tp_index + 1 < t.len() && threshold >= t[tp_index] {
                let mut acc_s = 0.0;
                let mut acc_t = 0.0;
                while tp_index + 1 < t.len() && threshold >= t[tp_index] {
                    acc_s += s[tp_index + 1] - s[tp_index];
                    acc_t += t[tp_index + 1] - t[tp_index];
                    tp_index += 1;
                }
                out[i] = if acc_t > 0.0 {
                    acc_s / acc_t
                } else if i > 0 {
                    out[i - 1]
                } else {
                    0.0
                };
            } else if i > 0 {
                out[i] = out[i - 1];
            }
        }
        Some(out)
    }

    /// Cumulative distance per time chunk.
    #[time]
    pub fn make_distance_map(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        let duration = self.map_duration()?;
        if num_chunks == 0 {
            return None;
        }
        let (s, t) = self.distance_time_profile();
        if t.len() < 2 {
            return None;
        }

        let chunk_size = duration / f64::from(num_chunks);
        let num_chunks = num_chunks as usize;
        let mut out = vec![0.0; num_chunks];
        let mut tp_index = 0;
        for i in 0..num_chunks {
            let threshold = t[0] + i as f64 * chunk_size;
            if tp_index + 1 < t.len() && threshold >= t[tp_index] {
                let mut acc_s = 0.0;
                while tp_index + 1 < t.len() && threshold >= t[tp_index] {
                    acc_s += s[tp_index + 1] - s[tp_index];
                    tp_index += 1;
                }
                out[i] = if i > 0 { out[i - 1] + acc_s } else { acc_s };
            } else if i > 0 {
                out[i] = out[i - 1];
            }
        }
        Some(out)
    }

    /// Elevation per time chunk. Values accumulate over the points of a
    /// chunk rather than averaging; that is how this map has always
    /// behaved and downstream consumers rely on it.
    #[time]
    pub fn make_elevation_time_map(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        if self.points.len() < 2 || num_chunks == 0 {
            return None;
        }
        if !self.points.iter().any(|tp| tp.altitude.is_some()) {
            return None;
        }
        let duration = self.map_duration()?;

        let mut s = Vec::new();
        let mut t = Vec::new();
        for tp in &self.points {
            if let Some(ts) = tp.timestamp {
                s.push(tp.altitude.unwrap_or(0.0));
                t.push(ts as f64);
            }
        }
        if t.len() < 2 {
            return None;
        }

        let chunk_size = duration / f64::from(num_chunks);
        let num_chunks = num_chunks as usize;
        let mut out = vec![0.0; num_chunks];
        let mut tp_index = 0;
        for i in 0..num_chunks {
            let threshold = t[0] + i as f64 * chunk_size;
            if tp_index + 1 < t.len() && threshold >= t[tp_index] {
                let mut acc_s = s[tp_index];
                while tp_index + 1 < t.len() && threshold >= t[tp_index] {
                    acc_s += s[tp_index + 1] - s[tp_index];
                    tp_index += 1;
                }
                out[i] = acc_s;
            } else if i > 0 {
                out[i] = out[i - 1];
            }
        }
        Some(out)
    }

    /// Average speed per distance chunk (gaps included in the partition).
    #[time]
    pub fn make_speed_dist_map(&self, num_chunks: u16) -> Option<Vec<f64>> {
        assert!(num_chunks < MAX_CHUNKS);
        let total_length = self.length_including_gaps();
        if total_length <= 0.0 || num_chunks == 0 {
            return None;
        }
        let (s, t) = self.distance_time_profile();
        if t.len() < 2 {
            return None;
        }

        let chunk_size = total_length / f64::from(num_chunks);
        let num_chunks = num_chunks as usize;
        let mut out = vec![0.0; num_chunks];
        let mut tp_index = 0;
        for i in 0..num_chunks {
            let threshold = s[0] + i as f64 * chunk_size;
            if tp_index + 1 < s.len() && threshold >= s[tp_index] {
                let mut acc_s = 0.0;
                let mut acc_t = 0.0;
                while tp_index + 1 < s.len() && threshold >= s[tp_index] {
                    acc_s += s[tp_index + 1] - s[tp_index];
                    acc_t += t[tp_index + 1] - t[tp_index];
                    tp_index += 1;
                }
                out[i] = if acc_t > 0.0 {
                    acc_s / acc_t
                } else if i > 0 {
                    out[i - 1]
                } else {
                    0.0
                };
            } else if i > 0 {
                out[i] = out[i - 1];
            }
        }
        Some(out)
    }

    /// The first point at or past `meters_from_start` of cumulative
    /// distance, paired with its actual distance along the track. With
    /// `get_next_point` false the point before the straddling hop is
    /// returned instead.
    pub fn get_tp_by_dist(
        &self,
        meters_from_start: f64,
        get_next_point: bool,
    ) -> Option<(&Trackpoint, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let mut current_dist = 0.0;
        let mut current_inc = 0.0;
        let mut found = None;
        for i in 1..self.points.len() {
            current_inc = Coord::distance(&self.points[i - 1].coord, &self.points[i].coord);
            current_dist += current_inc;
            if current_dist >= meters_from_start {
                found = Some(i);
                break;
            }
        }
        let i = found?;
        if !get_next_point {
            return Some((&self.points[i - 1], current_dist - current_inc));
        }
        Some((&self.points[i], current_dist))
    }

    /// The trackpoint closest to `reldist` (0..=1) of the total
    /// gaps-included length, together with its distance from the start.
    pub fn get_closest_tp_by_percentage_dist(&self, reldist: f64) -> Option<(&Trackpoint, f64)> {
        if self.points.is_empty() {
            return None;
        }
        let dist = self.length_including_gaps() * reldist;
        let mut current_dist = 0.0;
        let mut current_inc = 0.0;
        let mut last_index = None;
        let mut last_dist = 0.0;
        let mut found = None;

        for i in 1..self.points.len() {
            current_inc = Coord::distance(&self.points[i - 1].coord, &self.points[i].coord);
            last_dist = current_dist;
            current_dist += current_inc;
            if current_dist >= dist {
                found = Some(i);
                break;
            }
            last_index = Some(i);
        }

        match found {
            None => last_index.map(|i| (&self.points[i], last_dist)),
            Some(i) => {
                // Gone past the target; is the previous point closer?
                if (current_dist - current_inc - dist).abs() < (current_dist - dist).abs() {
                    Some((&self.points[i - 1], last_dist))
                } else {
                    Some((&self.points[i], current_dist))
                }
            }
        }
    }

    /// The trackpoint closest to `reltime` (0..=1) of the first-to-last
    /// timestamp span, together with its offset from the start in seconds.
    pub fn get_closest_tp_by_percentage_time(&self, reltime: f64) -> Option<(&Trackpoint, i64)> {
        let t_start = self.first_point().and_then(|tp| tp.timestamp)?;
        let t_end = self.last_point().and_then(|tp| tp.timestamp)?;
        let t_pos = t_start + ((t_end - t_start) as f64 * reltime) as i64;

        let stamped: Vec<(usize, i64)> = self
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, tp)| tp.timestamp.map(|ts| (i, ts)))
            .collect();

        let mut chosen = None;
        for (k, &(i, ts)) in stamped.iter().enumerate() {
            if ts == t_pos {
                chosen = Some((i, ts));
                break;
            }
            if ts > t_pos {
                if k == 0 {
                    chosen = Some((i, ts));
                    break;
                }
                let (prev, prev_ts) = stamped[k - 1];
                chosen = Some(if t_pos - prev_ts <= ts - t_pos {
                    (prev, prev_ts)
                } else {
                    (i, ts)
                });
                break;
            }
            // Accommodate round-off at the last trackpoint.
            if k + 1 == stamped.len() && t_pos < ts + 3 {
                chosen = Some((i, ts));
                break;
            }
        }

        let (i, ts) = chosen?;
        Some((&self.points[i], ts - t_start))
    }

    /// Fill altitudes from loaded DEM data with the best (Shepard)
    /// interpolation. With `skip_existing` the pass leaves already-known
    /// altitudes alone. Returns the number of points changed.
    #[time]
    pub fn apply_dem_data(&mut self, cache: &DemCache, skip_existing: bool) -> usize {
        let mut num = 0;
        for tp in &mut self.points {
            if skip_existing && tp.altitude.is_some() {
                continue;
            }
            if let Some(elev) = cache.elev_by_coord(&tp.coord, DemInterpolation::Best) {
                tp.altitude = Some(f64::from(elev));
                num += 1;
            }
        }
        num
    }

    /// DEM enrichment for only the newest point, used while a track is
    /// still growing.
    pub fn apply_dem_data_last_point(&mut self, cache: &DemCache) {
        if let Some(tp) = self.points.last_mut() {
            if let Some(elev) = cache.elev_by_coord(&tp.coord, DemInterpolation::Best) {
                tp.altitude = Some(f64::from(elev));
            }
        }
    }

    /// Fill gaps of unknown elevation: `flat` carries the last known
    /// value forward, otherwise each gap is linearly interpolated between
    /// its bracketing known values. Returns the number of points changed.
    pub fn smooth_missing_elevation_data(&mut self, flat: bool) -> usize {
        let mut num = 0;
        let mut last_known: Option<f64> = None;
        let mut gap_start: Option<usize> = None;

        for i in 0..self.points.len() {
            match self.points[i].altitude {
                None => {
                    if flat {
                        if let Some(elev) = last_known {
                            self.points[i].altitude = Some(elev);
                            num += 1;
                        }
                    } else if gap_start.is_none() {
                        gap_start = Some(i);
                    }
                }
                Some(alt) => {
                    if let (Some(start), Some(elev1), false) = (gap_start, last_known, flat) {
                        let gap_len = i - start;
                        let change = (alt - elev1) / (gap_len + 1) as f64;
                        for (count, j) in (start..i).enumerate() {
                            self.points[j].altitude = Some(elev1 + change * (count + 1) as f64);
                        }
                        num += gap_len;
                    }
                    gap_start = None;
                    last_known = Some(alt);
                }
            }
        }
        num
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::tests::{tp, tp_at};

    fn climb_track() -> Track {
        // Three equidistant points along the equator, altitudes 0/100/200.
        let mut t = Track::new("climb");
        for (i, alt) in [(0, 0.0), (1, 100.0), (2, 200.0)] {
            let mut p = tp(0.0, f64::from(i));
            p.altitude = Some(alt);
            t.add_trackpoint(p, true);
        }
        t
    }

    #[test]
    fn elevation_map_two_chunks() {
        let t = climb_track();
        let map = t.make_elevation_map_samples(2).unwrap();
        assert_eq!(map.len(), 2);
        assert!((map[0] - 50.0).abs() < 1.0, "got {:?}", map);
        assert!((map[1] - 150.0).abs() < 1.0, "got {:?}", map);
    }

    #[test]
    fn elevation_map_flags_below_minimum() {
        let mut t = Track::new("dip");
        for (i, alt) in [(0, -10.0), (1, -10.0), (2, 50.0), (3, 50.0)] {
            let mut p = tp(0.0, f64::from(i) * 0.01);
            p.altitude = Some(alt);
            t.add_trackpoint(p, true);
        }
        let map = t.make_elevation_map(4, 0.0).unwrap();
        assert!(map.below_minimum[0]);
        assert!(!map.below_minimum[3]);
    }

    #[test]
    fn unknown_altitudes_propagate_last_known_value() {
        // A hole in the middle of a flat 100 m profile must not drag the
        // map towards zero.
        let mut t = Track::new("holes");
        for (i, alt) in [(0, Some(100.0)), (1, None), (2, Some(100.0))] {
            let mut p = tp(0.0, f64::from(i));
            p.altitude = alt;
            t.add_trackpoint(p, true);
        }
        let map = t.make_elevation_map_samples(2).unwrap();
        assert!(
            map.iter().all(|&e| (e - 100.0).abs() < 1e-9),
            "got {:?}",
            map
        );
        // The derived gradient stays flat too.
        let grad = t.make_gradient_map(2).unwrap();
        assert!(grad.iter().all(|&g| g.abs() < 1e-9), "got {:?}", grad);
    }

    #[test]
    fn leading_unknown_altitudes_take_first_known_value() {
        let mut t = Track::new("late start");
        for (i, alt) in [(0, None), (1, Some(50.0)), (2, Some(50.0))] {
            let mut p = tp(0.0, f64::from(i));
            p.altitude = alt;
            t.add_trackpoint(p, true);
        }
        let map = t.make_elevation_map_samples(2).unwrap();
        assert!(
            map.iter().all(|&e| (e - 50.0).abs() < 1e-9),
            "got {:?}",
            map
        );
    }

    #[test]
    fn elevation_map_needs_two_known_altitudes() {
        let mut t = Track::new("bare");
        t.add_trackpoint(tp(0.0, 0.0), true);
        let mut p = tp(0.0, 1.0);
        p.altitude = Some(42.0);
        t.add_trackpoint(p, true);
        assert!(t.make_elevation_map_samples(10).is_none());
    }

    #[test]
    fn gradient_map_repeats_last_value() {
        let t = climb_track();
        let grad = t.make_gradient_map(4).unwrap();
        assert_eq!(grad.len(), 4);
        assert_eq!(grad[2], grad[3]);
        // A steady climb has an everywhere-positive gradient.
        assert!(grad.iter().all(|&g| g > 0.0));
    }

    fn timed_track() -> Track {
        // 1 degree apart at the equator, 100 s per hop: roughly 1113 m/s.
        let mut t = Track::new("timed");
        t.add_trackpoint(tp_at(0.0, 0.0, 0), true);
        t.add_trackpoint(tp_at(0.0, 1.0, 100), true);
        t.add_trackpoint(tp_at(0.0, 2.0, 200), true);
        t.add_trackpoint(tp_at(0.0, 3.0, 300), true);
        t
    }

    #[test]
    fn speed_map_is_flat_for_constant_speed() {
        let t = timed_track();
        let map = t.make_speed_map(3).unwrap();
        for v in &map {
            assert!((v - 1113.19).abs() < 1.0, "got {:?}", map);
        }
    }

    #[test]
    fn distance_map_is_cumulative() {
        let t = timed_track();
        let map = t.make_distance_map(3).unwrap();
        assert!(map.windows(2).all(|w| w[1] >= w[0]));
        let total = t.length_including_gaps();
        assert!((map[2] - total).abs() / total < 0.4);
    }

    #[test]
    fn speed_maps_need_timestamps() {
        let mut t = Track::new("plain");
        t.add_trackpoint(tp(0.0, 0.0), true);
        t.add_trackpoint(tp(0.0, 1.0), true);
        assert!(t.make_speed_map(4).is_none());
        assert!(t.make_distance_map(4).is_none());
        assert!(t.make_speed_dist_map(4).is_none());
    }

    #[test]
    fn elevation_time_map_accumulates() {
        let mut t = Track::new("acc");
        for (i, alt) in [(0, 10.0), (1, 20.0), (2, 30.0)] {
            let mut p = tp_at(0.0, f64::from(i), i64::from(i) * 100);
            p.altitude = Some(alt);
            t.add_trackpoint(p, true);
        }
        let map = t.make_elevation_time_map(2).unwrap();
        // The first chunk consumes the first point: acc starts at 10 and
        // follows the track to 20.
        assert_eq!(map[0], 20.0);
        assert_eq!(map[1], 30.0);
    }

    #[test]
    fn tp_by_dist_straddles() {
        let t = timed_track();
        let deg = 111_319.49;
        let (next, d_next) = t.get_tp_by_dist(1.5 * deg, true).unwrap();
        assert_eq!(next.timestamp, Some(200));
        assert!(d_next >= 1.5 * deg);
        let (prev, d_prev) = t.get_tp_by_dist(1.5 * deg, false).unwrap();
        assert_eq!(prev.timestamp, Some(100));
        assert!(d_prev <= 1.5 * deg);
        assert!(t.get_tp_by_dist(100.0 * deg, true).is_none());
    }

    #[test]
    fn closest_tp_by_percentage_dist() {
        let t = timed_track();
        let (tp, metres) = t.get_closest_tp_by_percentage_dist(0.35).unwrap();
        assert_eq!(tp.timestamp, Some(100));
        assert!(metres > 0.0);
        let (last, _) = t.get_closest_tp_by_percentage_dist(1.0).unwrap();
        assert_eq!(last.timestamp, Some(300));
    }

    #[test]
    fn closest_tp_by_percentage_time() {
        let t = timed_track();
        let (tp, secs) = t.get_closest_tp_by_percentage_time(0.5).unwrap();
        // Target is 150; 100 and 200 tie and the earlier point wins.
        assert_eq!(secs, 100);
        assert_eq!(tp.timestamp, Some(100));
        let (first, secs) = t.get_closest_tp_by_percentage_time(0.0).unwrap();
        assert_eq!(first.timestamp, Some(0));
        assert_eq!(secs, 0);
    }

    #[test]
    fn average_and_max_speeds() {
        let t = timed_track();
        assert!((t.average_speed() - 1113.19).abs() < 1.0);
        assert!((t.max_speed() - 1113.19).abs() < 1.0);
        assert!(t.tp_by_max_speed().is_some());
    }

    #[test]
    fn moving_average_skips_stops() {
        let mut t = Track::new("stops");
        t.add_trackpoint(tp_at(0.0, 0.0, 0), true);
        t.add_trackpoint(tp_at(0.0, 1.0, 10), true);
        // A half-hour pause before moving on.
        t.add_trackpoint(tp_at(0.0, 1.0, 1810), true);
        t.add_trackpoint(tp_at(0.0, 2.0, 1820), true);
        let straight = t.average_speed();
        let moving = t.average_speed_moving(60);
        assert!(moving > straight);
        // Two degrees in twenty seconds of actual motion.
        assert!((moving - 11_131.95).abs() < 10.0);
    }

    #[test]
    fn elevation_gain_of_monotonic_climb() {
        let t = climb_track();
        let (up, down) = t.total_elevation_gain().unwrap();
        assert_eq!(up, 200.0);
        assert_eq!(down, 0.0);
        assert_eq!(t.minmax_altitude(), Some((0.0, 200.0)));
    }

    #[test]
    fn smooth_missing_flat_carries_forward() {
        let mut t = Track::new("s");
        let mut a = tp(0.0, 0.0);
        a.altitude = Some(100.0);
        t.add_trackpoint(a, true);
        t.add_trackpoint(tp(0.0, 1.0), true);
        t.add_trackpoint(tp(0.0, 2.0), true);
        assert_eq!(t.smooth_missing_elevation_data(true), 2);
        assert_eq!(t.points[1].altitude, Some(100.0));
        assert_eq!(t.points[2].altitude, Some(100.0));
    }

    #[test]
    fn smooth_missing_interpolates() {
        let mut t = Track::new("s");
        let mut a = tp(0.0, 0.0);
        a.altitude = Some(100.0);
        t.add_trackpoint(a, true);
        t.add_trackpoint(tp(0.0, 1.0), true);
        t.add_trackpoint(tp(0.0, 2.0), true);
        let mut b = tp(0.0, 3.0);
        b.altitude = Some(400.0);
        t.add_trackpoint(b, true);
        assert_eq!(t.smooth_missing_elevation_data(false), 2);
        assert_eq!(t.points[1].altitude, Some(200.0));
        assert_eq!(t.points[2].altitude, Some(300.0));
        // A trailing gap has no bracketing value and stays unknown.
        t.add_trackpoint(tp(0.0, 4.0), true);
        assert_eq!(t.smooth_missing_elevation_data(false), 0);
        assert_eq!(t.points[4].altitude, None);
    }
}
