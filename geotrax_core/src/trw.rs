//! The TRW container: tracks, routes and waypoints sharing one
//! coordinate mode. Children are owned here and never shared between
//! containers.

use log::debug;

use crate::bbox::LatLonBBox;
use crate::coord::CoordMode;
use crate::dem::cache::DemCache;
use crate::track::Track;
use crate::waypoint::Waypoint;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrwLayer {
    pub name: String,
    coord_mode: CoordMode,
    pub tracks: Vec<Track>,
    pub routes: Vec<Track>,
    pub waypoints: Vec<Waypoint>,
    bbox: LatLonBBox,
}

impl TrwLayer {
    pub fn new(name: impl Into<String>, coord_mode: CoordMode) -> Self {
        Self {
            name: name.into(),
            coord_mode,
            ..Default::default()
        }
    }

    pub fn coord_mode(&self) -> CoordMode {
        self.coord_mode
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.routes.is_empty() && self.waypoints.is_empty()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    /// Add a track (or route, by its `is_route` flag), imposing this
    /// container's coordinate mode on it.
    pub fn add_track(&mut self, mut track: Track) {
        track.convert(self.coord_mode);
        self.bbox.expand_with_bbox(&track.bbox);
        if track.is_route {
            self.routes.push(track);
        } else {
            self.tracks.push(track);
        }
    }

    pub fn add_waypoint(&mut self, mut wp: Waypoint) {
        wp.convert(self.coord_mode);
        self.bbox.expand_with(&wp.coord.to_latlon());
        self.waypoints.push(wp);
    }

    pub fn find_track(&self, name: &str) -> Option<&Track> {
        self.tracks
            .iter()
            .chain(self.routes.iter())
            .find(|t| t.name == name)
    }

    pub fn find_track_mut(&mut self, name: &str) -> Option<&mut Track> {
        self.tracks
            .iter_mut()
            .chain(self.routes.iter_mut())
            .find(|t| t.name == name)
    }

    pub fn all_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().chain(self.routes.iter())
    }

    /// Union of all member bounding boxes.
    pub fn bbox(&self) -> &LatLonBBox {
        &self.bbox
    }

    /// Recompute every child's bounds and this container's union from
    /// scratch. Called after bulk population (e.g. a finished
    /// acquisition).
    pub fn post_read(&mut self) {
        self.bbox.invalidate();
        for track in self.tracks.iter_mut().chain(self.routes.iter_mut()) {
            track.calculate_bounds();
            self.bbox.expand_with_bbox(&track.bbox);
        }
        for wp in &self.waypoints {
            self.bbox.expand_with(&wp.coord.to_latlon());
        }
        debug!("Layer '{}' bounds: {}", self.name, self.bbox);
    }

    /// Switch the coordinate mode, converting every child.
    pub fn convert(&mut self, mode: CoordMode) {
        self.coord_mode = mode;
        for track in self.tracks.iter_mut().chain(self.routes.iter_mut()) {
            track.convert(mode);
        }
        for wp in &mut self.waypoints {
            wp.convert(mode);
        }
    }

    /// DEM-enrich every track, route and waypoint. Returns the number of
    /// altitudes applied.
    pub fn apply_dem_data(&mut self, cache: &DemCache, skip_existing: bool) -> usize {
        let mut num = 0;
        for track in self.tracks.iter_mut().chain(self.routes.iter_mut()) {
            num += track.apply_dem_data(cache, skip_existing);
        }
        for wp in &mut self.waypoints {
            if wp.apply_dem_data(cache, skip_existing) {
                num += 1;
            }
        }
        num
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Coord, LatLon};
    use crate::track::tests::tp;
    use crate::waypoint::Waypoint;

    #[test]
    fn children_take_the_container_coord_mode() {
        let mut layer = TrwLayer::new("layer", CoordMode::Utm);
        let mut track = Track::new("t");
        track.add_trackpoint(tp(10.0, 20.0), true);
        layer.add_track(track);
        layer.add_waypoint(Waypoint::new(
            "w",
            Coord::LatLon(LatLon::new(10.0, 20.0)),
        ));

        assert!(matches!(layer.tracks[0].points[0].coord, Coord::Utm(_)));
        assert!(matches!(layer.waypoints[0].coord, Coord::Utm(_)));
    }

    #[test]
    fn routes_and_tracks_are_kept_apart() {
        let mut layer = TrwLayer::new("layer", CoordMode::LatLon);
        layer.add_track(Track::new("track"));
        layer.add_track(Track::new_route("route"));
        assert_eq!(layer.track_count(), 1);
        assert_eq!(layer.route_count(), 1);
        assert!(layer.find_track("route").is_some());
    }

    #[test]
    fn bbox_is_union_of_members() {
        let mut layer = TrwLayer::new("layer", CoordMode::LatLon);
        let mut t1 = Track::new("a");
        t1.add_trackpoint(tp(0.0, 0.0), true);
        t1.add_trackpoint(tp(1.0, 1.0), true);
        let mut t2 = Track::new("b");
        t2.add_trackpoint(tp(-5.0, 3.0), true);
        layer.add_track(t1);
        layer.add_track(t2);
        layer.add_waypoint(Waypoint::new("w", Coord::LatLon(LatLon::new(2.0, -7.0))));
        layer.post_read();

        let bbox = layer.bbox();
        assert_eq!(bbox.north, 2.0);
        assert_eq!(bbox.south, -5.0);
        assert_eq!(bbox.east, 3.0);
        assert_eq!(bbox.west, -7.0);
    }

    #[test]
    fn empty_layer_reports_empty() {
        let layer = TrwLayer::new("layer", CoordMode::LatLon);
        assert!(layer.is_empty());
        assert!(!layer.bbox().is_valid());
    }
}
