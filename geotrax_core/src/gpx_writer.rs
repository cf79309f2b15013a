//! GPX emission for the subset we own: waypoints, tracks with their
//! segments, and routes. What this writes, the reader in [`crate::read`]
//! parses back structurally intact.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::DateTime;
use log::debug;
use logging_timer::time;
use quick_xml::escape::escape;

use crate::error::GeotraxError;
use crate::track::{Track, Trackpoint};
use crate::trw::TrwLayer;
use crate::waypoint::Waypoint;

const CREATOR: &str = concat!("geotrax ", env!("CARGO_PKG_VERSION"));

/// What to include in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputOptions {
    /// Everything the layer holds.
    #[default]
    Full,
    /// Only items marked visible, the shape handed to external
    /// converters.
    VisibleOnly,
}

pub fn write_gpx_file<P: AsRef<Path>>(
    output_file: P,
    trw: &TrwLayer,
    options: OutputOptions,
) -> Result<(), GeotraxError> {
    let output_file = output_file.as_ref();
    let file = File::create(output_file).map_err(|source| GeotraxError::CreateFile {
        path: output_file.to_owned(),
        source,
    })?;
    let mut w = BufWriter::new(file);
    write_gpx(&mut w, trw, options)?;
    debug!("Wrote GPX to {:?}", output_file);
    Ok(())
}

#[time]
pub fn write_gpx<W: Write>(
    w: &mut W,
    trw: &TrwLayer,
    options: OutputOptions,
) -> Result<(), GeotraxError> {
    writeln!(w, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        w,
        "<gpx creator=\"{CREATOR}\" version=\"1.1\" xmlns=\"http://www.topografix.com/GPX/1/1\">"
    )?;

    for wp in &trw.waypoints {
        if options == OutputOptions::VisibleOnly && !wp.visible {
            continue;
        }
        write_waypoint(w, wp)?;
    }
    for track in &trw.tracks {
        write_track(w, track)?;
    }
    for route in &trw.routes {
        write_route(w, route)?;
    }

    writeln!(w, "</gpx>")?;
    w.flush()?;
    Ok(())
}

/// Write a single track as its own document, for handing one track to an
/// external converter.
pub fn write_track_file<P: AsRef<Path>>(
    output_file: P,
    track: &Track,
) -> Result<(), GeotraxError> {
    let output_file = output_file.as_ref();
    let file = File::create(output_file).map_err(|source| GeotraxError::CreateFile {
        path: output_file.to_owned(),
        source,
    })?;
    let mut w = BufWriter::new(file);
    writeln!(w, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    writeln!(
        w,
        "<gpx creator=\"{CREATOR}\" version=\"1.1\" xmlns=\"http://www.topografix.com/GPX/1/1\">"
    )?;
    if track.is_route {
        write_route(&mut w, track)?;
    } else {
        write_track(&mut w, track)?;
    }
    writeln!(w, "</gpx>")?;
    w.flush()?;
    Ok(())
}

fn format_time(timestamp: i64) -> String {
    match DateTime::from_timestamp(timestamp, 0) {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => String::new(),
    }
}

fn write_string_element<W: Write>(
    w: &mut W,
    indent: &str,
    tag: &str,
    value: &Option<String>,
) -> Result<(), GeotraxError> {
    if let Some(value) = value {
        writeln!(w, "{indent}<{tag}>{}</{tag}>", escape(value.as_str()))?;
    }
    Ok(())
}

fn write_waypoint<W: Write>(w: &mut W, wp: &Waypoint) -> Result<(), GeotraxError> {
    let ll = wp.coord.to_latlon();
    writeln!(w, "  <wpt lat=\"{:.6}\" lon=\"{:.6}\">", ll.lat, ll.lon)?;
    if let Some(ele) = wp.altitude {
        writeln!(w, "    <ele>{ele:.1}</ele>")?;
    }
    if !wp.name.is_empty() {
        writeln!(w, "    <name>{}</name>", escape(wp.name.as_str()))?;
    }
    write_string_element(w, "    ", "cmt", &wp.comment)?;
    write_string_element(w, "    ", "desc", &wp.description)?;
    write_string_element(w, "    ", "src", &wp.source)?;
    if let Some(url) = &wp.url {
        writeln!(w, "    <link href=\"{}\"></link>", escape(url.as_str()))?;
    }
    write_string_element(w, "    ", "sym", &wp.symbol)?;
    writeln!(w, "  </wpt>")?;
    Ok(())
}

fn write_track_header<W: Write>(w: &mut W, track: &Track) -> Result<(), GeotraxError> {
    if !track.name.is_empty() {
        writeln!(w, "    <name>{}</name>", escape(track.name.as_str()))?;
    }
    write_string_element(w, "    ", "cmt", &track.comment)?;
    write_string_element(w, "    ", "desc", &track.description)?;
    write_string_element(w, "    ", "src", &track.source)?;
    write_string_element(w, "    ", "type", &track.type_)?;
    Ok(())
}

fn write_track<W: Write>(w: &mut W, track: &Track) -> Result<(), GeotraxError> {
    writeln!(w, "  <trk>")?;
    write_track_header(w, track)?;

    let mut open = false;
    for tp in &track.points {
        if tp.new_segment && open {
            writeln!(w, "    </trkseg>")?;
            open = false;
        }
        if !open {
            writeln!(w, "    <trkseg>")?;
            open = true;
        }
        write_trackpoint(w, tp, "trkpt")?;
    }
    if open {
        writeln!(w, "    </trkseg>")?;
    }

    writeln!(w, "  </trk>")?;
    Ok(())
}

fn write_route<W: Write>(w: &mut W, route: &Track) -> Result<(), GeotraxError> {
    writeln!(w, "  <rte>")?;
    write_track_header(w, route)?;
    for tp in &route.points {
        write_trackpoint(w, tp, "rtept")?;
    }
    writeln!(w, "  </rte>")?;
    Ok(())
}

fn write_trackpoint<W: Write>(
    w: &mut W,
    point: &Trackpoint,
    tag: &str,
) -> Result<(), GeotraxError> {
    let ll = point.coord.to_latlon();
    writeln!(w, "      <{tag} lat=\"{:.6}\" lon=\"{:.6}\">", ll.lat, ll.lon)?;
    if let Some(ele) = point.altitude {
        writeln!(w, "        <ele>{ele:.1}</ele>")?;
    }
    if let Some(ts) = point.timestamp {
        writeln!(w, "        <time>{}</time>", format_time(ts))?;
    }
    if let Some(name) = &point.name {
        writeln!(w, "        <name>{}</name>", escape(name.as_str()))?;
    }
    if let Some(course) = point.course {
        writeln!(w, "        <course>{:.1}</course>", course.to_degrees())?;
    }
    if let Some(speed) = point.speed {
        writeln!(w, "        <speed>{speed:.2}</speed>")?;
    }
    if let Some(fix) = point.fix {
        writeln!(w, "        <fix>{fix}</fix>")?;
    }
    if let Some(sat) = point.num_satellites {
        writeln!(w, "        <sat>{sat}</sat>")?;
    }
    if let Some(hdop) = point.hdop {
        writeln!(w, "        <hdop>{hdop}</hdop>")?;
    }
    if let Some(vdop) = point.vdop {
        writeln!(w, "        <vdop>{vdop}</vdop>")?;
    }
    if let Some(pdop) = point.pdop {
        writeln!(w, "        <pdop>{pdop}</pdop>")?;
    }
    writeln!(w, "      </{tag}>")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Coord, CoordMode, LatLon};
    use crate::read::read_gpx_into_trw;
    use crate::track::Trackpoint;

    fn sample_layer() -> TrwLayer {
        let mut trw = TrwLayer::new("sample", CoordMode::LatLon);

        let mut wp = Waypoint::new("Summit & Back", Coord::LatLon(LatLon::new(47.3, 13.8)));
        wp.altitude = Some(2_300.5);
        wp.symbol = Some("Summit".to_string());
        trw.add_waypoint(wp);

        let mut track = Track::new("ascent <1>");
        for (i, (lat, lon)) in [(47.30, 13.80), (47.31, 13.80), (47.32, 13.81)]
            .iter()
            .enumerate()
        {
            let mut tp = Trackpoint::new(Coord::LatLon(LatLon::new(*lat, *lon)));
            tp.timestamp = Some(1_700_000_000 + i as i64 * 30);
            tp.altitude = Some(2_000.0 + i as f64 * 50.0);
            tp.new_segment = i == 2; // second segment for the last point
            track.add_trackpoint(tp, true);
        }
        trw.add_track(track);

        let mut route = Track::new_route("down");
        route.add_trackpoint(
            Trackpoint::new(Coord::LatLon(LatLon::new(47.32, 13.81))),
            true,
        );
        route.add_trackpoint(
            Trackpoint::new(Coord::LatLon(LatLon::new(47.30, 13.80))),
            true,
        );
        trw.add_track(route);

        trw.post_read();
        trw
    }

    #[test]
    fn round_trip_is_structurally_equal() {
        let original = sample_layer();
        let mut bytes = Vec::new();
        write_gpx(&mut bytes, &original, OutputOptions::Full).unwrap();

        let mut reread = TrwLayer::new("sample", CoordMode::LatLon);
        read_gpx_into_trw(bytes.as_slice(), &mut reread).unwrap();
        reread.post_read();

        assert_eq!(reread.waypoint_count(), 1);
        assert_eq!(reread.track_count(), 1);
        assert_eq!(reread.route_count(), 1);

        assert_eq!(reread.waypoints[0].name, original.waypoints[0].name);
        assert_eq!(reread.waypoints[0].altitude, original.waypoints[0].altitude);

        let (t0, t1) = (&original.tracks[0], &reread.tracks[0]);
        assert_eq!(t1.name, t0.name);
        assert_eq!(t1.point_count(), t0.point_count());
        assert_eq!(t1.segment_count(), t0.segment_count());
        for (a, b) in t0.points.iter().zip(t1.points.iter()) {
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.altitude, b.altitude);
            assert_eq!(a.new_segment, b.new_segment);
        }

        assert_eq!(reread.routes[0].point_count(), 2);
        assert_eq!(*reread.bbox(), *original.bbox());
    }

    #[test]
    fn invisible_waypoints_can_be_stripped() {
        let mut trw = sample_layer();
        trw.waypoints[0].visible = false;

        let mut bytes = Vec::new();
        write_gpx(&mut bytes, &trw, OutputOptions::VisibleOnly).unwrap();
        let out = String::from_utf8(bytes).unwrap();
        assert!(!out.contains("<wpt"));

        let mut bytes = Vec::new();
        write_gpx(&mut bytes, &trw, OutputOptions::Full).unwrap();
        let out = String::from_utf8(bytes).unwrap();
        assert!(out.contains("<wpt"));
    }

    #[test]
    fn timestamps_format_as_rfc3339() {
        assert_eq!(format_time(0), "1970-01-01T00:00:00Z");
        assert_eq!(format_time(1_700_000_000), "2023-11-14T22:13:20Z");
    }
}
