//! GPX 1.0/1.1 parsing into a [`TrwLayer`]. Hand-rolled over quick-xml
//! events, one parse function per element. The reader is generic over
//! `BufRead` because the external-converter runner parses a child
//! process's stdout as it streams.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use log::info;
use logging_timer::time;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::coord::CoordMode;
use crate::error::GeotraxError;
use crate::trw::TrwLayer;

mod attributes;
mod point;
mod route;
mod track;

use route::parse_route;
use track::parse_track;

/// Read a GPX file into a fresh layer named after the file.
#[time]
pub fn read_gpx_from_file<P: AsRef<Path>>(input_file: P) -> Result<TrwLayer, GeotraxError> {
    let input_file = input_file.as_ref();
    info!("Reading GPX file {:?}", input_file);

    let name = input_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "GPX".to_string());
    let mut trw = TrwLayer::new(name, CoordMode::LatLon);

    let file = File::open(input_file)?;
    read_gpx_into_trw(BufReader::new(file), &mut trw)?;
    Ok(trw)
}

/// Parse a whole GPX document from `source`, appending its tracks,
/// routes and waypoints to `trw`.
#[time]
pub fn read_gpx_into_trw<R: std::io::BufRead>(
    source: R,
    trw: &mut TrwLayer,
) -> Result<(), GeotraxError> {
    let mut xml_reader = Reader::from_reader(source);
    let mut buf = Vec::new();
    let mut found_gpx = false;

    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"gpx" => {
                    found_gpx = true;
                    parse_gpx_contents(&mut xml_reader, trw)?;
                }
                e => {
                    let name = xml_reader.bytes_to_string(e)?;
                    return Err(GeotraxError::UnexpectedStartElement(name));
                }
            },
            Ok(Event::Eof) => {
                if !found_gpx {
                    return Err(GeotraxError::ElementNotFound("gpx".to_string()));
                }
                return Ok(());
            }
            Err(e) => return Err(e.into()),
            _ => (),
        }
    }
}

fn parse_gpx_contents<R: std::io::BufRead>(
    xml_reader: &mut Reader<R>,
    trw: &mut TrwLayer,
) -> Result<(), GeotraxError> {
    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();

    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"wpt" => {
                    let point = point::parse_point(&start, xml_reader)?;
                    trw.add_waypoint(point.into_waypoint());
                }
                b"trk" => {
                    let track = parse_track(&start, xml_reader)?;
                    trw.add_track(track);
                }
                b"rte" => {
                    let route = parse_route(&start, xml_reader)?;
                    trw.add_track(route);
                }
                // Metadata and foreign extensions carry nothing we model.
                _ => {
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
            },
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"gpx" {
                    return Ok(());
                }
            }
            Ok(Event::Eof) => return Err(GeotraxError::UnexpectedEof),
            Err(e) => return Err(e.into()),
            _ => (),
        }
    }
}

/// An extension trait for quick_xml::Reader that converts the underlying
/// bytes into usable str and String values.
pub(crate) trait XmlReaderConversions {
    fn bytes_to_cow<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, GeotraxError>;
    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, GeotraxError>;
}

impl<R> XmlReaderConversions for Reader<R> {
    #[inline]
    fn bytes_to_cow<'a>(&self, bytes: &'a [u8]) -> Result<Cow<'a, str>, GeotraxError> {
        // Everything must go through decode() for a proper conversion.
        Ok(self.decoder().decode(bytes)?)
    }

    #[inline]
    fn bytes_to_string(&self, bytes: &[u8]) -> Result<String, GeotraxError> {
        Ok(self.bytes_to_cow(bytes)?.into())
    }
}

/// An extension trait for quick_xml::Reader that makes it convenient to
/// read inner text and convert it to a specific type.
pub(crate) trait XmlReaderExtensions {
    fn read_inner_as_string(&mut self) -> Result<String, GeotraxError>;
    fn read_inner_as_time(&mut self) -> Result<i64, GeotraxError>;
    fn read_inner_as<T: FromStr>(&mut self) -> Result<T, GeotraxError>;
}

impl<R: std::io::BufRead> XmlReaderExtensions for Reader<R> {
    fn read_inner_as_string(&mut self) -> Result<String, GeotraxError> {
        let mut buf = Vec::new();
        match self.read_event_into(&mut buf) {
            Ok(Event::Text(text)) => {
                let unescaped = text.unescape()?;
                Ok(unescaped.into_owned())
            }
            event => {
                let s = format!("{:?}", event);
                Err(GeotraxError::MissingText(self.buffer_position(), s))
            }
        }
    }

    fn read_inner_as_time(&mut self) -> Result<i64, GeotraxError> {
        let t = self.read_inner_as_string()?;
        match chrono::DateTime::parse_from_rfc3339(&t) {
            Ok(dt) => Ok(dt.timestamp()),
            Err(e) => Err(GeotraxError::DateParseFailure(e.to_string())),
        }
    }

    fn read_inner_as<T: FromStr>(&mut self) -> Result<T, GeotraxError> {
        let value = self.read_inner_as_string()?;
        value.parse::<T>().map_err(|_| GeotraxError::ParseFailure {
            from: value,
            dest_type: std::any::type_name::<T>().to_string(),
        })
    }
}

/// A helper method to simplify tests. Often we need to get the contents
/// of an 'Event::Start' event type.
#[cfg(test)]
pub(crate) fn start_parse<'b, R: std::io::BufRead>(
    xml_reader: &mut Reader<R>,
    buf: &'b mut Vec<u8>,
) -> quick_xml::events::BytesStart<'b> {
    match xml_reader.read_event_into(buf).unwrap() {
        Event::Start(start) => start,
        other => panic!("Failed to parse Event::Start(_) element, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Coord;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx creator="unit test" version="1.1">
  <metadata><time>2024-02-02T10:10:54Z</time></metadata>
  <wpt lat="51.0" lon="-1.5">
    <ele>33.5</ele>
    <name>Start &amp; End</name>
    <cmt>comment</cmt>
    <sym>Flag</sym>
  </wpt>
  <trk>
    <name>morning</name>
    <trkseg>
      <trkpt lat="51.0" lon="-1.5"><ele>30.0</ele><time>2024-02-02T10:00:00Z</time></trkpt>
      <trkpt lat="51.001" lon="-1.5"><ele>31.0</ele><time>2024-02-02T10:00:10Z</time></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="51.002" lon="-1.5"><time>2024-02-02T10:10:00Z</time></trkpt>
    </trkseg>
  </trk>
  <rte>
    <name>way home</name>
    <rtept lat="51.0" lon="-1.4"/>
    <rtept lat="51.1" lon="-1.3"/>
  </rte>
</gpx>"#;

    #[test]
    fn whole_document_parses_into_layer() {
        let mut trw = TrwLayer::new("test", CoordMode::LatLon);
        read_gpx_into_trw(SAMPLE.as_bytes(), &mut trw).unwrap();

        assert_eq!(trw.waypoint_count(), 1);
        assert_eq!(trw.track_count(), 1);
        assert_eq!(trw.route_count(), 1);

        let wp = &trw.waypoints[0];
        assert_eq!(wp.name, "Start & End");
        assert_eq!(wp.altitude, Some(33.5));
        assert_eq!(wp.symbol.as_deref(), Some("Flag"));

        let track = &trw.tracks[0];
        assert_eq!(track.name, "morning");
        assert_eq!(track.point_count(), 3);
        assert_eq!(track.segment_count(), 2);
        assert!(track.points[0].new_segment);
        assert!(!track.points[1].new_segment);
        assert!(track.points[2].new_segment);
        assert_eq!(track.points[0].altitude, Some(30.0));
        assert!(track.points[0].timestamp.is_some());
        assert!(track.bbox.is_valid());

        let route = &trw.routes[0];
        assert!(route.is_route);
        assert_eq!(route.point_count(), 2);
        assert!(matches!(route.points[0].coord, Coord::LatLon(_)));
    }

    #[test]
    fn non_gpx_document_is_rejected() {
        let mut trw = TrwLayer::new("test", CoordMode::LatLon);
        let err = read_gpx_into_trw(&b"<kml></kml>"[..], &mut trw);
        assert!(matches!(err, Err(GeotraxError::UnexpectedStartElement(_))));
    }

    #[test]
    fn empty_document_is_rejected() {
        let mut trw = TrwLayer::new("test", CoordMode::LatLon);
        let err = read_gpx_into_trw(&b""[..], &mut trw);
        assert!(matches!(err, Err(GeotraxError::ElementNotFound(_))));
    }
}
