//! The shared point parser: `wpt`, `trkpt` and `rtept` all carry the
//! same element set, differing only in what the caller turns them into.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::coord::{Coord, LatLon};
use crate::error::GeotraxError;
use crate::track::Trackpoint;
use crate::waypoint::Waypoint;

use super::attributes::Attributes;
use super::XmlReaderExtensions;

#[derive(Debug, Default)]
pub(crate) struct GpxPoint {
    pub lat: f64,
    pub lon: f64,
    pub ele: Option<f64>,
    pub time: Option<i64>,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub symbol: Option<String>,
    pub link_href: Option<String>,
    pub fix: Option<String>,
    pub sat: Option<u32>,
    pub hdop: Option<f64>,
    pub vdop: Option<f64>,
    pub pdop: Option<f64>,
    /// GPX 1.0 course, degrees.
    pub course: Option<f64>,
    /// GPX 1.0 speed, m/s.
    pub speed: Option<f64>,
}

impl GpxPoint {
    pub(crate) fn into_trackpoint(self) -> Result<Trackpoint, GeotraxError> {
        let mut tp = Trackpoint::new(Coord::LatLon(LatLon::new(self.lat, self.lon)));
        tp.name = self.name;
        tp.timestamp = self.time;
        tp.altitude = self.ele;
        tp.speed = self.speed;
        tp.course = self.course.map(f64::to_radians);
        tp.fix = self.fix.map(TryInto::try_into).transpose()?;
        tp.hdop = self.hdop;
        tp.vdop = self.vdop;
        tp.pdop = self.pdop;
        tp.num_satellites = self.sat;
        Ok(tp)
    }

    pub(crate) fn into_waypoint(self) -> Waypoint {
        let name = self.name.unwrap_or_default();
        let mut wp = Waypoint::new(name, Coord::LatLon(LatLon::new(self.lat, self.lon)));
        wp.altitude = self.ele;
        wp.comment = self.comment;
        wp.description = self.description;
        wp.source = self.source;
        wp.symbol = self.symbol;
        wp.url = self.link_href;
        wp
    }
}

fn lat_lon_from_attributes<R>(
    start_element: &BytesStart<'_>,
    xml_reader: &Reader<R>,
) -> Result<(f64, f64), GeotraxError> {
    let mut attributes = Attributes::new(start_element, xml_reader)?;
    let lat: f64 = attributes.get("lat")?;
    let lon: f64 = attributes.get("lon")?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(GeotraxError::InvalidLatitude(lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(GeotraxError::InvalidLongitude(lon));
    }
    Ok((lat, lon))
}

/// A point that arrived as an empty element: position only.
pub(crate) fn point_from_empty<R>(
    start_element: &BytesStart<'_>,
    xml_reader: &Reader<R>,
) -> Result<GpxPoint, GeotraxError> {
    let (lat, lon) = lat_lon_from_attributes(start_element, xml_reader)?;
    Ok(GpxPoint {
        lat,
        lon,
        ..GpxPoint::default()
    })
}

pub(crate) fn parse_point<R: std::io::BufRead>(
    start_element: &BytesStart<'_>,
    xml_reader: &mut Reader<R>,
) -> Result<GpxPoint, GeotraxError> {
    let (lat, lon) = lat_lon_from_attributes(start_element, xml_reader)?;
    let mut point = GpxPoint {
        lat,
        lon,
        ..GpxPoint::default()
    };

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"ele" => {
                    point.ele = Some(xml_reader.read_inner_as()?);
                }
                b"time" => {
                    point.time = Some(xml_reader.read_inner_as_time()?);
                }
                b"name" => {
                    point.name = Some(xml_reader.read_inner_as_string()?);
                }
                b"cmt" => {
                    point.comment = Some(xml_reader.read_inner_as_string()?);
                }
                b"desc" => {
                    point.description = Some(xml_reader.read_inner_as_string()?);
                }
                b"src" => {
                    point.source = Some(xml_reader.read_inner_as_string()?);
                }
                b"sym" => {
                    point.symbol = Some(xml_reader.read_inner_as_string()?);
                }
                b"link" => {
                    let mut attributes = Attributes::new(&start, xml_reader)?;
                    if let Ok(href) = attributes.get::<String>("href") {
                        point.link_href = Some(href);
                    }
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
                b"fix" => {
                    point.fix = Some(xml_reader.read_inner_as_string()?);
                }
                b"sat" => {
                    point.sat = Some(xml_reader.read_inner_as()?);
                }
                b"hdop" => {
                    point.hdop = Some(xml_reader.read_inner_as()?);
                }
                b"vdop" => {
                    point.vdop = Some(xml_reader.read_inner_as()?);
                }
                b"pdop" => {
                    point.pdop = Some(xml_reader.read_inner_as()?);
                }
                b"course" => {
                    point.course = Some(xml_reader.read_inner_as()?);
                }
                b"speed" => {
                    point.speed = Some(xml_reader.read_inner_as()?);
                }
                // GPX 1.1 extensions and anything else we do not model.
                _ => {
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
            },
            Ok(Event::End(e)) => {
                if e.name().as_ref() == start_element.name().as_ref() {
                    return Ok(point);
                }
            }
            Ok(Event::Empty(_)) | Ok(Event::Text(_)) => (),
            Ok(Event::Eof) => return Err(GeotraxError::UnexpectedEof),
            Err(e) => return Err(e.into()),
            event => {
                let s = format!("{:?}", event);
                return Err(GeotraxError::UnexpectedEvent(s));
            }
        }
    }
}
