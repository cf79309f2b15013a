use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::GeotraxError;
use crate::track::Track;

use super::point::{parse_point, point_from_empty};
use super::XmlReaderExtensions;

/// A `rte` element becomes a route: a track with no time or speed
/// semantics.
pub(crate) fn parse_route<R: std::io::BufRead>(
    start_element: &BytesStart<'_>,
    xml_reader: &mut Reader<R>,
) -> Result<Track, GeotraxError> {
    let mut route = Track::new_route("");

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"name" => {
                    route.name = xml_reader.read_inner_as_string()?;
                }
                b"cmt" => {
                    route.comment = Some(xml_reader.read_inner_as_string()?);
                }
                b"desc" => {
                    route.description = Some(xml_reader.read_inner_as_string()?);
                }
                b"src" => {
                    route.source = Some(xml_reader.read_inner_as_string()?);
                }
                b"type" => {
                    route.type_ = Some(xml_reader.read_inner_as_string()?);
                }
                b"rtept" => {
                    let point = parse_point(&start, xml_reader)?;
                    route.add_trackpoint(point.into_trackpoint()?, false);
                }
                _ => {
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
            },
            Ok(Event::Empty(start)) => {
                if start.name().as_ref() == b"rtept" {
                    let point = point_from_empty(&start, xml_reader)?;
                    route.add_trackpoint(point.into_trackpoint()?, false);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == start_element.name().as_ref() {
                    route.calculate_bounds();
                    return Ok(route);
                }
            }
            Ok(Event::Text(_)) => (),
            Ok(Event::Eof) => return Err(GeotraxError::UnexpectedEof),
            Err(e) => return Err(e.into()),
            event => {
                let s = format!("{:?}", event);
                return Err(GeotraxError::UnexpectedEvent(s));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::start_parse;

    #[test]
    fn route_points_carry_no_time() {
        let xml = r#"<rte>
            <name>commute</name>
            <rtept lat="1.0" lon="2.0"><time>2024-02-02T10:00:00Z</time></rtept>
            <rtept lat="1.1" lon="2.1"/>
          </rte>"#;
        let mut xml_reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let start = start_parse(&mut xml_reader, &mut buf);
        let route = parse_route(&start, &mut xml_reader).unwrap();

        assert!(route.is_route);
        assert_eq!(route.name, "commute");
        assert_eq!(route.point_count(), 2);
        // Whatever the file says, a route point has no timestamp.
        assert!(route.points[0].timestamp.is_none());
    }
}
