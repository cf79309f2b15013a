use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::GeotraxError;
use crate::track::Track;

use super::point::parse_point;
use super::XmlReaderExtensions;

pub(crate) fn parse_track<R: std::io::BufRead>(
    start_element: &BytesStart<'_>,
    xml_reader: &mut Reader<R>,
) -> Result<Track, GeotraxError> {
    let mut track = Track::new("");

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"name" => {
                    track.name = xml_reader.read_inner_as_string()?;
                }
                b"cmt" => {
                    track.comment = Some(xml_reader.read_inner_as_string()?);
                }
                b"desc" => {
                    track.description = Some(xml_reader.read_inner_as_string()?);
                }
                b"src" => {
                    track.source = Some(xml_reader.read_inner_as_string()?);
                }
                b"type" => {
                    track.type_ = Some(xml_reader.read_inner_as_string()?);
                }
                b"trkseg" => {
                    parse_track_segment(xml_reader, &mut track)?;
                }
                _ => {
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
            },
            Ok(Event::End(e)) => {
                if e.name().as_ref() == start_element.name().as_ref() {
                    track.calculate_bounds();
                    return Ok(track);
                }
            }
            Ok(Event::Text(_)) | Ok(Event::Empty(_)) => (),
            Ok(Event::Eof) => return Err(GeotraxError::UnexpectedEof),
            Err(e) => return Err(e.into()),
            event => {
                let s = format!("{:?}", event);
                return Err(GeotraxError::UnexpectedEvent(s));
            }
        }
    }
}

/// One `trkseg`: its first point opens a new segment in the flat point
/// list.
fn parse_track_segment<R: std::io::BufRead>(
    xml_reader: &mut Reader<R>,
    track: &mut Track,
) -> Result<(), GeotraxError> {
    let mut first_in_segment = true;

    let mut buf = Vec::new();
    let mut skip_buf = Vec::new();
    loop {
        buf.clear();
        match xml_reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) => match start.name().as_ref() {
                b"trkpt" => {
                    let point = parse_point(&start, xml_reader)?;
                    let mut tp = point.into_trackpoint()?;
                    tp.new_segment = first_in_segment;
                    first_in_segment = false;
                    track.add_trackpoint(tp, false);
                }
                _ => {
                    xml_reader.read_to_end_into(start.name(), &mut skip_buf)?;
                }
            },
            Ok(Event::Empty(start)) => {
                if start.name().as_ref() == b"trkpt" {
                    let point = super::point::point_from_empty(&start, xml_reader)?;
                    let mut tp = point.into_trackpoint()?;
                    tp.new_segment = first_in_segment;
                    first_in_segment = false;
                    track.add_trackpoint(tp, false);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"trkseg" {
                    return Ok(());
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
    fn multi_segment_track_parses() {
        let xml = r#"<trk>
            <name>hill repeats</name>
            <type>running</type>
            <trkseg>
              <trkpt lat="1.0" lon="2.0"/>
              <trkpt lat="1.1" lon="2.0"/>
            </trkseg>
            <trkseg>
              <trkpt lat="1.2" lon="2.0"/>
            </trkseg>
          </trk>"#;
        let mut xml_reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let start = start_parse(&mut xml_reader, &mut buf);
        let track = parse_track(&start, &mut xml_reader).unwrap();

        assert_eq!(track.name, "hill repeats");
        assert_eq!(track.type_.as_deref(), Some("running"));
        assert_eq!(track.point_count(), 3);
        assert_eq!(track.segment_count(), 2);
        assert!(track.bbox.is_valid());
    }

    #[test]
    fn empty_track_is_fine() {
        let xml = r#"<trk><name>empty</name></trk>"#;
        let mut xml_reader = Reader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        let start = start_parse(&mut xml_reader, &mut buf);
        let track = parse_track(&start, &mut xml_reader).unwrap();
        assert!(track.is_empty());
    }
}
