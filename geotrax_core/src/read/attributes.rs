use std::collections::HashMap;
use std::str::FromStr;

use quick_xml::events::BytesStart;
use quick_xml::Reader;

use crate::error::GeotraxError;

use super::XmlReaderConversions;

/// The attributes of one start element, consumed by typed `get` calls so
/// that leftovers can be detected.
#[derive(Debug)]
pub(crate) struct Attributes {
    attributes: HashMap<String, String>,
}

impl Attributes {
    pub(crate) fn new<R>(
        start_element: &BytesStart<'_>,
        xml_reader: &Reader<R>,
    ) -> Result<Self, GeotraxError> {
        let mut attributes = HashMap::new();
        for attr in start_element.attributes() {
            let attr = attr?;
            let key = xml_reader.bytes_to_string(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();
            attributes.insert(key, value);
        }
        Ok(Self { attributes })
    }

    pub(crate) fn get<T: FromStr>(&mut self, key: &str) -> Result<T, GeotraxError> {
        let value = self
            .attributes
            .remove(key)
            .ok_or_else(|| GeotraxError::MandatoryAttributeNotFound(key.to_string()))?;
        value.parse::<T>().map_err(|_| GeotraxError::ParseFailure {
            from: value,
            dest_type: std::any::type_name::<T>().to_string(),
        })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::start_parse;

    #[test]
    fn typed_gets_consume_attributes() {
        let mut xml_reader = Reader::from_reader(&br#"<trkpt lat="51.1" lon="-1.5">x</trkpt>"#[..]);
        let mut buf = Vec::new();
        let start = start_parse(&mut xml_reader, &mut buf);
        let mut attributes = Attributes::new(&start, &xml_reader).unwrap();
        let lat: f64 = attributes.get("lat").unwrap();
        let lon: f64 = attributes.get("lon").unwrap();
        assert_eq!(lat, 51.1);
        assert_eq!(lon, -1.5);
        assert!(attributes.is_empty());
    }

    #[test]
    fn missing_attribute_is_an_error() {
        let mut xml_reader = Reader::from_reader(&br#"<trkpt lat="51.1">x</trkpt>"#[..]);
        let mut buf = Vec::new();
        let start = start_parse(&mut xml_reader, &mut buf);
        let mut attributes = Attributes::new(&start, &xml_reader).unwrap();
        let result: Result<f64, _> = attributes.get("lon");
        assert!(matches!(
            result,
            Err(GeotraxError::MandatoryAttributeNotFound(_))
        ));
    }
}
