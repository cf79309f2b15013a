//! Waypoints from Wikipedia articles inside a bounding box, via the
//! geonames.org JSON endpoint.

use log::{info, warn};
use serde::Deserialize;

use super::DataSource;
use crate::acquire::{AcquireContext, DataSourceInputType, DataSourceMode, LoadStatus};
use crate::bbox::LatLonBBox;
use crate::coord::{Coord, LatLon};
use crate::download::{DownloadHandle, DownloadOptions};
use crate::error::GeotraxError;
use crate::progress::{CancelToken, ProgressSink};
use crate::waypoint::Waypoint;

const GEONAMES_BASE: &str = "http://api.geonames.org";

#[derive(Debug, Deserialize)]
struct GeonamesResponse {
    #[serde(default)]
    geonames: Vec<Geoname>,
}

#[derive(Debug, Deserialize)]
struct Geoname {
    title: Option<String>,
    lat: f64,
    lng: f64,
    elevation: Option<f64>,
    summary: Option<String>,
    #[serde(rename = "wikipediaUrl")]
    wikipedia_url: Option<String>,
}

impl Geoname {
    fn into_waypoint(self) -> Waypoint {
        let name = self.title.unwrap_or_else(|| "Wikipedia article".to_string());
        let mut wp = Waypoint::new(name, Coord::LatLon(LatLon::new(self.lat, self.lng)));
        wp.altitude = self.elevation;
        wp.description = self.summary;
        wp.url = self.wikipedia_url.map(|u| {
            if u.starts_with("http") {
                u
            } else {
                format!("http://{u}")
            }
        });
        wp.symbol = Some("wikipedia".to_string());
        wp
    }
}

pub(crate) fn parse_geonames_json(json: &str) -> Result<Vec<Waypoint>, GeotraxError> {
    let response: GeonamesResponse = serde_json::from_str(json)
        .map_err(|e| GeotraxError::ParseFailure {
            from: e.to_string(),
            dest_type: "geonames response".to_string(),
        })?;
    Ok(response
        .geonames
        .into_iter()
        .map(Geoname::into_waypoint)
        .collect())
}

/// Adds Wikipedia waypoints for the current viewport box to an existing
/// layer.
pub struct WikipediaSource {
    lang: String,
    max_results: u32,
    geonames_user: String,
}

impl WikipediaSource {
    pub fn new(lang: impl Into<String>, max_results: u32, geonames_user: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            max_results,
            geonames_user: geonames_user.into(),
        }
    }

    fn query_url(&self, bbox: &LatLonBBox) -> String {
        format!(
            "{GEONAMES_BASE}/wikipediaBoundingBoxJSON?formatted=true&north={}&south={}&east={}&west={}&lang={}&maxRows={}&username={}",
            bbox.north, bbox.south, bbox.east, bbox.west,
            self.lang, self.max_results, self.geonames_user
        )
    }
}

impl DataSource for WikipediaSource {
    fn source_id(&self) -> &'static str {
        "acq.wikipedia"
    }

    fn layer_title(&self) -> String {
        "Wikipedia Waypoints".to_string()
    }

    fn mode(&self) -> DataSourceMode {
        DataSourceMode::AddToLayer
    }

    fn input_type(&self) -> DataSourceInputType {
        DataSourceInputType::Trw
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let bbox = ctx.viewport_bbox;
        if !bbox.is_valid() {
            info!("No viewport box to search in");
            return LoadStatus::NotRequired;
        }

        let url = self.query_url(&bbox);
        progress.status("Searching Wikipedia articles");

        let handle = match DownloadHandle::new(&DownloadOptions::default()) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot build download client: {e}");
                return LoadStatus::Error;
            }
        };
        let body = match handle.fetch_string(&url) {
            Ok(body) => body,
            Err(e) => {
                warn!("Geonames query failed: {e}");
                progress.status("Unable to query geonames");
                return LoadStatus::Error;
            }
        };
        if cancel.is_cancelled() {
            return LoadStatus::Cancelled;
        }

        let waypoints = match parse_geonames_json(&body) {
            Ok(waypoints) => waypoints,
            Err(e) => {
                warn!("Geonames response did not parse: {e}");
                return LoadStatus::Error;
            }
        };

        let Some(trw) = ctx.trw_mut() else {
            return LoadStatus::InternalError;
        };
        let count = waypoints.len();
        for wp in waypoints {
            trw.add_waypoint(wp);
        }
        progress.status(&format!("Added {count} Wikipedia waypoints"));
        LoadStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geonames_json_becomes_waypoints() {
        let json = r#"{
  "geonames": [
    {
      "summary": "A prominent summit.",
      "elevation": 2962.0,
      "lng": 10.9863,
      "lat": 47.4211,
      "wikipediaUrl": "en.wikipedia.org/wiki/Zugspitze",
      "title": "Zugspitze"
    },
    { "lng": 11.0, "lat": 47.5, "title": "Minimal" }
  ]
}"#;
        let waypoints = parse_geonames_json(json).unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].name, "Zugspitze");
        assert_eq!(waypoints[0].altitude, Some(2962.0));
        assert_eq!(
            waypoints[0].url.as_deref(),
            Some("http://en.wikipedia.org/wiki/Zugspitze")
        );
        assert_eq!(waypoints[1].altitude, None);
    }

    #[test]
    fn empty_response_is_fine() {
        assert!(parse_geonames_json("{}").unwrap().is_empty());
    }

    #[test]
    fn query_url_carries_the_box() {
        let source = WikipediaSource::new("en", 50, "demo");
        let bbox = LatLonBBox::new(47.5, 47.0, 11.5, 10.5);
        let url = source.query_url(&bbox);
        assert!(url.contains("north=47.5"));
        assert!(url.contains("south=47"));
        assert!(url.contains("lang=en"));
        assert!(url.contains("maxRows=50"));
        assert!(url.contains("username=demo"));
    }
}
