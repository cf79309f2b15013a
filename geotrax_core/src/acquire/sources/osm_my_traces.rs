//! The OSM "my traces" source: list the authenticated user's GPX files
//! from the OSM API, download the selected ones, and deliver one layer
//! per trace.

use log::{info, warn};
use quick_xml::events::Event;
use quick_xml::Reader;

use super::DataSource;
use crate::acquire::{AcquireContext, DataSourceMode, LoadStatus};
use crate::download::{DownloadHandle, DownloadOptions};
use crate::error::GeotraxError;
use crate::progress::{CancelToken, ProgressSink};
use crate::read::read_gpx_into_trw;
use crate::trw::TrwLayer;

const OSM_API_BASE: &str = "http://api.openstreetmap.org/api/0.6";

/// One entry of the user's trace listing.
#[derive(Debug, Clone, PartialEq)]
pub struct OsmTraceEntry {
    pub id: u64,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

/// Creates one TRW layer per selected trace, delivered through the
/// context as each finishes; hence `ManualLayerManagement`.
pub struct OsmMyTracesSource {
    username: String,
    password: String,
    /// Trace ids to fetch; `None` means every listed trace.
    selection: Option<Vec<u64>>,
}

impl OsmMyTracesSource {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            selection: None,
        }
    }

    pub fn with_selection(mut self, ids: Vec<u64>) -> Self {
        self.selection = Some(ids);
        self
    }

    fn wanted(&self, id: u64) -> bool {
        match &self.selection {
            Some(ids) => ids.contains(&id),
            None => true,
        }
    }
}

/// Parse the `gpx_files` listing document into its entries.
pub(crate) fn parse_trace_listing(xml: &str) -> Result<Vec<OsmTraceEntry>, GeotraxError> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut entries = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                if start.name().as_ref() != b"gpx_file" {
                    continue;
                }
                let mut id = None;
                let mut name = String::new();
                let mut lat = None;
                let mut lon = None;
                for attr in start.attributes() {
                    let attr = attr?;
                    let value = attr.unescape_value()?;
                    match attr.key.as_ref() {
                        b"id" => id = value.parse::<u64>().ok(),
                        b"name" => name = value.into_owned(),
                        b"lat" => lat = value.parse::<f64>().ok(),
                        b"lon" => lon = value.parse::<f64>().ok(),
                        _ => (),
                    }
                }
                match id {
                    Some(id) => entries.push(OsmTraceEntry { id, name, lat, lon }),
                    None => warn!("gpx_file entry without an id, skipping"),
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => (),
        }
    }
    Ok(entries)
}

impl DataSource for OsmMyTracesSource {
    fn source_id(&self) -> &'static str {
        "acq.osm-my-traces"
    }

    fn layer_title(&self) -> String {
        "OSM My Traces".to_string()
    }

    fn mode(&self) -> DataSourceMode {
        DataSourceMode::ManualLayerManagement
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let dl_options = DownloadOptions::with_basic_auth(&self.username, &self.password);
        let handle = match DownloadHandle::new(&dl_options) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Cannot build download client: {e}");
                return LoadStatus::Error;
            }
        };

        let listing_url = format!("{OSM_API_BASE}/user/gpx_files");
        progress.status("Fetching trace list");
        let listing = match handle.fetch_string(&listing_url) {
            Ok(listing) => listing,
            Err(e) => {
                warn!("Cannot fetch trace listing: {e}");
                progress.status(&format!("Unable to get trace: {listing_url}"));
                return LoadStatus::Error;
            }
        };
        let entries = match parse_trace_listing(&listing) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot parse trace listing: {e}");
                return LoadStatus::Error;
            }
        };
        info!("OSM lists {} traces", entries.len());

        let mut fetched = 0;
        for entry in entries.iter().filter(|e| self.wanted(e.id)) {
            if cancel.is_cancelled() {
                return LoadStatus::Cancelled;
            }

            let url = format!("{OSM_API_BASE}/gpx/{}/data", entry.id);
            progress.status(&format!("Downloading trace {}", entry.name));

            let tmp = match tempfile::NamedTempFile::new() {
                Ok(tmp) => tmp,
                Err(e) => {
                    warn!("Cannot create temporary file: {e}");
                    return LoadStatus::IntermediateFileAccess;
                }
            };
            if let Err(e) = handle.perform_download(&url, tmp.path()) {
                warn!("Trace {} failed: {e}", entry.id);
                progress.status(&format!("Unable to get trace: {url}"));
                continue;
            }

            let title = if entry.name.is_empty() {
                format!("OSM trace {}", entry.id)
            } else {
                entry.name.clone()
            };
            let mut layer = TrwLayer::new(title, ctx.coord_mode);
            let file = match std::fs::File::open(tmp.path()) {
                Ok(file) => file,
                Err(e) => {
                    warn!("Cannot reopen downloaded trace: {e}");
                    continue;
                }
            };
            match read_gpx_into_trw(std::io::BufReader::new(file), &mut layer) {
                Ok(()) if !layer.is_empty() => {
                    ctx.deliver_layer(layer);
                    fetched += 1;
                }
                Ok(()) => info!("Trace {} is empty, skipping", entry.id),
                Err(e) => warn!("Trace {} did not parse: {e}", entry.id),
            }
        }

        progress.status(&format!("Fetched {fetched} traces"));
        LoadStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_parses_entries_and_skips_broken_ones() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<osm version="0.6" generator="OpenStreetMap server">
  <gpx_file id="2418167" name="lunch.gpx" lat="49.5" lon="17.0"
            visibility="public" pending="false">
    <description>lunch ride</description>
    <tag>bike</tag>
  </gpx_file>
  <gpx_file id="2418168" name="empty.gpx"/>
  <gpx_file name="no-id.gpx"/>
</osm>"#;
        let entries = parse_trace_listing(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, 2_418_167);
        assert_eq!(entries[0].name, "lunch.gpx");
        assert_eq!(entries[0].lat, Some(49.5));
        assert_eq!(entries[1].id, 2_418_168);
        assert_eq!(entries[1].lat, None);
    }

    #[test]
    fn selection_filters_traces() {
        let source = OsmMyTracesSource::new("user", "pass").with_selection(vec![7, 9]);
        assert!(source.wanted(7));
        assert!(!source.wanted(8));
        let all = OsmMyTracesSource::new("user", "pass");
        assert!(all.wanted(8));
    }
}
