use super::DataSource;
use crate::acquire::options::AcquireOptions;
use crate::acquire::{AcquireContext, LoadStatus};
use crate::babel::{BabelConfig, BabelProcess};
use crate::download::DownloadOptions;
use crate::progress::{CancelToken, ProgressSink};

/// Download from a GPS device over a serial port, via the external
/// converter's device protocols (e.g. `garmin` on `/dev/ttyUSB0`).
pub struct GpsSource {
    protocol: String,
    port: String,
    get_tracks: bool,
    get_routes: bool,
    get_waypoints: bool,
    babel: BabelConfig,
}

impl GpsSource {
    pub fn new(protocol: impl Into<String>, port: impl Into<String>, babel: BabelConfig) -> Self {
        Self {
            protocol: protocol.into(),
            port: port.into(),
            get_tracks: true,
            get_routes: true,
            get_waypoints: true,
            babel,
        }
    }

    pub fn with_selection(mut self, tracks: bool, routes: bool, waypoints: bool) -> Self {
        self.get_tracks = tracks;
        self.get_routes = routes;
        self.get_waypoints = waypoints;
        self
    }
}

impl DataSource for GpsSource {
    fn source_id(&self) -> &'static str {
        "acq.gps"
    }

    fn layer_title(&self) -> String {
        format!("GPS ({})", self.protocol)
    }

    fn autoview(&self) -> bool {
        true
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let mut process = BabelProcess::new(&self.babel);
        if self.get_tracks {
            process.options.push("-t".to_string());
        }
        if self.get_routes {
            process.options.push("-r".to_string());
        }
        if self.get_waypoints {
            process.options.push("-w".to_string());
        }
        process.set_input(Some(&self.protocol), self.port.clone());

        let options = AcquireOptions::FromExternalConverter { process };
        options.import(
            &self.babel,
            ctx,
            &DownloadOptions::default(),
            progress,
            cancel,
        )
    }
}
