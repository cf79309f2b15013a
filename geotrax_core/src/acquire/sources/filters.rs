//! Filters: acquire sources whose input is existing TRW data (or one
//! selected track). The input is a snapshot held by the invocation
//! context; if nothing was snapshotted the filter refuses cleanly.

use log::warn;

use super::DataSource;
use crate::acquire::{AcquireContext, DataSourceInputType, LoadStatus};
use crate::babel::{BabelConfig, BabelProcess};
use crate::gpx_writer::{self, OutputOptions};
use crate::progress::{CancelToken, ProgressSink};

/// A gpsbabel `-x` filter applied to existing data: the snapshot is
/// written to a temp GPX, pushed through the converter, and the result
/// lands in a fresh layer.
pub struct BabelFilterSource {
    id: &'static str,
    title: String,
    filter_args: Vec<String>,
    input: DataSourceInputType,
    babel: BabelConfig,
}

impl BabelFilterSource {
    /// Reduce every track to at most `count` points.
    pub fn simplify(count: u32, babel: BabelConfig) -> Self {
        Self {
            id: "filter.simplify",
            title: format!("Simplified to {count} points"),
            filter_args: vec!["-x".to_string(), format!("simplify,count={count}")],
            input: DataSourceInputType::Trw,
            babel,
        }
    }

    /// Compress tracks with a cross-track error threshold, e.g. "0.001k".
    pub fn compress(error: &str, babel: BabelConfig) -> Self {
        Self {
            id: "filter.compress",
            title: "Compressed".to_string(),
            filter_args: vec![
                "-x".to_string(),
                format!("simplify,crosstrack,error={error}"),
            ],
            input: DataSourceInputType::Trw,
            babel,
        }
    }

    /// Drop waypoints sharing a location.
    pub fn remove_duplicates(babel: BabelConfig) -> Self {
        Self {
            id: "filter.dup",
            title: "Duplicates removed".to_string(),
            filter_args: vec!["-x".to_string(), "duplicate,location".to_string()],
            input: DataSourceInputType::Trw,
            babel,
        }
    }

    /// Keep only data inside (or outside) the polygon file.
    pub fn polygon(file: &std::path::Path, inside: bool, babel: BabelConfig) -> Self {
        let expr = if inside {
            format!("polygon,file={}", file.display())
        } else {
            format!("polygon,exclude,file={}", file.display())
        };
        Self {
            id: if inside {
                "filter.polygon-inside"
            } else {
                "filter.polygon-outside"
            },
            title: "Polygon filtered".to_string(),
            filter_args: vec!["-x".to_string(), expr],
            input: DataSourceInputType::Trw,
            babel,
        }
    }

    /// Simplify a single selected track.
    pub fn simplify_track(count: u32, babel: BabelConfig) -> Self {
        Self {
            id: "filter.simplify-track",
            title: format!("Track simplified to {count} points"),
            filter_args: vec!["-x".to_string(), format!("simplify,count={count}")],
            input: DataSourceInputType::TrwTrack,
            babel,
        }
    }
}

impl DataSource for BabelFilterSource {
    fn source_id(&self) -> &'static str {
        self.id
    }

    fn layer_title(&self) -> String {
        self.title.clone()
    }

    fn input_type(&self) -> DataSourceInputType {
        self.input
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let tmp = match tempfile::Builder::new().suffix(".gpx").tempfile() {
            Ok(tmp) => tmp,
            Err(e) => {
                warn!("Cannot create temporary file: {e}");
                return LoadStatus::IntermediateFileAccess;
            }
        };

        // Write the snapshot this filter operates on. A missing snapshot
        // (the selection disappeared before the filter ran) is a clean
        // refusal, not an error.
        let written = match self.input {
            DataSourceInputType::TrwTrack => match &ctx.filter_track {
                Some(track) => gpx_writer::write_track_file(tmp.path(), track),
                None => return LoadStatus::NotRequired,
            },
            _ => match &ctx.filter_layer {
                Some(layer) => {
                    gpx_writer::write_gpx_file(tmp.path(), layer, OutputOptions::VisibleOnly)
                }
                None => return LoadStatus::NotRequired,
            },
        };
        if let Err(e) = written {
            warn!("Cannot write filter input: {e}");
            return LoadStatus::IntermediateFileAccess;
        }

        let Some(trw) = ctx.trw.as_mut() else {
            return LoadStatus::InternalError;
        };
        let mut process = BabelProcess::new(&self.babel);
        process
            .set_input(Some("gpx"), tmp.path().to_string_lossy().into_owned())
            .set_filters(self.filter_args.clone())
            .set_output("gpx", "-");
        process.convert_through_gpx(trw, progress, cancel)
    }
}

/// The manual waypoint selection filter: copies the chosen waypoints of
/// the snapshot layer into a fresh one. Pure in-core, no converter.
pub struct WaypointSelectionFilter {
    names: Vec<String>,
}

impl WaypointSelectionFilter {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }
}

impl DataSource for WaypointSelectionFilter {
    fn source_id(&self) -> &'static str {
        "filter.waypoint-selection"
    }

    fn layer_title(&self) -> String {
        "Selected Waypoints".to_string()
    }

    fn input_type(&self) -> DataSourceInputType {
        DataSourceInputType::Trw
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        _progress: &dyn ProgressSink,
        _cancel: &CancelToken,
    ) -> LoadStatus {
        let Some(layer) = ctx.filter_layer.take() else {
            return LoadStatus::NotRequired;
        };
        let Some(trw) = ctx.trw.as_mut() else {
            return LoadStatus::InternalError;
        };
        for wp in &layer.waypoints {
            if self.names.iter().any(|n| *n == wp.name) {
                trw.add_waypoint(wp.clone());
            }
        }
        LoadStatus::Success
    }
}
