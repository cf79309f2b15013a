//! The acquire pipeline: pull GPS data from a configured source into a
//! TRW container on a background worker, with progress reporting and
//! cancellation.
//!
//! The worker owns no GUI handles. It emits [`AcquireEvent`]s over a
//! channel; whoever opened the acquisition (a progress dialog, the CLI)
//! owns the receiver and performs the tree attachment when the final
//! `Completed` event delivers the populated layer. Until then no tree
//! mutation is observable, and on success the attachment is one burst.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use crate::bbox::LatLonBBox;
use crate::coord::CoordMode;
use crate::error::GeotraxError;
use crate::progress::{CancelToken, ProgressSink};
use crate::track::Track;
use crate::trw::TrwLayer;

pub mod options;
pub mod sources;

use sources::DataSource;

/// Result codes surfaced by acquire components. Returned by value; they
/// never cross an API boundary as a panic or exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Success,
    /// Nothing needed doing (e.g. a filter with no input to act on).
    NotRequired,
    /// Generic parse or conversion failure.
    Error,
    /// An input file could not be opened or read.
    FileAccess,
    /// A temporary file could not be created or read.
    IntermediateFileAccess,
    /// An invariant was violated: unexpected mode or enum value.
    InternalError,
    /// The user cancelled.
    Cancelled,
}

impl LoadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, LoadStatus::Success | LoadStatus::NotRequired)
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStatus::Success => "success",
            LoadStatus::NotRequired => "not required",
            LoadStatus::Error => "error",
            LoadStatus::FileAccess => "cannot access file",
            LoadStatus::IntermediateFileAccess => "cannot access intermediate file",
            LoadStatus::InternalError => "internal error",
            LoadStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// How the worker sets up the target layer before the source runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceMode {
    /// Allocate a fresh TRW with the viewport's coordinate mode and the
    /// source's title.
    CreateNewLayer,
    /// Populate an existing layer supplied by the caller.
    AddToLayer,
    /// The source handles everything itself.
    AutoLayerManagement,
    /// The source performs its own attachments (per-item layer
    /// deliveries) against an existing parent.
    ManualLayerManagement,
}

/// What a source expects to be attached to when exposed as a filter on
/// existing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSourceInputType {
    None,
    Trw,
    TrwTrack,
}

/// The viewport as the core sees it: a coordinate mode and a geographic
/// bounding box. Everything else about it is out of scope.
pub trait Viewport {
    fn coord_mode(&self) -> CoordMode;
    fn bbox(&self) -> LatLonBBox;
}

/// A fixed viewport for headless callers and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticViewport {
    pub coord_mode: CoordMode,
    pub bbox: LatLonBBox,
}

impl Default for StaticViewport {
    fn default() -> Self {
        Self {
            coord_mode: CoordMode::LatLon,
            bbox: LatLonBBox::invalid(),
        }
    }
}

impl Viewport for StaticViewport {
    fn coord_mode(&self) -> CoordMode {
        self.coord_mode
    }

    fn bbox(&self) -> LatLonBBox {
        self.bbox
    }
}

/// Messages from the worker to whoever is watching the acquisition.
#[derive(Debug)]
pub enum AcquireEvent {
    /// One human-readable progress line.
    Status(String),
    /// A per-item layer from a `ManualLayerManagement` source, ready to
    /// attach.
    LayerReady(TrwLayer),
    /// The acquisition finished. `layer` is the populated target (absent
    /// when a fresh target ended up empty or the failure path freed it);
    /// `autoview` asks the viewport to recenter onto those bounds.
    Completed {
        status: LoadStatus,
        layer: Option<TrwLayer>,
        autoview: Option<LatLonBBox>,
    },
}

/// Everything a source needs while it runs. Stack-owned by the worker
/// for the lifetime of one acquisition.
pub struct AcquireContext {
    pub coord_mode: CoordMode,
    /// Snapshot of the viewport's bounding box at launch, for
    /// bbox-driven sources.
    pub viewport_bbox: LatLonBBox,
    /// The target container. `None` under `AutoLayerManagement`.
    pub trw: Option<TrwLayer>,
    /// True when the worker allocated `trw` freshly and still owns the
    /// decision to keep or drop it.
    pub trw_is_allocated: bool,
    /// Snapshot of the selected track for track-input filters. Held by
    /// this invocation only; no global state.
    pub filter_track: Option<Track>,
    /// Snapshot of the source layer for layer-input filters.
    pub filter_layer: Option<TrwLayer>,
    events: Sender<AcquireEvent>,
}

impl AcquireContext {
    /// The target container, if this mode has one.
    pub fn trw_mut(&mut self) -> Option<&mut TrwLayer> {
        self.trw.as_mut()
    }

    /// Hand a finished per-item layer to the receiver (used by
    /// `ManualLayerManagement` sources). Bounds are computed before the
    /// layer leaves the worker.
    pub fn deliver_layer(&self, mut layer: TrwLayer) {
        layer.post_read();
        if self.events.send(AcquireEvent::LayerReady(layer)).is_err() {
            debug!("No receiver for delivered layer");
        }
    }
}

/// Bridges the source's progress lines onto the event channel.
struct ChannelProgress {
    events: Mutex<Sender<AcquireEvent>>,
}

impl ProgressSink for ChannelProgress {
    fn status(&self, line: &str) {
        if let Ok(events) = self.events.lock() {
            let _ = events.send(AcquireEvent::Status(line.to_string()));
        }
    }
}

/// Optional inputs to an acquisition.
#[derive(Default)]
pub struct AcquireInput {
    /// The existing layer for `AddToLayer` / `ManualLayerManagement`
    /// modes. Moved into the worker and handed back in the completion
    /// event.
    pub existing_layer: Option<TrwLayer>,
    pub filter_track: Option<Track>,
    pub filter_layer: Option<TrwLayer>,
}

/// The final shape of one acquisition, as assembled by
/// [`AcquireHandle::wait_with`].
#[derive(Debug)]
pub struct AcquireOutcome {
    pub status: LoadStatus,
    pub layer: Option<TrwLayer>,
    pub autoview: Option<LatLonBBox>,
    /// Layers delivered mid-run by `ManualLayerManagement` sources.
    pub extra_layers: Vec<TrwLayer>,
}

/// A running acquisition.
pub struct AcquireHandle {
    pub events: Receiver<AcquireEvent>,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl AcquireHandle {
    /// Request cancellation: raises the flag and kills any registered
    /// child process. The worker unwinds with a non-success status.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Drain events until completion, feeding status lines to
    /// `on_status`.
    pub fn wait_with(mut self, mut on_status: impl FnMut(&str)) -> AcquireOutcome {
        let mut extra_layers = Vec::new();
        let mut outcome = None;
        while let Ok(event) = self.events.recv() {
            match event {
                AcquireEvent::Status(line) => on_status(&line),
                AcquireEvent::LayerReady(layer) => extra_layers.push(layer),
                AcquireEvent::Completed {
                    status,
                    layer,
                    autoview,
                } => {
                    outcome = Some((status, layer, autoview));
                    break;
                }
            }
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        let (status, layer, autoview) = outcome.unwrap_or((LoadStatus::InternalError, None, None));
        AcquireOutcome {
            status,
            layer,
            autoview,
            extra_layers,
        }
    }
}

/// There is at most one running acquire in the process at any time.
static ACQUIRE_LOCK: Mutex<()> = Mutex::new(());

/// Launch an acquisition from `source` on a background worker thread.
///
/// The target layer is configured here, on the caller's thread, from the
/// viewport and the source's mode; mode preconditions (an existing layer
/// for `AddToLayer`/`ManualLayerManagement`) fail fast with an error
/// before any thread is spawned.
pub fn acquire_from_source(
    source: Arc<dyn DataSource>,
    viewport: &dyn Viewport,
    input: AcquireInput,
) -> Result<AcquireHandle, GeotraxError> {
    let (events, receiver) = mpsc::channel();
    let cancel = CancelToken::new();

    let coord_mode = viewport.coord_mode();
    let mut ctx = AcquireContext {
        coord_mode,
        viewport_bbox: viewport.bbox(),
        trw: None,
        trw_is_allocated: false,
        filter_track: input.filter_track,
        filter_layer: input.filter_layer,
        events: events.clone(),
    };

    match source.mode() {
        DataSourceMode::CreateNewLayer => {
            ctx.trw = Some(TrwLayer::new(source.layer_title(), coord_mode));
            ctx.trw_is_allocated = true;
        }
        DataSourceMode::AddToLayer | DataSourceMode::ManualLayerManagement => {
            ctx.trw = Some(
                input
                    .existing_layer
                    .ok_or(GeotraxError::TargetLayerRequired)?,
            );
        }
        DataSourceMode::AutoLayerManagement => (),
    }

    let worker_cancel = cancel.clone();
    let join = thread::Builder::new()
        .name("acquire".to_string())
        .spawn(move || {
            // One acquisition at a time, process-wide.
            let _guard = ACQUIRE_LOCK.lock().expect("acquire lock poisoned");
            run_worker(source, ctx, events, worker_cancel);
        })?;

    Ok(AcquireHandle {
        events: receiver,
        cancel,
        join: Some(join),
    })
}

fn run_worker(
    source: Arc<dyn DataSource>,
    mut ctx: AcquireContext,
    events: Sender<AcquireEvent>,
    cancel: CancelToken,
) {
    let progress = ChannelProgress {
        events: Mutex::new(events.clone()),
    };

    info!("Acquire from '{}' starting", source.source_id());
    let status = source.acquire_into_layer(&mut ctx, &progress, &cancel);
    info!("Acquire from '{}' ended: {status}", source.source_id());

    let (layer, autoview) = if status.is_success() {
        finalize_after_completion(&source, ctx)
    } else {
        finalize_after_termination(ctx)
    };

    let _ = events.send(AcquireEvent::Completed {
        status,
        layer,
        autoview,
    });
}

/// Success path: a fresh-but-empty target is freed silently; otherwise
/// the layer's bounds are refreshed and it is delivered for attachment,
/// with the autoview request when the source asks for it.
fn finalize_after_completion(
    source: &Arc<dyn DataSource>,
    ctx: AcquireContext,
) -> (Option<TrwLayer>, Option<LatLonBBox>) {
    let Some(mut trw) = ctx.trw else {
        return (None, None);
    };
    if ctx.trw_is_allocated && trw.is_empty() {
        info!("Acquire produced nothing; dropping the fresh layer");
        return (None, None);
    }
    trw.post_read();
    let autoview = source.autoview().then(|| *trw.bbox());
    (Some(trw), autoview)
}

/// Failure path: a fresh target is freed, nothing reaches the tree. An
/// existing layer is handed back to its owner regardless.
fn finalize_after_termination(ctx: AcquireContext) -> (Option<TrwLayer>, Option<LatLonBBox>) {
    if ctx.trw_is_allocated {
        if ctx.trw.is_some() {
            warn!("Acquire failed; dropping the fresh layer");
        }
        return (None, None);
    }
    (ctx.trw, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Coord, LatLon};
    use crate::track::Trackpoint;

    struct FakeSource {
        status: LoadStatus,
        points: usize,
        mode: DataSourceMode,
        autoview: bool,
    }

    impl DataSource for FakeSource {
        fn source_id(&self) -> &'static str {
            "test.fake"
        }

        fn layer_title(&self) -> String {
            "Fake".to_string()
        }

        fn mode(&self) -> DataSourceMode {
            self.mode
        }

        fn autoview(&self) -> bool {
            self.autoview
        }

        fn acquire_into_layer(
            &self,
            ctx: &mut AcquireContext,
            progress: &dyn ProgressSink,
            _cancel: &CancelToken,
        ) -> LoadStatus {
            progress.status("working");
            if let Some(trw) = ctx.trw_mut() {
                let mut track = Track::new("fake");
                for i in 0..self.points {
                    track.add_trackpoint(
                        Trackpoint::new(Coord::LatLon(LatLon::new(i as f64, i as f64))),
                        true,
                    );
                }
                if self.points > 0 {
                    trw.add_track(track);
                }
            }
            self.status
        }
    }

    fn run(source: FakeSource, input: AcquireInput) -> AcquireOutcome {
        let handle =
            acquire_from_source(Arc::new(source), &StaticViewport::default(), input).unwrap();
        handle.wait_with(|_| {})
    }

    #[test]
    fn success_delivers_populated_fresh_layer() {
        let outcome = run(
            FakeSource {
                status: LoadStatus::Success,
                points: 3,
                mode: DataSourceMode::CreateNewLayer,
                autoview: true,
            },
            AcquireInput::default(),
        );
        assert_eq!(outcome.status, LoadStatus::Success);
        let layer = outcome.layer.expect("layer should be delivered");
        assert_eq!(layer.track_count(), 1);
        assert!(layer.bbox().is_valid());
        assert!(outcome.autoview.is_some());
    }

    #[test]
    fn empty_fresh_layer_is_freed_silently() {
        let outcome = run(
            FakeSource {
                status: LoadStatus::Success,
                points: 0,
                mode: DataSourceMode::CreateNewLayer,
                autoview: false,
            },
            AcquireInput::default(),
        );
        assert_eq!(outcome.status, LoadStatus::Success);
        assert!(outcome.layer.is_none());
    }

    #[test]
    fn failure_frees_the_fresh_layer() {
        let outcome = run(
            FakeSource {
                status: LoadStatus::Error,
                points: 2,
                mode: DataSourceMode::CreateNewLayer,
                autoview: true,
            },
            AcquireInput::default(),
        );
        assert_eq!(outcome.status, LoadStatus::Error);
        assert!(outcome.layer.is_none());
        assert!(outcome.autoview.is_none());
    }

    #[test]
    fn add_to_layer_requires_an_existing_layer() {
        let source = Arc::new(FakeSource {
            status: LoadStatus::Success,
            points: 1,
            mode: DataSourceMode::AddToLayer,
            autoview: false,
        });
        let err = acquire_from_source(
            source,
            &StaticViewport::default(),
            AcquireInput::default(),
        );
        assert!(matches!(err, Err(GeotraxError::TargetLayerRequired)));
    }

    #[test]
    fn add_to_layer_returns_the_layer_even_on_failure() {
        let mut existing = TrwLayer::new("mine", CoordMode::LatLon);
        existing.add_waypoint(crate::waypoint::Waypoint::new(
            "kept",
            Coord::LatLon(LatLon::new(1.0, 1.0)),
        ));
        let outcome = run(
            FakeSource {
                status: LoadStatus::Error,
                points: 2,
                mode: DataSourceMode::AddToLayer,
                autoview: false,
            },
            AcquireInput {
                existing_layer: Some(existing),
                ..Default::default()
            },
        );
        // The caller gets their layer back, whatever happened meanwhile.
        let layer = outcome.layer.expect("existing layer must come back");
        assert_eq!(layer.waypoint_count(), 1);
    }

    /// Spins until cancelled, like a source blocked on a child process.
    struct BlockingSource;

    impl DataSource for BlockingSource {
        fn source_id(&self) -> &'static str {
            "test.blocking"
        }

        fn layer_title(&self) -> String {
            "Blocking".to_string()
        }

        fn acquire_into_layer(
            &self,
            ctx: &mut AcquireContext,
            _progress: &dyn ProgressSink,
            cancel: &CancelToken,
        ) -> LoadStatus {
            if let Some(trw) = ctx.trw_mut() {
                let mut track = Track::new("partial");
                track.add_trackpoint(
                    Trackpoint::new(Coord::LatLon(LatLon::new(1.0, 1.0))),
                    true,
                );
                trw.add_track(track);
            }
            while !cancel.is_cancelled() {
                std::thread::yield_now();
            }
            LoadStatus::Cancelled
        }
    }

    #[test]
    fn cancellation_frees_the_fresh_layer_and_signals_once() {
        let handle = acquire_from_source(
            Arc::new(BlockingSource),
            &StaticViewport::default(),
            AcquireInput::default(),
        )
        .unwrap();
        handle.cancel();
        let outcome = handle.wait_with(|_| {});
        assert_eq!(outcome.status, LoadStatus::Cancelled);
        // The partially-populated fresh layer never reaches the tree.
        assert!(outcome.layer.is_none());
        assert!(outcome.extra_layers.is_empty());
    }

    #[test]
    fn status_lines_arrive_before_completion() {
        let handle = acquire_from_source(
            Arc::new(FakeSource {
                status: LoadStatus::Success,
                points: 1,
                mode: DataSourceMode::CreateNewLayer,
                autoview: false,
            }),
            &StaticViewport::default(),
            AcquireInput::default(),
        )
        .unwrap();
        let mut lines = Vec::new();
        let outcome = handle.wait_with(|line| lines.push(line.to_string()));
        assert_eq!(lines, vec!["working"]);
        assert!(outcome.status.is_success());
    }
}
