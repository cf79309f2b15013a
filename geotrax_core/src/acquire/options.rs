//! The declarative description of how to obtain data, and its one entry
//! point: [`AcquireOptions::import`]. Sources build one of these and let
//! it do the work.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use log::{debug, warn};

use super::{AcquireContext, LoadStatus};
use crate::babel::{BabelConfig, BabelProcess};
use crate::download::{DownloadHandle, DownloadOptions};
use crate::progress::{CancelToken, ProgressSink};
use crate::read::read_gpx_into_trw;

/// How to obtain the data. Mode-specific payloads only; tool paths
/// arrive separately at import time.
#[derive(Debug, Clone)]
pub enum AcquireOptions {
    /// Fetch the URL to a temp file, then either convert it (when an
    /// input format is declared) or parse it as GPX directly.
    FromUrl {
        url: String,
        input_format: Option<String>,
    },
    /// Run `<command> | gpsbabel -i <fmt> -f - -o gpx -F -` under the
    /// shell; without a format the command itself must emit GPX.
    FromShellCommand {
        command: String,
        input_format: Option<String>,
    },
    /// A preconfigured converter invocation (file or device input,
    /// optional filter chain). Output is forced to GPX on stdout.
    FromExternalConverter { process: BabelProcess },
    /// Parse the path as GPX, no conversion.
    FromLocalFile { path: PathBuf },
}

impl AcquireOptions {
    /// Produce data into `ctx`'s target layer. Returns a status code,
    /// never panics across this boundary.
    pub fn import(
        &self,
        babel: &BabelConfig,
        ctx: &mut AcquireContext,
        dl_options: &DownloadOptions,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        match self {
            AcquireOptions::FromUrl { url, input_format } => {
                import_from_url(babel, ctx, url, input_format.as_deref(), dl_options, progress, cancel)
            }
            AcquireOptions::FromShellCommand {
                command,
                input_format,
            } => import_with_shell_command(babel, ctx, command, input_format.as_deref(), progress, cancel),
            AcquireOptions::FromExternalConverter { process } => {
                let Some(trw) = ctx.trw.as_mut() else {
                    return LoadStatus::InternalError;
                };
                let mut process = process.clone();
                // Output appears on stdout and streams into the parser.
                process.set_output("gpx", "-");
                process.convert_through_gpx(trw, progress, cancel)
            }
            AcquireOptions::FromLocalFile { path } => {
                let Some(trw) = ctx.trw.as_mut() else {
                    return LoadStatus::InternalError;
                };
                let file = match File::open(path) {
                    Ok(file) => file,
                    Err(e) => {
                        warn!("Cannot open {:?}: {e}", path);
                        return LoadStatus::FileAccess;
                    }
                };
                match read_gpx_into_trw(BufReader::new(file), trw) {
                    Ok(()) => LoadStatus::Success,
                    Err(e) => {
                        warn!("Cannot parse {:?}: {e}", path);
                        LoadStatus::Error
                    }
                }
            }
        }
    }
}

fn import_from_url(
    babel: &BabelConfig,
    ctx: &mut AcquireContext,
    url: &str,
    input_format: Option<&str>,
    dl_options: &DownloadOptions,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> LoadStatus {
    debug!("Acquire from URL {url}, input format {:?}", input_format);

    if ctx.trw.is_none() {
        return LoadStatus::InternalError;
    }

    let tmp = match tempfile::NamedTempFile::new() {
        Ok(tmp) => tmp,
        Err(e) => {
            warn!("Cannot create temporary file: {e}");
            return LoadStatus::IntermediateFileAccess;
        }
    };

    let handle = match DownloadHandle::new(dl_options) {
        Ok(handle) => handle,
        Err(e) => {
            warn!("Cannot build download client: {e}");
            return LoadStatus::Error;
        }
    };

    progress.status(&format!("Downloading {url}"));
    if let Err(e) = handle.perform_download(url, tmp.path()) {
        warn!("Download of {url} failed: {e}");
        progress.status(&format!("Unable to get trace: {url}"));
        return LoadStatus::Error;
    }
    if cancel.is_cancelled() {
        return LoadStatus::Cancelled;
    }

    let Some(trw) = ctx.trw.as_mut() else {
        return LoadStatus::InternalError;
    };
    let status = match input_format {
        Some(format) => {
            let mut process = BabelProcess::new(babel);
            process
                .set_input(Some(format), tmp.path().to_string_lossy().into_owned())
                .set_output("gpx", "-");
            process.convert_through_gpx(trw, progress, cancel)
        }
        None => {
            // Process the retrieved file directly as GPX.
            match File::open(tmp.path()) {
                Ok(file) => match read_gpx_into_trw(BufReader::new(file), trw) {
                    Ok(()) => LoadStatus::Success,
                    Err(e) => {
                        warn!("Cannot parse downloaded file: {e}");
                        LoadStatus::Error
                    }
                },
                Err(e) => {
                    warn!("Cannot open downloaded file: {e}");
                    LoadStatus::FileAccess
                }
            }
        }
    };
    // `tmp` drops here, deleting the file on every path.
    status
}

fn import_with_shell_command(
    babel: &BabelConfig,
    ctx: &mut AcquireContext,
    command: &str,
    input_format: Option<&str>,
    progress: &dyn ProgressSink,
    cancel: &CancelToken,
) -> LoadStatus {
    let Some(trw) = ctx.trw.as_mut() else {
        return LoadStatus::InternalError;
    };

    let full_command = match input_format {
        // "-" puts the converter between the command and our parser.
        Some(format) => format!(
            "{command} | {} -i {format} -f - -o gpx -F -",
            babel.gpsbabel_path.display()
        ),
        None => command.to_string(),
    };
    debug!("Shell acquire: {full_command}");

    let process = BabelProcess::from_shell(babel, full_command);
    process.convert_through_gpx(trw, progress, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::AcquireEvent;
    use crate::coord::CoordMode;
    use crate::progress::NullProgress;
    use crate::trw::TrwLayer;
    use std::io::Write;
    use std::sync::mpsc;

    fn test_context() -> (AcquireContext, mpsc::Receiver<AcquireEvent>) {
        let (events, receiver) = mpsc::channel();
        (
            AcquireContext {
                coord_mode: CoordMode::LatLon,
                viewport_bbox: crate::bbox::LatLonBBox::invalid(),
                trw: Some(TrwLayer::new("target", CoordMode::LatLon)),
                trw_is_allocated: true,
                filter_track: None,
                filter_layer: None,
                events,
            },
            receiver,
        )
    }

    const GPX: &str = r#"<gpx creator="t" version="1.1">
<trk><name>one</name><trkseg>
<trkpt lat="1.0" lon="2.0"/><trkpt lat="1.1" lon="2.1"/>
</trkseg></trk>
</gpx>"#;

    #[test]
    fn local_file_parses_into_target() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GPX.as_bytes()).unwrap();

        let (mut ctx, _rx) = test_context();
        let options = AcquireOptions::FromLocalFile {
            path: file.path().to_owned(),
        };
        let status = options.import(
            &BabelConfig::discover(),
            &mut ctx,
            &DownloadOptions::default(),
            &NullProgress,
            &CancelToken::new(),
        );
        assert_eq!(status, LoadStatus::Success);
        assert_eq!(ctx.trw.unwrap().track_count(), 1);
    }

    #[test]
    fn missing_local_file_is_file_access() {
        let (mut ctx, _rx) = test_context();
        let options = AcquireOptions::FromLocalFile {
            path: PathBuf::from("/nonexistent/nowhere.gpx"),
        };
        let status = options.import(
            &BabelConfig::discover(),
            &mut ctx,
            &DownloadOptions::default(),
            &NullProgress,
            &CancelToken::new(),
        );
        assert_eq!(status, LoadStatus::FileAccess);
    }

    #[test]
    fn malformed_local_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"this is not xml at all").unwrap();

        let (mut ctx, _rx) = test_context();
        let options = AcquireOptions::FromLocalFile {
            path: file.path().to_owned(),
        };
        let status = options.import(
            &BabelConfig::discover(),
            &mut ctx,
            &DownloadOptions::default(),
            &NullProgress,
            &CancelToken::new(),
        );
        assert_eq!(status, LoadStatus::Error);
    }

    #[test]
    fn shell_command_without_format_feeds_gpx_straight_through() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(GPX.as_bytes()).unwrap();

        let (mut ctx, _rx) = test_context();
        let babel = BabelConfig::discover().with_shell("/bin/sh");
        let options = AcquireOptions::FromShellCommand {
            command: format!("cat {}", file.path().display()),
            input_format: None,
        };
        let status = options.import(
            &babel,
            &mut ctx,
            &DownloadOptions::default(),
            &NullProgress,
            &CancelToken::new(),
        );
        assert_eq!(status, LoadStatus::Success);
        let trw = ctx.trw.unwrap();
        assert_eq!(trw.track_count(), 1);
        assert_eq!(trw.tracks[0].point_count(), 2);
    }
}
