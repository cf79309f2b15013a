use std::path::PathBuf;

use super::DataSource;
use crate::acquire::options::AcquireOptions;
use crate::acquire::{AcquireContext, LoadStatus};
use crate::babel::{BabelConfig, BabelProcess};
use crate::download::DownloadOptions;
use crate::progress::{CancelToken, ProgressSink};

/// Import a local file. GPX parses directly; any other declared format
/// goes through the external converter.
pub struct FileSource {
    path: PathBuf,
    input_format: Option<String>,
    babel: BabelConfig,
}

impl FileSource {
    pub fn new(path: PathBuf, input_format: Option<String>, babel: BabelConfig) -> Self {
        Self {
            path,
            input_format,
            babel,
        }
    }

    fn options(&self) -> AcquireOptions {
        match self.input_format.as_deref() {
            None | Some("gpx") => AcquireOptions::FromLocalFile {
                path: self.path.clone(),
            },
            Some(format) => {
                let mut process = BabelProcess::new(&self.babel);
                process.set_input(Some(format), self.path.to_string_lossy().into_owned());
                AcquireOptions::FromExternalConverter { process }
            }
        }
    }
}

impl DataSource for FileSource {
    fn source_id(&self) -> &'static str {
        "acq.file"
    }

    fn layer_title(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Imported file".to_string())
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
        self.options().import(
            &self.babel,
            ctx,
            &DownloadOptions::default(),
            progress,
            cancel,
        )
    }
}
