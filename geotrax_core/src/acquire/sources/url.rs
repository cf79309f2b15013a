use super::DataSource;
use crate::acquire::options::AcquireOptions;
use crate::acquire::{AcquireContext, LoadStatus};
use crate::babel::BabelConfig;
use crate::download::DownloadOptions;
use crate::progress::{CancelToken, ProgressSink};

/// Fetch a URL into a fresh layer, optionally converting from a declared
/// input format on the way in.
pub struct UrlSource {
    url: String,
    input_format: Option<String>,
    dl_options: DownloadOptions,
    babel: BabelConfig,
}

impl UrlSource {
    pub fn new(
        url: impl Into<String>,
        input_format: Option<String>,
        dl_options: DownloadOptions,
        babel: BabelConfig,
    ) -> Self {
        Self {
            url: url.into(),
            input_format,
            dl_options,
            babel,
        }
    }
}

impl DataSource for UrlSource {
    fn source_id(&self) -> &'static str {
        "acq.url"
    }

    fn layer_title(&self) -> String {
        // The tail of the URL is the best short name we have.
        self.url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("From URL")
            .to_string()
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
        let options = AcquireOptions::FromUrl {
            url: self.url.clone(),
            input_format: self.input_format.clone(),
        };
        options.import(&self.babel, ctx, &self.dl_options, progress, cancel)
    }
}
