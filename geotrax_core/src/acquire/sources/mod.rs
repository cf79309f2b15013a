//! Concrete acquisition sources and the read-only registry they live
//! in. A source is configuration plus one operation: produce data into
//! the context's target layer. Configuration dialogs are the GUI's
//! business; by the time a source object exists its parameters are
//! final.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::{AcquireContext, DataSourceInputType, DataSourceMode, LoadStatus};
use crate::progress::{CancelToken, ProgressSink};

mod file;
mod filters;
mod gps;
mod osm_my_traces;
mod url;
mod wikipedia;

pub use file::FileSource;
pub use filters::{BabelFilterSource, WaypointSelectionFilter};
pub use gps::GpsSource;
pub use osm_my_traces::OsmMyTracesSource;
pub use url::UrlSource;
pub use wikipedia::WikipediaSource;

/// The polymorphic face of every acquisition source and filter.
pub trait DataSource: Send + Sync {
    /// Unique identifier for menu wiring and filter dispatch.
    fn source_id(&self) -> &'static str;

    /// The name a freshly created target layer gets.
    fn layer_title(&self) -> String;

    fn mode(&self) -> DataSourceMode {
        DataSourceMode::CreateNewLayer
    }

    /// What this source expects to be attached to when offered as a
    /// filter over existing data.
    fn input_type(&self) -> DataSourceInputType {
        DataSourceInputType::None
    }

    /// Whether the viewport should recenter onto the new content.
    fn autoview(&self) -> bool {
        false
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut AcquireContext,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus;
}

/// Sources and filters keyed by id. Built once at startup; read-only
/// afterwards.
pub struct SourceRegistry {
    sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl SourceRegistry {
    pub fn builder() -> SourceRegistryBuilder {
        SourceRegistryBuilder {
            sources: BTreeMap::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn DataSource>> {
        self.sources.values()
    }

    /// The sources usable as a filter over the given kind of input.
    pub fn filters_for(&self, input: DataSourceInputType) -> Vec<Arc<dyn DataSource>> {
        self.sources
            .values()
            .filter(|s| s.input_type() == input)
            .cloned()
            .collect()
    }
}

/// Registration happens only here, before `build`; the result never
/// changes.
pub struct SourceRegistryBuilder {
    sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl SourceRegistryBuilder {
    pub fn register(mut self, source: Arc<dyn DataSource>) -> Self {
        let id = source.source_id();
        if self.sources.insert(id, source).is_some() {
            log::warn!("Duplicate source id '{id}' replaces the earlier registration");
        }
        self
    }

    pub fn build(self) -> SourceRegistry {
        SourceRegistry {
            sources: self.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::babel::BabelConfig;
    use std::path::PathBuf;

    #[test]
    fn registry_lookup_and_filter_partition() {
        let babel = BabelConfig::discover();
        let registry = SourceRegistry::builder()
            .register(Arc::new(FileSource::new(
                PathBuf::from("a.gpx"),
                None,
                babel.clone(),
            )))
            .register(Arc::new(BabelFilterSource::simplify(100, babel.clone())))
            .register(Arc::new(BabelFilterSource::remove_duplicates(babel)))
            .build();

        assert!(registry.get("acq.file").is_some());
        assert!(registry.get("acq.nope").is_none());

        let trw_filters = registry.filters_for(DataSourceInputType::Trw);
        assert_eq!(trw_filters.len(), 2);
        let plain = registry.filters_for(DataSourceInputType::None);
        assert_eq!(plain.len(), 1);
    }
}
