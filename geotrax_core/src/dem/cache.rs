//! A shared registry of loaded DEM grids keyed by file path, with
//! reference counts and a cancellable batch loader. Readers may run
//! concurrently; loads and unloads exclude everything else.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use log::{info, warn};

use super::{Dem, DemInterpolation};
use crate::coord::Coord;
use crate::error::GeotraxError;
use crate::progress::{CancelToken, ProgressSink};

struct Entry {
    dem: Arc<Dem>,
    refcount: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<PathBuf, Entry>,
    /// Load order; elevation probes walk the grids in this order.
    order: Vec<PathBuf>,
}

/// Share one of these (behind an `Arc`) between whatever needs elevation
/// lookups.
#[derive(Default)]
pub struct DemCache {
    state: RwLock<CacheState>,
}

impl DemCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `path`, parsing on first use; later loads of the same path
    /// just bump the reference count.
    pub fn load(&self, path: &Path) -> Result<Arc<Dem>, GeotraxError> {
        {
            let mut state = self.state.write().expect("DEM cache poisoned");
            if let Some(entry) = state.entries.get_mut(path) {
                entry.refcount += 1;
                return Ok(entry.dem.clone());
            }
        }

        // Parse outside the lock; a failed parse leaves no trace in the
        // cache.
        let dem = Arc::new(Dem::read_from_file(path)?);

        let mut state = self.state.write().expect("DEM cache poisoned");
        match state.entries.get_mut(path) {
            Some(entry) => {
                // Someone else loaded it while we were parsing.
                entry.refcount += 1;
                Ok(entry.dem.clone())
            }
            None => {
                state.entries.insert(
                    path.to_owned(),
                    Entry {
                        dem: dem.clone(),
                        refcount: 1,
                    },
                );
                state.order.push(path.to_owned());
                Ok(dem)
            }
        }
    }

    /// Drop one reference; the grid is freed when the count reaches zero.
    /// Returns false when the path was not loaded at all.
    pub fn unload(&self, path: &Path) -> bool {
        let mut state = self.state.write().expect("DEM cache poisoned");
        let Some(entry) = state.entries.get_mut(path) else {
            return false;
        };
        entry.refcount -= 1;
        if entry.refcount == 0 {
            state.entries.remove(path);
            state.order.retain(|p| p != path);
        }
        true
    }

    /// Borrow a loaded grid without touching its reference count.
    pub fn get(&self, path: &Path) -> Option<Arc<Dem>> {
        let state = self.state.read().expect("DEM cache poisoned");
        state.entries.get(path).map(|e| e.dem.clone())
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        let state = self.state.read().expect("DEM cache poisoned");
        state.entries.contains_key(path)
    }

    pub fn loaded_count(&self) -> usize {
        let state = self.state.read().expect("DEM cache poisoned");
        state.entries.len()
    }

    pub fn clear(&self) {
        let mut state = self.state.write().expect("DEM cache poisoned");
        state.entries.clear();
        state.order.clear();
    }

    /// Load a batch on the calling thread, polling for cancellation
    /// between files. A file that fails to parse is logged and skipped;
    /// the batch carries on. Returns the number of grids loaded.
    pub fn load_list(
        &self,
        paths: &[PathBuf],
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> usize {
        let mut loaded = 0;
        for (i, path) in paths.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("DEM batch load cancelled after {loaded} files");
                break;
            }
            progress.status(&format!(
                "Loading DEM {}/{}: {}",
                i + 1,
                paths.len(),
                path.display()
            ));
            match self.load(path) {
                Ok(_) => loaded += 1,
                Err(err) => warn!("Skipping DEM {:?}: {}", path, err),
            }
        }
        loaded
    }

    /// Probe every loaded grid in load order and return the first real
    /// elevation for the coordinate.
    pub fn elev_by_coord(&self, coord: &Coord, method: DemInterpolation) -> Option<i16> {
        let state = self.state.read().expect("DEM cache poisoned");
        for path in &state.order {
            if let Some(entry) = state.entries.get(path) {
                let elev = entry.dem.elev_by_coord(coord, method);
                if elev != Dem::INVALID_ELEVATION {
                    return Some(elev);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::LatLon;
    use crate::progress::NullProgress;
    use std::fs;

    fn write_zero_hgt(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, vec![0u8; 1201 * 1201 * 2]).unwrap();
        path
    }

    #[test]
    fn refcounts_gate_the_unload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zero_hgt(dir.path(), "N00E072.hgt");
        let cache = DemCache::new();

        cache.load(&path).unwrap();
        cache.load(&path).unwrap();
        assert!(cache.is_loaded(&path));

        assert!(cache.unload(&path));
        assert!(cache.is_loaded(&path));
        assert!(cache.unload(&path));
        assert!(!cache.is_loaded(&path));
        assert!(!cache.unload(&path));
    }

    #[test]
    fn failed_parse_leaves_no_partial_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("N00E072.hgt");
        fs::write(&path, vec![0u8; 1_000_000]).unwrap();

        let cache = DemCache::new();
        assert!(cache.load(&path).is_err());
        assert_eq!(cache.loaded_count(), 0);
        assert!(cache.get(&path).is_none());
    }

    #[test]
    fn batch_load_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_zero_hgt(dir.path(), "N00E072.hgt");
        let bad = dir.path().join("N01E072.hgt");
        fs::write(&bad, vec![0u8; 123]).unwrap();

        let cache = DemCache::new();
        let loaded = cache.load_list(
            &[good.clone(), bad.clone()],
            &NullProgress,
            &CancelToken::new(),
        );
        assert_eq!(loaded, 1);
        assert!(cache.is_loaded(&good));
        assert!(!cache.is_loaded(&bad));
    }

    #[test]
    fn cancelled_batch_stops_early() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_zero_hgt(dir.path(), "N00E072.hgt");
        let cancel = CancelToken::new();
        cancel.cancel();

        let cache = DemCache::new();
        let loaded = cache.load_list(&[a.clone()], &NullProgress, &cancel);
        assert_eq!(loaded, 0);
        assert!(!cache.is_loaded(&a));
    }

    #[test]
    fn probe_returns_first_real_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zero_hgt(dir.path(), "N00E072.hgt");
        let cache = DemCache::new();
        cache.load(&path).unwrap();

        // Inside the tile: all-zero elevations are real data.
        let inside = Coord::LatLon(LatLon::new(0.5, 72.5));
        assert_eq!(cache.elev_by_coord(&inside, DemInterpolation::None), Some(0));

        // Far outside every loaded tile.
        let outside = Coord::LatLon(LatLon::new(50.0, 10.0));
        assert_eq!(cache.elev_by_coord(&outside, DemInterpolation::None), None);
    }
}
