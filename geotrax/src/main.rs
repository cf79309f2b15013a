use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use args::{parse_args, AcquireCommand, Command, SmoothArg};
use env_logger::Builder;
use geotrax_core::acquire::sources::{DataSource, FileSource, GpsSource, UrlSource};
use geotrax_core::acquire::{acquire_from_source, AcquireInput, LoadStatus, StaticViewport};
use geotrax_core::babel::BabelConfig;
use geotrax_core::coord::{Coord, LatLon};
use geotrax_core::dem::cache::DemCache;
use geotrax_core::download::DownloadOptions;
use geotrax_core::gpx_writer::{write_gpx_file, OutputOptions};
use geotrax_core::progress::{CancelToken, NullProgress};
use geotrax_core::read::read_gpx_from_file;
use geotrax_core::track::Track;
use geotrax_core::trw::TrwLayer;
use log::{error, info, LevelFilter};
use rayon::prelude::*;

mod args;

pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> Result<()> {
    let args = parse_args();
    configure_logging(args.verbose);
    info!("Starting {PROGRAM_NAME}");

    let mut babel = BabelConfig::discover();
    if let Some(path) = &args.gpsbabel {
        babel = babel.with_gpsbabel(path);
    }
    if let Some(path) = &args.shell {
        babel = babel.with_shell(path);
    }

    match args.command {
        Command::Info { files, stop_length } => info_command(&files, stop_length),
        Command::Acquire { source, output } => acquire_command(source, &output, babel),
        Command::Export {
            file,
            format,
            output,
            track,
        } => export_command(&file, &format, &output, track.as_deref(), babel),
        Command::Formats => formats_command(babel),
        Command::DemLookup {
            dems,
            lat,
            lon,
            method,
        } => dem_lookup_command(&dems, lat, lon, method.into()),
        Command::ApplyDem {
            file,
            dems,
            output,
            overwrite,
            smooth,
        } => apply_dem_command(&file, &dems, output.as_deref(), overwrite, smooth),
    }
}

fn configure_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{:5} {}", record.level(), record.args()))
        .init();
}

fn info_command(files: &[PathBuf], stop_length: i64) -> Result<()> {
    if files.is_empty() {
        bail!("no input files given");
    }

    files.par_iter().for_each(|file| {
        match read_gpx_from_file(file) {
            Ok(trw) => print_layer_info(file, &trw, stop_length),
            Err(err) => error!("Error while processing file {:?}: {}", file, err),
        };
    });
    Ok(())
}

fn print_layer_info(file: &Path, trw: &TrwLayer, stop_length: i64) {
    println!("{}:", file.display());
    println!(
        "  {} tracks, {} routes, {} waypoints",
        trw.track_count(),
        trw.route_count(),
        trw.waypoint_count()
    );
    for track in trw.all_tracks() {
        print_track_info(track, stop_length);
    }
}

fn print_track_info(track: &Track, stop_length: i64) {
    let kind = if track.is_route { "route" } else { "track" };
    println!("  {kind} '{}':", track.name);
    println!(
        "    {} points in {} segments",
        track.point_count(),
        track.segment_count()
    );
    println!(
        "    length {:.1} km ({:.1} km including gaps)",
        track.length() / 1000.0,
        track.length_including_gaps() / 1000.0
    );
    if let Some(duration) = track.duration_including_gaps() {
        println!(
            "    duration {}s (moving {}s)",
            duration,
            track.duration_moving()
        );
        println!(
            "    speed avg {:.2} m/s, moving {:.2} m/s, max {:.2} m/s",
            track.average_speed(),
            track.average_speed_moving(stop_length),
            track.max_speed()
        );
    }
    if let Some((up, down)) = track.total_elevation_gain() {
        println!("    climb {up:.0} m, descent {down:.0} m");
    }
    if let Some((min, max)) = track.minmax_altitude() {
        println!("    altitude {min:.0}..{max:.0} m");
    }
}

fn acquire_command(source: AcquireCommand, output: &Path, babel: BabelConfig) -> Result<()> {
    let source: Arc<dyn DataSource> = match source {
        AcquireCommand::Url { url, format } => Arc::new(UrlSource::new(
            url,
            format,
            DownloadOptions::default(),
            babel,
        )),
        AcquireCommand::File { path, format } => {
            Arc::new(FileSource::new(path, format, babel))
        }
        AcquireCommand::Shell { command, format } => {
            Arc::new(ShellSource { command, format, babel })
        }
        AcquireCommand::Gps { protocol, port } => {
            Arc::new(GpsSource::new(protocol, port, babel))
        }
    };

    let handle = acquire_from_source(source, &StaticViewport::default(), AcquireInput::default())?;
    let outcome = handle.wait_with(|line| eprintln!("{line}"));

    if !outcome.status.is_success() {
        bail!("acquisition failed: {}", outcome.status);
    }
    let Some(layer) = outcome.layer else {
        bail!("acquisition produced no data");
    };
    write_gpx_file(output, &layer, OutputOptions::Full)
        .with_context(|| format!("writing {:?}", output))?;
    println!(
        "Wrote {} tracks, {} routes, {} waypoints to {}",
        layer.track_count(),
        layer.route_count(),
        layer.waypoint_count(),
        output.display()
    );
    Ok(())
}

/// A one-shot shell-command source for the CLI.
struct ShellSource {
    command: String,
    format: Option<String>,
    babel: BabelConfig,
}

impl DataSource for ShellSource {
    fn source_id(&self) -> &'static str {
        "acq.shell"
    }

    fn layer_title(&self) -> String {
        "Shell Command".to_string()
    }

    fn acquire_into_layer(
        &self,
        ctx: &mut geotrax_core::acquire::AcquireContext,
        progress: &dyn geotrax_core::progress::ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let options = geotrax_core::acquire::options::AcquireOptions::FromShellCommand {
            command: self.command.clone(),
            input_format: self.format.clone(),
        };
        options.import(
            &self.babel,
            ctx,
            &DownloadOptions::default(),
            progress,
            cancel,
        )
    }
}

fn export_command(
    file: &Path,
    format: &str,
    output: &Path,
    track: Option<&str>,
    babel: BabelConfig,
) -> Result<()> {
    let trw = read_gpx_from_file(file).with_context(|| format!("reading {:?}", file))?;
    geotrax_core::babel::export_layer(&babel, &trw, track, format, output)
        .with_context(|| format!("exporting to {:?}", output))?;
    println!("Exported {} as {} to {}", file.display(), format, output.display());
    Ok(())
}

fn formats_command(babel: BabelConfig) -> Result<()> {
    let features = geotrax_core::babel::BabelFeatures::load(&babel, &NullProgress)
        .context("enumerating gpsbabel features")?;

    println!("File formats:");
    for t in &features.file_types {
        println!("  {:20} {}", t.identifier, t.label);
    }
    println!("Devices:");
    for d in &features.devices {
        println!("  {:20} {}", d.identifier, d.label);
    }
    Ok(())
}

/// Bare tile names (e.g. `N47E013.hgt`) resolve against the user's DEM
/// cache directory when they do not exist as given.
fn resolve_dem_paths(dems: &[PathBuf]) -> Vec<PathBuf> {
    let cache_dir = directories::ProjectDirs::from("", "", PROGRAM_NAME)
        .map(|dirs| dirs.cache_dir().join("dems"));
    dems.iter()
        .map(|path| {
            if path.exists() {
                return path.clone();
            }
            match &cache_dir {
                Some(dir) if dir.join(path).exists() => dir.join(path),
                _ => path.clone(),
            }
        })
        .collect()
}

fn dem_lookup_command(
    dems: &[PathBuf],
    lat: f64,
    lon: f64,
    method: geotrax_core::dem::DemInterpolation,
) -> Result<()> {
    let dems = resolve_dem_paths(dems);
    let cache = DemCache::new();
    let loaded = cache.load_list(&dems, &NullProgress, &CancelToken::new());
    if loaded == 0 {
        bail!("none of the DEM files could be loaded");
    }
    info!("Loaded {loaded} of {} DEM files", dems.len());

    let coord = Coord::LatLon(LatLon::new(lat, lon));
    match cache.elev_by_coord(&coord, method) {
        Some(elev) => println!("{elev}"),
        None => bail!("no loaded DEM covers {lat},{lon}"),
    }
    Ok(())
}

fn apply_dem_command(
    file: &Path,
    dems: &[PathBuf],
    output: Option<&Path>,
    overwrite: bool,
    smooth: Option<SmoothArg>,
) -> Result<()> {
    let mut trw = read_gpx_from_file(file).with_context(|| format!("reading {:?}", file))?;

    let dems = resolve_dem_paths(dems);
    let cache = DemCache::new();
    let loaded = cache.load_list(&dems, &NullProgress, &CancelToken::new());
    if loaded == 0 {
        bail!("none of the DEM files could be loaded");
    }

    let applied = trw.apply_dem_data(&cache, !overwrite);
    println!("Applied DEM elevation to {applied} points");

    if let Some(mode) = smooth {
        let flat = matches!(mode, SmoothArg::Flat);
        let mut smoothed = 0;
        for track in trw.tracks.iter_mut().chain(trw.routes.iter_mut()) {
            smoothed += track.smooth_missing_elevation_data(flat);
        }
        println!("Smoothed {smoothed} points without DEM coverage");
    }

    let target = output.unwrap_or(file);
    write_gpx_file(target, &trw, OutputOptions::Full)
        .with_context(|| format!("writing {:?}", target))?;
    Ok(())
}
