use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use geotrax_core::dem::DemInterpolation;

#[derive(Debug, Parser)]
#[command(author, version, about = "GPS track, DEM and acquisition toolbox")]
pub struct Args {
    /// More -v, more logging.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to the gpsbabel executable (default: found on PATH).
    #[arg(long, global = true)]
    pub gpsbabel: Option<PathBuf>,

    /// Shell used for shell-command acquisition.
    #[arg(long, global = true)]
    pub shell: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print per-track statistics for GPX files.
    Info {
        files: Vec<PathBuf>,

        /// Stopped time threshold in seconds for the moving average.
        #[arg(long, default_value_t = 60)]
        stop_length: i64,
    },

    /// Pull data from a source into a GPX file.
    Acquire {
        #[command(subcommand)]
        source: AcquireCommand,

        /// Where to write the acquired data.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Load DEM files and answer one elevation query.
    DemLookup {
        /// DEM files (SRTM .hgt/.hgt.zip or USGS 24K).
        #[arg(long = "dem", required = true)]
        dems: Vec<PathBuf>,

        #[arg(long)]
        lat: f64,

        #[arg(long)]
        lon: f64,

        #[arg(long, value_enum, default_value = "best")]
        method: InterpolationArg,
    },

    /// Convert a GPX file to any format gpsbabel can write.
    Export {
        file: PathBuf,

        /// Target gpsbabel format, e.g. kml.
        #[arg(long)]
        format: String,

        #[arg(short, long)]
        output: PathBuf,

        /// Export only the named track.
        #[arg(long)]
        track: Option<String>,
    },

    /// List the file formats and devices the installed gpsbabel
    /// advertises.
    Formats,

    /// Fill a GPX file's altitudes from DEM data and rewrite it.
    ApplyDem {
        file: PathBuf,

        #[arg(long = "dem", required = true)]
        dems: Vec<PathBuf>,

        /// Output path; the input is rewritten in place when absent.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also replace altitudes the file already has.
        #[arg(long)]
        overwrite: bool,

        /// Fill remaining gaps afterwards: flat carry-forward or linear
        /// interpolation.
        #[arg(long, value_enum)]
        smooth: Option<SmoothArg>,
    },
}

#[derive(Debug, Subcommand)]
pub enum AcquireCommand {
    /// Fetch a URL (GPX, or another format converted via gpsbabel).
    Url {
        url: String,
        #[arg(long)]
        format: Option<String>,
    },
    /// Import a local file.
    File {
        path: PathBuf,
        #[arg(long)]
        format: Option<String>,
    },
    /// Run a shell command whose output is GPX (or converted from
    /// --format).
    Shell {
        command: String,
        #[arg(long)]
        format: Option<String>,
    },
    /// Download tracks, routes and waypoints from a GPS device.
    Gps {
        /// gpsbabel device protocol, e.g. garmin.
        protocol: String,
        /// Serial port, e.g. /dev/ttyUSB0.
        port: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum InterpolationArg {
    None,
    Simple,
    Best,
}

impl From<InterpolationArg> for DemInterpolation {
    fn from(value: InterpolationArg) -> Self {
        match value {
            InterpolationArg::None => DemInterpolation::None,
            InterpolationArg::Simple => DemInterpolation::Simple,
            InterpolationArg::Best => DemInterpolation::Best,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SmoothArg {
    Flat,
    Linear,
}

pub fn parse_args() -> Args {
    Args::parse()
}
