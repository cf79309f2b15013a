//! Running GPSBabel (or a shell pipeline ending in it) as a child
//! process, streaming its GPX stdout straight into the parser, with
//! kill-on-cancel. Also the one-off feature enumeration (`gpsbabel -^3`)
//! that fills the read-only tables of supported file types and devices.

use std::env;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use logging_timer::time;

use crate::acquire::LoadStatus;
use crate::error::GeotraxError;
use crate::gpx_writer::{self, OutputOptions};
use crate::progress::{CancelToken, Kill, ProgressSink};
use crate::read::read_gpx_into_trw;
use crate::trw::TrwLayer;

const DEFAULT_SHELL: &str = "/bin/bash";

/// Where the external tools live. Resolved once at startup; immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct BabelConfig {
    pub gpsbabel_path: PathBuf,
    /// When present, the real program becomes `unbuffer` and gpsbabel is
    /// its first argument, defeating stdio buffering in the child.
    pub unbuffer_path: Option<PathBuf>,
    pub shell_path: PathBuf,
}

impl BabelConfig {
    /// Probe PATH for gpsbabel and unbuffer; the shell defaults to
    /// `/bin/bash`.
    pub fn discover() -> Self {
        let gpsbabel_path =
            find_in_path("gpsbabel").unwrap_or_else(|| PathBuf::from("gpsbabel"));
        let unbuffer_path = find_in_path("unbuffer");
        debug!(
            "gpsbabel at {:?}, unbuffer at {:?}",
            gpsbabel_path, unbuffer_path
        );
        Self {
            gpsbabel_path,
            unbuffer_path,
            shell_path: PathBuf::from(DEFAULT_SHELL),
        }
    }

    pub fn with_gpsbabel(mut self, path: impl Into<PathBuf>) -> Self {
        self.gpsbabel_path = path.into();
        self
    }

    pub fn with_shell(mut self, path: impl Into<PathBuf>) -> Self {
        self.shell_path = path.into();
        self
    }

    pub fn is_available(&self) -> bool {
        self.gpsbabel_path.is_file()
    }

    /// The program to exec and any leading arguments, honouring the
    /// unbuffer wrapper.
    fn program_and_args(&self) -> (PathBuf, Vec<String>) {
        match &self.unbuffer_path {
            Some(unbuffer) => (
                unbuffer.clone(),
                vec![self.gpsbabel_path.to_string_lossy().into_owned()],
            ),
            None => (self.gpsbabel_path.clone(), Vec::new()),
        }
    }
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Read/write capabilities of one gpsbabel format or device, from the
/// six-character rw-flag field of a feature line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BabelMode {
    pub waypoints_read: bool,
    pub waypoints_write: bool,
    pub tracks_read: bool,
    pub tracks_write: bool,
    pub routes_read: bool,
    pub routes_write: bool,
}

impl BabelMode {
    fn from_flags(flags: &str) -> Self {
        let b = flags.as_bytes();
        let at = |i: usize, c: u8| b.get(i).copied() == Some(c);
        Self {
            waypoints_read: at(0, b'r'),
            waypoints_write: at(1, b'w'),
            tracks_read: at(2, b'r'),
            tracks_write: at(3, b'w'),
            routes_read: at(4, b'r'),
            routes_write: at(5, b'w'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BabelFileType {
    pub mode: BabelMode,
    pub identifier: String,
    pub extension: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct BabelDevice {
    pub mode: BabelMode,
    pub identifier: String,
    pub label: String,
}

/// Everything the installed gpsbabel advertises. Built once at init.
#[derive(Debug, Clone, Default)]
pub struct BabelFeatures {
    pub file_types: Vec<BabelFileType>,
    pub devices: Vec<BabelDevice>,
}

impl BabelFeatures {
    /// Run `gpsbabel -^3` and parse the advertisement lines. Each line is
    /// also forwarded to `progress`.
    #[time]
    pub fn load(
        config: &BabelConfig,
        progress: &dyn ProgressSink,
    ) -> Result<Self, GeotraxError> {
        if !config.is_available() {
            return Err(GeotraxError::BabelNotFound(config.gpsbabel_path.clone()));
        }

        let mut features = BabelFeatures::default();
        let (program, mut args) = config.program_and_args();
        args.push("-^3".to_string());

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| GeotraxError::ChildProcess(format!("{program:?}: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line?;
                progress.status(&line);
                features.parse_feature_line(&line);
            }
        }
        let status = child.wait()?;
        if !status.success() {
            return Err(GeotraxError::ChildProcess(format!(
                "gpsbabel -^3 exited with {status}"
            )));
        }

        info!(
            "gpsbabel advertises {} file types and {} devices",
            features.file_types.len(),
            features.devices.len()
        );
        Ok(features)
    }

    fn parse_feature_line(&mut self, line: &str) {
        let tokens: Vec<&str> = line.split('\t').collect();
        match tokens.first() {
            Some(&"file") => {
                if tokens.len() != 6 {
                    warn!("Unexpected gpsbabel format string: {line}");
                    return;
                }
                self.file_types.push(BabelFileType {
                    mode: BabelMode::from_flags(tokens[1]),
                    identifier: tokens[2].to_string(),
                    extension: tokens[3].to_string(),
                    label: tokens[4].to_string(),
                });
            }
            Some(&"serial") => {
                if tokens.len() != 6 {
                    warn!("Unexpected gpsbabel feature string: {line}");
                    return;
                }
                self.devices.push(BabelDevice {
                    mode: BabelMode::from_flags(tokens[1]),
                    identifier: tokens[2].to_string(),
                    label: tokens[4].chars().take(50).collect(),
                });
            }
            _ => (), // Other advertisement kinds are ignored.
        }
    }

    pub fn file_type(&self, identifier: &str) -> Option<&BabelFileType> {
        self.file_types.iter().find(|t| t.identifier == identifier)
    }

    pub fn device(&self, identifier: &str) -> Option<&BabelDevice> {
        self.devices.iter().find(|d| d.identifier == identifier)
    }
}

/// The registered child process, killable from the cancel token while
/// another thread is blocked reading its output.
struct ChildHandle {
    child: Mutex<Child>,
}

impl ChildHandle {
    fn wait(&self) -> std::io::Result<std::process::ExitStatus> {
        self.child.lock().expect("child handle poisoned").wait()
    }
}

impl Kill for ChildHandle {
    fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            if let Err(e) = child.kill() {
                debug!("Could not kill child process: {e}");
            }
        }
    }
}

/// One invocation of the external converter. Argv is explicit; a shell
/// is involved only in shell mode, where the shell itself is the
/// program.
#[derive(Debug, Clone)]
pub struct BabelProcess {
    program: PathBuf,
    leading_args: Vec<String>,
    /// Extra converter options placed before the input specification.
    pub options: Vec<String>,
    pub input_format: Option<String>,
    /// Input file path or device port.
    pub input_file: Option<String>,
    pub filters: Vec<String>,
    pub output_format: String,
    pub output_file: String,
    shell_command: Option<String>,
}

impl BabelProcess {
    pub fn new(config: &BabelConfig) -> Self {
        let (program, leading_args) = config.program_and_args();
        Self {
            program,
            leading_args,
            options: Vec::new(),
            input_format: None,
            input_file: None,
            filters: Vec::new(),
            output_format: "gpx".to_string(),
            output_file: "-".to_string(),
            shell_command: None,
        }
    }

    /// A shell pipeline; its final stage must emit GPX on stdout.
    pub fn from_shell(config: &BabelConfig, command: impl Into<String>) -> Self {
        Self {
            program: config.shell_path.clone(),
            leading_args: Vec::new(),
            options: Vec::new(),
            input_format: None,
            input_file: None,
            filters: Vec::new(),
            output_format: "gpx".to_string(),
            output_file: "-".to_string(),
            shell_command: Some(command.into()),
        }
    }

    pub fn set_input(&mut self, format: Option<&str>, file: impl Into<String>) -> &mut Self {
        self.input_format = format.map(str::to_string);
        self.input_file = Some(file.into());
        self
    }

    pub fn set_filters(&mut self, filters: Vec<String>) -> &mut Self {
        self.filters = filters;
        self
    }

    pub fn set_output(&mut self, format: &str, file: &str) -> &mut Self {
        self.output_format = format.to_string();
        self.output_file = file.to_string();
        self
    }

    /// `[-i <fmt>] -f <input> [filters...] -o <fmt> -F <output>`
    fn build_args(&self) -> Vec<String> {
        if let Some(command) = &self.shell_command {
            return vec!["-c".to_string(), command.clone()];
        }

        let mut args = self.leading_args.clone();
        args.extend(self.options.iter().cloned());
        if let Some(format) = &self.input_format {
            args.push("-i".to_string());
            args.push(format.clone());
        }
        if let Some(file) = &self.input_file {
            args.push("-f".to_string());
            args.push(file.clone());
        }
        args.extend(self.filters.iter().cloned());
        args.push("-o".to_string());
        args.push(self.output_format.clone());
        args.push("-F".to_string());
        args.push(self.output_file.clone());
        args
    }

    /// Run the converter with output forced to GPX on stdout and stream
    /// that into `trw`. The child is registered with `cancel` so the
    /// user can terminate it mid-conversion. Completion is signalled via
    /// the returned status even when zero items were produced.
    #[time]
    pub fn convert_through_gpx(
        &self,
        trw: &mut TrwLayer,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> LoadStatus {
        let args = self.build_args();
        info!("Running converter {:?} {:?}", self.program, args);
        progress.status(&format!("Running {}", self.program.display()));

        let spawned = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                warn!("Could not start {:?}: {e}", self.program);
                return LoadStatus::Error;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            warn!("Child has no stdout");
            return LoadStatus::InternalError;
        };

        let handle = Arc::new(ChildHandle {
            child: Mutex::new(child),
        });
        cancel.register_kill(handle.clone());

        let parse_result = read_gpx_into_trw(BufReader::new(stdout), trw);
        let exit = handle.wait();
        cancel.clear_kill();

        if cancel.is_cancelled() {
            return LoadStatus::Cancelled;
        }
        match exit {
            Ok(status) if !status.success() => {
                warn!("Converter exited with {status}");
                return LoadStatus::Error;
            }
            Err(e) => {
                warn!("Could not wait for converter: {e}");
                return LoadStatus::Error;
            }
            Ok(_) => (),
        }
        match parse_result {
            Ok(()) => LoadStatus::Success,
            Err(e) => {
                warn!("GPX parse of converter output failed: {e}");
                LoadStatus::Error
            }
        }
    }
}

/// Export a layer (or one named track of it) through gpsbabel into any
/// format it can write. Invisible items are stripped at write time.
#[time]
pub fn export_layer(
    config: &BabelConfig,
    trw: &TrwLayer,
    track_name: Option<&str>,
    output_format: &str,
    target: &Path,
) -> Result<(), GeotraxError> {
    if !config.is_available() {
        return Err(GeotraxError::BabelNotFound(config.gpsbabel_path.clone()));
    }

    let tmp = tempfile::Builder::new()
        .prefix("geotrax-export")
        .suffix(".gpx")
        .tempfile()?;

    match track_name {
        Some(name) => {
            let track = trw
                .find_track(name)
                .ok_or_else(|| GeotraxError::ElementNotFound(name.to_string()))?;
            gpx_writer::write_track_file(tmp.path(), track)?;
        }
        None => gpx_writer::write_gpx_file(tmp.path(), trw, OutputOptions::VisibleOnly)?,
    }

    let mut process = BabelProcess::new(config);
    process
        .set_input(Some("gpx"), tmp.path().to_string_lossy().into_owned())
        .set_output(output_format, &target.to_string_lossy());

    let args = process.build_args();
    info!("Exporting via {:?} {:?}", process.program, args);
    let status = Command::new(&process.program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| GeotraxError::ChildProcess(format!("{:?}: {e}", process.program)))?;

    if !status.success() {
        return Err(GeotraxError::ChildProcess(format!(
            "gpsbabel export exited with {status}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CoordMode;
    use crate::progress::NullProgress;

    #[test]
    fn feature_lines_parse_into_tables() {
        let mut features = BabelFeatures::default();
        features.parse_feature_line("file\trw----\tgpx\tgpx\tGPX XML\tnotes");
        features.parse_feature_line("serial\trwrwrw\tgarmin\t\tGarmin serial\tnotes");
        features.parse_feature_line("file\trw\tbroken");
        features.parse_feature_line("banner\twhatever");

        assert_eq!(features.file_types.len(), 1);
        assert_eq!(features.devices.len(), 1);

        let gpx = features.file_type("gpx").unwrap();
        assert!(gpx.mode.waypoints_read && gpx.mode.waypoints_write);
        assert!(!gpx.mode.tracks_read && !gpx.mode.routes_write);

        let garmin = features.device("garmin").unwrap();
        assert!(garmin.mode.tracks_read && garmin.mode.routes_write);
        assert!(features.file_type("kml").is_none());
    }

    #[test]
    fn argv_composition() {
        let config = BabelConfig {
            gpsbabel_path: PathBuf::from("/usr/bin/gpsbabel"),
            unbuffer_path: None,
            shell_path: PathBuf::from(DEFAULT_SHELL),
        };
        let mut process = BabelProcess::new(&config);
        process
            .set_input(Some("kml"), "/tmp/in.kml")
            .set_filters(vec!["-x".to_string(), "simplify,count=100".to_string()])
            .set_output("gpx", "-");
        assert_eq!(
            process.build_args(),
            vec![
                "-i", "kml", "-f", "/tmp/in.kml", "-x", "simplify,count=100", "-o", "gpx",
                "-F", "-"
            ]
        );
    }

    #[test]
    fn unbuffer_wrapping_prepends_gpsbabel() {
        let config = BabelConfig {
            gpsbabel_path: PathBuf::from("/usr/bin/gpsbabel"),
            unbuffer_path: Some(PathBuf::from("/usr/bin/unbuffer")),
            shell_path: PathBuf::from(DEFAULT_SHELL),
        };
        let mut process = BabelProcess::new(&config);
        process.set_input(None, "in.gpx");
        let args = process.build_args();
        assert_eq!(args[0], "/usr/bin/gpsbabel");
        assert_eq!(process.program, PathBuf::from("/usr/bin/unbuffer"));
        assert_eq!(args[1..], ["-f", "in.gpx", "-o", "gpx", "-F", "-"]);
    }

    #[test]
    fn shell_mode_wraps_the_command() {
        let config = BabelConfig {
            gpsbabel_path: PathBuf::from("gpsbabel"),
            unbuffer_path: None,
            shell_path: PathBuf::from("/bin/sh"),
        };
        let process = BabelProcess::from_shell(&config, "cat fixture.gpx");
        assert_eq!(process.build_args(), vec!["-c", "cat fixture.gpx"]);
        assert_eq!(process.program, PathBuf::from("/bin/sh"));
    }

    // Uses the shell as the "converter": portable on any test machine.
    #[test]
    fn shell_pipeline_streams_gpx_into_the_layer() {
        let config = BabelConfig {
            gpsbabel_path: PathBuf::from("gpsbabel"),
            unbuffer_path: None,
            shell_path: PathBuf::from("/bin/sh"),
        };
        let gpx = r#"<gpx creator="t" version="1.1"><wpt lat="1.0" lon="2.0"><name>w</name></wpt></gpx>"#;
        let process = BabelProcess::from_shell(&config, format!("printf '%s' '{gpx}'"));

        let mut trw = TrwLayer::new("shell", CoordMode::LatLon);
        let status = process.convert_through_gpx(&mut trw, &NullProgress, &CancelToken::new());
        assert_eq!(status, LoadStatus::Success);
        assert_eq!(trw.waypoint_count(), 1);
    }

    #[test]
    fn failing_child_is_an_error() {
        let config = BabelConfig {
            gpsbabel_path: PathBuf::from("gpsbabel"),
            unbuffer_path: None,
            shell_path: PathBuf::from("/bin/sh"),
        };
        let process = BabelProcess::from_shell(&config, "exit 3");
        let mut trw = TrwLayer::new("fail", CoordMode::LatLon);
        let status = process.convert_through_gpx(&mut trw, &NullProgress, &CancelToken::new());
        assert_eq!(status, LoadStatus::Error);
    }
}
