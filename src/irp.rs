//! Driver for `dji_irp`, the command line utility shipped
//! with the DJI Thermal SDK.
//!
//! Conversion runs
//!
//! ```text
//! dji_irp -s <image> -a measure -o <raw> --emissivity .. --distance .. \
//!         --humidity .. --reflection .. --ambient .. [--measurefmt float32]
//! ```
//!
//! and decodes the raw measurement file it writes.
//! Extraction runs the same action without parameters and
//! parses the report the utility prints: R-JPEG version
//! fields, resolution, parameter ranges and the parameters
//! stored in the image.
use std::{
    collections::HashMap,
    env,
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, Command, Output, Stdio},
    thread,
    time::{Duration, Instant},
};

use lazy_static::lazy_static;
use ndarray::Array2;
use regex::Regex;
use tracing::{debug, warn};

use crate::{
    config::SdkConfig,
    error::{Error, Result},
    params::{MeasurementParams, Param, ParamRange, ParamRanges},
    raster,
    sdk::{MeasureFormat, RJpegInfo, RJpegVersion, ThermalSdk},
};

#[derive(Debug, Clone)]
pub struct IrpExecutable {
    executable: PathBuf,
    library_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    format: MeasureFormat,
}

impl IrpExecutable {
    /// Fails with [`Error::SdkMissing`] if `executable` is
    /// not a file.
    pub fn new(executable: impl Into<PathBuf>) -> Result<Self> {
        let executable = absolute(&executable.into());
        if !executable.is_file() {
            return Err(Error::SdkMissing(executable));
        }
        Ok(IrpExecutable {
            executable,
            library_dir: None,
            timeout: None,
            format: MeasureFormat::default(),
        })
    }

    pub fn from_config(cfg: &SdkConfig) -> Result<Self> {
        Ok(Self::new(&cfg.executable)?
            .with_library_dir(cfg.library_dir.clone())
            .with_timeout(cfg.timeout())
            .with_format(cfg.measure_format))
    }

    pub fn with_library_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.library_dir = dir.map(|d| absolute(&d));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_format(mut self, format: MeasureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        if let Some(dir) = &self.library_dir {
            let var = if cfg!(windows) {
                "PATH"
            } else {
                "LD_LIBRARY_PATH"
            };
            let mut paths = vec![dir.clone()];
            if let Some(existing) = env::var_os(var) {
                paths.extend(env::split_paths(&existing));
            }
            if let Ok(joined) = env::join_paths(paths) {
                cmd.env(var, joined);
            }
        }
        cmd.arg("-s")
            .arg(absolute(input))
            .arg("-a")
            .arg("measure")
            .arg("-o")
            .arg(output);
        cmd
    }

    fn run(&self, mut cmd: Command) -> io::Result<Output> {
        debug!("running {:?}", cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = cmd.spawn()?;
        match self.timeout {
            Some(timeout) => wait_with_timeout(child, timeout),
            None => child.wait_with_output(),
        }
    }

    /// Raw output file for one call, removed when dropped.
    fn raw_path(&self, input: &Path, dir: &Path) -> io::Result<tempfile::TempPath> {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(tempfile::Builder::new()
            .prefix(&format!("{}-", stem))
            .suffix(".raw")
            .tempfile_in(dir)?
            .into_temp_path())
    }
}

impl ThermalSdk for IrpExecutable {
    /// Runs a full `-a measure` with the embedded parameters
    /// and parses the report; the measurement is discarded.
    /// Converting in automatic mode therefore costs two
    /// `dji_irp` runs per image. The `dji` feature reads the
    /// parameters in-process instead.
    fn inspect(&self, path: &Path) -> Result<RJpegInfo> {
        if !path.is_file() {
            return Err(Error::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "image not found"),
            ));
        }

        let scratch = env::temp_dir();
        let raw = self
            .raw_path(path, &scratch)
            .map_err(|e| Error::io(&scratch, e))?;
        let output = self
            .run(self.command(path, &raw))
            .map_err(|e| Error::extraction(path, e))?;
        if !output.status.success() {
            return Err(Error::extraction(path, failure_reason(&output)));
        }

        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push('\n');
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        parse_report(&report).map_err(|reason| Error::extraction(path, reason))
    }

    fn measure(
        &self,
        input: &Path,
        params: &MeasurementParams,
        scratch: &Path,
    ) -> Result<Array2<f32>> {
        let raw = self
            .raw_path(input, scratch)
            .map_err(|e| Error::io(scratch, e))?;

        let mut cmd = self.command(input, &raw);
        for param in Param::ALL {
            cmd.arg(format!("--{}", param.name()))
                .arg(params.get(param).to_string());
        }
        if self.format != MeasureFormat::Int16 {
            cmd.arg("--measurefmt").arg(self.format.as_arg());
        }

        let output = self
            .run(cmd)
            .map_err(|e| Error::conversion(input, e))?;
        if !output.status.success() {
            return Err(Error::conversion(input, failure_reason(&output)));
        }
        let bytes = fs::read(&raw).map_err(|e| Error::io(&*raw, e))?;
        if bytes.is_empty() {
            return Err(Error::conversion(
                input,
                format!("no measurement written; {}", failure_reason(&output)),
            ));
        }

        let (width, height) = image::image_dimensions(input)
            .map_err(|e| Error::conversion(input, format!("reading image size: {}", e)))?;
        raster::decode(&bytes, width as usize, height as usize, self.format)
            .map_err(|e| Error::conversion(input, e))
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// The last few lines the process printed, preferring
/// stderr.
fn failure_reason(output: &Output) -> String {
    let status = format!("dji_irp exited with {}", output.status);
    let text = if output.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
        String::from_utf8_lossy(&output.stderr)
    } else {
        String::from_utf8_lossy(&output.stdout)
    };
    let mut tail: Vec<_> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .rev()
        .take(3)
        .collect();
    if tail.is_empty() {
        return status;
    }
    tail.reverse();
    format!("{}: {}", status, tail.join(" | "))
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> io::Result<Output> {
    // Drain both pipes while waiting so a chatty child cannot
    // block on a full buffer.
    fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<io::Result<Vec<u8>>> {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(mut pipe) = pipe {
                pipe.read_to_end(&mut buf)?;
            }
            Ok(buf)
        })
    }
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if start.elapsed() > timeout {
            warn!("dji_irp timed out after {:?}, killing it", timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("dji_irp timed out after {:?}", timeout),
            ));
        }
        thread::sleep(Duration::from_millis(20));
    };

    let join = |handle: thread::JoinHandle<io::Result<Vec<u8>>>| -> io::Result<Vec<u8>> {
        handle
            .join()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader panicked"))?
    };
    Ok(Output {
        status,
        stdout: join(stdout)?,
        stderr: join(stderr)?,
    })
}

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";
const PARAM_NAME: &str = r"emissivity|distance|humidity|reflection|ambient(?:_temp)?";

lazy_static! {
    static ref VERSION_RE: Regex =
        Regex::new(r"(?im)^\s*(r-jpeg|header|curve lut)\s+version\s*:\s*(0x[0-9a-f]+|\d+)\s*$")
            .unwrap();
    static ref RESOLUTION_RE: Regex =
        Regex::new(r"(?im)^\s*image\s+(width|height)\s*:\s*(\d+)\s*$").unwrap();
    static ref RANGE_RE: Regex = Regex::new(&format!(
        r"(?im)^\s*({})\s*:\s*\[\s*({})\s*,\s*({})\s*\]\s*$",
        PARAM_NAME, NUMBER, NUMBER
    ))
    .unwrap();
    static ref VALUE_RE: Regex = Regex::new(&format!(
        r"(?im)^\s*({})\s*:\s*({})\s*$",
        PARAM_NAME, NUMBER
    ))
    .unwrap();
}

fn parse_u32(s: &str) -> Option<u32> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Parses the report printed by `dji_irp`.
///
/// The five measurement parameters are required; version,
/// resolution and ranges are optional. When a value is
/// printed more than once the last one wins.
pub fn parse_report(report: &str) -> std::result::Result<RJpegInfo, String> {
    let mut version = HashMap::new();
    for cap in VERSION_RE.captures_iter(report) {
        if let Some(val) = parse_u32(&cap[2]) {
            version.insert(cap[1].to_ascii_lowercase(), val);
        }
    }
    let version = match (
        version.get("r-jpeg"),
        version.get("header"),
        version.get("curve lut"),
    ) {
        (Some(&rjpeg), Some(&header), Some(&curve)) => Some(RJpegVersion {
            rjpeg,
            header,
            curve,
        }),
        _ => None,
    };

    let mut width = None;
    let mut height = None;
    for cap in RESOLUTION_RE.captures_iter(report) {
        let val = cap[2].parse().ok();
        if cap[1].eq_ignore_ascii_case("width") {
            width = val;
        } else {
            height = val;
        }
    }
    let resolution = width.zip(height);

    let mut ranges = HashMap::new();
    for cap in RANGE_RE.captures_iter(report) {
        if let (Ok(param), Ok(min), Ok(max)) = (
            cap[1].parse::<Param>(),
            cap[2].parse::<f32>(),
            cap[3].parse::<f32>(),
        ) {
            ranges.insert(param, ParamRange::new(min, max));
        }
    }
    let ranges = Param::ALL
        .iter()
        .map(|p| ranges.get(p).copied())
        .collect::<Option<Vec<_>>>()
        .map(|r| ParamRanges {
            emissivity: r[0],
            distance: r[1],
            humidity: r[2],
            reflection: r[3],
            ambient: r[4],
        });

    let mut values = HashMap::new();
    for cap in VALUE_RE.captures_iter(report) {
        if let (Ok(param), Ok(val)) = (cap[1].parse::<Param>(), cap[2].parse::<f32>()) {
            values.insert(param, val);
        }
    }
    let mut params = MeasurementParams::default();
    for param in Param::ALL {
        let val = values
            .get(&param)
            .ok_or_else(|| format!("report does not state the {}", param))?;
        params.set(param, *val);
    }

    Ok(RJpegInfo {
        resolution,
        version,
        params,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
DIRP API version number : 0x13
DIRP API magic version  : 4ec4c5c
R-JPEG file path : /data/DJI_0001_T.JPG
R-JPEG version information
    R-JPEG version : 0x1
    header version : 0x103
 curve LUT version : 0x1
R-JPEG resolution size
      image  width : 640
      image height : 512
Measurement: get params range:
distance: [1, 25]
humidity: [20, 100]
emissivity: [0.1, 1]
reflection: [-40, 500]
ambient_temp: [-40, 80]
Measurement: get params:
distance: 5
humidity: 70
emissivity: 1
reflection: 23
ambient_temp: 25.5
Run action 1 (measure)
Test done with return code 0
";

    #[test]
    fn parses_full_report() {
        let info = parse_report(REPORT).unwrap();
        assert_eq!(info.resolution, Some((640, 512)));
        assert_eq!(
            info.version,
            Some(RJpegVersion {
                rjpeg: 1,
                header: 0x103,
                curve: 1
            })
        );
        assert_eq!(
            info.params,
            MeasurementParams {
                emissivity: 1.,
                distance: 5.,
                humidity: 70.,
                reflection: 23.,
                ambient: 25.5,
            }
        );
        let ranges = info.ranges.unwrap();
        assert_eq!(ranges.distance, ParamRange::new(1., 25.));
        assert_eq!(ranges.reflection, ParamRange::new(-40., 500.));
        assert_eq!(ranges.ambient, ParamRange::new(-40., 80.));
    }

    #[test]
    fn optional_sections_may_be_missing() {
        let info = parse_report(
            "emissivity: 0.95\ndistance : 13.0\nhumidity: 50\nreflection: -2.5\nambient: 22\n",
        )
        .unwrap();
        assert_eq!(info.resolution, None);
        assert_eq!(info.version, None);
        assert_eq!(info.ranges, None);
        assert_eq!(info.params.reflection, -2.5);
        assert_eq!(info.ranges_or_documented(), ParamRanges::DOCUMENTED);
    }

    #[test]
    fn missing_parameter_is_reported() {
        let err = parse_report("distance: 5\nhumidity: 70\nemissivity: 1\nreflection: 23\n")
            .unwrap_err();
        assert_eq!(err, "report does not state the ambient");
    }

    #[test]
    fn missing_executable_is_a_configuration_error() {
        let err = IrpExecutable::new("/nonexistent/dji_irp").unwrap_err();
        assert!(matches!(err, Error::SdkMissing(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[cfg(unix)]
    mod fake_executable {
        use super::*;
        use crate::testutil::write_jpeg;
        use anyhow::Result;
        use ndarray::Array2;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        struct Fixture {
            dir: TempDir,
            irp: IrpExecutable,
            temps: Array2<f32>,
        }

        impl Fixture {
            fn new(format: MeasureFormat) -> Result<Self> {
                let dir = tempfile::tempdir()?;
                let temps = Array2::from_shape_fn((3, 4), |(r, c)| 20. + r as f32 + c as f32 / 10.);
                let raw = dir.path().join("sample.raw");
                fs::write(&raw, raster::encode(&temps, format)?)?;
                fs::create_dir(dir.path().join("scratch"))?;

                let script = dir.path().join("dji_irp");
                fs::write(
                    &script,
                    format!(
                        r#"#!/bin/sh
echo "$@" >> "{log}"
src=""
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -s) src="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
case "$src" in
  *broken*) echo "dirp_create_from_rjpeg failed: -2" >&2; exit 3 ;;
  *slow*) exec sleep 5 ;;
esac
cat <<'EOF'
{report}
EOF
case "$src" in
  *empty*) exit 0 ;;
esac
cp "{raw}" "$out"
"#,
                        log = dir.path().join("calls.log").display(),
                        raw = raw.display(),
                        report = REPORT,
                    ),
                )?;
                fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

                let irp = IrpExecutable::new(&script)?.with_format(format);
                Ok(Fixture { dir, irp, temps })
            }

            fn image(&self, name: &str) -> Result<PathBuf> {
                let path = self.dir.path().join(name);
                write_jpeg(&path, 4, 3, None)?;
                Ok(path)
            }

            fn scratch(&self) -> PathBuf {
                self.dir.path().join("scratch")
            }

            fn calls(&self) -> Result<String> {
                Ok(fs::read_to_string(self.dir.path().join("calls.log"))?)
            }
        }

        #[test]
        fn measures_with_explicit_parameters() -> Result<()> {
            let fx = Fixture::new(MeasureFormat::Int16)?;
            let image = fx.image("DJI_0001_T.JPG")?;
            let params = MeasurementParams {
                emissivity: 0.95,
                distance: 13.,
                humidity: 50.,
                reflection: 25.,
                ambient: 22.,
            };

            let temps = fx.irp.measure(&image, &params, &fx.scratch())?;
            assert_eq!(temps, fx.temps);

            let calls = fx.calls()?;
            assert!(calls.contains("-a measure"));
            assert!(calls.contains(
                "--emissivity 0.95 --distance 13 --humidity 50 --reflection 25 --ambient 22"
            ));
            assert!(!calls.contains("--measurefmt"));
            // raw file is cleaned up
            assert_eq!(fs::read_dir(fx.scratch())?.count(), 0);
            Ok(())
        }

        #[test]
        fn float32_format_is_requested() -> Result<()> {
            let fx = Fixture::new(MeasureFormat::Float32)?;
            let image = fx.image("a.jpg")?;
            let temps = fx
                .irp
                .measure(&image, &MeasurementParams::default(), &fx.scratch())?;
            assert_eq!(temps, fx.temps);
            assert!(fx.calls()?.contains("--measurefmt float32"));
            Ok(())
        }

        #[test]
        fn failures_become_conversion_errors() -> Result<()> {
            let fx = Fixture::new(MeasureFormat::Int16)?;
            let params = MeasurementParams::default();

            let err = fx
                .irp
                .measure(&fx.image("broken.jpg")?, &params, &fx.scratch())
                .unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Conversion);
            assert!(err.to_string().contains("dirp_create_from_rjpeg failed"));

            let err = fx
                .irp
                .measure(&fx.image("empty.jpg")?, &params, &fx.scratch())
                .unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Conversion);
            assert!(err.to_string().contains("no measurement written"));

            assert_eq!(fs::read_dir(fx.scratch())?.count(), 0);
            Ok(())
        }

        #[test]
        fn slow_calls_time_out() -> Result<()> {
            let fx = Fixture::new(MeasureFormat::Int16)?;
            let irp = fx.irp.clone().with_timeout(Some(Duration::from_millis(200)));
            let start = Instant::now();
            let err = irp
                .measure(&fx.image("slow.jpg")?, &MeasurementParams::default(), &fx.scratch())
                .unwrap_err();
            assert!(start.elapsed() < Duration::from_secs(4));
            assert!(err.to_string().contains("timed out"));
            Ok(())
        }

        #[test]
        fn inspects_embedded_parameters() -> Result<()> {
            let fx = Fixture::new(MeasureFormat::Int16)?;
            let info = fx.irp.inspect(&fx.image("a.jpg")?)?;
            assert_eq!(info.resolution, Some((640, 512)));
            assert_eq!(info.params.ambient, 25.5);
            assert!(!fx.calls()?.contains("--distance"));

            let err = fx.irp.inspect(&fx.image("broken.jpg")?).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::ParameterExtraction);

            let err = fx.irp.inspect(&fx.dir.path().join("missing.jpg")).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Io);
            Ok(())
        }
    }

    /// Runs the real SDK utility over a sample dataset, if
    /// both are available.
    #[test]
    fn sample_images_have_parameters_in_range() -> anyhow::Result<()> {
        use glob::{glob_with, MatchOptions};

        let (base, exe) = match (env::var("THERMAL_DATASETS_PATH"), env::var("DJI_IRP_PATH")) {
            (Ok(base), Ok(exe)) => (base, exe),
            _ => {
                eprintln!("skipping: set THERMAL_DATASETS_PATH and DJI_IRP_PATH");
                return Ok(());
            }
        };
        let irp = IrpExecutable::new(exe)?;

        let mut opts = MatchOptions::new();
        opts.case_sensitive = false;
        for path in glob_with(&format!("{base}/**/*.jpg"), opts)? {
            let path = path?;
            eprintln!("Reading {path}...", path = path.display());
            let info = irp.inspect(&path)?;
            eprintln!("\tparams: {}", info.params);
            info.params.validate()?;
        }
        Ok(())
    }
}
