//! Batch dispatch: discover images, plan one job per image
//! and run the jobs on a bounded worker pool.
use std::{
    collections::HashSet,
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use indicatif::{ParallelProgressIterator, ProgressBar};
use itertools::{Either, Itertools};
use rayon::prelude::*;
use serde_derive::*;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::{
    config::Config,
    error::{Error, Result},
    job::{ConversionJob, JobFailure, JobOutcome},
    params::ParamPolicy,
    sdk::ThermalSdk,
};

/// Files below `dir` whose extension matches one of
/// `extensions` (case-insensitive), in file name order.
pub fn discover_inputs(dir: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::InputDirMissing(dir.to_path_buf()));
    }

    let mut walker = WalkDir::new(dir)
        .min_depth(1)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut inputs = vec![];
    for entry in walker {
        let entry = entry.map_err(|e| Error::io(dir, e.into()))?;
        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            inputs.push(entry.into_path());
        }
    }
    Ok(inputs)
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => extensions
            .iter()
            .any(|x| x.trim().trim_start_matches('.').eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// One job per input, writing `<stem>.tiff`. Subdirectories
/// below `input_dir` are mirrored below `output_dir`.
///
/// Inputs sharing a stem in the same directory (`a.jpg`,
/// `a.png`) keep their extension instead: `a.jpg.tiff`,
/// `a.png.tiff`. Every job gets a distinct output.
pub fn plan_jobs(inputs: &[PathBuf], input_dir: &Path, output_dir: &Path) -> Vec<ConversionJob> {
    let outputs: Vec<PathBuf> = inputs
        .iter()
        .map(|input| {
            let subdir = input
                .strip_prefix(input_dir)
                .ok()
                .and_then(Path::parent)
                .unwrap_or_else(|| Path::new(""));
            output_dir
                .join(subdir)
                .join(tiff_name(input.file_stem().unwrap_or_default()))
        })
        .collect();
    let counts = outputs.iter().counts();
    let mut taken: HashSet<PathBuf> = outputs
        .iter()
        .filter(|out| counts[out] == 1)
        .cloned()
        .collect();

    let mut jobs = Vec::with_capacity(inputs.len());
    for (index, (input, output)) in inputs.iter().zip(&outputs).enumerate() {
        if counts[output] == 1 {
            jobs.push(ConversionJob::new(index, input, output));
            continue;
        }
        let file_name = input.file_name().unwrap_or_default();
        let mut unique = output.with_file_name(tiff_name(file_name));
        if taken.contains(&unique) {
            let mut name = file_name.to_os_string();
            name.push(format!("-{}", index));
            unique = output.with_file_name(tiff_name(&name));
        }
        debug!(
            "{} shares its stem with another input, writing {}",
            input.display(),
            unique.display()
        );
        taken.insert(unique.clone());
        jobs.push(ConversionJob::new(index, input, unique));
    }
    jobs
}

fn tiff_name(base: &OsStr) -> OsString {
    let mut name = base.to_os_string();
    name.push(".tiff");
    name
}

/// Final tally of a batch. Failures and outputs are listed
/// in submission order.
#[derive(Debug, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<JobFailure>,
}

impl BatchReport {
    pub fn from_outcomes(mut outcomes: Vec<JobOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.index);
        let total = outcomes.len();
        let (outputs, failures): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition_map(|o| match o.result {
                Ok(path) => Either::Left(path),
                Err(failure) => Either::Right(failure),
            });
        BatchReport {
            total,
            succeeded: outputs.len(),
            outputs,
            failures,
        }
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }
}

/// A validated batch, ready to run.
#[derive(Debug)]
pub struct Batch {
    config: Config,
    policy: ParamPolicy,
}

impl Batch {
    /// Validates the configuration, including manual
    /// parameters. Nothing is touched on disk.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let policy = config.param_policy()?;
        Ok(Batch { config, policy })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &ParamPolicy {
        &self.policy
    }

    /// Discovers the inputs and plans their jobs. Fails if
    /// the input directory is missing or holds no images.
    pub fn plan(&self) -> Result<Vec<ConversionJob>> {
        let cfg = &self.config;
        let inputs = discover_inputs(&cfg.input_dir, &cfg.extensions, cfg.recursive)?;
        if inputs.is_empty() {
            return Err(Error::NoInputs {
                dir: cfg.input_dir.clone(),
                extensions: cfg.extensions.clone(),
            });
        }
        Ok(plan_jobs(&inputs, &cfg.input_dir, &cfg.output_dir))
    }

    fn prepare_output_dir(&self) -> Result<()> {
        let dir = &self.config.output_dir;
        if self.config.clean_output && dir.exists() {
            info!("removing previous contents of {}", dir.display());
            fs::remove_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
    }

    /// Converts every planned job on a pool of
    /// `config.workers` threads.
    ///
    /// Per-image failures are collected in the report and
    /// never abort the batch.
    pub fn run(&self, sdk: &dyn ThermalSdk, jobs: &[ConversionJob], bar: ProgressBar) -> Result<BatchReport> {
        self.prepare_output_dir()?;
        let scratch = tempfile::Builder::new()
            .prefix("thermal-scratch-")
            .tempdir()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("thermal-worker-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("could not start worker pool: {}", e)))?;

        let succeeded = AtomicUsize::new(0);
        let failed = AtomicUsize::new(0);
        let retries = self.config.sdk.retries;
        let outcomes: Vec<JobOutcome> = pool.install(|| {
            jobs.par_iter()
                .progress_with(bar.clone())
                .map(|job| {
                    let outcome = job.run(sdk, &self.policy, retries, scratch.path());
                    if job.index == 0 && self.policy.is_embedded() {
                        match &outcome.params {
                            Some(params) => info!("parameters of first image: {}", params),
                            None => warn!("could not read parameters of first image"),
                        }
                    }
                    match &outcome.result {
                        Ok(_) => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(failure) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            warn!("{}", failure);
                        }
                    }
                    outcome
                })
                .collect()
        });
        bar.finish();

        let report = BatchReport::from_outcomes(outcomes);
        debug_assert_eq!(report.succeeded, succeeded.load(Ordering::Relaxed));
        debug_assert_eq!(report.failed(), failed.load(Ordering::Relaxed));
        info!(
            "processed {}/{} images successfully",
            report.succeeded, report.total
        );
        Ok(report)
    }
}
