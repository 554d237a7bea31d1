// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Parallel conversion of many files

use super::runner::{output_path, Conversion, Runner, TargetFormat};
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;
use walkdir::WalkDir;

/// Input extensions picked up when walking directories
pub const INPUT_EXTENSIONS: [&str; 5] = ["step", "stp", "iges", "igs", "stl"];

/// A file that could not be converted
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub input: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub converted: Vec<Conversion>,
    pub failures: Vec<BatchFailure>,
    pub duration: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.converted.len() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Expand directories into the supported files below them, sorted by path
pub fn discover(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!(%err, "skipping unreadable entry");
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| is_supported(path))
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    files
}

fn is_supported(path: &Path) -> bool {
    crate::io::extension(path).is_some_and(|ext| INPUT_EXTENSIONS.contains(&ext.as_str()))
}

/// Convert every input into `out_dir`.
///
/// A failing file is recorded in the report and the batch continues; only
/// setup problems (no inputs, unusable output directory) are errors.
pub fn run_batch(
    runner: &Runner,
    inputs: &[PathBuf],
    out_dir: &Path,
    format: TargetFormat,
    show_progress: bool,
) -> Result<BatchReport> {
    let files = discover(inputs);
    if files.is_empty() {
        bail!("No input files found");
    }
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(runner.config().parallelism.unwrap_or(0))
        .build()
        .context("Failed to start worker pool")?;

    let progress = if show_progress {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .context("Invalid progress template")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let start = Instant::now();
    let results: Vec<(PathBuf, Result<Conversion>)> = pool.install(|| {
        files
            .par_iter()
            .map(|input| {
                let output = output_path(input, out_dir, format);
                let result = runner.convert_to(input, &output, format);
                if let Some(name) = input.file_name() {
                    progress.set_message(name.to_string_lossy().into_owned());
                }
                progress.inc(1);
                (input.clone(), result)
            })
            .collect()
    });
    progress.finish_with_message("done");

    let mut report = BatchReport {
        duration: start.elapsed(),
        ..BatchReport::default()
    };
    for (input, result) in results {
        match result {
            Ok(conversion) => report.converted.push(conversion),
            Err(err) => {
                warn!(input = %input.display(), "conversion failed: {:#}", err);
                report.failures.push(BatchFailure {
                    input,
                    error: format!("{:#}", err),
                });
            }
        }
    }
    Ok(report)
}
