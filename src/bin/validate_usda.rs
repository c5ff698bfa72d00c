//! USDA validation CLI tool.
//!
//! Parses every .usda file under a path with the stage reader and reports
//! which files parse and reconstruct cleanly. Serves as a reference for how
//! to drive `UsdaReader` end to end.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use walkdir::WalkDir;

use openstage::usda::{is_usda, LoadState, ReaderConfig, UsdaReader};

/// USDA file validation result.
#[derive(Debug)]
enum ValidationResult {
    Success {
        root_prims: usize,
        total_prims: usize,
        warnings: usize,
    },
    Skipped {
        reason: String,
    },
    Failed {
        error: String,
    },
}

/// Validate USDA files to test reader coverage.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory or file to validate.
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Stop on first error.
    #[arg(long, short = 'f')]
    fail_fast: bool,

    /// Show detailed output for each file.
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Only show summary statistics.
    #[arg(long, short = 's')]
    summary: bool,

    /// Treat unknown prim types as errors instead of Model fallbacks.
    #[arg(long)]
    strict_types: bool,

    /// Skip files matching these patterns (can be specified multiple times).
    #[arg(long = "skip", short = 'x')]
    skip_patterns: Vec<String>,
}

fn validate_file(path: &Path, strict_types: bool) -> ValidationResult {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            return ValidationResult::Failed {
                error: format!("Failed to read file: {e}"),
            }
        }
    };

    if !is_usda(&source) {
        return ValidationResult::Skipped {
            reason: "no #usda header (binary or foreign file)".to_string(),
        };
    }

    let config = ReaderConfig {
        allow_unknown_prims: !strict_types,
        ..Default::default()
    };
    let mut reader = UsdaReader::new(config);
    if let Some(dir) = path.parent() {
        reader.set_base_dir(&dir.to_string_lossy());
    }

    if let Err(e) = reader.read(&source, LoadState::Toplevel) {
        return ValidationResult::Failed { error: e.to_string() };
    }
    if let Err(e) = reader.reconstruct_stage() {
        return ValidationResult::Failed { error: e.to_string() };
    }

    let stage = reader.stage();
    let mut total_prims = 0;
    stage.traverse(|_| total_prims += 1);
    let root_prims = stage.root_prims().len();
    drop(stage);

    let warnings = reader.warning().lines().filter(|l| !l.is_empty()).count();

    ValidationResult::Success {
        root_prims,
        total_prims,
        warnings,
    }
}

fn should_skip(path: &Path, patterns: &[String]) -> bool {
    let path_str = path.to_string_lossy();
    patterns.iter().any(|p| path_str.contains(p))
}

fn collect_usda_files(path: &Path, skip_patterns: &[String]) -> Vec<PathBuf> {
    if path.is_file() {
        if should_skip(path, skip_patterns) {
            vec![]
        } else {
            vec![path.to_path_buf()]
        }
    } else {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .filter(|p| {
                let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
                matches!(ext.to_lowercase().as_str(), "usda" | "usd")
            })
            .filter(|p| !should_skip(p, skip_patterns))
            .collect()
    }
}

fn main() {
    let args = Args::parse();
    let start = Instant::now();

    let files = collect_usda_files(&args.path, &args.skip_patterns);

    if files.is_empty() {
        eprintln!("No USDA files found in: {}", args.path.display());
        std::process::exit(1);
    }

    println!("Validating {} USDA files...\n", files.len());

    let progress = if !args.summary && !args.verbose {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let passed = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let warned = AtomicUsize::new(0);
    let failures: Mutex<Vec<(PathBuf, String)>> = Mutex::new(Vec::new());
    let fail_fast_triggered = AtomicBool::new(false);

    files.par_iter().for_each(|file| {
        if args.fail_fast && fail_fast_triggered.load(Ordering::Relaxed) {
            return;
        }

        let result = validate_file(file, args.strict_types);

        if let Some(ref pb) = progress {
            pb.inc(1);
        }

        let rel_path = file.strip_prefix(&args.path).unwrap_or(file);

        match &result {
            ValidationResult::Success {
                root_prims,
                total_prims,
                warnings,
            } => {
                passed.fetch_add(1, Ordering::Relaxed);
                if *warnings > 0 {
                    warned.fetch_add(1, Ordering::Relaxed);
                }

                if args.verbose {
                    println!(
                        "[PASS] {} ({} roots, {} prims, {} warnings)",
                        rel_path.display(),
                        root_prims,
                        total_prims,
                        warnings
                    );
                }
            }
            ValidationResult::Skipped { reason } => {
                skipped.fetch_add(1, Ordering::Relaxed);
                if args.verbose {
                    println!("[SKIP] {} - {}", rel_path.display(), reason);
                }
            }
            ValidationResult::Failed { error } => {
                failed.fetch_add(1, Ordering::Relaxed);

                if !args.summary {
                    println!("[FAIL] {}", rel_path.display());
                    println!("       Error: {error}");
                    println!();
                }

                failures.lock().unwrap().push((rel_path.to_path_buf(), error.clone()));

                if args.fail_fast {
                    fail_fast_triggered.store(true, Ordering::Relaxed);
                }
            }
        }
    });

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    println!();
    println!("================================================================================");
    println!("Validation Summary");
    println!("================================================================================");
    println!();

    let total = files.len();
    let pass_count = passed.load(Ordering::Relaxed);
    let fail_count = failed.load(Ordering::Relaxed);
    let skip_count = skipped.load(Ordering::Relaxed);

    println!("Total files:    {total}");
    println!("Passed:         {} ({:.1}%)", pass_count, pct(pass_count, total));
    println!("Failed:         {} ({:.1}%)", fail_count, pct(fail_count, total));
    println!("Skipped:        {} ({:.1}%)", skip_count, pct(skip_count, total));
    println!("With warnings:  {}", warned.load(Ordering::Relaxed));

    let failures = failures.lock().unwrap();
    if !failures.is_empty() {
        println!();
        println!("Failed files:");
        for (path, error) in failures.iter() {
            println!("  - {}", path.display());
            if args.verbose || args.summary {
                println!("    {error}");
            }
        }
    }

    println!("\nTime elapsed: {:.2}s", start.elapsed().as_secs_f64());

    if fail_count > 0 {
        std::process::exit(1);
    }
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64) * 100.0
    }
}
