//! Command-line interface for the candidate-reduction pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::core::loaders::PeakStore;
use crate::core::writers::{self, AppendMode};
use crate::processors::clustering::{cluster_detections, NOISE};
use crate::processors::reduce::{reduce, NoisePolicy};

#[derive(Parser)]
#[command(name = "pulse-reduce")]
#[command(about = "Single-pulse candidate reduction pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a peak dump and reduce it to one candidate per burst
    Cluster {
        /// Binary peak dump of (dm, time, snr, width) records
        peaks: PathBuf,
        /// Output candidate table (defaults to filtered_candidates.csv beside the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Neighborhood radius in normalized (DM, time) units
        #[arg(short, long)]
        eps: Option<f32>,
        /// Minimum neighborhood size for a core point
        #[arg(short, long)]
        min_samples: Option<usize>,
        /// Divisor applied to the DM axis before distance computation
        #[arg(long)]
        dm_scale: Option<f32>,
        /// Divisor applied to the time axis before distance computation
        #[arg(long)]
        time_scale: Option<f32>,
        /// Provenance identifier stamped on every candidate (defaults to a
        /// curfile.txt beside the input, then to the dump's file name)
        #[arg(long)]
        source_file: Option<String>,
        /// Append to an existing candidate table instead of replacing it
        #[arg(long)]
        append: bool,
        /// Emit one candidate per individual noise detection instead of
        /// collapsing all noise into one
        #[arg(long)]
        per_point_noise: bool,
        /// Zero the cluster_id column (legacy constant-label output)
        #[arg(long)]
        zero_labels: bool,
        /// Also dump the raw detections as a dm,time,snr,width CSV
        #[arg(long)]
        dump_raw: Option<PathBuf>,
    },

    /// Summarize an existing candidate table
    Show {
        /// Candidate table to read
        table: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = truncate_value(value, 39);
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Shorten a value for the summary box, ellipsizing on a character
/// boundary so multi-byte path names never split mid-character.
fn truncate_value(value: &str, max_chars: usize) -> String {
    if value.chars().count() > max_chars {
        let head: String = value.chars().take(max_chars - 3).collect();
        format!("{head}...")
    } else {
        value.to_string()
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Cluster {
            peaks,
            output,
            eps,
            min_samples,
            dm_scale,
            time_scale,
            source_file,
            append,
            per_point_noise,
            zero_labels,
            dump_raw,
        } => cmd_cluster(CmdCluster {
            peaks,
            output,
            eps,
            min_samples,
            dm_scale,
            time_scale,
            source_file,
            append,
            per_point_noise,
            zero_labels,
            dump_raw,
            config,
        }),
        Commands::Show { table } => cmd_show(&table),
    };

    if let Err(e) = result {
        error!("{e:#}");
        std::process::exit(1);
    }
}

struct CmdCluster {
    peaks: PathBuf,
    output: Option<PathBuf>,
    eps: Option<f32>,
    min_samples: Option<usize>,
    dm_scale: Option<f32>,
    time_scale: Option<f32>,
    source_file: Option<String>,
    append: bool,
    per_point_noise: bool,
    zero_labels: bool,
    dump_raw: Option<PathBuf>,
    config: PipelineConfig,
}

/// Resolve the provenance identifier for a peak dump: explicit flag, then a
/// curfile.txt sitting beside the dump, then the dump's own file name.
fn resolve_source_file(peaks: &Path, explicit: Option<String>) -> String {
    if let Some(name) = explicit {
        return name;
    }

    let curfile = peaks.with_file_name("curfile.txt");
    if let Ok(content) = fs::read_to_string(&curfile) {
        let trimmed = content.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    peaks
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| peaks.display().to_string())
}

fn cmd_cluster(args: CmdCluster) -> Result<()> {
    let start = Instant::now();

    // Merge CLI overrides into the config
    let mut clustering = args.config.clustering.clone();
    if let Some(eps) = args.eps {
        clustering.eps = eps;
    }
    if let Some(min_samples) = args.min_samples {
        clustering.min_samples = min_samples;
    }
    if let Some(dm_scale) = args.dm_scale {
        clustering.scaling.dm_scale = dm_scale;
    }
    if let Some(time_scale) = args.time_scale {
        clustering.scaling.time_scale = time_scale;
    }

    let noise_policy = if args.per_point_noise {
        NoisePolicy::PerPoint
    } else {
        args.config.reduction.noise_policy
    };
    let zero_labels = args.zero_labels || args.config.reduction.zero_labels;

    let output = args.output.unwrap_or_else(|| {
        args.peaks.with_file_name("filtered_candidates.csv")
    });
    let source_file = resolve_source_file(&args.peaks, args.source_file);

    info!("Clustering {}...", args.peaks.display());

    let spinner = create_spinner("Loading peak dump...");
    let store = PeakStore::from_file(&args.peaks, source_file.clone())
        .with_context(|| format!("loading peak dump {}", args.peaks.display()))?;
    spinner.set_message(format!("Clustering {} detections...", store.len()));

    if let Some(raw_path) = &args.dump_raw {
        writers::write_raw_peaks(raw_path, &store)
            .with_context(|| format!("dumping raw detections to {}", raw_path.display()))?;
        info!("Raw detections CSV -> {}", raw_path.display());
    }

    let labels = cluster_detections(&store, &clustering).context("clustering detections")?;

    spinner.set_message("Reducing clusters to candidates...");
    let mut candidates = reduce(&store, &labels, noise_policy).context("reducing candidates")?;

    if zero_labels {
        for candidate in &mut candidates {
            candidate.cluster_id = 0;
        }
    }

    let mode = if args.append {
        AppendMode::Append
    } else {
        AppendMode::Truncate
    };
    writers::write_candidates(&output, &candidates, mode)
        .with_context(|| format!("writing candidate table {}", output.display()))?;

    spinner.finish_and_clear();

    let noise_count = labels.iter().filter(|&&l| l == NOISE).count();
    let cluster_count = labels.iter().filter(|&&l| l >= 0).max().map_or(0, |&m| m + 1);

    info!("Clustering done.");
    info!("Clustering took time = {:.2} s.", start.elapsed().as_secs_f64());

    print_summary(
        "Candidate Reduction Complete",
        &[
            ("Peak dump", args.peaks.display().to_string()),
            ("Source file", source_file),
            ("Output table", output.display().to_string()),
            ("Detections", store.len().to_string()),
            ("Clusters found", cluster_count.to_string()),
            ("Noise detections", noise_count.to_string()),
            ("Candidates", candidates.len().to_string()),
            ("eps", clustering.eps.to_string()),
            ("min_samples", clustering.min_samples.to_string()),
            ("Append mode", args.append.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_show(table: &Path) -> Result<()> {
    let start = Instant::now();

    let candidates = writers::read_candidates(table)
        .with_context(|| format!("reading candidate table {}", table.display()))?;

    let noise_rows = candidates.iter().filter(|c| c.cluster_id == NOISE).count();
    let best = candidates
        .iter()
        .max_by(|a, b| a.snr.total_cmp(&b.snr));

    let mut items = vec![
        ("Table", table.display().to_string()),
        ("Candidates", candidates.len().to_string()),
        ("Noise rows", noise_rows.to_string()),
    ];
    if let Some(best) = best {
        items.push(("Best SNR", format!("{}", best.snr)));
        items.push(("Best DM", format!("{}", best.dm)));
        items.push(("Best time", format!("{}", best.time)));
        items.push(("Best source", best.source_file.clone()));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));

    print_summary("Candidate Table Summary", &items);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_truncate_value_multibyte_boundary() {
        // A multi-byte character straddling the cut point must not split.
        let value = format!("{}é-observation.fil", "x".repeat(35));
        let truncated = truncate_value(&value, 39);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 39);

        let short = truncate_value("obs.fil", 39);
        assert_eq!(short, "obs.fil");
    }

    #[test]
    fn test_resolve_source_file_explicit_wins() {
        let name = resolve_source_file(Path::new("/data/global_peaks.dat"), Some("obs.fil".into()));
        assert_eq!(name, "obs.fil");
    }

    #[test]
    fn test_resolve_source_file_from_curfile() {
        let dir = tempdir().unwrap();
        let peaks = dir.path().join("global_peaks.dat");
        let mut curfile = fs::File::create(dir.path().join("curfile.txt")).unwrap();
        writeln!(curfile, "beams/BM012.fil").unwrap();

        assert_eq!(resolve_source_file(&peaks, None), "beams/BM012.fil");
    }

    #[test]
    fn test_resolve_source_file_falls_back_to_name() {
        let dir = tempdir().unwrap();
        let peaks = dir.path().join("global_peaks.dat");

        assert_eq!(resolve_source_file(&peaks, None), "global_peaks.dat");
    }
}
