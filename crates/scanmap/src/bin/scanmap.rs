use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use scanmap::export::{bundle_status, load_bundle, BundleError, BundleStatus, MarkerList};
use scanmap::registry::{ChangeReporting, FusionPolicy, DEFAULT_REPLACE_TOLERANCE_M};
use scanmap::replay::{replay, ObservationLog, ReplayError};

#[derive(Parser, Debug)]
#[command(name = "scanmap")]
#[command(author, version, about = "Marker fusion and snapshot bundle tools")]
#[command(propagate_version = true)]
struct Cli {
    /// Emit debug logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON logs (requires the `tracing` feature).
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay recorded observation batches and write the fused marker list.
    Fuse {
        /// JSON recording: `{"batches": [[observation, ...], ...]}`.
        #[arg(long)]
        batches: PathBuf,
        /// Output marker list (JSON).
        #[arg(long)]
        out: PathBuf,
        /// Replacement distance tolerance in metres.
        #[arg(long, default_value_t = DEFAULT_REPLACE_TOLERANCE_M)]
        tolerance: f32,
        /// Count replacements as changes.
        #[arg(long)]
        report_replacements: bool,
    },
    /// Check a snapshot bundle and summarise its contents.
    Inspect {
        /// Bundle base path (without `.stl` / `.json`).
        base: PathBuf,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Replay(#[from] ReplayError),
    #[error(transparent)]
    Markers(#[from] scanmap::export::MarkerListError),
    #[error(transparent)]
    Bundle(#[from] BundleError),
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        scanmap::core::level_from_env(LevelFilter::Info)
    };

    // Ignore errors if a logger/subscriber is already installed.
    #[cfg(feature = "tracing")]
    {
        let _ = level;
        let _ = tracing_log::LogTracer::init();
        scanmap::core::init_tracing(cli.json_logs);
    }
    #[cfg(not(feature = "tracing"))]
    {
        let _ = scanmap::core::init_with_level(level);
    }
}

fn run_fuse(
    batches: PathBuf,
    out: PathBuf,
    tolerance: f32,
    report_replacements: bool,
) -> Result<(), CliError> {
    let log = ObservationLog::load_json(&batches)?;
    let policy = FusionPolicy {
        replace_tolerance_m: tolerance,
        change_reporting: if report_replacements {
            ChangeReporting::InsertsAndReplacements
        } else {
            ChangeReporting::InsertsOnly
        },
    };
    let (registry, summary) = replay(&log, policy)?;
    MarkerList::new(registry.snapshot()).write_json(&out)?;

    println!("batches:         {}", summary.batches);
    println!("changed batches: {}", summary.changed_batches);
    println!("markers:         {}", registry.len());
    println!("replacements:    {}", summary.replaced);
    println!("dropped:         {}", summary.dropped);
    println!("wrote {}", out.display());
    Ok(())
}

fn run_inspect(base: PathBuf) -> Result<(), CliError> {
    match bundle_status(&base) {
        BundleStatus::Complete => {}
        BundleStatus::Incomplete { missing } => {
            println!("status: incomplete ({missing} missing)");
        }
        BundleStatus::Missing => println!("status: missing"),
    }
    let bundle = load_bundle(&base)?;

    println!("status: complete");
    println!("header:    {}", bundle.mesh.header);
    println!("triangles: {}", bundle.mesh.facet_count());
    println!("markers:   {}", bundle.markers.len());
    for m in &bundle.markers {
        let p = m.pose.position;
        println!(
            "  #{:<6} ({:.3}, {:.3}, {:.3})  error {}",
            m.number, p.x, p.y, p.z, m.reprojection_error
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Fuse {
            batches,
            out,
            tolerance,
            report_replacements,
        } => run_fuse(batches, out, tolerance, report_replacements),
        Commands::Inspect { base } => run_inspect(base),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
