use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::WrapErr;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ptstage::{
    map::parse_map,
    script::{DEFAULT_DECODER, GeneratorConfig, generate},
    stage::{stage_objects, write_script},
};

/// Stage the executables of a traced process and write a decode script for them.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Used to name the output files (decode_<NAME>.sh and obj_<NAME>/)
    name: String,

    /// File containing the raw PT packets
    trace_file: PathBuf,

    /// The /proc/<PID>/maps file for the traced process
    map_file: PathBuf,

    /// Decoder binary invoked by the script
    #[arg(long, value_name = "BIN", default_value = DEFAULT_DECODER)]
    decoder: String,

    /// Print the script to stdout without copying or writing anything
    #[arg(long)]
    dry_run: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.verbose);

    let map = File::open(&args.map_file)
        .wrap_err_with(|| format!("failed to open map file {}", args.map_file.display()))?;
    let segments = parse_map(BufReader::new(map))?;
    info!(count = segments.len(), map = %args.map_file.display(), "loaded segments");

    let config = GeneratorConfig::new(&args.name).with_decoder(&args.decoder);
    let plan = generate(&config, &segments, &args.trace_file);

    if args.dry_run {
        io::stdout().write_all(plan.script.render().as_bytes())?;
        return Ok(());
    }

    let staged = stage_objects(&plan.copies)?;
    let script_name = config.script_name();
    write_script(Path::new(&script_name), &plan.script)?;

    println!("All good. I generated:");
    println!(
        "  - {} ({} raw images)",
        script_name,
        plan.script.raw_args().count()
    );
    println!(
        "  - {} ({} copied, {} already present)",
        config.staging_dir(),
        staged.copied,
        staged.skipped
    );
    Ok(())
}
