use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "genconfig", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feasibility and distribution pre-flight checks.
    Check(CheckArgs),
    /// Sample a collection, resolve its trait images and write a manifest.
    Generate(GenerateArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Print the reports as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Input configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Output manifest JSON path.
    #[arg(long)]
    out: PathBuf,

    /// Directory trait sources are resolved against (defaults to the config's directory).
    #[arg(long)]
    assets_root: Option<PathBuf>,

    /// Rayon worker threads (overrides the configuration).
    #[arg(long)]
    threads: Option<usize>,

    /// Decode every trait image into the cache before sampling.
    #[arg(long)]
    preload: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Generate(args) => cmd_generate(args),
    }
}

#[derive(serde::Serialize)]
struct Reports<'a> {
    feasibility: &'a genconfig::FeasibilityReport,
    distribution: &'a genconfig::DistributionReport,
}

fn read_config(path: &Path) -> anyhow::Result<genconfig::GenConfig> {
    genconfig::GenConfig::from_path(path)
        .with_context(|| format!("load configuration '{}'", path.display()))
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let config = read_config(&args.config)?;
    let preflight = genconfig::preflight(&config)?;

    if args.json {
        let doc = Reports {
            feasibility: &preflight.feasibility,
            distribution: &preflight.distribution,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&doc).context("serialize pre-flight reports")?
        );
    } else {
        print!("{}", preflight.feasibility.render());
        print!("{}", preflight.distribution.render());
    }

    if preflight.is_blocked() {
        preflight.ensure_runnable()?;
    }
    Ok(())
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let mut config = read_config(&args.config)?;
    if let Some(threads) = args.threads {
        config.generation.threads = Some(threads);
    }

    let assets_root = match args.assets_root {
        Some(root) => root,
        None => args
            .config
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf(),
    };
    let loader = Arc::new(genconfig::FsTraitLoader::new(assets_root));
    let generator = genconfig::Generator::new(&config, loader)?;
    let cancel = genconfig::CancelToken::new();

    if args.preload {
        let summary = generator.preload(&cancel)?;
        eprintln!(
            "preloaded {} trait(s) ({} failed)",
            summary.loaded,
            summary.failed()
        );
        for failure in &summary.failures {
            eprintln!("  {failure}");
        }
    }

    let mut sink = genconfig::ManifestSink::new(&args.out);
    let stats = generator.run(&mut sink, &cancel)?;

    eprintln!(
        "generated {} item(s) ({} distinct, {} collision(s)); cache hit rate {:.1}%",
        stats.items,
        stats.distinct_combinations,
        stats.collisions,
        stats.cache.hit_rate() * 100.0
    );
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
