//! column-press: assemble column PDFs and tag column audio

use anyhow::{bail, Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use column_press::config::Config;
use column_press::document::{
    outline, CoverPageBuilder, DocumentAssembler, PdfFragment, TableOfContentsBuilder,
};
use column_press::manifest::{self, AudioManifest, ColumnManifest};
use column_press::models::safe_file_stem;
use column_press::network::HttpCoverFetcher;
use column_press::tagging::AudioTagger;
use column_press::CoverCache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "column-press", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble a column manifest into one PDF with cover, contents and outline
    Assemble {
        /// Column manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Root directory for collection folders
        #[arg(short, long, env = "COLUMN_PRESS_OUTPUT_DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Write ID3 metadata and cover art into downloaded audio files
    Tag {
        /// Audio manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Tracks tagged at once
        #[arg(short, long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
        concurrency: Option<usize>,
    },
    /// Print the page count and outline of a PDF
    Inspect {
        pdf: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().context("Invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();
    config.log_source();

    let cli = Cli::parse();
    match cli.command {
        Command::Assemble {
            manifest,
            output_dir,
        } => assemble(&config, manifest, output_dir).await,
        Command::Tag {
            manifest,
            concurrency,
        } => tag(&config, manifest, concurrency).await,
        Command::Inspect { pdf } => inspect(pdf),
    }
}

fn cover_cache(config: &Config) -> Result<CoverCache> {
    let fetcher = HttpCoverFetcher::new(&config.user_agent)
        .context("Failed to create HTTP client")?;
    Ok(CoverCache::new(Arc::new(fetcher)))
}

async fn assemble(config: &Config, manifest_path: PathBuf, output_dir: Option<PathBuf>) -> Result<()> {
    let column: ColumnManifest = manifest::load(&manifest_path)?;
    let stem = safe_file_stem(&column.display_title());
    let request = column
        .into_request(&manifest::base_dir(&manifest_path))
        .context("Invalid column manifest")?;

    let collection_dir = output_dir
        .unwrap_or_else(|| config.output_dir.clone())
        .join(&stem);
    std::fs::create_dir_all(&collection_dir)
        .with_context(|| format!("Failed to create {}", collection_dir.display()))?;
    let output_path = collection_dir.join(format!("{}.pdf", stem));

    let cache = cover_cache(config)?;
    let assembler = DocumentAssembler::new(
        CoverPageBuilder::default(),
        TableOfContentsBuilder::new(config.toc_style.clone()),
    );
    let report = assembler
        .assemble_to_path(&request, &cache, &output_path)
        .await
        .with_context(|| format!("Failed to assemble '{}'", request.collection_title))?;

    for skipped in &report.skipped {
        println!(
            "skipped: {} ({}): {}",
            skipped.index + 1,
            skipped.title,
            skipped.reason
        );
    }
    println!(
        "{} ({} pages, {} chapters)",
        report.output_path.display(),
        report.page_count,
        report.bookmarks.len()
    );
    Ok(())
}

async fn tag(config: &Config, manifest_path: PathBuf, concurrency: Option<usize>) -> Result<()> {
    let audio: AudioManifest = manifest::load(&manifest_path)?;
    let tracks = audio.into_tracks(&manifest::base_dir(&manifest_path));
    let concurrency = concurrency.unwrap_or(config.tag_concurrency);

    let cache = cover_cache(config)?;
    let outcomes = AudioTagger::new(concurrency).tag_all(&tracks, &cache).await;

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(state) => println!("{:?}: {}", state, outcome.file_path.display()),
            Err(e) => {
                failed += 1;
                error!("{}: {}", outcome.file_path.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} tracks could not be tagged", failed, outcomes.len());
    }
    info!("All {} tracks tagged", outcomes.len());
    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let bytes = std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let fragment = PdfFragment::parse(&bytes)
        .with_context(|| format!("{} is not a usable PDF", path.display()))?;

    println!("{}: {} pages", path.display(), fragment.page_count());
    for entry in outline::read_outline(fragment.document()) {
        println!("  {} -> page {}", entry.title, entry.target_page + 1);
    }
    Ok(())
}
