#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! AddressKit command line.
//!
//! `addresskit load` runs a full ingestion of the current G-NAF
//! release into the local address index; `addresskit search` and
//! `addresskit get` exercise the query path against it.

mod progress;

use std::sync::Arc;

use addresskit_gnaf::{load_gnaf, Config, LoadContext};
use addresskit_index::backend::TantivyBackend;
use addresskit_index::SearchBackend;
use addresskit_models::document_id;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "addresskit", about = "G-NAF address autocomplete toolchain")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch, extract and index the current G-NAF release.
    Load {
        /// Drop and recreate the index (with synonyms) before loading.
        #[arg(long)]
        clear: bool,
    },
    /// Autocomplete a partial address.
    Search {
        /// The partial address to complete.
        query: String,
        /// 1-indexed result page.
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Fetch one address document by its G-NAF pid.
    Get {
        /// G-NAF persistent identifier (e.g. GANSW716635811).
        pid: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let cli = Cli::parse();
    let config = Config::from_env();

    let backend = Arc::new(TantivyBackend::open_or_create(
        config.gnaf_dir.join(&config.index_name),
    )?);

    match cli.command {
        Command::Load { clear } => {
            let ctx = LoadContext {
                backend,
                client: addresskit_fetch::build_client()?,
                clear,
                progress: Arc::new(progress::DownloadBar::new()),
                config,
            };
            let summary = load_gnaf(&ctx).await?;
            println!(
                "Indexed {} documents in {:.1}s",
                summary.documents,
                summary.duration.as_secs_f64()
            );
        }
        Command::Search { query, page } => {
            let results = backend.search(&query, page, config.page_size).await?;
            for hit in &results.hits {
                println!("{:<18} {:>7.3}  {}", hit.pid, hit.score, hit.sla);
            }
            println!("{} of {} total", results.hits.len(), results.total);
        }
        Command::Get { pid } => match backend.get(&document_id(&pid)).await? {
            Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
            None => {
                eprintln!("No address with pid {pid}");
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
