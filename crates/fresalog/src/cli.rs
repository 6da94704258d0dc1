//! Command-line surface for the engine.
//!
//! Thin presentation glue: each subcommand builds the engine from settings,
//! makes one request/response call, and prints the result. `--json` flags
//! emit machine-readable output for scripting.

use crate::engine::Engine;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use comfy_table::Table;
use fresalog_core::{NewEntry, RegisterRequest, Settings};
use fresalog_queue::PendingQueue;
use fresalog_store::CsvStore;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "fresalog",
    version,
    about = "Tool consumption registration against the shared catalog"
)]
pub struct Cli {
    /// Authoritative store file (defaults to <home>/control_fresas.csv)
    #[arg(long, global = true, env = "FRESALOG_STORE")]
    store: Option<PathBuf>,

    /// Pending queue log (defaults to <home>/pending_consumos.ndjson)
    #[arg(long, global = true, env = "FRESALOG_QUEUE")]
    queue: Option<PathBuf>,

    /// Verbose console logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up a barcode in the catalog
    Lookup {
        barcode: String,
        #[arg(long)]
        json: bool,
    },

    /// Register a consumption event
    Register {
        barcode: String,
        /// Units consumed
        #[arg(short, long, default_value_t = 1)]
        cantidad: u32,
        /// Operator reporting the consumption
        #[arg(short, long)]
        operario: String,
        /// Project / job sheet number
        #[arg(short, long)]
        proyecto: Option<String>,
        /// Brand, required when the barcode is not yet cataloged
        #[arg(long)]
        marca: Option<String>,
        /// Tool type for a new barcode
        #[arg(long)]
        tipo: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Add a catalog entry without registering a consumption
    Add {
        barcode: String,
        #[arg(long)]
        referencia: Option<String>,
        #[arg(long)]
        marca: Option<String>,
        #[arg(long)]
        tipo: Option<String>,
        #[arg(long)]
        precio: Option<f64>,
        #[arg(long)]
        json: bool,
    },

    /// Drain the pending queue into the store
    Sync {
        #[arg(long)]
        json: bool,
    },

    /// Show health: store reachability, catalog size, pending depth
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List catalog entries
    Catalog {
        /// Filter by substring over barcode, referencia and marca
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 200)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// List distinct brands in the catalog
    Marcas {
        #[arg(long)]
        json: bool,
    },

    /// Export pending consumption events as CSV
    Export {
        /// Inclusive start date (YYYY-MM-DD)
        #[arg(long)]
        desde: Option<NaiveDate>,
        /// Inclusive end date (YYYY-MM-DD)
        #[arg(long)]
        hasta: Option<NaiveDate>,
        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn build_engine(cli: &Cli) -> Result<Engine> {
    let mut settings = Settings::from_env();
    if let Some(store) = &cli.store {
        settings.store_path = store.clone();
    }
    if let Some(queue) = &cli.queue {
        settings.queue_path = queue.clone();
    }

    let store = CsvStore::open(&settings.store_path, settings.lock_timeout)
        .with_context(|| format!("opening store {}", settings.store_path.display()))?;
    let queue = PendingQueue::open(&settings.queue_path)
        .with_context(|| format!("opening pending queue {}", settings.queue_path.display()))?;
    Ok(Engine::new(Arc::new(store), queue))
}

pub fn run(cli: Cli) -> Result<()> {
    let engine = build_engine(&cli)?;

    match cli.command {
        Commands::Lookup { ref barcode, json } => {
            let entry = engine.lookup(barcode);
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "found": entry.is_some(),
                        "entry": entry,
                    }))?
                );
            } else {
                match entry {
                    Some(entry) => {
                        println!("{}", entry.barcode);
                        println!("  referencia: {}", entry.referencia.as_deref().unwrap_or("-"));
                        println!("  marca:      {}", entry.marca.as_deref().unwrap_or("-"));
                        println!("  tipo:       {}", entry.tipo.as_deref().unwrap_or("-"));
                        match entry.precio {
                            Some(p) => println!("  precio:     {:.2} €", p),
                            None => println!("  precio:     -"),
                        }
                    }
                    None => println!("{}: not in catalog", barcode),
                }
            }
        }

        Commands::Register {
            barcode,
            cantidad,
            operario,
            proyecto,
            marca,
            tipo,
            json,
        } => {
            let outcome = engine.register(RegisterRequest {
                barcode,
                cantidad,
                operario,
                proyecto,
                marca,
                tipo,
            })?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "success": true,
                        "pending": outcome.pending,
                        "record": outcome.record,
                    }))?
                );
            } else if outcome.pending {
                println!(
                    "Recorded {} x{} (pending sync: store busy)",
                    outcome.record.barcode, outcome.record.cantidad
                );
            } else {
                println!(
                    "Recorded {} x{}",
                    outcome.record.barcode, outcome.record.cantidad
                );
            }
        }

        Commands::Add {
            barcode,
            referencia,
            marca,
            tipo,
            precio,
            json,
        } => {
            let entry = engine.add_entry(NewEntry {
                barcode,
                referencia,
                marca,
                tipo,
                precio,
            })?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "success": true,
                        "entry": entry,
                    }))?
                );
            } else {
                println!("Added {} to the catalog", entry.barcode);
            }
        }

        Commands::Sync { json } => {
            let report = engine.sync()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Sync: {} merged, {} failed, {} remaining",
                    report.merged, report.failed, report.remaining
                );
            }
        }

        Commands::Status { json } => {
            let status = engine.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!(
                    "store:    {}",
                    if status.store_reachable { "ok" } else { "unreachable" }
                );
                println!("catalog:  {} entries", status.catalog_entries);
                println!("pending:  {}", status.pending);
                if let Some(modified) = status.last_modified {
                    println!("modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
                }
            }
        }

        Commands::Catalog { search, limit, json } => {
            let entries = match search.as_deref() {
                Some(term) => engine.catalog().search(term, limit),
                None => {
                    let mut all = engine.catalog().entries();
                    all.truncate(limit);
                    all
                }
            };
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "total": entries.len(),
                        "entries": entries,
                    }))?
                );
            } else {
                let mut table = Table::new();
                table.set_header(["BARCODE", "REFERENCIA", "MARCA", "TIPO", "PRECIO"]);
                for entry in &entries {
                    table.add_row([
                        entry.barcode.clone(),
                        entry.referencia.clone().unwrap_or_default(),
                        entry.marca.clone().unwrap_or_default(),
                        entry.tipo.clone().unwrap_or_default(),
                        entry
                            .precio
                            .map(|p| format!("{:.2}", p))
                            .unwrap_or_default(),
                    ]);
                }
                println!("{table}");
                println!("{} entries", entries.len());
            }
        }

        Commands::Marcas { json } => {
            let marcas = engine.catalog().marcas();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "marcas": marcas }))?
                );
            } else {
                for marca in marcas {
                    println!("{marca}");
                }
            }
        }

        Commands::Export {
            desde,
            hasta,
            output,
        } => match output {
            Some(path) => {
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                let rows = engine.export_pending(desde, hasta, file)?;
                eprintln!("Exported {} rows to {}", rows, path.display());
            }
            None => {
                engine.export_pending(desde, hasta, std::io::stdout().lock())?;
            }
        },
    }

    Ok(())
}
