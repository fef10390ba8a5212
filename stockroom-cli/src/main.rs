//! Stockroom command line
//!
//! `serve` runs the REST API; `migrate`, `status` and `validate` manage the
//! PostgreSQL schema.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use stockroom::executor::PgExecutor;
use stockroom::intake::parse_people_csv;
use stockroom::migration::{startup_migrations, Migrator};
use stockroom::{server, App, Backend, DbPool, MemoryStore, PgStore, StockroomConfig};

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(about = "Equipment and asset tracking back office")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL (overrides config and STOCKROOM__DATABASE__URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Postgres,
    Memory,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the REST API
    Serve {
        /// Listen address, e.g. 0.0.0.0:8000
        #[arg(long)]
        bind: Option<String>,

        /// Storage backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Do not apply pending migrations before serving
        #[arg(long)]
        skip_migrations: bool,

        /// People CSV loaded into the directory of the memory backend
        #[arg(long, value_name = "FILE")]
        people: Option<PathBuf>,
    },

    /// Apply pending migrations
    Migrate {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Show what would be applied without running it
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status (applied vs pending)
    Status,

    /// Validate checksums of applied migrations
    Validate,
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli) {
        eprintln!("❌ Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = StockroomConfig::load().context("loading configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    match cli.command {
        Commands::Serve {
            bind,
            backend,
            skip_migrations,
            people,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if let Some(backend) = backend {
                config.server.backend = match backend {
                    BackendArg::Postgres => Backend::Postgres,
                    BackendArg::Memory => Backend::Memory,
                };
            }
            if skip_migrations {
                config.server.run_migrations = false;
            }
            serve(&config, people.as_deref())
        }
        Commands::Migrate { steps, dry_run } => handle_migrate(&config, steps, dry_run),
        Commands::Status => handle_status(&config),
        Commands::Validate => handle_validate(&config),
    }
}

fn memory_store(people: Option<&Path>) -> Result<MemoryStore> {
    let Some(path) = people else {
        log::warn!("memory backend has an empty directory; check-outs need --people FILE");
        return Ok(MemoryStore::new());
    };
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let people = parse_people_csv(&data).with_context(|| format!("parsing {}", path.display()))?;
    log::info!("loaded {} people from {}", people.len(), path.display());
    Ok(MemoryStore::with_people(people))
}

fn serve(config: &StockroomConfig, people: Option<&Path>) -> Result<()> {
    let app = match config.server.backend {
        Backend::Memory => {
            log::warn!("serving from the in-memory backend; data is lost on exit");
            App::new(Arc::new(memory_store(people)?))
        }
        Backend::Postgres => {
            if people.is_some() {
                log::warn!("--people only applies to the memory backend; ignoring it");
            }
            let pool = DbPool::connect(&config.database).context("connecting to PostgreSQL")?;
            if config.server.run_migrations {
                let conn = pool.acquire()?;
                startup_migrations(&*conn, None)?;
            }
            App::new(Arc::new(PgStore::new(pool)))
        }
    };

    let handle = server::start(Arc::new(app), &config.server)
        .with_context(|| format!("binding {}", config.server.bind))?;
    handle
        .join()
        .map_err(|e| anyhow!("server stopped unexpectedly: {e:?}"))?;
    Ok(())
}

fn executor(config: &StockroomConfig) -> Result<PgExecutor> {
    let client = stockroom::connection::connect(&config.database.url)
        .context("connecting to PostgreSQL")?;
    Ok(PgExecutor::new(client))
}

fn handle_migrate(config: &StockroomConfig, steps: Option<usize>, dry_run: bool) -> Result<()> {
    let executor = executor(config)?;
    let migrator = Migrator::embedded()?;

    if dry_run {
        let status = migrator.status(&executor)?;
        if status.pending.is_empty() {
            println!("No pending migrations to apply");
            return Ok(());
        }
        let to_apply = steps.unwrap_or(status.pending.len());
        println!("Would apply {} migration(s):", to_apply.min(status.pending.len()));
        for (i, pending) in status.pending.iter().take(to_apply).enumerate() {
            println!("  {}. m{}_{}", i + 1, pending.version, pending.name);
        }
        return Ok(());
    }

    println!("Applying migrations...");
    let applied = migrator.up(&executor, steps)?;
    if applied > 0 {
        println!("✅ Successfully applied {applied} migration(s)");
    } else {
        println!("✅ No migrations to apply");
    }
    Ok(())
}

fn handle_status(config: &StockroomConfig) -> Result<()> {
    let executor = executor(config)?;
    let status = Migrator::embedded()?.status(&executor)?;

    println!("\n📊 Migration Status\n");
    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied.len());
        for record in &status.applied {
            let time = record
                .execution_time_ms
                .map_or_else(|| "N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  ✓ m{}_{} ({}, {time})",
                record.version,
                record.name,
                record.applied_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }

    println!();
    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending.len());
        for pending in &status.pending {
            println!("  ⏳ m{}_{} (pending)", pending.version, pending.name);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied.len(),
        status.pending.len()
    );
    Ok(())
}

fn handle_validate(config: &StockroomConfig) -> Result<()> {
    let executor = executor(config)?;
    println!("Validating checksums...");
    Migrator::embedded()?.validate_checksums(&executor)?;
    println!("✅ All checksums valid");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom::store::DirectoryService;

    #[test]
    fn test_memory_store_seeds_demo_people() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config/demo_people.csv");
        let store = memory_store(Some(&path)).unwrap();
        assert_eq!(store.search_people("may").unwrap().len(), 2);
        let kai = store.find_person("B300").unwrap().unwrap();
        assert_eq!(kai.title.as_deref(), Some("Technician"));

        let empty = memory_store(None).unwrap();
        assert!(empty.find_person("A100").unwrap().is_none());
    }
}
