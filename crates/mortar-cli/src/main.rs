use clap::{Parser, Subcommand};
use mortar::{
    BackfillOutcome, Connection, Database, Executor, MigrationResult, OrphanCleaner, OrphanRef,
    Outcome, TableSpec,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

mod catalog;
mod config;

/// Idempotent schema reconciliation for SQLite and PostgreSQL.
#[derive(Parser, Debug)]
#[command(name = "mortar", version)]
struct Cli {
    /// Database connection URL (overrides the config file)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Config file (default: `.config/mortar.toml` in this or a parent directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// TOML spec file (default: the one in the config, else the built-in catalog)
    #[arg(long, global = true)]
    specs: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create missing tables, columns and constraints
    Reconcile {
        /// Only these tables
        #[arg(long, value_name = "TABLE")]
        only: Vec<String>,
    },
    /// Show what `reconcile` would run, with the SQL
    Plan {
        /// Only these tables
        #[arg(long, value_name = "TABLE")]
        only: Vec<String>,
    },
    /// Show pending operations, drift and orphaned rows
    Status,
    /// Delete rows whose foreign key points at a missing parent
    CleanOrphans {
        /// Count without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Fill NULLs in one column with its default
    Backfill { table: String, column: String },
    /// Print the desired schema as a spec file
    Catalog,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    SpecFile(#[from] catalog::SpecFileError),

    #[error(transparent)]
    Mortar(#[from] mortar::Error),

    #[error("no database URL: pass --database-url, set DATABASE_URL, or add database_url to .config/mortar.toml")]
    NoDatabaseUrl,

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{table}.{column}'")]
    UnknownColumn { table: String, column: String },

    #[error("column '{table}.{column}' has no default to backfill")]
    NoDefault { table: String, column: String },

    #[error("failed to render spec file: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Everything a command needs, resolved from flags, environment and config.
struct Context {
    database_url: Option<String>,
    specs: Vec<TableSpec>,
    orphans: Vec<OrphanRef>,
}

impl Context {
    fn resolve(cli: &Cli) -> Result<Self, CliError> {
        let loaded = match &cli.config {
            Some(path) => Some(config::load_file(path)?),
            None => config::load()?,
        };
        if let Some(loaded) = &loaded {
            tracing::debug!(path = %loaded.path.display(), "loaded config");
        }

        let database_url = cli
            .database_url
            .clone()
            .or_else(|| loaded.as_ref().and_then(|l| l.config.database_url.clone()));

        let specs_path = cli
            .specs
            .clone()
            .or_else(|| loaded.as_ref().and_then(|l| l.specs_path()));
        let specs = match specs_path {
            Some(path) => catalog::load_specs(&path)?,
            None => catalog::school(),
        };

        let orphans = match loaded {
            Some(loaded) if !loaded.config.orphans.is_empty() => loaded.config.orphans,
            _ => catalog::school_orphans(),
        };

        Ok(Self {
            database_url,
            specs,
            orphans,
        })
    }

    fn select(&self, only: &[String]) -> Result<Vec<TableSpec>, CliError> {
        if only.is_empty() {
            return Ok(self.specs.clone());
        }
        only.iter()
            .map(|name| {
                self.specs
                    .iter()
                    .find(|s| &s.name == name)
                    .cloned()
                    .ok_or_else(|| CliError::UnknownTable(name.clone()))
            })
            .collect()
    }

    async fn connect(&self) -> Result<Database, CliError> {
        let url = self.database_url.as_deref().ok_or(CliError::NoDatabaseUrl)?;
        tracing::info!(database = %mask_password(url), "connecting");
        Ok(mortar::connect(url).await?)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("mortar=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<u8, CliError> {
    let ctx = Context::resolve(&cli)?;

    match cli.command {
        Command::Reconcile { only } => {
            let specs = ctx.select(&only)?;
            let db = ctx.connect().await?;
            let report = mortar::reconcile(&db, &specs).await?;

            if report.results.is_empty() {
                println!("{}", "Schema is up to date.".green());
            }
            for result in &report.results {
                print_result(result);
            }
            println!(
                "\n{} applied, {} already satisfied, {} failed",
                report.applied(),
                report.already_satisfied(),
                report.failures().count()
            );
            Ok(report.exit_code())
        }
        Command::Plan { only } => {
            let specs = ctx.select(&only)?;
            let db = ctx.connect().await?;
            let plan = mortar::plan(&db, &specs).await?;

            if plan.is_empty() {
                println!("{}", "No changes detected.".green());
            }
            for (op, sql) in plan.operations.iter().zip(plan.to_sql(db.dialect())) {
                println!("{}", op.bold());
                for line in sql.lines() {
                    println!("    {}", line.dimmed());
                }
            }
            print_drift(&plan.drift);
            Ok(0)
        }
        Command::Status => {
            let db = ctx.connect().await?;
            println!(
                "database: {} ({})",
                mask_password(ctx.database_url.as_deref().unwrap_or_default()),
                db.dialect()
            );

            let plan = mortar::plan(&db, &ctx.specs).await?;
            if plan.is_empty() {
                println!("schema:   {}", "up to date".green());
            } else {
                println!(
                    "schema:   {}",
                    format!("{} pending operations", plan.operations.len()).yellow()
                );
                for op in &plan.operations {
                    println!("  {}", op);
                }
            }
            print_drift(&plan.drift);

            let counts = OrphanCleaner::new(&db).count(&ctx.orphans).await;
            println!("orphans:");
            for orphan in &ctx.orphans {
                match counts.get(orphan) {
                    Some(0) => println!("  {} {}", "0".green(), orphan),
                    Some(n) => println!("  {} {}", n.yellow(), orphan),
                    None => println!("  {} {}", "?".dimmed(), orphan),
                }
            }
            Ok(0)
        }
        Command::CleanOrphans { dry_run } => {
            let db = ctx.connect().await?;
            let cleaner = OrphanCleaner::new(&db);
            let counts = if dry_run {
                cleaner.count(&ctx.orphans).await
            } else {
                cleaner.clean(&ctx.orphans).await
            };

            let verb = if dry_run { "would delete" } else { "deleted" };
            for orphan in &ctx.orphans {
                match counts.get(orphan) {
                    Some(n) => println!("{} {} rows  {}", verb, n, orphan),
                    None => println!("{}  {}", "skipped".red(), orphan),
                }
            }
            Ok(if counts.len() == ctx.orphans.len() { 0 } else { 1 })
        }
        Command::Backfill { table, column } => {
            let spec = ctx
                .specs
                .iter()
                .find(|s| s.name == table)
                .ok_or_else(|| CliError::UnknownTable(table.clone()))?;
            let col = spec
                .find_column(&column)
                .ok_or_else(|| CliError::UnknownColumn {
                    table: table.clone(),
                    column: column.clone(),
                })?;

            let db = ctx.connect().await?;
            mortar::check_connection(&db).await?;
            match Executor::new(&db).backfill(&table, col).await {
                Some(BackfillOutcome::Filled { rows }) => {
                    println!("{} {}.{}: {} rows", "backfilled".green(), table, column, rows);
                    Ok(0)
                }
                Some(BackfillOutcome::Failed(reason)) => {
                    println!("{} {}", "FAILED".red(), reason);
                    Ok(1)
                }
                None => Err(CliError::NoDefault { table, column }),
            }
        }
        Command::Catalog => {
            mortar_schema::validate_all(&ctx.specs).map_err(mortar::Error::from)?;
            let file = catalog::SpecFile { table: ctx.specs };
            print!("{}", toml::to_string(&file)?);
            Ok(0)
        }
    }
}

fn print_result(result: &MigrationResult) {
    match &result.outcome {
        Outcome::Applied => println!("{}  {}", "applied".green(), result.operation),
        Outcome::AlreadySatisfied => println!("{}       {}", "ok".dimmed(), result.operation),
        Outcome::Failed(reason) => {
            println!("{}   {}", "FAILED".red().bold(), result.operation);
            println!("         {}", reason.red());
        }
    }
    match &result.backfill {
        Some(BackfillOutcome::Filled { rows }) if *rows > 0 => {
            println!("         backfilled {} rows", rows)
        }
        Some(BackfillOutcome::Failed(reason)) => {
            println!("         {} {}", "backfill FAILED:".red(), reason);
            println!(
                "         re-run with: mortar backfill {} {}",
                result.operation.table(),
                backfilled_column(result).unwrap_or("<column>")
            );
        }
        _ => {}
    }
}

fn backfilled_column(result: &MigrationResult) -> Option<&str> {
    match &result.operation {
        mortar::DdlOperation::AddColumn { column, .. } => Some(column.name.as_str()),
        _ => None,
    }
}

fn print_drift(drift: &[mortar::Drift]) {
    for d in drift {
        println!("{} {}", "drift:".yellow(), d);
    }
}

/// Mask password in database URL for display
fn mask_password(url: &str) -> String {
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start {
                let prefix = &url[..start + 3];
                let suffix = &url[at..];
                if let Some(colon) = url[start + 3..at].find(':') {
                    let user = &url[start + 3..start + 3 + colon];
                    return format!("{}{}:***{}", prefix, user, suffix);
                }
            }
        }
    }
    url.to_string()
}
