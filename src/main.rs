use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;

use threatwire::analysis::ThreatLevel;
use threatwire::app::App;
use threatwire::config::Config;
use threatwire::ingest::parse_timestamp;
use threatwire::storage::{ArticleFilter, DatabaseError, DEFAULT_PER_PAGE};

/// Get the config directory path (~/.config/threatwire/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("threatwire"))
}

/// Create the config directory with user-only permissions.
fn ensure_private_dir(dir: &std::path::Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to set directory permissions to 0700");
        }
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(
    name = "threatwire",
    version,
    about = "Security news ingestion with threat classification and IOC extraction"
)]
struct Args {
    /// Config file (default: ~/.config/threatwire/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the config file
    #[arg(long, value_name = "FILE", global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every enabled source once, classify and store new articles
    Ingest,

    /// Query stored articles
    Search {
        /// Case-insensitive substring; repeat to match any of several
        #[arg(short, long = "keyword", value_name = "TEXT")]
        keywords: Vec<String>,

        /// Restrict to a threat level; repeatable
        #[arg(short, long = "level", value_name = "LEVEL")]
        levels: Vec<ThreatLevel>,

        /// Restrict to a source display name; repeatable
        #[arg(short, long = "source", value_name = "NAME")]
        sources: Vec<String>,

        /// Earliest publication time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,

        /// Latest publication time (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<String>,

        /// Only articles with at least one IOC
        #[arg(long, conflicts_with = "no_iocs")]
        has_iocs: bool,

        /// Only articles without IOCs
        #[arg(long)]
        no_iocs: bool,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: u32,
    },

    /// Print aggregate counts
    Stats,

    /// Classify text without storing it
    Classify {
        /// Text to analyze; reads stdin when omitted
        text: Vec<String>,
    },

    /// Keep ingesting on a schedule until interrupted
    Watch {
        /// Minutes between runs (overrides refresh_interval_minutes)
        #[arg(long, value_name = "MINUTES")]
        interval: Option<u64>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Joins the positional words, or reads all of stdin when there are none.
fn classify_input(words: &[String]) -> Result<String> {
    if words.is_empty() {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")
    } else {
        Ok(words.join(" "))
    }
}

fn parse_date_arg(flag: &str, value: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    value
        .map(|v| parse_timestamp(v).with_context(|| format!("--{flag}: unrecognised date '{v}'")))
        .transpose()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    // Classification needs no database
    if let Command::Classify { text } = &args.command {
        let analyzer = threatwire::analysis::ThreatAnalyzer::new(&config.taxonomy)?;
        return print_json(&analyzer.classify(&classify_input(text)?));
    }

    if let Command::Watch {
        interval: Some(minutes),
    } = &args.command
    {
        config.refresh_interval_minutes = *minutes;
    }

    let db_path = match (&args.db, &config.database_path) {
        (Some(path), _) => path.clone(),
        (None, Some(path)) => PathBuf::from(path),
        (None, None) => {
            ensure_private_dir(&config_dir)?;
            config_dir.join("threats.db")
        }
    };
    let db_path = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?
        .to_owned();

    let mut app = match App::open(&config, &db_path).await {
        Ok(app) => app,
        Err(threatwire::app::AppError::Database(DatabaseError::InstanceLocked)) => {
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Failed to start"),
    };

    let result = run(&app, args.command, &config).await;
    app.shutdown().await;
    result
}

async fn run(app: &App, command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Ingest => {
            let inserted = app.ingest().await.context("Ingestion failed")?;
            print_json(&serde_json::json!({ "inserted": inserted }))
        }
        Command::Search {
            keywords,
            levels,
            sources,
            from,
            to,
            has_iocs,
            no_iocs,
            page,
            per_page,
        } => {
            let filter = ArticleFilter {
                keywords,
                threat_levels: levels,
                sources,
                date_from: parse_date_arg("from", from.as_deref())?,
                date_to: parse_date_arg("to", to.as_deref())?,
                has_iocs: match (has_iocs, no_iocs) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
            };
            print_json(&app.query(&filter, page, per_page).await?)
        }
        Command::Stats => print_json(&app.stats().await?),
        Command::Classify { text } => print_json(&app.classify(&classify_input(&text)?)),
        Command::Watch { .. } => {
            if config.refresh_interval().is_none() {
                anyhow::bail!("watch needs --interval or refresh_interval_minutes > 0");
            }
            app.trigger_ingest();
            let mut updates = app.ingest_handle().subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let report = updates.borrow_and_update().clone();
                        if !report.running {
                            print_json(&report)?;
                        }
                    }
                }
            }
            tracing::info!("Interrupted, stopping");
            Ok(())
        }
    }
}
