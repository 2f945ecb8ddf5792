use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use live_connect::{config::AppConfig, db, lifecycle, scheduler, server, ConfigStore, Store};

#[derive(Parser)]
#[command(name = "live-connect")]
#[command(about = "Sync events from the Live Connect platform into a calendar and render modal content")]
struct Cli {
    /// Settings file (defaults to the platform data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the side table and write default settings
    Init {
        /// Also create the calendar tables when running without a host calendar
        #[arg(long)]
        install_calendar: bool,
    },
    /// Change settings; omitted flags keep their current value
    Configure {
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        token: Option<String>,
        /// Seconds between scheduled syncs (300 to 86400)
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        modal_enhancement: Option<bool>,
        #[arg(long)]
        debug: Option<bool>,
        #[arg(long)]
        page_size: Option<u32>,
        /// IANA name, e.g. "America/Boise"
        #[arg(long)]
        timezone: Option<String>,
        #[arg(long)]
        database: Option<PathBuf>,
        #[arg(long)]
        listen: Option<String>,
    },
    /// Pull events from the platform
    Sync {
        /// Only sync this platform event id
        #[arg(long)]
        event: Option<String>,
    },
    /// Check the API endpoint and token
    TestConnection,
    /// Print the modal HTML for a local event id
    Enhance { event_id: i64 },
    /// Show record counts and the last sync time
    Status,
    /// Serve the AJAX endpoints and run scheduled syncs
    Serve {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => ConfigStore::load_from(path),
        None => ConfigStore::load(),
    };
    live_connect::init_tracing(config.read().debug_mode);

    match cli.command {
        Commands::Init { install_calendar } => init(config, install_calendar),
        Commands::Configure {
            endpoint,
            token,
            interval,
            modal_enhancement,
            debug,
            page_size,
            timezone,
            database,
            listen,
        } => {
            let updated = config.update(|c| {
                if let Some(endpoint) = endpoint {
                    c.api_endpoint = endpoint;
                }
                if let Some(token) = token {
                    c.api_token = token;
                }
                if let Some(interval) = interval {
                    c.sync_interval = interval;
                }
                if let Some(enabled) = modal_enhancement {
                    c.modal_enhancement = enabled;
                }
                if let Some(enabled) = debug {
                    c.debug_mode = enabled;
                }
                if let Some(size) = page_size {
                    c.page_size = size;
                }
                if let Some(tz) = timezone {
                    c.timezone = Some(tz);
                }
                if let Some(path) = database {
                    c.database_path = Some(path);
                }
                if let Some(addr) = listen {
                    c.listen_addr = addr;
                }
            })?;
            print_config(&updated, &config);
            Ok(())
        }
        Commands::Sync { event } => {
            let app = lifecycle::activate(config)?;
            match event {
                Some(id) => {
                    let local = app.sync_event(&id).await?;
                    println!("Synchronized event {id} as local event {local}.");
                }
                None => {
                    let report = app.run_sync().await?;
                    println!(
                        "Successfully synchronized {} events ({} errors).",
                        report.synced_count, report.error_count
                    );
                }
            }
            Ok(())
        }
        Commands::TestConnection => {
            let client = live_connect::ApiClient::from_config(&config.read());
            client
                .test_connection()
                .await
                .context("connection test failed")?;
            println!("Connection successful.");
            Ok(())
        }
        Commands::Enhance { event_id } => {
            let app = lifecycle::activate(config)?;
            match app.enhanced_content(event_id)? {
                Some(html) => println!("{html}"),
                None => println!("No enhanced data available for event {event_id}."),
            }
            Ok(())
        }
        Commands::Status => status(&config),
        Commands::Serve { addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => config
                    .read()
                    .listen_addr
                    .parse()
                    .context("invalid listen address in settings")?,
            };
            let app = Arc::new(lifecycle::activate(config)?);
            let handle = scheduler::start(app.clone());
            let result = server::serve(app, addr).await;
            lifecycle::deactivate(Some(handle));
            result
        }
    }
}

fn init(config: ConfigStore, install_calendar: bool) -> Result<()> {
    let path = config.read().database_path();
    if install_calendar {
        Store::open(&path)?.install_calendar_schema()?;
    }
    let app = lifecycle::activate(config)
        .with_context(|| format!("cannot activate against {}", path.display()))?;
    println!("Content store ready at {}", path.display());
    println!("Settings at {}", app.config().path().display());
    Ok(())
}

fn status(config: &ConfigStore) -> Result<()> {
    let settings = config.read();
    let path = settings.database_path();
    let store = Store::open(&path)?;

    println!("Database:    {}", path.display());
    if !store.calendar_installed()? {
        println!("Calendar:    not installed");
        return Ok(());
    }
    println!("Events:      {}", store.count_posts(db::EVENT_POST_TYPE)?);
    println!("Venues:      {}", store.count_posts(db::VENUE_POST_TYPE)?);
    println!("Meta rows:   {}", store.count_event_meta()?);
    for (status, count) in store.meta_status_counts()? {
        println!("  {status:<10} {count}");
    }
    println!(
        "Last sync:   {}",
        store.last_sync()?.unwrap_or_else(|| "never".to_string())
    );
    println!(
        "Credentials: {}",
        if settings.has_credentials() { "configured" } else { "missing" }
    );
    Ok(())
}

fn print_config(config: &AppConfig, store: &ConfigStore) {
    let token = if config.api_token.is_empty() {
        "(not set)".to_string()
    } else {
        format!("{}…", config.api_token.chars().take(4).collect::<String>())
    };
    println!("Settings saved to {}", store.path().display());
    println!("  endpoint:          {}", config.api_endpoint);
    println!("  token:             {token}");
    println!("  sync interval:     {}s", config.sync_interval);
    println!("  modal enhancement: {}", config.modal_enhancement);
    println!("  debug mode:        {}", config.debug_mode);
    println!("  page size:         {}", config.page_size);
    println!(
        "  timezone:          {}",
        config.timezone.as_deref().unwrap_or("(source offsets)")
    );
    println!("  database:          {}", config.database_path().display());
    println!("  listen:            {}", config.listen_addr);
}
