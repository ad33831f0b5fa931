use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use station_monitor::StationIngest;
use station_monitor::config::Config;
use station_monitor::monitor::Monitor;
use station_monitor::registry::StationRegistry;
use station_monitor::{map, stats};
use tracing::{debug, info, warn};

/// Collect NOAA buoy and airport observations into per-station logs.
#[derive(Parser, Debug)]
#[command(name = "station-monitor", version, about = "Poll NOAA buoy and METAR feeds into newest-first station logs")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the station registry from the live feeds and save it.
    BuildRegistry,
    /// Poll every station on the configured interval until Ctrl-C.
    Monitor {
        /// Use the saved registry instead of rebuilding it.
        #[arg(long)]
        reload: bool,
    },
    /// Poll every station once.
    Poll {
        #[arg(long)]
        reload: bool,
    },
    /// Print a station's log, newest first.
    Show {
        /// Buoy id or airport code
        key: String,
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },
    /// Draw the registry on a text map.
    Map {
        #[arg(long)]
        reload: bool,
        #[arg(long, default_value_t = 120)]
        width: usize,
        #[arg(long, default_value_t = 40)]
        height: usize,
    },
    /// Yearly mean and standard deviation for every station log.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();
    let config = Config::load(&args.config).with_context(|| format!("loading {}", args.config.display()))?;
    let ingest = Arc::new(StationIngest::new(&config.settings)?);

    match args.command {
        Command::BuildRegistry => {
            load_or_build_registry(&ingest, &config, false).await?;
        }
        Command::Monitor { reload } => {
            let registry = load_or_build_registry(&ingest, &config, reload).await?;
            let monitor = Monitor::new(
                Arc::clone(&ingest),
                Arc::new(registry),
                config.settings.interval(),
                config.settings.max_concurrent_fetches,
            );
            info!(minutes = config.settings.monitoring_interval, "monitoring started, Ctrl-C to stop");
            monitor
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                })
                .await;
        }
        Command::Poll { reload } => {
            let registry = load_or_build_registry(&ingest, &config, reload).await?;
            let monitor = Monitor::new(
                Arc::clone(&ingest),
                Arc::new(registry),
                config.settings.interval(),
                config.settings.max_concurrent_fetches,
            );
            let summary = monitor.poll_once().await;
            info!(appended = summary.appended, failures = summary.failures.len(), "done");
            if !summary.failures.is_empty() {
                eprintln!("Warnings:");
                for (st, err) in summary.failures {
                    eprintln!("- {}: {}", st, err);
                }
            }
        }
        Command::Show { key, rows } => {
            match StationRegistry::load(&config.settings.registry_file) {
                Ok(registry) => match registry.find(&key) {
                    Some(st) => println!(
                        "{}  {}  {}  ({:.4}, {:.4})",
                        st.log_key(),
                        st.kind,
                        st.location,
                        st.coords.lat,
                        st.coords.lon
                    ),
                    None => warn!(station = %key, "station is not in the saved registry"),
                },
                Err(e) => debug!(error = %e, "no saved registry to describe the station"),
            }
            let (header, data) = ingest
                .store()
                .read(&key)
                .with_context(|| format!("reading log for {}", key))?;
            print_table(&header, data.iter().take(rows));
        }
        Command::Map { reload, width, height } => {
            let registry = load_or_build_registry(&ingest, &config, reload).await?;
            println!("{}", map::render(registry.iter(), width, height));
        }
        Command::Stats => {
            let files = ingest.store().log_files()?;
            if files.is_empty() {
                bail!("no station logs in {}", config.settings.data_dir.display());
            }
            for path in files {
                match stats::summarize_file(&path) {
                    Ok(summary) => println!("{}\n{}", path.display(), summary),
                    Err(e) => warn!(file = %path.display(), error = %e, "skipping log"),
                }
            }
        }
    }
    Ok(())
}

/// Load the saved registry, or build a fresh one and save it.
async fn load_or_build_registry(ingest: &StationIngest, config: &Config, reload: bool) -> Result<StationRegistry> {
    let path = &config.settings.registry_file;
    if reload {
        return StationRegistry::load(path).with_context(|| format!("reloading registry {}", path.display()));
    }
    let registry = ingest.build_registry(&config.stations).await.context("building registry")?;
    if registry.is_empty() {
        warn!("registry is empty, check the station and airport lists");
    }
    registry.save(path)?;
    Ok(registry)
}

fn print_table<'a>(header: &[String], rows: impl Iterator<Item = &'a Vec<String>>) {
    let rows: Vec<&Vec<String>> = rows.collect();
    let widths: Vec<usize> = (0..header.len())
        .map(|i| {
            rows.iter()
                .filter_map(|r| r.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(header[i].chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<w$}", c, w = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join("  ")
    };
    println!("{}", line(header));
    for r in rows {
        println!("{}", line(r.as_slice()));
    }
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
