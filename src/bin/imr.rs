//! IMR - local instance registry CLI
//!
//! Command-line front end over the shared registry directory. Every
//! subcommand is a thin wrapper around the library operations, so shell
//! scripts and registrant processes see exactly the same semantics.
//!
//! # Usage
//!
//! ```bash
//! # Register an instance (id and port are chosen when omitted)
//! imr register --binary-name malware.exe --binary-path /samples/malware.exe
//!
//! # List live instances / all records
//! imr list
//! imr list --all
//!
//! # Resolve a binary name to host:port (exit 1 when absent)
//! imr resolve malware.exe
//!
//! # Remove a record, or sweep all abandoned ones
//! imr unregister a3f91c02
//! imr reap
//!
//! # Print the first allocatable port
//! imr port
//!
//! # Keep a record fresh until Ctrl+C
//! imr heartbeat a3f91c02
//! ```

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use imr_core::config::RegistryConfig;
use imr_core::record::{InstanceId, InstanceRecord};
use imr_registry::{HeartbeatEmitter, PortAllocator, RegistryStore};

/// IMR - filesystem-backed local instance registry
#[derive(Parser, Debug)]
#[command(name = "imr", version, about)]
struct Args {
    /// Registry directory (defaults to ~/.ida-mcp/instances)
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an instance record
    Register {
        /// Name of the loaded binary
        #[arg(long)]
        binary_name: String,

        /// Instance id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Host the endpoint listens on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Endpoint port (allocated from the configured range when omitted)
        #[arg(long)]
        port: Option<u16>,

        /// Full path of the loaded binary
        #[arg(long, default_value = "")]
        binary_path: String,

        /// Owning process id (defaults to this process)
        #[arg(long)]
        pid: Option<u32>,
    },

    /// List registered instances
    List {
        /// Include stale records and skip reaping
        #[arg(short, long)]
        all: bool,
    },

    /// Resolve a binary name to its live endpoint
    Resolve {
        /// Binary name to look up (case-insensitive)
        binary_name: String,
    },

    /// Remove an instance record
    Unregister {
        /// Id of the record to remove
        instance_id: String,
    },

    /// Delete every record whose owner is stale and dead
    Reap,

    /// Print the first allocatable port in the configured range
    Port {
        /// Host to probe bindability on
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Refresh an instance's record until interrupted
    Heartbeat {
        /// Id of the record to keep fresh
        instance_id: String,

        /// Refresh interval in seconds (defaults to the registry setting)
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;

    let config = match &args.dir {
        Some(dir) => RegistryConfig::new(dir),
        None => RegistryConfig::default(),
    };

    match args.command {
        Command::Register {
            binary_name,
            id,
            host,
            port,
            binary_path,
            pid,
        } => {
            let store = RegistryStore::new(config);
            let instance_id = id.map(InstanceId::from).unwrap_or_else(InstanceId::generate);
            let port = match port {
                Some(port) => port,
                None => PortAllocator::new(store.clone()).find_available(&host)?,
            };
            let pid = pid.unwrap_or_else(std::process::id);

            let record = InstanceRecord::new(instance_id, host, port, binary_name, binary_path, pid);
            store.register(&record)?;
            println!("{} {}", record.instance_id, record.endpoint());
            Ok(())
        }

        Command::List { all } => {
            let store = RegistryStore::new(config);
            let records = store.list(all)?;
            if records.is_empty() {
                println!("No instances registered.");
                return Ok(());
            }
            print_records(&records, store.config().stale_timeout);
            Ok(())
        }

        Command::Resolve { binary_name } => {
            let store = RegistryStore::new(config);
            match store.find_by_binary_name(&binary_name)? {
                Some(record) => {
                    println!("{}", record.endpoint());
                    Ok(())
                }
                None => {
                    eprintln!("No live instance for '{binary_name}'.");
                    process::exit(1);
                }
            }
        }

        Command::Unregister { instance_id } => {
            let store = RegistryStore::new(config);
            let id = InstanceId::from(instance_id);
            store.delete(&id)?;
            println!("Unregistered {id}.");
            Ok(())
        }

        Command::Reap => {
            let store = RegistryStore::new(config);
            let removed = store.reap_all()?;
            println!("Removed {removed} abandoned record(s).");
            Ok(())
        }

        Command::Port { host } => {
            let store = RegistryStore::new(config);
            let port = PortAllocator::new(store).find_available(&host)?;
            println!("{port}");
            Ok(())
        }

        Command::Heartbeat {
            instance_id,
            interval,
        } => {
            let config = match interval {
                Some(secs) => config.with_heartbeat_interval(Duration::from_secs(secs)),
                None => config,
            };
            run_heartbeat(config, InstanceId::from(instance_id))
        }
    }
}

/// Logs go to stderr so stdout stays clean for `resolve` and `port`
/// output consumed by scripts.
fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("imr=info".parse()?)
                .add_directive("imr_core=info".parse()?)
                .add_directive("imr_registry=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn print_records(records: &[InstanceRecord], stale_timeout: Duration) {
    println!(
        "{:<10} {:<22} {:>8} {:>8}  {}",
        "ID", "ENDPOINT", "PID", "AGE", "BINARY"
    );
    for record in records {
        let marker = if record.is_stale(stale_timeout) {
            " (stale)"
        } else {
            ""
        };
        println!(
            "{:<10} {:<22} {:>8} {:>8}  {}{marker}",
            record.instance_id.as_str(),
            record.endpoint(),
            record.pid,
            format_age(record.heartbeat_age_secs()),
            record.binary_name,
        );
    }
}

/// Heartbeat age as a compact human figure ("42s", "3m05s", "2h14m").
fn format_age(secs: f64) -> String {
    let secs = secs as u64;
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3_600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3_600, (secs % 3_600) / 60)
    }
}

#[tokio::main]
async fn run_heartbeat(config: RegistryConfig, instance_id: InstanceId) -> Result<()> {
    let store = RegistryStore::new(config);
    let mut emitter = HeartbeatEmitter::new(store, instance_id);
    emitter.start();

    info!(instance_id = %emitter.instance_id(), "heartbeating until interrupted");
    wait_for_shutdown_signal().await?;

    emitter.stop().await;
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
