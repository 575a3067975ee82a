use std::{future::Future, path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use client_core::{
    capture::{BarcodeSource, CaptureOptions, LineBarcodeSource, ScanFeed},
    LookupOutcome, ScannerController, StatusEvent, StatusKind,
};
use futures::StreamExt;
use shared::domain::{ProductDetails, Record};
use tokio::{io::BufReader, sync::broadcast, task::JoinHandle};
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, Settings, DEFAULT_SETTINGS_FILE};

#[derive(Parser, Debug)]
#[command(name = "scanner", about = "Barcode-driven inventory adjustments")]
struct Args {
    /// Settings file, read before the environment.
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    /// Use the built-in demo catalogue instead of the remote store.
    #[arg(long, global = true)]
    demo: bool,
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and probe the store.
    Check,
    /// Look a barcode up without changing it.
    Lookup { barcode: String },
    /// Apply a signed quantity change to one barcode.
    Adjust {
        barcode: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
        #[command(flatten)]
        product: ProductArgs,
    },
    /// Read barcodes from stdin until EOF or Ctrl-C.
    Scan,
}

#[derive(ClapArgs, Debug, Default)]
struct ProductArgs {
    /// Product name, required when the barcode is new.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    size: Option<String>,
}

impl ProductArgs {
    fn details(&self) -> ProductDetails {
        ProductDetails::new(
            self.name.clone().unwrap_or_default(),
            self.color.clone().unwrap_or_default(),
            self.size.clone().unwrap_or_default(),
        )
    }
}

fn main() -> Result<ExitCode> {
    run_detached(async_main())?
}

/// Runs `future` to completion on a fresh runtime. Blocking tasks still
/// parked afterwards, such as a pending stdin read, are left behind.
fn run_detached<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let output = runtime.block_on(future);
    runtime.shutdown_background();
    Ok(output)
}

async fn async_main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if args.demo {
        settings.demo = true;
    }
    if let Some(base_url) = args.base_url.clone() {
        settings.base_url = base_url;
    }

    let controller = ScannerController::new(settings.store_options(), settings.retry_policy());
    let printer = spawn_status_printer(controller.subscribe_events());

    let succeeded = match controller.configure(settings.store_config()).await {
        Ok(()) => run(&controller, &settings, args.command).await?,
        Err(_) => false,
    };

    drop(controller);
    let _ = printer.await;
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run(
    controller: &Arc<ScannerController>,
    settings: &Settings,
    command: Command,
) -> Result<bool> {
    match command {
        Command::Check => Ok(controller.test_connection().await.is_ok()),
        Command::Lookup { barcode } => match controller.on_barcode_detected(&barcode).await {
            Ok(Some(LookupOutcome::Existing(record))) => {
                print_record(&record);
                Ok(true)
            }
            Ok(Some(LookupOutcome::New(barcode))) => {
                println!("{barcode}: new product, not in the store yet");
                Ok(true)
            }
            Ok(None) => {
                println!("empty barcode, nothing to look up");
                Ok(false)
            }
            Err(_) => Ok(false),
        },
        Command::Adjust {
            barcode,
            delta,
            product,
        } => {
            let Ok(Some(_)) = controller.on_barcode_detected(&barcode).await else {
                return Ok(false);
            };
            if controller.quick_adjust(delta, &product.details()).await.is_err() {
                return Ok(false);
            }
            match controller.commit_update().await {
                Ok(outcome) => {
                    print_record(&outcome.record);
                    Ok(true)
                }
                Err(_) => Ok(false),
            }
        }
        Command::Scan => {
            run_scan(controller, settings.reset_delay()).await?;
            Ok(true)
        }
    }
}

fn spawn_status_printer(mut events: broadcast::Receiver<StatusEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let tag = match event.kind {
                        StatusKind::Success => "ok",
                        StatusKind::Info => "..",
                        StatusKind::Warning => "!!",
                        StatusKind::Error => "error",
                    };
                    if event.kind == StatusKind::Error {
                        eprintln!("[{tag}] {}", event.message);
                    } else {
                        println!("[{tag}] {}", event.message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "status printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_record(record: &Record) {
    println!("  barcode:      {}", record.barcode);
    println!("  name:         {}", record.name);
    println!("  quantity:     {}", record.quantity);
    println!("  color:        {}", record.color);
    println!("  size:         {}", record.size);
    match record.last_updated {
        Some(at) => println!("  last updated: {}", at.to_rfc3339()),
        None => println!("  last updated: never"),
    }
}

/// Next line from the feed, or `None` on EOF or Ctrl-C.
async fn next_line(feed: &mut ScanFeed) -> Option<String> {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => None,
        line = feed.next() => line,
    }
}

async fn prompt(feed: &mut ScanFeed, label: &str) -> Option<String> {
    println!("{label}");
    next_line(feed).await
}

async fn run_scan(controller: &Arc<ScannerController>, reset_delay: Duration) -> Result<()> {
    let mut source = LineBarcodeSource::new(|| BufReader::new(tokio::io::stdin()));
    let mut feed = source
        .start(CaptureOptions::default())
        .await
        .context("failed to start stdin capture")?;
    println!("Scanning: one barcode per line, Ctrl-C to stop.");

    while let Some(code) = next_line(&mut feed).await {
        if !handle_scan(controller, &mut feed, &code, reset_delay).await {
            break;
        }
    }

    source.stop().await?;
    println!("Scanner stopped.");
    Ok(())
}

/// Drives one scan to a commit. Returns `false` when input ended.
async fn handle_scan(
    controller: &Arc<ScannerController>,
    feed: &mut ScanFeed,
    code: &str,
    reset_delay: Duration,
) -> bool {
    let details = match controller.on_barcode_detected(code).await {
        Ok(Some(LookupOutcome::Existing(record))) => {
            print_record(&record);
            ProductDetails::default()
        }
        Ok(Some(LookupOutcome::New(_))) => {
            let Some(name) = prompt(feed, "Product name:").await else {
                return false;
            };
            let Some(color) = prompt(feed, "Color:").await else {
                return false;
            };
            let Some(size) = prompt(feed, "Size:").await else {
                return false;
            };
            ProductDetails::new(name, color, size)
        }
        Ok(None) | Err(_) => return true,
    };

    loop {
        let label = "Quantity change (+N to add, -N to subtract, 'skip' to cancel):";
        let Some(raw) = prompt(feed, label).await else {
            return false;
        };
        if raw.eq_ignore_ascii_case("skip") {
            controller.reset_for_next_scan().await;
            return true;
        }
        let Ok(delta) = raw.trim_start_matches('+').parse::<i64>() else {
            println!("Please enter a valid quantity");
            continue;
        };
        if controller.quick_adjust(delta, &details).await.is_err() {
            continue;
        }
        break;
    }

    loop {
        match controller.commit_update().await {
            Ok(_) => break,
            Err(_) => {
                let Some(answer) = prompt(feed, "Retry the update? [y/N]").await else {
                    return false;
                };
                if !answer.eq_ignore_ascii_case("y") {
                    controller.reset_for_next_scan().await;
                    return true;
                }
            }
        }
    }

    let _ = controller.schedule_reset(reset_delay).await;
    true
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn returns_without_waiting_for_parked_blocking_reads() {
        let (_hold_open, parked) = std::sync::mpsc::channel::<()>();
        let started = Instant::now();

        let output = run_detached(async move {
            tokio::task::spawn_blocking(move || {
                let _ = parked.recv();
            });
            tokio::task::yield_now().await;
            7
        })
        .expect("runtime");

        assert_eq!(output, 7);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
