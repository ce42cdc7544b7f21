use std::io::Write;

use chrono::{DateTime, Local};
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

mod app;
mod config;
mod error;
mod messages;
mod models;
mod services;
mod snooze;
mod store;

use app::App;
use config::Config;
use error::Result;
use messages::{Command, ErrorKind, Outcome, WireError};
use models::SnoozePreset;
use snooze::Wake;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = Config::load()?;

    let (wake_tx, mut wake_rx) = mpsc::channel(8);
    let mut app = App::new(&config, wake_tx).await?;

    match args.get(1).map(String::as_str) {
        Some("run") => run_daemon(&mut app, &mut wake_rx).await,
        Some("login") => login(&mut app).await,
        Some("snooze") if args.len() >= 4 => {
            let url = url::Url::parse(&args[2])
                .map_err(|e| anyhow::anyhow!("Invalid URL {}: {e}", args[2]))?;
            let until_timestamp = parse_until(&app, &args[3]).await?;
            dispatch(
                &mut app,
                Command::Snooze {
                    url: String::from(url),
                    until_timestamp,
                },
            )
            .await
        }
        Some("unsnooze") if args.len() >= 3 => {
            dispatch(&mut app, Command::Unsnooze { item_id: args[2].clone() }).await
        }
        Some("archive") if args.len() >= 3 => {
            dispatch(&mut app, Command::Archive { item_id: args[2].clone() }).await
        }
        Some("sync") => {
            let force = args.get(2).map(String::as_str) == Some("--force");
            dispatch(&mut app, Command::Sync { force }).await
        }
        Some("list") => list(&app).await,
        Some("status") => dispatch(&mut app, Command::IsAuthenticated).await,
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("Usage: pocket-snooze <command>");
    println!();
    println!("Commands:");
    println!("  run                      start the wake daemon (JSON commands on stdin)");
    println!("  login                    authenticate with Pocket");
    println!("  snooze <url> <when>      snooze a page; <when> is a preset name,");
    println!("                           an RFC3339 date, or epoch seconds");
    println!("  unsnooze <item_id>       wake an item up now");
    println!("  archive <item_id>        dismiss an item without resurfacing it");
    println!("  sync [--force]           refresh item metadata from Pocket");
    println!("  list                     show locally snoozed items");
    println!("  status                   show whether a login is present");
    println!();
    let presets = [
        SnoozePreset::InTheMorning,
        SnoozePreset::ThisEvening,
        SnoozePreset::TomorrowMorning,
        SnoozePreset::ThisWeekend,
        SnoozePreset::NextWeek,
        SnoozePreset::InOneQuarter,
        SnoozePreset::InOneYear,
    ];
    let names: Vec<&str> = presets.iter().map(|p| p.name()).collect();
    println!("Presets: {}", names.join(", "));
}

async fn dispatch(app: &mut App, command: Command) -> Result<()> {
    let outcome = app.handle_command(command).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if matches!(outcome, Outcome::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

async fn login(app: &mut App) -> Result<()> {
    let code = match app.handle_command(Command::StartAuthentication).await {
        Outcome::AuthorizationPending { url, code } => {
            println!("Opening {url}");
            if open::that(&url).is_err() {
                println!("Could not open a browser; visit the URL yourself.");
            }
            code
        }
        outcome => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            std::process::exit(1);
        }
    };

    print!("Approve the request in your browser, then press Enter... ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    dispatch(app, Command::FinishAuthentication { code }).await
}

async fn parse_until(app: &App, arg: &str) -> Result<i64> {
    if let Ok(epoch) = arg.parse::<i64>() {
        return Ok(epoch);
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(arg) {
        return Ok(date.timestamp());
    }
    if let Some(preset) = SnoozePreset::parse(arg) {
        let settings = app.store().settings().await?;
        return Ok(settings.resolve(preset, Local::now()).timestamp());
    }
    Err(anyhow::anyhow!("Unrecognized wake time: {arg} (preset, RFC3339 date, or epoch seconds)").into())
}

async fn list(app: &App) -> Result<()> {
    let items = app.store().snoozed_items().await?;
    if items.is_empty() {
        println!("No snoozed items");
        return Ok(());
    }
    for item in items {
        let wakes = DateTime::from_timestamp(item.until_timestamp, 0)
            .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| item.until_timestamp.to_string());
        println!("{:>12}  {}  {}", item.item_id, wakes, item.title);
        println!("{:>12}  {}", "", item.url);
    }
    Ok(())
}

async fn run_daemon(app: &mut App, wake_rx: &mut mpsc::Receiver<Wake>) -> Result<()> {
    app.schedule_startup_check();
    tracing::info!("daemon started");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            Some(Wake) = wake_rx.recv() => {
                app.handle_wake().await;
            }
            line = lines.next_line() => {
                match line? {
                    Some(line) if !line.trim().is_empty() => {
                        let outcome = match serde_json::from_str::<Command>(&line) {
                            Ok(command) => app.handle_command(command).await,
                            Err(error) => Outcome::Failed {
                                error: WireError {
                                    kind: ErrorKind::Internal,
                                    message: format!("malformed command: {error}"),
                                    remote_error: None,
                                },
                            },
                        };
                        println!("{}", serde_json::to_string(&outcome)?);
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
    }

    // stdin closed; keep serving scheduled wakes.
    while wake_rx.recv().await.is_some() {
        app.handle_wake().await;
    }
    Ok(())
}
