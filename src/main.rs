//! Digit-contract trading bot entry point.

use std::net::SocketAddr;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use digit_bot::ai::{BacktestClient, BacktestRequest};
use digit_bot::api::{create_router, AppState};
use digit_bot::bot::{BotDriver, BotHandle, SharedView};
use digit_bot::broker::{spawn_connection, BrokerEvent, ConnectionSettings, InboundMessage};
use digit_bot::config::Config;
use digit_bot::metrics;
use digit_bot::stats::DigitWindow;
use digit_bot::utils::{mask_secret, shutdown_signal};

/// Digit-contract trading bot.
#[derive(Parser, Debug)]
#[command(name = "digit-bot")]
#[command(about = "Staking loop for last-digit contracts with martingale and bulk modes")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Connect, serve the HTTP API and drive the bot (default).
    Run {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Collect ticks and print last-digit statistics.
    Digits {
        /// Number of ticks to collect.
        #[arg(short, long, default_value = "100")]
        samples: usize,
    },

    /// Ask the AI model to backtest a strategy.
    Backtest {
        /// Free-text strategy description.
        #[arg(short, long)]
        strategy: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load .env before the log filter reads RUST_LOG
    let _ = dotenvy::dotenv();
    init_tracing(args.verbose);

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Digits { samples }) => cmd_digits(samples).await,
        Some(Command::Backtest { strategy }) => cmd_backtest(strategy).await,
        Some(Command::Run { port }) => cmd_run(port.or(args.port)).await,
        None => cmd_run(args.port).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("digit_bot=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let json = Config::load().is_ok_and(|c| c.json_logs());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("DIGIT BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Building endpoint... ");
    match ConnectionSettings::from_config(&config) {
        Ok(settings) => {
            println!("OK");
            println!("  Host: {}", settings.url.host_str().unwrap_or("-"));
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Endpoint invalid"));
        }
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  App ID: {}", config.deriv_app_id);
    match &config.deriv_api_token {
        Some(token) if config.can_trade() => println!("  API Token: {}", mask_secret(token)),
        _ => println!("  WARNING: DERIV_API_TOKEN is not set, trading is disabled"),
    }
    println!("  Tick Symbol: {}", config.tick_symbol);
    println!("  Digit Window: {} ticks", config.digit_window);
    println!("  Heartbeat: {}s", config.heartbeat_interval_s);
    println!("  Max Reconnect Delay: {}s", config.reconnect_max_delay_s);
    match &config.ai_api_key {
        Some(key) if !key.trim().is_empty() => {
            println!("  AI Model: {} ({})", config.ai_model, mask_secret(key))
        }
        _ => println!("  AI Backtest: Disabled (AI_API_KEY not set)"),
    }
    println!("  HTTP Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Connect, serve the HTTP API and drive the bot until shutdown.
async fn cmd_run(port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    if !config.can_trade() {
        return Err(anyhow::anyhow!("DERIV_API_TOKEN is required to run the bot"));
    }

    let prometheus = metrics::install_recorder()?;
    info!("Configuration loaded successfully");
    info!("Tick symbol: {}", config.tick_symbol);

    // Connection manager
    let settings = ConnectionSettings::from_config(&config)?;
    let (connection, events, connection_task) = spawn_connection(settings);

    // Driver owns the engine
    let view = SharedView::new(config.digit_window);
    let (bot, control_rx) = BotHandle::channel();
    let driver = BotDriver::new(connection.clone(), Some(config.tick_symbol.clone()), view.clone());
    let driver_task = tokio::spawn(driver.run(events, control_rx));

    // App state
    let mut app_state = AppState::new(bot, view, connection.connected_flag()).with_metrics(prometheus);
    match BacktestClient::new(&config) {
        Ok(client) => {
            info!(model = client.model(), "AI backtest enabled");
            app_state = app_state.with_backtest(client);
        }
        Err(e) => warn!("AI backtest disabled: {}", e),
    }

    // HTTP server
    let port = port_override.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    driver_task.abort();
    connection_task.abort();
    Ok(())
}

/// Collect `samples` ticks and print digit statistics.
async fn cmd_digits(samples: usize) -> anyhow::Result<()> {
    let config = load_config()?;
    let samples = samples.clamp(1, digit_bot::config::MAX_DIGIT_WINDOW);

    let mut settings = ConnectionSettings::from_config(&config)?;
    settings.api_token = None;
    let (_connection, mut events, task) = spawn_connection(settings);

    let mut window = DigitWindow::new(samples);
    info!(symbol = %config.tick_symbol, samples, "Collecting ticks");

    let collect = async {
        while window.len() < samples {
            match events.recv().await {
                Some(BrokerEvent::Message(InboundMessage::Tick(tick))) if tick.symbol == config.tick_symbol => {
                    window.push_quote(tick.quote, tick.pip_size);
                }
                Some(BrokerEvent::Message(InboundMessage::Error { error, .. })) => {
                    return Err(anyhow::anyhow!("Vendor error {}: {}", error.code, error.message));
                }
                Some(_) => {}
                None => return Err(anyhow::anyhow!("Connection closed")),
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    // One tick per second on most symbols, plus connect time
    let deadline = Duration::from_secs(samples as u64 * 2 + 30);
    let result = tokio::select! {
        r = tokio::time::timeout(deadline, collect) => r.unwrap_or_else(|_| Err(anyhow::anyhow!("Timed out collecting ticks"))),
        _ = shutdown_signal() => Ok(()),
    };
    task.abort();
    result?;

    let stats = window.stats();
    println!("======================================================================");
    println!("LAST DIGIT STATISTICS - {} ({} ticks)", config.tick_symbol, stats.sample_size);
    println!("======================================================================");
    for digit in 0..10 {
        let pct = stats.percentages[digit];
        let bar = "#".repeat((pct / 2.0).round() as usize);
        println!("  {}  {:>5}  {:>6.2}%  {}", digit, stats.counts[digit], pct, bar);
    }
    println!("----------------------------------------------------------------------");
    println!("  Even / Odd: {:.2}% / {:.2}%", stats.even_pct, stats.odd_pct);
    if let (Some(most), Some(least)) = (stats.most_frequent, stats.least_frequent) {
        println!("  Most frequent: {}  Least frequent: {}", most, least);
    }
    println!(
        "  Volatility: distribution {:?}, range {:?}, even/odd {:?}",
        stats.volatility.distribution, stats.volatility.range, stats.volatility.even_odd
    );
    println!("======================================================================");

    Ok(())
}

/// Run one AI backtest and print the report.
async fn cmd_backtest(strategy: String) -> anyhow::Result<()> {
    let config = load_config()?;
    let client = BacktestClient::new(&config)?;
    let request = BacktestRequest::with_mock_history(strategy)?;

    info!(model = client.model(), "Requesting backtest");
    let report = client.run(&request).await?;

    println!("======================================================================");
    println!("WIN/LOSS PROJECTION");
    println!("======================================================================");
    println!("{}", report.win_loss_projection);
    println!();
    println!("======================================================================");
    println!("STRATEGY INSIGHTS");
    println!("======================================================================");
    println!("{}", report.strategy_insights);

    Ok(())
}
