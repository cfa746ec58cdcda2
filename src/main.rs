use clap::Parser;
use tracing_subscriber::EnvFilter;

use flypulse::application::usecases::{RunTickUseCase, TickDriver};
use flypulse::application::{Notifier, SubscriptionStore, WeatherGateway};
use flypulse::infrastructure::{
    composite_gateway::CompositeWeatherGateway, console_notifier::ConsoleNotifier,
    openweather_gateway::OpenWeatherGateway, sqlite_store::SqliteSubscriptionStore,
    telegram_notifier::TelegramNotifier, visualcrossing_gateway::VisualCrossingGateway,
};
use flypulse::interfaces::config::Config;

#[derive(Parser, Debug)]
#[command(name = "flypulse")]
struct Args {
    /// Path to config.yaml
    #[arg(long, default_value = "config.yaml")]
    config: String,

    /// Run one tick and exit
    #[arg(long)]
    once: bool,

    /// Do not send Telegram messages (console only)
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("flypulse=info".parse().unwrap()),
        )
        .init();
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    // 1) load config
    let cfg = match Config::load_from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load config {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    let watches = match cfg.to_watches() {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("Invalid watches in config: {e}");
            std::process::exit(1);
        }
    };

    // 2) build infra
    let db_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./flypulse.db".to_string());
    let store = match SqliteSubscriptionStore::new(&db_url).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to open store {db_url}: {e}");
            std::process::exit(1);
        }
    };

    // seed/refresh watches from config; deactivated ones stay deactivated
    // only until the next config edit re-creates them
    for w in &watches {
        if let Err(e) = store.create_watch(w).await {
            tracing::error!(watch = %w.id, "Failed to seed watch: {e}");
            std::process::exit(1);
        }
    }

    let api_key = match std::env::var("OPENWEATHER_API_KEY") {
        Ok(k) if !k.is_empty() => k,
        _ => {
            tracing::error!("OPENWEATHER_API_KEY not set");
            std::process::exit(1);
        }
    };
    let openweather = OpenWeatherGateway::new(api_key);

    // Visual Crossing is optional: without it cloud base and fog stay
    // empty and rules binding them read INSUFFICIENT_DATA
    let gateway: Box<dyn WeatherGateway> = match std::env::var("VISUALCROSSING_API_KEY") {
        Ok(key) if !key.is_empty() => Box::new(CompositeWeatherGateway::new(
            Box::new(openweather),
            Box::new(VisualCrossingGateway::new(key)),
        )),
        _ => {
            tracing::warn!("VISUALCROSSING_API_KEY not set, using OpenWeather alone");
            Box::new(openweather)
        }
    };

    let notifier: Box<dyn Notifier> = if args.dry_run {
        tracing::warn!("--dry-run enabled: only console output");
        Box::new(ConsoleNotifier::new())
    } else {
        match std::env::var("TELEGRAM_BOT_TOKEN") {
            Ok(token) if !token.is_empty() => Box::new(TelegramNotifier::new(token)),
            _ => {
                tracing::warn!("TELEGRAM_BOT_TOKEN not set, falling back to console");
                Box::new(ConsoleNotifier::new())
            }
        }
    };

    // 3) usecase + driver
    let run_tick = RunTickUseCase {
        store: &store,
        gateway: gateway.as_ref(),
        notifier: notifier.as_ref(),
        settings: cfg.tick_settings(),
    };
    let driver = TickDriver {
        run_tick: &run_tick,
        interval: cfg.tick_interval(),
        deadline: cfg.tick_deadline(),
    };

    // 4) run
    if args.once {
        driver.run_once(1).await;
        tracing::info!("run once completed");
        return;
    }

    tracing::info!(
        interval_secs = driver.interval.as_secs(),
        deadline_secs = driver.deadline.as_secs(),
        "polling started"
    );
    driver.run().await;
}
