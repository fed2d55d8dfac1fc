use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use appointment_bot::commands::CommandRouter;
use appointment_bot::keep_alive::KeepAlive;
use appointment_bot::notifier::Notifier;
use appointment_bot::registry::JobRegistry;
use appointment_bot::telegram::TelegramClient;
use appointment_bot::webhook;
use shared::appointment_api::{AppointmentProber, SlotProbe};
use shared::config::{BotConfig, DeployMode, load_dotenv};
use shared::dialog::DialogController;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "appointment_bot=info,shared=info";

#[tokio::main]
async fn main() {
    if let Err(err) = load_dotenv() {
        eprintln!("{err}");
        std::process::exit(1);
    }

    init_tracing();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "failed to load bot config");
            std::process::exit(1);
        }
    };

    let prober = match AppointmentProber::new(Duration::from_secs(config.probe_timeout_seconds)) {
        Ok(prober) => prober,
        Err(err) => {
            error!(error = %err, "failed to initialize appointment prober");
            std::process::exit(1);
        }
    };
    let telegram = match TelegramClient::new(config.telegram_bot_token.clone()) {
        Ok(telegram) => Arc::new(telegram),
        Err(err) => {
            error!(error = %err, "failed to initialize telegram client");
            std::process::exit(1);
        }
    };

    let prober: Arc<dyn SlotProbe> = Arc::new(prober);
    let notifier: Arc<dyn Notifier> = telegram.clone();
    let registry = JobRegistry::new(prober, notifier.clone(), config.watch.clone());

    let keep_alive = match KeepAlive::from_settings(&config.keep_alive(), registry.clone()) {
        Ok(keep_alive) => keep_alive,
        Err(err) => {
            error!(error = %err, "failed to initialize keep-alive");
            std::process::exit(1);
        }
    };

    let dialog = DialogController::new(
        config.catalog.clone(),
        config.watch.appointment_api_base.clone(),
    );
    let router = Arc::new(CommandRouter::new(dialog, registry, keep_alive, notifier));

    info!(
        deploy_mode = config.deploy_mode.as_str(),
        check_interval_seconds = config.watch.check_interval.as_secs(),
        time_zone = %config.watch.time_zone,
        keep_alive = config.keep_alive().is_enabled(),
        "appointment bot starting"
    );

    match config.deploy_mode {
        DeployMode::Polling => run_polling(&telegram, &router).await,
        DeployMode::Hosted => run_hosted(&config, &telegram, router).await,
    }
}

fn init_tracing() {
    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
    let json = std::env::var("LOG_FORMAT")
        .map(|value| value.trim().eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_polling(telegram: &TelegramClient, router: &CommandRouter) {
    if let Err(err) = telegram.delete_webhook().await {
        warn!(error = %err, "failed to clear telegram webhook before polling");
    }

    tokio::select! {
        _ = telegram.run_long_polling(router) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("appointment bot shutting down");
        }
    }
}

async fn run_hosted(config: &BotConfig, telegram: &TelegramClient, router: Arc<CommandRouter>) {
    let Some(public_base_url) = config.public_base_url.as_deref() else {
        error!("PUBLIC_BASE_URL is required in hosted mode");
        std::process::exit(1);
    };

    let addr: SocketAddr = match config.bind_addr.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, bind_addr = %config.bind_addr, "invalid bind addr");
            std::process::exit(1);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, bind_addr = %addr, "failed to bind webhook listener");
            std::process::exit(1);
        }
    };

    let webhook_url = format!("{public_base_url}/{}", config.telegram_bot_token);
    if let Err(err) = telegram.set_webhook(&webhook_url).await {
        error!(error = %err, "failed to register telegram webhook");
        std::process::exit(1);
    }

    info!(
        bind_addr = %listener.local_addr().unwrap_or(addr),
        "webhook server listening"
    );

    let app = webhook::app(router, &config.telegram_bot_token);
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("appointment bot shutting down");
        }
    };

    if let Err(err) = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!(error = %err, "webhook server failed");
        std::process::exit(1);
    }
}
