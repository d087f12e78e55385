use auth::ApiCredentials;
use connector_core::{create_event_channel, ConnectorConfig, StreamHeartbeat};
use connector_probit::{ProbitClient, ProbitConfig};
use execution_core::{JsonFileStore, OrderEvent, TrackingStateStore};
use metrics::create_metrics;
use reconciler::{NetworkStatus, PollScheduler, SchedulerConfig, VenueMarket};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Interval for periodic health status logging.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

const DEFAULT_STATE_FILE: &str = "tracking_state.json";

#[tokio::main]
async fn main() {
    common::init_logging();

    let mut config = ConnectorConfig::from_env();
    let pairs: Vec<String> = std::env::args().skip(1).map(|p| p.to_uppercase()).collect();
    if !pairs.is_empty() {
        config.trading_pairs = pairs;
    }
    let scheduler_config = SchedulerConfig::from_env();
    let probit_config = ProbitConfig::from_env();

    let credentials = match ApiCredentials::from_env() {
        Ok(credentials) => credentials,
        Err(e) => {
            error!(error = %e, "Failed to load API credentials");
            return;
        }
    };

    let client = match ProbitClient::new(credentials, &probit_config) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build venue client");
            return;
        }
    };

    info!(
        pairs = ?config.trading_pairs,
        api_key = %client.api_key(),
        rest_url = %probit_config.rest_url,
        "Starting venue reconciler"
    );

    let (sender, mut receiver) = create_event_channel(config.channel_capacity);
    let metrics = create_metrics();
    let market = Arc::new(VenueMarket::new(
        Arc::new(client),
        config.trading_pairs.clone(),
        &scheduler_config,
        sender,
        metrics.clone(),
    ));

    if market.check_network().await == NetworkStatus::NotConnected {
        warn!("Venue not reachable yet, polling will retry");
    }
    let fees = market.trading_fees();
    info!(maker_pct = %fees.maker_pct, taker_pct = %fees.taker_pct, "Fee schedule");

    // Restore tracked orders, watermarks and undelivered events from the last run
    let state_path = std::env::var("STATE_FILE").unwrap_or_else(|_| DEFAULT_STATE_FILE.to_string());
    let store = JsonFileStore::new(state_path);
    match store.load() {
        Ok(Some(state)) => {
            market.import_tracking_state(state);
        }
        Ok(None) => info!(path = %store.path().display(), "No saved tracking state"),
        Err(e) => warn!(error = %e, path = %store.path().display(), "Ignoring unreadable tracking state"),
    }

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn scheduler task
    let scheduler = PollScheduler::new(market.clone(), scheduler_config, StreamHeartbeat::shared());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    // Spawn ctrl_c handler
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, initiating shutdown");
            let _ = shutdown_tx_clone.send(true);
        }
    });

    // Spawn periodic health reporter
    let health_metrics = metrics.clone();
    let health_market = market.clone();
    let mut health_shutdown_rx = shutdown_tx.subscribe();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEALTH_LOG_INTERVAL);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let snapshot = health_metrics.snapshot();
                    let status = snapshot.health_status();
                    info!(
                        status = %status,
                        ready = health_market.ready(),
                        tracked_orders = health_market.tracker().len(),
                        polls = snapshot.polls_completed,
                        failures = snapshot.poll_failures,
                        rate_limited = snapshot.rate_limited,
                        events = snapshot.events_emitted,
                        "Health check"
                    );
                }
                _ = health_shutdown_rx.changed() => {
                    if *health_shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    // Print lifecycle events as they arrive
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            event = receiver.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!("Waiting for poll loops to finish");
    let _ = scheduler_handle.await;

    // Anything emitted while the loops wound down
    while let Ok(event) = receiver.try_recv() {
        print_event(&event);
    }

    let state = market.export_tracking_state();
    match store.save(&state) {
        Ok(()) => info!(
            orders = state.orders.len(),
            pending_events = state.pending_events.len(),
            path = %store.path().display(),
            "Tracking state saved"
        ),
        Err(e) => error!(error = %e, "Failed to save tracking state"),
    }

    // Print final metrics
    let snapshot = metrics.snapshot();
    println!("\n{}", snapshot);

    info!("Shutdown complete");
}

fn print_event(event: &OrderEvent) {
    match event {
        OrderEvent::Created(e) => println!(
            "{} | CREATED   | {} | {} | {:?} {:?} {} @ {}",
            e.timestamp_ms,
            e.client_order_id,
            e.trading_pair,
            e.side,
            e.order_type,
            e.amount,
            e.price.map_or_else(|| "market".to_string(), |p| p.to_string())
        ),
        OrderEvent::Filled(e) => println!(
            "{} | FILLED    | {} | {} | trade {} | {} @ {} | fee {} {}",
            e.timestamp_ms,
            e.client_order_id,
            e.trading_pair,
            e.trade_id,
            e.amount,
            e.price,
            e.fee_amount,
            e.fee_asset
        ),
        OrderEvent::Completed(e) => println!(
            "{} | COMPLETED | {} | {} | base {} | quote {} | fee {} {}",
            e.timestamp_ms,
            e.client_order_id,
            e.trading_pair,
            e.base_amount,
            e.quote_amount,
            e.fee_paid,
            e.fee_asset.as_deref().unwrap_or("-")
        ),
        OrderEvent::Cancelled(e) => println!(
            "{} | CANCELLED | {} | {} | executed {}",
            e.timestamp_ms, e.client_order_id, e.trading_pair, e.executed_base
        ),
        OrderEvent::Failed(e) => println!(
            "{} | FAILED    | {} | {} | {:?} {:?} {} | {}",
            e.timestamp_ms,
            e.client_order_id,
            e.trading_pair,
            e.side,
            e.order_type,
            e.amount,
            e.reason
        ),
    }
}
