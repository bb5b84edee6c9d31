use crate::cli::ServeArgs;
use crate::demo::{seed_directory, DEFAULT_AGENTS_PER_EXPERTISE, DEFAULT_REPORTERS};
use crate::infra::{AppState, InMemoryHelpdeskStore, LoggingNotificationSink};
use crate::routes::with_helpdesk_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use helpdesk::config::AppConfig;
use helpdesk::error::AppError;
use helpdesk::telemetry;
use helpdesk::tickets::HelpdeskService;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    // Profiles normally come from the account system; start with the demo directory.
    let store = Arc::new(InMemoryHelpdeskStore::with_profiles(seed_directory(
        DEFAULT_AGENTS_PER_EXPERTISE,
        DEFAULT_REPORTERS,
    )));
    let notifications = Arc::new(LoggingNotificationSink::new(
        config.notifications.sender.clone(),
    ));
    let service = Arc::new(
        HelpdeskService::new(store.clone(), store, notifications)
            .with_report_periods(config.reports.default_periods),
    );

    let app = with_helpdesk_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        report_periods = config.reports.default_periods,
        "helpdesk service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
