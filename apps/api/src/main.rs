use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    AppointmentCache, AppointmentService, AppointmentState, SupabaseAppointmentStore,
    SupabaseDirectory,
};
use notification_cell::{
    DispatcherConfig, HttpCalendarSync, HttpEmailSender, HttpPushSender, InMemoryOutbox,
    NotificationChannels, NotificationDispatcher, Outbox, RealtimeHub, RedisOutbox,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

async fn build_outbox(config: &AppConfig) -> Arc<dyn Outbox> {
    match config.redis_url.as_deref() {
        Some(url) => match RedisOutbox::new(url).await {
            Ok(outbox) => {
                info!("Using Redis notification outbox");
                Arc::new(outbox)
            }
            Err(e) => {
                warn!("Redis outbox unavailable ({}), falling back to in-memory outbox", e);
                Arc::new(InMemoryOutbox::new())
            }
        },
        None => {
            info!("REDIS_URL not set, using in-memory notification outbox");
            Arc::new(InMemoryOutbox::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dietcare API server");

    // Load configuration
    let config = Arc::new(AppConfig::from_env());

    let supabase = Arc::new(SupabaseClient::new(&config));
    let store = Arc::new(SupabaseAppointmentStore::new(supabase.clone()));
    let directory = Arc::new(SupabaseDirectory::new(supabase));
    let outbox = build_outbox(&config).await;
    let realtime = RealtimeHub::new();

    let service = Arc::new(AppointmentService::new(
        store,
        directory,
        outbox.clone(),
        AppointmentCache::default(),
        config.notification_max_attempts,
    ));

    // Background delivery of queued side effects
    let dispatcher = Arc::new(NotificationDispatcher::new(
        DispatcherConfig {
            call_timeout_seconds: config.side_effect_timeout_secs,
            ..DispatcherConfig::default()
        },
        outbox.clone(),
        NotificationChannels {
            calendar: Arc::new(HttpCalendarSync::new(&config)),
            push: Arc::new(HttpPushSender::new(&config)),
            realtime: Arc::new(realtime.clone()),
            email: Arc::new(HttpEmailSender::new(&config)),
        },
    ));
    {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run().await });
    }

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let appointment_state = Arc::new(AppointmentState::new(
        config.clone(),
        service,
        outbox,
        realtime,
    ));

    // Build the application router
    let app = router::create_router(config.clone(), appointment_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }

    dispatcher.shutdown().await;
}
