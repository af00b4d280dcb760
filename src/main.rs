use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use worktrack::config::Config;
use worktrack::db::init_db;
use worktrack::docs::ApiDoc;
use worktrack::realtime::Hub;
use worktrack::routes;
use worktrack::service::{AttendanceService, LeaveService};
use worktrack::store::{MySqlStore, StorePolicy};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config)
        .await
        .context("Failed to connect to database")?;
    let policy = StorePolicy {
        timeout: config.store_timeout,
        read_retries: config.store_read_retries,
    };
    let store = Arc::new(MySqlStore::new(pool, policy));

    let attendance = Data::new(AttendanceService::new(Arc::clone(&store)));
    let leave = Data::new(LeaveService::new(Arc::clone(&store)));
    let hub = Data::new(Hub::start(&config).await);
    let config_data = Data::new(config.clone());
    let server_addr = config.server_addr.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(attendance.clone())
            .app_data(leave.clone())
            .app_data(hub.clone())
            // Protected routes with rate limiting, plus the realtime endpoint
            .configure(|cfg| routes::configure::<MySqlStore>(cfg, &config))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
