//! Process wiring: connects to Postgres, builds the shared [`AppState`],
//! spawns the background workers (C11, C12), and serves the HTTP API.
//!
//! `blockscout_service_launcher::launcher::launch` is built around a
//! mandatory gRPC half (it always takes a `tonic::transport::server::Router`
//! argument, serving it whenever `server.grpc.enabled` is set). This service
//! has no gRPC surface at all, so rather than carrying an unused `tonic`
//! dependency just to satisfy that signature, this module reimplements the
//! HTTP half of `launch` directly — same settings types, same CORS/metrics
//! wiring, same `HttpRouter` trait — and leaves the gRPC half out entirely.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Condition, web, App, HttpServer};
use anyhow::Context;
use blockscout_service_launcher::launcher::{ConfigSettings, HttpRouter};
use cnab_ingest_logic::{
    intake::UploadIntakeSettings, transaction_store::TransactionStore, DistributedLock,
    ObjectStore, Queue, RecoverySweeper, UploadTracker, WorkerPool,
};
use migration::Migrator;
use tokio_util::sync::CancellationToken;

use crate::{router::Router, settings::Settings, state::AppState};

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    blockscout_service_launcher::tracing::init_logs(
        Settings::SERVICE_NAME,
        &settings.tracing,
        &settings.jaeger,
    )?;

    let db = {
        let database_settings = blockscout_service_launcher::database::DatabaseSettings {
            connect: blockscout_service_launcher::database::DatabaseConnectSettings::Url(
                settings.database.url.clone(),
            ),
            connect_options: Default::default(),
            create_database: settings.database.create_database,
            run_migrations: settings.database.run_migrations,
        };
        blockscout_service_launcher::database::initialize_postgres::<Migrator>(
            &database_settings,
        )
        .await
        .context("database initialization failed")?
    };

    let object_store = Arc::new(
        ObjectStore::new(settings.object_store.clone())
            .await
            .context("failed to initialize object store gateway")?,
    );
    let tracker = Arc::new(UploadTracker::new(db.clone()));
    let queue = Arc::new(Queue::new(db.clone()));
    let lock = Arc::new(DistributedLock::new(db.clone()));
    let transaction_store = Arc::new(TransactionStore::new(db.clone()));
    let sweeper = Arc::new(RecoverySweeper::new(
        Arc::clone(&tracker),
        Arc::clone(&queue),
        Arc::clone(&lock),
        settings.ingest.recovery_check_interval_minutes,
        settings.ingest.stuck_upload_timeout_minutes as i64,
    ));
    let worker_pool = Arc::new(WorkerPool::new(
        db.clone(),
        Arc::clone(&tracker),
        Arc::clone(&queue),
        Arc::clone(&lock),
        Arc::clone(&object_store),
        settings.ingest.clone(),
    ));

    let intake_settings = UploadIntakeSettings {
        max_file_size_bytes: settings.ingest.max_file_size_bytes,
        allowed_extension: settings.ingest.allowed_extension.clone(),
    };

    let app_state = web::Data::new(AppState {
        tracker: Arc::clone(&tracker),
        queue: Arc::clone(&queue),
        lock: Arc::clone(&lock),
        object_store: Arc::clone(&object_store),
        transaction_store: Arc::clone(&transaction_store),
        sweeper: Arc::clone(&sweeper),
        worker_pool: Arc::clone(&worker_pool),
        settings: settings.ingest.clone(),
        intake_settings,
    });

    let shutdown = CancellationToken::new();

    let worker_handle = {
        let worker_pool = Arc::clone(&worker_pool);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { worker_pool.run(shutdown).await })
    };
    let sweeper_handle = {
        let sweeper = Arc::clone(&sweeper);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { sweeper.run(shutdown).await })
    };

    let http_server = http_serve(app_state, &settings);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::select! {
        result = http_server => result.context("http server failed")?,
        _ = ctrl_c => {
            tracing::info!("received shutdown signal");
        }
    }

    shutdown.cancel();
    let _ = tokio::join!(worker_handle, sweeper_handle);

    Ok(())
}

fn http_serve(
    app_state: web::Data<AppState>,
    settings: &Settings,
) -> actix_web::dev::Server {
    tracing::info!(addr = %settings.server.http.addr, "starting http server");

    let json_cfg = web::JsonConfig::default().limit(settings.server.http.max_body_size);
    let cors_settings = settings.server.http.cors.clone();
    let cors_enabled = cors_settings.enabled;

    HttpServer::new(move || {
        let cors: Cors = cors_settings.clone().build();
        App::new()
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(Condition::new(cors_enabled, cors))
            .app_data(json_cfg.clone())
            .app_data(app_state.clone())
            .configure(|cfg| Router.register_routes(cfg))
    })
    .bind(settings.server.http.addr)
    .expect("failed to bind http server")
    .run()
}
