use std::time::Duration;

use blockscout_service_launcher::{
    launcher::ConfigSettings, test_database::TestDbGuard, test_server::get_test_server_settings,
};
use cnab_ingest_server::Settings;
use migration::Migrator;
use reqwest::{multipart::Form, multipart::Part, Url};
use tokio::time::timeout;

pub async fn test_db(test_name: &str) -> TestDbGuard {
    TestDbGuard::new::<Migrator>(test_name).await
}

/// Builds settings pointed at `db` with the HTTP server bound to a free
/// local port, tracing/metrics/jaeger disabled, and `setup` applied last so
/// callers can flip the one or two fields a given test cares about (e.g.
/// `synchronous_processing`).
pub fn test_settings(db: &TestDbGuard, setup: impl FnOnce(&mut Settings)) -> (Settings, Url) {
    let mut settings = Settings::build().expect("failed to read config");
    let (server_settings, base) = get_test_server_settings();
    settings.server = server_settings;
    settings.tracing.enabled = false;
    settings.jaeger.enabled = false;
    settings.metrics.enabled = false;
    settings.database.url = db.db_url();
    settings.database.create_database = false;
    settings.database.run_migrations = false;
    setup(&mut settings);
    (settings, base)
}

/// `blockscout_service_launcher::test_server::init_server` waits on a
/// `/health` endpoint this service doesn't expose (out of scope per the
/// design ledger), so readiness here is instead polled against a real route.
pub async fn spawn_server(settings: Settings, base: &Url) {
    tokio::spawn(cnab_ingest_server::run(settings));

    let client = reqwest::Client::new();
    let ready = async {
        loop {
            let url = base.join("/api/v1/transactions/uploads").unwrap();
            if client.get(url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    timeout(Duration::from_secs(10), ready)
        .await
        .expect("server did not become ready in time");
}

/// Builds one well-formed 80-byte CNAB line: 1-byte nature code, 8-byte
/// date, 10-byte amount in cents, 11-byte CPF, 12-byte card, 6-byte time,
/// 14-byte store owner, 18-byte store name (all ASCII, space-padded).
pub fn cnab_line(nature: u8, amount_cents: u64, cpf: &str) -> String {
    format!(
        "{nature}{date}{amount:0>10}{cpf:0<11}{card:0<12}{time}{owner:<14}{name:<18}",
        nature = nature,
        date = "20190115",
        amount = amount_cents,
        cpf = cpf,
        card = "123456789012",
        time = "120000",
        owner = "STORE OWNER",
        name = "STORE NAME",
    )
}

pub fn upload_form(file_name: &str, contents: String) -> Form {
    Form::new().part(
        "file",
        Part::text(contents)
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .unwrap(),
    )
}
