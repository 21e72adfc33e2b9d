use blockscout_service_launcher::launcher::ConfigSettings;
use cnab_ingest_server::Settings;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let settings = Settings::build().expect("failed to read config");
    cnab_ingest_server::run(settings).await
}
