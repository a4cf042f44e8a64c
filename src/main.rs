use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    let http_port = std::env::var("USERPOSTS_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(7878);
    let db_root = std::env::var("USERPOSTS_DB_FOLDER").unwrap_or_else(|_| "dbs".to_string());
    info!(
        target: "userposts",
        "userposts starting: http_port={}, db_root='{}'",
        http_port, db_root
    );

    userposts::server::run_with_port(http_port, &db_root).await
}
