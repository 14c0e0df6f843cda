use shelf_audit_server::{start_server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Bind address, upload dir and mode from SA_* env or defaults
    let cfg = ServerConfig::from_env()?;

    let handle = start_server(cfg).await?;
    // Park forever
    handle.await?;
    Ok(())
}
