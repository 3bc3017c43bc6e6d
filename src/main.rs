use anyhow::Result;
use std::sync::Arc;

use connector_gateway::config::Config;
use connector_gateway::connectors::Connector;
use connector_gateway::http_client::ProviderClient;
use connector_gateway::routes;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        "🚀 Connector Gateway starting ({})...",
        config.connector.display_name()
    );
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    let http_client = Arc::new(ProviderClient::new(
        config.http_connect_timeout,
        config.http_request_timeout,
    )?);
    tracing::info!("✅ HTTP client initialized with connection pooling");

    let connector = Connector::from_config(&config, http_client)?;
    report_credentials(&connector);

    // Build the application with routes and middleware
    let app = routes::build_app(&connector);

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Print startup banner
    print_startup_banner(&config);

    // Start server with graceful shutdown
    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Say whether a stored token from an earlier run is available
fn report_credentials(connector: &Connector) {
    let Some(auth) = connector.auth_manager() else {
        tracing::info!("✅ Using static API credentials");
        return;
    };

    match auth.load() {
        Ok(Some(record)) => {
            tracing::info!(
                "✅ Found stored {} token (token: {}...)",
                auth.provider_name(),
                record.token_preview()
            );
        }
        Ok(None) => {
            tracing::warn!(
                "No stored credentials; visit {} to authenticate",
                connector.kind().login_path()
            );
        }
        Err(e) => {
            tracing::error!("❌ Failed to read stored credentials: {:#}", e);
            tracing::warn!("Server will start but API requests will fail until you log in again");
        }
    }
}

/// Print startup banner
fn print_startup_banner(config: &Config) {
    let banner = r#"
╔═══════════════════════════════════════════════════════════╗
║                                                           ║
║                 🔌 Connector Gateway                      ║
║                                                           ║
║  OAuth2 proxy for Drive, Meet, Teams, Trello and Zoom     ║
║                                                           ║
╚═══════════════════════════════════════════════════════════╝
"#;

    println!("{}", banner);
    println!("  Version:     {}", env!("CARGO_PKG_VERSION"));
    println!("  Connector:   {}", config.connector.display_name());
    println!(
        "  Server:      http://{}:{}",
        config.server_host, config.server_port
    );
    println!("  API base:    {}", config.api_base);
    if config.connector.uses_oauth() {
        println!("  Login:       {}", config.connector.login_path());
        println!("  Redirect:    {}", config.redirect_uri);
        match &config.token_file {
            Some(path) => println!("  Token file:  {}", path.display()),
            None => println!("  Token file:  (in memory)"),
        }
    }
    println!("  Log Level:   {}", config.log_level);
    println!();
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
