use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Connector Gateway - OAuth2 proxy for collaboration APIs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Which provider this process serves
    #[arg(short, long, env = "CONNECTOR", value_enum)]
    pub connector: ConnectorKind,

    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "8000")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// OAuth client ID (Teams, Zoom)
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// OAuth client secret (Teams, Zoom)
    #[arg(long, env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Azure AD tenant ID (Teams)
    #[arg(long, env = "TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Google client-secrets JSON downloaded from Cloud Console (Drive, Meet)
    #[arg(long, env = "CLIENT_SECRETS_FILE", default_value = "credentials.json")]
    pub client_secrets_file: String,

    /// OAuth redirect URI registered with the provider
    #[arg(long, env = "REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Token file; Teams keeps tokens in memory when unset
    #[arg(long, env = "TOKEN_FILE")]
    pub token_file: Option<String>,

    /// Override the provider API base URL
    #[arg(long, env = "API_BASE")]
    pub api_base: Option<String>,

    /// Directory downloaded Drive files are written to
    #[arg(long, env = "DOWNLOAD_DIR", default_value = ".")]
    pub download_dir: String,

    /// Trello API key
    #[arg(long, env = "TRELLO_API_KEY")]
    pub trello_api_key: Option<String>,

    /// Trello user token
    #[arg(long, env = "TRELLO_TOKEN", hide_env_values = true)]
    pub trello_token: Option<String>,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "60")]
    pub http_timeout: u64,
}

/// Provider served by a connector process
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConnectorKind {
    /// Google Drive files
    Drive,
    /// Microsoft Teams via Graph
    Teams,
    /// Google Calendar / Meet links
    Meet,
    /// Trello boards and cards
    Trello,
    /// Zoom meetings
    Zoom,
}

impl ConnectorKind {
    /// Name used in the liveness message
    pub fn display_name(&self) -> &'static str {
        match self {
            ConnectorKind::Drive => "Google Drive",
            ConnectorKind::Teams => "Microsoft Teams",
            ConnectorKind::Meet => "Google Meet",
            ConnectorKind::Trello => "Trello",
            ConnectorKind::Zoom => "Zoom",
        }
    }

    /// Whether this connector performs the OAuth code exchange itself
    pub fn uses_oauth(&self) -> bool {
        !matches!(self, ConnectorKind::Trello)
    }

    pub fn login_path(&self) -> &'static str {
        match self {
            ConnectorKind::Zoom => "/zoom/login",
            _ => "/login",
        }
    }

    pub fn callback_path(&self) -> &'static str {
        match self {
            ConnectorKind::Zoom => "/zoom/callback",
            _ => "/auth/callback",
        }
    }

    pub fn default_api_base(&self) -> &'static str {
        match self {
            ConnectorKind::Drive | ConnectorKind::Meet => "https://www.googleapis.com",
            ConnectorKind::Teams => "https://graph.microsoft.com/v1.0",
            ConnectorKind::Trello => "https://api.trello.com/1",
            ConnectorKind::Zoom => "https://api.zoom.us/v2",
        }
    }

    pub fn default_token_file(&self) -> Option<&'static str> {
        match self {
            ConnectorKind::Drive => Some("token.json"),
            ConnectorKind::Meet => Some("session.json"),
            ConnectorKind::Zoom => Some("zoom_token.json"),
            ConnectorKind::Teams | ConnectorKind::Trello => None,
        }
    }

    /// Callback on the default local listener
    pub fn default_redirect_uri(&self) -> String {
        format!("http://localhost:8000{}", self.callback_path())
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub connector: ConnectorKind,

    // Server settings
    pub server_host: String,
    pub server_port: u16,
    pub log_level: String,

    // OAuth client registration
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub tenant_id: Option<String>,
    pub client_secrets_file: PathBuf,
    pub redirect_uri: String,

    // Token storage
    pub token_file: Option<PathBuf>,
    pub token_refresh_threshold: u64,

    // Provider API
    pub api_base: String,
    pub download_dir: PathBuf,
    pub trello_api_key: Option<String>,
    pub trello_token: Option<String>,

    // HTTP client
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments plus env-only settings
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let connector = args.connector;

        let config = Config {
            connector,
            server_host: args.host,
            server_port: args.port,
            log_level: args.log_level,

            client_id: non_empty(args.client_id),
            client_secret: non_empty(args.client_secret),
            tenant_id: non_empty(args.tenant_id),
            client_secrets_file: expand_tilde(&args.client_secrets_file),
            redirect_uri: args
                .redirect_uri
                .unwrap_or_else(|| connector.default_redirect_uri()),

            token_file: args
                .token_file
                .as_deref()
                .or(connector.default_token_file())
                .map(expand_tilde),

            token_refresh_threshold: env_or("TOKEN_REFRESH_THRESHOLD", 60)?,

            api_base: args
                .api_base
                .unwrap_or_else(|| connector.default_api_base().to_string())
                .trim_end_matches('/')
                .to_string(),
            download_dir: expand_tilde(&args.download_dir),
            trello_api_key: non_empty(args.trello_api_key),
            trello_token: non_empty(args.trello_token),

            http_connect_timeout: env_or("HTTP_CONNECT_TIMEOUT", 30)?,
            http_request_timeout: args.http_timeout,
        };

        Ok(config)
    }

    /// Validate that everything the selected connector needs is present
    pub fn validate(&self) -> Result<()> {
        match self.connector {
            ConnectorKind::Drive | ConnectorKind::Meet => {
                if !self.client_secrets_file.exists() {
                    anyhow::bail!(
                        "CLIENT_SECRETS_FILE does not exist: {}. Download it from Google Cloud Console.",
                        self.client_secrets_file.display()
                    );
                }
            }
            ConnectorKind::Teams => {
                require(&self.client_id, "CLIENT_ID")?;
                require(&self.client_secret, "CLIENT_SECRET")?;
                require(&self.tenant_id, "TENANT_ID")?;
            }
            ConnectorKind::Zoom => {
                require(&self.client_id, "CLIENT_ID")?;
                require(&self.client_secret, "CLIENT_SECRET")?;
            }
            ConnectorKind::Trello => {
                require(&self.trello_api_key, "TRELLO_API_KEY")?;
                require(&self.trello_token, "TRELLO_TOKEN")?;
            }
        }

        if self.download_dir.exists() && !self.download_dir.is_dir() {
            anyhow::bail!(
                "DOWNLOAD_DIR is not a directory: {}",
                self.download_dir.display()
            );
        }

        Ok(())
    }
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value.as_deref().with_context(|| {
        format!(
            "{} is required (use --{} or set {} env var)",
            name,
            name.to_lowercase().replace('_', "-"),
            name
        )
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Read a numeric env-only setting, falling back to `default` when unset
fn env_or(name: &str, default: u64) -> Result<u64> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
