use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Ten years.
pub const MAX_TOKEN_HOURS: u64 = 24 * 365 * 10;

#[derive(Parser, Debug)]
#[command(name = "instantcode", about = "Backend for the InstantCode image feed")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path to data directory
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub feed: FeedConfig,
    pub provisioning: ProvisioningConfig,
    pub oauth: Option<OAuthConfig>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 signing secret. Generated per process when unset.
    pub jwt_secret: Option<String>,
    pub token_hours: u64,
    pub bcrypt_cost: u32,
}

/// Feed pagination policy.
///
/// `limit` values outside `1..=max_limit` are clamped, never rejected.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct FeedConfig {
    pub default_limit: i64,
    pub max_limit: i64,
}

#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub max_username_attempts: u32,
}

/// Google sign-on. Both sign-on routes answer 404 when this section is absent.
#[derive(Deserialize, Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    /// Client page that receives `?token=...` after a successful sign-on
    pub client_redirect: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_hours: 168,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
        }
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_username_attempts: 1000,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref host) = cli.host {
            config.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }

        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("instantcode.db"));
        }

        if config.feed.max_limit < 1 {
            anyhow::bail!("feed.max_limit must be at least 1");
        }
        if !(1..=MAX_TOKEN_HOURS).contains(&config.auth.token_hours) {
            anyhow::bail!("auth.token_hours must be between 1 and {MAX_TOKEN_HOURS}");
        }
        if !(4..=31).contains(&config.auth.bcrypt_cost) {
            anyhow::bail!("auth.bcrypt_cost must be between 4 and 31");
        }
        if config.provisioning.max_username_attempts == 0 {
            anyhow::bail!("provisioning.max_username_attempts must be at least 1");
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match cli.data_dir.clone() {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(".instantcode"))
                .ok_or_else(|| anyhow::anyhow!("Could not determine home directory")),
        }
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.database.path.as_ref()
    }
}
