use anyhow::{Context, Result};
use secrecy::SecretBox;
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub calendar: CalendarConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

/// External calendar provider settings. The `*_override` endpoints exist
/// so tests can point the client at a local mock server.
#[derive(Debug)]
pub struct CalendarConfig {
    pub client_id: String,
    pub client_secret: SecretBox<String>,
    pub redirect_uri: String,
    pub webhook_address: String,
    pub api_base_override: Option<String>,
    pub token_url_override: Option<String>,
    pub revoke_url_override: Option<String>,
    pub sync_horizon_days: i64,
    pub channel_renewal_lead_minutes: i64,
    pub renewal_check_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub name: String,
    pub environment: Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env::var("SERVER_HOST")
            .unwrap_or_else(|_| "0.0.0.0".to_string())
            .parse::<IpAddr>()
            .context("Failed to parse SERVER_HOST")?;

        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .context("Failed to parse SERVER_PORT")?;

        let db_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let db_max_connections = match env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(val) => Some(
                val.parse()
                    .context("Failed to parse DATABASE_MAX_CONNECTIONS")?,
            ),
            Err(_) => Some(10),
        };
        let db_min_connections = match env::var("DATABASE_MIN_CONNECTIONS") {
            Ok(val) => Some(
                val.parse()
                    .context("Failed to parse DATABASE_MIN_CONNECTIONS")?,
            ),
            Err(_) => Some(1),
        };

        let client_id =
            env::var("CALENDAR_CLIENT_ID").context("CALENDAR_CLIENT_ID must be set")?;
        let client_secret =
            env::var("CALENDAR_CLIENT_SECRET").context("CALENDAR_CLIENT_SECRET must be set")?;
        let redirect_uri =
            env::var("CALENDAR_REDIRECT_URI").context("CALENDAR_REDIRECT_URI must be set")?;
        let webhook_address =
            env::var("CALENDAR_WEBHOOK_ADDRESS").context("CALENDAR_WEBHOOK_ADDRESS must be set")?;

        let sync_horizon_days = match env::var("CALENDAR_SYNC_HORIZON_DAYS") {
            Ok(val) => val
                .parse()
                .context("Failed to parse CALENDAR_SYNC_HORIZON_DAYS")?,
            Err(_) => 60,
        };
        let channel_renewal_lead_minutes = match env::var("CALENDAR_RENEWAL_LEAD_MINUTES") {
            Ok(val) => val
                .parse()
                .context("Failed to parse CALENDAR_RENEWAL_LEAD_MINUTES")?,
            Err(_) => 12 * 60,
        };
        let renewal_check_interval_secs = match env::var("CALENDAR_RENEWAL_CHECK_INTERVAL_SECS") {
            Ok(val) => val
                .parse()
                .context("Failed to parse CALENDAR_RENEWAL_CHECK_INTERVAL_SECS")?,
            Err(_) => 15 * 60,
        };

        let environment_str =
            env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let environment = environment_str
            .parse()
            .unwrap_or(Environment::Development);

        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "Lessonbook".to_string());

        Ok(Config {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: db_url,
                max_connections: db_max_connections,
                min_connections: db_min_connections,
            },
            calendar: CalendarConfig {
                client_id,
                client_secret: SecretBox::new(Box::new(client_secret)),
                redirect_uri,
                webhook_address,
                api_base_override: env::var("CALENDAR_API_BASE").ok(),
                token_url_override: env::var("CALENDAR_TOKEN_URL").ok(),
                revoke_url_override: env::var("CALENDAR_REVOKE_URL").ok(),
                sync_horizon_days,
                channel_renewal_lead_minutes,
                renewal_check_interval_secs,
            },
            app: AppConfig {
                name: app_name,
                environment,
            },
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    #[allow(unused)]
    pub fn is_production(&self) -> bool {
        self.app.environment == Environment::Production
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Development
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Environment::Production),
            "staging" => Ok(Environment::Staging),
            "development" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

// Global config initialized once at startup.
use once_cell::sync::OnceCell;

static CONFIG: OnceCell<Config> = OnceCell::new();

pub fn init() -> Result<&'static Config> {
    CONFIG.get_or_try_init(Config::from_env)
}

pub fn get() -> &'static Config {
    CONFIG.get().expect("Config is not initialized")
}
