use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::enrollment::{CharacterClass, DraftKey, PasswordPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub wizard: WizardConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            wizard: WizardConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Knobs for the enrollment wizard sessions.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    pub draft_key: DraftKey,
    pub draft_dir: PathBuf,
    pub gate_url: Option<String>,
    pub gate_timeout: Duration,
    pub notification_delay: Duration,
    pub password_policy: PasswordPolicy,
    pub max_image_bytes: usize,
    pub gov_id_options: Vec<String>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            draft_key: DraftKey::default(),
            draft_dir: PathBuf::from(".drafts"),
            gate_url: None,
            gate_timeout: Duration::from_millis(5000),
            notification_delay: Duration::from_millis(3000),
            password_policy: PasswordPolicy::default(),
            max_image_bytes: 5 * 1024 * 1024,
            gov_id_options: default_gov_id_options(),
        }
    }
}

impl WizardConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let draft_key = match env::var("WIZARD_DRAFT_KEY") {
            Ok(raw) if raw.trim().is_empty() => return Err(ConfigError::EmptyDraftKey),
            Ok(raw) => DraftKey(raw.trim().to_string()),
            Err(_) => defaults.draft_key,
        };

        let draft_dir = env::var("WIZARD_DRAFT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.draft_dir);

        let gate_url = env::var("WIZARD_GATE_URL")
            .ok()
            .map(|raw| raw.trim().trim_end_matches('/').to_string())
            .filter(|raw| !raw.is_empty());

        let gate_timeout = duration_var("WIZARD_GATE_TIMEOUT_MS", defaults.gate_timeout)?;
        let notification_delay =
            duration_var("WIZARD_NOTIFICATION_MS", defaults.notification_delay)?;

        let min_length = match env::var("WIZARD_PASSWORD_MIN_LENGTH") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable: "WIZARD_PASSWORD_MIN_LENGTH",
                    value: raw,
                })?,
            Err(_) => defaults.password_policy.min_length,
        };
        let required_classes = match env::var("WIZARD_PASSWORD_CLASSES") {
            Ok(raw) => parse_classes(&raw)?,
            Err(_) => defaults.password_policy.required_classes,
        };

        let max_image_bytes = match env::var("WIZARD_MAX_IMAGE_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable: "WIZARD_MAX_IMAGE_BYTES",
                    value: raw,
                })?,
            Err(_) => defaults.max_image_bytes,
        };

        let gov_id_options = match env::var("WIZARD_GOV_ID_OPTIONS") {
            Ok(raw) => {
                let options: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|label| !label.is_empty())
                    .map(str::to_string)
                    .collect();
                if options.is_empty() {
                    return Err(ConfigError::EmptyGovIdOptions);
                }
                options
            }
            Err(_) => defaults.gov_id_options,
        };

        Ok(Self {
            draft_key,
            draft_dir,
            gate_url,
            gate_timeout,
            notification_delay,
            password_policy: PasswordPolicy {
                min_length,
                required_classes,
            },
            max_image_bytes,
            gov_id_options,
        })
    }
}

pub fn default_gov_id_options() -> Vec<String> {
    ["Aadhar Card", "PAN Card", "Driving License", "Voter ID"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn duration_var(variable: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidNumber {
                variable,
                value: raw,
            }),
        Err(_) => Ok(default),
    }
}

fn parse_classes(raw: &str) -> Result<Vec<CharacterClass>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            CharacterClass::from_token(token).ok_or_else(|| ConfigError::InvalidPasswordClass {
                value: token.to_string(),
            })
        })
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { variable: &'static str, value: String },
    InvalidPasswordClass { value: String },
    EmptyDraftKey,
    EmptyGovIdOptions,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be a non-negative integer (got '{value}')")
            }
            ConfigError::InvalidPasswordClass { value } => write!(
                f,
                "WIZARD_PASSWORD_CLASSES entry '{value}' is not one of upper, lower, digit, symbol"
            ),
            ConfigError::EmptyDraftKey => write!(f, "WIZARD_DRAFT_KEY must not be blank"),
            ConfigError::EmptyGovIdOptions => {
                write!(f, "WIZARD_GOV_ID_OPTIONS must list at least one label")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
