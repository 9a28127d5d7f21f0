use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: IpAddr,
    pub port: u16,
    pub base_url: String,
    pub max_upload_size: usize,
    pub allowed_origins: Vec<String>,
    pub access_token_ttl: Duration,
    pub log_level: String,
    pub analysis: AnalysisConfig,
    pub smtp: Option<SmtpConfig>,
    pub first_superuser: Option<FirstSuperuser>,
}

#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub http_referer: Option<String>,
    pub x_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct FirstSuperuser {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_required("DATABASE_URL")?;
        let jwt_secret = env_required("JWT_SECRET")?;

        let host: IpAddr = env_or("BRAINCHECK_HOST", "0.0.0.0")
            .parse()
            .map_err(|e| format!("Invalid BRAINCHECK_HOST: {e}"))?;

        let port: u16 = env_or("BRAINCHECK_PORT", "8000")
            .parse()
            .map_err(|e| format!("Invalid BRAINCHECK_PORT: {e}"))?;

        let base_url = env_or("BRAINCHECK_BASE_URL", &format!("http://{host}:{port}"));

        let max_upload_size: usize = env_or("BRAINCHECK_MAX_UPLOAD_SIZE", "10485760")
            .parse()
            .map_err(|e| format!("Invalid BRAINCHECK_MAX_UPLOAD_SIZE: {e}"))?;

        let allowed_origins = env_or(
            "BRAINCHECK_ALLOWED_ORIGINS",
            "http://localhost:3000,http://localhost:5173",
        )
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

        let ttl_minutes: u64 = env_or("ACCESS_TOKEN_TTL_MINUTES", "11520")
            .parse()
            .map_err(|e| format!("Invalid ACCESS_TOKEN_TTL_MINUTES: {e}"))?;

        let log_level = env_or("BRAINCHECK_LOG_LEVEL", "info");

        let timeout_secs: u64 = env_or("ANALYSIS_TIMEOUT_SECS", "60")
            .parse()
            .map_err(|e| format!("Invalid ANALYSIS_TIMEOUT_SECS: {e}"))?;

        let analysis = AnalysisConfig {
            api_url: env_or("ANALYSIS_API_URL", "https://openrouter.ai/api/v1"),
            api_key: env_or("ANALYSIS_API_KEY", ""),
            model: env_or("ANALYSIS_MODEL", "google/gemini-2.5-flash"),
            timeout: Duration::from_secs(timeout_secs),
            http_referer: std::env::var("ANALYSIS_HTTP_REFERER").ok(),
            x_title: std::env::var("ANALYSIS_X_TITLE").ok(),
        };

        let smtp = match (
            std::env::var("BRAINCHECK_SMTP_HOST").ok(),
            std::env::var("BRAINCHECK_SMTP_PORT").ok(),
            std::env::var("BRAINCHECK_SMTP_USER").ok(),
            std::env::var("BRAINCHECK_SMTP_PASS").ok(),
            std::env::var("BRAINCHECK_SMTP_FROM").ok(),
        ) {
            (Some(host), Some(port), Some(user), Some(pass), Some(from)) => Some(SmtpConfig {
                host,
                port: port
                    .parse()
                    .map_err(|e| format!("Invalid BRAINCHECK_SMTP_PORT: {e}"))?,
                user,
                pass,
                from,
            }),
            _ => None,
        };

        let first_superuser = match (
            std::env::var("FIRST_SUPERUSER_EMAIL").ok(),
            std::env::var("FIRST_SUPERUSER_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some(FirstSuperuser { email, password }),
            _ => None,
        };

        Ok(Config {
            database_url,
            jwt_secret,
            host,
            port,
            base_url,
            max_upload_size,
            allowed_origins,
            access_token_ttl: Duration::from_secs(ttl_minutes * 60),
            log_level,
            analysis,
            smtp,
            first_superuser,
        })
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
