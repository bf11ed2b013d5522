use muse_core::credits::{CreditCosts, DailyLimits};

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// Everything except `JWT_SECRET` and `WEBHOOK_SECRET` has a default suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// How long background tasks get to stop after the server drains.
    pub shutdown_timeout_secs: u64,
    /// Externally reachable base URL of this API (GPU webhooks point here).
    pub public_base_url: String,
    /// Base URL of the web app (email links and checkout redirects).
    pub app_base_url: String,
    /// HMAC key for signed GPU webhook URLs.
    pub webhook_secret: String,
    pub signup_bonus_nuts: i64,
    /// Prior messages sent to the LLM with each chat turn.
    pub chat_context_messages: usize,
    /// Generation jobs still open after this long are failed and refunded.
    pub job_timeout_mins: i64,
    pub jwt: JwtConfig,
    pub credits: CreditConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `HOST`                  | `0.0.0.0`                |
    /// | `PORT`                  | `3000`                   |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                     |
    /// | `PUBLIC_BASE_URL`       | `http://localhost:3000`  |
    /// | `APP_BASE_URL`          | `http://localhost:5173`  |
    /// | `WEBHOOK_SECRET`        | required                 |
    /// | `SIGNUP_BONUS_NUTS`     | `10`                     |
    /// | `CHAT_CONTEXT_MESSAGES` | `20`                     |
    /// | `JOB_TIMEOUT_MINS`      | `30`                     |
    ///
    /// # Panics
    ///
    /// Panics on unparsable numbers or a missing `WEBHOOK_SECRET`.
    pub fn from_env() -> Self {
        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let webhook_secret =
            std::env::var("WEBHOOK_SECRET").expect("WEBHOOK_SECRET must be set in the environment");
        assert!(!webhook_secret.is_empty(), "WEBHOOK_SECRET must not be empty");

        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3000),
            cors_origins,
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 30),
            shutdown_timeout_secs: env_parse("SHUTDOWN_TIMEOUT_SECS", 30),
            public_base_url: env_or("PUBLIC_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            app_base_url: env_or("APP_BASE_URL", "http://localhost:5173")
                .trim_end_matches('/')
                .to_string(),
            webhook_secret,
            signup_bonus_nuts: env_parse("SIGNUP_BONUS_NUTS", 10),
            chat_context_messages: env_parse("CHAT_CONTEXT_MESSAGES", 20),
            job_timeout_mins: env_parse("JOB_TIMEOUT_MINS", 30),
            jwt: JwtConfig::from_env(),
            credits: CreditConfig::from_env(),
        }
    }
}

/// Nut prices and free-tier daily limits.
#[derive(Debug, Clone, Copy)]
pub struct CreditConfig {
    pub costs: CreditCosts,
    /// Limits for users without an active subscription.
    pub free_limits: DailyLimits,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            costs: CreditCosts::default(),
            free_limits: DailyLimits {
                images: Some(5),
                videos: Some(1),
                messages: Some(30),
            },
        }
    }
}

impl CreditConfig {
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `COST_IMAGE`               | `1`     |
    /// | `COST_UPSCALE`             | `1`     |
    /// | `COST_VIDEO`               | `5`     |
    /// | `COST_AVATAR_VIDEO`        | `5`     |
    /// | `COST_SPEECH`              | `1`     |
    /// | `FREE_DAILY_IMAGE_LIMIT`   | `5`     |
    /// | `FREE_DAILY_VIDEO_LIMIT`   | `1`     |
    /// | `FREE_DAILY_MESSAGE_LIMIT` | `30`    |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            costs: CreditCosts {
                image: env_parse("COST_IMAGE", defaults.costs.image),
                upscale: env_parse("COST_UPSCALE", defaults.costs.upscale),
                video: env_parse("COST_VIDEO", defaults.costs.video),
                avatar_video: env_parse("COST_AVATAR_VIDEO", defaults.costs.avatar_video),
                speech: env_parse("COST_SPEECH", defaults.costs.speech),
            },
            free_limits: DailyLimits {
                images: Some(env_parse("FREE_DAILY_IMAGE_LIMIT", 5)),
                videos: Some(env_parse("FREE_DAILY_VIDEO_LIMIT", 1)),
                messages: Some(env_parse("FREE_DAILY_MESSAGE_LIMIT", 30)),
            },
        }
    }
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid number")),
        Err(_) => default,
    }
}
