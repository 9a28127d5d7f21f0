use std::sync::Arc;

use sqlx::PgPool;

use crate::analysis::ImageAnalyzer;
use crate::config::Config;
use crate::email::{EmailTemplate, Mailer};
use crate::rate_limit::LoginRateLimiter;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub analyzer: Arc<dyn ImageAnalyzer>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub login_limiter: LoginRateLimiter,
}

impl AppState {
    /// Send an email without failing the caller. Without SMTP the message is
    /// only logged, links included.
    pub async fn notify(&self, to: &str, template: EmailTemplate, vars: &[(&str, &str)]) {
        match &self.mailer {
            Some(mailer) => {
                if let Err(e) = mailer.send(to, template, vars).await {
                    tracing::error!(to, ?template, "Failed to send email: {e}");
                }
            }
            None => {
                tracing::warn!(to, ?template, ?vars, "SMTP not configured, email not sent");
            }
        }
    }
}
