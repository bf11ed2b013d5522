//! Account email delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. When `SMTP_HOST`
//! is not set, [`EmailConfig::from_env`] returns `None` and the server uses
//! [`LogMailer`], which writes the message (including its link) to the log.

use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// AccountMail
// ---------------------------------------------------------------------------

/// The account emails the platform sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountMail {
    /// Confirm ownership of the address. `link` carries the one-time token.
    VerifyEmail { username: String, link: String },
    /// Reset a forgotten password. `link` carries the one-time token.
    PasswordReset { username: String, link: String },
}

impl AccountMail {
    pub fn subject(&self) -> &'static str {
        match self {
            AccountMail::VerifyEmail { .. } => "[Muse] Confirm your email address",
            AccountMail::PasswordReset { .. } => "[Muse] Reset your password",
        }
    }

    pub fn body(&self) -> String {
        match self {
            AccountMail::VerifyEmail { username, link } => format!(
                "Hi {username},\n\nConfirm your email address by opening this link:\n\n{link}\n\n\
                 The link is valid for 24 hours."
            ),
            AccountMail::PasswordReset { username, link } => format!(
                "Hi {username},\n\nSomeone asked to reset the password of your account. \
                 If that was you, open this link:\n\n{link}\n\n\
                 The link is valid for 1 hour. If you did not ask for this, ignore this email."
            ),
        }
    }

    pub fn link(&self) -> &str {
        match self {
            AccountMail::VerifyEmail { link, .. } | AccountMail::PasswordReset { link, .. } => link,
        }
    }
}

/// Something that can deliver an [`AccountMail`].
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to_email: &str, mail: &AccountMail) -> Result<(), EmailError>;
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "noreply@muse.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set.
    ///
    /// | Variable        | Required | Default               |
    /// |-----------------|----------|-----------------------|
    /// | `SMTP_HOST`     | yes      | -                     |
    /// | `SMTP_PORT`     | no       | `587`                 |
    /// | `SMTP_FROM`     | no       | `noreply@muse.local`  |
    /// | `SMTP_USER`     | no       | -                     |
    /// | `SMTP_PASSWORD` | no       | -                     |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailDelivery
// ---------------------------------------------------------------------------

/// Sends account emails over SMTP.
pub struct EmailDelivery {
    config: EmailConfig,
}

impl EmailDelivery {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailer for EmailDelivery {
    async fn send(&self, to_email: &str, mail: &AccountMail) -> Result<(), EmailError> {
        use lettre::{
            message::header::ContentType, transport::smtp::authentication::Credentials,
            AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
        };

        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(mail.subject())
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body())
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)?
                .port(self.config.smtp_port);

        if let (Some(user), Some(pass)) = (&self.config.smtp_user, &self.config.smtp_password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let mailer = transport_builder.build();
        mailer.send(email).await?;

        tracing::info!(to = to_email, subject = mail.subject(), "Account email sent");
        Ok(())
    }
}

/// Fallback used when SMTP is not configured: logs the email instead.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to_email: &str, mail: &AccountMail) -> Result<(), EmailError> {
        tracing::info!(
            to = to_email,
            subject = mail.subject(),
            link = mail.link(),
            "SMTP not configured, account email logged instead of sent"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_returns_none_without_smtp_host() {
        std::env::remove_var("SMTP_HOST");
        assert!(EmailConfig::from_env().is_none());
    }

    #[test]
    fn verification_mail_carries_link() {
        let mail = AccountMail::VerifyEmail {
            username: "ada".to_string(),
            link: "https://app/verify-email?token=abc".to_string(),
        };
        assert!(mail.body().contains("Hi ada"));
        assert!(mail.body().contains("https://app/verify-email?token=abc"));
        assert_eq!(mail.link(), "https://app/verify-email?token=abc");
        assert!(mail.subject().contains("Confirm"));
    }

    #[test]
    fn reset_mail_mentions_expiry() {
        let mail = AccountMail::PasswordReset {
            username: "ada".to_string(),
            link: "https://app/reset-password?token=xyz".to_string(),
        };
        assert!(mail.body().contains("1 hour"));
    }

    #[test]
    fn email_error_display_build() {
        let err = EmailError::Build("missing body".to_string());
        assert_eq!(err.to_string(), "Email build error: missing body");
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        let mail = AccountMail::VerifyEmail {
            username: "ada".to_string(),
            link: "https://app/verify".to_string(),
        };
        assert!(LogMailer.send("ada@example.com", &mail).await.is_ok());
    }
}
