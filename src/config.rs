use serde::Deserialize;

use crate::error::{GmailError, GmailResult};

/// Mailbox used when GMAIL_USER is not set: Gmail resolves it to the authenticated account
pub const DEFAULT_USER: &str = "me";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub gmail: GmailConfig,
}

#[derive(Deserialize, Clone)]
pub struct GmailConfig {
    pub user: String,
    pub credentials_path: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for GmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailConfig")
            .field("user", &self.user)
            .field("credentials_path", &self.credentials_path)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load the configuration from environment variables
    pub fn from_env() -> GmailResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> GmailResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::check_required_vars(&lookup)?;

        let required = |key: &str| {
            lookup(key).ok_or_else(|| GmailError::Config(format!("{} must be set", key)))
        };

        Ok(Config {
            gmail: GmailConfig {
                user: lookup("GMAIL_USER")
                    .filter(|user| !user.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_USER.to_string()),
                credentials_path: required("GMAIL_CREDENTIALS_PATH")?,
                refresh_token: required("GMAIL_REFRESH_TOKEN")?,
            },
        })
    }

    fn check_required_vars<F>(lookup: &F) -> GmailResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required_vars = ["GMAIL_CREDENTIALS_PATH", "GMAIL_REFRESH_TOKEN"];

        let missing_vars: Vec<&str> = required_vars
            .iter()
            .copied()
            .filter(|var| lookup(var).map_or(true, |value| value.trim().is_empty()))
            .collect();

        if !missing_vars.is_empty() {
            return Err(GmailError::Config(format!(
                "missing environment variables: {}\n\
                 \n\
                 Set them in a .env file or export them:\n\
                    export GMAIL_CREDENTIALS_PATH=/path/to/client_credentials.json\n\
                    export GMAIL_REFRESH_TOKEN=1//0g...\n\
                    export GMAIL_USER=me",
                missing_vars.join(", ")
            )));
        }

        Ok(())
    }
}
