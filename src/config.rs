//! Server configuration.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

/// Recognised options of the mailhouse server.
#[derive(Clone, Debug, Parser)]
#[command(name = "mailhouse", about = "Small IMAP4rev1 mail-access server")]
pub struct Config {
    /// Address the IMAP listener binds to.
    #[arg(long, default_value = "localhost:1143")]
    pub imap_addr: String,

    /// PEM certificate chain for STARTTLS.
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for STARTTLS.
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Data directory for a persistent store backend.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Account name for LOGIN / AUTHENTICATE PLAIN.
    #[arg(long)]
    pub user_name: Option<String>,

    /// Account password.
    #[arg(long)]
    pub user_password: Option<String>,

    /// Skip authentication: every connection starts pre-authenticated.
    #[arg(long)]
    pub no_auth: bool,

    /// Append every byte read from and written to connections to this
    /// file, for protocol debugging.
    #[arg(long)]
    pub conn_log: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--no-auth forbids --user-name and --user-password")]
    CredentialsWithNoAuth,
    #[error("--user-name and --user-password are required unless --no-auth is set")]
    CredentialsMissing,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_credentials = self.user_name.is_some() || self.user_password.is_some();

        if self.no_auth && has_credentials {
            return Err(ConfigError::CredentialsWithNoAuth);
        }
        if !self.no_auth && (self.user_name.is_none() || self.user_password.is_none()) {
            return Err(ConfigError::CredentialsMissing);
        }

        Ok(())
    }

    pub fn tls_available(&self) -> bool {
        self.tls_cert.is_some() && self.tls_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("mailhouse").chain(args.iter().copied()))
    }

    #[test]
    fn test_credentials_required() {
        assert!(config(&[]).validate().is_err());
        assert!(config(&["--user-name", "bob"]).validate().is_err());
        assert!(config(&["--user-name", "bob", "--user-password", "pw"])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_no_auth_forbids_credentials() {
        assert!(config(&["--no-auth"]).validate().is_ok());
        assert!(config(&["--no-auth", "--user-name", "bob"])
            .validate()
            .is_err());
    }
}
