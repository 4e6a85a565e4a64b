//! Map validated CLI matches to an action plus the shared configuration.

use crate::cli::{actions::Action, globals::GlobalArgs};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;
    let secret = matches
        .get_one::<String>("secret")
        .cloned()
        .context("missing required argument: --secret")?;
    let frontend_url = matches
        .get_one::<String>("frontend-url")
        .cloned()
        .unwrap_or_else(|| "http://localhost:5173".to_string());

    let mut globals = GlobalArgs::new(SecretString::from(secret), frontend_url);

    if let Some(email_url) = matches.get_one::<String>("email-url") {
        let token = matches
            .get_one::<String>("email-token")
            .cloned()
            .unwrap_or_default();
        globals.set_email_provider(email_url.clone(), SecretString::from(token));
    }

    Ok((Action::Server { port, dsn }, globals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        temp_env::with_vars([("SESAMO_EMAIL_URL", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "sesamo",
                "--dsn",
                "postgres://user@localhost:5432/sesamo",
                "--secret",
                "topsecret",
            ]);
            let (action, globals) = handler(&matches)?;
            let Action::Server { port, dsn } = action;
            assert_eq!(port, 8080);
            assert_eq!(dsn, "postgres://user@localhost:5432/sesamo");
            assert_eq!(globals.hmac_secret.expose_secret(), "topsecret");
            assert!(globals.email_url.is_none());
            Ok(())
        })
    }

    #[test]
    fn handler_picks_up_email_provider() -> Result<()> {
        temp_env::with_vars([("SESAMO_EMAIL_URL", None::<&str>)], || {
            let matches = commands::new().get_matches_from(vec![
                "sesamo",
                "--dsn",
                "postgres://user@localhost:5432/sesamo",
                "--secret",
                "topsecret",
                "--email-url",
                "https://mail.tld/v1/send",
                "--email-token",
                "token",
            ]);
            let (_, globals) = handler(&matches)?;
            assert_eq!(globals.email_url.as_deref(), Some("https://mail.tld/v1/send"));
            assert_eq!(globals.email_token.expose_secret(), "token");
            Ok(())
        })
    }
}
