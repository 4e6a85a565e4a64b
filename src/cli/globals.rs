use secrecy::SecretString;

/// Configuration shared by the server wiring and the request handlers,
/// carried through an axum `Extension`.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub hmac_secret: SecretString,
    pub email_url: Option<String>,
    pub email_token: SecretString,
    pub frontend_url: String,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(hmac_secret: SecretString, frontend_url: String) -> Self {
        Self {
            hmac_secret,
            email_url: None,
            email_token: SecretString::default(),
            frontend_url,
        }
    }

    pub fn set_email_provider(&mut self, url: String, token: SecretString) {
        self.email_url = Some(url);
        self.email_token = token;
    }
}
