use std::sync::Arc;

use passless::{
    AuthConfig, Emailer, PasswordlessFlow, SessionIssuer, UserDirectory, WebauthnFlow,
};

/// Shared state behind the auth router: the configuration and the two flow
/// controllers, all wired to the same directory and session issuer.
#[derive(Clone)]
pub struct AuthState {
    pub config: Arc<AuthConfig>,
    pub passwordless: Arc<PasswordlessFlow>,
    pub webauthn: Arc<WebauthnFlow>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        directory: Arc<dyn UserDirectory>,
        mailer: Arc<dyn Emailer>,
    ) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionIssuer::new(config.clone(), directory.clone()));
        let passwordless = Arc::new(PasswordlessFlow::new(
            config.clone(),
            directory.clone(),
            mailer.clone(),
            sessions.clone(),
        ));
        let webauthn = Arc::new(WebauthnFlow::new(config.clone(), directory, mailer, sessions));
        Self {
            config,
            passwordless,
            webauthn,
        }
    }
}
