use std::env;

/// What to do when a verified assertion carries a signature counter that
/// did not advance past the stored one. A non-increasing counter on an
/// authenticator that supports counters is a cloned-authenticator signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPolicy {
    /// Log the anomaly and continue (the historical behavior).
    Warn,
    /// Reject the assertion with `invalid-request`.
    Reject,
}

/// Server configuration for the authentication core.
///
/// Constructed once and passed explicitly into every controller; nothing in
/// this crate reads ambient global state after construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub magic_link_enabled: bool,
    pub passwordless_email_enabled: bool,
    pub passwordless_sms_enabled: bool,
    pub webauthn_enabled: bool,

    /// WebAuthn relying-party id, usually the bare server hostname.
    pub webauthn_rp_id: String,
    pub webauthn_rp_name: String,
    /// Origins accepted during ceremony verification. More than one entry
    /// when the RP is served from several origins.
    pub webauthn_rp_origins: Vec<String>,
    /// Client-side ceremony timeout in seconds.
    pub webauthn_timeout: u32,
    pub counter_policy: CounterPolicy,

    pub email_verification_required: bool,
    pub disable_new_users: bool,
    pub disable_signup: bool,

    pub default_locale: String,
    pub allowed_locales: Vec<String>,
    pub default_user_role: String,
    pub default_allowed_roles: Vec<String>,

    pub client_url: String,
    pub server_url: String,
    /// Additional redirect targets accepted besides `client_url`.
    pub allowed_redirect_urls: Vec<String>,

    pub blocked_email_domains: Vec<String>,
    pub blocked_emails: Vec<String>,
    pub allowed_email_domains: Vec<String>,
    pub allowed_emails: Vec<String>,

    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_expires_in: u32,
    pub refresh_token_expires_in: u32,

    /// TTL in seconds for magic-link / passwordless tickets.
    pub ticket_ttl: u32,
    /// TTL in seconds for one-time passwords.
    pub otp_ttl: u32,
    /// TTL in seconds for email-verification tickets.
    pub verify_email_ticket_ttl: u32,
    /// TTL in seconds for MFA hand-off tickets.
    pub mfa_ticket_ttl: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            magic_link_enabled: true,
            passwordless_email_enabled: true,
            passwordless_sms_enabled: false,
            webauthn_enabled: true,
            webauthn_rp_id: "localhost".to_string(),
            webauthn_rp_name: "localhost".to_string(),
            webauthn_rp_origins: vec!["http://localhost:3000".to_string()],
            webauthn_timeout: 60,
            counter_policy: CounterPolicy::Warn,
            email_verification_required: false,
            disable_new_users: false,
            disable_signup: false,
            default_locale: "en".to_string(),
            allowed_locales: vec!["en".to_string()],
            default_user_role: "user".to_string(),
            default_allowed_roles: vec!["user".to_string(), "me".to_string()],
            client_url: "http://localhost:3000".to_string(),
            server_url: "http://localhost:4000".to_string(),
            allowed_redirect_urls: Vec::new(),
            blocked_email_domains: Vec::new(),
            blocked_emails: Vec::new(),
            allowed_email_domains: Vec::new(),
            allowed_emails: Vec::new(),
            jwt_secret: "development-secret-do-not-use-in-production".to_string(),
            jwt_issuer: "passless".to_string(),
            access_token_expires_in: 900,
            refresh_token_expires_in: 2_592_000,
            ticket_ttl: 3600,
            otp_ttl: 300,
            verify_email_ticket_ttl: 2_592_000,
            mfa_ticket_ttl: 300,
        }
    }
}

impl AuthConfig {
    /// Load the configuration from the environment, falling back to the
    /// defaults above for anything unset. `.env` files are honored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let client_url = env_string("AUTH_CLIENT_URL", &defaults.client_url);
        Self {
            magic_link_enabled: env_bool("AUTH_EMAIL_MAGIC_LINK_ENABLED", defaults.magic_link_enabled),
            passwordless_email_enabled: env_bool(
                "AUTH_EMAIL_PASSWORDLESS_ENABLED",
                defaults.passwordless_email_enabled,
            ),
            passwordless_sms_enabled: env_bool(
                "AUTH_SMS_PASSWORDLESS_ENABLED",
                defaults.passwordless_sms_enabled,
            ),
            webauthn_enabled: env_bool("AUTH_WEBAUTHN_ENABLED", defaults.webauthn_enabled),
            webauthn_rp_id: env_string("AUTH_WEBAUTHN_RP_ID", &defaults.webauthn_rp_id),
            webauthn_rp_name: env_string("AUTH_WEBAUTHN_RP_NAME", &defaults.webauthn_rp_name),
            webauthn_rp_origins: env_list("AUTH_WEBAUTHN_RP_ORIGINS", &[client_url.clone()]),
            webauthn_timeout: env_u32("AUTH_WEBAUTHN_TIMEOUT", defaults.webauthn_timeout),
            counter_policy: env_counter_policy("AUTH_WEBAUTHN_COUNTER_POLICY"),
            email_verification_required: env_bool(
                "AUTH_EMAIL_SIGNIN_EMAIL_VERIFIED_REQUIRED",
                defaults.email_verification_required,
            ),
            disable_new_users: env_bool("AUTH_DISABLE_NEW_USERS", defaults.disable_new_users),
            disable_signup: env_bool("AUTH_DISABLE_SIGNUP", defaults.disable_signup),
            default_locale: env_string("AUTH_LOCALE_DEFAULT", &defaults.default_locale),
            allowed_locales: env_list("AUTH_LOCALE_ALLOWED_LOCALES", &defaults.allowed_locales),
            default_user_role: env_string("AUTH_USER_DEFAULT_ROLE", &defaults.default_user_role),
            default_allowed_roles: env_list(
                "AUTH_USER_DEFAULT_ALLOWED_ROLES",
                &defaults.default_allowed_roles,
            ),
            server_url: env_string("AUTH_SERVER_URL", &defaults.server_url),
            allowed_redirect_urls: env_list("AUTH_ACCESS_CONTROL_ALLOWED_REDIRECT_URLS", &[]),
            blocked_email_domains: env_list("AUTH_ACCESS_CONTROL_BLOCKED_EMAIL_DOMAINS", &[]),
            blocked_emails: env_list("AUTH_ACCESS_CONTROL_BLOCKED_EMAILS", &[]),
            allowed_email_domains: env_list("AUTH_ACCESS_CONTROL_ALLOWED_EMAIL_DOMAINS", &[]),
            allowed_emails: env_list("AUTH_ACCESS_CONTROL_ALLOWED_EMAILS", &[]),
            jwt_secret: env_string("AUTH_JWT_SECRET", &defaults.jwt_secret),
            jwt_issuer: env_string("AUTH_JWT_ISSUER", &defaults.jwt_issuer),
            access_token_expires_in: env_u32(
                "AUTH_ACCESS_TOKEN_EXPIRES_IN",
                defaults.access_token_expires_in,
            ),
            refresh_token_expires_in: env_u32(
                "AUTH_REFRESH_TOKEN_EXPIRES_IN",
                defaults.refresh_token_expires_in,
            ),
            ticket_ttl: env_u32("AUTH_TICKET_EXPIRES_IN", defaults.ticket_ttl),
            otp_ttl: env_u32("AUTH_OTP_EXPIRES_IN", defaults.otp_ttl),
            verify_email_ticket_ttl: env_u32(
                "AUTH_VERIFY_EMAIL_TICKET_EXPIRES_IN",
                defaults.verify_email_ticket_ttl,
            ),
            mfa_ticket_ttl: env_u32("AUTH_MFA_TICKET_EXPIRES_IN", defaults.mfa_ticket_ttl),
            client_url,
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Err(_) => default,
        Ok(v) => match v.to_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            invalid => {
                tracing::warn!("Invalid value for {}: {}. Using default {}", name, invalid, default);
                default
            }
        },
    }
}

fn env_u32(name: &str, default: u32) -> u32 {
    match env::var(name) {
        Err(_) => default,
        Ok(v) => v.parse::<u32>().unwrap_or_else(|_| {
            tracing::warn!("Invalid value for {}: {}. Using default {}", name, v, default);
            default
        }),
    }
}

fn env_list(name: &str, default: &[String]) -> Vec<String> {
    match env::var(name) {
        Err(_) => default.to_vec(),
        Ok(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

fn env_counter_policy(name: &str) -> CounterPolicy {
    match env::var(name) {
        Err(_) => CounterPolicy::Warn,
        Ok(v) => match v.to_lowercase().as_str() {
            "warn" => CounterPolicy::Warn,
            "reject" => CounterPolicy::Reject,
            invalid => {
                tracing::warn!("Invalid counter policy: {}. Using default 'warn'", invalid);
                CounterPolicy::Warn
            }
        },
    }
}
