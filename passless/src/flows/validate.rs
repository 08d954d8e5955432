//! Request validation shared by the flow controllers: email normalization
//! and access lists, redirect allow-listing, sign-up option defaulting.

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Normalizes an email and applies the configured access lists. The same
/// error covers malformed and blocked addresses, so callers leak nothing
/// about which list matched.
pub(crate) fn validate_email(config: &AuthConfig, email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmailPassword);
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
        return Err(AuthError::InvalidEmailPassword);
    }

    if config.blocked_emails.iter().any(|e| e == &email)
        || config.blocked_email_domains.iter().any(|d| d == domain)
    {
        warn!(domain, "email rejected by block list");
        return Err(AuthError::InvalidEmailPassword);
    }
    if !config.allowed_emails.is_empty() && !config.allowed_emails.iter().any(|e| e == &email) {
        return Err(AuthError::InvalidEmailPassword);
    }
    if !config.allowed_email_domains.is_empty()
        && !config.allowed_email_domains.iter().any(|d| d == domain)
    {
        return Err(AuthError::InvalidEmailPassword);
    }

    Ok(email)
}

/// Checks a client-supplied redirect target against the client URL and the
/// configured allow-list. Hosts may be listed with a `*.` prefix to admit
/// subdomains.
pub(crate) fn validate_redirect_to(
    config: &AuthConfig,
    redirect_to: &str,
) -> Result<(), AuthError> {
    let target = Url::parse(redirect_to).map_err(|_| AuthError::RedirectToNotAllowed)?;

    let allowed = std::iter::once(config.client_url.as_str())
        .chain(config.allowed_redirect_urls.iter().map(String::as_str));
    for candidate in allowed {
        let Ok(candidate) = Url::parse(candidate) else {
            warn!(candidate, "skipping unparseable allowed redirect URL");
            continue;
        };
        if redirect_matches(&candidate, &target) {
            return Ok(());
        }
    }
    Err(AuthError::RedirectToNotAllowed)
}

fn redirect_matches(allowed: &Url, target: &Url) -> bool {
    if allowed.scheme() != target.scheme() || allowed.port_or_known_default() != target.port_or_known_default() {
        return false;
    }
    let (Some(allowed_host), Some(target_host)) = (allowed.host_str(), target.host_str()) else {
        return false;
    };
    let allowed_host = allowed_host.to_lowercase();
    let target_host = target_host.to_lowercase();
    // A `*.` entry matches exactly one subdomain label, never the apex.
    let host_ok = if let Some(suffix) = allowed_host.strip_prefix("*.") {
        match target_host
            .strip_suffix(suffix)
            .and_then(|rest| rest.strip_suffix('.'))
        {
            Some(label) => !label.is_empty() && !label.contains('.'),
            None => false,
        }
    } else {
        target_host == allowed_host
    };
    if !host_ok {
        return false;
    }
    // Prefix matching is anchored at path segments, so `/allowed` admits
    // `/allowed/cb` but not `/allowedevil`.
    let allowed_path = allowed.path().trim_end_matches('/');
    let target_path = target.path().trim_end_matches('/');
    target_path == allowed_path
        || target_path
            .strip_prefix(allowed_path)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Client-supplied knobs accepted when a sign-in may create the user.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpOptions {
    pub allowed_roles: Option<Vec<String>>,
    pub default_role: Option<String>,
    pub display_name: Option<String>,
    pub locale: Option<String>,
    pub redirect_to: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedSignUpOptions {
    pub(crate) allowed_roles: Vec<String>,
    pub(crate) default_role: String,
    pub(crate) display_name: String,
    pub(crate) locale: String,
    pub(crate) redirect_to: String,
}

/// Fills defaults from the configuration and rejects role or redirect
/// escalation attempts.
pub(crate) fn resolve_signup_options(
    config: &AuthConfig,
    email: &str,
    options: &SignUpOptions,
) -> Result<ResolvedSignUpOptions, AuthError> {
    let allowed_roles = match &options.allowed_roles {
        Some(requested) => {
            for role in requested {
                if !config.default_allowed_roles.contains(role) {
                    warn!(role, "requested role not in server allow-list");
                    return Err(AuthError::RoleNotAllowed);
                }
            }
            requested.clone()
        }
        None => config.default_allowed_roles.clone(),
    };

    let default_role = options
        .default_role
        .clone()
        .unwrap_or_else(|| config.default_user_role.clone());
    if !allowed_roles.contains(&default_role) {
        return Err(AuthError::DefaultRoleMustBeInAllowedRoles);
    }

    let locale = match &options.locale {
        Some(locale) if config.allowed_locales.contains(locale) => locale.clone(),
        Some(locale) => {
            warn!(locale, "locale not allowed, falling back to default");
            config.default_locale.clone()
        }
        None => config.default_locale.clone(),
    };

    let redirect_to = match &options.redirect_to {
        Some(redirect_to) => {
            validate_redirect_to(config, redirect_to)?;
            redirect_to.clone()
        }
        None => config.client_url.clone(),
    };

    Ok(ResolvedSignUpOptions {
        allowed_roles,
        default_role,
        display_name: options
            .display_name
            .clone()
            .unwrap_or_else(|| email.to_string()),
        locale,
        redirect_to,
    })
}

/// Gate applied to an existing user before any secret is issued or
/// redeemed on their behalf.
pub(crate) fn check_user(config: &AuthConfig, user: &crate::directory::User) -> Result<(), AuthError> {
    if user.disabled {
        return Err(AuthError::DisabledUser);
    }
    if user.is_anonymous {
        return Err(AuthError::ForbiddenAnonymous);
    }
    if config.email_verification_required && !user.email_verified {
        return Err(AuthError::UnverifiedUser);
    }
    Ok(())
}
