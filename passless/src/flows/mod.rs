//! Flow controllers: the state machines behind each sign-in entry point.
//! All of them converge on the session issuer.

mod passwordless;
mod validate;
mod webauthn;

pub use passwordless::PasswordlessFlow;
pub use validate::SignUpOptions;
pub use webauthn::WebauthnFlow;

pub(crate) use validate::{check_user, resolve_signup_options, validate_email, validate_redirect_to};

#[derive(Debug, Clone, Copy)]
pub(crate) enum LinkType {
    SigninPasswordless,
    EmailVerify,
}

impl LinkType {
    fn as_str(&self) -> &'static str {
        match self {
            LinkType::SigninPasswordless => "signinPasswordless",
            LinkType::EmailVerify => "emailVerify",
        }
    }
}

/// Builds the out-of-band verification link embedded in emails. The ticket
/// is redeemed by the server's own `/verify` route, which then forwards to
/// `redirect_to`.
pub(crate) fn generate_link(
    server_url: &str,
    link_type: LinkType,
    ticket: &str,
    redirect_to: &str,
) -> String {
    format!(
        "{}/verify?ticket={}&type={}&redirectTo={}",
        server_url.trim_end_matches('/'),
        urlencoding::encode(ticket),
        link_type.as_str(),
        urlencoding::encode(redirect_to),
    )
}
