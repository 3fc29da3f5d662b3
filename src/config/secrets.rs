//! Secret handling utilities.
//!
//! Re-exports secrecy types and provides a redaction helper for logging
//! broker and database endpoints.

pub use secrecy::{ExposeSecret, SecretString};

/// Render a connection URL with its credentials removed, e.g.
/// `amqp://user:pw@host:5672/%2f` becomes `amqp://***@host:5672/%2f`.
pub fn redact_url(url: &SecretString) -> String {
    let raw = url.expose_secret();
    match (raw.find("://"), raw.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}***{}", &raw[..scheme_end + 3], &raw[at..])
        }
        _ => raw.to_string(),
    }
}
