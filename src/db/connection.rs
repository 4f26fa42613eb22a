//! Database connection management using sqlx

use sqlx::postgres::PgConnection;
use sqlx::Connection;

/// Open a dedicated connection. Callers own it for the duration of one unit
/// of work; dropping it closes the socket.
pub async fn connect(database_url: &str) -> Result<PgConnection, sqlx::Error> {
    PgConnection::connect(database_url).await
}

/// Mask the password of a connection URL for logging.
pub fn redact_url(database_url: &str) -> String {
    let Some(scheme_end) = database_url.find("://") else {
        return database_url.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &database_url[authority_start..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return database_url.to_string();
    };
    let userinfo = &rest[..at];
    match userinfo.find(':') {
        Some(colon) => format!(
            "{}{}:****{}",
            &database_url[..authority_start],
            &userinfo[..colon],
            &rest[at..]
        ),
        None => database_url.to_string(),
    }
}
