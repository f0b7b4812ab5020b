use crate::config::Config;

pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Scoped to the auth routes so the cookie never rides along on data calls.
const COOKIE_PATH: &str = "/api/auth";

/// `Set-Cookie` value carrying a refresh token.
pub fn refresh_cookie(token: &str, config: &Config) -> String {
    format!(
        "{}={}; HttpOnly{}; SameSite=Lax; Path={}; Max-Age={}",
        REFRESH_TOKEN_COOKIE,
        token,
        if config.cookie_secure { "; Secure" } else { "" },
        COOKIE_PATH,
        config.jwt_refresh_ttl_secs,
    )
}

/// `Set-Cookie` value that makes the browser drop the refresh token.
pub fn clear_refresh_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly{}; SameSite=Lax; Path={}; Max-Age=0",
        REFRESH_TOKEN_COOKIE,
        if config.cookie_secure { "; Secure" } else { "" },
        COOKIE_PATH,
    )
}
