use chrono::{FixedOffset, Local, Offset};

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    /// Validity window of tokens minted at login.
    pub login_ttl_days: i64,
    /// Validity window of tokens minted by refresh.
    pub refresh_ttl_hours: i64,
    /// Calendar offset for report bucketing. Reports never read the host
    /// clock implicitly; this is the single source of "local" time.
    pub utc_offset: FixedOffset,
    /// Prefix of generated access-key codes.
    pub key_prefix: String,
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let jwt_secret = std::env::var("VALETGATE_JWT_SECRET")
        .unwrap_or_else(|_| "CHANGE_ME_JWT_SECRET".into());

    if jwt_secret == "CHANGE_ME_JWT_SECRET" {
        let env_mode = std::env::var("VALETGATE_ENV").unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "VALETGATE_JWT_SECRET is still the insecure placeholder. \
                 Set a proper secret before running in production."
            );
        }
        eprintln!("⚠️  VALETGATE_JWT_SECRET is not set — using insecure placeholder. Set a real secret for production.");
    }

    let utc_offset = std::env::var("VALETGATE_UTC_OFFSET_MINUTES")
        .ok()
        .and_then(|v| v.parse::<i32>().ok())
        .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
        .unwrap_or_else(|| Local::now().offset().fix());

    Ok(Config {
        port: std::env::var("VALETGATE_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .unwrap_or(3000),
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/valetgate".into()),
        jwt_secret,
        login_ttl_days: std::env::var("VALETGATE_LOGIN_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7),
        refresh_ttl_hours: std::env::var("VALETGATE_REFRESH_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8),
        utc_offset,
        key_prefix: std::env::var("VALETGATE_KEY_PREFIX")
            .unwrap_or_else(|_| "VALET".into()),
    })
}
