use anyhow::{Context, Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use platform_db::DatabaseSettings;

const MIN_SECRET_BYTES: usize = 32;

#[derive(Clone)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub token_secret: Vec<u8>,
    pub token_ttl_minutes: i64,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let database = DatabaseSettings::from_env();

        let secret = std::env::var("JWT_SECRET_BASE64").context("JWT_SECRET_BASE64 missing")?;
        let token_secret = decode_secret(&secret)?;

        let token_ttl_minutes = match std::env::var("TOKEN_TTL_MINUTES") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .ok_or_else(|| anyhow!("TOKEN_TTL_MINUTES must be a positive integer"))?,
            Err(_) => 60,
        };

        let cors_allowed_origins = parse_origins(
            &std::env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        );

        Ok(Self {
            database,
            token_secret,
            token_ttl_minutes,
            cors_allowed_origins,
        })
    }
}

fn decode_secret(raw: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD
        .decode(raw.trim())
        .context("invalid JWT_SECRET_BASE64")?;
    if bytes.len() < MIN_SECRET_BYTES {
        return Err(anyhow!(
            "JWT_SECRET_BASE64 must decode to at least {MIN_SECRET_BYTES} bytes"
        ));
    }
    Ok(bytes)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}
