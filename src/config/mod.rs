use std::env;

/// Config holds all application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub db_max_connections: u32,
    pub listen_addr: String,
    /// Loss recorded for splices created without a measured value
    pub default_splice_loss_db: f64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        Self {
            db_path: get_env("DB_PATH", "/data/ofc_topology.db"),
            db_max_connections: get_env("DB_MAX_CONNECTIONS", "5")
                .parse()
                .unwrap_or(5),
            listen_addr: get_env("LISTEN_ADDR", "0.0.0.0:8080"),
            default_splice_loss_db: parse_loss(&get_env("DEFAULT_SPLICE_LOSS_DB", "0.0")),
        }
    }
}

fn get_env(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_loss(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => v,
        _ => {
            tracing::warn!("Ignoring invalid DEFAULT_SPLICE_LOSS_DB '{}', using 0.0", raw);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_loss() {
        assert_eq!(parse_loss("0.05"), 0.05);
        assert_eq!(parse_loss(" 0.1 "), 0.1);
        assert_eq!(parse_loss("-1"), 0.0);
        assert_eq!(parse_loss("abc"), 0.0);
        assert_eq!(parse_loss("NaN"), 0.0);
    }
}
