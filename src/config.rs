use anyhow::Context;

/// Process configuration, read from the environment.
///
/// | Env Var                 | Default |
/// |-------------------------|---------|
/// | `DATABASE_URL`          | unset, in-memory store |
/// | `PORT`                  | `8081`  |
/// | `DB_MAX_CONNECTIONS`    | `5`     |
/// | `NOTIFY_WEBHOOK_URL`    | unset, alerts are only logged |
/// | `QUIZ_UNLOCK_VIDEO_PCT` | `90`    |
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub db_max_connections: u32,
    pub notify_webhook_url: Option<String>,
    pub quiz_unlock_video_pct: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let non_empty = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match non_empty("PORT") {
            Some(v) => v.parse().with_context(|| format!("PORT must be a valid u16, got {v:?}"))?,
            None => 8081,
        };
        let db_max_connections = match non_empty("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {v:?}"))?,
            None => 5,
        };
        let quiz_unlock_video_pct: f64 = match non_empty("QUIZ_UNLOCK_VIDEO_PCT") {
            Some(v) => v
                .parse()
                .with_context(|| format!("QUIZ_UNLOCK_VIDEO_PCT must be a number, got {v:?}"))?,
            None => 90.0,
        };
        if !(0.0..=100.0).contains(&quiz_unlock_video_pct) {
            anyhow::bail!("QUIZ_UNLOCK_VIDEO_PCT must be between 0 and 100");
        }

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            port,
            db_max_connections,
            notify_webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
            quiz_unlock_video_pct,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.db_max_connections, 5);
        assert_eq!(cfg.quiz_unlock_video_pct, 90.0);
        assert!(cfg.database_url.is_none());
        assert!(cfg.notify_webhook_url.is_none());
    }

    #[test]
    fn overrides_and_blank_values() {
        let cfg = load(&[
            ("PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/lms"),
            ("NOTIFY_WEBHOOK_URL", "  "),
            ("QUIZ_UNLOCK_VIDEO_PCT", "75.5"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/lms"));
        assert!(cfg.notify_webhook_url.is_none());
        assert_eq!(cfg.quiz_unlock_video_pct, 75.5);
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(load(&[("PORT", "eighty")]).is_err());
        assert!(load(&[("QUIZ_UNLOCK_VIDEO_PCT", "120")]).is_err());
        assert!(load(&[("DB_MAX_CONNECTIONS", "-1")]).is_err());
    }
}
