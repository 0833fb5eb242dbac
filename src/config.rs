use serde::Deserialize;

const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_OPZENIX_API_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    /// Postgres connection string. When unset the service runs on the
    /// in-memory store and state is lost on restart.
    pub database_url: Option<String>,
    pub api_key: String,
    /// Comma-separated list of webhook URLs notified on governance events.
    pub webhook_urls: Vec<String>,
    pub webhook_secret: Option<String>,
    /// Governance rules applied by the vote path.
    pub rules: GovernanceRules,
    /// Capacity of the realtime change feed.
    pub change_feed_capacity: usize,
}

/// Voting rules that are configurable per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GovernanceRules {
    /// Set via OPZENIX_ALLOW_SELF_APPROVAL. Default: false.
    pub allow_self_approval: bool,
    /// Set via OPZENIX_ALLOW_REVOTE. Default: false (one vote per user).
    pub allow_revote: bool,
}

impl Default for GovernanceRules {
    fn default() -> Self {
        Self {
            allow_self_approval: false,
            allow_revote: false,
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let api_key = std::env::var("OPZENIX_API_KEY").unwrap_or_else(|_| PLACEHOLDER_API_KEY.into());

    if api_key == PLACEHOLDER_API_KEY {
        let env_mode = std::env::var("OPZENIX_ENV")
            .or_else(|_| std::env::var("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "OPZENIX_API_KEY is still the insecure placeholder. \
                 Set a real key before running in production."
            );
        }
        tracing::warn!("OPZENIX_API_KEY is not set, using insecure placeholder");
    }

    Ok(Config {
        port: std::env::var("OPZENIX_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080),
        database_url: std::env::var("DATABASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty()),
        api_key,
        webhook_urls: std::env::var("OPZENIX_WEBHOOK_URLS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        webhook_secret: std::env::var("OPZENIX_WEBHOOK_SECRET").ok(),
        rules: GovernanceRules {
            allow_self_approval: env_flag("OPZENIX_ALLOW_SELF_APPROVAL"),
            allow_revote: env_flag("OPZENIX_ALLOW_REVOTE"),
        },
        change_feed_capacity: std::env::var("OPZENIX_CHANGE_FEED_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256),
    })
}
