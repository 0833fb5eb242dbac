use serde::{Deserialize, Serialize};

/// Deployment environments governed by Opzenix, ordered from least to most
/// sensitive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum Environment {
    Dev,
    Qa,
    Staging,
    Preprod,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 5] = [
        Environment::Dev,
        Environment::Qa,
        Environment::Staging,
        Environment::Preprod,
        Environment::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "DEV",
            Environment::Qa => "QA",
            Environment::Staging => "STAGING",
            Environment::Preprod => "PREPROD",
            Environment::Prod => "PROD",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEV" | "DEVELOPMENT" => Ok(Environment::Dev),
            "QA" | "UAT" => Ok(Environment::Qa),
            "STAGING" | "STAGE" => Ok(Environment::Staging),
            "PREPROD" | "PRE-PROD" => Ok(Environment::Preprod),
            "PROD" | "PRODUCTION" => Ok(Environment::Prod),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}
