use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Platform roles. Anything else in a token is treated as "no role".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Dietitian,
    HealthCounselor,
    Client,
}

impl UserRole {
    /// Human-readable label used in notification copy.
    pub fn label(&self) -> &'static str {
        match self {
            UserRole::Admin => "Admin",
            UserRole::Dietitian => "Dietitian",
            UserRole::HealthCounselor => "Health Counselor",
            UserRole::Client => "Client",
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, UserRole::Client)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::Admin => write!(f, "admin"),
            UserRole::Dietitian => write!(f, "dietitian"),
            UserRole::HealthCounselor => write!(f, "health_counselor"),
            UserRole::Client => write!(f, "client"),
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "admin" => Ok(UserRole::Admin),
            "dietitian" => Ok(UserRole::Dietitian),
            "health_counselor" | "healthcounselor" => Ok(UserRole::HealthCounselor),
            "client" => Ok(UserRole::Client),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn parsed_role(&self) -> Option<UserRole> {
        self.role.as_deref().and_then(|role| role.parse().ok())
    }

    /// Name shown in lifecycle history, falling back to the email address.
    pub fn display_name(&self) -> String {
        self.metadata
            .as_ref()
            .and_then(|meta| {
                meta.get("full_name")
                    .or_else(|| meta.get("name"))
                    .and_then(|v| v.as_str())
            })
            .map(|name| name.to_string())
            .or_else(|| self.email.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_role_spellings() {
        assert_eq!("health-counselor".parse::<UserRole>(), Ok(UserRole::HealthCounselor));
        assert_eq!("Dietitian".parse::<UserRole>(), Ok(UserRole::Dietitian));
        assert!("doctor".parse::<UserRole>().is_err());
    }

    #[test]
    fn display_name_prefers_metadata() {
        let mut user = User {
            id: "u1".into(),
            email: Some("jane@example.com".into()),
            role: Some("client".into()),
            metadata: Some(json!({"full_name": "Jane Doe"})),
            created_at: None,
        };
        assert_eq!(user.display_name(), "Jane Doe");

        user.metadata = None;
        assert_eq!(user.display_name(), "jane@example.com");
    }
}
