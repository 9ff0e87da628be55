use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

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

impl JwtClaims {
    /// Role as granted by the identity provider. `app_metadata.role` wins over
    /// `user_metadata.role`, which wins over the top-level claim.
    pub fn raw_role(&self) -> Option<&str> {
        fn from_metadata(meta: &Option<serde_json::Value>) -> Option<&str> {
            meta.as_ref()
                .and_then(|m| m.get("role"))
                .and_then(|r| r.as_str())
        }

        from_metadata(&self.app_metadata)
            .or_else(|| from_metadata(&self.user_metadata))
            .or(self.role.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Doctor,
    Patient,
    Admin,
}

impl UserRole {
    /// Normalizes a raw role string at the trust boundary. Missing roles and the
    /// provider's generic `authenticated` role fall back to `Patient`; anything
    /// else that is not a known role is refused.
    pub fn normalize(raw: Option<&str>) -> Result<Self, String> {
        match raw.map(|r| r.trim().to_ascii_lowercase()) {
            None => Ok(UserRole::Patient),
            Some(r) if r.is_empty() || r == "authenticated" => Ok(UserRole::Patient),
            Some(r) => r.parse(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Doctor => "doctor",
            UserRole::Patient => "patient",
            UserRole::Admin => "admin",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(UserRole::Doctor),
            "patient" => Ok(UserRole::Patient),
            "admin" => Ok(UserRole::Admin),
            other => Err(format!("Unrecognized role: {}", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn display_name(&self) -> Option<String> {
        let meta = self.metadata.as_ref()?;
        ["full_name", "name", "display_name"]
            .iter()
            .find_map(|key| meta.get(*key).and_then(|v| v.as_str()))
            .filter(|name| !name.trim().is_empty())
            .map(str::to_string)
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            display_name: self.display_name(),
        }
    }
}

/// The signed-in principal as the identity collaborator reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_and_generic_roles_become_patient() {
        assert_eq!(UserRole::normalize(None), Ok(UserRole::Patient));
        assert_eq!(UserRole::normalize(Some("authenticated")), Ok(UserRole::Patient));
        assert_eq!(UserRole::normalize(Some(" Doctor ")), Ok(UserRole::Doctor));
        assert!(UserRole::normalize(Some("superuser")).is_err());
    }

    #[test]
    fn app_metadata_role_takes_precedence() {
        let claims = JwtClaims {
            sub: "u1".to_string(),
            exp: None,
            email: None,
            role: Some("authenticated".to_string()),
            app_metadata: Some(json!({ "role": "admin" })),
            user_metadata: Some(json!({ "role": "doctor" })),
            aud: None,
            iat: None,
        };
        assert_eq!(claims.raw_role(), Some("admin"));
    }

    #[test]
    fn role_falls_back_to_user_metadata_then_claim() {
        let mut claims = JwtClaims {
            sub: "u1".to_string(),
            exp: None,
            email: None,
            role: Some("authenticated".to_string()),
            app_metadata: Some(json!({ "provider": "email" })),
            user_metadata: Some(json!({ "role": "doctor" })),
            aud: None,
            iat: None,
        };
        assert_eq!(claims.raw_role(), Some("doctor"));

        claims.user_metadata = None;
        assert_eq!(claims.raw_role(), Some("authenticated"));
    }

    #[test]
    fn display_name_reads_metadata() {
        let user = User {
            id: "u1".to_string(),
            email: None,
            role: UserRole::Patient,
            metadata: Some(json!({ "full_name": "Ada Lovelace" })),
            created_at: None,
        };
        assert_eq!(user.identity().display_name.as_deref(), Some("Ada Lovelace"));
    }
}
