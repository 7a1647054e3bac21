use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use crate::session::store::{Identity, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub color_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Credential kind. The server stores it as free text, so unknown values
/// are kept as-is and known ones are matched without regard to case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialType {
    #[default]
    Secret,
    File,
    Other(String),
}

impl CredentialType {
    pub fn as_str(&self) -> &str {
        match self {
            CredentialType::Secret => "SECRET",
            CredentialType::File => "FILE",
            CredentialType::Other(raw) => raw,
        }
    }
}

impl From<&str> for CredentialType {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SECRET" => CredentialType::Secret,
            "FILE" => CredentialType::File,
            _ => CredentialType::Other(raw.to_string()),
        }
    }
}

impl Serialize for CredentialType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CredentialType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CredentialType::from(raw.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub project_id: String,
    pub key: String,
    /// Masked in listings; the reveal endpoint returns the real value.
    pub value: String,
    #[serde(default, rename = "type")]
    pub credential_type: Option<CredentialType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_by_user_id: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Body for creating or updating a credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRequest {
    pub key: String,
    pub value: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub credential_type: Option<CredentialType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub active: bool,
}

/// Partial entity embedded in audit rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub credential_key: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub user: Option<AuditRef>,
    #[serde(default)]
    pub project: Option<AuditRef>,
    #[serde(default)]
    pub environment: Option<AuditRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvWithProjects {
    pub env: Environment,
    pub projects: Vec<Project>,
}

/// A project together with the environment it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRef {
    pub env_id: String,
    pub env_name: String,
    pub project_id: String,
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub env_id: String,
    pub env_name: String,
    pub project_id: String,
    pub project_name: String,
    pub credential: Credential,
}
