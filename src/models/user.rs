//! User profile models

use serde::{Deserialize, Serialize};

/// Platform role of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Mentee,
    Mentor,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mentee" => Ok(Role::Mentee),
            "mentor" => Ok(Role::Mentor),
            other => Err(format!("unknown role '{}' (expected mentee or mentor)", other)),
        }
    }
}

/// User profile, as stored by the backend and cached in the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(alias = "_id", alias = "uid")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(alias = "name", default)]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(alias = "photoURL", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Partial profile update; only set fields are sent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.bio.is_none()
            && self.skills.is_none()
            && self.role.is_none()
    }

    /// Apply the update to a cached profile snapshot.
    pub fn apply_to(&self, profile: &mut UserProfile) {
        if let Some(ref name) = self.display_name {
            profile.display_name = name.clone();
        }
        if let Some(ref bio) = self.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(ref skills) = self.skills {
            profile.skills = skills.clone();
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
    }
}
