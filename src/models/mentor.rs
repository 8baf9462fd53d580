//! Mentor directory models

use serde::{Deserialize, Serialize};

/// A mentor listed in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mentor {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "displayName")]
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(alias = "skills", default)]
    pub expertise: Vec<String>,
    #[serde(alias = "image", default)]
    pub avatar_url: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

impl Mentor {
    /// Case-insensitive substring match against expertise tags.
    pub fn has_skill(&self, skill: &str) -> bool {
        let needle = skill.to_lowercase();
        self.expertise
            .iter()
            .any(|e| e.to_lowercase().contains(&needle))
    }
}

/// Body of a "become a mentor" application.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MentorApplication {
    pub title: String,
    pub bio: String,
    pub expertise: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mentor_defaults_and_skill_match() {
        let mentor: Mentor =
            serde_json::from_str(r#"{"_id":"m1","name":"Lee","skills":["Rust","Distributed Systems"]}"#)
                .unwrap();
        assert!(mentor.available);
        assert!(mentor.has_skill("rust"));
        assert!(mentor.has_skill("systems"));
        assert!(!mentor.has_skill("design"));
    }
}
