//! Mentor directory

use anyhow::{Context, Result};

use super::client::ApiClient;
use crate::models::{Mentor, MentorApplication};

/// Narrow a directory listing by expertise and availability.
pub fn filter_mentors(mentors: Vec<Mentor>, skill: Option<&str>, available_only: bool) -> Vec<Mentor> {
    mentors
        .into_iter()
        .filter(|m| !available_only || m.available)
        .filter(|m| skill.map_or(true, |s| m.has_skill(s)))
        .collect()
}

pub async fn fetch_mentors(client: &ApiClient) -> Result<Vec<Mentor>> {
    client
        .get("/api/mentors")
        .await
        .context("Failed to load mentors")
}

pub async fn fetch_mentor(client: &ApiClient, id: &str) -> Result<Mentor> {
    client
        .get(&format!("/api/mentors/{}", id))
        .await
        .with_context(|| format!("Failed to load mentor {}", id))
}

/// Submit a mentor application and return the created listing.
pub async fn apply(client: &ApiClient, application: &MentorApplication) -> Result<Mentor> {
    client
        .post("/api/mentors", application)
        .await
        .context("Mentor application failed")
}

/// List mentors (prints to stdout).
pub async fn list_mentors(client: &ApiClient, skill: Option<&str>, available_only: bool) -> Result<()> {
    let mentors = filter_mentors(fetch_mentors(client).await?, skill, available_only);

    println!("\nMentors:");
    println!("{:-<60}", "");

    if mentors.is_empty() {
        println!("  (no mentors match)");
        return Ok(());
    }

    for mentor in &mentors {
        let status = if mentor.available { "" } else { " [unavailable]" };
        match mentor.title {
            Some(ref title) => println!("{} -- {}{}", mentor.name, title, status),
            None => println!("{}{}", mentor.name, status),
        }
        println!("  ID: {}", mentor.id);
        if !mentor.expertise.is_empty() {
            println!("  Expertise: {}", mentor.expertise.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Show one mentor (prints to stdout).
pub async fn show_mentor(client: &ApiClient, id: &str) -> Result<()> {
    let mentor = fetch_mentor(client, id).await?;

    println!("{}", mentor.name);
    if let Some(ref title) = mentor.title {
        println!("  {}", title);
    }
    println!("  ID:        {}", mentor.id);
    println!("  Available: {}", if mentor.available { "yes" } else { "no" });
    if !mentor.expertise.is_empty() {
        println!("  Expertise: {}", mentor.expertise.join(", "));
    }
    if let Some(ref bio) = mentor.bio {
        println!();
        println!("{}", bio);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mentor(id: &str, skills: &[&str], available: bool) -> Mentor {
        Mentor {
            id: id.to_string(),
            name: id.to_uppercase(),
            title: None,
            bio: None,
            expertise: skills.iter().map(|s| s.to_string()).collect(),
            avatar_url: None,
            available,
        }
    }

    #[test]
    fn test_filter_mentors() {
        let all = vec![
            mentor("a", &["Rust", "WebAssembly"], true),
            mentor("b", &["Go"], true),
            mentor("c", &["rust"], false),
        ];

        let ids = |v: Vec<Mentor>| v.into_iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids(filter_mentors(all.clone(), None, false)), vec!["a", "b", "c"]);
        assert_eq!(ids(filter_mentors(all.clone(), Some("RUST"), false)), vec!["a", "c"]);
        assert_eq!(ids(filter_mentors(all.clone(), Some("rust"), true)), vec!["a"]);
        assert!(filter_mentors(all, Some("design"), false).is_empty());
    }
}
