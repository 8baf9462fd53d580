//! Public contact form

use anyhow::{Context, Result};
use serde::Serialize;

use super::client::ApiClient;
use crate::error::ClientError;

#[derive(Debug, Clone, Serialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub message: String,
}

impl ContactForm {
    pub fn new(name: &str, email: &str, message: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            message: message.trim().to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        for (field, value) in [
            ("name", &self.name),
            ("email", &self.email),
            ("message", &self.message),
        ] {
            if value.is_empty() {
                return Err(ClientError::Validation(format!("{} is required", field)));
            }
        }
        let valid_email = match self.email.split_once('@') {
            Some((user, domain)) => !user.is_empty() && domain.contains('.'),
            None => false,
        };
        if !valid_email {
            return Err(ClientError::Validation(format!(
                "'{}' is not an email address",
                self.email
            )));
        }
        Ok(())
    }
}

/// Validate and submit the form. Works without signing in.
pub async fn submit(client: &ApiClient, form: &ContactForm) -> Result<()> {
    form.validate()?;
    client
        .post_public("/api/contact", form)
        .await
        .context("Failed to send contact form")?;
    println!("Thanks, your message was sent.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(ContactForm::new("Ana", " ana@example.com ", "Hello").validate().is_ok());

        match ContactForm::new("", "ana@example.com", "Hello").validate() {
            Err(ClientError::Validation(msg)) => assert_eq!(msg, "name is required"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(ContactForm::new("Ana", "ana@example.com", "   ").validate().is_err());
        assert!(ContactForm::new("Ana", "ana.example.com", "Hi").validate().is_err());
        assert!(ContactForm::new("Ana", "@example.com", "Hi").validate().is_err());
        assert!(ContactForm::new("Ana", "ana@localhost", "Hi").validate().is_err());
    }
}
