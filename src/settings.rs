use std::{collections::HashMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::core::attendee::Gender;

/// Json struct for deployment settings
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Settings {
    /// SQLite database file
    pub database: String,
    pub web_port: Option<u16>,
    /// Origin allowed by CORS, any origin if unset
    pub client_origin: Option<String>,

    pub eventbrite: EventbriteSettings,
    pub smtp: Option<SmtpSettings>,
    pub mail: MailSettings,
    pub admin: AdminSettings,

    /// Delay between two emails of the same batch
    pub send_delay_secs: Option<u64>,
    /// How often the scheduler looks for due jobs
    pub scheduler_poll_secs: Option<u64>,
    pub revisit_policy: Option<RevisitPolicy>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventbriteSettings {
    pub token: String,
    pub organization: String,
    pub base_url: Option<String>,
    /// Ticket class name to gender, unmapped classes are `Other`
    pub ticket_classes: Option<HashMap<String, Gender>>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: Option<u16>,
    pub username: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MailSettings {
    /// Sender of confirmation, reminder and result emails
    pub matches_address: String,
    /// Receives contact queries and feedback summaries
    pub contact_address: String,
    pub organization_name: String,
    pub website_url: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdminSettings {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Whether revisits from attendees who opted out of sharing contact info are listed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RevisitPolicy {
    /// Only list revisits from attendees who opted in, count the rest.
    #[default]
    RespectOptOut,
    /// List every revisit.
    ShareAll,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&file)?)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_secs(self.send_delay_secs.unwrap_or(5))
    }

    pub fn scheduler_poll(&self) -> Duration {
        Duration::from_secs(self.scheduler_poll_secs.unwrap_or(60))
    }

    pub fn ticket_classes(&self) -> HashMap<String, Gender> {
        self.eventbrite.ticket_classes.clone().unwrap_or_else(|| {
            HashMap::from([
                ("Male Ticket".to_owned(), Gender::Male),
                ("Female Ticket".to_owned(), Gender::Female),
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "database": "sparks.db",
        "eventbrite": { "token": "abc", "organization": "123" },
        "mail": {
            "matches_address": "matches@example.org",
            "contact_address": "contact@example.org",
            "organization_name": "Sparks",
            "website_url": "https://example.org"
        },
        "admin": {
            "first_name": "Ada",
            "last_name": "Admin",
            "email": "admin@example.org",
            "password": "hunter2"
        },
        "revisit_policy": "ShareAll"
    }"#;

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_json::from_str(SAMPLE).unwrap();

        assert_eq!(settings.send_delay(), Duration::from_secs(5));
        assert_eq!(settings.scheduler_poll(), Duration::from_secs(60));
        assert_eq!(settings.revisit_policy, Some(RevisitPolicy::ShareAll));
        assert!(settings.smtp.is_none());

        let classes = settings.ticket_classes();
        assert_eq!(classes.get("Male Ticket"), Some(&Gender::Male));
        assert_eq!(classes.get("Female Ticket"), Some(&Gender::Female));
    }
}
