use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use url::Url;

use crate::{
    core::{attendee::Gender, event::Event, roster::{dedupe_by_email, Registrant}},
    settings::EventbriteSettings,
    util::{capitalize_name, normalize_string},
};

const DEFAULT_BASE_URL: &str = "https://www.eventbriteapi.com/v3/";

/// Where events and their registrants come from
#[async_trait]
pub trait TicketSource: Send + Sync {
    /// Every event of the organization.
    async fn list_events(&self) -> anyhow::Result<Vec<Event>>;

    /// Attending registrants of an event, one entry per email.
    async fn list_attendees(&self, event_id: &str) -> anyhow::Result<Vec<Registrant>>;
}

#[derive(Debug, Deserialize)]
struct Pagination {
    has_more_items: bool,
    continuation: Option<String>,
}

/// A single page of a paginated listing
trait Page: DeserializeOwned {
    type Item;
    fn into_parts(self) -> (Pagination, Vec<Self::Item>);
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    pagination: Pagination,
    events: Vec<EventbriteEvent>,
}

impl Page for EventsPage {
    type Item = EventbriteEvent;
    fn into_parts(self) -> (Pagination, Vec<Self::Item>) {
        (self.pagination, self.events)
    }
}

#[derive(Debug, Deserialize)]
struct AttendeesPage {
    pagination: Pagination,
    attendees: Vec<EventbriteAttendee>,
}

impl Page for AttendeesPage {
    type Item = EventbriteAttendee;
    fn into_parts(self) -> (Pagination, Vec<Self::Item>) {
        (self.pagination, self.attendees)
    }
}

#[derive(Debug, Deserialize)]
struct EventbriteEvent {
    id: String,
    name: EventbriteText,
    start: EventbriteTime,
    end: EventbriteTime,
}

#[derive(Debug, Deserialize)]
struct EventbriteText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EventbriteTime {
    utc: String,
    local: String,
}

#[derive(Debug, Deserialize)]
struct EventbriteAttendee {
    profile: EventbriteProfile,
    status: String,
    ticket_class_name: String,
}

#[derive(Debug, Deserialize)]
struct EventbriteProfile {
    first_name: String,
    last_name: String,
    email: String,
}

impl TryFrom<EventbriteEvent> for Event {
    type Error = anyhow::Error;

    fn try_from(event: EventbriteEvent) -> Result<Self, Self::Error> {
        Ok(Event {
            starts_at: OffsetDateTime::parse(&event.start.utc, &Rfc3339)?,
            ends_at: OffsetDateTime::parse(&event.end.utc, &Rfc3339)?,
            id: event.id,
            name: event.name.text,
            start_local: event.start.local,
        })
    }
}

/// Attending registrants only, with normalized names and emails.
fn to_registrant(
    attendee: EventbriteAttendee,
    ticket_classes: &HashMap<String, Gender>,
) -> Option<Registrant> {
    if attendee.status != "Attending" {
        return None;
    }

    Some(Registrant {
        first_name: capitalize_name(&attendee.profile.first_name),
        last_name: capitalize_name(&attendee.profile.last_name),
        email: normalize_string(&attendee.profile.email),
        gender: ticket_classes
            .get(&attendee.ticket_class_name)
            .copied()
            .unwrap_or(Gender::Other),
    })
}

pub struct EventbriteClient {
    client: reqwest::Client,
    token: String,
    organization: String,
    base_url: Url,
    ticket_classes: HashMap<String, Gender>,
}

impl EventbriteClient {
    pub fn new(
        settings: &EventbriteSettings,
        ticket_classes: HashMap<String, Gender>,
    ) -> anyhow::Result<Self> {
        let base_url = Url::parse(settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("Invalid Eventbrite URL {}", base_url));
        }

        Ok(EventbriteClient {
            client: reqwest::Client::new(),
            token: settings.token.clone(),
            organization: settings.organization.clone(),
            base_url,
            ticket_classes,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    /// Fetch every page of a listing, following the continuation cursor.
    async fn get_all<P: Page>(&self, url: Url) -> anyhow::Result<Vec<P::Item>> {
        let mut items = vec![];
        let mut continuation: Option<String> = None;

        loop {
            let mut page_url = url.clone();
            if let Some(token) = &continuation {
                page_url.query_pairs_mut().append_pair("continuation", token);
            }

            log::debug!("Requesting {}", page_url);
            let page: P = self
                .client
                .get(page_url)
                .bearer_auth(&self.token)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            let (pagination, page_items) = page.into_parts();
            items.extend(page_items);

            match pagination.continuation {
                Some(next) if pagination.has_more_items => continuation = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl TicketSource for EventbriteClient {
    async fn list_events(&self) -> anyhow::Result<Vec<Event>> {
        let url = self.endpoint(&["organizations", &self.organization, "events"]);
        self.get_all::<EventsPage>(url)
            .await?
            .into_iter()
            .map(Event::try_from)
            .collect()
    }

    async fn list_attendees(&self, event_id: &str) -> anyhow::Result<Vec<Registrant>> {
        let url = self.endpoint(&["events", event_id, "attendees"]);
        let registrants = self
            .get_all::<AttendeesPage>(url)
            .await?
            .into_iter()
            .filter_map(|a| to_registrant(a, &self.ticket_classes))
            .collect();

        Ok(dedupe_by_email(registrants))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> EventbriteClient {
        let settings = EventbriteSettings {
            token: "token".to_owned(),
            organization: "42".to_owned(),
            base_url: None,
            ticket_classes: None,
        };
        EventbriteClient::new(&settings, HashMap::new()).unwrap()
    }

    #[test]
    fn test_endpoints() {
        let client = client();

        assert_eq!(
            client
                .endpoint(&["organizations", "42", "events"])
                .as_str(),
            "https://www.eventbriteapi.com/v3/organizations/42/events/"
        );
        assert_eq!(
            client.endpoint(&["events", "1/../x", "attendees"]).as_str(),
            "https://www.eventbriteapi.com/v3/events/1%2F..%2Fx/attendees/"
        );
    }

    #[test]
    fn test_parse_events_page() {
        let page: EventsPage = serde_json::from_str(
            r#"{
                "pagination": { "has_more_items": true, "continuation": "abc" },
                "events": [{
                    "id": "100",
                    "name": { "text": "Singles Mixer" },
                    "start": { "utc": "2024-05-04T02:00:00Z", "local": "2024-05-03T19:00:00" },
                    "end": { "utc": "2024-05-04T04:30:00Z", "local": "2024-05-03T21:30:00" }
                }]
            }"#,
        )
        .unwrap();

        let (pagination, events) = page.into_parts();
        assert!(pagination.has_more_items);
        assert_eq!(pagination.continuation.as_deref(), Some("abc"));

        let event = Event::try_from(events.into_iter().next().unwrap()).unwrap();
        assert_eq!(event.id, "100");
        assert_eq!(event.name, "Singles Mixer");
        assert_eq!(event.start_local, "2024-05-03T19:00:00");
        assert_eq!(event.ends_at.unix_timestamp(), 1714797000);
    }

    #[test]
    fn test_parse_attendees_page() {
        let page: AttendeesPage = serde_json::from_str(
            r#"{
                "pagination": { "has_more_items": false },
                "attendees": [
                    { "profile": { "first_name": " sam", "last_name": "lee ", "email": " Sam@Example.org" },
                      "status": "Attending", "ticket_class_name": "Male Ticket" },
                    { "profile": { "first_name": "Ann", "last_name": "Bo", "email": "ann@example.org" },
                      "status": "Not Attending", "ticket_class_name": "Female Ticket" },
                    { "profile": { "first_name": "Rae", "last_name": "Doe", "email": "rae@example.org" },
                      "status": "Attending", "ticket_class_name": "VIP" }
                ]
            }"#,
        )
        .unwrap();

        let classes = HashMap::from([("Male Ticket".to_owned(), Gender::Male)]);
        let (_, attendees) = page.into_parts();
        let registrants: Vec<Registrant> = attendees
            .into_iter()
            .filter_map(|a| to_registrant(a, &classes))
            .collect();

        assert_eq!(
            registrants,
            vec![
                Registrant {
                    first_name: "Sam".to_owned(),
                    last_name: "Lee".to_owned(),
                    email: "sam@example.org".to_owned(),
                    gender: Gender::Male,
                },
                Registrant {
                    first_name: "Rae".to_owned(),
                    last_name: "Doe".to_owned(),
                    email: "rae@example.org".to_owned(),
                    gender: Gender::Other,
                },
            ]
        );
    }
}
