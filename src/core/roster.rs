use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::attendee::{Attendee, Gender};

/// An attendee as listed by the ticketing source, before an ID is assigned
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct Registrant {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub gender: Gender,
}

/// Result of merging the ticketing roster into the stored roster
#[derive(PartialEq, Debug, Default)]
pub struct Reconciliation {
    /// Every attendee of the event, stored ones first
    pub roster: Vec<Attendee>,
    /// Attendees that must be inserted, empty when nothing changed
    pub new_arrivals: Vec<Attendee>,
}

/// Drop repeated emails, keeping the first registration.
pub fn dedupe_by_email(registrants: Vec<Registrant>) -> Vec<Registrant> {
    let mut seen = HashSet::new();
    registrants
        .into_iter()
        .filter(|r| seen.insert(r.email.clone()))
        .collect()
}

/// Stable sort by first name, then last name, comparing case-sensitively.
fn sort_registrants(registrants: &mut [&Registrant]) {
    registrants.sort_by(|a, b| {
        a.first_name
            .cmp(&b.first_name)
            .then_with(|| a.last_name.cmp(&b.last_name))
    });
}

/// Assign IDs to `registrants` per gender, continuing after `taken[gender]`.
fn assign_ids(registrants: &[&Registrant], taken: &HashMap<Gender, i64>) -> Vec<Attendee> {
    let mut sorted = registrants.to_vec();
    sort_registrants(&mut sorted);

    Gender::ALL
        .iter()
        .flat_map(|gender| {
            let start = taken.get(gender).copied().unwrap_or(0);
            sorted
                .iter()
                .filter(move |r| r.gender == *gender)
                .enumerate()
                .map(move |(i, r)| {
                    Attendee::new(
                        start + i as i64 + 1,
                        r.first_name.clone(),
                        r.last_name.clone(),
                        r.email.clone(),
                        r.gender,
                    )
                })
        })
        .collect()
}

/// Merge the ticketing roster of an event into its stored roster.
///
/// Stored attendees keep their IDs. Registrants whose email is not stored yet are
/// sorted by name and numbered per gender after the attendees already stored.
pub fn reconcile(external: &[Registrant], persisted: Vec<Attendee>) -> Reconciliation {
    let known: HashSet<&str> = persisted.iter().map(|a| a.email.as_str()).collect();
    let mut seen = HashSet::new();
    let arrivals: Vec<&Registrant> = external
        .iter()
        .filter(|r| !known.contains(r.email.as_str()) && seen.insert(r.email.as_str()))
        .collect();

    if arrivals.is_empty() {
        return Reconciliation {
            roster: persisted,
            new_arrivals: vec![],
        };
    }

    let mut taken = HashMap::new();
    for attendee in &persisted {
        *taken.entry(attendee.gender).or_insert(0) += 1;
    }

    let new_arrivals = assign_ids(&arrivals, &taken);
    let mut roster = persisted;
    roster.extend(new_arrivals.iter().cloned());

    Reconciliation {
        roster,
        new_arrivals,
    }
}
