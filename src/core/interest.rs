use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

use super::attendee::{Attendee, Gender};

/// Most selections a single match form may carry
pub const MAX_INTERESTS: usize = 50;

/// A selected ID as sent by the match form, which may post strings or numbers.
/// Anything else lands in `Other` so it fails validation instead of deserialization.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawInterest {
    Number(i64),
    Text(String),
    Other(serde_json::Value),
}

impl RawInterest {
    fn to_id(&self) -> Option<i64> {
        let id = match self {
            RawInterest::Number(id) => *id,
            RawInterest::Text(text) => text.trim().parse().ok()?,
            RawInterest::Other(_) => return None,
        };
        (id > 0).then_some(id)
    }
}

/// Parse a submitted selection list.
///
/// Rejects lists longer than `MAX_INTERESTS` and entries that are not positive integers.
/// The result is sorted and free of duplicates.
pub fn parse_interests(raw: &[RawInterest]) -> QueryResult<Vec<i64>> {
    if raw.len() > MAX_INTERESTS {
        log::warn!("Rejected match form with {} selections", raw.len());
        return Err(QueryError::invalid("Invalid interest selections."));
    }

    let mut ids = raw
        .iter()
        .map(RawInterest::to_id)
        .collect::<Option<Vec<i64>>>()
        .ok_or_else(|| {
            log::warn!("Rejected match form selections {:?}", raw);
            QueryError::invalid("Invalid interest selections.")
        })?;

    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

/// Check that every selected ID belongs to the pool `submitter` may choose from.
pub fn check_selectable(ids: &[i64], submitter: &Attendee, roster: &[Attendee]) -> QueryResult<()> {
    if ids.is_empty() {
        return Ok(());
    }

    let Some(opposite) = submitter.gender.opposite() else {
        return Err(QueryError::invalid("Invalid interest selections."));
    };

    let pool: HashSet<i64> = roster
        .iter()
        .filter(|a| a.gender == opposite)
        .map(|a| a.id)
        .collect();

    if ids.iter().all(|id| pool.contains(id)) {
        Ok(())
    } else {
        Err(QueryError::invalid("Invalid interest selections."))
    }
}

/// Identifies an attendee inside one event
pub type AttendeeKey = (Gender, i64);

/// Mutual and one-sided interest for every attendee of an event
#[derive(Debug, Default)]
pub struct Resolution {
    matches: HashMap<AttendeeKey, Vec<Attendee>>,
    revisits: HashMap<AttendeeKey, Vec<Attendee>>,
}

impl Resolution {
    /// Attendees who selected `attendee` and were selected back.
    pub fn matches_for(&self, attendee: &Attendee) -> &[Attendee] {
        self.matches
            .get(&(attendee.gender, attendee.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Attendees who selected `attendee` without being selected back.
    pub fn revisits_for(&self, attendee: &Attendee) -> &[Attendee] {
        self.revisits
            .get(&(attendee.gender, attendee.id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Compute matches and revisits over a full event roster.
pub fn resolve(roster: &[Attendee]) -> Resolution {
    let mut resolution = Resolution::default();

    for attendee in roster {
        let Some(opposite) = attendee.gender.opposite() else {
            continue;
        };
        let key = (attendee.gender, attendee.id);

        for other in roster.iter().filter(|o| o.gender == opposite) {
            if !other.interests.contains(attendee.id) {
                continue;
            }

            let bucket = if attendee.interests.contains(other.id) {
                &mut resolution.matches
            } else {
                &mut resolution.revisits
            };
            bucket.entry(key).or_default().push(other.clone());
        }
    }

    resolution
}
