use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::util::normalize_string;

/// Ticket category of an attendee. Only `Male` and `Female` take part in matching.
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub const ALL: [Gender; 3] = [Gender::Male, Gender::Female, Gender::Other];

    /// The pool this gender is matched against. `Other` has none.
    pub fn opposite(self) -> Option<Gender> {
        match self {
            Gender::Male => Some(Gender::Female),
            Gender::Female => Some(Gender::Male),
            Gender::Other => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            _ => Err(anyhow::anyhow!("Unknown gender '{}'", s)),
        }
    }
}

/// The IDs an attendee selected on their match form.
///
/// Serialized as `null` until a form is submitted, so an empty submission stays distinct.
#[derive(PartialEq, Eq, Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Option<Vec<i64>>", into = "Option<Vec<i64>>")]
pub enum Interests {
    #[default]
    NotSubmitted,
    Submitted(Vec<i64>),
}

/// Stored marker for a submitted form with no selections
const EMPTY_SUBMISSION: &str = "--";

impl Interests {
    pub fn contains(&self, id: i64) -> bool {
        match self {
            Interests::NotSubmitted => false,
            Interests::Submitted(ids) => ids.contains(&id),
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, Interests::Submitted(_))
    }

    pub fn ids(&self) -> &[i64] {
        match self {
            Interests::NotSubmitted => &[],
            Interests::Submitted(ids) => ids,
        }
    }

    /// Encode for the `interests` text column.
    pub fn to_column(&self) -> Option<String> {
        match self {
            Interests::NotSubmitted => None,
            Interests::Submitted(ids) if ids.is_empty() => Some(EMPTY_SUBMISSION.to_owned()),
            Interests::Submitted(ids) => Some(
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }

    pub fn from_column(column: Option<&str>) -> Self {
        match column {
            None => Interests::NotSubmitted,
            Some(EMPTY_SUBMISSION) | Some("") => Interests::Submitted(vec![]),
            Some(list) => Interests::Submitted(
                list.split(',')
                    .filter_map(|id| id.trim().parse().ok())
                    .collect(),
            ),
        }
    }
}

impl From<Option<Vec<i64>>> for Interests {
    fn from(ids: Option<Vec<i64>>) -> Self {
        ids.map_or(Interests::NotSubmitted, Interests::Submitted)
    }
}

impl From<Interests> for Option<Vec<i64>> {
    fn from(interests: Interests) -> Self {
        match interests {
            Interests::NotSubmitted => None,
            Interests::Submitted(ids) => Some(ids),
        }
    }
}

/// A single attendee of one event
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    /// Sequential ID, unique per (event, gender)
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    /// Lowercase email, unique per event
    pub email: String,
    pub gender: Gender,
    pub in_attendance: bool,
    pub interests: Interests,
    pub feedback: Option<String>,
    pub referral_info: Option<String>,
    pub website_feedback: Option<String>,
    pub notes: Option<String>,
    pub cell_phone: Option<String>,
    pub send_contact_to_non_mutual: Option<bool>,
}

impl Attendee {
    pub fn new(
        id: i64,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        gender: Gender,
    ) -> Self {
        Attendee {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            gender,
            in_attendance: false,
            interests: Interests::NotSubmitted,
            feedback: None,
            referral_info: None,
            website_feedback: None,
            notes: None,
            cell_phone: None,
            send_contact_to_non_mutual: None,
        }
    }

    pub fn shares_contact(&self) -> bool {
        self.send_contact_to_non_mutual.unwrap_or(false)
    }
}

/// Fields written by a match form submission. Resubmitting overwrites all of them.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct Submission {
    pub interests: Vec<i64>,
    pub feedback: Option<String>,
    pub referral_info: Option<String>,
    pub website_feedback: Option<String>,
    pub notes: Option<String>,
    pub cell_phone: Option<String>,
    pub send_contact_to_non_mutual: bool,
}

/// Name and email a caller claims to be
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl Identity {
    /// True if the given record has this email and the same names, ignoring case.
    pub fn is(&self, first_name: &str, last_name: &str, email: &str) -> bool {
        email == self.email
            && normalize_string(first_name) == normalize_string(&self.first_name)
            && normalize_string(last_name) == normalize_string(&self.last_name)
    }
}

/// An attendee as shown to other attendees
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct PublicAttendee {
    pub name: String,
    pub id: i64,
}

/// Name of `attendee` as shown next to the rest of `pool`.
///
/// Bare first name, unless someone else in the pool has the same first name. Then one
/// character of the last name is added, or two if a collision shares the last initial.
pub fn public_name(attendee: &Attendee, pool: &[Attendee]) -> String {
    let initial = attendee.last_name.chars().next();
    let mut colliding = pool
        .iter()
        .filter(|a| a.first_name == attendee.first_name && a.last_name != attendee.last_name)
        .peekable();

    if colliding.peek().is_none() {
        return attendee.first_name.clone();
    }

    let length = if colliding.any(|a| a.last_name.chars().next() == initial) {
        2
    } else {
        1
    };

    let suffix: String = attendee.last_name.chars().take(length).collect();
    format!("{} {}", attendee.first_name, suffix)
        .trim_end()
        .to_owned()
}

/// Attendees of the opposite pool of `viewer`, with redacted names.
pub fn make_public_attendees(roster: &[Attendee], viewer: Gender) -> Vec<PublicAttendee> {
    let pool = opposite_pool(roster, viewer);
    pool.iter()
        .map(|a| PublicAttendee {
            name: public_name(a, &pool),
            id: a.id,
        })
        .collect()
}

/// Attendees `viewer` may select, ordered by ID.
pub fn opposite_pool(roster: &[Attendee], viewer: Gender) -> Vec<Attendee> {
    let Some(opposite) = viewer.opposite() else {
        return vec![];
    };

    let mut pool: Vec<Attendee> = roster
        .iter()
        .filter(|a| a.gender == opposite)
        .cloned()
        .collect();
    pool.sort_by_key(|a| a.id);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attendee(id: i64, first: &str, last: &str) -> Attendee {
        Attendee::new(
            id,
            first,
            last,
            format!("{}.{}@example.org", first, last).to_lowercase(),
            Gender::Female,
        )
    }

    fn names(pool: &[Attendee]) -> Vec<String> {
        pool.iter().map(|a| public_name(a, pool)).collect()
    }

    #[test]
    fn test_unique_first_names() {
        let pool = vec![attendee(1, "Sam", "Lee"), attendee(2, "Alex", "Lee")];
        assert_eq!(names(&pool), vec!["Sam", "Alex"]);
    }

    #[test]
    fn test_collision_distinct_initials() {
        let pool = vec![attendee(1, "Sam", "Lee"), attendee(2, "Sam", "Kim")];
        assert_eq!(names(&pool), vec!["Sam L", "Sam K"]);
    }

    #[test]
    fn test_collision_shared_initial() {
        let pool = vec![attendee(1, "Sam", "Lee"), attendee(2, "Sam", "Lin")];
        assert_eq!(names(&pool), vec!["Sam Le", "Sam Li"]);

        let pool = vec![
            attendee(1, "Sam", "Lee"),
            attendee(2, "Sam", "Lin"),
            attendee(3, "Sam", "Kim"),
        ];
        assert_eq!(names(&pool), vec!["Sam Le", "Sam Li", "Sam K"]);
    }

    #[test]
    fn test_identical_names_are_not_collisions() {
        let pool = vec![attendee(1, "Sam", "Lee"), attendee(2, "Sam", "Lee")];
        assert_eq!(names(&pool), vec!["Sam", "Sam"]);
    }

    #[test]
    fn test_public_attendees_use_viewer_pool() {
        let mut roster = vec![
            attendee(1, "Sam", "Lee"),
            attendee(2, "Dana", "Fox"),
            Attendee::new(1, "Sam", "Lin", "sam.lin@example.org", Gender::Male),
            Attendee::new(1, "Jo", "Ray", "jo@example.org", Gender::Other),
        ];
        roster.reverse();

        // The male Sam does not collide with the female Sam shown to a male viewer
        assert_eq!(
            make_public_attendees(&roster, Gender::Male),
            vec![
                PublicAttendee {
                    name: "Sam".to_owned(),
                    id: 1
                },
                PublicAttendee {
                    name: "Dana".to_owned(),
                    id: 2
                },
            ]
        );
        assert!(make_public_attendees(&roster, Gender::Other).is_empty());
    }

    #[test]
    fn test_interest_columns() {
        assert_eq!(Interests::NotSubmitted.to_column(), None);
        assert_eq!(Interests::Submitted(vec![]).to_column().as_deref(), Some("--"));
        assert_eq!(
            Interests::Submitted(vec![2, 7]).to_column().as_deref(),
            Some("2,7")
        );

        assert_eq!(Interests::from_column(None), Interests::NotSubmitted);
        assert_eq!(Interests::from_column(Some("--")), Interests::Submitted(vec![]));
        assert_eq!(
            Interests::from_column(Some("3,12")),
            Interests::Submitted(vec![3, 12])
        );
    }

    #[test]
    fn test_interests_json() {
        assert_eq!(serde_json::to_string(&Interests::NotSubmitted).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&Interests::Submitted(vec![])).unwrap(),
            "[]"
        );
        let parsed: Interests = serde_json::from_str("[4]").unwrap();
        assert_eq!(parsed, Interests::Submitted(vec![4]));
    }

    #[test]
    fn test_identity() {
        let identity = Identity {
            first_name: "Sam".to_owned(),
            last_name: "Lee".to_owned(),
            email: "sam@example.org".to_owned(),
        };

        assert!(identity.is("sam", "LEE", "sam@example.org"));
        assert!(!identity.is("Sam", "Lee", "other@example.org"));
        assert!(!identity.is("Sam", "Lin", "sam@example.org"));
    }
}
