//! Seat assignment for a session: two playable seats bound first-come,
//! everyone after that an observer. All functions here are pure
//! read-modify-write over [`SeatAssignment`]; callers serialize access per
//! session and persist the result through a [`crate::store::SeatRegistry`].

use serde::{Deserialize, Serialize};

use crate::rules::Side;
use crate::store::now_millis;

/// A bound participant. The identity is the caller-supplied opaque token;
/// the label is display-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatHolder {
    pub identity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub bound_at: i64,
}

impl SeatHolder {
    pub fn new(identity: impl Into<String>, label: Option<String>) -> Self {
        SeatHolder {
            identity: identity.into(),
            label,
            bound_at: now_millis(),
        }
    }
}

/// What a participant is to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatRole {
    First,
    Second,
    Observer,
}

/// Result of running an identity through the binding ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindOutcome {
    pub role: SeatRole,
    /// Whether the assignment was mutated and must be persisted
    pub changed: bool,
}

/// The complete seat picture for one session, persisted as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeatAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first: Option<SeatHolder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub second: Option<SeatHolder>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub observers: Vec<SeatHolder>,
}

impl SeatAssignment {
    pub fn holder(&self, side: Side) -> Option<&SeatHolder> {
        match side {
            Side::First => self.first.as_ref(),
            Side::Second => self.second.as_ref(),
        }
    }

    pub fn both_bound(&self) -> bool {
        self.first.is_some() && self.second.is_some()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// The role an identity already has, if any.
    pub fn role_of(&self, identity: &str) -> Option<SeatRole> {
        if self.is(Side::First, identity) {
            Some(SeatRole::First)
        } else if self.is(Side::Second, identity) {
            Some(SeatRole::Second)
        } else if self.observers.iter().any(|o| o.identity == identity) {
            Some(SeatRole::Observer)
        } else {
            None
        }
    }

    fn is(&self, side: Side, identity: &str) -> bool {
        self.holder(side).map_or(false, |h| h.identity == identity)
    }

    /// The binding ladder. Returning identities keep their role; a new
    /// identity takes the lowest open seat, or joins the observers once
    /// both seats are taken. A returning participant may change its label;
    /// nothing else about an existing binding ever changes.
    pub fn bind(&mut self, identity: &str, label: Option<&str>) -> BindOutcome {
        let label = normalize_label(label);

        if let Some(role) = self.role_of(identity) {
            let changed = self.update_label(role, identity, label);
            return BindOutcome { role, changed };
        }

        let role = if self.first.is_none() {
            self.first = Some(SeatHolder::new(identity, label));
            SeatRole::First
        } else if self.second.is_none() {
            self.second = Some(SeatHolder::new(identity, label));
            SeatRole::Second
        } else {
            self.observers.push(SeatHolder::new(identity, label));
            SeatRole::Observer
        };
        BindOutcome {
            role,
            changed: true,
        }
    }

    fn update_label(&mut self, role: SeatRole, identity: &str, label: Option<String>) -> bool {
        if label.is_none() {
            // Absent label on a re-poll means "no change", not "clear it"
            return false;
        }
        let holder = match role {
            SeatRole::First => self.first.as_mut(),
            SeatRole::Second => self.second.as_mut(),
            SeatRole::Observer => self.observers.iter_mut().find(|o| o.identity == identity),
        };
        match holder {
            Some(h) if h.label != label => {
                h.label = label;
                true
            }
            _ => false,
        }
    }
}

fn normalize_label(label: Option<&str>) -> Option<String> {
    let trimmed = label?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut owned: String = trimmed.chars().take(64).collect();
    owned.shrink_to_fit();
    Some(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_two_identities_take_the_seats_in_order() {
        let mut seats = SeatAssignment::default();

        let a = seats.bind("alice-token", Some("Alice"));
        assert_eq!(a.role, SeatRole::First);
        assert!(a.changed);

        let b = seats.bind("bob-token", None);
        assert_eq!(b.role, SeatRole::Second);
        assert!(seats.both_bound());

        let c = seats.bind("carol-token", Some("Carol"));
        assert_eq!(c.role, SeatRole::Observer);
        assert_eq!(seats.observer_count(), 1);
    }

    #[test]
    fn returning_identity_keeps_its_seat() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", Some("Alice"));

        let again = seats.bind("alice-token", Some("Alice"));
        assert_eq!(again.role, SeatRole::First);
        assert!(!again.changed);
        assert!(seats.second.is_none(), "re-poll must not spill into the second seat");
    }

    #[test]
    fn repoll_may_rename_but_not_clear_a_label() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", Some("Alice"));

        let renamed = seats.bind("alice-token", Some("  Alice the Bold  "));
        assert!(renamed.changed);
        assert_eq!(
            seats.first.as_ref().and_then(|h| h.label.as_deref()),
            Some("Alice the Bold")
        );

        let silent = seats.bind("alice-token", None);
        assert!(!silent.changed);
        assert_eq!(
            seats.first.as_ref().and_then(|h| h.label.as_deref()),
            Some("Alice the Bold")
        );
    }

    #[test]
    fn labels_are_trimmed_and_capped() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", Some("   "));
        assert_eq!(seats.first.as_ref().and_then(|h| h.label.clone()), None);

        let long = "x".repeat(80);
        seats.bind("bob-token", Some(&long));
        let stored = seats
            .second
            .as_ref()
            .and_then(|h| h.label.clone())
            .unwrap_or_default();
        assert_eq!(stored.chars().count(), 64);
    }

    #[test]
    fn roles_resolve_by_identity_not_arrival_order() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", None);
        seats.bind("bob-token", None);
        seats.bind("carol-token", None);

        assert_eq!(seats.role_of("alice-token"), Some(SeatRole::First));
        assert_eq!(seats.role_of("bob-token"), Some(SeatRole::Second));
        assert_eq!(seats.role_of("carol-token"), Some(SeatRole::Observer));
        assert_eq!(seats.role_of("nobody"), None);
    }

    #[test]
    fn observer_repolls_do_not_duplicate_the_entry() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", None);
        seats.bind("bob-token", None);
        seats.bind("carol-token", None);

        let again = seats.bind("carol-token", None);
        assert_eq!(again.role, SeatRole::Observer);
        assert!(!again.changed);
        assert_eq!(seats.observer_count(), 1);
    }

    #[test]
    fn holders_resolve_by_side() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", None);
        assert_eq!(
            seats.holder(Side::First).map(|h| h.identity.as_str()),
            Some("alice-token")
        );
        assert!(seats.holder(Side::Second).is_none());
    }

    #[test]
    fn assignment_serializes_with_wire_field_names() {
        let mut seats = SeatAssignment::default();
        seats.bind("alice-token", Some("Alice"));
        let json = serde_json::to_value(&seats).expect("serialize");
        assert_eq!(json["first"]["identity"], "alice-token");
        assert!(json["first"]["boundAt"].is_i64());
        assert!(json.get("second").is_none());
    }
}
