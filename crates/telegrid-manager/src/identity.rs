//! Registration identity resolution.
//!
//! A registering agent is matched against the current occupant of its
//! host-identity slot. The same UUID means a re-registration; a different
//! UUID means the prior occupant is stale and must be evicted before the
//! slot is reclaimed.

use uuid::Uuid;

/// Outcome of matching a registration against the host-identity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistrationDecision {
    /// The host-identity slot is free.
    New,
    /// The slot is held by the same UUID.
    ReRegister,
    /// The slot is held by a different agent, which must be deleted first.
    Evict { prior: Uuid },
}

pub(crate) fn resolve_registration(
    occupant: Option<Uuid>,
    declared: Uuid,
) -> RegistrationDecision {
    match occupant {
        None => RegistrationDecision::New,
        Some(prior) if prior == declared => RegistrationDecision::ReRegister,
        Some(prior) => RegistrationDecision::Evict { prior },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_slot_is_new() {
        assert_eq!(
            resolve_registration(None, Uuid::from_u128(1)),
            RegistrationDecision::New
        );
    }

    #[test]
    fn same_uuid_is_re_registration() {
        let id = Uuid::from_u128(1);
        assert_eq!(
            resolve_registration(Some(id), id),
            RegistrationDecision::ReRegister
        );
    }

    #[test]
    fn different_uuid_is_eviction() {
        let prior = Uuid::from_u128(1);
        assert_eq!(
            resolve_registration(Some(prior), Uuid::from_u128(2)),
            RegistrationDecision::Evict { prior }
        );
    }
}
