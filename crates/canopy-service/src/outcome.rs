//! Results of mutations that may complete in a degraded state.

use uuid::Uuid;

use canopy_core::AppError;

/// The value a mutation produced, plus any post-commit storage failures.
///
/// The relational change is always committed when an outcome is returned.
/// A non-empty `warnings` list means the object store lags behind; each
/// warning has a matching repair ticket that the repair worker retries.
#[derive(Debug)]
pub struct MutationOutcome<T> {
    /// What the operation produced.
    pub value: T,
    /// `InconsistentState` warnings for storage effects that failed.
    pub warnings: Vec<AppError>,
    /// Repair tickets opened for those effects.
    pub repair_tickets: Vec<Uuid>,
}

impl<T> MutationOutcome<T> {
    /// An outcome with no warnings.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
            repair_tickets: Vec::new(),
        }
    }

    /// Whether any storage effect failed.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Record a failed storage effect.
    pub fn degrade(&mut self, warning: AppError, ticket: Option<Uuid>) {
        self.warnings.push(warning);
        if let Some(ticket) = ticket {
            self.repair_tickets.push(ticket);
        }
    }

    /// Drop the warnings and keep the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Transform the value, keeping the warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationOutcome<U> {
        MutationOutcome {
            value: f(self.value),
            warnings: self.warnings,
            repair_tickets: self.repair_tickets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrade_keeps_value() {
        let mut outcome = MutationOutcome::clean(7);
        assert!(!outcome.is_degraded());
        let ticket = Uuid::new_v4();
        outcome.degrade(AppError::inconsistent("dir missing"), Some(ticket));
        let mapped = outcome.map(|v| v * 2);
        assert!(mapped.is_degraded());
        assert_eq!(mapped.repair_tickets, vec![ticket]);
        assert_eq!(mapped.into_value(), 14);
    }
}
