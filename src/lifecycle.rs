//! Case lifecycle rules.
//!
//! Report status is a closed enumeration with an explicit transition table:
//! forward moves only, same-state writes are no-ops, and backward moves are
//! rejected everywhere except the dedicated reopen operation. Archival is
//! orthogonal and is not part of the table.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Pending,
    Assigned,
    Ongoing,
    Resolved,
    Closed,
}

impl CaseStatus {
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Assigned,
        Self::Ongoing,
        Self::Resolved,
        Self::Closed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Assigned => "Assigned",
            Self::Ongoing => "Ongoing",
            Self::Resolved => "Resolved",
            Self::Closed => "Closed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Assigned" => Ok(Self::Assigned),
            "Ongoing" => Ok(Self::Ongoing),
            "Resolved" => Ok(Self::Resolved),
            "Closed" => Ok(Self::Closed),
            other => Err(Error::validation(format!("unknown status `{other}`"))),
        }
    }

    /// Position in the workflow, used for the forward-only rule.
    const fn stage(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Assigned => 1,
            Self::Ongoing => 2,
            Self::Resolved => 3,
            Self::Closed => 4,
        }
    }

    /// Entering this status requires a resolution record on the report.
    pub const fn requires_resolution(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasePriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl CasePriority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Normal => "Normal",
            Self::High => "High",
            Self::Urgent => "Urgent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "Low" => Ok(Self::Low),
            "Normal" => Ok(Self::Normal),
            "High" => Ok(Self::High),
            "Urgent" => Ok(Self::Urgent),
            other => Err(Error::validation(format!("unknown priority `{other}`"))),
        }
    }
}

/// Validate a regular status write. Returns `false` when the write is a
/// same-state no-op, `true` when it is a legal forward move.
pub fn validate_transition(from: CaseStatus, to: CaseStatus) -> Result<bool, Error> {
    if from == to {
        return Ok(false);
    }
    if to.stage() > from.stage() {
        return Ok(true);
    }
    Err(Error::validation(format!(
        "cannot move case from {} back to {}; reopen it instead",
        from.as_str(),
        to.as_str()
    )))
}

/// Validate a reopen: only Resolved/Closed cases may reopen, and only to
/// Pending or Ongoing.
pub fn validate_reopen(from: CaseStatus, to: CaseStatus) -> Result<(), Error> {
    if !matches!(from, CaseStatus::Resolved | CaseStatus::Closed) {
        return Err(Error::validation(format!(
            "only resolved or closed cases can be reopened, not {}",
            from.as_str()
        )));
    }
    if !matches!(to, CaseStatus::Pending | CaseStatus::Ongoing) {
        return Err(Error::validation(format!(
            "cases reopen to Pending or Ongoing, not {}",
            to.as_str()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_transitions_allowed() {
        assert!(validate_transition(CaseStatus::Pending, CaseStatus::Assigned).unwrap());
        assert!(validate_transition(CaseStatus::Assigned, CaseStatus::Ongoing).unwrap());
        assert!(validate_transition(CaseStatus::Ongoing, CaseStatus::Resolved).unwrap());
        // Skipping stages is still a forward move.
        assert!(validate_transition(CaseStatus::Pending, CaseStatus::Resolved).unwrap());
    }

    #[test]
    fn same_state_is_noop() {
        assert!(!validate_transition(CaseStatus::Ongoing, CaseStatus::Ongoing).unwrap());
    }

    #[test]
    fn backward_transitions_rejected() {
        assert!(validate_transition(CaseStatus::Resolved, CaseStatus::Pending).is_err());
        assert!(validate_transition(CaseStatus::Closed, CaseStatus::Ongoing).is_err());
        assert!(validate_transition(CaseStatus::Assigned, CaseStatus::Pending).is_err());
    }

    #[test]
    fn reopen_rules() {
        assert!(validate_reopen(CaseStatus::Resolved, CaseStatus::Pending).is_ok());
        assert!(validate_reopen(CaseStatus::Closed, CaseStatus::Ongoing).is_ok());
        assert!(validate_reopen(CaseStatus::Ongoing, CaseStatus::Pending).is_err());
        assert!(validate_reopen(CaseStatus::Resolved, CaseStatus::Closed).is_err());
    }

    #[test]
    fn terminal_states_require_resolution() {
        assert!(CaseStatus::Resolved.requires_resolution());
        assert!(CaseStatus::Closed.requires_resolution());
        assert!(!CaseStatus::Ongoing.requires_resolution());
    }

    #[test]
    fn unknown_strings_rejected() {
        assert!(CaseStatus::parse("In Progress").is_err());
        assert!(CasePriority::parse("Critical").is_err());
    }
}
