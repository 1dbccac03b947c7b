use super::record::PaymentStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State-changing requests accepted by the mutation gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Confirm,
    Approve,
    Reject,
    Refund,
    Cancel,
    Retry,
    Star,
    Unstar,
    Flag,
    Unflag,
}

impl MutationAction {
    /// Status the record ends in, or `None` for actions that leave status alone.
    pub fn target(self) -> Option<PaymentStatus> {
        match self {
            MutationAction::Confirm => Some(PaymentStatus::Completed),
            MutationAction::Approve => Some(PaymentStatus::Approved),
            MutationAction::Reject => Some(PaymentStatus::Failed),
            MutationAction::Refund => Some(PaymentStatus::Refunded),
            MutationAction::Cancel => Some(PaymentStatus::Cancelled),
            MutationAction::Retry => Some(PaymentStatus::Pending),
            MutationAction::Star
            | MutationAction::Unstar
            | MutationAction::Flag
            | MutationAction::Unflag => None,
        }
    }

    /// Statuses from which the action may be applied. Empty means any.
    pub fn legal_origins(self) -> &'static [PaymentStatus] {
        match self {
            MutationAction::Confirm | MutationAction::Approve | MutationAction::Reject => {
                &[PaymentStatus::Pending]
            }
            MutationAction::Refund => &[PaymentStatus::Completed],
            MutationAction::Cancel => &[PaymentStatus::Pending, PaymentStatus::Approved],
            MutationAction::Retry => &[PaymentStatus::Failed],
            MutationAction::Star
            | MutationAction::Unstar
            | MutationAction::Flag
            | MutationAction::Unflag => &[],
        }
    }

    pub fn allows(self, from: PaymentStatus) -> bool {
        let origins = self.legal_origins();
        origins.is_empty() || origins.contains(&from)
    }

    /// Whether sibling records of the same order follow the primary record.
    pub fn cascades(self) -> bool {
        matches!(self, MutationAction::Confirm | MutationAction::Approve)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MutationAction::Confirm => "confirm",
            MutationAction::Approve => "approve",
            MutationAction::Reject => "reject",
            MutationAction::Refund => "refund",
            MutationAction::Cancel => "cancel",
            MutationAction::Retry => "retry",
            MutationAction::Star => "star",
            MutationAction::Unstar => "unstar",
            MutationAction::Flag => "flag",
            MutationAction::Unflag => "unflag",
        }
    }
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confirm" | "accept" => Ok(MutationAction::Confirm),
            "approve" => Ok(MutationAction::Approve),
            "reject" | "fail" => Ok(MutationAction::Reject),
            "refund" => Ok(MutationAction::Refund),
            "cancel" => Ok(MutationAction::Cancel),
            "retry" => Ok(MutationAction::Retry),
            "star" => Ok(MutationAction::Star),
            "unstar" => Ok(MutationAction::Unstar),
            "flag" => Ok(MutationAction::Flag),
            "unflag" => Ok(MutationAction::Unflag),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_may_settle() {
        for action in [
            MutationAction::Confirm,
            MutationAction::Approve,
            MutationAction::Reject,
        ] {
            for status in PaymentStatus::ALL {
                assert_eq!(action.allows(status), status == PaymentStatus::Pending);
            }
        }
    }

    #[test]
    fn test_annotations_allowed_from_any_status() {
        for status in PaymentStatus::ALL {
            assert!(MutationAction::Flag.allows(status));
            assert!(MutationAction::Unstar.allows(status));
        }
        assert_eq!(MutationAction::Star.target(), None);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("accept".parse(), Ok(MutationAction::Confirm));
        assert_eq!("APPROVE".parse(), Ok(MutationAction::Approve));
        assert!("delete".parse::<MutationAction>().is_err());
    }
}
