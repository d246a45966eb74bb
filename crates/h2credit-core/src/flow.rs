use crate::error::H2Error;
use serde::{Deserialize, Serialize};

/// Lifecycle status of one verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
    Error,
    CreditGenerated,
}

impl VerificationStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Error => "ERROR",
            Self::CreditGenerated => "CREDIT_GENERATED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Error | Self::CreditGenerated)
    }
}

/// Enforces PENDING -> PROCESSING -> {APPROVED, REJECTED, ERROR} and APPROVED -> CREDIT_GENERATED.
///
/// A machine lives for one request only. Terminal states are never left; resubmitting starts
/// a fresh machine.
#[derive(Debug, Clone)]
pub struct VerificationStateMachine {
    request_id: String,
    status: VerificationStatus,
    history: Vec<VerificationStatus>,
}

impl VerificationStateMachine {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            status: VerificationStatus::Pending,
            history: vec![VerificationStatus::Pending],
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn status(&self) -> VerificationStatus {
        self.status
    }

    /// Every status visited so far, starting with PENDING.
    pub fn history(&self) -> &[VerificationStatus] {
        &self.history
    }

    pub fn mark_processing(&mut self) -> Result<(), H2Error> {
        self.advance(VerificationStatus::Pending, VerificationStatus::Processing)
    }

    pub fn mark_approved(&mut self) -> Result<(), H2Error> {
        self.advance(VerificationStatus::Processing, VerificationStatus::Approved)
    }

    pub fn mark_rejected(&mut self) -> Result<(), H2Error> {
        self.advance(VerificationStatus::Processing, VerificationStatus::Rejected)
    }

    /// Errors may be raised before processing starts (e.g. an unreadable submission).
    pub fn mark_error(&mut self) -> Result<(), H2Error> {
        match self.status {
            VerificationStatus::Pending | VerificationStatus::Processing => {
                self.enter(VerificationStatus::Error);
                Ok(())
            }
            other => Err(H2Error::stage_violation(
                VerificationStatus::Processing.name(),
                other.name(),
            )),
        }
    }

    pub fn mark_credit_generated(&mut self) -> Result<(), H2Error> {
        self.advance(
            VerificationStatus::Approved,
            VerificationStatus::CreditGenerated,
        )
    }

    fn advance(
        &mut self,
        expected_current: VerificationStatus,
        next: VerificationStatus,
    ) -> Result<(), H2Error> {
        if self.status != expected_current {
            return Err(H2Error::stage_violation(
                expected_current.name(),
                self.status.name(),
            ));
        }
        self.enter(next);
        Ok(())
    }

    fn enter(&mut self, next: VerificationStatus) {
        self.status = next;
        self.history.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approved_path_reaches_credit_generated() {
        let mut machine = VerificationStateMachine::new("VREQ_00000001");
        machine.mark_processing().unwrap();
        machine.mark_approved().unwrap();
        machine.mark_credit_generated().unwrap();

        assert_eq!(machine.status(), VerificationStatus::CreditGenerated);
        assert!(machine.status().is_terminal());
        assert_eq!(
            machine.history(),
            &[
                VerificationStatus::Pending,
                VerificationStatus::Processing,
                VerificationStatus::Approved,
                VerificationStatus::CreditGenerated,
            ]
        );
    }

    #[test]
    fn rejected_is_terminal() {
        let mut machine = VerificationStateMachine::new("VREQ_00000002");
        machine.mark_processing().unwrap();
        machine.mark_rejected().unwrap();

        let err = machine.mark_credit_generated().unwrap_err();
        assert!(err
            .to_string()
            .contains("expected 'APPROVED', got 'REJECTED'"));
        assert!(machine.mark_error().is_err());
        assert_eq!(machine.status(), VerificationStatus::Rejected);
    }

    #[test]
    fn cannot_skip_processing() {
        let mut machine = VerificationStateMachine::new("VREQ_00000003");
        let err = machine.mark_approved().unwrap_err();
        assert!(err
            .to_string()
            .contains("expected 'PROCESSING', got 'PENDING'"));
    }

    #[test]
    fn error_from_pending_is_allowed() {
        let mut machine = VerificationStateMachine::new("VREQ_00000004");
        machine.mark_error().unwrap();
        assert_eq!(
            machine.history(),
            &[VerificationStatus::Pending, VerificationStatus::Error]
        );
        assert!(machine.mark_processing().is_err());
    }

    #[test]
    fn status_serialises_in_upper_snake_case() {
        assert_eq!(
            serde_json::to_string(&VerificationStatus::CreditGenerated).unwrap(),
            "\"CREDIT_GENERATED\""
        );
    }
}
