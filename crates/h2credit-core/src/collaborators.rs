use crate::error::H2Error;
use crate::types::{MarketplaceListing, SubmissionReceipt, VerificationSubmission};
use async_trait::async_trait;

/// Records finalised verdicts. Implementations may be remote; callers bound them with a timeout.
#[async_trait]
pub trait PersistenceCollaborator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn submit_verification(
        &self,
        submission: &VerificationSubmission,
    ) -> Result<SubmissionReceipt, H2Error>;
}

/// Lists issued credits for sale.
#[async_trait]
pub trait MarketplaceCollaborator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish_credit(
        &self,
        listing: &MarketplaceListing,
    ) -> Result<SubmissionReceipt, H2Error>;
}
