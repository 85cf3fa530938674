use std::sync::Arc;

use chrono::Utc;

use crate::domain::repository::{InvitationRepository, ResetTokenRepository, TokenRepository};
use crate::error::{IdentityError, WithOp};
use crate::infra::rate_limit::RateLimiter;

/// Rows removed by one [`SweepExpiredUseCase`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub refresh_tokens: u64,
    pub invitations: u64,
    pub reset_tokens: u64,
    pub rate_limit_windows: u64,
}

pub struct SweepExpiredUseCase<T, I, P>
where
    T: TokenRepository,
    I: InvitationRepository,
    P: ResetTokenRepository,
{
    pub tokens: T,
    pub invitations: I,
    pub reset_tokens: P,
    pub limiter: Arc<RateLimiter>,
}

impl<T, I, P> SweepExpiredUseCase<T, I, P>
where
    T: TokenRepository,
    I: InvitationRepository,
    P: ResetTokenRepository,
{
    /// One pass over every store that accumulates expired rows. Used
    /// invitations are kept.
    pub async fn execute(&self) -> Result<SweepReport, IdentityError> {
        let now = Utc::now();
        let report = SweepReport {
            refresh_tokens: self.tokens.delete_expired(now).await.op("sweep_expired")?,
            invitations: self
                .invitations
                .delete_expired(now)
                .await
                .op("sweep_expired")?,
            reset_tokens: self
                .reset_tokens
                .delete_expired(now)
                .await
                .op("sweep_expired")?,
            rate_limit_windows: self.limiter.purge_expired_at(now),
        };

        tracing::info!(
            refresh_tokens = report.refresh_tokens,
            invitations = report.invitations,
            reset_tokens = report.reset_tokens,
            rate_limit_windows = report.rate_limit_windows,
            "expired records swept"
        );
        Ok(report)
    }
}
