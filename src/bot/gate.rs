//! Channel membership gate
//!
//! Every interaction except button presses first checks that the user is
//! subscribed to the required channel.

use super::transport::{ChatTransport, TransportError};
use crate::config::ChannelRef;
use teloxide::types::UserId;
use tracing::{debug, warn};

/// A user's standing in the required channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipStatus {
    /// Regular subscriber
    Member,
    /// Channel administrator
    Administrator,
    /// Channel owner
    Creator,
    /// Left, banned, restricted, or never joined
    Other,
}

impl MembershipStatus {
    /// Whether this status grants access to the bot
    #[must_use]
    pub const fn is_subscribed(self) -> bool {
        matches!(self, Self::Member | Self::Administrator | Self::Creator)
    }
}

/// Result of the membership check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// User may proceed
    Subscribed,
    /// User was resolved but is not a member
    NotSubscribed,
    /// The membership query itself failed
    Unverifiable(String),
}

impl GateOutcome {
    /// Classify the result of a membership query
    #[must_use]
    pub fn classify(result: Result<MembershipStatus, TransportError>) -> Self {
        match result {
            Ok(status) if status.is_subscribed() => Self::Subscribed,
            Ok(_) => Self::NotSubscribed,
            Err(e) => Self::Unverifiable(e.to_string()),
        }
    }
}

/// Check whether `user_id` belongs to `channel`
pub async fn check_membership<T>(
    transport: &T,
    channel: &ChannelRef,
    user_id: UserId,
) -> GateOutcome
where
    T: ChatTransport + ?Sized,
{
    let outcome = GateOutcome::classify(transport.membership(channel, user_id).await);
    match &outcome {
        GateOutcome::Unverifiable(reason) => {
            warn!(
                user_id = user_id.0,
                channel = ?channel,
                error = %reason,
                "Membership check failed"
            );
        }
        other => debug!(user_id = user_id.0, outcome = ?other, "Membership checked"),
    }
    outcome
}
