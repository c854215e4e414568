//! Redaction of summaries shown to someone other than their owner.

use chrono::{DateTime, Duration, Utc};

use crate::error::SummaryError;
use crate::heartbeat::SummaryKind;
use crate::summary::Summary;
use crate::types::UserId;
use crate::user::User;

fn is_owner(requester: Option<&UserId>, owner: &User) -> bool {
    requester == Some(&owner.id)
}

/// Clears every category the owner does not share.
///
/// Owners see everything. Anonymous requesters and other users see only the
/// shared categories, and never entities.
pub fn apply_sharing(mut summary: Summary, requester: Option<&UserId>, owner: &User) -> Summary {
    if is_owner(requester, owner) {
        return summary;
    }
    for kind in SummaryKind::ALL {
        if !owner.shares(kind) {
            summary.items_mut(kind).clear();
        }
    }
    summary
}

/// Rejects non-owner requests starting before the owner's shared window.
pub fn check_share_window(
    from: DateTime<Utc>,
    requester: Option<&UserId>,
    owner: &User,
    now: DateTime<Utc>,
) -> Result<(), SummaryError> {
    if is_owner(requester, owner) || owner.share_data_max_days < 0 {
        return Ok(());
    }
    let earliest = now - Duration::days(owner.share_data_max_days);
    if from < earliest {
        return Err(SummaryError::RangeTooBroad {
            max_days: owner.share_data_max_days,
        });
    }
    Ok(())
}
