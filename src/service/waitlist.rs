//! Seat placement and waitlist maintenance.
//!
//! These are the only functions that move a subscription into or out of
//! `waitlisted`. All of them run inside the caller's transaction, after
//! the event row has been locked, and keep two properties intact:
//!
//! - the number of `registered` rows never exceeds the event quota;
//! - waitlist positions of an event are exactly `1..=n`.

use crate::domain::{EventId, EventRecord, Placement, Subscription, SubscriptionStatus};
use crate::error::GatewayError;
use crate::persistence::SubscriptionTx;

/// Decides where a new or restored subscription lands, from a recount
/// taken inside the transaction.
///
/// # Errors
///
/// Propagates storage errors; returns [`GatewayError::Integrity`] if the
/// waitlist cannot grow any further.
pub async fn place(
    tx: &mut dyn SubscriptionTx,
    event: &EventRecord,
) -> Result<Placement, GatewayError> {
    let registered = tx
        .count_with_status(event.id, SubscriptionStatus::Registered)
        .await?;
    if registered < i64::from(event.quota) {
        return Ok(Placement::Registered);
    }

    let last = tx.max_waitlist_position(event.id).await?.unwrap_or(0);
    let next = last.checked_add(1).ok_or_else(|| {
        GatewayError::Integrity(format!("waitlist of event {} overflowed", event.id))
    })?;
    Ok(Placement::Waitlisted(next))
}

/// Moves the head of the waitlist into a freed seat.
///
/// Returns the promoted subscription, or `None` when the waitlist is
/// empty.
///
/// # Errors
///
/// Returns [`GatewayError::Integrity`] if the head of the waitlist has no
/// position or vanishes mid-transaction; propagates storage errors.
pub async fn promote_next(
    tx: &mut dyn SubscriptionTx,
    event_id: EventId,
) -> Result<Option<Subscription>, GatewayError> {
    let Some(head) = tx.first_waitlisted(event_id).await? else {
        return Ok(None);
    };
    let Some(position) = head.position else {
        return Err(GatewayError::Integrity(format!(
            "waitlisted subscription {} has no position",
            head.id
        )));
    };

    let promoted = tx
        .write_state(head.id, SubscriptionStatus::Registered, None)
        .await?
        .ok_or_else(|| {
            GatewayError::Integrity(format!(
                "subscription {} disappeared during promotion",
                head.id
            ))
        })?;
    let shifted = tx.close_waitlist_gap(event_id, position).await?;

    tracing::info!(
        event_id = %event_id,
        subscription_id = %promoted.id,
        user_id = %promoted.user_id,
        from_position = position,
        shifted,
        "promoted from waitlist"
    );
    Ok(Some(promoted))
}

/// Applies the waitlist side effect of `leaving` giving up its place.
///
/// A registered subscription frees a seat, which goes to the head of the
/// waitlist. A waitlisted subscription leaves a gap, which is closed.
/// Other states hold no seat and no position. Returns the promoted
/// subscription, if any.
///
/// # Errors
///
/// Returns [`GatewayError::Integrity`] if a waitlisted row has no
/// position; propagates storage errors.
pub async fn release(
    tx: &mut dyn SubscriptionTx,
    leaving: &Subscription,
) -> Result<Option<Subscription>, GatewayError> {
    match leaving.status {
        SubscriptionStatus::Registered => promote_next(tx, leaving.event_id).await,
        SubscriptionStatus::Waitlisted => {
            let position = leaving.position.ok_or_else(|| {
                GatewayError::Integrity(format!(
                    "waitlisted subscription {} has no position",
                    leaving.id
                ))
            })?;
            tx.close_waitlist_gap(leaving.event_id, position).await?;
            Ok(None)
        }
        SubscriptionStatus::Cancelled | SubscriptionStatus::Attended => Ok(None),
    }
}
