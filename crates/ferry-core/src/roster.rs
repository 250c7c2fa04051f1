//! Roster broadcast: tell every connected client who else is online.

use crate::connection::{ClientId, ConnectionHandle};
use crate::protocol::ServerMessage;

/// Outcome of one roster broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterReport {
    /// Clients whose roster update was queued
    pub delivered: usize,
    /// Clients whose connection had gone away or whose queue was full
    pub failed: Vec<ClientId>,
}

/// Roster as seen by `viewer`: every member except itself, in member order.
#[must_use]
pub fn roster_for(members: &[ClientId], viewer: &ClientId) -> Vec<ClientId> {
    members.iter().filter(|id| *id != viewer).cloned().collect()
}

/// Send each member the roster of all other members.
///
/// `members` must be a consistent snapshot of the registry. Runs under the
/// registry lock, so sends never wait: a member whose queue is full misses
/// this update. A failed send only affects that member; the rest still
/// receive their update.
pub fn broadcast(members: &[ConnectionHandle]) -> RosterReport {
    let ids: Vec<ClientId> = members.iter().map(|h| h.id().clone()).collect();
    let mut report = RosterReport::default();

    for handle in members {
        let message = ServerMessage::Clients(roster_for(&ids, handle.id()));
        match handle.try_send_message(&message) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                tracing::warn!("Roster update to {} dropped: {}", handle.id(), e);
                report.failed.push(handle.id().clone());
            }
        }
    }

    tracing::debug!(
        "Roster broadcast to {} clients ({} failed)",
        report.delivered,
        report.failed.len()
    );
    report
}
