//! Relay dispatch: forward a completed transfer to its recipient.
//!
//! Forwarding is best effort. Frames are handed to the recipient's writer
//! in order and no acknowledgment is awaited from the recipient, but each
//! hand-off waits for room in the recipient's bounded queue: a recipient that
//! stops reading holds the sender at the next frame. If the recipient's
//! connection goes away mid-forward the remaining frames are dropped and the
//! failure is logged; the sender is not affected.

use crate::connection::{ClientId, ConnectionHandle};
use crate::error::{RelayError, Result};
use crate::protocol::{ACK_OK, RECIPIENT_NOT_FOUND, ServerMessage};
use crate::registry::Registry;
use crate::session::CompletedTransfer;

/// What happened to a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// All frames were queued to the recipient and the sender acknowledged
    Delivered {
        /// Recipient the files went to
        recipient: ClientId,
        /// Number of files forwarded
        files: usize,
    },
    /// Recipient disconnected while frames were being queued
    Dropped {
        /// Recipient that went away
        recipient: ClientId,
        /// Frames queued before the failure
        frames_sent: usize,
    },
    /// Recipient was not registered; the sender was told so
    Unresolved,
}

/// Forward `transfer` to its recipient and report back to `sender`.
///
/// # Errors
///
/// Returns [`RelayError::Transport`] only if the *sender's* connection is
/// gone; failures on the recipient side are reported in the outcome.
pub async fn dispatch(
    registry: &Registry,
    sender: &ConnectionHandle,
    transfer: CompletedTransfer,
) -> Result<DispatchOutcome> {
    let recipient = match &transfer.recipient {
        Some(id) => registry.lookup(id).await,
        None => None,
    };

    let Some(recipient) = recipient else {
        tracing::warn!(
            "Transfer from {} dropped: recipient {:?} not found",
            sender.id(),
            transfer.recipient.as_ref().map(ClientId::as_str)
        );
        sender
            .send_message(&ServerMessage::Error(RECIPIENT_NOT_FOUND.to_string()))
            .await?;
        return Ok(DispatchOutcome::Unresolved);
    };

    let files = transfer.files.len();
    let outcome = match forward(&recipient, transfer).await {
        Ok(frames) => {
            tracing::info!(
                "Relayed {} files ({} frames) from {} to {}",
                files,
                frames,
                sender.id(),
                recipient.id()
            );
            DispatchOutcome::Delivered {
                recipient: recipient.id().clone(),
                files,
            }
        }
        Err((frames_sent, e)) => {
            tracing::warn!(
                "Relay from {} to {} cut short after {} frames: {}",
                sender.id(),
                recipient.id(),
                frames_sent,
                e
            );
            DispatchOutcome::Dropped {
                recipient: recipient.id().clone(),
                frames_sent,
            }
        }
    };

    sender
        .send_message(&ServerMessage::Message(ACK_OK.to_string()))
        .await?;
    Ok(outcome)
}

/// Queue the count, then each file's metadata followed by its payload.
async fn forward(
    recipient: &ConnectionHandle,
    transfer: CompletedTransfer,
) -> std::result::Result<usize, (usize, RelayError)> {
    let mut sent = 0;

    recipient
        .send_message(&ServerMessage::FilesLength(transfer.expected))
        .await
        .map_err(|e| (sent, e))?;
    sent += 1;

    for unit in transfer.files {
        if let Some(metadata) = unit.metadata {
            recipient
                .send_message(&ServerMessage::MetaData(metadata))
                .await
                .map_err(|e| (sent, e))?;
            sent += 1;
        }
        if let Some(payload) = unit.payload {
            recipient
                .send_binary(payload)
                .await
                .map_err(|e| (sent, e))?;
            sent += 1;
        }
    }

    Ok(sent)
}
