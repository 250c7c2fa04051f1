//! Per-connection transfer session state machine.
//!
//! A sender drives its session with control frames and binary payloads:
//!
//! ```text
//!   Idle ──recipient──▶ RecipientChosen
//!    │                       │
//!    └──files-length N>0─────┴──▶ CountDeclared ──meta-data / bytes──▶ Accumulating
//!                                      ▲                                   │
//!                                      └──────────files-length─────────────┤
//!                                                                          │
//!   Idle ◀──────────────── dispatch (Ready: payloads == N) ◀───────────────┘
//! ```
//!
//! `recipient` and `meta-data` are accepted in any state; metadata sent
//! before a count is held (reported as `Accumulating`) until the next
//! `files-length` discards it. Binary frames are dropped while no count is
//! declared. The session is owned by exactly one
//! connection task, so nothing here is synchronized.

use crate::connection::ClientId;
use crate::protocol::ControlFrame;
use serde_json::Value;
use std::mem;

/// One file within a transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUnit {
    /// Opaque per-file metadata, if the sender supplied any
    pub metadata: Option<Value>,
    /// File contents, once received
    pub payload: Option<Vec<u8>>,
}

impl FileUnit {
    /// Whether the payload has arrived
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

/// Observable state of a transfer session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing chosen, nothing declared
    Idle,
    /// Recipient recorded, no file count declared
    RecipientChosen,
    /// File count declared, nothing accumulated since
    CountDeclared,
    /// Metadata or payloads held, count not yet reached.
    ///
    /// Metadata sent before any `files-length` is held here too, until the
    /// next count declaration discards it.
    Accumulating,
}

/// Result of feeding one frame into a session
#[derive(Debug, PartialEq)]
pub enum Step {
    /// Frame applied; more frames expected
    Continue,
    /// Frame had no effect on the session
    Ignored,
    /// Declared count reached; the session has been reset
    Ready(CompletedTransfer),
}

/// A transfer whose payload count reached the declared count
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTransfer {
    /// Target chosen by the sender, if any
    pub recipient: Option<ClientId>,
    /// Declared file count
    pub expected: usize,
    /// Files in the order the sender declared them
    pub files: Vec<FileUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// No file count declared; binary frames are dropped
    Undeclared,
    /// `expected` payloads awaited, `filled` received so far
    Declared { expected: usize, filled: usize },
}

/// Transfer accumulation state for one connection
#[derive(Debug, Clone)]
pub struct TransferSession {
    recipient: Option<ClientId>,
    stage: Stage,
    pending: Vec<FileUnit>,
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferSession {
    /// Create an idle session
    #[must_use]
    pub fn new() -> Self {
        Self {
            recipient: None,
            stage: Stage::Undeclared,
            pending: Vec::new(),
        }
    }

    /// Apply a parsed control frame
    pub fn apply(&mut self, frame: ControlFrame) -> Step {
        match frame {
            ControlFrame::Recipient(id) => {
                self.choose_recipient(id);
                Step::Continue
            }
            ControlFrame::FilesLength(count) => {
                self.declare_count(count);
                Step::Continue
            }
            ControlFrame::MetaData(value) => {
                self.push_metadata(value);
                Step::Continue
            }
            ControlFrame::Unknown(_) => Step::Ignored,
        }
    }

    /// Record (or overwrite) the transfer target.
    ///
    /// The recipient is not checked against the registry until dispatch.
    pub fn choose_recipient(&mut self, id: ClientId) {
        self.recipient = Some(id);
    }

    /// Declare how many payloads make up the transfer.
    ///
    /// Discards anything accumulated so far. A count of zero returns the
    /// session to the undeclared stage.
    pub fn declare_count(&mut self, count: usize) {
        self.pending.clear();
        self.stage = if count == 0 {
            Stage::Undeclared
        } else {
            Stage::Declared {
                expected: count,
                filled: 0,
            }
        };
    }

    /// Append a new file slot carrying `metadata` and no payload yet.
    pub fn push_metadata(&mut self, metadata: Value) {
        self.pending.push(FileUnit {
            metadata: Some(metadata),
            payload: None,
        });
    }

    /// Attach a payload to the most recent file slot.
    ///
    /// With no slot pending, a metadata-less slot is created for it. When
    /// the number of slots holding a payload reaches the declared count the
    /// completed transfer is handed back and the session is reset.
    pub fn push_payload(&mut self, payload: Vec<u8>) -> Step {
        let Stage::Declared { expected, filled } = self.stage else {
            return Step::Ignored;
        };

        let filled = match self.pending.last_mut() {
            Some(unit) => {
                let was_empty = unit.payload.is_none();
                unit.payload = Some(payload);
                if was_empty { filled + 1 } else { filled }
            }
            None => {
                self.pending.push(FileUnit {
                    metadata: None,
                    payload: Some(payload),
                });
                filled + 1
            }
        };

        if filled == expected {
            return Step::Ready(self.take_completed(expected));
        }

        self.stage = Stage::Declared { expected, filled };
        Step::Continue
    }

    /// Discard everything and return to idle.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Current state of the session
    #[must_use]
    pub fn state(&self) -> TransferState {
        match self.stage {
            _ if !self.pending.is_empty() => TransferState::Accumulating,
            Stage::Declared { .. } => TransferState::CountDeclared,
            Stage::Undeclared if self.recipient.is_some() => TransferState::RecipientChosen,
            Stage::Undeclared => TransferState::Idle,
        }
    }

    /// Chosen recipient, if any
    #[must_use]
    pub fn recipient(&self) -> Option<&ClientId> {
        self.recipient.as_ref()
    }

    /// Declared file count (0 when none is declared)
    #[must_use]
    pub fn expected_count(&self) -> usize {
        match self.stage {
            Stage::Declared { expected, .. } => expected,
            Stage::Undeclared => 0,
        }
    }

    /// Number of pending slots that carry a payload
    #[must_use]
    pub fn filled_count(&self) -> usize {
        match self.stage {
            Stage::Declared { filled, .. } => filled,
            Stage::Undeclared => 0,
        }
    }

    /// Pending file slots, in declaration order
    #[must_use]
    pub fn pending(&self) -> &[FileUnit] {
        &self.pending
    }

    fn take_completed(&mut self, expected: usize) -> CompletedTransfer {
        let completed = CompletedTransfer {
            recipient: self.recipient.take(),
            expected,
            files: mem::take(&mut self.pending),
        };
        self.stage = Stage::Undeclared;
        completed
    }
}
