use std::fmt;

use otapush_protocol::messages::SessionStartResponse;

/// Server-side upload session as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub total: u64,
    /// Contiguous bytes the device has committed; the only trusted resume point.
    pub have: u64,
}

impl From<SessionStartResponse> for Session {
    fn from(r: SessionStartResponse) -> Self {
        Self {
            id: r.id,
            total: r.total,
            have: r.have,
        }
    }
}

/// Lifecycle of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Negotiating,
    Transferring,
    Finalizing,
    Done,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Idle => "idle",
            Phase::Negotiating => "negotiating",
            Phase::Transferring => "transferring",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Client-side view of a transfer in progress.
///
/// Invariant: `offset <= total` after every mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferState {
    offset: u64,
    total: u64,
    session_id: String,
    phase: Phase,
}

impl TransferState {
    /// Starts tracking a negotiated session at the device's resume point.
    ///
    /// Returns `None` if the session reports more bytes than it holds.
    pub fn from_session(session: &Session) -> Option<Self> {
        if session.have > session.total {
            return None;
        }
        Some(Self {
            offset: session.have,
            total: session.total,
            session_id: session.id.clone(),
            phase: Phase::Transferring,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    /// True once every byte has been acknowledged.
    pub fn is_complete(&self) -> bool {
        self.offset == self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total - self.offset
    }

    /// Length of the next slice: `min(chunk_size, total - offset)`.
    pub fn next_chunk_len(&self, chunk_size: usize) -> usize {
        self.remaining().min(chunk_size as u64) as usize
    }

    /// Advances past an acknowledged chunk, never beyond `total`.
    pub fn advance(&mut self, bytes: usize) {
        self.offset = self.offset.saturating_add(bytes as u64).min(self.total);
    }

    /// Replaces the offset with the device's reported `have`.
    ///
    /// The device's value wins outright, whether it is ahead of or behind
    /// the local offset. Returns `false` (and changes nothing) when `have`
    /// exceeds the total, which no valid session can report.
    pub fn adopt(&mut self, have: u64) -> bool {
        if have > self.total {
            return false;
        }
        self.offset = have;
        true
    }
}
