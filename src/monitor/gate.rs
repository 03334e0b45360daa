//! Anti-feedback gate between capture and scoring.
//!
//! Closed while the trigger sound plays (and for an optional cooldown after),
//! so the microphone hearing our own shush cannot score. Cooldown is counted in
//! captured audio frames rather than wall time, which keeps it exact for both
//! live capture and file replay.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Open,
    Closed,
    Cooling { remaining: u64 },
}

/// What the consumer should do with an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// Score it. `reopened` is set on the first frame after the gate opens.
    Score { reopened: bool },
    Discard,
}

#[derive(Debug, Clone)]
pub struct TriggerGate {
    state: GateState,
    reopened: bool,
}

impl TriggerGate {
    pub fn new() -> Self {
        Self {
            state: GateState::Open,
            reopened: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == GateState::Open
    }

    /// Stop scoring. Called before playback starts.
    pub fn close(&mut self) {
        self.state = GateState::Closed;
        self.reopened = false;
    }

    /// Playback finished (or failed): reopen once `cooldown_frames` more frames
    /// have gone by.
    pub fn release(&mut self, cooldown_frames: u64) {
        if cooldown_frames == 0 {
            self.state = GateState::Open;
            self.reopened = true;
        } else {
            self.state = GateState::Cooling {
                remaining: cooldown_frames,
            };
        }
    }

    /// Account for a frame of `frames` PCM frames arriving.
    pub fn admit(&mut self, frames: u64) -> Admit {
        match self.state {
            GateState::Open => Admit::Score {
                reopened: std::mem::take(&mut self.reopened),
            },
            GateState::Closed => Admit::Discard,
            GateState::Cooling { remaining } => {
                let remaining = remaining.saturating_sub(frames);
                if remaining == 0 {
                    self.state = GateState::Open;
                    self.reopened = true;
                } else {
                    self.state = GateState::Cooling { remaining };
                }
                Admit::Discard
            }
        }
    }
}

impl Default for TriggerGate {
    fn default() -> Self {
        Self::new()
    }
}
