use thiserror::Error;

/// Progress of one handshake attempt.
///
/// ```text
/// Idle → HelloSent → AwaitingResponse → Finishing → Established
///   └───────────┴──────────────┴─────────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    HelloSent,
    AwaitingResponse,
    Finishing,
    Established,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid handshake transition {from:?} -> {to:?}")]
pub struct HandshakeStateError {
    pub from: HandshakeState,
    pub to: HandshakeState,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Established | HandshakeState::Failed)
    }

    /// Validates a single step; no state may be skipped.
    pub fn transition(self, next: HandshakeState) -> Result<HandshakeState, HandshakeStateError> {
        use HandshakeState::*;
        let allowed = match (self, next) {
            (Idle, HelloSent)
            | (HelloSent, AwaitingResponse)
            | (AwaitingResponse, Finishing)
            | (Finishing, Established) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(HandshakeStateError {
                from: self,
                to: next,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::HandshakeState::*;
    use super::*;

    #[test]
    fn happy_path_walks_every_state() {
        let mut state = Idle;
        for next in [HelloSent, AwaitingResponse, Finishing, Established] {
            state = state.transition(next).unwrap();
        }
        assert_eq!(state, Established);
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        assert!(Idle.transition(AwaitingResponse).is_err());
        assert!(HelloSent.transition(Finishing).is_err());
        assert!(AwaitingResponse.transition(Established).is_err());
    }

    #[test]
    fn failure_reachable_only_from_non_terminal_states() {
        for from in [Idle, HelloSent, AwaitingResponse, Finishing] {
            assert_eq!(from.transition(Failed), Ok(Failed));
        }
        assert!(Established.transition(Failed).is_err());
        assert!(Failed.transition(Failed).is_err());
        assert!(Failed.transition(Idle).is_err());
    }
}
