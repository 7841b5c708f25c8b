/// The lifecycle state of a session. [`SessionState::Closed`] is terminal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Connecting,
    Handshaking,
    Established,
    Closing,
    Closed,
}

impl SessionState {
    pub(crate) fn allowed_state_transition(&self, next: &Self) -> bool {
        match (self, next) {
            (Self::Connecting, Self::Handshaking) => true,
            (Self::Connecting, Self::Closed) => true,
            (Self::Handshaking, Self::Established) => true,
            (Self::Handshaking, Self::Closed) => true,
            (Self::Established, Self::Closing) => true,
            (Self::Established, Self::Closed) => true,
            (Self::Closing, Self::Closed) => true,
            _ => false,
        }
    }
}
