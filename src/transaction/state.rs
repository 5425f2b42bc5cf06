/// Collection state of a transaction buffer
///
/// State transitions:
/// ```text
/// Idle ──start──> Collecting
///   ^                │
///   └─commit/abort───┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    /// Saves go through the host's normal single-row path
    #[default]
    Idle,

    /// Saves are deferred into the buffer
    Collecting,
}

impl BufferState {
    pub fn is_collecting(&self) -> bool {
        matches!(self, BufferState::Collecting)
    }
}

impl std::fmt::Display for BufferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferState::Idle => write!(f, "IDLE"),
            BufferState::Collecting => write!(f, "COLLECTING"),
        }
    }
}
