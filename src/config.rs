use crate::history::HistoryError;

/// Default number of operations a history keeps before evicting the oldest.
pub const DEFAULT_MAX_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    pub max_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl HistoryConfig {
    pub fn new(max_size: usize) -> Result<Self, HistoryError> {
        if max_size == 0 {
            return Err(HistoryError::InvalidCapacity);
        }
        Ok(Self { max_size })
    }

    /// Parse a command-line capacity value. Zero and non-numbers are rejected.
    pub fn from_str(s: &str) -> Option<Self> {
        s.trim().parse().ok().and_then(|max| Self::new(max).ok())
    }
}
