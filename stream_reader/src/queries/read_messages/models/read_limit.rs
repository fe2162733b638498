pub const DEFAULT_READ_LIMIT: usize = 10;
pub const MAX_READ_LIMIT: usize = 500;

/// Hard ceiling on how many messages one read may hold in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimit(usize);

impl ReadLimit {
    pub fn from_requested(requested: i64) -> Self {
        if requested <= 0 {
            Self(DEFAULT_READ_LIMIT)
        } else if requested as u64 > MAX_READ_LIMIT as u64 {
            Self(MAX_READ_LIMIT)
        } else {
            Self(requested as usize)
        }
    }

    pub fn get(&self) -> usize {
        self.0
    }
}
