#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub name: String,
    pub message_count: i64,
    pub size: i64,
    /// Reported as the broker returns it, even when greater than `last_offset`.
    pub first_offset: u64,
    pub last_offset: u64,
}
