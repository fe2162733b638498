use crate::queries::read_messages::ReadLimit;

#[derive(Debug, Clone)]
pub struct ReadMessagesQuery {
    pub stream: String,
    pub offset: u64,
    pub limit: ReadLimit,
}
