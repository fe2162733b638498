pub mod get_stream_stats;
pub mod read_messages;
