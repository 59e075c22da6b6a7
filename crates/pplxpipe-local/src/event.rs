use crate::frame::Frame;
use crate::json::FieldExt;

/// The fields of one frame the accumulator cares about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEvent {
    /// `backend_uuid`: identifies the thread for follow-up turns.
    pub conversation_id: Option<String>,
    /// `read_write_token`: proves the caller may continue that thread.
    pub continuation_token: Option<String>,
    pub title: Option<String>,
    /// Embedded JSON document (answer record or step list), still encoded.
    pub text: Option<String>,
}

impl RawEvent {
    pub fn from_frame(frame: &Frame) -> Self {
        let owned = |key: &str| frame.str_field(key).map(str::to_string);
        Self {
            conversation_id: owned("backend_uuid"),
            continuation_token: owned("read_write_token"),
            title: owned("thread_title"),
            text: owned("text"),
        }
    }
}
