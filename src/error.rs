/// Why a zone API request did not produce a usable record.
///
/// The explorer treats every variant the same way: the operation did not complete and
/// the views keep their last state.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("{path} answered with status {status}")]
    Status { path: String, status: u16 },

    /// Body was not the expected JSON (includes malformed population values)
    #[error("undecodable response: {0}")]
    Decode(#[from] serde_json::Error),

    /// No answer within the request deadline
    #[error("zone {code} did not answer within {seconds:.1}s")]
    TimedOut { code: String, seconds: f64 },

    /// Structurally valid JSON that is not a zone record
    #[error("malformed zone record: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("postal code must not be empty")]
pub struct EmptyPostalCode;
