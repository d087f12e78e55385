//! Classification of ProBit failures into the shared venue error taxonomy.

use connector_core::VenueError;
use rest_client::RestError;

use crate::responses::ApiErrorBody;

/// Map a transport-level failure to a venue error.
///
/// - 429 -> `RateLimited`
/// - timeouts, connection failures, 5xx and 401 (token expired) -> `Transport`
/// - other 4xx -> `Rejected`, with ProBit's `errorCode` when the body has one
/// - malformed JSON -> `Parse`
pub fn classify(err: RestError) -> VenueError {
    match err {
        RestError::RateLimited { retry_after_ms } => VenueError::RateLimited { retry_after_ms },
        RestError::Timeout => VenueError::Transport("request timed out".into()),
        RestError::Connection(msg) | RestError::RequestBuild(msg) => VenueError::Transport(msg),
        RestError::Parse(msg) => VenueError::Parse(msg),
        RestError::HttpError { status, message } if status >= 500 || status == 401 => {
            VenueError::Transport(format!("HTTP {status}: {message}"))
        }
        RestError::HttpError { status, message } => from_api_response(status, &message),
    }
}

/// ProBit returns `{"errorCode": "...", "message": "..."}` for rejected requests.
fn from_api_response(status: u16, body: &str) -> VenueError {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(api) => VenueError::Rejected {
            message: api.message.unwrap_or_else(|| body.to_string()),
            code: api.error_code,
        },
        Err(_) => VenueError::Rejected {
            code: status.to_string(),
            message: body.to_string(),
        },
    }
}
