//! Error types and HTTP status mapping for the server.

use signpost::SignpostError;

/// HTTP status codes used by the map client API.
pub mod status_codes {
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_ERROR: u16 = 500;
    pub const BAD_GATEWAY: u16 = 502;
}

/// All errors that can occur in the server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Request to {url} failed: {message}")]
    Fetch { url: String, message: String },

    #[error("Couldn't find URL: {0}")]
    EmptyResponse(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Signpost(#[from] SignpostError),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    pub(crate) fn fetch(url: &str, err: impl std::fmt::Display) -> Self {
        ServerError::Fetch {
            url: url.to_string(),
            message: err.to_string(),
        }
    }

    /// HTTP status reported to the map client.
    pub fn status(&self) -> u16 {
        use status_codes::*;
        match self {
            ServerError::Fetch { .. } | ServerError::EmptyResponse(_) => BAD_GATEWAY,
            ServerError::NotFound(_) => NOT_FOUND,
            ServerError::InvalidParams(_) => BAD_REQUEST,
            ServerError::Signpost(e) => match e {
                SignpostError::FeatureNotFound(_)
                | SignpostError::UnknownChoropleth(_)
                | SignpostError::UnknownIsoline(_) => NOT_FOUND,
                SignpostError::NoDataset => CONFLICT,
                SignpostError::InvalidGeoJson(_) | SignpostError::Json(_) => BAD_REQUEST,
                SignpostError::MissingKey { .. } | SignpostError::Scale(_) => BAD_GATEWAY,
                SignpostError::Registry(_) => INTERNAL_ERROR,
            },
            ServerError::Transport(_) | ServerError::Io(_) | ServerError::Json(_) => INTERNAL_ERROR,
        }
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServerError::NotFound("x".into()).status(), 404);
        assert_eq!(ServerError::fetch("http://a", "timed out").status(), 502);
        assert_eq!(ServerError::from(SignpostError::NoDataset).status(), 409);
        assert_eq!(
            ServerError::from(SignpostError::UnknownIsoline("isoline-3".into())).status(),
            404
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            ServerError::EmptyResponse("http://a/b.geojson".into()).to_string(),
            "Couldn't find URL: http://a/b.geojson"
        );
        assert_eq!(
            ServerError::from(SignpostError::NoDataset).to_string(),
            "No dataset with point data is loaded"
        );
    }
}
