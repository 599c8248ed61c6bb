use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    chatbridge_keys::KeyStoreError,
    chatbridge_protocol::ErrorBody,
};

/// Every way an HTTP request can be refused. Rendered as
/// `{"error_code": <status>, "description": <message>}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No admin key was supplied.")]
    MissingAdminKey,

    #[error("Wrong admin key was supplied.")]
    WrongAdminKey,

    #[error("No client key was supplied")]
    MissingClientKey,

    #[error("This client key is wrong")]
    WrongClientKey,

    #[error("This URL needs to be used for a websocket connection")]
    NotAWebSocket,

    #[error(transparent)]
    Keys(#[from] KeyStoreError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::WrongAdminKey | Self::WrongClientKey => StatusCode::UNAUTHORIZED,
            Self::MissingAdminKey
            | Self::MissingClientKey
            | Self::NotAWebSocket
            | Self::Keys(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.status().as_u16(),
            description: self.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
