use axum::http::StatusCode;

use crate::conversation::DeliveryState;

/// Failures the pairing service and conversation store report to callers.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ChatError {
    #[error("not signed in")]
    Unauthenticated,
    #[error("no profile for user {0}")]
    ProfileNotFound(String),
    #[error("no user found with that code")]
    PartnerNotFound,
    #[error("you can't pair with your own code")]
    SelfPairingRejected,
    #[error("could not mint a unique exchange code after {attempts} attempts")]
    CodeGenerationExhausted { attempts: u32 },
    #[error("already paired, disconnect first")]
    AlreadyPaired,
    #[error("that user is already paired with someone else")]
    PartnerUnavailable,
    #[error("no active pairing")]
    NotPaired,
    #[error("not allowed")]
    Forbidden,
    #[error("message {0} not found")]
    MessageNotFound(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("delivery state can't move from {from} back to {to}")]
    DeliveryRegression { from: DeliveryState, to: DeliveryState },
    #[error("media uploads are not configured")]
    MediaUnavailable,
    #[error("transport error: {0}")]
    Transport(anyhow::Error),
}

pub type ChatResult<T> = Result<T, ChatError>;

impl ChatError {
    /// Stable machine-readable code, used in HTTP and websocket error frames.
    pub fn code(&self) -> &'static str {
        use ChatError::*;
        match self {
            Unauthenticated => "unauthenticated",
            ProfileNotFound(_) => "profile_not_found",
            PartnerNotFound => "partner_not_found",
            SelfPairingRejected => "self_pairing_rejected",
            CodeGenerationExhausted { .. } => "code_generation_exhausted",
            AlreadyPaired => "already_paired",
            PartnerUnavailable => "partner_unavailable",
            NotPaired => "not_paired",
            Forbidden => "forbidden",
            MessageNotFound(_) => "message_not_found",
            InvalidMessage(_) => "invalid_message",
            DeliveryRegression { .. } => "delivery_regression",
            MediaUnavailable => "media_unavailable",
            Transport(_) => "transport_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        use ChatError::*;
        match self {
            Unauthenticated => StatusCode::UNAUTHORIZED,
            ProfileNotFound(_) | PartnerNotFound | MessageNotFound(_) => StatusCode::NOT_FOUND,
            SelfPairingRejected => StatusCode::BAD_REQUEST,
            InvalidMessage(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AlreadyPaired | PartnerUnavailable | NotPaired | DeliveryRegression { .. } => {
                StatusCode::CONFLICT
            }
            Forbidden => StatusCode::FORBIDDEN,
            CodeGenerationExhausted { .. } | MediaUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Transport(_))
    }
}

macro_rules! transport_impl {
    ($E:ty) => {
        impl From<$E> for ChatError {
            fn from(err: $E) -> Self {
                Self::Transport(anyhow::Error::from(err))
            }
        }
    };
}

transport_impl!(sqlx::Error);
transport_impl!(reqwest::Error);
transport_impl!(serde_json::Error);
transport_impl!(std::io::Error);

/// True when the database rejected a write because of a UNIQUE constraint.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
