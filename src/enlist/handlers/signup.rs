use crate::enlist::{
    hasher::{HashError, SecretHasher},
    store::{Account, AccountStore, StoreError},
    validator::{validate, Credential, ValidationError},
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

/// Request payload. Fields are optional so a missing field is reported by the
/// validator with its name instead of as a JSON decode failure.
#[derive(ToSchema, Deserialize)]
pub struct SignupRequest {
    email: Option<String>,
    password: Option<String>,
}

impl SignupRequest {
    fn into_credential(self) -> Credential {
        Credential::new(
            self.email.as_deref().unwrap_or_default(),
            self.password.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

/// Deadline for the hash + store part of a registration.
#[derive(Clone, Copy, Debug)]
pub struct SignupConfig {
    timeout: Duration,
}

impl Default for SignupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
        }
    }
}

impl SignupConfig {
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("malformed JSON body")]
    Payload,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Hash(#[from] HashError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SignupError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Payload | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(StoreError::DuplicateEmail) => StatusCode::CONFLICT,
            Self::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Internal causes stay in the logs; clients only get a fixed message.
    fn body(&self) -> ErrorBody {
        let (error, field) = match self {
            Self::Payload => (self.to_string(), None),
            Self::Validation(err) => (err.to_string(), Some(err.field.to_string())),
            Self::Store(StoreError::DuplicateEmail) => {
                ("email already registered".to_string(), None)
            }
            Self::Store(StoreError::Unavailable(_)) => {
                ("account store unavailable".to_string(), None)
            }
            Self::Hash(_) => ("failed to process password".to_string(), None),
        };
        ErrorBody { error, field }
    }
}

impl IntoResponse for SignupError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/signup",
    request_body = SignupRequest,
    responses (
        (status = 201, description = "Account created", body = Account, content_type = "application/json"),
        (status = 400, description = "Malformed body, invalid email or password length", body = ErrorBody),
        (status = 409, description = "An account with this email already exists", body = ErrorBody),
        (status = 500, description = "Password hashing failed", body = ErrorBody),
        (status = 503, description = "Account store unavailable or deadline exceeded", body = ErrorBody),
    ),
    tag = "signup"
)]
// axum handler for signup
#[instrument(skip_all)]
pub async fn signup(
    Extension(store): Extension<Arc<dyn AccountStore>>,
    Extension(hasher): Extension<SecretHasher>,
    Extension(config): Extension<SignupConfig>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Account>), SignupError> {
    let Json(payload) = payload.map_err(|rejection| {
        debug!("Rejected signup payload: {}", rejection.status());
        SignupError::Payload
    })?;

    let credential = payload.into_credential();
    validate(&credential).inspect_err(|err| debug!("Invalid credential: {err}"))?;

    let account = register(store.as_ref(), &hasher, credential, config.timeout()).await?;

    info!(account_id = account.id, "Account registered");

    Ok((StatusCode::CREATED, Json(account)))
}

/// Hash then store, bounded by `deadline`.
///
/// If the deadline fires the pending hash result is discarded and nothing is
/// written, so the registration is reported as unavailable rather than half done.
///
/// # Errors
/// Returns the first hashing or store failure, or `StoreError::Unavailable` on timeout.
pub async fn register(
    store: &dyn AccountStore,
    hasher: &SecretHasher,
    credential: Credential,
    deadline: Duration,
) -> Result<Account, SignupError> {
    let Credential { email, password } = credential;

    let work = async {
        let secret_hash = hasher.hash_blocking(password).await.inspect_err(|err| {
            error!("Error hashing password: {err}");
        })?;

        let account = store
            .register(&email, &secret_hash)
            .await
            .inspect_err(|err| match err {
                StoreError::DuplicateEmail => debug!("Email already registered"),
                StoreError::Unavailable(_) => error!("Error registering account: {err}"),
            })?;

        Ok::<_, SignupError>(account)
    };

    tokio::time::timeout(deadline, work).await.map_err(|_| {
        error!("Registration deadline of {deadline:?} exceeded");
        SignupError::Store(StoreError::Unavailable(
            "registration deadline exceeded".to_string(),
        ))
    })?
}
