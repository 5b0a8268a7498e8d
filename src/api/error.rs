use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use deadpool_redis::{CreatePoolError, PoolError, redis::RedisError};
use std::borrow::Cow;
use uuid::Uuid;

use crate::modules::rebuild::model::RebuildPhase;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("Service Unavailable: {0}")]
    ServiceUnavailable(Cow<'static, str>),
    #[error("Internal Server Error")]
    InternalServer,
}

#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut res = HttpResponse::build(self.status_code());

        match self {
            // Has Message
            Error::NotFound(msg)
            | Error::Conflict(msg)
            | Error::BadRequest(msg)
            | Error::ServiceUnavailable(msg) => res.json(ErrorBody { message: msg.clone() }),
            // No Message
            Error::InternalServer => {
                res.json(ErrorBody { message: "Internal Server Error".into() })
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SystemError {
    // sqlx errors
    #[error("Database Error : {0}")]
    DatabaseError(Cow<'static, str>),
    // redis errors
    #[error(transparent)]
    PoolInit(#[from] CreatePoolError),
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(Cow<'static, str>),
    #[error("Mirror write {member_id} -> {target_id} failed: {source}")]
    PartialMirror { member_id: Uuid, target_id: Uuid, source: Box<SystemError> },
    #[error("Score lookup failed: {0}")]
    ReadFailure(Box<SystemError>),
    #[error("Rebuild aborted during {phase}: {source}")]
    RebuildPhaseFailure { phase: RebuildPhase, source: Box<SystemError> },
    #[error("Rebuild already running ({0})")]
    RebuildInProgress(RebuildPhase),
    #[error("Dead-letter queue is held by another replay or rebuild")]
    ReplayInProgress,
    // Custom Errors
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Database Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Database Conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("Internal System Error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<SystemError> for Error {
    fn from(value: SystemError) -> Self {
        match value {
            SystemError::BadRequest(msg) => Error::BadRequest(msg),
            SystemError::NotFound(msg) => Error::NotFound(msg),
            SystemError::Conflict(msg) => Error::Conflict(msg),
            SystemError::RebuildInProgress(phase) => {
                Error::Conflict(format!("Rebuild already running ({phase})").into())
            }
            SystemError::ReplayInProgress => {
                Error::Conflict("Dead-letter replay already running".into())
            }
            SystemError::CacheUnavailable(_) | SystemError::ReadFailure(_) => {
                log::warn!("Cache unavailable: {:?}", value);
                Error::ServiceUnavailable("Cache is temporarily unavailable".into())
            }
            _ => {
                log::error!("Internal Server Error: {:?}", value);
                Error::InternalServer
            }
        }
    }
}

impl From<RedisError> for SystemError {
    fn from(err: RedisError) -> Self {
        log::debug!("{:?}", err);
        SystemError::CacheUnavailable(err.to_string().into())
    }
}

impl From<PoolError> for SystemError {
    fn from(err: PoolError) -> Self {
        log::debug!("{:?}", err);
        SystemError::CacheUnavailable(format!("Redis pool error: {err}").into())
    }
}

impl From<sqlx::Error> for SystemError {
    fn from(err: sqlx::Error) -> Self {
        log::error!("{:?}", err);
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some("23505") => {
                    return SystemError::Conflict(db_err.message().to_string().into());
                }
                Some("42P01") => {
                    return SystemError::NotFound("Resource not found".into());
                }
                _ => {
                    log::error!("Unhandled DB error: {:?}", db_err);
                    return SystemError::DatabaseError(db_err.message().to_string().into());
                }
            }
        }
        SystemError::InternalError(Box::new(err))
    }
}

impl SystemError {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn cache_unavailable(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::CacheUnavailable(msg.into())
    }

    pub fn partial_mirror(member_id: Uuid, target_id: Uuid, source: SystemError) -> Self {
        Self::PartialMirror { member_id, target_id, source: Box::new(source) }
    }

    /// Failures the recovery queue can repair by replaying the mutation later.
    pub fn is_cache_failure(&self) -> bool {
        matches!(self, SystemError::CacheUnavailable(_) | SystemError::PartialMirror { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_mirror_counts_as_cache_failure() {
        let err = SystemError::partial_mirror(
            Uuid::from_u128(2),
            Uuid::from_u128(1),
            SystemError::cache_unavailable("connection reset"),
        );
        assert!(err.is_cache_failure());
        assert!(!SystemError::bad_request("self pair").is_cache_failure());
    }

    #[test]
    fn rebuild_in_progress_maps_to_conflict() {
        let err: Error = SystemError::RebuildInProgress(RebuildPhase::Wiping).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn busy_replay_maps_to_conflict() {
        let err: Error = SystemError::ReplayInProgress.into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert!(!SystemError::ReplayInProgress.is_cache_failure());
    }

    #[test]
    fn cache_errors_are_not_reported_as_internal() {
        let err: Error = SystemError::cache_unavailable("timeout").into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
