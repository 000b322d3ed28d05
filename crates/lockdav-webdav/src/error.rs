//! Method-level failures and their HTTP statuses.
//!
//! Each DAV method reports failures as a [`DavError`]. Backend errors are
//! converted with a default mapping; handlers override it where a method
//! gives a category a different meaning (a missing parent is `Conflict` for
//! PUT but `Forbidden` for MKCOL).

use crate::body::{self, DavBody};
use crate::dispatcher::ALLOWED_METHODS;
use http::{HeaderValue, Response, StatusCode, header};
use lockdav_vfs::VfsError;
use thiserror::Error;

/// Failure of a single DAV request.
#[derive(Debug, Error)]
pub enum DavError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The target is locked and no `If` condition matched.
    #[error("Locked: {0}")]
    Locked(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Destination on another host.
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Insufficient storage")]
    InsufficientStorage,

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// Carries the full content length for `Content-Range: bytes */<len>`.
    #[error("Range not satisfiable (length {0})")]
    RangeNotSatisfiable(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for DAV method handlers.
pub type DavResult<T> = Result<T, DavError>;

impl DavError {
    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::Conflict(_) => StatusCode::CONFLICT,
            DavError::Forbidden(_) => StatusCode::FORBIDDEN,
            DavError::Locked(_) => StatusCode::LOCKED,
            DavError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            DavError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            DavError::BadRequest(_) => StatusCode::BAD_REQUEST,
            DavError::InsufficientStorage => StatusCode::INSUFFICIENT_STORAGE,
            DavError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            DavError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DavError::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            DavError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render as a bodyless response.
    pub fn into_response(self) -> Response<DavBody> {
        let mut response = Response::new(body::empty());
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        match self {
            DavError::MethodNotAllowed => {
                headers.insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
            }
            DavError::RangeNotSatisfiable(len) => {
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{len}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
            }
            _ => {}
        }
        response
    }
}

impl From<VfsError> for DavError {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(p) => DavError::NotFound(p),
            VfsError::AlreadyExists(p)
            | VfsError::ParentMissing(p)
            | VfsError::NotACollection(p) => DavError::Conflict(p),
            VfsError::IsACollection(_) => DavError::MethodNotAllowed,
            VfsError::PermissionDenied(p) => DavError::Forbidden(p),
            VfsError::InsufficientStorage => DavError::InsufficientStorage,
            VfsError::NotSupported => DavError::NotImplemented("backend operation".into()),
            VfsError::Io(e) => DavError::Internal(e.to_string()),
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        VfsError::from(e).into()
    }
}
