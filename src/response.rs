//! Response emission.
//!
//! Writes the selected rule's canned response, or the not-found fallback,
//! through a [`ResponseSink`]. Sinks follow the usual HTTP write protocol:
//! headers first, then the status line, then the body.

use crate::config::ResponseDefinition;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Body sent when no rule matches.
pub const NOT_FOUND_BODY: &str = "mock not found";

/// Body sent when the request body could not be buffered.
pub const BODY_READ_FAILED_BODY: &str = "failed to read request body";

/// Failure to write part of a response.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("header {0} written after the status line")]
    HeaderAfterStatus(String),

    #[error("status line already written")]
    StatusAlreadyWritten,

    #[error("body written before the status line")]
    BodyBeforeStatus,

    #[error("invalid header {name}: {value:?}")]
    InvalidHeader { name: String, value: String },

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("connection closed: {0}")]
    Closed(String),
}

/// Destination a response is written into.
pub trait ResponseSink {
    fn append_header(&mut self, name: &str, value: &str) -> Result<(), EmitError>;
    fn write_status(&mut self, status: StatusCode) -> Result<(), EmitError>;
    fn write_body(&mut self, body: Bytes) -> Result<(), EmitError>;
}

/// Collects a response in memory and hands it to axum in one piece.
#[derive(Debug, Default)]
pub struct BufferedResponse {
    headers: HeaderMap,
    status: Option<StatusCode>,
    body: Vec<u8>,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status written so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }
}

impl ResponseSink for BufferedResponse {
    fn append_header(&mut self, name: &str, value: &str) -> Result<(), EmitError> {
        if self.status.is_some() {
            return Err(EmitError::HeaderAfterStatus(name.to_string()));
        }
        let invalid = || EmitError::InvalidHeader {
            name: name.to_string(),
            value: value.to_string(),
        };
        let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.append(name, value);
        Ok(())
    }

    fn write_status(&mut self, status: StatusCode) -> Result<(), EmitError> {
        if self.status.is_some() {
            return Err(EmitError::StatusAlreadyWritten);
        }
        self.status = Some(status);
        Ok(())
    }

    fn write_body(&mut self, body: Bytes) -> Result<(), EmitError> {
        if self.status.is_none() {
            return Err(EmitError::BodyBeforeStatus);
        }
        self.body.extend_from_slice(&body);
        Ok(())
    }
}

impl IntoResponse for BufferedResponse {
    fn into_response(self) -> Response {
        // nothing usable was written
        let Some(status) = self.status else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Write a canned response: every header, then the status, then the body.
pub fn emit<S: ResponseSink>(
    sink: &mut S,
    response: &ResponseDefinition,
) -> Result<(), EmitError> {
    for (name, value) in &response.headers {
        sink.append_header(name, value)?;
    }

    let status = StatusCode::from_u16(response.status_code)
        .map_err(|_| EmitError::InvalidStatus(response.status_code))?;
    sink.write_status(status)?;

    sink.write_body(Bytes::from(response.body.clone()))
}

/// Write the fallback used when no rule matched.
pub fn emit_not_found<S: ResponseSink>(sink: &mut S) -> Result<(), EmitError> {
    sink.write_status(StatusCode::NOT_FOUND)?;
    sink.write_body(Bytes::from_static(NOT_FOUND_BODY.as_bytes()))
}

/// Write the response for a request whose body could not be read.
pub fn emit_body_read_failed<S: ResponseSink>(sink: &mut S) -> Result<(), EmitError> {
    sink.write_status(StatusCode::INTERNAL_SERVER_ERROR)?;
    sink.write_body(Bytes::from_static(BODY_READ_FAILED_BODY.as_bytes()))
}
