//! The visitor counter itself: one atomic increment per invocation, wrapped
//! in the response envelope the frontend expects.

use crate::store::CounterStore;
use crate::store::StoreOperationFailure;
use dropshot::HttpError;
use http::header;
use http::Response;
use http::StatusCode;
use hyper::Body;
use serde::Serialize;
use slog::debug;
use slog::error;
use std::io;
use std::sync::Arc;

const ALLOW_ORIGIN: &str = "*";
const ALLOW_HEADERS: &str = "Content-Type";
const ALLOW_METHODS: &str = "OPTIONS,POST,GET";

/// How a single invocation ended.  Nothing about it outlives the request.
#[derive(Debug)]
pub enum Outcome {
    Success(i64),
    Failure(StoreOperationFailure),
}

#[derive(Serialize)]
struct CountBody {
    count: i64,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

pub struct CounterService {
    store: Arc<dyn CounterStore>,
}

impl CounterService {
    pub fn new(store: Arc<dyn CounterStore>) -> CounterService {
        CounterService { store }
    }

    /// Bumps the visitor count.  Failures are logged here and handed back to
    /// the caller as-is; nothing is retried.
    pub async fn handle(&self, log: &slog::Logger) -> Outcome {
        match self.store.increment().await {
            Ok(record) => {
                debug!(log, "incremented visitor count";
                    "count" => record.visitor_count);
                Outcome::Success(record.visitor_count)
            }
            Err(error) => {
                error!(log, "failed to increment visitor count";
                    "error_message" => #%error);
                Outcome::Failure(error)
            }
        }
    }
}

impl Outcome {
    pub fn into_response(self) -> Result<Response<Body>, HttpError> {
        match self {
            Outcome::Success(count) => {
                let body = serialize(&CountBody { count })?;
                cors(Response::builder())
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .map_err(internal_error)
            }
            Outcome::Failure(error) => {
                let body = serialize(&ErrorBody { error: error.to_string() })?;
                Response::builder()
                    .status(StatusCode::INTERNAL_SERVER_ERROR)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(body.into())
                    .map_err(internal_error)
            }
        }
    }
}

/// Answers a CORS preflight without touching the counter
pub fn preflight_response() -> Result<Response<Body>, HttpError> {
    cors(Response::builder())
        .status(StatusCode::OK)
        .body(Body::empty())
        .map_err(internal_error)
}

fn cors(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN)
        .header(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS)
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS)
}

/// Single-line JSON with a space after each `:` and `,`, e.g. `{"count": 3}`
struct SpacedFormatter;

impl serde_json::ser::Formatter for SpacedFormatter {
    fn begin_array_value<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, HttpError> {
    let mut body = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut body, SpacedFormatter);
    value.serialize(&mut serializer).map_err(internal_error)?;
    Ok(body)
}

fn internal_error<E: std::fmt::Display>(error: E) -> HttpError {
    HttpError::for_internal_error(format!("building response: {:#}", error))
}
