use crate::error::IngestError;
use color_eyre::Report;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::json;
use warp::Reply;

/// Reply to an event observer request that was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accepted {
	Ok,
	/// Skipped while the node is in initial block download.
	Ibd,
}

impl Reply for Accepted {
	fn into_response(self) -> warp::reply::Response {
		match self {
			Accepted::Ok => warp::reply::json(&json!({ "result": "ok" })).into_response(),
			Accepted::Ibd => warp::reply::with_status("IBD", StatusCode::OK).into_response(),
		}
	}
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
	InternalServerError,
}

pub struct Error {
	pub cause: Option<Report>,
	pub error_code: ErrorCode,
	pub message: String,
}

impl Error {
	/// Payload could not be read, the cause is logged by the route.
	pub fn internal_server_error(cause: Report) -> Self {
		Error {
			message: format!("{cause:#}"),
			cause: Some(cause),
			error_code: ErrorCode::InternalServerError,
		}
	}

	fn status(&self) -> StatusCode {
		match self.error_code {
			ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// Ingestion failures are already logged by the sequencer.
impl From<IngestError> for Error {
	fn from(error: IngestError) -> Self {
		Error {
			cause: None,
			error_code: ErrorCode::InternalServerError,
			message: error.to_string(),
		}
	}
}

impl Reply for Error {
	fn into_response(self) -> warp::reply::Response {
		let body = warp::reply::json(&json!({ "error": self.message }));
		warp::reply::with_status(body, self.status()).into_response()
	}
}
