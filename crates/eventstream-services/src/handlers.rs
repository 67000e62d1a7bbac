//! Plain-text replies in the shape of the HTTP responses of the hosted services.

use std::fmt;

use eventstream_core::{PublishError, SessionError, SessionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Accepted,
    BadRequest,
    Conflict,
    InternalServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Accepted => 202,
            Status::BadRequest => 400,
            Status::Conflict => 409,
            Status::InternalServerError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Accepted => "Accepted",
            Status::BadRequest => "Bad Request",
            Status::Conflict => "Conflict",
            Status::InternalServerError => "Internal Server Error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub body: String,
}

impl Reply {
    pub fn new(status: Status, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn bad_request(body: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, body)
    }

    /// Reader reply: the run's lines, or the reason the run was refused.
    pub fn from_session(outcome: Result<SessionResult, SessionError>) -> Self {
        match outcome {
            Ok(result) => Self::new(Status::Ok, result.to_text()),
            Err(err @ SessionError::InvalidArgument(_)) => Self::bad_request(err.to_string()),
            Err(err @ SessionError::Busy) => Self::new(Status::Conflict, err.to_string()),
            Err(err @ SessionError::Platform(_)) => {
                Self::new(Status::InternalServerError, err.to_string())
            }
        }
    }

    /// Publisher reply. Platform failures after acceptance are reported in the
    /// body; the request itself was accepted.
    pub fn from_publish<T>(outcome: Result<T, PublishError>, accepted: impl FnOnce(T) -> String) -> Self {
        match outcome {
            Ok(value) => Self::new(Status::Accepted, accepted(value)),
            Err(err @ (PublishError::InvalidArgument(_) | PublishError::InvalidRequest(_))) => {
                Self::bad_request(err.to_string())
            }
            Err(err @ PublishError::Platform(_)) => Self::new(Status::Accepted, err.to_string()),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {}", self.status.code(), self.status.reason())?;
        f.write_str(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventstream_core::{PlatformError, ResultSink};

    #[test]
    fn reader_reply_carries_result_text() {
        let sink = ResultSink::new();
        sink.append("first");
        sink.append("second");
        let reply = Reply::from_session(Ok(sink.snapshot()));
        assert_eq!(reply.to_string(), "200 OK\nfirst\nsecond\n");
    }

    #[test]
    fn invalid_window_is_bad_request() {
        let reply = Reply::from_session(Err(SessionError::InvalidArgument("window".into())));
        assert_eq!(reply.status.code(), 400);
    }

    #[test]
    fn publish_failures_after_acceptance_stay_accepted() {
        let reply = Reply::from_publish::<()>(
            Err(PublishError::Platform(PlatformError::Publish("throttled".into()))),
            |_| String::new(),
        );
        assert_eq!(reply.status, Status::Accepted);
        assert!(reply.body.contains("throttled"));

        let reply = Reply::from_publish::<()>(
            Err(PublishError::InvalidRequest("UserId".into())),
            |_| String::new(),
        );
        assert_eq!(reply.status, Status::BadRequest);
    }
}
