//! Outbound side of a request.
//!
//! # Responsibilities
//! - Define the interface the context writes responses through
//! - Buffer a response and hand it to the transport on close
//!
//! # Design Decisions
//! - Headers are frozen once the status line is started, as on a wire
//! - Writing before starting implies status 200
//! - The finished response travels over a oneshot channel, so the
//!   dispatcher can run on a blocking thread while the transport awaits it

use std::io;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use tokio::sync::oneshot;

/// The live connection a response is written to.
pub trait Connection: Send {
    /// Send the status line. Only the first call has any effect.
    fn start_response(&mut self, status: StatusCode);

    /// Set a header. `unique` replaces existing values, otherwise appends.
    fn set_header(&mut self, name: &str, value: &str, unique: bool);

    /// Write body bytes.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Finish the response. Writes after close fail.
    fn close(&mut self);
}

/// A connection that buffers the whole response in memory.
#[derive(Debug)]
pub struct BufferedConnection {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
    done: Option<oneshot::Sender<Response<Body>>>,
}

impl BufferedConnection {
    /// Create a connection and the receiver its response is delivered to.
    pub fn new() -> (Self, oneshot::Receiver<Response<Body>>) {
        let (done, rx) = oneshot::channel();
        let conn = Self {
            status: None,
            headers: HeaderMap::new(),
            body: Vec::new(),
            done: Some(done),
        };
        (conn, rx)
    }

    fn is_closed(&self) -> bool {
        self.done.is_none()
    }
}

impl Connection for BufferedConnection {
    fn start_response(&mut self, status: StatusCode) {
        if self.status.is_some() {
            tracing::warn!(status = %status, "Response already started; status ignored");
            return;
        }
        self.status = Some(status);
    }

    fn set_header(&mut self, name: &str, value: &str, unique: bool) {
        if self.status.is_some() || self.is_closed() {
            tracing::warn!(header = %name, "Header set after response started; dropped");
            return;
        }
        let (name, value) = match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(n), Ok(v)) => (n, v),
            _ => {
                tracing::warn!(header = %name, "Invalid header dropped");
                return;
            }
        };
        if unique {
            self.headers.insert(name, value);
        } else {
            self.headers.append(name, value);
        }
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.is_closed() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"));
        }
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn close(&mut self) {
        let Some(done) = self.done.take() else {
            return;
        };
        let mut response = Response::new(Body::from(std::mem::take(&mut self.body)));
        *response.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = std::mem::take(&mut self.headers);
        if done.send(response).is_err() {
            tracing::debug!("Transport went away before the response was ready");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_response() {
        let (mut conn, mut rx) = BufferedConnection::new();
        conn.set_header("Content-Type", "text/plain", true);
        conn.set_header("Set-Cookie", "a=1", false);
        conn.set_header("Set-Cookie", "b=2", false);
        conn.start_response(StatusCode::CREATED);
        conn.write(b"hello ").unwrap();
        conn.write(b"world").unwrap();
        conn.close();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["content-type"], "text/plain");
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
    }

    #[test]
    fn test_headers_frozen_after_start() {
        let (mut conn, mut rx) = BufferedConnection::new();
        conn.start_response(StatusCode::NOT_FOUND);
        conn.set_header("X-Late", "1", true);
        conn.start_response(StatusCode::OK);
        conn.close();

        let response = rx.try_recv().unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().get("x-late").is_none());
    }

    #[test]
    fn test_write_after_close_fails() {
        let (mut conn, _rx) = BufferedConnection::new();
        conn.close();
        let err = conn.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_write_implies_ok() {
        let (mut conn, mut rx) = BufferedConnection::new();
        conn.write(b"x").unwrap();
        conn.close();
        assert_eq!(rx.try_recv().unwrap().status(), StatusCode::OK);
    }
}
