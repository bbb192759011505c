//! Response sinks for the two serving paths.
//!
//! # Responsibilities
//! - `RawResponseWriter`: encode HTTP/1.1 responses straight onto a socket and
//!   hand the socket out for tunnels
//! - `HyperResponseWriter`: collect the response for hyper's connection driver
//!
//! # Design Decisions
//! - The raw path always closes the connection after its response; it only
//!   serves the first request of a connection
//! - Bodies are streamed frame by frame, never buffered
//! - A raw response whose length is unknown is delimited by connection close

use std::io;

use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{Response, StatusCode};
use http_body::Body as _;
use http_body_util::BodyExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::proxy::context::status_response;
use crate::proxy::scope::{release_at_eof, RequestScope};
use crate::proxy::{Body, ClientStream, ProxyError, ResponseWriter};

/// Writes responses directly onto a client socket.
pub struct RawResponseWriter<S> {
    stream: Option<S>,
    written: bool,
}

impl<S> RawResponseWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            written: false,
        }
    }

    pub fn is_hijacked(&self) -> bool {
        self.stream.is_none()
    }

    /// Complete the exchange: answer with an empty 200 if nothing was written,
    /// then close the socket. No-op after a hijack.
    pub async fn finish(mut self) -> io::Result<()> {
        if self.stream.is_some() && !self.written {
            self.write_response(status_response(StatusCode::OK)).await?;
        }
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

impl<S> ResponseWriter for RawResponseWriter<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    async fn write_response(&mut self, response: Response<Body>) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection was hijacked",
            ));
        };
        if self.written {
            return Err(io::Error::other("response already written"));
        }
        self.written = true;

        let (parts, mut body) = response.into_parts();
        let head = encode_head(parts.status, &parts.headers, body.size_hint().exact());
        stream.write_all(&head).await?;

        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(io::Error::other)?;
            if let Ok(data) = frame.into_data() {
                stream.write_all(&data).await?;
            }
        }
        stream.flush().await
    }

    fn hijack(&mut self) -> Result<ClientStream, ProxyError> {
        if self.written {
            return Err(ProxyError::HijackUnsupported("response already written"));
        }
        match self.stream.take() {
            Some(stream) => Ok(Box::new(stream)),
            None => Err(ProxyError::HijackUnsupported("connection already hijacked")),
        }
    }
}

/// Encode an HTTP/1.1 status line and headers for a close-delimited exchange.
pub fn encode_head(
    status: StatusCode,
    headers: &http::HeaderMap,
    content_length: Option<u64>,
) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in headers {
        if name == CONNECTION || name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    if let Some(len) = content_length {
        head.extend_from_slice(format!("Content-Length: {len}\r\n").as_bytes());
    }
    head.extend_from_slice(b"Connection: close\r\n\r\n");
    head
}

/// Collects the response for hyper. Hijacking is not possible on this path.
///
/// hyper streams the body after the handler has returned, so the request
/// scope rides along inside the body and is released at EOF.
#[derive(Debug, Default)]
pub struct HyperResponseWriter {
    response: Option<Response<Body>>,
    scope: Option<RequestScope>,
}

impl HyperResponseWriter {
    /// The written response, or an empty 200 if nothing was written.
    pub fn into_response(self) -> Response<Body> {
        let response = self
            .response
            .unwrap_or_else(|| status_response(StatusCode::OK));
        match self.scope {
            Some(scope) => release_at_eof(response, scope),
            None => response,
        }
    }
}

impl ResponseWriter for HyperResponseWriter {
    async fn write_response(&mut self, response: Response<Body>) -> io::Result<()> {
        if self.response.is_some() {
            return Err(io::Error::other("response already written"));
        }
        self.response = Some(response);
        Ok(())
    }

    fn hijack(&mut self) -> Result<ClientStream, ProxyError> {
        Err(ProxyError::HijackUnsupported(
            "connection is driven by the HTTP/1 server",
        ))
    }

    fn release_after_send(&mut self, scope: RequestScope) {
        self.scope = Some(scope);
    }
}
