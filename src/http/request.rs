//! First request head on a new connection.
//!
//! # Responsibilities
//! - Read and parse the request line and headers with `httparse`
//! - Bound the head size so a slow or hostile client cannot grow the buffer
//! - Convert the parsed head into an `http::Request`
//!
//! # Design Decisions
//! - Only the first request is parsed here; it decides whether the connection
//!   is a tunnel (served raw) or plain HTTP (handed to hyper with the bytes replayed)
//! - The returned buffer holds every byte read, head and any pipelined data

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Request, StatusCode, Uri, Version};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::proxy::Body;

const MAX_HEADERS: usize = 100;
const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum HeadError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed mid-head")]
    Incomplete,

    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("malformed request head: {0}")]
    Parse(#[from] httparse::Error),

    #[error("invalid method: {0}")]
    Method(#[from] http::method::InvalidMethod),

    #[error("invalid request target: {0}")]
    Uri(#[from] http::uri::InvalidUri),

    #[error("invalid header: {0}")]
    Header(String),
}

impl HeadError {
    /// Status to answer with, if the client is still there to read it.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Io(_) | Self::Incomplete => None,
            Self::TooLarge(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            Self::Parse(_) | Self::Method(_) | Self::Uri(_) | Self::Header(_) => {
                Some(StatusCode::BAD_REQUEST)
            }
        }
    }
}

/// A parsed request head.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    /// Bytes the head occupies at the start of the read buffer.
    pub len: usize,
}

impl RequestHead {
    /// Bodyless request carrying this head.
    pub fn into_request(self) -> Request<Body> {
        let mut req = Request::new(Body::empty());
        *req.method_mut() = self.method;
        *req.uri_mut() = self.uri;
        *req.version_mut() = self.version;
        *req.headers_mut() = self.headers;
        req
    }
}

/// Read until one full request head is buffered.
///
/// Returns `Ok(None)` if the peer closed before sending anything.
pub async fn read_head<S>(
    stream: &mut S,
    max_bytes: usize,
) -> Result<Option<(RequestHead, BytesMut)>, HeadError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        if stream.read_buf(&mut buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(HeadError::Incomplete);
        }
        if let Some(head) = parse_head(&buf)? {
            return Ok(Some((head, buf)));
        }
        if buf.len() >= max_bytes {
            return Err(HeadError::TooLarge(max_bytes));
        }
    }
}

/// Parse a request head from `buf`, or `None` if more bytes are needed.
pub fn parse_head(buf: &[u8]) -> Result<Option<RequestHead>, HeadError> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut slots);
    let len = match parsed.parse(buf)? {
        httparse::Status::Partial => return Ok(None),
        httparse::Status::Complete(len) => len,
    };

    let method = Method::from_bytes(parsed.method.unwrap_or_default().as_bytes())?;
    let uri: Uri = parsed.path.unwrap_or_default().parse()?;
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| HeadError::Header(format!("{}: {e}", header.name)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| HeadError::Header(format!("{}: {e}", header.name)))?;
        headers.append(name, value);
    }

    Ok(Some(RequestHead {
        method,
        uri,
        version,
        headers,
        len,
    }))
}
