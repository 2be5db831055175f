//! Server handshake.

use bytes::BytesMut;
use http::{HeaderMap, Method, Request as HttpRequest, header::HeaderName};
use httparse::Status;
use log::debug;
use monoio_codec::{Decoded, Decoder};

use super::{
    derive_accept_key, header_contains_token,
    headers::{FromHttparse, MAX_HEADERS},
};
use crate::error::{Error, ProtocolError, Result};

/// Server request type.
pub type Request = HttpRequest<()>;

const SWITCHING_PROTOCOLS: &[u8] = b"HTTP/1.1 101 Switching Protocols\r\n\
    Upgrade: websocket\r\n\
    Connection: Upgrade\r\n\
    Sec-WebSocket-Accept: ";

fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| header_contains_token(value, token))
}

/// Validates an upgrade request and renders the `101 Switching Protocols` response.
///
/// The response headers are always `Upgrade`, `Connection` and `Sec-WebSocket-Accept`, in
/// that order, followed by the empty line ending the header block.
pub fn upgrade(request: &Request) -> Result<Vec<u8>> {
    if request.method() != Method::GET {
        return Err(Error::Protocol(ProtocolError::WrongHttpMethod));
    }

    let headers = request.headers();

    if !has_token(headers, http::header::CONNECTION, "Upgrade") {
        return Err(Error::Protocol(
            ProtocolError::MissingConnectionUpgradeHeader,
        ));
    }

    if !has_token(headers, http::header::UPGRADE, "websocket") {
        return Err(Error::Protocol(
            ProtocolError::MissingUpgradeWebSocketHeader,
        ));
    }

    if !has_token(headers, http::header::SEC_WEBSOCKET_VERSION, "13") {
        return Err(Error::Protocol(
            ProtocolError::MissingSecWebSocketVersionHeader,
        ));
    }

    let key = headers
        .get(http::header::SEC_WEBSOCKET_KEY)
        .filter(|key| !key.is_empty())
        .ok_or(Error::Protocol(ProtocolError::MissingSecWebSocketKey))?;

    let accept = derive_accept_key(key.as_bytes());
    debug!("Upgrading {} with accept key {accept}", request.uri());

    let mut buf = Vec::with_capacity(SWITCHING_PROTOCOLS.len() + accept.len() + 4);
    buf.extend_from_slice(SWITCHING_PROTOCOLS);
    buf.extend_from_slice(accept.as_bytes());
    buf.extend_from_slice(b"\r\n\r\n");
    Ok(buf)
}

/// Decoder for Request.
///
/// Yields the request together with the number of bytes it occupies in the source buffer;
/// the buffer itself is left untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestDecoder;

impl Decoder for RequestDecoder {
    type Item = (usize, Request);
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Decoded<Self::Item>, Self::Error> {
        let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut hbuffer);

        Ok(match req.parse(src)? {
            Status::Partial => Decoded::Insufficient,
            Status::Complete(size) => Decoded::Some((size, Request::from_httparse(req)?)),
        })
    }
}

impl<'h, 'b: 'h> FromHttparse<httparse::Request<'h, 'b>> for Request {
    fn from_httparse(raw: httparse::Request<'h, 'b>) -> Result<Self> {
        // A complete parse always fills method, path and version.
        let method = Method::from_bytes(raw.method.unwrap_or_default().as_bytes())
            .map_err(http::Error::from)?;
        let uri = raw
            .path
            .unwrap_or_default()
            .parse::<http::Uri>()
            .map_err(http::Error::from)?;
        let version = match raw.version {
            Some(0) => http::Version::HTTP_10,
            _ => http::Version::HTTP_11,
        };

        let mut request = Request::new(());
        *request.method_mut() = method;
        *request.uri_mut() = uri;
        *request.version_mut() = version;
        *request.headers_mut() = HeaderMap::from_httparse(raw.headers)?;

        Ok(request)
    }
}
