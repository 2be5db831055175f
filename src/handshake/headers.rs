//! HTTP Request and response header handling.

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::error::Result;

/// Limit for the number of header lines.
pub const MAX_HEADERS: usize = 124;

/// Trait to convert raw objects into HTTP parseables.
pub(crate) trait FromHttparse<T>: Sized {
    /// Convert raw object into parsed HTTP headers.
    fn from_httparse(raw: T) -> Result<Self>;
}

impl<'b: 'h, 'h> FromHttparse<&'b [httparse::Header<'h>]> for HeaderMap {
    fn from_httparse(raw: &'b [httparse::Header<'h>]) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for h in raw {
            headers.append(
                HeaderName::from_bytes(h.name.as_bytes()).map_err(http::Error::from)?,
                HeaderValue::from_bytes(h.value).map_err(http::Error::from)?,
            );
        }

        Ok(headers)
    }
}

#[cfg(test)]
mod tests {
    use super::{FromHttparse, HeaderMap, MAX_HEADERS};

    #[test]
    fn headers() {
        const DATA: &[u8] = b"Host: foo.com\r\n\
             Connection: Upgrade\r\n\
             Upgrade: websocket\r\n\
             \r\n";
        let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let (_, hdr) = httparse::parse_headers(DATA, &mut hbuffer).unwrap().unwrap();
        let headers = HeaderMap::from_httparse(hdr).unwrap();

        assert_eq!(headers.get("Host").unwrap(), &b"foo.com"[..]);
        assert_eq!(headers.get("Upgrade").unwrap(), &b"websocket"[..]);
        assert_eq!(headers.get("Connection").unwrap(), &b"Upgrade"[..]);
    }

    #[test]
    fn headers_iter() {
        const DATA: &[u8] = b"Host: foo.com\r\n\
              Sec-WebSocket-Extensions: permessage-deflate\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-ExtenSIONS: permessage-unknown\r\n\
              Upgrade: websocket\r\n\
              \r\n";
        let mut hbuffer = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let (_, hdr) = httparse::parse_headers(DATA, &mut hbuffer).unwrap().unwrap();
        let headers = HeaderMap::from_httparse(hdr).unwrap();
        let mut iter = headers.get_all("Sec-WebSocket-Extensions").into_iter();
        assert_eq!(iter.next().unwrap(), "permessage-deflate");
        assert_eq!(iter.next().unwrap(), "permessage-unknown");
        assert_eq!(iter.next(), None);
    }
}
