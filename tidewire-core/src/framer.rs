//! Message framer
//!
//! Turns the raw input of a session into complete messages: HTTP requests
//! while the session speaks HTTP, WebSocket frames once an upgrade to
//! WebSocket was answered. Frame-level protocol violations never fail the
//! decode; they come back as frames carrying a close code so the protocol
//! handler can answer them with a CLOSE.

use crate::{
    error::{Error, FrameError, HttpError, Result},
    frame::Frame,
    http::{split_target, Headers, HttpRequest},
    protocol::{
        constants::{DEFAULT_MAX_FRAME_SIZE, MAX_HEADERS, MAX_HEADER_SIZE},
        http_header, Opcode,
    },
};
use bytes::{Buf, Bytes, BytesMut};
use http::Method;

/// One decoded inbound message
#[derive(Debug, Clone)]
pub enum Inbound {
    /// A complete HTTP request
    Http(HttpRequest),
    /// A single WebSocket frame
    Frame(Frame),
}

/// Decoder for the bytes a session receives
#[derive(Debug, Clone, Copy)]
pub struct MessageFramer {
    max_head_size: usize,
    max_frame_size: usize,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new(MAX_HEADER_SIZE, DEFAULT_MAX_FRAME_SIZE)
    }
}

impl MessageFramer {
    /// Create a framer with the given size limits
    pub fn new(max_head_size: usize, max_frame_size: usize) -> Self {
        Self {
            max_head_size,
            max_frame_size,
        }
    }

    /// Decode the next message from `buf`
    ///
    /// `frames` selects WebSocket decoding. Returns `Ok(None)` when more input
    /// is needed; decoded bytes are removed from `buf`.
    pub fn decode(&self, buf: &mut BytesMut, frames: bool) -> Result<Option<Inbound>> {
        if buf.is_empty() {
            return Ok(None);
        }

        if frames {
            Ok(self.decode_frame(buf).map(Inbound::Frame))
        } else {
            Ok(self.decode_http(buf)?.map(Inbound::Http))
        }
    }

    /// Decode one HTTP request
    pub fn decode_http(&self, buf: &mut BytesMut) -> Result<Option<HttpRequest>> {
        let (head_len, method, target, version, headers) = {
            let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
            let mut request = httparse::Request::new(&mut slots);

            let head_len = match request
                .parse(buf)
                .map_err(|e| HttpError::MalformedHead(e.to_string()))?
            {
                httparse::Status::Complete(len) => len,
                httparse::Status::Partial => {
                    if buf.len() > self.max_head_size {
                        return Err(HttpError::HeadTooLarge {
                            max: self.max_head_size,
                        }
                        .into());
                    }
                    return Ok(None);
                }
            };

            if head_len > self.max_head_size {
                return Err(HttpError::HeadTooLarge {
                    max: self.max_head_size,
                }
                .into());
            }

            let raw_method = request.method.unwrap_or_default();
            let method = Method::from_bytes(raw_method.as_bytes())
                .map_err(|_| HttpError::InvalidMethod(raw_method.to_string()))?;
            let target = request.path.unwrap_or("/").to_string();
            let version = request.version.unwrap_or(1);

            let mut headers = Headers::new();
            for header in request.headers.iter() {
                headers.append(header.name, String::from_utf8_lossy(header.value));
            }

            (head_len, method, target, version, headers)
        };

        let body_len = match headers.get(http_header::CONTENT_LENGTH) {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .map_err(|_| HttpError::InvalidContentLength(value.to_string()))?,
            None => 0,
        };

        if body_len > self.max_frame_size {
            return Err(HttpError::InvalidContentLength(format!(
                "{} exceeds {}",
                body_len, self.max_frame_size
            ))
            .into());
        }

        if buf.len() < head_len + body_len {
            return Ok(None);
        }

        buf.advance(head_len);
        let body = buf.split_to(body_len).freeze();
        let (path, query) = split_target(&target);

        Ok(Some(HttpRequest {
            method,
            path,
            query,
            version,
            headers,
            body,
            remote_addr: None,
        }))
    }

    /// Decode one client frame, tagging protocol violations with a close code
    pub fn decode_frame(&self, buf: &mut BytesMut) -> Option<Frame> {
        let opcode = Opcode::from_bits(*buf.first()?);

        match Frame::parse(buf, self.max_frame_size) {
            Ok(frame) => Some(match frame.validate_client() {
                Ok(()) => frame,
                Err(violation) => {
                    let code = violation.close_code();
                    frame.with_error(code)
                }
            }),
            Err(Error::Frame(violation @ FrameError::TooLarge { .. })) => {
                // The payload is never read, so nothing after it can be trusted.
                buf.clear();
                Some(Frame::new(opcode, Bytes::new()).with_error(violation.close_code()))
            }
            Err(_) => None,
        }
    }

    /// Recognize bytes about to be written as a single server frame
    ///
    /// Returns `Some` only when `bytes` is exactly one well-formed frame;
    /// HTTP responses and partial or concatenated writes yield `None`.
    pub fn classify_outbound(&self, bytes: &[u8]) -> Option<Frame> {
        if bytes.starts_with(b"HTTP/") {
            return None;
        }

        let mut buf = BytesMut::from(bytes);
        let frame = Frame::parse(&mut buf, usize::MAX).ok()?;
        if buf.is_empty() && !frame.opcode.is_reserved() {
            Some(frame)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::utils;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    fn framer() -> MessageFramer {
        MessageFramer::new(1024, 4096)
    }

    #[test]
    fn test_http_request_with_body() {
        let mut buf = BytesMut::from(
            &b"POST /submit?id=7 HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\nhelloGET"[..],
        );

        let request = match framer().decode(&mut buf, false).unwrap() {
            Some(Inbound::Http(request)) => request,
            other => panic!("expected request, got {other:?}"),
        };

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path, "/submit");
        assert_eq!(request.query.as_deref(), Some("id=7"));
        assert_eq!(request.header("host"), Some("a"));
        assert_eq!(request.body, "hello");
        assert_eq!(&buf[..], b"GET");
    }

    #[test]
    fn test_partial_http_waits() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: a\r\n"[..]);
        assert!(framer().decode(&mut buf, false).unwrap().is_none());

        let mut body_pending =
            BytesMut::from(&b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc"[..]);
        assert!(framer().decode_http(&mut body_pending).unwrap().is_none());
        assert_eq!(body_pending.len(), 42);
    }

    #[test]
    fn test_oversized_head_rejected() {
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        buf.extend_from_slice(&[b'a'; 2048]);
        let err = framer().decode_http(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Http(HttpError::HeadTooLarge { max: 1024 })));
    }

    #[test]
    fn test_masked_text_frame() {
        let mut buf = BytesMut::from(&Frame::text("ping?").masked_with(MASK).to_bytes()[..]);

        match framer().decode(&mut buf, true).unwrap() {
            Some(Inbound::Frame(frame)) => {
                assert_eq!(frame.opcode, Opcode::Text);
                assert_eq!(frame.payload, "ping?");
                assert_eq!(frame.error_code, None);
            }
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_violations_carry_close_codes() {
        let mut unmasked = BytesMut::from(&Frame::binary("x").to_bytes()[..]);
        let frame = framer().decode_frame(&mut unmasked).unwrap();
        assert_eq!(frame.opcode, Opcode::Binary);
        assert_eq!(frame.error_code, Some(1002));

        let mut reserved = Frame::text("x").masked_with(MASK);
        reserved.rsv[0] = true;
        let mut buf = BytesMut::from(&reserved.to_bytes()[..]);
        assert_eq!(framer().decode_frame(&mut buf).unwrap().error_code, Some(1002));

        let mut bad_utf8 = BytesMut::from(&Frame::text(vec![0xc3, 0x28]).masked_with(MASK).to_bytes()[..]);
        assert_eq!(framer().decode_frame(&mut bad_utf8).unwrap().error_code, Some(1007));
    }

    #[test]
    fn test_too_large_frame_discards_input() {
        let mut buf = BytesMut::from(&Frame::binary(vec![1u8; 5000]).masked_with(MASK).to_bytes()[..]);
        let frame = framer().decode_frame(&mut buf).unwrap();

        assert_eq!(frame.error_code, Some(1009));
        assert_eq!(frame.opcode, Opcode::Binary);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reserved_opcode_frame() {
        let mut buf = BytesMut::from(&Frame::new(Opcode::Reserved3, "?").masked_with(MASK).to_bytes()[..]);
        let frame = framer().decode_frame(&mut buf).unwrap();
        assert!(frame.opcode.is_reserved());
        assert_eq!(frame.error_code, None);
    }

    #[test]
    fn test_classify_outbound() {
        let framer = framer();
        let text = framer.classify_outbound(&Frame::text("out").to_bytes()).unwrap();
        assert_eq!(text.payload, "out");

        let close = Frame::close(Some(1000), None).to_bytes();
        let classified = framer.classify_outbound(&close).unwrap();
        assert_eq!(utils::read_close_code(&classified.payload), Some(1000));

        assert!(framer
            .classify_outbound(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .is_none());

        let mut two = BytesMut::new();
        Frame::text("a").write_to(&mut two);
        Frame::text("b").write_to(&mut two);
        assert!(framer.classify_outbound(&two).is_none());
    }
}
