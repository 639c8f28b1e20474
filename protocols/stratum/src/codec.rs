//! Line-delimited JSON codec for the stratum dialect.
//!
//! Each inbound line must fit in [`MAX_LINE_LENGTH`] bytes (not counting the
//! terminating `\n`); a longer line is a framing error the caller bans the
//! client for (§4.5). Outbound messages are single-line JSON objects
//! terminated by `\n`.

use crate::error::Error;
use crate::message::{Request, ServerMessage};

use ii_async_compat::{bytes, tokio_util};

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum accepted line length, not counting the newline terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

#[derive(Default, Debug)]
pub struct Codec {
    encode_buf: Vec<u8>,
}

impl Decoder for Codec {
    type Item = Request;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline_pos = src.iter().position(|&byte| byte == b'\n');

            let line_len = match newline_pos {
                Some(pos) => pos,
                None => {
                    if src.len() > MAX_LINE_LENGTH {
                        return Err(Error::LineTooLong {
                            limit: MAX_LINE_LENGTH,
                        });
                    }
                    return Ok(None);
                }
            };

            if line_len > MAX_LINE_LENGTH {
                return Err(Error::LineTooLong {
                    limit: MAX_LINE_LENGTH,
                });
            }

            let mut line = src.split_to(line_len + 1);
            line.truncate(line_len);
            // tolerate CRLF line endings
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                // blank keep-alive lines are skipped rather than treated as
                // malformed requests
                continue;
            }

            let request: Request = serde_json::from_slice(&line)?;
            return Ok(Some(request));
        }
    }
}

impl Encoder<ServerMessage> for Codec {
    type Error = Error;

    fn encode(&mut self, item: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_buf.clear();
        serde_json::to_writer(&mut self.encode_buf, &item)?;
        dst.reserve(self.encode_buf.len() + 1);
        dst.put_slice(&self.encode_buf);
        dst.put_u8(b'\n');
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Request> {
        let mut codec = Codec::default();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(request) = codec.decode(&mut buf).expect("decode failed") {
            out.push(request);
        }
        out
    }

    #[test]
    fn decodes_single_line_request() {
        let requests = decode_all(b"{\"id\":1,\"method\":\"mining.hello\",\"params\":[]}\n");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].id, 1);
        assert_eq!(requests[0].method, "mining.hello");
    }

    #[test]
    fn decodes_multiple_lines_from_one_buffer() {
        let requests = decode_all(
            b"{\"id\":1,\"method\":\"mining.hello\",\"params\":[]}\n{\"id\":2,\"method\":\"mining.bye\",\"params\":[]}\n",
        );
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, "mining.bye");
    }

    #[test]
    fn incomplete_line_yields_none_without_consuming() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::from(&b"{\"id\":1,\"method\":\"mining.hello\""[..]);
        assert!(codec.decode(&mut buf).expect("decode failed").is_none());
        assert!(!buf.is_empty());
    }

    #[test]
    fn line_of_exactly_max_length_is_accepted() {
        let padding = "x".repeat(MAX_LINE_LENGTH - 40);
        let line = format!(
            "{{\"id\":1,\"method\":\"mining.hello\",\"params\":[\"{}\"]}}",
            padding
        );
        assert!(line.len() <= MAX_LINE_LENGTH);
        let mut input = line.into_bytes();
        // pad out to exactly MAX_LINE_LENGTH bytes of content before the newline
        input.resize(MAX_LINE_LENGTH, b' ');
        let mut codec = Codec::default();
        let mut buf = BytesMut::from(&input[..]);
        buf.extend_from_slice(b"\n");
        // content isn't valid JSON once padded with spaces outside the string,
        // so assert only on the framing boundary: no LineTooLong error raised
        match codec.decode(&mut buf) {
            Err(Error::LineTooLong { .. }) => panic!("line at the limit must not be rejected"),
            _ => {}
        }
    }

    #[test]
    fn line_exceeding_max_length_is_rejected() {
        let mut input = vec![b' '; MAX_LINE_LENGTH + 1];
        input.push(b'\n');
        let mut codec = Codec::default();
        let mut buf = BytesMut::from(&input[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::LineTooLong { .. })
        ));
    }

    #[test]
    fn encodes_response_as_newline_terminated_json() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::new();
        let response = crate::message::Response::ok(1, serde_json::json!("s-12345"));
        codec
            .encode(ServerMessage::Response(response), &mut buf)
            .expect("encode failed");
        assert_eq!(buf[buf.len() - 1], b'\n');
        let text = std::str::from_utf8(&buf[..buf.len() - 1]).unwrap();
        let _: serde_json::Value = serde_json::from_str(text).expect("not valid json");
    }
}
