//! Message payloads carried inside frames, and the frame buffer used to
//! move them on and off the wire.

use super::frame::{self, HeaderResult, HEADER_LEN, MAX_FRAME_LEN};
use super::CodecError;

/// The only method the server understands.
pub const METHOD_GET: &str = "GET";

/// Width of the big-endian size field at the start of a reply header.
const FILE_SIZE_LEN: usize = 4;

/// A payload that can be written into, and read back from, a frame body.
pub trait Message: Sized {
    /// Serialize into `output`, returning the number of bytes written.
    fn serialize(&self, output: &mut [u8]) -> Result<usize, CodecError>;

    /// Deserialize from a complete frame body.
    fn deserialize(body: &[u8]) -> Result<Self, CodecError>;
}

/// A client request. The body is the method name, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
}

impl Request {
    /// A `GET` request.
    pub fn get() -> Self {
        Self {
            method: METHOD_GET.to_string(),
        }
    }

    pub fn is_get(&self) -> bool {
        self.method == METHOD_GET
    }
}

impl Message for Request {
    fn serialize(&self, output: &mut [u8]) -> Result<usize, CodecError> {
        let bytes = self.method.as_bytes();
        if output.len() < bytes.len() {
            return Err(CodecError::BufferTooSmall {
                needed: bytes.len(),
                available: output.len(),
            });
        }
        output[..bytes.len()].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    fn deserialize(body: &[u8]) -> Result<Self, CodecError> {
        let method = std::str::from_utf8(body)
            .map_err(|_| CodecError::Malformed("request method is not valid UTF-8"))?;
        Ok(Self {
            method: method.to_string(),
        })
    }
}

/// Header announcing a file that follows unframed on the wire.
///
/// Layout: `file_size` as a 4-byte big-endian integer, then the UTF-8 file
/// name filling the rest of the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyHeader {
    pub file_size: u32,
    pub file_name: String,
}

impl ReplyHeader {
    /// Size of the serialized header body.
    pub fn encoded_len(&self) -> usize {
        FILE_SIZE_LEN + self.file_name.len()
    }
}

impl Message for ReplyHeader {
    fn serialize(&self, output: &mut [u8]) -> Result<usize, CodecError> {
        let needed = self.encoded_len();
        if output.len() < needed {
            return Err(CodecError::BufferTooSmall {
                needed,
                available: output.len(),
            });
        }
        output[..FILE_SIZE_LEN].copy_from_slice(&self.file_size.to_be_bytes());
        output[FILE_SIZE_LEN..needed].copy_from_slice(self.file_name.as_bytes());
        Ok(needed)
    }

    fn deserialize(body: &[u8]) -> Result<Self, CodecError> {
        if body.len() < FILE_SIZE_LEN {
            return Err(CodecError::Malformed("reply header shorter than size field"));
        }
        let (size, name) = body.split_at(FILE_SIZE_LEN);
        let file_size = u32::from_be_bytes([size[0], size[1], size[2], size[3]]);
        let file_name = std::str::from_utf8(name)
            .map_err(|_| CodecError::Malformed("file name is not valid UTF-8"))?
            .to_string();
        Ok(Self {
            file_size,
            file_name,
        })
    }
}

/// Reusable buffer holding one frame (header plus body).
///
/// Reads go through `header_mut` / `body_mut`: fill the header, call
/// `decode_header`, then fill exactly `body_len` bytes of body. Writes go
/// through `encode`, which leaves the complete frame in `as_bytes`.
pub struct Frame {
    data: Box<[u8]>,
    body_len: usize,
}

impl Frame {
    pub fn new() -> Self {
        Self {
            data: vec![0u8; MAX_FRAME_LEN].into_boxed_slice(),
            body_len: 0,
        }
    }

    /// Space for the 8-byte header.
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.data[..HEADER_LEN]
    }

    /// Decode the header currently in the buffer, remembering the body length.
    pub fn decode_header(&mut self) -> HeaderResult {
        let result = frame::decode_header(&self.data[..HEADER_LEN]);
        self.body_len = match result {
            HeaderResult::Valid(len) => len,
            _ => 0,
        };
        result
    }

    /// Space for the body announced by the last decoded header.
    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.data[HEADER_LEN..HEADER_LEN + self.body_len]
    }

    pub fn body(&self) -> &[u8] {
        &self.data[HEADER_LEN..HEADER_LEN + self.body_len]
    }

    /// Deserialize the current body as `M`.
    pub fn decode_body<M: Message>(&self) -> Result<M, CodecError> {
        M::deserialize(self.body())
    }

    /// Serialize `message` with its header and return the complete frame.
    pub fn encode<M: Message>(&mut self, message: &M) -> Result<&[u8], CodecError> {
        let body_len = message.serialize(&mut self.data[HEADER_LEN..])?;
        frame::write_header(body_len, &mut self.data[..HEADER_LEN])?;
        self.body_len = body_len;
        Ok(self.as_bytes())
    }

    /// Header and body as they appear on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..HEADER_LEN + self.body_len]
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_BODY_LEN;

    #[test]
    fn test_request_round_trip() {
        let mut buf = [0u8; 16];
        let len = Request::get().serialize(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"GET");
        assert_eq!(Request::deserialize(&buf[..len]).unwrap(), Request::get());
    }

    #[test]
    fn test_request_buffer_too_small() {
        let mut buf = [0u8; 2];
        assert_eq!(
            Request::get().serialize(&mut buf),
            Err(CodecError::BufferTooSmall {
                needed: 3,
                available: 2
            })
        );
    }

    #[test]
    fn test_reply_header_round_trip() {
        let header = ReplyHeader {
            file_size: 1024,
            file_name: "/tmp/test_file.cpp".to_string(),
        };

        let mut buf = [0u8; 64];
        let len = header.serialize(&mut buf).unwrap();
        assert_eq!(len, 4 + "/tmp/test_file.cpp".len());
        assert_eq!(&buf[..4], &[0x00u8, 0x00, 0x04, 0x00]);
        assert_eq!(&buf[4..len], b"/tmp/test_file.cpp");

        assert_eq!(ReplyHeader::deserialize(&buf[..len]).unwrap(), header);
    }

    #[test]
    fn test_reply_header_empty_name() {
        let header = ReplyHeader::deserialize(&[0, 0, 0, 7]).unwrap();
        assert_eq!(header.file_size, 7);
        assert!(header.file_name.is_empty());
    }

    #[test]
    fn test_reply_header_too_short() {
        assert!(matches!(
            ReplyHeader::deserialize(&[0, 1, 2]),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_reply_header_invalid_utf8() {
        assert!(matches!(
            ReplyHeader::deserialize(&[0, 0, 0, 1, 0xff, 0xfe]),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_frame_encode_request() {
        let mut frame = Frame::new();
        let bytes = frame.encode(&Request::get()).unwrap();
        assert_eq!(bytes, b"MSGN   3GET");
    }

    #[test]
    fn test_frame_decode_request() {
        let mut frame = Frame::new();
        frame.header_mut().copy_from_slice(b"MSGN   3");
        assert_eq!(frame.decode_header(), HeaderResult::Valid(3));
        frame.body_mut().copy_from_slice(b"GET");
        assert_eq!(frame.decode_body::<Request>().unwrap(), Request::get());
    }

    #[test]
    fn test_frame_reply_header_between_frames() {
        let header = ReplyHeader {
            file_size: 1024,
            file_name: "//tmp//test_file.cpp".to_string(),
        };

        let mut src = Frame::new();
        let wire = src.encode(&header).unwrap().to_vec();

        let mut dst = Frame::new();
        dst.header_mut().copy_from_slice(&wire[..HEADER_LEN]);
        assert_eq!(dst.decode_header(), HeaderResult::Valid(wire.len() - HEADER_LEN));
        dst.body_mut().copy_from_slice(&wire[HEADER_LEN..]);
        assert_eq!(dst.decode_body::<ReplyHeader>().unwrap(), header);
    }

    #[test]
    fn test_frame_rejects_name_longer_than_body() {
        let header = ReplyHeader {
            file_size: 1,
            file_name: "x".repeat(MAX_BODY_LEN),
        };
        let mut frame = Frame::new();
        assert!(matches!(
            frame.encode(&header),
            Err(CodecError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn test_invalid_header_clears_body() {
        let mut frame = Frame::new();
        frame.header_mut().copy_from_slice(b"MSGN9999");
        assert_eq!(frame.decode_header(), HeaderResult::Invalid);
        assert_eq!(frame.body_len, 0);
        assert!(frame.body().is_empty());
    }
}
