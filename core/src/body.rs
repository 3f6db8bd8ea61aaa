//! Request/response bodies, multipart form encoding, and response decoding.
//!
//! # Design
//! A response body is decoded into a caller-chosen `Target`. The target is
//! an explicit enum (structured value, byte sink, string, byte vector, or
//! numeric scalar) picked once by the caller, so dispatch is a `match`
//! rather than a probe of the destination's shape at runtime.
//!
//! Raw-body decoding into a `String` reads the stream once into a `Vec<u8>`
//! and then moves that buffer into the string (`String::from_utf8`), so the
//! bytes are never copied a second time and nothing can mutate the buffer
//! behind the string.

use std::fmt;
use std::io::{self, Cursor, Read, Write};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::Error;
use crate::scalar::{Scalar, ScalarSlot};

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// A readable request or response body.
///
/// In-memory bodies are kept as bytes so they can be captured without
/// draining a stream; anything else is an opaque reader.
pub struct Body {
    inner: Inner,
}

enum Inner {
    Empty,
    Bytes(Cursor<Vec<u8>>),
    Reader(Box<dyn Read>),
}

impl Body {
    pub fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    pub fn from_reader(reader: impl Read + 'static) -> Self {
        Self {
            inner: Inner::Reader(Box::new(reader)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.inner, Inner::Empty)
    }

    /// Drain the body into memory. In-memory bodies are returned without
    /// copying when nothing has been read from them yet.
    pub fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self.inner {
            Inner::Empty => Ok(Vec::new()),
            Inner::Bytes(cursor) if cursor.position() == 0 => Ok(cursor.into_inner()),
            Inner::Bytes(mut cursor) => {
                let mut rest = Vec::new();
                cursor.read_to_end(&mut rest)?;
                Ok(rest)
            }
            Inner::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Empty => Ok(0),
            Inner::Bytes(cursor) => cursor.read(buf),
            Inner::Reader(reader) => reader.read(buf),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Inner::Empty => f.write_str("Body(empty)"),
            Inner::Bytes(cursor) => write!(f, "Body({} bytes)", cursor.get_ref().len()),
            Inner::Reader(_) => f.write_str("Body(stream)"),
        }
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            inner: Inner::Bytes(Cursor::new(bytes)),
        }
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from(text.into_bytes())
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Body {
    fn from(bytes: &[u8]) -> Self {
        Self::from(bytes.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Multipart
// ---------------------------------------------------------------------------

const OCTET_STREAM: &str = "application/octet-stream";

/// In-memory `multipart/form-data` encoder.
///
/// `finish` consumes the writer, so the closing boundary is written exactly
/// once and no part can be added afterwards.
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    buf: Vec<u8>,
    parts: usize,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(Uuid::new_v4().simple().to_string())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: Vec::new(),
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn write_field(&mut self, name: &str, value: &str) {
        self.begin_part(name, None, None);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Append a file part, streaming its content from `reader`.
    pub fn write_file(
        &mut self,
        name: &str,
        file_name: &str,
        reader: &mut dyn Read,
    ) -> io::Result<u64> {
        self.begin_part(name, Some(file_name), Some(OCTET_STREAM));
        io::copy(reader, &mut self.buf)
    }

    /// Write the closing boundary and return the encoded body.
    pub fn finish(mut self) -> Vec<u8> {
        if self.parts > 0 {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");
        self.buf
    }

    fn begin_part(&mut self, name: &str, file_name: Option<&str>, content_type: Option<&str>) {
        if self.parts > 0 {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.parts += 1;
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"\r\nContent-Disposition: form-data; name=\"");
        self.buf.extend_from_slice(escape_quotes(name).as_bytes());
        self.buf.extend_from_slice(b"\"");
        if let Some(file_name) = file_name {
            self.buf.extend_from_slice(b"; filename=\"");
            self.buf.extend_from_slice(escape_quotes(file_name).as_bytes());
            self.buf.extend_from_slice(b"\"");
        }
        if let Some(content_type) = content_type {
            self.buf.extend_from_slice(b"\r\nContent-Type: ");
            self.buf.extend_from_slice(content_type.as_bytes());
        }
        self.buf.extend_from_slice(b"\r\n\r\n");
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "\\\r")
        .replace('\n', "\\\n")
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// How a response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFormat {
    Json,
    Yaml,
    /// Raw bytes, text, or a numeric scalar.
    Body,
}

impl FromStr for DecodeFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "yaml" => Ok(Self::Yaml),
            "body" => Ok(Self::Body),
            _ => Err(Error::UnsupportedFormat),
        }
    }
}

impl fmt::Display for DecodeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Body => "body",
        })
    }
}

/// A value that JSON or YAML can be decoded into, erased over its type.
pub trait StructuredSlot {
    fn type_name(&self) -> &'static str;
    fn decode_json(&mut self, reader: &mut dyn Read) -> Result<(), serde_json::Error>;
    fn decode_yaml(&mut self, reader: &mut dyn Read) -> Result<(), serde_yaml::Error>;
}

impl<T: DeserializeOwned> StructuredSlot for T {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn decode_json(&mut self, reader: &mut dyn Read) -> Result<(), serde_json::Error> {
        *self = serde_json::from_reader(reader)?;
        Ok(())
    }

    fn decode_yaml(&mut self, reader: &mut dyn Read) -> Result<(), serde_yaml::Error> {
        *self = serde_yaml::from_reader(reader)?;
        Ok(())
    }
}

/// Numeric destination that can also be filled from JSON or YAML.
pub trait NumericSlot: ScalarSlot {
    fn as_structured(&mut self) -> &mut dyn StructuredSlot;
}

impl<T: Scalar + DeserializeOwned> NumericSlot for T {
    fn as_structured(&mut self) -> &mut dyn StructuredSlot {
        self
    }
}

/// Where a decoded body goes.
pub enum Target<'a> {
    /// Any deserializable value (JSON/YAML only).
    Structured(&'a mut dyn StructuredSlot),
    /// Raw bytes are streamed into the writer without buffering.
    Sink(&'a mut dyn Write),
    Text(&'a mut String),
    Bytes(&'a mut Vec<u8>),
    Scalar(&'a mut dyn NumericSlot),
}

impl<'a> Target<'a> {
    pub fn structured<T: DeserializeOwned>(value: &'a mut T) -> Self {
        Target::Structured(value)
    }

    pub fn sink<W: Write>(writer: &'a mut W) -> Self {
        Target::Sink(writer)
    }

    pub fn text(value: &'a mut String) -> Self {
        Target::Text(value)
    }

    pub fn bytes(value: &'a mut Vec<u8>) -> Self {
        Target::Bytes(value)
    }

    pub fn scalar<T: Scalar + DeserializeOwned>(value: &'a mut T) -> Self {
        Target::Scalar(value)
    }

    /// Name of the destination type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Target::Structured(slot) => slot.type_name(),
            Target::Sink(_) => "dyn std::io::Write",
            Target::Text(_) => "alloc::string::String",
            Target::Bytes(_) => "alloc::vec::Vec<u8>",
            Target::Scalar(slot) => slot.type_name(),
        }
    }

    fn as_structured(&mut self) -> Option<&mut dyn StructuredSlot> {
        match self {
            Target::Structured(slot) => Some(&mut **slot),
            Target::Text(value) => Some(&mut **value),
            Target::Bytes(value) => Some(&mut **value),
            Target::Scalar(slot) => Some(slot.as_structured()),
            Target::Sink(_) => None,
        }
    }
}

impl fmt::Debug for Target<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Target").field(&self.type_name()).finish()
    }
}

/// Decodes one body stream into a `Target`.
#[derive(Debug)]
pub struct BodyDecoder<R> {
    reader: R,
}

impl<R: Read> BodyDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn decode(self, target: Target<'_>, format: DecodeFormat) -> Result<(), Error> {
        decode_body(self.reader, target, format)
    }
}

/// Decode `reader` into `target` according to `format`.
///
/// JSON and YAML errors are returned unmodified. For `DecodeFormat::Body`
/// the stream is copied verbatim into a `Target::Sink`, otherwise read once
/// into memory and handed to the string, byte vector, or scalar target.
pub fn decode_body(
    mut reader: impl Read,
    mut target: Target<'_>,
    format: DecodeFormat,
) -> Result<(), Error> {
    match format {
        DecodeFormat::Json => {
            let type_name = target.type_name();
            let slot = target.as_structured().ok_or(Error::UnknownType(type_name))?;
            slot.decode_json(&mut reader)?;
            Ok(())
        }
        DecodeFormat::Yaml => {
            let type_name = target.type_name();
            let slot = target.as_structured().ok_or(Error::UnknownType(type_name))?;
            slot.decode_yaml(&mut reader)?;
            Ok(())
        }
        DecodeFormat::Body => decode_raw(reader, target),
    }
}

fn decode_raw(mut reader: impl Read, target: Target<'_>) -> Result<(), Error> {
    match target {
        Target::Sink(writer) => {
            io::copy(&mut reader, writer)?;
        }
        Target::Structured(slot) => return Err(Error::UnknownType(slot.type_name())),
        Target::Text(value) => *value = take_text(read_all(reader)?)?,
        Target::Bytes(value) => *value = read_all(reader)?,
        Target::Scalar(slot) => slot.assign_text(&take_text(read_all(reader)?)?)?,
    }
    Ok(())
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Reinterpret the read buffer as text, taking ownership instead of copying.
fn take_text(buf: Vec<u8>) -> Result<String, Error> {
    Ok(String::from_utf8(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Person {
        id: i64,
        name: String,
    }

    #[test]
    fn json_decodes_into_struct() {
        let mut person = Person::default();
        decode_body(
            &br#"{"id":1,"name":"x"}"#[..],
            Target::structured(&mut person),
            DecodeFormat::Json,
        )
        .unwrap();
        assert_eq!(
            person,
            Person {
                id: 1,
                name: "x".into()
            }
        );
    }

    #[test]
    fn yaml_decodes_into_struct() {
        let mut person = Person::default();
        decode_body(
            &b"id: 7\nname: yaml\n"[..],
            Target::structured(&mut person),
            DecodeFormat::Yaml,
        )
        .unwrap();
        assert_eq!(person.id, 7);
        assert_eq!(person.name, "yaml");
    }

    #[test]
    fn malformed_json_is_returned_unmodified() {
        let mut person = Person::default();
        let err = decode_body(&b"{not json"[..], Target::structured(&mut person), DecodeFormat::Json)
            .unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn json_number_into_scalar_target() {
        let mut n = 0u8;
        decode_body(&b"42"[..], Target::scalar(&mut n), DecodeFormat::Json).unwrap();
        assert_eq!(n, 42);
    }

    #[test]
    fn json_into_sink_is_unknown_type() {
        let mut sink = Vec::new();
        let err = decode_body(&b"{}"[..], Target::sink(&mut sink), DecodeFormat::Json).unwrap_err();
        assert!(matches!(err, Error::UnknownType(_)));
    }

    #[test]
    fn raw_body_streams_into_sink() {
        let mut sink = Vec::new();
        decode_body(&b"raw \x00 bytes"[..], Target::sink(&mut sink), DecodeFormat::Body).unwrap();
        assert_eq!(sink, b"raw \x00 bytes");
    }

    #[test]
    fn raw_body_into_string() {
        let mut text = String::from("old");
        decode_body(&b"hello world"[..], Target::text(&mut text), DecodeFormat::Body).unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn text_takes_the_read_buffer_without_copying() {
        let buf = b"exact bytes".to_vec();
        let ptr = buf.as_ptr();
        let text = take_text(buf).unwrap();
        assert_eq!(text.as_ptr(), ptr);
        assert_eq!(text, "exact bytes");
    }

    #[test]
    fn raw_body_rejects_invalid_utf8_for_string() {
        let mut text = String::new();
        let err = decode_body(&[0xff, 0xfe][..], Target::text(&mut text), DecodeFormat::Body)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8(_)));
    }

    #[test]
    fn raw_body_into_bytes() {
        let mut bytes = Vec::new();
        decode_body(&[1u8, 2, 3][..], Target::bytes(&mut bytes), DecodeFormat::Body).unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[test]
    fn raw_body_into_scalars() {
        let mut small = 0i8;
        decode_body(&b"-12"[..], Target::scalar(&mut small), DecodeFormat::Body).unwrap();
        assert_eq!(small, -12);

        let mut ratio = 0f64;
        decode_body(&b"0.25"[..], Target::scalar(&mut ratio), DecodeFormat::Body).unwrap();
        assert_eq!(ratio, 0.25);

        let mut nanos = 0i64;
        decode_body(&b"2s"[..], Target::scalar(&mut nanos), DecodeFormat::Body).unwrap();
        assert_eq!(nanos, 2_000_000_000);
    }

    #[test]
    fn raw_body_scalar_overflow_errors() {
        let mut small = 0u8;
        let err = decode_body(&b"300"[..], Target::scalar(&mut small), DecodeFormat::Body)
            .unwrap_err();
        assert!(matches!(err, Error::Scalar { type_name: "u8", .. }));
        assert_eq!(small, 0);
    }

    #[test]
    fn raw_body_into_struct_names_the_type() {
        let mut person = Person::default();
        let err = decode_body(&b"{}"[..], Target::structured(&mut person), DecodeFormat::Body)
            .unwrap_err();
        match err {
            Error::UnknownType(name) => assert!(name.ends_with("Person"), "{name}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decoder_wraps_reader() {
        let mut text = String::new();
        BodyDecoder::new(Body::from("via decoder"))
            .decode(Target::text(&mut text), DecodeFormat::Body)
            .unwrap();
        assert_eq!(text, "via decoder");
    }

    #[test]
    fn format_parses_known_tags_only() {
        assert_eq!("json".parse::<DecodeFormat>().unwrap(), DecodeFormat::Json);
        assert_eq!("yaml".parse::<DecodeFormat>().unwrap(), DecodeFormat::Yaml);
        assert_eq!("body".parse::<DecodeFormat>().unwrap(), DecodeFormat::Body);
        assert!(matches!("xml".parse::<DecodeFormat>(), Err(Error::UnsupportedFormat)));
    }

    #[test]
    fn body_into_bytes_returns_in_memory_buffer() {
        let body = Body::from(vec![9u8, 8, 7]);
        assert!(!body.is_empty());
        assert_eq!(body.into_bytes().unwrap(), vec![9, 8, 7]);
        assert!(Body::empty().is_empty());
        assert!(Body::empty().into_bytes().unwrap().is_empty());
    }

    #[test]
    fn body_reader_is_drained() {
        let body = Body::from_reader(Cursor::new(b"streamed".to_vec()));
        assert_eq!(body.into_bytes().unwrap(), b"streamed");
    }

    #[test]
    fn multipart_layout() {
        let mut writer = MultipartWriter::with_boundary("XYZ");
        writer.write_field("name", "value");
        writer
            .write_file("upload", "a\"b.txt", &mut &b"file data"[..])
            .unwrap();
        assert_eq!(writer.content_type(), "multipart/form-data; boundary=XYZ");
        let body = String::from_utf8(writer.finish()).unwrap();
        assert_eq!(
            body,
            "--XYZ\r\n\
             Content-Disposition: form-data; name=\"name\"\r\n\r\n\
             value\r\n\
             --XYZ\r\n\
             Content-Disposition: form-data; name=\"upload\"; filename=\"a\\\"b.txt\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             file data\r\n\
             --XYZ--\r\n"
        );
    }

    #[test]
    fn empty_multipart_only_closes() {
        let writer = MultipartWriter::with_boundary("B");
        assert_eq!(writer.finish(), b"--B--\r\n");
    }

    #[test]
    fn random_boundaries_differ() {
        assert_ne!(MultipartWriter::new().boundary(), MultipartWriter::new().boundary());
    }
}
