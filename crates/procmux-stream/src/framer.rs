use std::borrow::Cow;
use std::io;

use bytes::{BufMut, Bytes, BytesMut};

use crate::sink::ByteSink;

/// Line separator.
pub const NEWLINE: u8 = b'\n';

/// How chunk bytes are interpreted before framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TextEncoding {
    /// Decode each chunk as UTF-8, replacing invalid sequences.
    ///
    /// A multi-byte character split across two chunks is replaced on both
    /// sides of the split.
    #[default]
    Utf8,
    /// Pass bytes through untouched.
    Raw,
}

/// Injects a prefix before every line of a chunked byte stream.
///
/// The only state kept between calls is whether a prefix is owed before the
/// next emitted byte, so a line split across chunks is prefixed exactly once.
#[derive(Debug, Clone)]
pub struct LineFramer {
    prefix: Bytes,
    encoding: TextEncoding,
    prefix_owed: bool,
}

impl LineFramer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_encoding(prefix, TextEncoding::default())
    }

    pub fn with_encoding(prefix: impl Into<String>, encoding: TextEncoding) -> Self {
        Self {
            prefix: Bytes::from(prefix.into()),
            encoding,
            prefix_owed: true,
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Whether the next emitted byte starts a new line.
    pub fn prefix_owed(&self) -> bool {
        self.prefix_owed
    }

    /// Transform one chunk. Chunks must be passed in arrival order.
    pub fn process(&mut self, chunk: &[u8]) -> Bytes {
        if chunk.is_empty() {
            return Bytes::new();
        }

        let text: Cow<'_, [u8]> = match self.encoding {
            TextEncoding::Utf8 => match String::from_utf8_lossy(chunk) {
                Cow::Borrowed(text) => Cow::Borrowed(text.as_bytes()),
                Cow::Owned(text) => Cow::Owned(text.into_bytes()),
            },
            TextEncoding::Raw => Cow::Borrowed(chunk),
        };

        let mut out = BytesMut::with_capacity(text.len() + self.prefix.len());
        let mut segments = text.split(|&b| b == NEWLINE);
        // `split` always yields at least one segment: the text after the
        // final separator.
        let remainder = segments.next_back().unwrap_or_default();

        for line in segments {
            self.emit_owed_prefix(&mut out);
            out.extend_from_slice(line);
            out.put_u8(NEWLINE);
            self.prefix_owed = true;
        }

        if !remainder.is_empty() {
            self.emit_owed_prefix(&mut out);
            out.extend_from_slice(remainder);
        }

        out.freeze()
    }

    fn emit_owed_prefix(&mut self, out: &mut BytesMut) {
        if self.prefix_owed {
            out.extend_from_slice(&self.prefix);
            self.prefix_owed = false;
        }
    }
}

/// Pipeline stage that frames chunks with a [`LineFramer`] before handing
/// them to the next sink.
pub struct FramedSink<S> {
    framer: LineFramer,
    inner: S,
}

impl<S: ByteSink> FramedSink<S> {
    pub fn new(framer: LineFramer, inner: S) -> Self {
        Self { framer, inner }
    }

    pub fn framer(&self) -> &LineFramer {
        &self.framer
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ByteSink> ByteSink for FramedSink<S> {
    fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        let framed = self.framer.process(chunk);
        if framed.is_empty() {
            return Ok(());
        }
        self.inner.write_chunk(&framed)
    }

    fn end(&mut self) -> io::Result<()> {
        self.inner.end()
    }

    fn abort(&mut self, err: &io::Error) {
        self.inner.abort(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;

    fn run(prefix: &str, chunks: &[&[u8]]) -> Vec<u8> {
        let mut framer = LineFramer::new(prefix);
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend_from_slice(&framer.process(chunk));
        }
        out
    }

    #[test]
    fn prefixes_every_complete_line() {
        let out = run("[P] ", &[b"Line1\nLine2\nLine3\n"]);
        assert_eq!(out, b"[P] Line1\n[P] Line2\n[P] Line3\n");
    }

    #[test]
    fn line_split_across_chunks_gets_one_prefix() {
        let out = run("[P] ", &[b"Line1\nPartia", b"lLine\nLine2\n"]);
        assert_eq!(out, b"[P] Line1\n[P] PartialLine\n[P] Line2\n");
    }

    #[test]
    fn empty_chunk_produces_nothing() {
        let mut framer = LineFramer::new("> ");
        assert!(framer.process(b"").is_empty());
        assert!(framer.prefix_owed());
    }

    #[test]
    fn separators_only() {
        let out = run("> ", &[b"\n\n\n"]);
        assert_eq!(out, b"> \n> \n> \n");
    }

    #[test]
    fn chunk_without_separator_is_prefixed_once() {
        let mut framer = LineFramer::new("> ");
        assert_eq!(framer.process(b"abc").as_ref(), b"> abc");
        assert!(!framer.prefix_owed());
        assert_eq!(framer.process(b"def").as_ref(), b"def");
        assert_eq!(framer.process(b"\n").as_ref(), b"\n");
        assert!(framer.prefix_owed());
        assert_eq!(framer.process(b"g").as_ref(), b"> g");
    }

    #[test]
    fn rechunking_matches_single_chunk() {
        let text = b"alpha\nbeta gamma\n\ndelta\nepsilon";
        let whole = run("[x] ", &[text]);

        for size in 1..=text.len() {
            let chunks: Vec<&[u8]> = text.chunks(size).collect();
            assert_eq!(run("[x] ", &chunks), whole, "chunk size {size}");
        }
    }

    #[test]
    fn empty_prefix_is_identity() {
        let out = run("", &[b"a\nb", b"c\n"]);
        assert_eq!(out, b"a\nbc\n");
    }

    #[test]
    fn utf8_encoding_replaces_invalid_bytes() {
        let mut framer = LineFramer::new("> ");
        let out = framer.process(&[b'o', b'k', 0xFF, b'\n']);
        assert_eq!(out.as_ref(), "> ok\u{FFFD}\n".as_bytes());
    }

    #[test]
    fn raw_encoding_keeps_bytes() {
        let mut framer = LineFramer::with_encoding("> ", TextEncoding::Raw);
        let out = framer.process(&[0xFF, b'\n']);
        assert_eq!(out.as_ref(), &[b'>', b' ', 0xFF, b'\n']);
    }

    #[test]
    fn framed_sink_skips_empty_writes() {
        let memory = MemorySink::new();
        let mut sink = FramedSink::new(LineFramer::new("# "), memory.clone());

        sink.write_chunk(b"").unwrap();
        sink.write_chunk(b"one\ntw").unwrap();
        sink.write_chunk(b"o\n").unwrap();
        sink.end().unwrap();

        assert_eq!(memory.contents_string(), "# one\n# two\n");
        assert_eq!(memory.chunks().len(), 2);
        assert!(memory.is_ended());
    }
}
