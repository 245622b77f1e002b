//! Line accumulation and tokenizing.
//!
//! The link delivers bytes one at a time. [`LineCodec`] collects them into the
//! working buffer until a `\r` or `\n` arrives; `\r\n` and blank lines between
//! real content produce no extra lines. A completed line is split by
//! [`parse_line`] into its parts, expressed as [`Span`]s into the line so the
//! engine can keep referring to them across steps.
//!
//! Recognised line shapes:
//!
//! ```text
//! AT                      attention
//! AT+NAME                 run
//! AT+NAME?                read
//! AT+NAME=args            write
//! AT+NAME=?               test
//! OK / ERROR              final result of a request we issued
//! +CME ERROR: n           final result (device error)
//! +NAME: args             response or unsolicited report
//! NAME: args / NAME       bare report
//! ```

use serde::{Deserialize, Serialize};

use crate::command::{is_token_byte, Operation};

/// Outcome of feeding one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feed {
    /// The byte was absorbed; no line is complete yet.
    NeedMore,
    /// A non-empty line is available through [`LineCodec::line`].
    LineReady,
    /// The line did not fit and was dropped. The rest of it, up to its
    /// terminator, will be discarded. `request` tells whether the dropped
    /// line started with `AT`.
    Overflow {
        /// Whether the dropped line was an `AT` request.
        request: bool,
    },
}

/// Accumulates incoming bytes into a fixed working buffer.
#[derive(Debug)]
pub struct LineCodec<'b> {
    buffer: &'b mut [u8],
    len: usize,
    discarding: bool,
}

impl<'b> LineCodec<'b> {
    pub fn new(buffer: &'b mut [u8]) -> Self {
        LineCodec {
            buffer,
            len: 0,
            discarding: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Feed one received byte.
    ///
    /// After [`Feed::LineReady`] the caller must [`clear`](Self::clear) the
    /// codec before feeding more bytes.
    pub fn feed(&mut self, byte: u8) -> Feed {
        if byte == b'\r' || byte == b'\n' {
            if self.discarding {
                self.discarding = false;
                return Feed::NeedMore;
            }
            if self.len == 0 {
                return Feed::NeedMore;
            }
            return Feed::LineReady;
        }

        if self.discarding {
            return Feed::NeedMore;
        }

        if self.len == self.buffer.len() {
            let request = starts_with_at(&self.buffer[..self.len]);
            self.len = 0;
            self.discarding = true;
            return Feed::Overflow { request };
        }

        self.buffer[self.len] = byte;
        self.len += 1;
        Feed::NeedMore
    }

    /// The accumulated line, without terminator.
    pub fn line(&self) -> &[u8] {
        &self.buffer[..self.len]
    }

    /// Whole buffer, for composing a response once the line is consumed.
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }

    pub fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    /// Forget the current line. A pending discard continues.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Whether part of a line has been received, or an overflowed line is
    /// still being skipped.
    pub fn in_progress(&self) -> bool {
        self.len > 0 || self.discarding
    }

    /// Number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.len
    }
}

/// Byte range inside a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    /// The bytes this span covers in `line`.
    pub fn of<'l>(&self, line: &'l [u8]) -> &'l [u8] {
        line.get(self.start..self.end).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Final result line terminating a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalResult {
    Ok,
    Error,
}

/// A tokenized line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    /// Bare `AT`.
    Attention,
    /// `AT` followed by a command.
    Request {
        name: Span,
        op: Operation,
        args: Span,
    },
    /// `AT` followed by something that is not a command.
    Malformed,
    /// `OK`, `ERROR`, `+CME ERROR: ..`, `+CMS ERROR: ..`.
    Final(FinalResult),
    /// `NAME: args` or bare `NAME`.
    Report { name: Span, args: Span },
    /// Anything else.
    Noise,
}

fn starts_with_at(line: &[u8]) -> bool {
    line.len() >= 2 && line[..2].eq_ignore_ascii_case(b"AT")
}

fn is_blank(byte: u8) -> bool {
    byte == b' ' || byte == b'\t'
}

/// Strip surrounding blanks, returning the remaining range.
fn trimmed(line: &[u8], mut start: usize, mut end: usize) -> (usize, usize) {
    while start < end && is_blank(line[start]) {
        start += 1;
    }
    while end > start && is_blank(line[end - 1]) {
        end -= 1;
    }
    (start, end)
}

fn token_end(line: &[u8], start: usize, end: usize) -> usize {
    line[start..end]
        .iter()
        .position(|&b| !is_token_byte(b))
        .map_or(end, |offset| start + offset)
}

/// Split a completed line into its parts.
pub fn parse_line(line: &[u8]) -> Line {
    let (start, end) = trimmed(line, 0, line.len());
    let body = &line[start..end];

    if starts_with_at(body) {
        return parse_request(line, start + 2, end);
    }

    match body {
        b"OK" => return Line::Final(FinalResult::Ok),
        b"ERROR" => return Line::Final(FinalResult::Error),
        _ => {}
    }
    if body.starts_with(b"+CME ERROR") || body.starts_with(b"+CMS ERROR") {
        return Line::Final(FinalResult::Error);
    }

    parse_report(line, start, end)
}

fn parse_request(line: &[u8], start: usize, end: usize) -> Line {
    if start == end {
        return Line::Attention;
    }

    let name_end = token_end(line, start, end);
    if name_end == start {
        return Line::Malformed;
    }
    let name = Span::new(start, name_end);

    match &line[name_end..end] {
        b"" => Line::Request {
            name,
            op: Operation::Run,
            args: Span::new(end, end),
        },
        b"?" => Line::Request {
            name,
            op: Operation::Read,
            args: Span::new(end, end),
        },
        b"=?" => Line::Request {
            name,
            op: Operation::Test,
            args: Span::new(end, end),
        },
        [b'=', ..] => Line::Request {
            name,
            op: Operation::Write,
            args: Span::new(name_end + 1, end),
        },
        _ => Line::Malformed,
    }
}

fn parse_report(line: &[u8], start: usize, end: usize) -> Line {
    let name_end = token_end(line, start, end);
    if name_end == start {
        return Line::Noise;
    }
    let name = Span::new(start, name_end);

    if name_end == end {
        return Line::Report {
            name,
            args: Span::new(end, end),
        };
    }
    if line[name_end] != b':' {
        return Line::Noise;
    }
    let (args_start, args_end) = trimmed(line, name_end + 1, end);
    Line::Report {
        name,
        args: Span::new(args_start, args_end),
    }
}

/// Splits an argument tail on commas outside double quotes.
///
/// Inside quotes a backslash escapes the following byte. Every yielded
/// argument has surrounding blanks removed; quotes are kept for the decoder.
#[derive(Debug, Clone)]
pub struct Arguments<'l> {
    rest: &'l [u8],
    done: bool,
}

impl<'l> Arguments<'l> {
    pub fn new(tail: &'l [u8]) -> Self {
        let (start, end) = trimmed(tail, 0, tail.len());
        Arguments {
            rest: &tail[start..end],
            done: start == end,
        }
    }
}

impl<'l> Iterator for Arguments<'l> {
    type Item = &'l [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut quoted = false;
        let mut escaped = false;
        for (i, &byte) in self.rest.iter().enumerate() {
            if escaped {
                escaped = false;
                continue;
            }
            match byte {
                b'\\' if quoted => escaped = true,
                b'"' => quoted = !quoted,
                b',' if !quoted => {
                    let item = &self.rest[..i];
                    self.rest = &self.rest[i + 1..];
                    let (s, e) = trimmed(item, 0, item.len());
                    return Some(&item[s..e]);
                }
                _ => {}
            }
        }

        self.done = true;
        let item = self.rest;
        let (s, e) = trimmed(item, 0, item.len());
        Some(&item[s..e])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all<'b>(codec: &mut LineCodec<'b>, bytes: &[u8]) -> Vec<Feed> {
        bytes.iter().map(|&b| codec.feed(b)).collect()
    }

    #[test]
    fn test_line_ready_on_cr() {
        let mut buf = [0u8; 32];
        let mut codec = LineCodec::new(&mut buf);
        let feeds = feed_all(&mut codec, b"AT+CSQ\r");
        assert_eq!(feeds.last(), Some(&Feed::LineReady));
        assert_eq!(codec.line(), b"AT+CSQ");
    }

    #[test]
    fn test_crlf_and_blank_lines_are_skipped() {
        let mut buf = [0u8; 32];
        let mut codec = LineCodec::new(&mut buf);
        assert_eq!(codec.feed(b'\n'), Feed::NeedMore);
        assert_eq!(codec.feed(b'\r'), Feed::NeedMore);
        let feeds = feed_all(&mut codec, b"OK\r");
        assert_eq!(feeds, vec![Feed::NeedMore, Feed::NeedMore, Feed::LineReady]);
        codec.clear();
        assert_eq!(codec.feed(b'\n'), Feed::NeedMore);
        assert!(!codec.in_progress());
    }

    #[test]
    fn test_overflow_discards_rest_of_line() {
        let mut buf = [0u8; 4];
        let mut codec = LineCodec::new(&mut buf);
        let feeds = feed_all(&mut codec, b"AT+LONG");
        assert_eq!(feeds[4], Feed::Overflow { request: true });
        assert!(codec.in_progress());
        assert_eq!(codec.buffered_len(), 0);

        assert_eq!(codec.feed(b'\r'), Feed::NeedMore);
        assert!(!codec.in_progress());

        let feeds = feed_all(&mut codec, b"OK\n");
        assert_eq!(feeds.last(), Some(&Feed::LineReady));
        assert_eq!(codec.line(), b"OK");
    }

    #[test]
    fn test_overflow_of_report_line() {
        let mut buf = [0u8; 3];
        let mut codec = LineCodec::new(&mut buf);
        let feeds = feed_all(&mut codec, b"+CMTI");
        assert_eq!(feeds[3], Feed::Overflow { request: false });
    }

    #[test]
    fn test_parse_requests() {
        let line = b"AT+CGDCONT=\"internet\",\"\",\"\"";
        match parse_line(line) {
            Line::Request { name, op, args } => {
                assert_eq!(name.of(line), b"+CGDCONT");
                assert_eq!(op, Operation::Write);
                assert_eq!(args.of(line), b"\"internet\",\"\",\"\"");
            }
            other => panic!("unexpected {:?}", other),
        }

        let ops: Vec<Operation> = [&b"AT+CCID?"[..], b"at+CCID=?", b"AT+CCID"]
            .iter()
            .map(|l| match parse_line(l) {
                Line::Request { op, .. } => op,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(ops, vec![Operation::Read, Operation::Test, Operation::Run]);
    }

    #[test]
    fn test_parse_attention_and_malformed() {
        assert_eq!(parse_line(b"AT"), Line::Attention);
        assert_eq!(parse_line(b"  at "), Line::Attention);
        assert_eq!(parse_line(b"AT?"), Line::Malformed);
        assert_eq!(parse_line(b"AT+CSQ?1"), Line::Malformed);
        assert_eq!(parse_line(b"AT+A;+B"), Line::Malformed);
    }

    #[test]
    fn test_parse_final_results() {
        assert_eq!(parse_line(b"OK"), Line::Final(FinalResult::Ok));
        assert_eq!(parse_line(b"ERROR"), Line::Final(FinalResult::Error));
        assert_eq!(
            parse_line(b"+CME ERROR: 10"),
            Line::Final(FinalResult::Error)
        );
    }

    #[test]
    fn test_parse_reports() {
        let line = b"+CMTI: \"SM\",5";
        match parse_line(line) {
            Line::Report { name, args } => {
                assert_eq!(name.of(line), b"+CMTI");
                assert_eq!(args.of(line), b"\"SM\",5");
            }
            other => panic!("unexpected {:?}", other),
        }

        let line = b"CGATT:1";
        match parse_line(line) {
            Line::Report { name, args } => {
                assert_eq!(name.of(line), b"CGATT");
                assert_eq!(args.of(line), b"1");
            }
            other => panic!("unexpected {:?}", other),
        }

        let line = b"RING";
        match parse_line(line) {
            Line::Report { name, args } => {
                assert_eq!(name.of(line), b"RING");
                assert!(args.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(parse_line(b"hello world"), Line::Noise);
        assert_eq!(parse_line(b"> "), Line::Noise);
    }

    #[test]
    fn test_arguments_split_outside_quotes() {
        let args: Vec<&[u8]> = Arguments::new(b"1, \"IP\",\"a,b\" ,").collect();
        assert_eq!(args, vec![&b"1"[..], b"\"IP\"", b"\"a,b\"", b""]);
    }

    #[test]
    fn test_arguments_escaped_quote() {
        let args: Vec<&[u8]> = Arguments::new(br#""say \"hi\", ok",2"#).collect();
        assert_eq!(args, vec![&br#""say \"hi\", ok""#[..], b"2"]);
    }

    #[test]
    fn test_arguments_empty_tail() {
        assert_eq!(Arguments::new(b"").count(), 0);
        assert_eq!(Arguments::new(b"  ").count(), 0);
        assert_eq!(Arguments::new(b",").count(), 2);
    }
}
