//! Streaming tokenizer for raw terminal output.
//!
//! [`classify`] turns a byte stream into a lazy sequence of [`Event`]s. Runes
//! are decoded as UTF-8 and sorted into plain text, CSI sequences, the two
//! line control characters and escapes the classifier does not recognise.
//! Nothing is interpreted: `ESC [31m` becomes an `ANSI "31m"` event, not a
//! colour change.
//!
//! Each call to [`Iterator::next`] reads only as far as needed to produce the
//! next event, so the iterator can sit directly on a live PTY reader.

use crate::event::Event;
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, ErrorKind, Read};

const ESC: char = '\x1b';

/// Classify everything readable from `source` into events.
///
/// # Example
///
/// ```
/// use ttywatch::{classify, Event};
///
/// let events: Vec<Event> = classify("text\x1b[31mred".as_bytes())
///     .collect::<std::io::Result<_>>()
///     .unwrap();
/// assert_eq!(events, vec![Event::text("text"), Event::ansi("31m"), Event::text("red")]);
/// ```
pub fn classify<R: Read>(source: R) -> Events<BufReader<R>> {
    Events::new(BufReader::new(source))
}

/// Lazy event sequence over a buffered source. Created by [`classify`].
///
/// Yields `Err` once if the source fails with anything other than end of
/// stream, after flushing the events that were complete before the failure.
pub struct Events<R> {
    source: RuneReader<R>,
    text: String,
    pending: VecDeque<io::Result<Event>>,
    finished: bool,
}

impl<R: BufRead> Events<R> {
    pub fn new(source: R) -> Self {
        Events {
            source: RuneReader::new(source),
            text: String::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Consume one rune (or one escape sequence) from the source.
    fn step(&mut self) {
        match self.source.read_rune() {
            Ok(Some(ESC)) => {
                self.flush_text();
                self.read_escape();
            }
            Ok(Some(ch @ ('\r' | '\n'))) => {
                self.flush_text();
                self.pending.push_back(Ok(Event::control(ch)));
            }
            Ok(Some(ch)) => self.text.push(ch),
            Ok(None) => {
                self.flush_text();
                self.finished = true;
            }
            Err(err) => {
                self.flush_text();
                self.fail(err);
            }
        }
    }

    fn read_escape(&mut self) {
        match self.source.read_rune() {
            Ok(Some('[')) => self.read_csi(),
            Ok(Some(ch)) => self.pending.push_back(Ok(Event::unhandled(ch))),
            // A bare ESC at end of stream produces nothing.
            Ok(None) => self.finished = true,
            Err(err) => self.fail(err),
        }
    }

    fn read_csi(&mut self) {
        let mut sequence = String::new();
        let mut failure = None;
        loop {
            match self.source.read_rune() {
                Ok(Some(ch)) => {
                    sequence.push(ch);
                    if ('\x40'..='\x7e').contains(&ch) {
                        break;
                    }
                }
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        if !sequence.is_empty() {
            self.pending.push_back(Ok(Event::ansi(sequence)));
        }
        if let Some(err) = failure {
            self.fail(err);
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            self.pending.push_back(Ok(Event::text(text)));
        }
    }

    fn fail(&mut self, err: io::Error) {
        self.pending.push_back(Err(err));
        self.finished = true;
    }
}

impl<R: BufRead> Iterator for Events<R> {
    type Item = io::Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.finished {
                return None;
            }
            self.step();
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for Events<R> {}

/// Decodes UTF-8 runes from a buffered reader one at a time.
///
/// Invalid or truncated encodings decode as U+FFFD; the offending leading
/// byte is consumed, a non-continuation byte that follows it is not.
struct RuneReader<R> {
    inner: R,
}

impl<R: BufRead> RuneReader<R> {
    fn new(inner: R) -> Self {
        RuneReader { inner }
    }

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.inner.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek_byte()?;
        if byte.is_some() {
            self.inner.consume(1);
        }
        Ok(byte)
    }

    fn read_rune(&mut self) -> io::Result<Option<char>> {
        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };
        let width = utf8_width(first);
        match width {
            1 => return Ok(Some(first as char)),
            0 => return Ok(Some(char::REPLACEMENT_CHARACTER)),
            _ => {}
        }

        let mut encoded = [first, 0, 0, 0];
        for slot in encoded.iter_mut().take(width).skip(1) {
            match self.peek_byte()? {
                Some(byte) if byte & 0xC0 == 0x80 => {
                    *slot = byte;
                    self.inner.consume(1);
                }
                _ => return Ok(Some(char::REPLACEMENT_CHARACTER)),
            }
        }

        Ok(Some(
            std::str::from_utf8(&encoded[..width])
                .ok()
                .and_then(|s| s.chars().next())
                .unwrap_or(char::REPLACEMENT_CHARACTER),
        ))
    }
}

/// Length of the UTF-8 sequence introduced by `first`, or 0 if `first`
/// cannot start one.
fn utf8_width(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => 0,
    }
}
