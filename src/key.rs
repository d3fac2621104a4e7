//! Decoding raw input bytes into semantic key events.
//!
//! The awkward case is ESC: it is both a complete key and the prefix of
//! every arrow/function sequence. A short timeout decides — if nothing
//! follows within [`CHAR_TIMEOUT`](crate::term::CHAR_TIMEOUT) the byte was
//! a lone Escape, otherwise the continuation bytes are collected and
//! matched. Unrecognized sequences are consumed and reported as
//! [`Key::Unknown`] so they have no editing side effects.

use std::os::fd::RawFd;
use std::time::Duration;

use crate::term::{self, Read1, CHAR_TIMEOUT};

/// A decoded key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Enter,
    Tab,
    Backspace,
    Escape,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    WordLeft,
    WordRight,
    CtrlA,
    CtrlB,
    CtrlC,
    CtrlD,
    CtrlE,
    CtrlF,
    CtrlH,
    CtrlK,
    CtrlL,
    CtrlN,
    CtrlP,
    CtrlT,
    CtrlU,
    CtrlW,
    /// Anything self-inserting, including control bytes we don't name.
    Char(char),
    /// End of input or read error.
    Eof,
    /// Nothing arrived within the probe window (only from [`probe_key`]).
    Timeout,
    /// A consumed escape sequence with no editing meaning.
    Unknown,
}

impl Key {
    /// Decode a single byte, with no lookahead. A bare `0x1b` maps to
    /// `Escape`; sequence assembly is [`read_key`]'s job.
    fn from_byte(b: u8) -> Key {
        match b {
            0x01 => Key::CtrlA,
            0x02 => Key::CtrlB,
            0x03 => Key::CtrlC,
            0x04 => Key::CtrlD,
            0x05 => Key::CtrlE,
            0x06 => Key::CtrlF,
            0x08 => Key::CtrlH,
            0x09 => Key::Tab,
            0x0b => Key::CtrlK,
            0x0c => Key::CtrlL,
            0x0d => Key::Enter,
            0x0e => Key::CtrlN,
            0x10 => Key::CtrlP,
            0x14 => Key::CtrlT,
            0x15 => Key::CtrlU,
            0x17 => Key::CtrlW,
            0x1b => Key::Escape,
            0x7f => Key::Backspace,
            b => Key::Char(b as char),
        }
    }
}

/// Read one key event from `fd`, blocking for the first byte.
pub fn read_key(fd: RawFd) -> Key {
    match term::getc(fd, None) {
        Read1::Byte(0x1b) => read_escape(fd),
        Read1::Byte(b) => Key::from_byte(b),
        Read1::Timeout | Read1::Eof => Key::Eof,
    }
}

/// Non-blocking single-byte probe used between loop iterations. Never
/// follows escape sequences — callers only compare against simple exit
/// keys like Ctrl-D.
pub fn probe_key(fd: RawFd, timeout: Duration) -> Key {
    match term::getc(fd, Some(timeout)) {
        Read1::Byte(b) => Key::from_byte(b),
        Read1::Timeout => Key::Timeout,
        Read1::Eof => Key::Eof,
    }
}

/// An ESC byte arrived; disambiguate key from sequence.
fn read_escape(fd: RawFd) -> Key {
    if term::would_block(fd, CHAR_TIMEOUT) {
        return Key::Escape;
    }
    let Some(s0) = seq_byte(fd) else {
        return Key::Escape;
    };
    let Some(s1) = seq_byte(fd) else {
        return Key::Unknown;
    };
    match (s0, s1) {
        (b'[', b'0'..=b'9') => read_extended(fd, s1),
        (b'[', b'A') => Key::Up,
        (b'[', b'B') => Key::Down,
        (b'[', b'C') => Key::Right,
        (b'[', b'D') => Key::Left,
        (b'[', b'H') | (b'O', b'H') => Key::Home,
        (b'[', b'F') | (b'O', b'F') => Key::End,
        _ => Key::Unknown,
    }
}

/// `ESC [ <digit>` prefix: delete key and ctrl-arrow word motions.
fn read_extended(fd: RawFd, digit: u8) -> Key {
    match seq_byte(fd) {
        Some(b'~') if digit == b'3' => Key::Delete,
        Some(b';') => {
            let s3 = seq_byte(fd);
            let s4 = seq_byte(fd);
            match (s3, s4) {
                (Some(b'5'), Some(b'C')) => Key::WordRight,
                (Some(b'5'), Some(b'D')) => Key::WordLeft,
                _ => Key::Unknown,
            }
        }
        _ => Key::Unknown,
    }
}

fn seq_byte(fd: RawFd) -> Option<u8> {
    match term::getc(fd, Some(CHAR_TIMEOUT)) {
        Read1::Byte(b) => Some(b),
        Read1::Timeout | Read1::Eof => None,
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::AsRawFd;

    fn keys_for(bytes: &[u8]) -> Vec<Key> {
        let (r, mut w) = os_pipe::pipe().expect("pipe");
        w.write_all(bytes).expect("write");
        drop(w);
        let fd = r.as_raw_fd();
        let mut out = Vec::new();
        loop {
            match read_key(fd) {
                Key::Eof => break,
                k => out.push(k),
            }
        }
        out
    }

    #[test]
    fn printable_bytes_decode_to_chars() {
        assert_eq!(
            keys_for(b"hi!"),
            vec![Key::Char('h'), Key::Char('i'), Key::Char('!')]
        );
    }

    #[test]
    fn named_control_bytes_decode() {
        assert_eq!(
            keys_for(&[0x01, 0x05, 0x0d, 0x7f, 0x09]),
            vec![Key::CtrlA, Key::CtrlE, Key::Enter, Key::Backspace, Key::Tab]
        );
    }

    #[test]
    fn unnamed_control_bytes_self_insert() {
        // Ctrl-G has no binding and self-inserts.
        assert_eq!(keys_for(&[0x07]), vec![Key::Char('\u{7}')]);
    }

    #[test]
    fn arrow_and_home_end_sequences_decode() {
        assert_eq!(
            keys_for(b"\x1b[A\x1b[B\x1b[C\x1b[D\x1b[H\x1b[F\x1bOH\x1bOF"),
            vec![
                Key::Up,
                Key::Down,
                Key::Right,
                Key::Left,
                Key::Home,
                Key::End,
                Key::Home,
                Key::End,
            ]
        );
    }

    #[test]
    fn delete_and_word_motion_sequences_decode() {
        assert_eq!(
            keys_for(b"\x1b[3~\x1b[1;5C\x1b[1;5D"),
            vec![Key::Delete, Key::WordRight, Key::WordLeft]
        );
    }

    #[test]
    fn unrecognized_sequences_are_consumed_silently() {
        // Page-up and a stray SS3 sequence decode to Unknown, and the
        // bytes after them still decode normally.
        assert_eq!(
            keys_for(b"\x1b[5~x"),
            vec![Key::Unknown, Key::Char('x')]
        );
        assert_eq!(keys_for(b"\x1bOZq"), vec![Key::Unknown, Key::Char('q')]);
    }

    #[test]
    fn lone_escape_decodes_after_the_probe_window() {
        assert_eq!(keys_for(b"\x1b"), vec![Key::Escape]);
    }

    #[test]
    fn probe_key_times_out_without_input() {
        let (r, _w) = os_pipe::pipe().expect("pipe");
        let got = probe_key(r.as_raw_fd(), Duration::from_millis(5));
        assert_eq!(got, Key::Timeout);
    }
}
