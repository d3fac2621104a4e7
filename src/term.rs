//! Low-level terminal I/O: raw mode, timed byte reads, size probes.
//!
//! Everything here works on raw file descriptors so the editor can be
//! pointed at descriptors other than stdin/stdout (tests use pipes).

use std::io::{self, Write};
use std::os::fd::RawFd;
use std::time::Duration;

use crossterm::{cursor, execute, terminal};

/// How long to wait for the continuation bytes of an escape sequence and
/// for cursor-probe replies. Long enough for any terminal-assembled
/// sequence, short enough that a lone ESC feels instant.
pub const CHAR_TIMEOUT: Duration = Duration::from_millis(20);

/// Column count assumed when every size probe fails.
pub const DEFAULT_COLS: usize = 80;

/// `true` if `fd` refers to a terminal.
pub fn isatty(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

/// `true` if `TERM` names a terminal we can't drive with escape sequences.
pub fn unsupported_term() -> bool {
    matches!(
        std::env::var("TERM").as_deref(),
        Ok("dumb" | "cons25" | "emacs")
    )
}

// ── Timed byte reads ──────────────────────────────────────────────────────────

/// Outcome of a single-byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Read1 {
    Byte(u8),
    /// No byte arrived within the timeout.
    Timeout,
    /// End of input, or a read error (both end the session the same way).
    Eof,
}

/// Wait until `fd` is readable. `None` blocks indefinitely.
///
/// Poll errors report the descriptor as not readable; the subsequent read
/// will surface the real failure.
fn wait_readable(fd: RawFd, timeout: Option<Duration>) -> bool {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let ms: libc::c_int = match timeout {
        Some(t) => t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    };
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
        if rc >= 0 {
            return rc > 0 && (pfd.revents & (libc::POLLIN | libc::POLLHUP)) != 0;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return false;
        }
    }
}

/// `true` iff no byte is available on `fd` within `timeout`.
pub fn would_block(fd: RawFd, timeout: Duration) -> bool {
    !wait_readable(fd, Some(timeout))
}

/// Read one byte from `fd`.
///
/// `None` blocks until a byte arrives; `Some(t)` waits at most `t` (a zero
/// duration polls). EOF and read errors both collapse to [`Read1::Eof`]:
/// the editor treats them identically.
pub fn getc(fd: RawFd, timeout: Option<Duration>) -> Read1 {
    if timeout.is_some() && !wait_readable(fd, timeout) {
        return Read1::Timeout;
    }
    let mut b: u8 = 0;
    loop {
        let n = unsafe { libc::read(fd, (&raw mut b).cast(), 1) };
        if n == 1 {
            return Read1::Byte(b);
        }
        if n == 0 {
            return Read1::Eof;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Read1::Eof;
        }
    }
}

// ── Writing ───────────────────────────────────────────────────────────────────

/// `io::Write` over a raw file descriptor.
///
/// The editor renders through this for real sessions; tests swap in a
/// `Vec<u8>` to capture the emitted escape sequences.
pub struct FdWriter(RawFd);

impl FdWriter {
    pub fn new(fd: RawFd) -> Self {
        FdWriter(fd)
    }
}

impl Write for FdWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            let n = unsafe { libc::write(self.0, buf.as_ptr().cast(), buf.len()) };
            if n >= 0 {
                return Ok(n as usize);
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Raw mode ──────────────────────────────────────────────────────────────────

/// Snapshot the current attributes of `fd` and switch it to raw mode:
/// no break-to-SIGINT, no CR translation, no parity check, no 8th-bit
/// strip, no flow control, no output post-processing, 8-bit chars, no
/// echo, no canonical buffering, no extended input, no signal chars, and
/// reads that return every single byte without timeout.
///
/// Returns the snapshot so the caller can [`restore_mode`] later.
pub fn enter_raw_mode(fd: RawFd) -> io::Result<libc::termios> {
    let orig = tcgetattr(fd)?;
    let mut raw = orig;
    raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
    raw.c_oflag &= !libc::OPOST;
    raw.c_cflag |= libc::CS8;
    raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN | libc::ISIG);
    raw.c_cc[libc::VMIN] = 1;
    raw.c_cc[libc::VTIME] = 0;
    tcsetattr(fd, &raw)?;
    Ok(orig)
}

/// Reapply a termios snapshot taken by [`enter_raw_mode`].
pub fn restore_mode(fd: RawFd, attrs: &libc::termios) -> io::Result<()> {
    tcsetattr(fd, attrs)
}

fn tcgetattr(fd: RawFd) -> io::Result<libc::termios> {
    let mut attrs: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(fd, &mut attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(attrs)
}

fn tcsetattr(fd: RawFd, attrs: &libc::termios) -> io::Result<()> {
    // TCSAFLUSH: apply after pending output drains, discard unread input.
    if unsafe { libc::tcsetattr(fd, libc::TCSAFLUSH, attrs) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// ── Size probes ───────────────────────────────────────────────────────────────

/// Number of columns on the terminal behind `ofd`.
///
/// Tries the window-size ioctl first. When that fails (not a tty, serial
/// line, ...) falls back to asking the terminal itself: probe the cursor
/// column, jump far right, probe again, then undo the jump. Probe replies
/// are read with [`CHAR_TIMEOUT`] per byte so a mute terminal cannot hang
/// the editor. Assumes [`DEFAULT_COLS`] when everything fails.
pub fn get_columns<W: Write>(ifd: RawFd, ofd: RawFd, out: &mut W) -> usize {
    let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
    if unsafe { libc::ioctl(ofd, libc::TIOCGWINSZ, &mut ws) } == 0 && ws.ws_col > 0 {
        return ws.ws_col as usize;
    }
    probe_columns(ifd, out).unwrap_or(DEFAULT_COLS)
}

fn probe_columns<W: Write>(ifd: RawFd, out: &mut W) -> Option<usize> {
    let start = cursor_column(ifd, out)?;
    // Jump to the right margin and see where the cursor lands.
    out.write_all(b"\x1b[999C").ok()?;
    out.flush().ok()?;
    let cols = cursor_column(ifd, out)?;
    if cols > start {
        let _ = write!(out, "\x1b[{}D", cols - start);
        let _ = out.flush();
    }
    Some(cols)
}

/// Ask the terminal for the cursor position (`ESC [ 6 n`) and parse the
/// `ESC [ rows ; cols R` reply, returning the column.
fn cursor_column<W: Write>(ifd: RawFd, out: &mut W) -> Option<usize> {
    out.write_all(b"\x1b[6n").ok()?;
    out.flush().ok()?;
    let mut reply = Vec::with_capacity(32);
    while reply.len() < 32 {
        match getc(ifd, Some(CHAR_TIMEOUT)) {
            Read1::Byte(b) => {
                reply.push(b);
                if b == b'R' {
                    break;
                }
            }
            _ => break,
        }
    }
    if reply.len() < 6 || reply[0] != 0x1b || reply[1] != b'[' || *reply.last()? != b'R' {
        return None;
    }
    let body = std::str::from_utf8(&reply[2..reply.len() - 1]).ok()?;
    let (_rows, cols) = body.split_once(';')?;
    cols.parse().ok()
}

// ── Bell and clear ────────────────────────────────────────────────────────────

/// Home the cursor and erase the display.
pub fn clear_screen<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(
        out,
        terminal::Clear(terminal::ClearType::All),
        cursor::MoveTo(0, 0),
    )
}

/// Ring the terminal bell on stderr.
pub fn beep() {
    let mut err = io::stderr();
    let _ = err.write_all(b"\x07");
    let _ = err.flush();
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::fd::AsRawFd;

    #[test]
    fn pipe_is_not_a_tty() {
        let (r, _w) = os_pipe::pipe().expect("pipe");
        assert!(!isatty(r.as_raw_fd()));
    }

    #[test]
    fn getc_reads_written_bytes_in_order() {
        let (r, mut w) = os_pipe::pipe().expect("pipe");
        w.write_all(b"ab").expect("write");
        assert_eq!(getc(r.as_raw_fd(), None), Read1::Byte(b'a'));
        assert_eq!(getc(r.as_raw_fd(), None), Read1::Byte(b'b'));
    }

    #[test]
    fn getc_times_out_on_empty_pipe() {
        let (r, _w) = os_pipe::pipe().expect("pipe");
        let got = getc(r.as_raw_fd(), Some(Duration::from_millis(5)));
        assert_eq!(got, Read1::Timeout);
    }

    #[test]
    fn getc_reports_eof_when_writer_closes() {
        let (r, w) = os_pipe::pipe().expect("pipe");
        drop(w);
        assert_eq!(getc(r.as_raw_fd(), None), Read1::Eof);
    }

    #[test]
    fn would_block_tracks_availability() {
        let (r, mut w) = os_pipe::pipe().expect("pipe");
        assert!(would_block(r.as_raw_fd(), Duration::from_millis(5)));
        w.write_all(b"x").expect("write");
        assert!(!would_block(r.as_raw_fd(), Duration::from_millis(5)));
    }

    #[test]
    fn fd_writer_round_trips() {
        let (mut r, w) = os_pipe::pipe().expect("pipe");
        let mut fw = FdWriter::new(w.as_raw_fd());
        fw.write_all(b"hello").expect("write_all");
        drop(fw);
        drop(w);
        let mut got = String::new();
        use std::io::Read as _;
        r.read_to_string(&mut got).expect("read");
        assert_eq!(got, "hello");
    }

    #[test]
    fn columns_fall_back_to_default_without_a_terminal() {
        // Pipes reject TIOCGWINSZ and never answer the cursor probe.
        let (r, _keep) = os_pipe::pipe().expect("pipe");
        let (_or, ow) = os_pipe::pipe().expect("pipe");
        let mut out = FdWriter::new(ow.as_raw_fd());
        assert_eq!(get_columns(r.as_raw_fd(), ow.as_raw_fd(), &mut out), DEFAULT_COLS);
    }

    #[test]
    fn columns_use_the_cursor_probe_reply() {
        let (r, mut feed) = os_pipe::pipe().expect("pipe");
        // Scripted replies: cursor at col 80, then (after the 999C jump)
        // at col 120.
        feed.write_all(b"\x1b[24;80R\x1b[24;120R").expect("script");
        let (_or, ow) = os_pipe::pipe().expect("pipe");
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(get_columns(r.as_raw_fd(), ow.as_raw_fd(), &mut out), 120);
        // Probe, jump right, probe, restore 40 columns left.
        let emitted = String::from_utf8(out).expect("utf8");
        assert_eq!(emitted, "\x1b[6n\x1b[999C\x1b[6n\x1b[40D");
    }

    #[test]
    fn malformed_probe_reply_is_rejected() {
        let (r, mut feed) = os_pipe::pipe().expect("pipe");
        feed.write_all(b"\x1b[garbageR").expect("script");
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(cursor_column(r.as_raw_fd(), &mut out), None);
    }
}
