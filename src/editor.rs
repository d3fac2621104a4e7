//! The editing engine: key dispatch, history navigation, the completion
//! sub-mode, and the session drivers (blocking `read` and the stepwise
//! `edit_start` / `edit_feed` / `edit_stop` API).

use std::io::{self, BufRead, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::{Mutex, Once};
use std::time::Duration;

use crossterm::tty::IsTty;
use thiserror::Error;

use crate::buffer::LineBuffer;
use crate::history::History;
use crate::key::{self, Key};
use crate::render::{Hint, Surface};
use crate::term::{self, FdWriter, Read1};

/// Errors starting an interactive session.
#[derive(Debug, Error)]
pub enum Error {
    #[error("file descriptor is not a terminal")]
    NotATty,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Result of feeding one key event to a session.
///
/// `More` means the session wants another key; everything else is
/// terminal and must be followed by [`LineEditor::edit_stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditResult {
    More,
    Enter,
    Hotkey,
    Escape,
    EofOrError,
}

/// Full-line replacements offered on Tab for the current buffer.
pub type CompletionCallback = Box<dyn Fn(&str) -> Vec<String>>;

/// Inline suggestion for the current buffer, or `None`.
pub type HintsCallback = Box<dyn Fn(&str) -> Option<Hint>>;

// ── Terminal-restore safety net ───────────────────────────────────────────────

/// Attributes to restore if the process unwinds while a descriptor is
/// still raw. Mirrors the engine's own bookkeeping; the panic hook is the
/// only other reader.
static SAVED_TERMIOS: Mutex<Option<(RawFd, libc::termios)>> = Mutex::new(None);
static PANIC_HOOK: Once = Once::new();

fn register_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let saved = SAVED_TERMIOS
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some((fd, attrs)) = *saved {
                let _ = term::restore_mode(fd, &attrs);
            }
            drop(saved);
            previous(info);
        }));
    });
}

fn remember_termios(entry: Option<(RawFd, libc::termios)>) {
    let mut saved = SAVED_TERMIOS
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *saved = entry;
}

// ── Session state ─────────────────────────────────────────────────────────────

/// State of one editing session, created by [`LineEditor::edit_start`]
/// and fed through [`LineEditor::edit_feed`].
///
/// Generic over the output sink so tests can capture escape sequences in
/// a `Vec<u8>`; real sessions write straight to the output descriptor.
pub struct LineSession<W: Write = FdWriter> {
    ifd: RawFd,
    out: W,
    prompt: String,
    buf: LineBuffer,
    surface: Surface,
    /// History entry being edited; 0 is the live slot.
    history_idx: usize,
    /// Latched terminal result; a finished session stays finished.
    finished: Option<EditResult>,
}

impl<W: Write> LineSession<W> {
    /// Current buffer contents. After `edit_feed` returns `Enter` or
    /// `Hotkey`, this is the submitted line.
    pub fn text(&self) -> String {
        self.buf.to_string()
    }
}

// ── The engine ────────────────────────────────────────────────────────────────

/// The line-editing engine: history, callbacks, display mode, and
/// raw-mode bookkeeping. One instance drives one terminal.
pub struct LineEditor {
    history: History,
    multiline: bool,
    hotkey: Option<char>,
    completion: Option<CompletionCallback>,
    hints: Option<HintsCallback>,
    /// `(fd, original attributes)` while that descriptor is raw.
    rawmode: Option<(RawFd, libc::termios)>,
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl LineEditor {
    pub fn new() -> Self {
        LineEditor {
            history: History::new(),
            multiline: false,
            hotkey: None,
            completion: None,
            hints: None,
            rawmode: None,
        }
    }

    // ── Configuration ─────────────────────────────────────────────────────────

    pub fn set_completion_callback<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Vec<String> + 'static,
    {
        self.completion = Some(Box::new(f));
    }

    pub fn set_hints_callback<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Option<Hint> + 'static,
    {
        self.hints = Some(Box::new(f));
    }

    /// Wrap long lines onto new rows instead of scrolling within one row.
    pub fn set_multiline(&mut self, on: bool) {
        self.multiline = on;
    }

    /// A key that ends editing like Enter but is reported as
    /// [`EditResult::Hotkey`]; [`read`](Self::read) appends it to the
    /// returned text.
    pub fn set_hotkey(&mut self, key: char) {
        self.hotkey = Some(key);
    }

    // ── History facade ────────────────────────────────────────────────────────

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_add(&mut self, line: &str) {
        self.history.add(line);
    }

    pub fn history_set(&mut self, idx: usize, line: &str) -> bool {
        self.history.set(idx, line)
    }

    pub fn history_set_maxlen(&mut self, n: usize) {
        self.history.set_maxlen(n);
    }

    pub fn history_save(&self, path: &std::path::Path) -> io::Result<()> {
        self.history.save(path)
    }

    pub fn history_load(&mut self, path: &std::path::Path) -> io::Result<()> {
        self.history.load(path)
    }

    // ── Raw mode ──────────────────────────────────────────────────────────────

    /// Put `fd` in raw mode, keeping the original attributes for
    /// [`disable_rawmode`](Self::disable_rawmode) and for the panic hook.
    /// Idempotent while already raw.
    pub fn enable_rawmode(&mut self, fd: RawFd) -> Result<()> {
        if self.rawmode.is_some() {
            return Ok(());
        }
        if !term::isatty(fd) {
            return Err(Error::NotATty);
        }
        register_panic_hook();
        let orig = term::enter_raw_mode(fd)?;
        self.rawmode = Some((fd, orig));
        remember_termios(Some((fd, orig)));
        Ok(())
    }

    /// Restore the attributes snapshotted by `enable_rawmode`. Idempotent.
    pub fn disable_rawmode(&mut self) {
        if let Some((fd, attrs)) = self.rawmode.take() {
            let _ = term::restore_mode(fd, &attrs);
            remember_termios(None);
        }
    }

    // ── Non-blocking driver ───────────────────────────────────────────────────

    /// Begin a session: raw mode on `ifd`, initial paint of `initial`,
    /// live history slot installed. Call [`edit_feed`](Self::edit_feed)
    /// whenever `ifd` has data, and [`edit_stop`](Self::edit_stop) once it
    /// returns anything but [`EditResult::More`].
    pub fn edit_start(
        &mut self,
        prompt: &str,
        initial: &str,
        ifd: RawFd,
        ofd: RawFd,
    ) -> Result<LineSession> {
        self.enable_rawmode(ifd)?;
        let mut out = FdWriter::new(ofd);
        let cols = term::get_columns(ifd, ofd, &mut out);
        match self.begin_session(ifd, out, prompt, initial, cols) {
            Ok(ls) => Ok(ls),
            Err(e) => {
                // The initial paint failed; don't strand the terminal raw.
                self.disable_rawmode();
                Err(e.into())
            }
        }
    }

    fn begin_session<W: Write>(
        &mut self,
        ifd: RawFd,
        out: W,
        prompt: &str,
        initial: &str,
        cols: usize,
    ) -> io::Result<LineSession<W>> {
        let mut ls = LineSession {
            ifd,
            out,
            prompt: prompt.to_string(),
            buf: LineBuffer::new(),
            surface: Surface::new(cols),
            history_idx: 0,
            finished: None,
        };
        ls.buf.set(initial, None);
        self.refresh_line(&mut ls, true)?;
        self.history.push_live(initial);
        Ok(ls)
    }

    /// Read and process one key event. Returns [`EditResult::More`] until
    /// a terminal event; after that the result is latched and repeated.
    pub fn edit_feed<W: Write>(&mut self, ls: &mut LineSession<W>) -> EditResult {
        if let Some(done) = ls.finished {
            return done;
        }
        match self.feed_once(ls) {
            Ok(result) => result,
            Err(_) => self.finish(ls, EditResult::EofOrError),
        }
    }

    /// End the session: restore the terminal and move past the edit line.
    pub fn edit_stop<W: Write>(&mut self, ls: &mut LineSession<W>) -> io::Result<()> {
        self.disable_rawmode();
        ls.out.write_all(b"\r\n")?;
        ls.out.flush()
    }

    /// Clear the edit line and hand the terminal back to the caller (in
    /// cooked mode) so it can print. Pair with [`show`](Self::show).
    pub fn hide<W: Write>(&mut self, ls: &mut LineSession<W>) -> io::Result<()> {
        if self.multiline {
            ls.surface
                .refresh_multi(&mut ls.out, &ls.prompt, &ls.buf, None, true, false)?;
        } else {
            ls.surface
                .refresh_single(&mut ls.out, &ls.prompt, &ls.buf, None, true, false)?;
        }
        self.disable_rawmode();
        Ok(())
    }

    /// Re-acquire raw mode and repaint the edit line after [`hide`](Self::hide).
    pub fn show<W: Write>(&mut self, ls: &mut LineSession<W>) -> Result<()> {
        self.enable_rawmode(ls.ifd)?;
        self.refresh_with(ls, false, true)?;
        Ok(())
    }

    /// Repaint the edit line. Public so a host that printed through some
    /// other channel can force a redraw.
    pub fn refresh_line<W: Write>(&self, ls: &mut LineSession<W>, clear: bool) -> io::Result<()> {
        self.refresh_with(ls, clear, true)
    }

    fn refresh_with<W: Write>(
        &self,
        ls: &mut LineSession<W>,
        clear: bool,
        with_hints: bool,
    ) -> io::Result<()> {
        let hint = if with_hints {
            self.hints.as_ref().and_then(|cb| cb(&ls.buf.to_string()))
        } else {
            None
        };
        if self.multiline {
            ls.surface
                .refresh_multi(&mut ls.out, &ls.prompt, &ls.buf, hint.as_ref(), clear, true)
        } else {
            ls.surface
                .refresh_single(&mut ls.out, &ls.prompt, &ls.buf, hint.as_ref(), clear, true)
        }
    }

    // ── Key dispatch ──────────────────────────────────────────────────────────

    fn feed_once<W: Write>(&mut self, ls: &mut LineSession<W>) -> io::Result<EditResult> {
        let mut key = key::read_key(ls.ifd);
        // Tab enters the completion sub-mode, which consumes keys until
        // it either settles or hands one back for normal processing.
        if key == Key::Tab && self.completion.is_some() {
            match self.complete_line(ls)? {
                None => return Ok(EditResult::More),
                Some(forwarded) => key = forwarded,
            }
        }
        if let (Key::Char(c), Some(hot)) = (key, self.hotkey) {
            if c == hot {
                return Ok(self.finish(ls, EditResult::Hotkey));
            }
        }
        let result = match key {
            Key::Enter => self.finish(ls, EditResult::Enter),
            Key::Escape => self.finish(ls, EditResult::Escape),
            Key::CtrlC | Key::Eof => self.finish(ls, EditResult::EofOrError),
            Key::CtrlD => {
                // Delete right of the cursor; on an empty line act as EOF.
                if ls.buf.is_empty() {
                    self.finish(ls, EditResult::EofOrError)
                } else {
                    let changed = ls.buf.delete_at_cursor();
                    self.touched(ls, changed)?;
                    EditResult::More
                }
            }
            Key::Backspace | Key::CtrlH => {
                let changed = ls.buf.backspace();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::Delete => {
                let changed = ls.buf.delete_at_cursor();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlA | Key::Home => {
                let changed = ls.buf.move_home();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlE | Key::End => {
                let changed = ls.buf.move_end();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlB | Key::Left => {
                let changed = ls.buf.move_left();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlF | Key::Right => {
                let changed = ls.buf.move_right();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::WordLeft => {
                let changed = ls.buf.move_word_left();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::WordRight => {
                let changed = ls.buf.move_word_right();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlK => {
                let changed = ls.buf.delete_to_end();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlU => {
                let changed = ls.buf.delete_line();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlW => {
                let changed = ls.buf.delete_prev_word();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlT => {
                let changed = ls.buf.swap_prev();
                self.touched(ls, changed)?;
                EditResult::More
            }
            Key::CtrlL => {
                term::clear_screen(&mut ls.out)?;
                self.refresh_line(ls, true)?;
                EditResult::More
            }
            Key::CtrlP | Key::Up => {
                self.history_step(ls, HistoryStep::Prev)?;
                EditResult::More
            }
            Key::CtrlN | Key::Down => {
                self.history_step(ls, HistoryStep::Next)?;
                EditResult::More
            }
            Key::Char(c) => {
                ls.buf.insert(c);
                self.refresh_line(ls, true)?;
                EditResult::More
            }
            // Tab with no completion callback installed, stray probe
            // results, and consumed-but-unrecognized sequences.
            Key::Tab | Key::Timeout | Key::Unknown => EditResult::More,
        };
        Ok(result)
    }

    /// Repaint after a buffer primitive, but only when it changed
    /// something.
    fn touched<W: Write>(&self, ls: &mut LineSession<W>, changed: bool) -> io::Result<()> {
        if changed {
            self.refresh_line(ls, true)?;
        }
        Ok(())
    }

    /// Common exit path for every terminal result: drop the live history
    /// slot, repaint without hints so the echoed line matches what the
    /// user typed, and latch the result.
    fn finish<W: Write>(&mut self, ls: &mut LineSession<W>, result: EditResult) -> EditResult {
        if let Some(done) = ls.finished {
            return done;
        }
        self.history.pop_live();
        if self.hints.is_some() && matches!(result, EditResult::Enter | EditResult::Hotkey) {
            let _ = self.refresh_with(ls, true, false);
        }
        ls.finished = Some(result);
        result
    }

    // ── History navigation ────────────────────────────────────────────────────

    fn history_step<W: Write>(
        &mut self,
        ls: &mut LineSession<W>,
        step: HistoryStep,
    ) -> io::Result<()> {
        if self.history.is_empty() {
            return Ok(());
        }
        // Keep edits to the entry we're leaving.
        self.history.set(ls.history_idx, &ls.buf.to_string());
        ls.history_idx = match step {
            HistoryStep::Prev => (ls.history_idx + 1).min(self.history.len() - 1),
            HistoryStep::Next => ls.history_idx.saturating_sub(1),
        };
        let line = self
            .history
            .get(ls.history_idx)
            .unwrap_or_default()
            .to_string();
        ls.buf.set(&line, None);
        self.refresh_line(ls, true)
    }

    // ── Completion sub-mode ───────────────────────────────────────────────────

    /// Cycle through the completion candidates for the current buffer.
    ///
    /// Returns `None` when the sub-mode consumed everything (cancelled,
    /// or no candidates), or `Some(key)` when a non-Tab key arrived: the
    /// shown candidate is committed first and the key is handed back for
    /// normal dispatch.
    fn complete_line<W: Write>(&mut self, ls: &mut LineSession<W>) -> io::Result<Option<Key>> {
        let candidates = match self.completion.as_ref() {
            Some(cb) => cb(&ls.buf.to_string()),
            None => return Ok(Some(Key::Tab)),
        };
        if candidates.is_empty() {
            term::beep();
            return Ok(None);
        }
        let mut idx = 0usize;
        loop {
            if idx < candidates.len() {
                // Paint the candidate without committing it.
                let saved = ls.buf.clone();
                ls.buf.set(&candidates[idx], None);
                self.refresh_line(ls, true)?;
                ls.buf = saved;
            } else {
                // The slot past the last candidate previews the original.
                self.refresh_line(ls, true)?;
            }
            match key::read_key(ls.ifd) {
                Key::Tab => {
                    idx = (idx + 1) % (candidates.len() + 1);
                    if idx == candidates.len() {
                        term::beep();
                    }
                }
                Key::Escape => {
                    // Lone escape cancels; restore the original display.
                    if idx < candidates.len() {
                        self.refresh_line(ls, true)?;
                    }
                    return Ok(None);
                }
                other => {
                    if idx < candidates.len() {
                        ls.buf.set(&candidates[idx], None);
                    }
                    return Ok(Some(other));
                }
            }
        }
    }

    // ── Blocking driver ───────────────────────────────────────────────────────

    fn run_to_completion<W: Write>(&mut self, ls: &mut LineSession<W>) -> EditResult {
        loop {
            match self.edit_feed(ls) {
                EditResult::More => continue,
                result => return result,
            }
        }
    }

    fn edit_blocking(
        &mut self,
        prompt: &str,
        initial: &str,
        ifd: RawFd,
        ofd: RawFd,
    ) -> Result<(EditResult, String)> {
        let mut ls = self.edit_start(prompt, initial, ifd, ofd)?;
        let result = self.run_to_completion(&mut ls);
        self.edit_stop(&mut ls)?;
        Ok((result, ls.text()))
    }

    /// Read one line interactively.
    ///
    /// Falls back to a plain line read when stdin is not a terminal (no
    /// prompt) or when `TERM` is unsupported (prompt, no editing).
    /// Returns `Ok(None)` on EOF, Ctrl-C, or Ctrl-D on an empty line;
    /// `Ok(Some(""))` when the line was abandoned with Escape.
    pub fn read(&mut self, prompt: &str, initial: &str) -> io::Result<Option<String>> {
        let stdin = io::stdin();
        if !stdin.is_tty() {
            return read_plain_line();
        }
        if term::unsupported_term() {
            return read_cooked_with_prompt(prompt);
        }
        let ifd = stdin.as_raw_fd();
        let ofd = io::stdout().as_raw_fd();
        match self.edit_blocking(prompt, initial, ifd, ofd) {
            Ok((result, text)) => Ok(self.apply_result(result, text)),
            Err(Error::NotATty) => read_cooked_with_prompt(prompt),
            Err(Error::Io(e)) => Err(e),
        }
    }

    /// Derive `read`'s convenience value from the session result.
    fn apply_result(&self, result: EditResult, text: String) -> Option<String> {
        match result {
            EditResult::Enter => Some(text),
            EditResult::Hotkey => {
                let mut text = text;
                if let Some(hot) = self.hotkey {
                    text.push(hot);
                }
                Some(text)
            }
            EditResult::Escape => Some(String::new()),
            EditResult::More | EditResult::EofOrError => None,
        }
    }

    // ── Auxiliary drivers ─────────────────────────────────────────────────────

    /// Call `f` repeatedly (raw mode held) until it reports completion or
    /// `exit_key` is pressed. A 10 ms key probe runs between iterations
    /// so `f` can paint progress with `\r\n` line endings.
    ///
    /// `Ok(true)` when `f` completed, `Ok(false)` on early exit (the exit
    /// key, or EOF on stdin).
    pub fn poll_loop<F: FnMut() -> bool>(&mut self, mut f: F, exit_key: Key) -> Result<bool> {
        let fd = io::stdin().as_raw_fd();
        self.enable_rawmode(fd)?;
        let completed = loop {
            if f() {
                break true;
            }
            match key::probe_key(fd, Duration::from_millis(10)) {
                Key::Eof => break false,
                k if k == exit_key => break false,
                _ => {}
            }
        };
        self.disable_rawmode();
        Ok(completed)
    }

    /// Diagnostic mode: echo the code of every key until the last four
    /// bytes spell `quit`.
    pub fn print_keycodes(&mut self) -> Result<()> {
        let mut out = io::stdout();
        writeln!(out, "Key code debugging mode.")?;
        writeln!(out, "Press keys to see scan codes. Type 'quit' at any time to exit.")?;
        out.flush()?;
        let fd = io::stdin().as_raw_fd();
        self.enable_rawmode(fd)?;
        let mut tail = [0u8; 4];
        loop {
            let b = match term::getc(fd, None) {
                Read1::Byte(b) => b,
                Read1::Timeout => continue,
                Read1::Eof => break,
            };
            let repr = match b {
                b'\r' => "\\r".to_string(),
                b'\n' => "\\n".to_string(),
                b'\t' => "\\t".to_string(),
                0x1b => "ESC".to_string(),
                0x20..=0x7e => (b as char).to_string(),
                _ => "?".to_string(),
            };
            let echoed = write!(out, "'{repr}' 0x{b:02x} ({b})\r\n").and_then(|()| out.flush());
            if echoed.is_err() {
                break;
            }
            tail.rotate_left(1);
            tail[3] = b;
            if &tail == b"quit" {
                break;
            }
        }
        self.disable_rawmode();
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum HistoryStep {
    Prev,
    Next,
}

// ── Fallback line reads ───────────────────────────────────────────────────────

/// Stdin is a pipe or file: read one line, no prompt, no editing.
fn read_plain_line() -> io::Result<Option<String>> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line)? {
        0 => Ok(None),
        _ => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(Some(line))
        }
    }
}

/// Terminal too dumb for escape sequences: prompt, then a plain read.
fn read_cooked_with_prompt(prompt: &str) -> io::Result<Option<String>> {
    let mut out = io::stdout();
    out.write_all(prompt.as_bytes())?;
    out.flush()?;
    read_plain_line()
}

// ── Unit tests ────────────────────────────────────────────────────────────────
