//! Repainting the edit line from buffer + prompt + hint.
//!
//! Two strategies: single-line keeps the line on one terminal row and
//! scrolls/clips a window over the buffer; multi-line lets the line wrap
//! and tracks how many rows the previous paint used so it can clear them.
//! Both split into independent `clear` and `write` phases — `hide()` runs
//! clear-only, `show()` runs write-only.

use std::io::{self, Write};

use crossterm::{
    cursor, queue,
    style::Print,
    terminal::{Clear, ClearType},
};

use crate::buffer::LineBuffer;

/// Read-only text suggested after the cursor. Never part of the buffer.
///
/// `color` is an SGR foreground code; negative means default color. A
/// bold hint with default color is promoted to white (37) so the bold
/// attribute has something to apply to.
#[derive(Debug, Clone)]
pub struct Hint {
    pub text: String,
    pub color: i32,
    pub bold: bool,
}

/// Per-session paint state.
pub struct Surface {
    /// Terminal width captured at session start.
    cols: usize,
    /// Cursor position at the previous multi-line refresh.
    oldpos: usize,
    /// High-water mark of rows painted in multi-line mode.
    maxrows: usize,
}

impl Surface {
    pub fn new(cols: usize) -> Self {
        Surface {
            cols: cols.max(1),
            oldpos: 0,
            maxrows: 0,
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Single-line refresh. A window `[idx, idx + blen)` over the buffer
    /// is chosen so the cursor stays visible (scroll left) and the text
    /// fits (clip right); the prompt is always shown in full.
    pub fn refresh_single<W: Write>(
        &mut self,
        out: &mut W,
        prompt: &str,
        buf: &LineBuffer,
        hint: Option<&Hint>,
        clear: bool,
        write: bool,
    ) -> io::Result<()> {
        let plen = prompt.len();
        let mut blen = buf.len();
        let mut idx = 0;
        let mut pos = buf.pos();
        while pos > 0 && plen + pos >= self.cols {
            idx += 1;
            blen -= 1;
            pos -= 1;
        }
        while blen > 0 && plen + blen > self.cols {
            blen -= 1;
        }
        if clear {
            queue!(out, Print("\r"))?;
        }
        if write {
            let visible: String = buf.chars()[idx..idx + blen].iter().collect();
            queue!(out, Print(prompt), Print(visible))?;
            self.queue_hint(out, plen, buf.len(), hint)?;
        }
        if clear {
            queue!(out, Clear(ClearType::UntilNewLine))?;
        }
        if write {
            queue!(out, Print("\r"))?;
            if plen + pos > 0 {
                queue!(out, cursor::MoveRight((plen + pos) as u16))?;
            }
        }
        out.flush()
    }

    /// Multi-line refresh.
    ///
    /// The clear phase walks down to the last row of the previous paint
    /// and erases upward; the write phase repaints prompt + buffer + hint
    /// and then climbs back to the row/column the cursor belongs on. When
    /// the cursor sits exactly on a column boundary at the end of the
    /// buffer, an explicit newline pushes the display onto the next row so
    /// the cursor has somewhere to go.
    pub fn refresh_multi<W: Write>(
        &mut self,
        out: &mut W,
        prompt: &str,
        buf: &LineBuffer,
        hint: Option<&Hint>,
        clear: bool,
        write: bool,
    ) -> io::Result<()> {
        let plen = prompt.len();
        let cols = self.cols;
        // Cursor row within the previous paint, and rows the buffer needs.
        let rpos = (plen + self.oldpos + cols) / cols;
        let mut rows = (plen + buf.len() + cols - 1) / cols;
        if clear {
            let old_rows = self.maxrows;
            if old_rows > rpos {
                queue!(out, cursor::MoveDown((old_rows - rpos) as u16))?;
            }
            for _ in 1..old_rows {
                queue!(
                    out,
                    Print("\r"),
                    Clear(ClearType::UntilNewLine),
                    cursor::MoveUp(1),
                )?;
            }
            queue!(out, Print("\r"), Clear(ClearType::UntilNewLine))?;
        }
        if write {
            queue!(out, Print(prompt), Print(buf.to_string()))?;
            self.maxrows = self.maxrows.max(rows);
            self.queue_hint(out, plen, buf.len(), hint)?;
            if buf.pos() != 0 && buf.pos() == buf.len() && (buf.pos() + plen) % cols == 0 {
                queue!(out, Print("\n\r"))?;
                rows += 1;
                self.maxrows = self.maxrows.max(rows);
            }
            // Climb from the last painted row to the cursor's row.
            let rpos2 = (plen + buf.pos() + cols) / cols;
            if rows > rpos2 {
                queue!(out, cursor::MoveUp((rows - rpos2) as u16))?;
            }
            let col = (plen + buf.pos()) % cols;
            queue!(out, Print("\r"))?;
            if col > 0 {
                queue!(out, cursor::MoveRight(col as u16))?;
            }
        }
        self.oldpos = buf.pos();
        out.flush()
    }

    /// Queue the hint, clipped to the columns left of the line. Shown only
    /// when the whole line already fits.
    fn queue_hint<W: Write>(
        &self,
        out: &mut W,
        plen: usize,
        blen: usize,
        hint: Option<&Hint>,
    ) -> io::Result<()> {
        let Some(hint) = hint else {
            return Ok(());
        };
        if plen + blen >= self.cols || hint.text.is_empty() {
            return Ok(());
        }
        let room = self.cols - plen - blen;
        let clipped: String = hint.text.chars().take(room).collect();
        let mut color = hint.color;
        if hint.bold && color < 0 {
            color = 37;
        }
        let styled = color >= 0 || hint.bold;
        if styled {
            queue!(
                out,
                Print(format!("\x1b[{};{};49m", i32::from(hint.bold), color))
            )?;
        }
        queue!(out, Print(clipped))?;
        if styled {
            queue!(out, Print("\x1b[0m"))?;
        }
        Ok(())
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────
