//! An interactive terminal line editor with history, tab completion,
//! inline hints, and an optional hierarchical command menu.
//!
//! The engine puts the input descriptor in raw mode, decodes keystrokes
//! (including multi-byte escape sequences, disambiguated with a short
//! timeout), maintains an editable buffer, and repaints the visible line
//! — single- or multi-row — on every change. A bounded history ring with
//! live-edit semantics backs Up/Down navigation, and a stepwise
//! `edit_start` / `edit_feed` / `edit_stop` driver (with `hide`/`show`)
//! lets a host interleave editing with its own output.
//!
//! Unix only: the terminal layer speaks termios and VT100.
//!
//! ```no_run
//! fn main() -> std::io::Result<()> {
//!     let mut editor = lino::LineEditor::new();
//!     while let Some(line) = editor.read("hello> ", "")? {
//!         if !line.is_empty() {
//!             println!("echo: '{line}'");
//!             editor.history_add(&line);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod editor;
pub mod history;
pub mod key;
pub mod menu;
pub mod render;
pub mod term;

pub use buffer::LineBuffer;
pub use editor::{EditResult, Error, LineEditor, LineSession, Result};
pub use history::History;
pub use key::Key;
pub use render::Hint;
