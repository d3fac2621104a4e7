//! Hierarchical command menus on top of the line editor.
//!
//! A menu is a static tree of named items: submenus or leaf commands.
//! Tokens typed at the prompt walk the tree with unique-prefix matching
//! (an exact name always wins), `?` asks for context help at any point,
//! and the editor's completion callback offers the reachable names for
//! the current submenu.

use std::io::{self, Write};
use std::path::PathBuf;

use crate::editor::LineEditor;

// ── Menu tree ─────────────────────────────────────────────────────────────────

/// A leaf command. Receives the CLI (for history access, nested loops,
/// exit), the output sink, and the tokens after the command name.
///
/// A `Some` return value preloads the next prompt with that text (used by
/// history recall); `None` records the line in history and starts fresh.
pub type LeafFn = fn(&mut Cli, &mut dyn Write, &[&str]) -> Option<String>;

pub enum Node {
    Menu(&'static [Item]),
    Leaf(LeafFn),
}

pub struct Item {
    pub name: &'static str,
    pub descr: &'static str,
    pub node: Node,
    /// `(parameter, description)` rows shown for `cmd args ?`; empty
    /// means the generic `<cr>` help.
    pub args_help: &'static [(&'static str, &'static str)],
}

const CR_HELP: &[(&str, &str)] = &[("<cr>", "perform the function")];

pub const GENERAL_HELP: &[(&str, &str)] = &[
    ("?", "display command help - e.g. ?, show ?, s?"),
    ("<up>", "go backwards in command history"),
    ("<dn>", "go forwards in command history"),
    ("<tab>", "auto complete commands"),
    ("* note", "commands can be incomplete - e.g. sh = sho = show"),
];

pub const HISTORY_HELP: &[(&str, &str)] = &[
    ("<cr>", "display all history"),
    ("<index>", "recall history entry <index>"),
];

// ── Command line interface ────────────────────────────────────────────────────

pub struct Cli {
    editor: LineEditor,
    root: &'static [Item],
    prompt: String,
    running: bool,
    history_path: Option<PathBuf>,
}

impl Cli {
    /// Build a CLI over `root`. Installs tree completion and the `?`
    /// hotkey so help is one keystroke away.
    pub fn new(root: &'static [Item]) -> Self {
        let mut editor = LineEditor::new();
        editor.set_completion_callback(move |line| complete(root, line));
        editor.set_hotkey('?');
        Cli {
            editor,
            root,
            prompt: "> ".to_string(),
            running: true,
            history_path: None,
        }
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
    }

    /// Load history from `path` now and save back to it on exit.
    pub fn set_history_path(&mut self, path: PathBuf) -> io::Result<()> {
        self.editor.history_load(&path)?;
        self.history_path = Some(path);
        Ok(())
    }

    /// The underlying engine, for leaves that drive it directly.
    pub fn editor(&mut self) -> &mut LineEditor {
        &mut self.editor
    }

    /// Stop [`run`](Self::run) after the current command.
    pub fn exit(&mut self) {
        self.running = false;
    }

    /// Prompt/dispatch loop. Returns on `exit`, Ctrl-C, or EOF; saves
    /// history to the configured path on the way out.
    pub fn run(&mut self) -> io::Result<()> {
        let mut line = String::new();
        while self.running {
            match self.editor.read(&self.prompt, &line)? {
                Some(text) => {
                    let mut out = io::stdout();
                    line = self.parse_cmdline(&text, &mut out);
                    out.flush()?;
                }
                None => self.running = false,
            }
        }
        if let Some(path) = &self.history_path {
            self.editor.history_save(path)?;
        }
        Ok(())
    }

    /// Parse and dispatch one command line. The returned string preloads
    /// the next prompt — usually empty, non-empty when the user should
    /// keep editing (help requests, incomplete commands, history recall).
    pub fn parse_cmdline(&mut self, line: &str, ui: &mut dyn Write) -> String {
        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            return String::new();
        }
        let mut menu: &'static [Item] = self.root;
        for (idx, &token) in tokens.iter().enumerate() {
            // A trailing '?' asks for help at this menu level.
            if let Some(cmd) = token.strip_suffix('?') {
                command_help(cmd, menu, ui);
                return recycled(line);
            }
            let matches = match_token(menu, token);
            match matches.len() {
                0 => {
                    display_error(ui, "unknown command", &tokens, idx);
                    // Keep the junk in history in case the user wants to
                    // recall and fix it.
                    self.editor.history_add(line.trim());
                    return String::new();
                }
                1 => match &matches[0].node {
                    Node::Menu(submenu) => menu = *submenu,
                    Node::Leaf(f) => {
                        let args = &tokens[idx + 1..];
                        if args.last().is_some_and(|a| a.ends_with('?')) {
                            function_help(matches[0], ui);
                            return recycled(line);
                        }
                        return match f(self, ui, args) {
                            Some(next_line) => next_line,
                            None => {
                                self.editor.history_add(line.trim());
                                String::new()
                            }
                        };
                    }
                },
                _ => {
                    display_error(ui, "ambiguous command", &tokens, idx);
                    return String::new();
                }
            }
        }
        // Every token matched a submenu; the command is incomplete.
        let _ = writeln!(ui, "additional input needed");
        line.to_string()
    }

    /// The `history` leaf: list all entries, or recall one by index.
    pub fn display_history(&mut self, ui: &mut dyn Write, args: &[&str]) -> Option<String> {
        let n = self.editor.history().len();
        if args.len() == 1 {
            let idx = int_arg(ui, args[0], (0, n.saturating_sub(1)))?;
            let entry = self.editor.history().get(idx)?.to_string();
            // The trailing space keeps the recalled text distinct from
            // the stored entry, so pushing it as the next live buffer
            // can't collide with the history it came from.
            return Some(format!("{entry} "));
        }
        if n == 0 {
            let _ = writeln!(ui, "no history");
        } else {
            for (i, entry) in self.editor.history().iter().enumerate() {
                let _ = writeln!(ui, "{:<3}: {}", n - i - 1, entry);
            }
        }
        Some(String::new())
    }
}

/// Hand a help-request line back for further editing, minus its `?`.
fn recycled(line: &str) -> String {
    line.strip_suffix('?').unwrap_or(line).to_string()
}

/// Items of `menu` matching `token`: an exact name match wins outright,
/// otherwise every prefix match.
fn match_token(menu: &'static [Item], token: &str) -> Vec<&'static Item> {
    if let Some(item) = menu.iter().find(|item| item.name == token) {
        return vec![item];
    }
    menu.iter().filter(|item| item.name.starts_with(token)).collect()
}

// ── Help rendering ────────────────────────────────────────────────────────────

fn command_help(cmd: &str, menu: &[Item], ui: &mut dyn Write) {
    for item in menu {
        if item.name.starts_with(cmd) {
            let _ = writeln!(ui, "  {:<20}: {}", item.name, item.descr);
        }
    }
}

fn function_help(item: &Item, ui: &mut dyn Write) {
    let rows = if item.args_help.is_empty() {
        CR_HELP
    } else {
        item.args_help
    };
    print_help_rows(rows, ui);
}

/// Render general key/usage help (the `help` leaf).
pub fn general_help(ui: &mut dyn Write) {
    print_help_rows(GENERAL_HELP, ui);
}

/// Two-column help layout: parameter column padded to a minimum width,
/// description prefixed with ": ".
pub fn print_help_rows(rows: &[(&str, &str)], ui: &mut dyn Write) {
    let formatted: Vec<(String, String)> = rows
        .iter()
        .map(|(parm, descr)| {
            let descr = if descr.is_empty() {
                String::new()
            } else {
                format!(": {descr}")
            };
            ((*parm).to_string(), descr)
        })
        .collect();
    let _ = writeln!(ui, "{}", display_cols(&formatted, (16, 0)));
}

/// Left-justified two-column table. Column widths grow to the longest
/// cell plus a one-space margin, never below the given minimums.
fn display_cols(rows: &[(String, String)], minimums: (usize, usize)) -> String {
    let (mut w0, mut w1) = minimums;
    for (a, b) in rows {
        if w0 <= a.len() {
            w0 = a.len() + 1;
        }
        if w1 <= b.len() {
            w1 = b.len() + 1;
        }
    }
    rows.iter()
        .map(|(a, b)| format!("{a:<w0$}{b:<w1$}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Echo the command line with a caret marker under the offending token.
fn display_error(ui: &mut dyn Write, msg: &str, tokens: &[&str], idx: usize) {
    let markers: Vec<String> = tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            let c = if i == idx { '^' } else { ' ' };
            c.to_string().repeat(token.len())
        })
        .collect();
    let _ = writeln!(ui, "{msg}\n{}\n{}", tokens.join(" "), markers.join(" "));
}

/// Parse a bounded integer argument, reporting failures to the user.
fn int_arg(ui: &mut dyn Write, arg: &str, limits: (usize, usize)) -> Option<usize> {
    let val = match arg.parse::<usize>() {
        Ok(v) => v,
        Err(_) => {
            let _ = writeln!(ui, "invalid argument");
            return None;
        }
    };
    if val < limits.0 || val > limits.1 {
        let _ = writeln!(ui, "invalid argument");
        return None;
    }
    Some(val)
}

// ── Completion over the tree ──────────────────────────────────────────────────

/// Completion callback for a menu tree: walk the typed tokens through the
/// submenus and offer full-line continuations at the point the walk
/// stops.
pub fn complete(root: &'static [Item], cmd_line: &str) -> Vec<String> {
    let mut menu: &'static [Item] = root;
    let mut walked: &str = "";
    for (start, end) in split_index(cmd_line) {
        let cmd = &cmd_line[start..end];
        let line = &cmd_line[..end];
        walked = line;
        let matches: Vec<&Item> = menu.iter().filter(|i| i.name.starts_with(cmd)).collect();
        match matches.len() {
            0 => return Vec::new(),
            1 => {
                let item = matches[0];
                if cmd.len() < item.name.len() {
                    // Unambiguous but incomplete: finish the word.
                    return completions(line, cmd_line.len(), cmd, &[item.name]);
                }
                match &item.node {
                    Node::Menu(submenu) => menu = *submenu,
                    // A fully-typed leaf has nothing to offer.
                    Node::Leaf(_) => return Vec::new(),
                }
            }
            _ => {
                let names: Vec<&str> = matches.iter().map(|i| i.name).collect();
                return completions(line, cmd_line.len(), cmd, &names);
            }
        }
    }
    // Every token named a submenu: offer everything at this level.
    let names: Vec<&str> = menu.iter().map(|i| i.name).collect();
    completions(walked, cmd_line.len(), "", &names)
}

/// Build full-line candidates: the accepted part of the line plus each
/// name's continuation, padded to the current line length so the cursor
/// doesn't jump around while cycling.
fn completions(line: &str, minlen: usize, cmd: &str, names: &[&str]) -> Vec<String> {
    let base = if cmd.is_empty() && !line.is_empty() {
        format!("{line} ")
    } else {
        line.to_string()
    };
    names
        .iter()
        .map(|name| {
            let mut full = format!("{base}{}", &name[cmd.len()..]);
            while full.len() < minlen {
                full.push(' ');
            }
            full
        })
        .collect()
}

/// Byte spans of the space-separated tokens of `s`.
fn split_index(s: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if c == ' ' {
            if let Some(st) = start.take() {
                spans.push((st, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(st) = start {
        spans.push((st, s.len()));
    }
    spans
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(_cli: &mut Cli, ui: &mut dyn Write, args: &[&str]) -> Option<String> {
        let _ = writeln!(ui, "ran {args:?}");
        None
    }

    fn history_leaf(cli: &mut Cli, ui: &mut dyn Write, args: &[&str]) -> Option<String> {
        cli.display_history(ui, args)
    }

    static SHOW_MENU: &[Item] = &[
        Item {
            name: "version",
            descr: "show the version",
            node: Node::Leaf(mark),
            args_help: &[],
        },
        Item {
            name: "verbose",
            descr: "show verbosity",
            node: Node::Leaf(mark),
            args_help: &[],
        },
    ];

    static ROOT: &[Item] = &[
        Item {
            name: "show",
            descr: "display things",
            node: Node::Menu(SHOW_MENU),
            args_help: &[],
        },
        Item {
            name: "set",
            descr: "change a value",
            node: Node::Leaf(mark),
            args_help: &[("<name> <value>", "value to change")],
        },
        Item {
            name: "stat",
            descr: "quick status",
            node: Node::Leaf(mark),
            args_help: &[],
        },
        Item {
            name: "status",
            descr: "full status",
            node: Node::Leaf(mark),
            args_help: &[],
        },
        Item {
            name: "history",
            descr: "command history",
            node: Node::Leaf(history_leaf),
            args_help: HISTORY_HELP,
        },
    ];

    fn parse(cli: &mut Cli, line: &str) -> (String, String) {
        let mut ui: Vec<u8> = Vec::new();
        let next = cli.parse_cmdline(line, &mut ui);
        (next, String::from_utf8(ui).expect("utf8"))
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    #[test]
    fn prefix_walk_reaches_a_leaf_with_args() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "sh vers extra args");
        assert_eq!(out, "ran [\"extra\", \"args\"]\n");
        assert_eq!(next, "");
        assert_eq!(
            cli.editor().history().iter().collect::<Vec<_>>(),
            vec!["sh vers extra args"]
        );
    }

    #[test]
    fn exact_name_beats_a_longer_prefix_match() {
        let mut cli = Cli::new(ROOT);
        let (_, out) = parse(&mut cli, "stat");
        assert_eq!(out, "ran []\n");
    }

    #[test]
    fn ambiguous_token_is_reported_with_markers() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "s");
        assert_eq!(out, "ambiguous command\ns\n^\n");
        assert_eq!(next, "");
        assert!(cli.editor().history().is_empty());
    }

    #[test]
    fn unknown_token_is_reported_and_kept_in_history() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "show bogus now");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "unknown command");
        assert_eq!(lines[1], "show bogus now");
        assert_eq!(lines[2].trim_end(), "     ^^^^^");
        assert_eq!(next, "");
        assert_eq!(
            cli.editor().history().iter().collect::<Vec<_>>(),
            vec!["show bogus now"]
        );
    }

    #[test]
    fn bare_submenu_asks_for_more_input() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "show");
        assert_eq!(out, "additional input needed\n");
        assert_eq!(next, "show", "the partial command is offered for editing");
    }

    #[test]
    fn empty_line_is_a_quiet_noop() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "   ");
        assert_eq!((next.as_str(), out.as_str()), ("", ""));
    }

    // ── Help ──────────────────────────────────────────────────────────────────

    #[test]
    fn question_mark_lists_the_current_menu_level() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "show ?");
        assert!(out.contains("version"));
        assert!(out.contains("verbose"));
        assert!(!out.contains("status"), "help is scoped to the submenu");
        assert_eq!(next, "show ");
    }

    #[test]
    fn question_mark_filters_by_prefix() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "sta?");
        assert!(out.contains("stat"));
        assert!(out.contains("status"));
        assert!(!out.contains("show"));
        assert_eq!(next, "sta");
    }

    #[test]
    fn leaf_argument_help_uses_its_rows() {
        let mut cli = Cli::new(ROOT);
        let (next, out) = parse(&mut cli, "set x ?");
        assert!(out.contains("<name> <value>"));
        assert!(out.contains(": value to change"));
        assert_eq!(next, "set x ");
    }

    #[test]
    fn leaf_without_rows_gets_generic_cr_help() {
        let mut cli = Cli::new(ROOT);
        let (_, out) = parse(&mut cli, "stat ?");
        assert!(out.contains("<cr>"));
        assert!(out.contains("perform the function"));
    }

    // ── History leaf ──────────────────────────────────────────────────────────

    #[test]
    fn history_leaf_lists_newest_first_indices() {
        let mut cli = Cli::new(ROOT);
        parse(&mut cli, "stat");
        parse(&mut cli, "set a b");
        let (next, out) = parse(&mut cli, "history");
        assert_eq!(out, "1  : stat\n0  : set a b\n");
        assert_eq!(next, "");
        // Showing history does not record the history command itself...
        let (_, out) = parse(&mut cli, "history");
        // ...so the listing is unchanged.
        assert_eq!(out, "1  : stat\n0  : set a b\n");
    }

    #[test]
    fn history_leaf_recalls_by_index_with_a_trailing_space() {
        let mut cli = Cli::new(ROOT);
        parse(&mut cli, "stat");
        parse(&mut cli, "set a b");
        let (next, _) = parse(&mut cli, "history 1");
        assert_eq!(next, "stat ");
    }

    #[test]
    fn history_leaf_rejects_bad_indices() {
        let mut cli = Cli::new(ROOT);
        parse(&mut cli, "stat");
        let (next, out) = parse(&mut cli, "history 7");
        assert_eq!(out, "invalid argument\n");
        assert_eq!(next, "");
    }

    // ── Completion ────────────────────────────────────────────────────────────

    #[test]
    fn empty_line_completes_to_every_root_name() {
        let got = complete(ROOT, "");
        assert_eq!(got, vec!["show", "set", "stat", "status", "history"]);
    }

    #[test]
    fn unique_prefix_completes_the_word() {
        assert_eq!(complete(ROOT, "sh"), vec!["show"]);
        assert_eq!(complete(ROOT, "hi"), vec!["history"]);
    }

    #[test]
    fn ambiguous_prefix_offers_all_continuations_padded() {
        let got = complete(ROOT, "st");
        assert_eq!(got, vec!["stat", "status"]);
        // Padding kicks in when the typed line is longer than a candidate.
        let got = complete(ROOT, "stat"); // exact name, shorter than "status"
        assert_eq!(got, vec!["stat", "status"]);
    }

    #[test]
    fn completed_submenu_offers_its_children() {
        assert_eq!(
            complete(ROOT, "show "),
            vec!["show version", "show verbose"]
        );
        assert_eq!(
            complete(ROOT, "show ver"),
            vec!["show version", "show verbose"]
        );
    }

    #[test]
    fn fully_typed_leaf_offers_nothing() {
        assert!(complete(ROOT, "set ").is_empty());
        assert!(complete(ROOT, "show bogus").is_empty());
    }

    #[test]
    fn candidates_are_padded_to_the_line_length() {
        // "show verb" + Tab: "show verbose" is longer than the line, no
        // padding needed; but a shorter candidate set pads out.
        let got = complete(ROOT, "se");
        assert_eq!(got, vec!["set"]);
        let long_line = "stat      "; // trailing spaces make the line long
        let got = complete(ROOT, long_line);
        assert!(got.iter().all(|c| c.len() >= long_line.len()));
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn split_index_finds_token_spans() {
        assert_eq!(split_index("ab  cd "), vec![(0, 2), (4, 6)]);
        assert_eq!(split_index(""), Vec::<(usize, usize)>::new());
        assert_eq!(split_index("  "), Vec::<(usize, usize)>::new());
    }

    #[test]
    fn display_cols_pads_to_minimums_and_content() {
        let rows = vec![
            ("a".to_string(), "one".to_string()),
            ("longer-name".to_string(), "two".to_string()),
        ];
        let got = display_cols(&rows, (4, 0));
        let lines: Vec<&str> = got.lines().collect();
        assert_eq!(lines[0].trim_end(), "a           one");
        assert_eq!(lines[1].trim_end(), "longer-name two");
    }
}
