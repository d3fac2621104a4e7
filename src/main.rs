//! Demo binary: a hierarchical menu CLI over the line editor, plus the
//! basic echo demo and the keycode/loop diagnostics.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use lino::editor::LineEditor;
use lino::key::Key;
use lino::menu::{self, Cli, Item, Node};
use lino::render::Hint;

const HISTORY_FILE: &str = "history.txt";
const LOOPS: usize = 10;

fn main() {
    // Outside raw mode Ctrl-C arrives as SIGINT; print the newline the
    // terminal would have echoed so the next prompt starts clean.
    ctrlc::set_handler(|| {
        println!();
        let _ = io::stdout().flush();
    })
    .expect("Failed to set Ctrl-C handler");

    let mut multiline = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--multiline" => {
                multiline = true;
                println!("Multi-line mode enabled.");
            }
            "--keycodes" => {
                let mut editor = LineEditor::new();
                if let Err(e) = editor.print_keycodes() {
                    eprintln!("lino: {e}");
                    std::process::exit(1);
                }
                return;
            }
            "--loop" => {
                loop_demo();
                return;
            }
            "--basic" => {
                basic_demo(multiline);
                return;
            }
            _ => {
                eprintln!("Usage: lino [--multiline] [--keycodes] [--loop] [--basic]");
                std::process::exit(1);
            }
        }
    }
    menu_demo(multiline);
}

// ── Polling-loop demo ─────────────────────────────────────────────────────────

/// Progress printer driven by `poll_loop`; returns true when done.
fn make_progress() -> impl FnMut() -> bool {
    let mut idx = 0;
    move || {
        print!("loop index {idx}/{LOOPS}\r\n");
        let _ = io::stdout().flush();
        std::thread::sleep(Duration::from_millis(500));
        idx += 1;
        idx > LOOPS
    }
}

fn loop_demo() {
    println!("looping: press ctrl-d to exit");
    let mut editor = LineEditor::new();
    match editor.poll_loop(make_progress(), Key::CtrlD) {
        Ok(true) => println!("loop completed"),
        Ok(false) => println!("early exit of loop"),
        Err(e) => eprintln!("lino: {e}"),
    }
}

// ── Basic echo demo ───────────────────────────────────────────────────────────

/// The classic demo loop: completion on `h`, a hint for `hello`, hotkey
/// `?`, and `/historylen N` to resize the history ring.
fn basic_demo(multiline: bool) {
    let mut editor = LineEditor::new();
    editor.set_multiline(multiline);
    editor.set_completion_callback(|line| {
        if line.starts_with('h') {
            vec!["hello".to_string(), "hello there".to_string()]
        } else {
            Vec::new()
        }
    });
    editor.set_hints_callback(|line| {
        (line == "hello").then(|| Hint {
            text: " World".to_string(),
            color: 35,
            bold: false,
        })
    });
    editor.set_hotkey('?');
    let history = PathBuf::from(HISTORY_FILE);
    let _ = editor.history_load(&history);

    loop {
        let line = match editor.read("hello> ", "") {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("lino: {e}");
                break;
            }
        };
        if let Some(rest) = line.strip_prefix("/historylen") {
            match rest.trim().parse::<usize>() {
                Ok(n) => editor.history_set_maxlen(n),
                Err(_) => println!("no history length"),
            }
        } else if line.starts_with('/') {
            println!("unrecognized command: {line}");
        } else if !line.is_empty() {
            let line = line.strip_suffix('?').unwrap_or(&line);
            println!("echo: '{line}'");
            editor.history_add(line);
            if let Err(e) = editor.history_save(&history) {
                eprintln!("lino: cannot save history: {e}");
            }
        }
    }
}

// ── Menu demo ─────────────────────────────────────────────────────────────────

fn cmd_echo(_cli: &mut Cli, ui: &mut dyn Write, args: &[&str]) -> Option<String> {
    let _ = writeln!(ui, "function arguments {args:?}");
    None
}

fn cmd_loop(cli: &mut Cli, ui: &mut dyn Write, _args: &[&str]) -> Option<String> {
    let _ = writeln!(ui, "Looping... Ctrl-D to exit");
    let _ = ui.flush();
    match cli.editor().poll_loop(make_progress(), Key::CtrlD) {
        Ok(true) => {
            let _ = writeln!(ui, "loop completed");
        }
        Ok(false) => {
            let _ = writeln!(ui, "early exit of loop");
        }
        Err(e) => {
            let _ = writeln!(ui, "cannot run loop: {e}");
        }
    }
    None
}

fn cmd_help(_cli: &mut Cli, ui: &mut dyn Write, _args: &[&str]) -> Option<String> {
    menu::general_help(ui);
    None
}

fn cmd_history(cli: &mut Cli, ui: &mut dyn Write, args: &[&str]) -> Option<String> {
    cli.display_history(ui, args)
}

fn cmd_exit(cli: &mut Cli, _ui: &mut dyn Write, _args: &[&str]) -> Option<String> {
    cli.exit();
    None
}

static ARG_HELP: &[(&str, &str)] = &[
    ("arg0", "first argument"),
    ("arg1", "second argument"),
];

static A_MENU: &[Item] = &[
    Item {
        name: "a0",
        descr: "run the polling loop demo",
        node: Node::Leaf(cmd_loop),
        args_help: &[],
    },
    Item {
        name: "a1",
        descr: "a1 function",
        node: Node::Leaf(cmd_echo),
        args_help: ARG_HELP,
    },
    Item {
        name: "a2",
        descr: "a2 function",
        node: Node::Leaf(cmd_echo),
        args_help: &[],
    },
];

static B_MENU: &[Item] = &[
    Item {
        name: "b0",
        descr: "b0 function",
        node: Node::Leaf(cmd_echo),
        args_help: ARG_HELP,
    },
    Item {
        name: "b1",
        descr: "b1 function",
        node: Node::Leaf(cmd_echo),
        args_help: &[],
    },
];

static ROOT_MENU: &[Item] = &[
    Item {
        name: "amenu",
        descr: "menu a functions",
        node: Node::Menu(A_MENU),
        args_help: &[],
    },
    Item {
        name: "bmenu",
        descr: "menu b functions",
        node: Node::Menu(B_MENU),
        args_help: &[],
    },
    Item {
        name: "exit",
        descr: "exit application",
        node: Node::Leaf(cmd_exit),
        args_help: &[],
    },
    Item {
        name: "help",
        descr: "general help",
        node: Node::Leaf(cmd_help),
        args_help: &[],
    },
    Item {
        name: "history",
        descr: "command history",
        node: Node::Leaf(cmd_history),
        args_help: menu::HISTORY_HELP,
    },
];

fn menu_demo(multiline: bool) {
    let mut cli = Cli::new(ROOT_MENU);
    cli.set_prompt("cli> ");
    cli.editor().set_multiline(multiline);
    if let Err(e) = cli.set_history_path(PathBuf::from(HISTORY_FILE)) {
        eprintln!("lino: cannot load history: {e}");
    }
    if let Err(e) = cli.run() {
        eprintln!("lino: {e}");
        std::process::exit(1);
    }
}
