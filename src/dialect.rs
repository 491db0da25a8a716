use tree_sitter::{Node, Parser, Tree};

use crate::Language;
use crate::error::EngineError;

pub const RUST_ACTIVATION_CHECK: &str = "::std::env::var_os(\"{id}\").is_some()";
pub const JS_ACTIVATION_CHECK: &str = "process.env[\"{id}\"] !== undefined";

pub fn grammar(language: Language) -> tree_sitter::Language {
    match language {
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
    }
}

/// Parse `source`, returning `None` when tree-sitter gives up entirely.
pub fn parse(source: &str, language: Language) -> Result<Option<Tree>, EngineError> {
    let mut parser = Parser::new();
    parser
        .set_language(&grammar(language))
        .map_err(|e| EngineError::Grammar(e.to_string()))?;
    Ok(parser.parse(source, None))
}

/// Node kind whose braces delimit a rewritable statement list.
pub fn region_kind(language: Language) -> &'static str {
    match language {
        Language::Rust => "block",
        _ => "statement_block",
    }
}

pub fn is_comment(node: Node) -> bool {
    matches!(node.kind(), "line_comment" | "block_comment" | "comment")
}

/// Render the runtime check that is true only while `id` is active.
pub fn activation_check(language: Language, template: Option<&str>, id: &str) -> String {
    let default = if language.is_rust() {
        RUST_ACTIVATION_CHECK
    } else {
        JS_ACTIVATION_CHECK
    };
    template.unwrap_or(default).replace("{id}", id)
}

/// Condition syntax for an `if`: Rust takes a bare expression, JS needs parens.
pub fn condition(language: Language, check: &str) -> String {
    if language.is_rust() {
        check.to_string()
    } else {
        format!("({})", check)
    }
}

pub fn never_returns(language: Language, callee: &str) -> bool {
    let name = callee.trim_end_matches('!');
    match language {
        Language::Rust => matches!(
            name,
            "panic"
                | "unreachable"
                | "todo"
                | "unimplemented"
                | "exit"
                | "abort"
                | "std::process::exit"
                | "process::exit"
                | "std::process::abort"
                | "process::abort"
        ),
        _ => matches!(name, "process.exit" | "process.abort" | "exit" | "abort"),
    }
}

pub fn is_printing(language: Language, callee: &str) -> bool {
    match language {
        Language::Rust => matches!(
            callee.trim_end_matches('!'),
            "println" | "eprintln" | "print" | "eprint" | "dbg"
        ),
        _ => callee.starts_with("console."),
    }
}

pub const SYNC_METHODS: &[&str] = &[
    "lock",
    "unlock",
    "try_lock",
    "wait",
    "wait_while",
    "wait_timeout",
    "signal",
    "notify",
    "notify_one",
    "notify_all",
    "acquire",
    "release",
];

pub const SYNC_CONSTRUCTORS: &[&str] = &[
    "Mutex::new",
    "RwLock::new",
    "Condvar::new",
    "Barrier::new",
    "Semaphore::new",
    "new Mutex(",
    "new Semaphore(",
];

/// Explicit drops end a borrow or release a guard early.
pub fn releases_guard(language: Language, callee: &str) -> bool {
    language.is_rust() && matches!(callee, "drop" | "mem::drop" | "std::mem::drop" | "core::mem::drop")
}

/// Last path or member segment of a callee, e.g. `guard.lock` -> `lock`.
pub fn simple_name(callee: &str) -> &str {
    let callee = callee.trim_end_matches('!');
    let after_path = callee.rsplit("::").next().unwrap_or(callee);
    after_path.rsplit('.').next().unwrap_or(after_path)
}

/// Receiver of a method call, e.g. `self.state.lock` -> `self.state`.
pub fn receiver(callee: &str) -> Option<&str> {
    callee.rfind('.').map(|i| &callee[..i])
}
