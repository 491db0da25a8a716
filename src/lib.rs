pub mod config;
pub mod copy_tree;
pub mod dialect;
pub mod error;
pub mod exclusions;
pub mod mutants;
pub mod operators;
pub mod orchestrator;
pub mod output;
pub mod parser;
pub mod runner;
pub mod safety;
pub mod schemata;
pub mod state;
pub mod visitors;

pub use error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Rust,
    JavaScript,
    TypeScript,
    Tsx,
}

impl Language {
    pub fn is_rust(self) -> bool {
        self == Language::Rust
    }
}

pub fn detect_language(path: &std::path::Path) -> Option<Language> {
    match path.extension()?.to_str()? {
        "rs" => Some(Language::Rust),
        "js" | "mjs" | "cjs" => Some(Language::JavaScript),
        "ts" | "mts" | "cts" => Some(Language::TypeScript),
        "tsx" | "jsx" => Some(Language::Tsx),
        _ => None,
    }
}
