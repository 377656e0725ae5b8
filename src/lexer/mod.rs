//! The lexer: rule forest (§4.1) and longest-match runtime (§4.3).

pub mod rule_tree;
pub mod runtime;

pub use rule_tree::{RuleForest, TokenDecl};
pub use runtime::{LexToken, Lexer, LexerOptions, TokenStream};
