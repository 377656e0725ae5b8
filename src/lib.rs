//! A library for building longest-match tokenizers and SLR(1) parsers for
//! small domain-specific languages.
//!
//! A consumer declares token kinds (literal strings or regular
//! expressions, with optional sub-token refinement) and grammar rules
//! (reductions from terminals/non-terminals to semantic values); the
//! library elaborates the declaration into a deterministic pushdown
//! automaton and drives it over source text, producing either a root
//! semantic value or a precise syntax error.
//!
//! ```no_run
//! use lexparse::{Language, LexerBuilder};
//! use lexparse::grammar::GrammarBuilder;
//! use lexparse::token::TokenKind;
//! use lexparse::grammar::SemanticType;
//!
//! let lexer = LexerBuilder::new(TokenKind(0), TokenKind(1));
//! let grammar = GrammarBuilder::new();
//! let language = Language::build(lexer, grammar, SemanticType(0), None);
//! ```

pub mod context;
pub mod error;
pub mod grammar;
pub mod lexer;
pub mod log;
pub mod parser;
pub mod position;
pub mod token;

use grammar::{ElaboratedGrammar, GrammarBuilder, SemanticType};
use lexer::rule_tree::{RuleForest, TokenDecl};
use lexer::runtime::{Lexer, LexerOptions, TokenStream};
use log::Log;
use parser::{Interpreter, ParseError, StateMachine, TokenNamer};
use std::any::Any;
use std::fmt::{self, Display, Formatter};
use token::TokenKind;

pub use error::ConstructionError;
pub use position::{Position, Span};

/// A chaining builder for the lexer declaration (§6 "Lexer declaration"),
/// in the style of the teacher's `production::builder::ProductionBuilder`.
pub struct LexerBuilder {
    error_kind: TokenKind,
    end_of_stream_kind: TokenKind,
    end_of_line_kind: Option<TokenKind>,
    indent_kind: Option<TokenKind>,
    dedent_kind: Option<TokenKind>,
    comments: Option<token::TokenMatcher>,
    escape_newlines: bool,
    declarations: Vec<TokenDecl>,
}

impl LexerBuilder {
    pub fn new(error_kind: TokenKind, end_of_stream_kind: TokenKind) -> Self {
        Self {
            error_kind,
            end_of_stream_kind,
            end_of_line_kind: None,
            indent_kind: None,
            dedent_kind: None,
            comments: None,
            escape_newlines: false,
            declarations: Vec::new(),
        }
    }

    pub fn token(mut self, decl: TokenDecl) -> Self {
        self.declarations.push(decl);
        self
    }

    pub fn tokens(mut self, decls: impl IntoIterator<Item = TokenDecl>) -> Self {
        self.declarations.extend(decls);
        self
    }

    pub fn with_indentation(mut self, end_of_line: TokenKind, indent: TokenKind, dedent: TokenKind) -> Self {
        self.end_of_line_kind = Some(end_of_line);
        self.indent_kind = Some(indent);
        self.dedent_kind = Some(dedent);
        self
    }

    pub fn with_comments(mut self, comments: token::TokenMatcher) -> Self {
        self.comments = Some(comments);
        self
    }

    pub fn with_escaped_newlines(mut self, escape_newlines: bool) -> Self {
        self.escape_newlines = escape_newlines;
        self
    }

    fn build(self) -> Result<(RuleForest, LexerOptions), ConstructionError> {
        let options = LexerOptions {
            error_kind: self.error_kind,
            end_of_stream_kind: self.end_of_stream_kind,
            end_of_line_kind: self.end_of_line_kind,
            indent_kind: self.indent_kind,
            dedent_kind: self.dedent_kind,
            comments: self.comments,
            escape_newlines: self.escape_newlines,
        };
        let forest = RuleForest::build(self.declarations)?;
        Ok((forest, options))
    }
}

/// A token namer that falls back to each kind's declared name, with no
/// folding (§9 open-question decision: folding is opt-in).
struct DefaultTokenNamer<'a> {
    names: &'a [(TokenKind, String)],
}

impl<'a> TokenNamer for DefaultTokenNamer<'a> {
    fn name(&self, kind: TokenKind) -> String {
        self.names
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .unwrap_or_else(|| format!("token#{}", kind.0))
    }
}

/// The top-level error surface for [`Language::parse`]: either the lexer
/// produced an `Error` token before parsing began, or the parser rejected
/// the token stream (§7 "Error handling design").
#[derive(Debug, Clone)]
pub enum Error {
    Lex { character: String, location: Span },
    Parse(ParseError),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex { character, .. } => write!(f, "Syntax error, unexpected character {}.", character),
            Error::Parse(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}

/// A fully constructed language: the compiled lexer and the compiled
/// SLR(1) parser, ready to tokenize and parse source text.
pub struct Language {
    forest: RuleForest,
    lexer_options: LexerOptions,
    grammar: ElaboratedGrammar,
    machine: StateMachine,
    token_names: Vec<(TokenKind, String)>,
    log: Log,
}

impl Language {
    pub fn build(
        lexer: LexerBuilder,
        grammar: GrammarBuilder,
        root_type: SemanticType,
        root_max_rank: Option<u32>,
    ) -> Result<Self, ConstructionError> {
        Self::build_with_log(lexer, grammar, root_type, root_max_rank, Log::silent())
    }

    /// Like [`Language::build`], but traces state-machine construction
    /// (including reduce/reduce conflict resolution, §4.5) at `log`'s
    /// configured threshold. `build` itself always builds silently, since
    /// `with_log` only takes effect from the next `tokenize`/`parse` call
    /// onward — too late to observe anything from construction, which runs
    /// once, up front.
    pub fn build_with_log(
        lexer: LexerBuilder,
        grammar: GrammarBuilder,
        root_type: SemanticType,
        root_max_rank: Option<u32>,
        log: Log,
    ) -> Result<Self, ConstructionError> {
        let token_names: Vec<(TokenKind, String)> =
            lexer.declarations.iter().map(|d| (d.kind, d.name.clone())).collect();
        let end_of_stream_kind = lexer.end_of_stream_kind;
        let token_count = token_names.iter().map(|(k, _)| k.0).max().map(|m| m + 1).unwrap_or(0).max(
            end_of_stream_kind.0 + 1,
        );
        let (forest, lexer_options) = lexer.build()?;
        let elaborated = grammar.build(&forest, token_count, end_of_stream_kind, root_type, root_max_rank)?;
        let machine =
            parser::states::build(&elaborated.rules, elaborated.token_count, &[elaborated.accept_rule], &log)?;
        Ok(Self { forest, lexer_options, grammar: elaborated, machine, token_names, log })
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.log = log;
        self
    }

    pub fn tokenize(&self, text: &str) -> TokenStream {
        Lexer::new(&self.forest, &self.lexer_options).with_log(self.log.clone()).tokenize(text)
    }

    /// Lex then parse `text`, per §6 "Parse invocation". If the lexer
    /// produced any `Error` token, that is reported before parsing begins.
    pub fn parse(&self, text: &str) -> Result<Box<dyn Any>, Error> {
        let stream = self.tokenize(text);
        if stream.has_errors {
            let offending = stream.tokens.iter().find(|t| t.kind == self.lexer_options.error_kind).unwrap();
            let character = text[offending.span.start.offset..offending.span.start.offset + 1].to_string();
            return Err(Error::Lex { character, location: offending.span });
        }
        let namer = DefaultTokenNamer { names: &self.token_names };
        let interpreter = Interpreter::new(
            &self.machine,
            &self.grammar.rules,
            self.grammar.token_count,
            self.grammar.accept_rule,
            self.grammar.accept_type,
        );
        interpreter.parse(&stream.tokens, text, &namer).map_err(Error::Parse)
    }

    pub fn evaluate_context(&self, text: &str, offset: usize) -> context::ContextEvaluation {
        let stream = self.tokenize(text);
        let evaluator = context::ContextEvaluator::new(&self.machine, &self.grammar.rules, self.grammar.token_count);
        evaluator.evaluate(&stream.tokens, offset)
    }
}
