//! The lexer's longest-match loop (§4.3).
//!
//! The teacher has no direct analogue for this loop (its `Tokenizer` drives
//! combinators recursively rather than scanning a flat rule list), so the
//! control flow here is new; the byte-cursor and `Position` bookkeeping
//! follow the conventions of the teacher's `util::Code`.

use crate::lexer::rule_tree::RuleForest;
use crate::log::{Log, LogLevel};
use crate::position::{Position, Span};
use crate::token::{TokenKind, TokenMatcher};

/// Role kinds configured once per lexer; absent roles are simply never
/// produced by the runtime.
#[derive(Debug, Clone)]
pub struct LexerOptions {
    pub error_kind: TokenKind,
    pub end_of_stream_kind: TokenKind,
    pub end_of_line_kind: Option<TokenKind>,
    pub indent_kind: Option<TokenKind>,
    pub dedent_kind: Option<TokenKind>,
    pub comments: Option<TokenMatcher>,
    pub escape_newlines: bool,
}

/// A single lexed token: its final (most-refined) kind and its span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexToken {
    pub kind: TokenKind,
    pub span: Span,
}

/// The lexer's output (§4.1 "Token stream"): a flat token list plus the
/// newline-offset index used for position lookups.
#[derive(Debug, Clone)]
pub struct TokenStream {
    pub tokens: Vec<LexToken>,
    pub newline_offsets: Vec<usize>,
    pub has_errors: bool,
}

pub struct Lexer<'a> {
    forest: &'a RuleForest,
    options: &'a LexerOptions,
    log: Log,
}

impl<'a> Lexer<'a> {
    pub fn new(forest: &'a RuleForest, options: &'a LexerOptions) -> Self {
        Self { forest, options, log: Log::silent() }
    }

    pub fn with_log(mut self, log: Log) -> Self {
        self.log = log;
        self
    }

    pub fn tokenize(&self, source: &str) -> TokenStream {
        let trimmed_end = trim_trailing_skippable(source.as_bytes());
        let buffer = &source.as_bytes()[..trimmed_end];

        let mut tokens = Vec::new();
        let mut indent_stack = if self.options.indent_kind.is_some() || self.options.dedent_kind.is_some() {
            Some(vec![0usize])
        } else {
            None
        };
        let mut last_cannot_be_postfix = false;
        let mut backslash_pos: Option<usize> = None;
        let mut start = 0usize;
        let mut line = 1usize;
        let mut line_start = 0usize;

        while start < buffer.len() {
            let c = buffer[start] as char;

            if c == ' ' || c == '\t' || c == '\r' {
                start += 1;
                continue;
            }

            if c == '\n' {
                if backslash_pos.is_some() {
                    backslash_pos = None;
                    start += 1;
                    line += 1;
                    line_start = start;
                    continue;
                }
                let (new_start, new_line, new_line_start) =
                    self.handle_newline(buffer, start, line, line_start, &mut indent_stack, &mut tokens);
                start = new_start;
                line = new_line;
                line_start = new_line_start;
                if last_cannot_be_postfix {
                    self.strip_trailing_eol_indent(&mut tokens, &mut indent_stack);
                }
                continue;
            }

            if let Some(comments) = &self.options.comments {
                let len = comments.match_length(buffer, start);
                if len > 0 {
                    start += len;
                    continue;
                }
            }

            if let Some(pos) = backslash_pos {
                backslash_pos = None;
                start = pos;
                continue;
            }
            if c == '\\' && self.options.escape_newlines {
                backslash_pos = Some(start);
                start += 1;
                continue;
            }

            let position = Position::new(start, line, start - line_start + 1);
            let (kind, len) = self.match_longest(buffer, start);
            if len == 0 {
                self.log.trace(LogLevel::Default, || format!("lex error at offset {}", start));
                tokens.push(LexToken { kind: self.options.error_kind, span: Span::new(position, 1) });
                last_cannot_be_postfix = false;
                start += 1;
                continue;
            }

            let refined = self.refine(kind, buffer, start, len);
            let decl = self.forest.declaration(refined).expect("matched kind must be declared");

            if !decl.can_be_prefix {
                self.strip_trailing_eol_indent(&mut tokens, &mut indent_stack);
            }
            last_cannot_be_postfix = !decl.can_be_postfix;

            tokens.push(LexToken { kind: refined, span: Span::new(position, len) });
            start += len;
        }

        if !tokens.is_empty() {
            if let Some(eol) = self.options.end_of_line_kind {
                let last_kind = tokens.last().map(|t| t.kind);
                if last_kind != Some(eol) && last_kind != self.options.dedent_kind {
                    tokens.push(LexToken { kind: eol, span: zero_width(buffer.len(), line, line_start) });
                }
            }
            if let (Some(stack), Some(dedent)) = (&mut indent_stack, self.options.dedent_kind) {
                while stack.len() > 1 {
                    stack.pop();
                    tokens.push(LexToken { kind: dedent, span: zero_width(buffer.len(), line, line_start) });
                }
            }
            tokens.push(LexToken {
                kind: self.options.end_of_stream_kind,
                span: zero_width(buffer.len(), line, line_start),
            });
        }

        TokenStream {
            has_errors: tokens.iter().any(|t| t.kind == self.options.error_kind),
            newline_offsets: newline_offsets(source.as_bytes()),
            tokens,
        }
    }

    fn match_longest(&self, buffer: &[u8], start: usize) -> (TokenKind, usize) {
        let c = buffer[start] as char;
        let mut best: Option<(TokenKind, usize)> = None;
        for &root in self.forest.roots() {
            let decl = self.forest.declaration(root).expect("root must be declared");
            let Some(matcher) = &decl.matcher else { continue };
            if !matcher.starts_with(c) {
                continue;
            }
            let len = matcher.match_length(buffer, start);
            if len == 0 {
                continue;
            }
            match best {
                Some((_, best_len)) if len <= best_len => {}
                _ => best = Some((root, len)),
            }
        }
        best.unwrap_or((self.options.error_kind, 0))
    }

    /// Recursively narrow a root match to its most-refined descendant
    /// (§4.3 step 6): at each level, the unique child whose own definition
    /// matches exactly `len` bytes wins.
    fn refine(&self, kind: TokenKind, buffer: &[u8], start: usize, len: usize) -> TokenKind {
        let mut current = kind;
        loop {
            let mut matched_child = None;
            for &child in self.forest.children_of(current) {
                let decl = self.forest.declaration(child).expect("child must be declared");
                if let Some(matcher) = &decl.matcher {
                    if matcher.match_length(buffer, start) == len {
                        matched_child = Some(child);
                        break;
                    }
                }
            }
            match matched_child {
                Some(child) => current = child,
                None => return current,
            }
        }
    }

    /// Consumes `'\n'`, then either emits `EndOfLine` and scans the
    /// indentation of the next real line, or (if indentation isn't
    /// configured) simply advances.
    fn handle_newline(
        &self,
        buffer: &[u8],
        start: usize,
        line: usize,
        line_start: usize,
        indent_stack: &mut Option<Vec<usize>>,
        tokens: &mut Vec<LexToken>,
    ) -> (usize, usize, usize) {
        let _ = line_start;
        if let Some(eol) = self.options.end_of_line_kind {
            let emit = !tokens.is_empty()
                && tokens.last().map(|t| t.kind) != self.options.indent_kind
                && tokens.last().map(|t| t.kind) != self.options.dedent_kind;
            if emit {
                tokens.push(LexToken { kind: eol, span: zero_width(start, line, start - line_start + 1) });
            }
        }
        let mut cursor = start + 1;
        let mut new_line = line + 1;
        let mut new_line_start = cursor;

        if indent_stack.is_none() {
            return (cursor, new_line, new_line_start);
        }

        let mut width = 0usize;
        loop {
            if cursor >= buffer.len() {
                break;
            }
            match buffer[cursor] as char {
                ' ' => {
                    width += 1;
                    cursor += 1;
                }
                '\t' => {
                    width += 2;
                    cursor += 1;
                }
                '\r' => {
                    cursor += 1;
                }
                '\n' => {
                    width = 0;
                    cursor += 1;
                    new_line += 1;
                    new_line_start = cursor;
                }
                _ => {
                    if let Some(comments) = &self.options.comments {
                        let len = comments.match_length(buffer, cursor);
                        if len > 0 {
                            cursor += len;
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        if cursor < buffer.len() {
            let stack = indent_stack.as_mut().unwrap();
            let top = *stack.last().unwrap();
            if top > width {
                while *stack.last().unwrap() > width {
                    stack.pop();
                    if let Some(dedent) = self.options.dedent_kind {
                        tokens.push(LexToken { kind: dedent, span: zero_width(cursor, new_line, 1) });
                    }
                }
            } else if top < width {
                stack.push(width);
                if let Some(indent) = self.options.indent_kind {
                    tokens.push(LexToken { kind: indent, span: zero_width(cursor, new_line, 1) });
                }
            }
        }

        (cursor, new_line, new_line_start)
    }

    /// If the last two emitted tokens are exactly `(EndOfLine, Indent)`,
    /// remove both and pop the indent that was pushed for them (§4.3,
    /// non-prefix/non-postfix infix side effects).
    fn strip_trailing_eol_indent(&self, tokens: &mut Vec<LexToken>, indent_stack: &mut Option<Vec<usize>>) {
        let (Some(eol), Some(indent)) = (self.options.end_of_line_kind, self.options.indent_kind) else {
            return;
        };
        if tokens.len() < 2 {
            return;
        }
        let last = tokens[tokens.len() - 1].kind;
        let before_last = tokens[tokens.len() - 2].kind;
        if last == indent && before_last == eol {
            tokens.truncate(tokens.len() - 2);
            if let Some(stack) = indent_stack {
                stack.pop();
            }
        }
    }
}

fn zero_width(offset: usize, line: usize, column: usize) -> Span {
    Span::new(Position::new(offset, line, column), 0)
}

fn trim_trailing_skippable(buffer: &[u8]) -> usize {
    let mut end = buffer.len();
    while end > 0 {
        match buffer[end - 1] {
            b' ' | b'\t' | b'\r' => end -= 1,
            _ => break,
        }
    }
    end
}

fn newline_offsets(buffer: &[u8]) -> Vec<usize> {
    buffer.iter().enumerate().filter(|(_, &b)| b == b'\n').map(|(i, _)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::rule_tree::{RuleForest, TokenDecl};

    fn build(decls: Vec<TokenDecl>) -> RuleForest {
        RuleForest::build(decls).unwrap()
    }

    #[test]
    fn longest_match_and_public_child_refinement() {
        let ident = TokenDecl::new(TokenKind(0), "Identifier", TokenMatcher::from_regex("[a-z]+", true).ok());
        let if_kw = TokenDecl::new(TokenKind(1), "If", TokenMatcher::from_self_named("if").ok()).with_parent(TokenKind(0), true);
        let plus = TokenDecl::new(TokenKind(2), "Plus", TokenMatcher::from_literals(&["+"], true).ok());
        let error = TokenDecl::new(TokenKind(3), "Error", None);
        let eos = TokenDecl::new(TokenKind(4), "EndOfStream", None);
        let forest = build(vec![ident, if_kw, plus, error, eos]);
        let options = LexerOptions {
            error_kind: TokenKind(3),
            end_of_stream_kind: TokenKind(4),
            end_of_line_kind: None,
            indent_kind: None,
            dedent_kind: None,
            comments: None,
            escape_newlines: false,
        };
        let lexer = Lexer::new(&forest, &options);
        let stream = lexer.tokenize("if ifx +");
        let kinds: Vec<u32> = stream.tokens.iter().map(|t| t.kind.0).collect();
        assert_eq!(kinds, vec![1, 0, 2, 4]);
        assert!(!stream.has_errors);
    }

    #[test]
    fn unmatched_character_emits_error_token() {
        let error = TokenDecl::new(TokenKind(0), "Error", None);
        let eos = TokenDecl::new(TokenKind(1), "EndOfStream", None);
        let hash = TokenDecl::new(TokenKind(2), "Hash", TokenMatcher::from_literals(&["#"], true).ok());
        let forest = build(vec![error, eos, hash]);
        let options = LexerOptions {
            error_kind: TokenKind(0),
            end_of_stream_kind: TokenKind(1),
            end_of_line_kind: None,
            indent_kind: None,
            dedent_kind: None,
            comments: None,
            escape_newlines: false,
        };
        let lexer = Lexer::new(&forest, &options);
        let stream = lexer.tokenize("@#");
        assert!(stream.has_errors);
        assert_eq!(stream.tokens[0].kind, TokenKind(0));
        assert_eq!(stream.tokens[1].kind, TokenKind(2));
    }

    #[test]
    fn indentation_emits_indent_and_dedent() {
        let error = TokenDecl::new(TokenKind(0), "Error", None);
        let eos = TokenDecl::new(TokenKind(1), "EndOfStream", None);
        let eol = TokenDecl::new(TokenKind(2), "EndOfLine", None);
        let indent = TokenDecl::new(TokenKind(3), "Indent", None);
        let dedent = TokenDecl::new(TokenKind(4), "Dedent", None);
        let word = TokenDecl::new(TokenKind(5), "Word", TokenMatcher::from_regex("[a-z]+", true).ok());
        let forest = build(vec![error, eos, eol, indent, dedent, word]);
        let options = LexerOptions {
            error_kind: TokenKind(0),
            end_of_stream_kind: TokenKind(1),
            end_of_line_kind: Some(TokenKind(2)),
            indent_kind: Some(TokenKind(3)),
            dedent_kind: Some(TokenKind(4)),
            comments: None,
            escape_newlines: false,
        };
        let lexer = Lexer::new(&forest, &options);
        let stream = lexer.tokenize("a\n  b\nc\n");
        let kinds: Vec<u32> = stream.tokens.iter().map(|t| t.kind.0).collect();
        // a EOL Indent b EOL Dedent c EOL EndOfStream
        assert_eq!(kinds, vec![5, 2, 3, 5, 2, 4, 5, 2, 1]);
    }

    #[test]
    fn escaped_newline_is_consumed() {
        let error = TokenDecl::new(TokenKind(0), "Error", None);
        let eos = TokenDecl::new(TokenKind(1), "EndOfStream", None);
        let word = TokenDecl::new(TokenKind(2), "Word", TokenMatcher::from_regex("[a-z]+", true).ok());
        let forest = build(vec![error, eos, word]);
        let options = LexerOptions {
            error_kind: TokenKind(0),
            end_of_stream_kind: TokenKind(1),
            end_of_line_kind: None,
            indent_kind: None,
            dedent_kind: None,
            comments: None,
            escape_newlines: true,
        };
        let lexer = Lexer::new(&forest, &options);
        let stream = lexer.tokenize("ab\\\ncd");
        let kinds: Vec<u32> = stream.tokens.iter().map(|t| t.kind.0).collect();
        assert_eq!(kinds, vec![2, 2, 1]);
    }
}
