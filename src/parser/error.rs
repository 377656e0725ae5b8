//! Parse-time syntax errors and the acceptable-token simulation (§4.7).
//!
//! `Display` formatting matches the teacher's hand-rolled `ParseError`
//! (`error.rs`): a plain struct with a message assembled by `write!`, no
//! `thiserror`/`anyhow`.

use crate::grammar::rules::{Entity, Rule};
use crate::parser::states::{reduce_rule, Action, StateMachine};
use crate::position::Span;
use crate::token::TokenKind;
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// Translates token kinds to display names for error messages, with
/// optional folding of a kind into a more general one already present in
/// the expected set (e.g. `Operator` folding `Plus`).
pub trait TokenNamer {
    fn name(&self, kind: TokenKind) -> String;

    /// Whether `kind` is dominated by (and so omitted in favor of)
    /// another kind in the same expected set. Opt-in: default `false`.
    fn is_folded(&self, _kind: TokenKind) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct ParseError {
    pub token: String,
    pub expected: Vec<String>,
    pub location: Span,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.expected.len() {
            0 => write!(f, "Syntax error, unexpected {}.", self.token),
            1 => write!(f, "Syntax error, found {} but expected {}.", self.token, self.expected[0]),
            n => {
                write!(f, "Syntax error, found {} but expected ", self.token)?;
                for (i, name) in self.expected.iter().enumerate() {
                    if i == 0 {
                        write!(f, "{}", name)?;
                    } else if i == n - 1 {
                        write!(f, " or {}", name)?;
                    } else {
                        write!(f, ", {}", name)?;
                    }
                }
                write!(f, ".")
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// §4.7: the set of token kinds that could have been accepted in `state`,
/// including those reachable by first simulating reductions.
pub fn acceptable_tokens(
    machine: &StateMachine,
    rules: &[Rule],
    token_count: u32,
    state: u32,
    state_stack: &[u32],
) -> HashSet<TokenKind> {
    let mut result = HashSet::new();
    let mut visited = HashSet::new();
    collect_acceptable(machine, rules, token_count, state, state_stack, &mut result, &mut visited);
    result
}

fn collect_acceptable(
    machine: &StateMachine,
    rules: &[Rule],
    token_count: u32,
    state: u32,
    state_stack: &[u32],
    result: &mut HashSet<TokenKind>,
    visited: &mut HashSet<u32>,
) {
    if !visited.insert(state) {
        return;
    }
    for raw in 0..token_count {
        let kind = TokenKind(raw);
        let action: Action = machine.action(state, Entity(raw));
        if action > 0 {
            result.insert(kind);
            continue;
        }
        if action < 0 {
            let rule_id = reduce_rule(action);
            let n = rules[rule_id as usize].steps.len().max(1);
            // `chain` is the combined (state_stack ++ [state]) view of the
            // parse stack; popping n-1 entries and peeking the new top
            // mirrors the interpreter's real reduce bookkeeping (§4.6).
            let mut chain: Vec<u32> = state_stack.to_vec();
            chain.push(state);
            if n > chain.len() {
                continue;
            }
            let remaining_len = chain.len() - n;
            // When the reduce consumes the whole simulated chain, the
            // interpreter's equivalent truncate leaves its state_stack
            // empty and peeks the pre-reduce `state` itself (§4.6); mirror
            // that fallback instead of indexing one before the chain.
            let (new_top, rest): (u32, &[u32]) = if remaining_len == 0 {
                (state, &[])
            } else {
                (chain[remaining_len - 1], &chain[..remaining_len - 1])
            };
            let goto_entity = Entity::from_rule(token_count, rule_id);
            let goto_action = machine.action(new_top, goto_entity);
            if goto_action > 0 {
                let new_state = goto_action as u32;
                collect_acceptable(machine, rules, token_count, new_state, rest, result, visited);
            }
        }
    }
}

/// Build the error payload for the offending `(state, token)` pair.
pub fn build_error(
    machine: &StateMachine,
    rules: &[Rule],
    token_count: u32,
    state: u32,
    state_stack: &[u32],
    offending_text: String,
    location: Span,
    namer: &dyn TokenNamer,
) -> ParseError {
    let kinds = acceptable_tokens(machine, rules, token_count, state, state_stack);
    let mut names: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    let mut sorted: Vec<TokenKind> = kinds.into_iter().collect();
    sorted.sort_by_key(|k| k.0);
    for kind in sorted {
        if namer.is_folded(kind) {
            continue;
        }
        let name = namer.name(kind);
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    ParseError { token: offending_text, expected: names, location }
}
