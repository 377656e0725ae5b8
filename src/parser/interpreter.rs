//! The shift/reduce interpreter (§4.6).
//!
//! New logic grounded directly on the spec's stack bookkeeping; error
//! propagation through `Result<_, ParseError>` matches the teacher's
//! `ParsedResult<I, TNode>` sum-type convention (`error.rs`).

use crate::grammar::rules::{Arg, Entity, ParamSpec, Rule, RuleBody, SemanticType, TerminalCapture};
use crate::lexer::runtime::LexToken;
use crate::parser::error::{build_error, ParseError, TokenNamer};
use crate::parser::states::{reduce_rule, StateMachine};
use std::any::Any;
use std::collections::HashMap;

/// Drives the compiled action table over a token stream, dispatching
/// reduction callbacks and returning the root semantic value.
pub struct Interpreter<'a> {
    machine: &'a StateMachine,
    rules: &'a [Rule],
    token_count: u32,
    accept_rule: u32,
    accept_type: SemanticType,
}

fn token_get(tokens: &[LexToken], i: usize) -> &LexToken {
    if i < tokens.len() {
        &tokens[i]
    } else {
        tokens.last().expect("token stream must contain at least EndOfStream")
    }
}

impl<'a> Interpreter<'a> {
    pub fn new(
        machine: &'a StateMachine,
        rules: &'a [Rule],
        token_count: u32,
        accept_rule: u32,
        accept_type: SemanticType,
    ) -> Self {
        Self { machine, rules, token_count, accept_rule, accept_type }
    }

    pub fn parse(
        &self,
        tokens: &[LexToken],
        buffer: &str,
        namer: &dyn TokenNamer,
    ) -> Result<Box<dyn Any>, ParseError> {
        let mut state = self.machine.initial_state;
        let mut state_stack: Vec<u32> = Vec::new();
        let mut start_tokens: Vec<usize> = Vec::new();
        let mut value_stacks: HashMap<SemanticType, Vec<Box<dyn Any>>> = HashMap::new();
        let mut list_lengths: Vec<u32> = Vec::new();
        let mut pos = 0usize;

        loop {
            let current = token_get(tokens, pos);
            let entity = Entity::from_token(current.kind);
            let action = self.machine.action(state, entity);

            if action == 0 {
                let text = terminal_text(buffer, current, namer);
                let location = if current.span.length == 0 { current.span.with_length(1) } else { current.span };
                return Err(build_error(
                    self.machine,
                    self.rules,
                    self.token_count,
                    state,
                    &state_stack,
                    text,
                    location,
                    namer,
                ));
            }

            if action > 0 {
                start_tokens.push(pos);
                state_stack.push(state);
                state = action as u32;
                pos += 1;
                continue;
            }

            let rule_id = reduce_rule(action);
            let rule = &self.rules[rule_id as usize];
            let n = rule.steps.len();

            let last_token_idx = pos.saturating_sub(1);
            let step_start_indices: Vec<usize> = (0..n).map(|i| start_tokens[start_tokens.len() - n + i]).collect();
            let span = if n == 0 {
                token_get(tokens, pos).span.with_length(0)
            } else {
                let first = step_start_indices[0];
                token_get(tokens, first).span.merge(&token_get(tokens, last_token_idx.max(first)).span)
            };

            match &rule.body {
                RuleBody::ListEnd { .. } => {
                    list_lengths.push(1);
                }
                RuleBody::ListLoop { non_terminal_step_count, .. } => {
                    let top = list_lengths.last_mut().expect("list loop must follow a list-end reduce");
                    *top += non_terminal_step_count.saturating_sub(1);
                }
                RuleBody::Method { callback, provided, params } => {
                    let mut args: Vec<Option<Arg>> = params.iter().map(|_| None).collect();
                    for (i, param) in params.iter().enumerate().rev() {
                        args[i] = Some(match provided[i] {
                            None => neutral_value(param),
                            Some(step_idx) => bind_provided(
                                param,
                                tokens,
                                buffer,
                                step_start_indices[step_idx],
                                &mut value_stacks,
                                &mut list_lengths,
                            ),
                        });
                    }
                    let resolved: Vec<Arg> = args.into_iter().map(|a| a.unwrap()).collect();
                    let value = (callback)(resolved, span)
                        .map_err(|message| ParseError { token: message, expected: Vec::new(), location: span })?;
                    value_stacks.entry(rule.result_type.ty).or_default().push(value);
                }
            }

            if n > 0 {
                start_tokens.truncate(start_tokens.len() - (n - 1));
                state_stack.truncate(state_stack.len() - (n - 1));
            } else {
                start_tokens.push(pos);
            }
            let peek_state = *state_stack.last().unwrap_or(&state);
            let goto_entity = Entity::from_rule(self.token_count, rule_id);
            state = self.machine.action(peek_state, goto_entity) as u32;

            if rule_id == self.accept_rule {
                let value = value_stacks
                    .get_mut(&self.accept_type)
                    .and_then(|stack| stack.pop())
                    .expect("accept rule must have pushed a value");
                return Ok(value);
            }
        }
    }
}

fn terminal_text(buffer: &str, token: &LexToken, namer: &dyn TokenNamer) -> String {
    if token.span.length == 0 {
        namer.name(token.kind)
    } else {
        buffer[token.span.start.offset..token.span.start.offset + token.span.length].to_string()
    }
}

fn bind_provided(
    param: &ParamSpec,
    tokens: &[LexToken],
    buffer: &str,
    step_start_index: usize,
    value_stacks: &mut HashMap<SemanticType, Vec<Box<dyn Any>>>,
    list_lengths: &mut Vec<u32>,
) -> Arg {
    match param {
        ParamSpec::Terminal { capture, .. } => {
            let token = token_get(tokens, step_start_index);
            match capture {
                TerminalCapture::Kind => Arg::TerminalKind(token.kind),
                TerminalCapture::Text => Arg::TerminalText(terminal_substring(buffer, token)),
                TerminalCapture::TextSpan => Arg::TerminalTextSpan(terminal_substring(buffer, token), token.span),
            }
        }
        ParamSpec::NonTerminal { result_type, .. } => {
            let value = value_stacks.get_mut(result_type).and_then(|s| s.pop()).expect("value stack underflow");
            Arg::NonTerminal(value)
        }
        ParamSpec::List { element_type, .. } => {
            let m = list_lengths.pop().unwrap_or(0) as usize;
            let stack = value_stacks.entry(*element_type).or_default();
            let mut items = Vec::with_capacity(m);
            for _ in 0..m {
                items.push(stack.pop().expect("list element value stack underflow"));
            }
            items.reverse();
            Arg::List(items)
        }
    }
}

fn terminal_substring(buffer: &str, token: &LexToken) -> String {
    buffer[token.span.start.offset..token.span.start.offset + token.span.length].to_string()
}

fn neutral_value(param: &ParamSpec) -> Arg {
    match param {
        ParamSpec::Terminal { .. } => Arg::Absent,
        ParamSpec::NonTerminal { .. } => Arg::Absent,
        ParamSpec::List { .. } => Arg::List(Vec::new()),
    }
}
