//! The context-evaluation ("no-reduction mode") surface for editor tooling
//! (§4.8). New module: reuses the action table and `Rule` types verbatim,
//! adding only the context-tag stack and the early-stop-on-offset logic.

use crate::grammar::rules::{Entity, Rule};
use crate::lexer::runtime::LexToken;
use crate::parser::states::{reduce_rule, StateMachine};
use crate::token::TokenKind;

/// Why a context evaluation run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ReachedOffset,
    SyntaxError,
    TokensExhausted,
}

/// A terminal that could be shifted from the reached state, paired with
/// the context tags visible from the state it would shift into.
#[derive(Debug, Clone)]
pub struct ShiftableTerminal {
    pub kind: TokenKind,
    pub resulting_context_tags: Vec<u32>,
}

#[derive(Debug, Clone)]
pub struct ContextEvaluation {
    pub context_tag_stack: Vec<u32>,
    pub state_context_tags: Vec<u32>,
    pub shiftable: Vec<ShiftableTerminal>,
    pub last_token: Option<LexToken>,
    pub stop_reason: StopReason,
}

pub struct ContextEvaluator<'a> {
    machine: &'a StateMachine,
    rules: &'a [Rule],
    token_count: u32,
}

impl<'a> ContextEvaluator<'a> {
    pub fn new(machine: &'a StateMachine, rules: &'a [Rule], token_count: u32) -> Self {
        Self { machine, rules, token_count }
    }

    /// Run the action table in no-reduction mode up to `offset` (a byte
    /// offset into the original source).
    pub fn evaluate(&self, tokens: &[LexToken], offset: usize) -> ContextEvaluation {
        let mut state = self.machine.initial_state;
        let mut state_stack: Vec<u32> = Vec::new();
        let mut tag_stack: Vec<u32> = Vec::new();
        let mut pos = 0usize;
        let mut last_token: Option<LexToken> = None;

        loop {
            if pos >= tokens.len() {
                return self.finish(state, tag_stack, last_token, StopReason::TokensExhausted);
            }
            let current = tokens[pos];
            if current.span.start.offset > offset {
                return self.finish(state, tag_stack, last_token, StopReason::ReachedOffset);
            }

            let entity = Entity::from_token(current.kind);
            let action = self.machine.action(state, entity);

            if action == 0 {
                return self.finish(state, tag_stack, last_token, StopReason::SyntaxError);
            }

            if action > 0 {
                let target = action as u32;
                state_stack.push(state);
                state = target;
                if let Some(&tag) = self.machine.context_tags.get(target as usize).and_then(|v| v.first()) {
                    tag_stack.push(tag);
                }
                last_token = Some(current);
                pos += 1;
                continue;
            }

            let rule_id = reduce_rule(action);
            let rule = &self.rules[rule_id as usize];
            let n = rule.steps.len();
            if n > 0 {
                state_stack.truncate(state_stack.len() - (n - 1));
                for _ in 0..n.min(tag_stack.len()) {
                    tag_stack.pop();
                }
            }
            if let Some(tag) = rule.context_tag {
                tag_stack.push(tag);
            }
            let peek_state = *state_stack.last().unwrap_or(&state);
            let goto_entity = Entity::from_rule(self.token_count, rule_id);
            state = self.machine.action(peek_state, goto_entity) as u32;
        }
    }

    fn finish(
        &self,
        state: u32,
        tag_stack: Vec<u32>,
        last_token: Option<LexToken>,
        reason: StopReason,
    ) -> ContextEvaluation {
        let state_context_tags = self.machine.context_tags.get(state as usize).cloned().unwrap_or_default();
        let mut shiftable = Vec::new();
        for raw in 0..self.token_count {
            let kind = TokenKind(raw);
            let action = self.machine.action(state, Entity(raw));
            if action > 0 {
                let target = action as u32;
                let tags = self.machine.context_tags.get(target as usize).cloned().unwrap_or_default();
                shiftable.push(ShiftableTerminal { kind, resulting_context_tags: tags });
            }
        }
        ContextEvaluation { context_tag_stack: tag_stack, state_context_tags, shiftable, last_token, stop_reason: reason }
    }
}
