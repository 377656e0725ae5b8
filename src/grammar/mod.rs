//! Grammar declaration (§6 "Parser declaration") and elaboration (§4.4).

pub mod elaborate;
pub mod rules;

pub use elaborate::{elaborate, ElaboratedGrammar};
pub use rules::{
    Arg, Callback, DeclaredRule, Entity, ParamSpec, RankedType, Rule, RuleBody, RuleStep, SemanticType,
    TerminalCapture,
};

use crate::lexer::rule_tree::RuleForest;
use crate::token::TokenKind;
use crate::ConstructionError;

/// A chaining builder for declaring the grammar's rule set, in the style
/// of the teacher's `production::builder::ProductionBuilder`.
#[derive(Default)]
pub struct GrammarBuilder {
    rules: Vec<DeclaredRule>,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rule(mut self, rule: DeclaredRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = DeclaredRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn build(
        self,
        forest: &RuleForest,
        token_count: u32,
        end_of_stream: TokenKind,
        root_type: SemanticType,
        root_max_rank: Option<u32>,
    ) -> Result<ElaboratedGrammar, ConstructionError> {
        elaborate::elaborate(forest, token_count, end_of_stream, root_type, root_max_rank, self.rules)
    }
}
