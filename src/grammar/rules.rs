//! Grammar declaration and elaborated rule data model (§3, §4.4).
//!
//! New data types grounded directly on the spec's own vocabulary; the
//! teacher has no declarative grammar layer of its own (its grammar is a
//! combinator tree built directly at construction time), so only the
//! builder-chaining *idiom* of its `production::builder::ProductionBuilder`
//! is carried over, in [`crate::grammar::GrammarBuilder`].

use crate::token::TokenKind;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// A semantic (non-terminal) type, interned as a small integer.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemanticType(pub u32);

/// `(semantic_type, rank)`; rank 0 is the most restrictive producer of a
/// type, higher ranks are more permissive supersets (§3 "Ranked type").
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RankedType {
    pub ty: SemanticType,
    pub rank: u32,
}

/// An entity id unifying token kinds (`id < token_count`) and rule indices
/// (`id >= token_count`) into one integer space (§3 "entity_id").
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entity(pub u32);

impl Entity {
    pub fn from_token(kind: TokenKind) -> Self {
        Entity(kind.0)
    }

    pub fn from_rule(token_count: u32, rule_index: u32) -> Self {
        Entity(token_count + rule_index)
    }

    pub fn as_token(&self, token_count: u32) -> Option<TokenKind> {
        (self.0 < token_count).then_some(TokenKind(self.0))
    }

    pub fn as_rule_index(&self, token_count: u32) -> Option<u32> {
        (self.0 >= token_count).then(|| self.0 - token_count)
    }
}

/// How a terminal parameter's value is delivered to the callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCapture {
    Kind,
    Text,
    TextSpan,
}

/// A single declared parameter of a user rule, before elaboration.
#[derive(Debug, Clone)]
pub enum ParamSpec {
    Terminal {
        tokens: Vec<TokenKind>,
        optional: bool,
        capture: TerminalCapture,
    },
    NonTerminal {
        result_type: SemanticType,
        max_rank: Option<u32>,
        optional: bool,
    },
    List {
        element_type: SemanticType,
        min: u32,
        separator: Option<TokenKind>,
        terminator: Option<TokenKind>,
        max_rank: Option<u32>,
    },
}

impl ParamSpec {
    pub fn is_optional(&self) -> bool {
        match self {
            ParamSpec::Terminal { optional, .. } => *optional,
            ParamSpec::NonTerminal { optional, .. } => *optional,
            ParamSpec::List { min, .. } => *min == 0,
        }
    }
}

/// An argument value handed to a reduction callback (§4.6).
pub enum Arg {
    TerminalKind(TokenKind),
    TerminalText(String),
    TerminalTextSpan(String, crate::position::Span),
    NonTerminal(Box<dyn Any>),
    List(Vec<Box<dyn Any>>),
    Absent,
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::TerminalKind(k) => write!(f, "TerminalKind({:?})", k),
            Arg::TerminalText(s) => write!(f, "TerminalText({:?})", s),
            Arg::TerminalTextSpan(s, span) => write!(f, "TerminalTextSpan({:?}, {})", s, span),
            Arg::NonTerminal(_) => write!(f, "NonTerminal(..)"),
            Arg::List(items) => write!(f, "List(len={})", items.len()),
            Arg::Absent => write!(f, "Absent"),
        }
    }
}

/// A reduction callback: receives the bound arguments (right-to-left
/// binding already resolved into source order) and the reduced span.
pub type Callback = Rc<dyn Fn(Vec<Arg>, crate::position::Span) -> Result<Box<dyn Any>, String>>;

/// A user-declared rule, as supplied to the grammar builder, before
/// elaboration synthesizes optional-subset variants.
#[derive(Clone)]
pub struct DeclaredRule {
    pub result_type: SemanticType,
    pub rank: u32,
    pub context_tag: Option<u32>,
    pub params: Vec<ParamSpec>,
    pub callback: Callback,
}

/// One step of an elaborated rule: a set of acceptable source entities
/// (terminal kinds with public-descendant expansion applied, or rule
/// indices producing a ranked type) plus whether the step is terminal.
#[derive(Debug, Clone)]
pub struct RuleStep {
    pub sources: Vec<Entity>,
    pub is_terminal: bool,
    pub tag: Option<u32>,
}

/// The body distinguishing an ordinary method rule from the two
/// auxiliary forms synthesized for list repetition (§4.4).
#[derive(Clone)]
pub enum RuleBody {
    Method {
        callback: Callback,
        /// Per declared parameter: was it included in this 2^k variant,
        /// and if so, which step index realizes it.
        provided: Vec<Option<usize>>,
        params: Vec<ParamSpec>,
    },
    ListEnd {
        element_type: SemanticType,
        has_terminator: bool,
    },
    ListLoop {
        element_type: SemanticType,
        /// Count of non-terminal steps in this variant (element + loop).
        non_terminal_step_count: u32,
    },
}

/// One elaborated rule, as produced by rule-set elaboration and consumed
/// by state-machine construction and the interpreter.
#[derive(Clone)]
pub struct Rule {
    pub result_type: RankedType,
    pub body: RuleBody,
    pub steps: Vec<RuleStep>,
    pub context_tag: Option<u32>,
    pub starting_tokens: HashSet<TokenKind>,
    pub reducing_tokens: HashSet<TokenKind>,
}

impl Rule {
    pub fn is_list_end(&self) -> bool {
        matches!(self.body, RuleBody::ListEnd { .. })
    }

    pub fn is_list_loop(&self) -> bool {
        matches!(self.body, RuleBody::ListLoop { .. })
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("result_type", &self.result_type)
            .field("steps", &self.steps)
            .field("context_tag", &self.context_tag)
            .finish()
    }
}
