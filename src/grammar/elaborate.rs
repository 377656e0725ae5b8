//! Rule-set elaboration (§4.4): ranked-type assignment, optional-subset
//! expansion with list lowering, and first/follow fixed-point computation.
//!
//! The teacher builds its combinator tree directly at construction time
//! (`production::builder::ProductionBuilder`), so it has no elaboration
//! pass of its own; this is new logic grounded directly on the spec's
//! three-pass description.

use crate::error::ConstructionError;
use crate::grammar::rules::{
    Arg, DeclaredRule, Entity, ParamSpec, RankedType, Rule, RuleBody, RuleStep, SemanticType, TerminalCapture,
};
use crate::lexer::rule_tree::RuleForest;
use crate::token::TokenKind;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ListShape {
    element_type: SemanticType,
    separator: Option<TokenKind>,
    terminator: Option<TokenKind>,
}

/// The elaborated rule set, ready for state-machine construction.
pub struct ElaboratedGrammar {
    pub rules: Vec<Rule>,
    pub token_count: u32,
    pub root_type: SemanticType,
    /// The single synthesized rule `root -> Root(<=cap) EndOfStream`
    /// (§4.5's implicit augmented start production); the only rule ever
    /// used to seed state-machine construction and to recognize a
    /// completed parse.
    pub accept_rule: u32,
    pub accept_type: SemanticType,
    pub end_of_stream: TokenKind,
}

struct Elaborator<'a> {
    forest: &'a RuleForest,
    token_count: u32,
    rules: Vec<Rule>,
    producers: HashMap<SemanticType, Vec<(u32, u32)>>, // type -> [(rank, rule_id)]
    max_rank: HashMap<SemanticType, u32>,
    next_synthetic_type: u32,
    list_shapes: HashMap<ListShape, (u32, u32)>, // shape -> (list_end_id, list_loop_id)
}

fn placeholder_rule(ty: SemanticType, rank: u32) -> Rule {
    Rule {
        result_type: RankedType { ty, rank },
        body: RuleBody::Method {
            callback: Rc::new(|_, _| unreachable!("reserved rule slot was never filled")),
            provided: Vec::new(),
            params: Vec::new(),
        },
        steps: Vec::new(),
        context_tag: None,
        starting_tokens: HashSet::new(),
        reducing_tokens: HashSet::new(),
    }
}

impl<'a> Elaborator<'a> {
    fn push_rule(&mut self, rule: Rule) -> u32 {
        let id = self.rules.len() as u32;
        let rt = rule.result_type;
        self.rules.push(rule);
        self.producers.entry(rt.ty).or_default().push((rt.rank, id));
        let entry = self.max_rank.entry(rt.ty).or_insert(0);
        *entry = (*entry).max(rt.rank);
        id
    }

    /// Reserves a rule id for `ty`/`rank` and registers it as a producer
    /// immediately, before its steps are known. This lets a later pass
    /// compute every declared rule's steps (which may reference the rule's
    /// own type, including itself for left recursion, or a type declared
    /// later in the grammar, e.g. a grouping rule referencing the
    /// expression it brackets) against the complete producer set.
    fn reserve_rule(&mut self, ty: SemanticType, rank: u32) -> u32 {
        let id = self.rules.len() as u32;
        self.rules.push(placeholder_rule(ty, rank));
        self.producers.entry(ty).or_default().push((rank, id));
        let entry = self.max_rank.entry(ty).or_insert(0);
        *entry = (*entry).max(rank);
        id
    }

    fn fill_rule(&mut self, id: u32, rule: Rule) {
        self.rules[id as usize] = rule;
    }

    fn producers_up_to(&self, ty: SemanticType, max_rank: Option<u32>) -> Vec<Entity> {
        let cap = max_rank.unwrap_or(u32::MAX);
        self.producers
            .get(&ty)
            .into_iter()
            .flatten()
            .filter(|(rank, _)| *rank <= cap)
            .map(|(_, id)| Entity::from_rule(self.token_count, *id))
            .collect()
    }

    /// Like `producers_up_to`, but fails eagerly (§4.4 "unknown non-terminal
    /// type") rather than handing back a silently-unsatisfiable empty
    /// source set when nothing produces `ty` at or below `max_rank`.
    fn producers_up_to_checked(&self, ty: SemanticType, max_rank: Option<u32>) -> Result<Vec<Entity>, ConstructionError> {
        let sources = self.producers_up_to(ty, max_rank);
        if sources.is_empty() {
            return Err(unknown_type_error(&format!("SemanticType({})", ty.0)));
        }
        Ok(sources)
    }

    fn expand_terminal_sources(&self, tokens: &[TokenKind]) -> Vec<Entity> {
        let mut set: HashSet<TokenKind> = tokens.iter().copied().collect();
        for &t in tokens {
            set.extend(self.forest.public_descendants(t).iter().copied());
        }
        let mut sorted: Vec<TokenKind> = set.into_iter().collect();
        sorted.sort_by_key(|k| k.0);
        sorted.into_iter().map(Entity::from_token).collect()
    }

    /// Ensures the `LIST_END`/`LIST_LOOP` pair exists for this list shape,
    /// hash-consing on repeat shapes (§4.4 "hashed-cached rules").
    fn list_rules_for(&mut self, shape: ListShape) -> (u32, u32) {
        if let Some(&ids) = self.list_shapes.get(&shape) {
            return ids;
        }
        let list_type = SemanticType(self.next_synthetic_type);
        self.next_synthetic_type += 1;

        let element_step = RuleStep {
            sources: self.producers_up_to(shape.element_type, None),
            is_terminal: false,
            tag: None,
        };

        let mut end_steps = vec![element_step.clone()];
        let has_terminator = shape.terminator.is_some() && shape.separator.is_none();
        if has_terminator {
            end_steps.push(RuleStep {
                sources: self.expand_terminal_sources(&[shape.terminator.unwrap()]),
                is_terminal: true,
                tag: None,
            });
        }
        let list_end_id = self.push_rule(Rule {
            result_type: RankedType { ty: list_type, rank: 0 },
            body: RuleBody::ListEnd { element_type: shape.element_type, has_terminator },
            steps: end_steps,
            context_tag: None,
            starting_tokens: HashSet::new(),
            reducing_tokens: HashSet::new(),
        });

        // Placeholder LIST_LOOP referencing itself and LIST_END; patched
        // below once its own id is known, since the loop step must
        // reference both prior variants of "rest of the list".
        let loop_id = self.rules.len() as u32;
        let list_ref_sources = vec![
            Entity::from_rule(self.token_count, list_end_id),
            Entity::from_rule(self.token_count, loop_id),
        ];
        let mut loop_steps = vec![element_step];
        let mut non_terminal_steps = 1u32;
        if let Some(sep) = shape.separator {
            loop_steps.push(RuleStep { sources: self.expand_terminal_sources(&[sep]), is_terminal: true, tag: None });
        } else if has_terminator {
            loop_steps.push(RuleStep {
                sources: self.expand_terminal_sources(&[shape.terminator.unwrap()]),
                is_terminal: true,
                tag: None,
            });
        }
        loop_steps.push(RuleStep { sources: list_ref_sources, is_terminal: false, tag: None });
        non_terminal_steps += 1;

        let pushed = self.push_rule(Rule {
            result_type: RankedType { ty: list_type, rank: 0 },
            body: RuleBody::ListLoop { element_type: shape.element_type, non_terminal_step_count: non_terminal_steps },
            steps: loop_steps,
            context_tag: None,
            starting_tokens: HashSet::new(),
            reducing_tokens: HashSet::new(),
        });
        debug_assert_eq!(pushed, loop_id);

        self.list_shapes.insert(shape, (list_end_id, loop_id));
        (list_end_id, loop_id)
    }

    /// Rule ids usable as the entry point for a list parameter of the
    /// given `min` (§4.4 list lowering, `min`-unrolling).
    fn list_entry_sources(&mut self, shape: ListShape, min: u32) -> Result<Vec<Entity>, ConstructionError> {
        let (end_id, loop_id) = self.list_rules_for(shape);
        match min {
            0 | 1 => Ok(vec![Entity::from_rule(self.token_count, end_id), Entity::from_rule(self.token_count, loop_id)]),
            2 => Ok(vec![Entity::from_rule(self.token_count, loop_id)]),
            n => {
                let element_step = RuleStep {
                    sources: self.producers_up_to(shape.element_type, None),
                    is_terminal: false,
                    tag: None,
                };
                let mut steps = Vec::new();
                for _ in 0..(n - 1) {
                    steps.push(element_step.clone());
                }
                steps.push(RuleStep {
                    sources: vec![Entity::from_rule(self.token_count, loop_id)],
                    is_terminal: false,
                    tag: None,
                });
                let synthetic_type = SemanticType(self.next_synthetic_type);
                self.next_synthetic_type += 1;
                let init_id = self.push_rule(Rule {
                    result_type: RankedType { ty: synthetic_type, rank: 0 },
                    body: RuleBody::ListLoop { element_type: shape.element_type, non_terminal_step_count: n },
                    steps,
                    context_tag: None,
                    starting_tokens: HashSet::new(),
                    reducing_tokens: HashSet::new(),
                });
                Ok(vec![Entity::from_rule(self.token_count, init_id)])
            }
        }
    }
}

/// The number of optional-subset variants one declared rule expands into.
fn variant_count(declared: &DeclaredRule) -> usize {
    let optional_count = declared.params.iter().filter(|p| p.is_optional()).count();
    1usize << optional_count
}

/// Reserves rule ids for every optional-subset variant of one declared
/// rule, in the same subset order `fill_declared_rule` iterates, without
/// computing steps yet (see [`Elaborator::reserve_rule`]).
fn reserve_declared_rule(elaborator: &mut Elaborator, declared: &DeclaredRule) -> Vec<u32> {
    (0..variant_count(declared)).map(|_| elaborator.reserve_rule(declared.result_type, declared.rank)).collect()
}

/// Fills in the steps for one declared rule's previously reserved variant
/// ids (see [`reserve_declared_rule`]).
fn fill_declared_rule(elaborator: &mut Elaborator, declared: &DeclaredRule, ids: &[u32]) -> Result<(), ConstructionError> {
    let optional_indices: Vec<usize> =
        declared.params.iter().enumerate().filter(|(_, p)| p.is_optional()).map(|(i, _)| i).collect();

    for (subset, &id) in ids.iter().enumerate() {
        let mut included = vec![true; declared.params.len()];
        for (bit, &idx) in optional_indices.iter().enumerate() {
            included[idx] = subset & (1 << bit) != 0;
        }

        let mut steps = Vec::new();
        let mut provided = vec![None; declared.params.len()];
        for (i, param) in declared.params.iter().enumerate() {
            if !included[i] {
                continue;
            }
            let step = match param {
                ParamSpec::Terminal { tokens, .. } => {
                    RuleStep { sources: elaborator.expand_terminal_sources(tokens), is_terminal: true, tag: None }
                }
                ParamSpec::NonTerminal { result_type, max_rank, .. } => RuleStep {
                    sources: elaborator.producers_up_to_checked(*result_type, *max_rank)?,
                    is_terminal: false,
                    tag: None,
                },
                ParamSpec::List { element_type, min, separator, terminator, .. } => {
                    // Validates the element type before lowering into the
                    // LIST_END/LIST_LOOP machinery, whose own sources always
                    // reference those synthesized rules and so would never
                    // come back empty even if nothing produces `element_type`.
                    elaborator.producers_up_to_checked(*element_type, None)?;
                    let shape = ListShape { element_type: *element_type, separator: *separator, terminator: *terminator };
                    RuleStep { sources: elaborator.list_entry_sources(shape, *min)?, is_terminal: false, tag: None }
                }
            };
            provided[i] = Some(steps.len());
            steps.push(step);
        }

        elaborator.fill_rule(
            id,
            Rule {
                result_type: RankedType { ty: declared.result_type, rank: declared.rank },
                body: RuleBody::Method {
                    callback: declared.callback.clone(),
                    provided,
                    params: declared.params.clone(),
                },
                steps,
                context_tag: declared.context_tag,
                starting_tokens: HashSet::new(),
                reducing_tokens: HashSet::new(),
            },
        );
    }
    Ok(())
}

/// Pass 3: iterate first/follow sets to a fixed point. `root_rules` are
/// seeded with `end_of_stream` in their follow set before the fixed point
/// runs, since only the rules that can stand as the whole parse may
/// legitimately be followed by the end of input; the fixed point then
/// propagates that seed down into whichever nested rule actually produces
/// the root's trailing symbol.
fn compute_first_follow(rules: &mut [Rule], token_count: u32, end_of_stream: TokenKind, root_rules: &[u32]) {
    for rule in rules.iter_mut() {
        rule.starting_tokens.clear();
        if let Some(first) = rule.steps.first() {
            if first.is_terminal {
                rule.starting_tokens = first.sources.iter().filter_map(|e| e.as_token(token_count)).collect();
            }
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..rules.len() {
            if let Some(first) = rules[i].steps.first().cloned() {
                if !first.is_terminal {
                    let mut addition = HashSet::new();
                    for source in &first.sources {
                        if let Some(idx) = source.as_rule_index(token_count) {
                            addition.extend(rules[idx as usize].starting_tokens.iter().copied());
                        }
                    }
                    let rule = &mut rules[i];
                    let before = rule.starting_tokens.len();
                    rule.starting_tokens.extend(addition);
                    if rule.starting_tokens.len() != before {
                        changed = true;
                    }
                }
            }
        }
    }

    for rule in rules.iter_mut() {
        rule.reducing_tokens.clear();
    }
    for &id in root_rules {
        rules[id as usize].reducing_tokens.insert(end_of_stream);
    }

    let mut changed = true;
    while changed {
        changed = false;
        let snapshot_starting: Vec<HashSet<TokenKind>> = rules.iter().map(|r| r.starting_tokens.clone()).collect();
        let mut additions: HashMap<u32, HashSet<TokenKind>> = HashMap::new();

        for (i, rule) in rules.iter().enumerate() {
            additions.entry(i as u32).or_default();
            for window in rule.steps.windows(2) {
                let (s_i, s_next) = (&window[0], &window[1]);
                if s_i.is_terminal {
                    continue;
                }
                let follow: HashSet<TokenKind> = if s_next.is_terminal {
                    s_next.sources.iter().filter_map(|e| e.as_token(token_count)).collect()
                } else {
                    let mut set = HashSet::new();
                    for src in &s_next.sources {
                        if let Some(idx) = src.as_rule_index(token_count) {
                            set.extend(snapshot_starting[idx as usize].iter().copied());
                        }
                    }
                    set
                };
                for src in &s_i.sources {
                    if let Some(idx) = src.as_rule_index(token_count) {
                        additions.entry(idx).or_default().extend(follow.iter().copied());
                    }
                }
            }
            if let Some(last) = rule.steps.last() {
                if !last.is_terminal {
                    let own_follow = rule.reducing_tokens.clone();
                    for src in &last.sources {
                        if let Some(idx) = src.as_rule_index(token_count) {
                            additions.entry(idx).or_default().extend(own_follow.iter().copied());
                        }
                    }
                }
            }
        }

        // EndOfStream seeded separately by caller before first call; here
        // we just fold in the computed additions.
        for (idx, add) in additions {
            let rule = &mut rules[idx as usize];
            let before = rule.reducing_tokens.len();
            rule.reducing_tokens.extend(add);
            if rule.reducing_tokens.len() != before {
                changed = true;
            }
        }
    }
}

/// Elaborate a declared grammar into its SLR-ready rule set.
pub fn elaborate(
    forest: &RuleForest,
    token_count: u32,
    end_of_stream: TokenKind,
    root_type: SemanticType,
    root_max_rank: Option<u32>,
    declared: Vec<DeclaredRule>,
) -> Result<ElaboratedGrammar, ConstructionError> {
    let mut elaborator = Elaborator {
        forest,
        token_count,
        rules: Vec::new(),
        producers: HashMap::new(),
        max_rank: HashMap::new(),
        next_synthetic_type: 1_000_000,
        list_shapes: HashMap::new(),
    };

    // Pass A: reserve every declared rule's variants up front so that, when
    // their steps are built in pass B, a rule may reference its own type
    // (left recursion) or a type declared later in the grammar (e.g. a
    // grouping rule referencing the expression it brackets).
    let reservations: Vec<Vec<u32>> = declared.iter().map(|rule| reserve_declared_rule(&mut elaborator, rule)).collect();

    // Pass B: every declared rule's (type, rank) is now registered, so
    // producer lookups made while building one rule's steps see the full
    // grammar, not just the rules declared earlier.
    for (rule, ids) in declared.iter().zip(reservations.iter()) {
        fill_declared_rule(&mut elaborator, rule, ids)?;
    }

    let cap = root_max_rank.unwrap_or_else(|| *elaborator.max_rank.get(&root_type).unwrap_or(&0));
    let root_producers: Vec<Entity> = elaborator.producers_up_to(root_type, Some(cap));

    if root_producers.is_empty() {
        return Err(ConstructionError::new(
            "grammar elaboration",
            "no declared rule produces the root type",
        ));
    }

    // Wrap the root in a single augmented rule `accept -> Root EndOfStream`
    // (a classic LR accept production) so reducing an inner rank's producer
    // mid-expression is never confused with having parsed the whole input:
    // the accept rule can only reduce once the end-of-stream terminal has
    // actually been shifted as its second step.
    let accept_type = SemanticType(elaborator.next_synthetic_type);
    elaborator.next_synthetic_type += 1;
    let accept_rule = elaborator.push_rule(Rule {
        result_type: RankedType { ty: accept_type, rank: 0 },
        body: RuleBody::Method {
            callback: Rc::new(|mut args, _span| {
                let Arg::NonTerminal(value) = args.remove(0) else { unreachable!() };
                Ok(value)
            }),
            provided: vec![Some(0), Some(1)],
            params: vec![
                ParamSpec::NonTerminal { result_type: root_type, max_rank: Some(cap), optional: false },
                ParamSpec::Terminal { tokens: vec![end_of_stream], optional: false, capture: TerminalCapture::Kind },
            ],
        },
        steps: vec![
            RuleStep { sources: root_producers, is_terminal: false, tag: None },
            RuleStep { sources: elaborator.expand_terminal_sources(&[end_of_stream]), is_terminal: true, tag: None },
        ],
        context_tag: None,
        starting_tokens: HashSet::new(),
        reducing_tokens: HashSet::new(),
    });

    compute_first_follow(&mut elaborator.rules, token_count, end_of_stream, &[accept_rule]);

    Ok(ElaboratedGrammar {
        rules: elaborator.rules,
        token_count,
        root_type,
        accept_rule,
        accept_type,
        end_of_stream,
    })
}

pub fn unknown_type_error(name: &str) -> ConstructionError {
    ConstructionError::new("grammar elaboration", format!("unknown non-terminal type '{}'", name))
}
