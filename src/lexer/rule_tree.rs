//! Lexer rule forest: the `from` relation over declared token kinds (§4.1).
//!
//! Grounded on the teacher's `lexeme` module, where a `Pattern`/`Punctuations`
//! matcher composes with a `Mapper` to refine an already-matched span; here
//! the parent/child relation is made explicit as a forest so public-child
//! expansion and sub-token refinement can be computed once at construction
//! time instead of walked ad hoc.

use crate::error::ConstructionError;
use crate::token::{TokenKind, TokenMatcher};
use std::collections::{HashMap, HashSet};

/// A declared token kind: its matcher, infix flags, and optional parent.
#[derive(Debug, Clone)]
pub struct TokenDecl {
    pub kind: TokenKind,
    pub name: String,
    pub matcher: Option<TokenMatcher>,
    pub can_be_prefix: bool,
    pub can_be_postfix: bool,
    pub parent: Option<(TokenKind, bool)>, // (parent, is_public)
}

impl TokenDecl {
    pub fn new(kind: TokenKind, name: impl Into<String>, matcher: Option<TokenMatcher>) -> Self {
        Self {
            kind,
            name: name.into(),
            matcher,
            can_be_prefix: true,
            can_be_postfix: true,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: TokenKind, is_public: bool) -> Self {
        self.parent = Some((parent, is_public));
        self
    }

    pub fn with_infix_flags(mut self, can_be_prefix: bool, can_be_postfix: bool) -> Self {
        self.can_be_prefix = can_be_prefix;
        self.can_be_postfix = can_be_postfix;
        self
    }
}

/// The lexer's rule forest: root kinds tried first-character-first, each
/// with a list of descendant kinds matched only against the text the root
/// already recognized.
#[derive(Debug, Clone)]
pub struct RuleForest {
    declarations: HashMap<TokenKind, TokenDecl>,
    roots: Vec<TokenKind>,
    children: HashMap<TokenKind, Vec<TokenKind>>,
    public_descendants: HashMap<TokenKind, HashSet<TokenKind>>,
}

impl RuleForest {
    /// Build the forest from a flat declaration list, validating the `from`
    /// relation has no cycles.
    pub fn build(declarations: Vec<TokenDecl>) -> Result<Self, ConstructionError> {
        let mut by_kind = HashMap::new();
        for decl in declarations {
            by_kind.insert(decl.kind, decl);
        }

        let mut children: HashMap<TokenKind, Vec<TokenKind>> = HashMap::new();
        let mut roots = Vec::new();
        for decl in by_kind.values() {
            match decl.parent {
                Some((parent, _)) => {
                    if !by_kind.contains_key(&parent) {
                        return Err(ConstructionError::new(
                            "lexer rule forest",
                            format!("token '{}' declares unknown parent kind", decl.name),
                        ));
                    }
                    children.entry(parent).or_default().push(decl.kind);
                }
                None => roots.push(decl.kind),
            }
        }
        roots.sort_by_key(|k| k.0);
        for siblings in children.values_mut() {
            siblings.sort_by_key(|k| k.0);
        }

        detect_cycles(&by_kind)?;

        let mut forest = Self {
            declarations: by_kind,
            roots,
            children,
            public_descendants: HashMap::new(),
        };
        forest.compute_public_descendants();
        Ok(forest)
    }

    pub fn roots(&self) -> &[TokenKind] {
        &self.roots
    }

    pub fn children_of(&self, kind: TokenKind) -> &[TokenKind] {
        self.children.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn declaration(&self, kind: TokenKind) -> Option<&TokenDecl> {
        self.declarations.get(&kind)
    }

    /// Transitive `from`-descendants reachable by an unbroken chain of
    /// `public` edges (§4.1 "Public children mapping").
    pub fn public_descendants(&self, kind: TokenKind) -> &HashSet<TokenKind> {
        static EMPTY: once_cell::sync::Lazy<HashSet<TokenKind>> = once_cell::sync::Lazy::new(HashSet::new);
        self.public_descendants.get(&kind).unwrap_or(&EMPTY)
    }

    fn compute_public_descendants(&mut self) {
        let kinds: Vec<TokenKind> = self.declarations.keys().copied().collect();
        for kind in kinds {
            let mut result = HashSet::new();
            let mut stack: Vec<TokenKind> = self.children_of(kind).to_vec();
            while let Some(child) = stack.pop() {
                let decl = &self.declarations[&child];
                if let Some((_, is_public)) = decl.parent {
                    if is_public {
                        result.insert(child);
                        stack.extend(self.children_of(child));
                    }
                }
            }
            self.public_descendants.insert(kind, result);
        }
    }
}

fn detect_cycles(declarations: &HashMap<TokenKind, TokenDecl>) -> Result<(), ConstructionError> {
    for start in declarations.keys() {
        let mut seen = HashSet::new();
        let mut cursor = *start;
        loop {
            if !seen.insert(cursor) {
                let name = &declarations[start].name;
                return Err(ConstructionError::new(
                    "lexer rule forest",
                    format!("cycle in 'from' relation starting at token '{}'", name),
                ));
            }
            match declarations[&cursor].parent {
                Some((parent, _)) => cursor = parent,
                None => break,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(n: u32) -> TokenKind {
        TokenKind(n)
    }

    #[test]
    fn public_descendants_follow_unbroken_public_chain() {
        let ident = TokenDecl::new(kind(0), "Identifier", TokenMatcher::from_regex("[a-z]+", true).ok());
        let if_kw = TokenDecl::new(kind(1), "If", TokenMatcher::from_self_named("if").ok()).with_parent(kind(0), true);
        let private_kw =
            TokenDecl::new(kind(2), "Internal", TokenMatcher::from_self_named("internal_").ok()).with_parent(kind(0), false);
        let forest = RuleForest::build(vec![ident, if_kw, private_kw]).unwrap();
        let descendants = forest.public_descendants(kind(0));
        assert!(descendants.contains(&kind(1)));
        assert!(!descendants.contains(&kind(2)));
    }

    #[test]
    fn cycle_is_rejected() {
        let a = TokenDecl::new(kind(0), "A", None).with_parent(kind(1), true);
        let b = TokenDecl::new(kind(1), "B", None).with_parent(kind(0), true);
        assert!(RuleForest::build(vec![a, b]).is_err());
    }
}
