//! Equality inference over equivalence classes of expressions.
//!
//! Equality conjuncts such as `a = b AND b = c + 1` are collected into
//! disjoint sets. Each set has a canonical member, and for any symbol scope
//! the engine can pick the best member whose symbols are all in that scope.
//! This is the basis of moving predicates across joins: given `a = b`,
//! a predicate `a > 1` on the left side implies `b > 1` on the right side.
use crate::expr::{CmpKind, Expr, Symbol};
use crate::fold::simplify;
use crate::util::{extract_conjuncts, is_deterministic};
use fnv::{FnvHashMap, FnvHashSet};
use indexmap::IndexSet;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Cost ordering to choose canonical expression:
/// fewer symbol references first, then smaller tree, then text order
/// to keep the choice stable.
#[inline]
fn canonical_cmp(e1: &Expr, e2: &Expr) -> Ordering {
    e1.collect_symbols()
        .len()
        .cmp(&e2.collect_symbols().len())
        .then_with(|| e1.sub_exprs().len().cmp(&e2.sub_exprs().len()))
        .then_with(|| e1.to_string().cmp(&e2.to_string()))
}

#[inline]
fn min_canonical<'a, I: IntoIterator<Item = &'a Expr>>(es: I) -> Option<&'a Expr> {
    es.into_iter().min_by(|a, b| canonical_cmp(a, b))
}

/// Returns true if the expression can contribute to equivalence classes.
#[inline]
pub fn is_inference_candidate(e: &Expr) -> bool {
    match e {
        Expr::Cmp(CmpKind::Equal, lhs, rhs) => {
            lhs != rhs && !(lhs.is_const() && rhs.is_const()) && is_deterministic(e)
        }
        _ => false,
    }
}

/// Conjuncts that do not participate in equality inference.
/// Equalities between two constants are folded eagerly.
#[inline]
pub fn non_inferrable_conjuncts(e: &Expr) -> Vec<Expr> {
    extract_conjuncts(e)
        .into_iter()
        .filter(|c| !is_inference_candidate(c))
        .map(|c| match &c {
            Expr::Cmp(CmpKind::Equal, lhs, rhs) if lhs.is_const() && rhs.is_const() => simplify(&c),
            _ => c,
        })
        .collect()
}

/// Equalities split by a symbol scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EqualityPartition {
    /// Both sides in scope.
    pub scope_equalities: Vec<Expr>,
    /// Both sides out of scope.
    pub scope_complement_equalities: Vec<Expr>,
    /// One side in scope and the other side out of scope.
    pub scope_straddling_equalities: Vec<Expr>,
}

#[derive(Debug, Clone, Default)]
pub struct EqualityInference {
    // each set is sorted by canonical order, first one is the canonical
    equality_sets: Vec<Vec<Expr>>,
    // expression to index of its set
    canonical_map: FnvHashMap<Expr, usize>,
    derived: FnvHashSet<Expr>,
}

impl EqualityInference {
    /// Build inference from conjuncts of all given expressions.
    #[inline]
    pub fn new<'a, I: IntoIterator<Item = &'a Expr>>(es: I) -> Self {
        let mut builder = EqualityInferenceBuilder::default();
        for e in es {
            builder.extract_inference_candidates(e);
        }
        builder.build()
    }

    /// Rewrite the expression using only symbols in scope.
    /// Returns None if any part of it has no in-scope equivalent.
    #[inline]
    pub fn rewrite_expr<F: Fn(&Symbol) -> bool>(&self, e: &Expr, scope: F) -> Option<Expr> {
        if !is_deterministic(e) {
            return None;
        }
        self.rewrite(e, &scope, true)
    }

    fn rewrite<F: Fn(&Symbol) -> bool>(&self, e: &Expr, scope: &F, allow_full: bool) -> Option<Expr> {
        let mut remap = HashMap::new();
        for sub in e.sub_exprs() {
            if !allow_full && sub == e {
                continue;
            }
            if let Some(canonical) = self.scoped_canonical(sub, scope) {
                remap.insert(sub.clone(), canonical.clone());
            }
        }
        let rewritten = e.replace_exprs(&remap);
        if rewritten.in_scope(scope) {
            Some(rewritten)
        } else {
            None
        }
    }

    #[inline]
    fn scoped_canonical<F: Fn(&Symbol) -> bool>(&self, e: &Expr, scope: &F) -> Option<&Expr> {
        let idx = self.canonical_map.get(e)?;
        // sets are sorted so first match is the best one
        self.equality_sets[*idx].iter().find(|m| m.in_scope(scope))
    }

    /// Generate minimal equalities partitioned by the scope.
    pub fn partition_by<F: Fn(&Symbol) -> bool>(&self, scope: F) -> EqualityPartition {
        let complement = |s: &Symbol| !scope(s);
        let mut scope_eqs = IndexSet::new();
        let mut complement_eqs = IndexSet::new();
        let mut straddling_eqs = IndexSet::new();
        for set in &self.equality_sets {
            let mut scope_exprs: IndexSet<Expr> = IndexSet::new();
            let mut complement_exprs: IndexSet<Expr> = IndexSet::new();
            let mut straddling_exprs: IndexSet<Expr> = IndexSet::new();
            for e in set.iter().filter(|e| !self.derived.contains(*e)) {
                let scope_rewritten = self.rewrite(e, &scope, false);
                let complement_rewritten = self.rewrite(e, &complement, false);
                if scope_rewritten.is_none() && complement_rewritten.is_none() {
                    straddling_exprs.insert(e.clone());
                }
                if let Some(r) = scope_rewritten {
                    scope_exprs.insert(r);
                }
                if let Some(r) = complement_rewritten {
                    complement_exprs.insert(r);
                }
            }
            let scope_canonical = min_canonical(&scope_exprs).cloned();
            if let Some(c) = &scope_canonical {
                for e in scope_exprs.iter().filter(|e| *e != c) {
                    scope_eqs.insert(Expr::eq(c.clone(), e.clone()));
                }
            }
            let complement_canonical = min_canonical(&complement_exprs).cloned();
            if let Some(c) = &complement_canonical {
                for e in complement_exprs.iter().filter(|e| *e != c) {
                    complement_eqs.insert(Expr::eq(c.clone(), e.clone()));
                }
            }
            // connect both sides through their canonicals and the straddling members
            let mut connecting: IndexSet<Expr> = IndexSet::new();
            connecting.extend(scope_canonical);
            connecting.extend(complement_canonical);
            connecting.extend(straddling_exprs);
            if let Some(c) = min_canonical(&connecting) {
                for e in connecting.iter().filter(|e| *e != c) {
                    straddling_eqs.insert(Expr::eq(c.clone(), e.clone()));
                }
            }
        }
        EqualityPartition {
            scope_equalities: scope_eqs.into_iter().collect(),
            scope_complement_equalities: complement_eqs.into_iter().collect(),
            scope_straddling_equalities: straddling_eqs.into_iter().collect(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.equality_sets.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct EqualityInferenceBuilder {
    // union-find parents
    parents: FnvHashMap<Expr, Expr>,
    derived: FnvHashSet<Expr>,
}

impl EqualityInferenceBuilder {
    #[inline]
    pub fn extract_inference_candidates(&mut self, e: &Expr) -> &mut Self {
        for c in extract_conjuncts(e) {
            if is_inference_candidate(&c) {
                if let Expr::Cmp(_, lhs, rhs) = c {
                    self.add_equality(*lhs, *rhs);
                }
            }
        }
        self
    }

    #[inline]
    pub fn add_equality(&mut self, e1: Expr, e2: Expr) -> &mut Self {
        if e1 != e2 && is_deterministic(&e1) && is_deterministic(&e2) {
            self.union(e1, e2);
        }
        self
    }

    fn find(&mut self, e: &Expr) -> Expr {
        let mut root = e.clone();
        loop {
            match self.parents.get(&root) {
                Some(p) if p != &root => root = p.clone(),
                Some(_) => break,
                None => {
                    self.parents.insert(root.clone(), root.clone());
                    break;
                }
            }
        }
        // path compression
        let mut cur = e.clone();
        while cur != root {
            let next = self.parents.insert(cur.clone(), root.clone());
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
        root
    }

    fn union(&mut self, e1: Expr, e2: Expr) {
        let r1 = self.find(&e1);
        let r2 = self.find(&e2);
        if r1 != r2 {
            self.parents.insert(r1, r2);
        }
    }

    fn classes(&mut self) -> Vec<Vec<Expr>> {
        let mut keys: Vec<Expr> = self.parents.keys().cloned().collect();
        keys.sort_by_cached_key(|e| e.to_string());
        let mut groups: FnvHashMap<Expr, usize> = FnvHashMap::default();
        let mut classes: Vec<Vec<Expr>> = vec![];
        for k in keys {
            let root = self.find(&k);
            let idx = *groups.entry(root).or_insert_with(|| {
                classes.push(vec![]);
                classes.len() - 1
            });
            classes[idx].push(k);
        }
        classes
    }

    /// Derive new equalities by substituting equivalent sub-expressions,
    /// e.g. `a = b AND c = a + 1` derives `c = b + 1`.
    fn generate_more_equivalences(&mut self) {
        let classes = self.classes();
        let mut class_of: FnvHashMap<&Expr, &Vec<Expr>> = FnvHashMap::default();
        for class in &classes {
            for e in class {
                class_of.insert(e, class);
            }
        }
        let mut new_pairs = vec![];
        for class in &classes {
            for e in class.iter().filter(|e| !self.derived.contains(*e)) {
                for sub in e.sub_exprs().into_iter().filter(|s| *s != e) {
                    if let Some(equivalents) = class_of.get(sub) {
                        for eq in equivalents.iter().filter(|eq| *eq != sub) {
                            let mut mapping = HashMap::new();
                            mapping.insert(sub.clone(), eq.clone());
                            let rewritten = e.replace_exprs(&mapping);
                            new_pairs.push((e.clone(), rewritten));
                        }
                    }
                }
            }
        }
        for (e, rewritten) in new_pairs {
            if e != rewritten {
                self.derived.insert(rewritten.clone());
                self.union(e, rewritten);
            }
        }
    }

    pub fn build(&mut self) -> EqualityInference {
        self.generate_more_equivalences();
        let mut equality_sets = self.classes();
        let mut canonical_map = FnvHashMap::default();
        for (idx, set) in equality_sets.iter_mut().enumerate() {
            set.sort_by(canonical_cmp);
            for e in set.iter() {
                canonical_map.insert(e.clone(), idx);
            }
        }
        EqualityInference {
            equality_sets,
            canonical_map,
            derived: std::mem::take(&mut self.derived),
        }
    }
}
