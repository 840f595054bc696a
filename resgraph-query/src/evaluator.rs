//! Query evaluation against a [`ResourceGraph`].
//!
//! An [`Evaluator`] answers two questions: does one instance match a query
//! (`matches`), and which instances of the whole store match it (`filter`).
//! Sub-query targets are materialized once per call in a pre-pass and looked
//! up as sets afterwards; the cache lives exactly as long as one call.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use resgraph_api::{Instance, InstanceKey, ResourceGraph, split_list};

use crate::ast::{
    CompareOp, Direction, Expression, Literal, Query, RelationExpression, Target, Traversal,
    VerbFilter,
};

pub struct Evaluator<'g, S: ResourceGraph> {
    graph: &'g S,
    subquery_sets: HashMap<usize, HashSet<InstanceKey>>,
}

impl<'g, S: ResourceGraph> Evaluator<'g, S> {
    pub fn new(graph: &'g S) -> Self {
        Self {
            graph,
            subquery_sets: HashMap::new(),
        }
    }

    /// Tests one instance against the query.
    pub fn matches(&mut self, query: &Query, instance: &Instance) -> bool {
        self.prepare(query);
        self.matches_prepared(query, instance)
    }

    /// Collects all matching instances, in store iteration order.
    pub fn filter(&mut self, query: &Query) -> Vec<&'g Instance> {
        self.prepare(query);
        self.filter_prepared(query)
    }

    /// Materializes every sub-query result set reachable from the query,
    /// innermost-first, exactly once. Without this pre-pass a sub-query
    /// nested inside a relation condition would be re-evaluated per
    /// candidate instance.
    fn prepare(&mut self, query: &Query) {
        // Cache lifetime is one top-level call.
        self.subquery_sets.clear();
        if let Some(expression) = &query.expression {
            self.collect_subqueries(expression);
        }
    }

    fn collect_subqueries(&mut self, expression: &Expression) {
        match expression {
            Expression::And(left, right) | Expression::Or(left, right) => {
                self.collect_subqueries(left);
                self.collect_subqueries(right);
            }
            Expression::Not(operand) => self.collect_subqueries(operand),
            Expression::Relation(relation) => {
                if let Target::Subquery(sub) = &relation.target {
                    if let Some(inner) = &sub.query.expression {
                        self.collect_subqueries(inner);
                    }
                    let set = self
                        .filter_prepared(&sub.query)
                        .into_iter()
                        .map(Instance::key)
                        .collect();
                    self.subquery_sets.insert(sub.id, set);
                }
            }
            _ => {}
        }
    }

    fn matches_prepared(&self, query: &Query, instance: &Instance) -> bool {
        if let Some(kind) = &query.kind {
            if instance.kind() != kind {
                return false;
            }
        }
        match &query.expression {
            Some(expression) => self.eval(expression, instance),
            None => true,
        }
    }

    fn filter_prepared(&self, query: &Query) -> Vec<&'g Instance> {
        let candidates: Box<dyn Iterator<Item = &'g Instance> + '_> = match &query.kind {
            Some(kind) => Box::new(self.graph.instances_of(kind).iter()),
            None => self.graph.instances(),
        };
        candidates
            .filter(|instance| match &query.expression {
                Some(expression) => self.eval(expression, instance),
                None => true,
            })
            .collect()
    }

    fn eval(&self, expression: &Expression, instance: &Instance) -> bool {
        match expression {
            Expression::And(left, right) => {
                self.eval(left, instance) && self.eval(right, instance)
            }
            Expression::Or(left, right) => {
                self.eval(left, instance) || self.eval(right, instance)
            }
            Expression::Not(operand) => !self.eval(operand, instance),

            Expression::AttributeCompare { path, op, value } => {
                self.eval_attribute_compare(instance, path, *op, value)
            }
            Expression::AttributeExists { path } => instance
                .attribute(path)
                .is_some_and(|value| !value.trim().is_empty()),
            Expression::AttributeIn { path, values } => values
                .iter()
                .any(|value| self.eval_attribute_compare(instance, path, CompareOp::Eq, value)),

            Expression::KindCompare { op, value } => compare_text(instance.kind(), *op, value),
            Expression::KindIn { values } => values
                .iter()
                .any(|value| compare_text(instance.kind(), CompareOp::Eq, value)),
            Expression::NameCompare { op, value } => compare_text(instance.name(), *op, value),
            Expression::NameIn { values } => values
                .iter()
                .any(|value| compare_text(instance.name(), CompareOp::Eq, value)),

            Expression::Relation(relation) => self.eval_relation(relation, instance),
        }
    }

    fn eval_attribute_compare(
        &self,
        instance: &Instance,
        path: &str,
        op: CompareOp,
        value: &Literal,
    ) -> bool {
        let Some(raw) = instance.attribute(path) else {
            // A missing attribute is unequal to everything.
            return op == CompareOp::Ne;
        };
        let is_list = self.graph.is_list_attribute(instance.kind(), path);

        match op {
            CompareOp::Eq => attribute_eq(raw, is_list, value),
            CompareOp::Ne => !attribute_eq(raw, is_list, value),
            CompareOp::Match => match build_regex(value) {
                Some(re) if is_list => split_list(raw).iter().any(|element| re.is_match(element)),
                Some(re) => re.is_match(raw),
                None => false,
            },
            CompareOp::Gt => coerce_number(raw) > literal_number(value),
            CompareOp::Lt => coerce_number(raw) < literal_number(value),
            CompareOp::Ge => coerce_number(raw) >= literal_number(value),
            CompareOp::Le => coerce_number(raw) <= literal_number(value),
        }
    }

    fn eval_relation(&self, relation: &RelationExpression, instance: &Instance) -> bool {
        let verbs = &relation.verbs;

        // `none` asks for the absence of direct edges; by design the
        // transitive operators share this exact meaning.
        if relation.target == Target::NoRelations {
            return match relation.direction {
                Direction::Outgoing => !self.has_outgoing(instance, verbs),
                Direction::Incoming => !self.has_incoming(&instance.key(), verbs),
            };
        }

        match (relation.direction, relation.traversal) {
            (Direction::Outgoing, Traversal::Direct) => {
                self.outgoing_direct(instance, &relation.target, verbs)
            }
            (Direction::Outgoing, Traversal::Transitive { max_depth }) => {
                let mut visited = HashSet::new();
                visited.insert(instance.key());
                self.outgoing_reaches(instance, &relation.target, verbs, 0, max_depth, &mut visited)
            }
            (Direction::Incoming, Traversal::Direct) => {
                let key = instance.key();
                self.graph.instances().any(|source| {
                    self.target_matches(source, &relation.target)
                        && points_at(source, &key, verbs)
                })
            }
            (Direction::Incoming, Traversal::Transitive { max_depth }) => {
                let key = instance.key();
                self.graph.instances().any(|source| {
                    if !self.target_matches(source, &relation.target) {
                        return false;
                    }
                    let mut visited = HashSet::new();
                    visited.insert(source.key());
                    self.reaches_instance(source, &key, verbs, 0, max_depth, &mut visited)
                })
            }
        }
    }

    fn has_outgoing(&self, instance: &Instance, verbs: &Option<VerbFilter>) -> bool {
        instance
            .relations()
            .iter()
            .any(|(verb, targets)| allows(verbs, verb) && !targets.is_empty())
    }

    /// No reverse index exists, so incoming questions scan the whole store.
    fn has_incoming(&self, key: &InstanceKey, verbs: &Option<VerbFilter>) -> bool {
        self.graph
            .instances()
            .any(|source| points_at(source, key, verbs))
    }

    fn outgoing_direct(
        &self,
        instance: &Instance,
        target: &Target,
        verbs: &Option<VerbFilter>,
    ) -> bool {
        instance
            .relations()
            .iter()
            .filter(|(verb, _)| allows(verbs, verb))
            .flat_map(|(_, targets)| targets)
            .any(|key| {
                self.graph
                    .get(key)
                    .is_some_and(|next| self.target_matches(next, target))
            })
    }

    /// Depth-first search for a target, bounded by `max_depth` hops. The
    /// visited set is scoped to the current path: inserted before descending,
    /// removed when backtracking.
    fn outgoing_reaches(
        &self,
        from: &Instance,
        target: &Target,
        verbs: &Option<VerbFilter>,
        depth: usize,
        max_depth: usize,
        visited: &mut HashSet<InstanceKey>,
    ) -> bool {
        if depth >= max_depth {
            return false;
        }
        for (verb, targets) in from.relations() {
            if !allows(verbs, verb) {
                continue;
            }
            for key in targets {
                let Some(next) = self.graph.get(key) else {
                    continue;
                };
                if self.target_matches(next, target) {
                    return true;
                }
                if !visited.contains(key) {
                    visited.insert(key.clone());
                    let found = self.outgoing_reaches(
                        next, target, verbs, depth + 1, max_depth, visited,
                    );
                    visited.remove(key);
                    if found {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Like [`Self::outgoing_reaches`] but looks for one specific instance;
    /// used to answer incoming-transitive questions from the far end.
    fn reaches_instance(
        &self,
        from: &Instance,
        goal: &InstanceKey,
        verbs: &Option<VerbFilter>,
        depth: usize,
        max_depth: usize,
        visited: &mut HashSet<InstanceKey>,
    ) -> bool {
        if depth >= max_depth {
            return false;
        }
        for (verb, targets) in from.relations() {
            if !allows(verbs, verb) {
                continue;
            }
            for key in targets {
                if key == goal {
                    return true;
                }
                if !visited.contains(key) {
                    if let Some(next) = self.graph.get(key) {
                        visited.insert(key.clone());
                        let found = self.reaches_instance(
                            next, goal, verbs, depth + 1, max_depth, visited,
                        );
                        visited.remove(key);
                        if found {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    fn target_matches(&self, candidate: &Instance, target: &Target) -> bool {
        match target {
            Target::Kind(kind) => candidate.kind() == kind,
            Target::Instance(name) => candidate.name() == name,
            Target::Subquery(sub) => self
                .subquery_sets
                .get(&sub.id)
                .is_some_and(|set| set.contains(&candidate.key())),
            // Handled by the zero-edge path before candidates are examined.
            Target::NoRelations => false,
        }
    }
}

fn allows(verbs: &Option<VerbFilter>, verb: &str) -> bool {
    verbs.as_ref().is_none_or(|filter| filter.allows(verb))
}

fn points_at(source: &Instance, key: &InstanceKey, verbs: &Option<VerbFilter>) -> bool {
    source
        .relations()
        .iter()
        .any(|(verb, targets)| allows(verbs, verb) && targets.contains(key))
}

/// Equality/regex semantics shared by `kind` and `name` conditions.
fn compare_text(text: &str, op: CompareOp, value: &Literal) -> bool {
    match op {
        CompareOp::Eq => text == literal_text(value),
        CompareOp::Ne => text != literal_text(value),
        CompareOp::Match => build_regex(value).is_some_and(|re| re.is_match(text)),
        CompareOp::Gt => coerce_number(text) > literal_number(value),
        CompareOp::Lt => coerce_number(text) < literal_number(value),
        CompareOp::Ge => coerce_number(text) >= literal_number(value),
        CompareOp::Le => coerce_number(text) <= literal_number(value),
    }
}

fn attribute_eq(raw: &str, is_list: bool, value: &Literal) -> bool {
    match value {
        // Numeric literals compare as floats against the whole value.
        Literal::Number(number) => coerce_number(raw) == *number,
        _ if is_list => {
            let wanted = literal_text(value);
            split_list(raw).iter().any(|element| *element == wanted)
        }
        _ => raw == literal_text(value),
    }
}

/// Builds the matcher for `=~`. Plain strings become case-insensitive
/// patterns; regex literals honor their own `i` flag. An invalid pattern
/// degrades to "no match" instead of failing the query.
fn build_regex(value: &Literal) -> Option<Regex> {
    let pattern = match value {
        Literal::Regex {
            pattern,
            case_insensitive,
        } => {
            if *case_insensitive {
                format!("(?i){pattern}")
            } else {
                pattern.clone()
            }
        }
        Literal::String(text) => format!("(?i){text}"),
        Literal::Number(number) => format!("(?i){}", format_number(*number)),
    };
    Regex::new(&pattern).ok()
}

fn literal_text(value: &Literal) -> String {
    match value {
        Literal::String(text) => text.clone(),
        Literal::Number(number) => format_number(*number),
        Literal::Regex { pattern, .. } => pattern.clone(),
    }
}

fn literal_number(value: &Literal) -> f64 {
    match value {
        Literal::Number(number) => *number,
        Literal::String(text) => coerce_number(text),
        Literal::Regex { pattern, .. } => coerce_number(pattern),
    }
}

/// Lenient numeric coercion: the longest leading `[+-]?digits[.digits]`
/// prefix parses, anything else is `0.0`. Comparing a non-numeric attribute
/// with `>` therefore fails to match instead of aborting the filter pass,
/// and `"" > -1` is true.
fn coerce_number(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut seen_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        seen_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        let mut fraction = end + 1;
        while fraction < bytes.len() && bytes[fraction].is_ascii_digit() {
            fraction += 1;
        }
        if fraction > end + 1 {
            end = fraction;
            seen_digit = true;
        }
    }
    if !seen_digit {
        return 0.0;
    }
    trimmed[..end].parse().unwrap_or(0.0)
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        format!("{}", number as i64)
    } else {
        number.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_number_takes_the_leading_numeric_prefix() {
        assert_eq!(coerce_number("12abc"), 12.0);
        assert_eq!(coerce_number("-3.5x"), -3.5);
        assert_eq!(coerce_number(" .5"), 0.5);
        assert_eq!(coerce_number(""), 0.0);
        assert_eq!(coerce_number("abc"), 0.0);
        assert_eq!(coerce_number("-"), 0.0);
    }

    #[test]
    fn plain_string_patterns_match_case_insensitively() {
        let re = build_regex(&Literal::String("Act".into())).unwrap();
        assert!(re.is_match("active"));
        assert!(re.is_match("REACTOR"));
    }

    #[test]
    fn invalid_string_pattern_degrades_to_no_match() {
        assert!(build_regex(&Literal::String("(".into())).is_none());
    }
}
