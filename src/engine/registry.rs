//! Process-wide class rule registry.
//!
//! Parser "subclasses" are named classes registered at program start: each
//! class owns an ordered list of fully-qualified rule names
//! (`ClassName/rule_name`) and a parallel list of compiled rules. A class
//! inherits its parents' rules the first time it registers anything of its
//! own: the parents' orders are concatenated (in declaration order) as the
//! seed, then the class's own declarations append -- or insert at an
//! `before`/`after` anchor, which must point at an *inherited* rule.
//!
//! The registry is populated at definition time and treated as effectively
//! immutable during a read: the engine takes a snapshot of the compiled
//! rule list when `read` starts.
//!
//! Mutations always rebuild the parallel lists together, so `order[i]`
//! names `rules[i]` at every point in time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};

use super::options::{LineWrapStyle, MultilineType};
use super::rule::{Rule, RuleSpec};
use super::unwrap::{WrapCheck, WrapJoin};

/// Selector for [`ParserClass::disables_superclass_rules`].
pub enum RuleMatcher {
    /// Exact fully-qualified name (`Class/rule`).
    Name(String),
    /// Any inherited rule whose qualified name matches.
    Pattern(Regex),
    /// Any inherited rule whose qualified name satisfies the predicate.
    Predicate(fn(&str) -> bool),
}

struct ClassEntry {
    parents: Vec<String>,
    seeded: bool,
    order: Vec<String>,
    rules: Vec<Rule>,
    auto_split: bool,
    wrap_style: Option<LineWrapStyle>,
    multiline_type: Option<MultilineType>,
    custom_unwrap: Option<(WrapCheck, WrapJoin)>,
}

/// What the engine needs from a class at read time.
pub(crate) struct ClassSnapshot {
    pub rules: Vec<Rule>,
    pub auto_split: bool,
    pub wrap_style: Option<LineWrapStyle>,
    pub multiline_type: Option<MultilineType>,
    pub custom_unwrap: Option<(WrapCheck, WrapJoin)>,
}

static REGISTRY: Lazy<RwLock<HashMap<String, ClassEntry>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Rule names a class cannot take.
const RESERVED_NAMES: &[&str] = &["BEGIN", "END"];

/// Handle to one registered parser class.
#[derive(Debug, Clone)]
pub struct ParserClass {
    name: String,
}

impl ParserClass {
    /// Register a new class. `parents` must already be defined; their rules
    /// are inherited in the order given here. The top-level namespace
    /// (`"main"`, or an empty name) cannot hold rules.
    pub fn define(name: &str, parents: &[&ParserClass]) -> Result<Self> {
        if name.is_empty() || name == "main" {
            return Err(Error::MainNamespace);
        }
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        if map.contains_key(name) {
            return Err(Error::DuplicateClass { name: name.to_string() });
        }
        for parent in parents {
            if !map.contains_key(&parent.name) {
                return Err(Error::NoSuchClass { name: parent.name.clone() });
            }
        }
        map.insert(
            name.to_string(),
            ClassEntry {
                parents: parents.iter().map(|p| p.name.clone()).collect(),
                seeded: false,
                order: Vec::new(),
                rules: Vec::new(),
                auto_split: false,
                wrap_style: None,
                multiline_type: None,
                custom_unwrap: None,
            },
        );
        Ok(ParserClass { name: name.to_string() })
    }

    /// Class name; the prefix of every rule this class registers.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a rule under this class.
    pub fn applies_rule(&self, name: &str, spec: RuleSpec) -> Result<()> {
        validate_rule_name(name)?;
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        ensure_seeded(&mut map, &self.name)?;

        let qualified = format!("{}/{name}", self.name);
        let entry = map.get_mut(&self.name).ok_or_else(|| Error::NoSuchClass { name: self.name.clone() })?;
        if entry.order.contains(&qualified) {
            return Err(Error::DuplicateRule { name: qualified });
        }

        let position = resolve_anchor(entry, &self.name, &spec)?;
        let mut rule = Rule::from_spec(&spec)?;
        rule.set_name(&qualified);
        insert_rule(entry, position, qualified, rule);
        entry.auto_split = true;
        Ok(())
    }

    /// Register a rule cloned from an existing one (usually inherited),
    /// with any of the spec's options overriding the original. The source
    /// rule is left untouched wherever it lives.
    pub fn applies_cloned_rule(&self, source: &str, spec: RuleSpec) -> Result<()> {
        let name = spec.name.as_deref().ok_or(Error::MissingRuleName)?;
        validate_rule_name(name)?;
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        ensure_seeded(&mut map, &self.name)?;

        let original = find_rule(&map, &self.name, source)?;
        let qualified = format!("{}/{name}", self.name);

        // Merge: the clone's spec wins wherever it says something.
        let mut merged = original.to_spec();
        merged.name = Some(qualified.clone());
        if spec.condition.is_some() {
            merged.condition = spec.condition.clone();
        }
        if let Some(action) = &spec.action {
            merged.action = Some(action.clone());
        }
        if let Some(prefix) = &spec.prepend_to_do {
            let current = merged.action.unwrap_or_default();
            merged.action = Some(format!("{prefix};{current}"));
        }
        if let Some(suffix) = &spec.append_to_do {
            let current = merged.action.unwrap_or_default();
            merged.action = Some(format!("{current};{suffix}"));
        }
        if spec.dont_record.is_some() {
            merged.dont_record = spec.dont_record;
        }
        if spec.continue_to_next.is_some() {
            merged.continue_to_next = spec.continue_to_next;
        }

        let mut rule = Rule::from_spec(&merged)?;
        rule.set_name(&qualified);
        for pre in original.precondition_sources() {
            rule.add_precondition(&pre)?;
        }
        if let Some(pre) = &spec.add_precondition {
            rule.add_precondition(pre)?;
        }

        let entry = map.get_mut(&self.name).ok_or_else(|| Error::NoSuchClass { name: self.name.clone() })?;
        if entry.order.contains(&qualified) {
            return Err(Error::DuplicateRule { name: qualified });
        }
        let position = resolve_anchor(entry, &self.name, &spec)?;
        insert_rule(entry, position, qualified, rule);
        entry.auto_split = true;
        Ok(())
    }

    /// Remove inherited rules from this class's chain. Exact names must
    /// exist and must not belong to this class; pattern and predicate
    /// matchers never touch this class's own rules.
    pub fn disables_superclass_rules(&self, matchers: &[RuleMatcher]) -> Result<()> {
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        ensure_seeded(&mut map, &self.name)?;
        let entry = map.get_mut(&self.name).ok_or_else(|| Error::NoSuchClass { name: self.name.clone() })?;

        let own_prefix = format!("{}/", self.name);
        let mut doomed: Vec<String> = Vec::new();
        for matcher in matchers {
            match matcher {
                RuleMatcher::Name(name) => {
                    if name.starts_with(&own_prefix) {
                        return Err(Error::DisableOwnRule { name: name.clone() });
                    }
                    if !entry.order.contains(name) {
                        return Err(Error::NoSuchRule { name: name.clone() });
                    }
                    doomed.push(name.clone());
                }
                RuleMatcher::Pattern(pattern) => {
                    doomed.extend(entry.order.iter().filter(|n| !n.starts_with(&own_prefix) && pattern.is_match(n)).cloned());
                }
                RuleMatcher::Predicate(pred) => {
                    doomed.extend(entry.order.iter().filter(|n| !n.starts_with(&own_prefix) && pred(n)).cloned());
                }
            }
        }

        let mut i = 0;
        while i < entry.order.len() {
            if doomed.contains(&entry.order[i]) {
                entry.order.remove(i);
                entry.rules.remove(i);
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    /// Make `custom` the default wrap style for parsers of this class and
    /// install the unwrap routine pair.
    pub fn unwraps_lines_using(
        &self,
        is_wrapped: impl Fn(&str) -> bool + Send + Sync + 'static,
        unwrap_routine: impl Fn(&str, &str) -> String + Send + Sync + 'static,
    ) -> Result<()> {
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        let entry = map.get_mut(&self.name).ok_or_else(|| Error::NoSuchClass { name: self.name.clone() })?;
        entry.wrap_style = Some(LineWrapStyle::Custom);
        entry.multiline_type = Some(MultilineType::JoinNext);
        entry.custom_unwrap = Some((Arc::new(is_wrapped), Arc::new(unwrap_routine)));
        Ok(())
    }

    /// The class's current rule order (inherited rules included), mostly
    /// useful in tests and diagnostics.
    pub fn rule_order(&self) -> Result<Vec<String>> {
        let mut map = REGISTRY.write().expect("rule registry poisoned");
        ensure_seeded(&mut map, &self.name)?;
        let entry = map.get(&self.name).ok_or_else(|| Error::NoSuchClass { name: self.name.clone() })?;
        Ok(entry.order.clone())
    }
}

/// Read-time snapshot for the engine.
pub(crate) fn class_snapshot(name: &str) -> Result<ClassSnapshot> {
    let mut map = REGISTRY.write().expect("rule registry poisoned");
    ensure_seeded(&mut map, name)?;
    let entry = map.get(name).ok_or_else(|| Error::NoSuchClass { name: name.to_string() })?;
    Ok(ClassSnapshot {
        rules: entry.rules.clone(),
        auto_split: entry.auto_split,
        wrap_style: entry.wrap_style,
        multiline_type: entry.multiline_type,
        custom_unwrap: entry.custom_unwrap.as_ref().map(|(w, j)| (Arc::clone(w), Arc::clone(j))),
    })
}

fn validate_rule_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MissingRuleName);
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(Error::ReservedRuleName { name: name.to_string() });
    }
    Ok(())
}

/// Seed a class's order from its parents, depth-first, once.
fn ensure_seeded(map: &mut HashMap<String, ClassEntry>, name: &str) -> Result<()> {
    let entry = map.get(name).ok_or_else(|| Error::NoSuchClass { name: name.to_string() })?;
    if entry.seeded {
        return Ok(());
    }
    let parents = entry.parents.clone();
    for parent in &parents {
        ensure_seeded(map, parent)?;
    }

    let mut order = Vec::new();
    let mut rules = Vec::new();
    let mut inherited_auto_split = false;
    for parent in &parents {
        let parent_entry = map.get(parent).ok_or_else(|| Error::NoSuchClass { name: parent.clone() })?;
        order.extend(parent_entry.order.iter().cloned());
        rules.extend(parent_entry.rules.iter().cloned());
        inherited_auto_split |= parent_entry.auto_split;
    }

    let entry = map.get_mut(name).expect("entry existed above");
    // A class defined before its own first rule keeps anything it already
    // registered after the inherited block.
    order.extend(entry.order.drain(..));
    rules.extend(entry.rules.drain(..));
    entry.order = order;
    entry.rules = rules;
    entry.auto_split |= inherited_auto_split;
    entry.seeded = true;
    Ok(())
}

/// Where a new rule lands in the order: at an anchor, or at the end.
fn resolve_anchor(entry: &ClassEntry, class: &str, spec: &RuleSpec) -> Result<Option<usize>> {
    if spec.before.is_some() && spec.after.is_some() {
        return Err(Error::AmbiguousAnchor);
    }
    let (anchor, offset) = match (&spec.before, &spec.after) {
        (Some(anchor), None) => (anchor, 0),
        (None, Some(anchor)) => (anchor, 1),
        (None, None) => return Ok(None),
        (Some(_), Some(_)) => unreachable!("checked above"),
    };
    if anchor.starts_with(&format!("{class}/")) {
        return Err(Error::BadAnchor { anchor: anchor.clone() });
    }
    match entry.order.iter().position(|n| n == anchor) {
        Some(idx) => Ok(Some(idx + offset)),
        None => Err(Error::BadAnchor { anchor: anchor.clone() }),
    }
}

fn insert_rule(entry: &mut ClassEntry, position: Option<usize>, qualified: String, rule: Rule) {
    match position {
        Some(idx) => {
            entry.order.insert(idx, qualified);
            entry.rules.insert(idx, rule);
        }
        None => {
            entry.order.push(qualified);
            entry.rules.push(rule);
        }
    }
}

/// Find a rule by qualified name: first in `class`'s own chain, then in the
/// owning class named by the prefix.
fn find_rule(map: &HashMap<String, ClassEntry>, class: &str, qualified: &str) -> Result<Rule> {
    if let Some(entry) = map.get(class) {
        if let Some(idx) = entry.order.iter().position(|n| n == qualified) {
            return Ok(entry.rules[idx].clone());
        }
    }
    if let Some((owner, _)) = qualified.split_once('/') {
        if let Some(entry) = map.get(owner) {
            if let Some(idx) = entry.order.iter().position(|n| n == qualified) {
                return Ok(entry.rules[idx].clone());
            }
        }
    }
    Err(Error::NoSuchRule { name: qualified.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule;

    #[test]
    fn top_level_namespace_is_rejected() {
        assert!(matches!(ParserClass::define("main", &[]), Err(Error::MainNamespace)));
        assert!(matches!(ParserClass::define("", &[]), Err(Error::MainNamespace)));
    }

    #[test]
    fn inheritance_seeds_parent_order() {
        let base = ParserClass::define("SeedBase", &[]).unwrap();
        base.applies_rule("first", rule!(if: "$1 eq \"a\"")).unwrap();
        base.applies_rule("second", rule!(if: "$1 eq \"b\"")).unwrap();

        let child = ParserClass::define("SeedChild", &[&base]).unwrap();
        child.applies_rule("third", rule!(if: "$1 eq \"c\"")).unwrap();

        assert_eq!(child.rule_order().unwrap(), vec!["SeedBase/first", "SeedBase/second", "SeedChild/third"]);
        // The parent is untouched.
        assert_eq!(base.rule_order().unwrap(), vec!["SeedBase/first", "SeedBase/second"]);
    }

    #[test]
    fn anchored_insertion() {
        let base = ParserClass::define("AnchorBase", &[]).unwrap();
        base.applies_rule("one", rule!(if: "1")).unwrap();
        base.applies_rule("two", rule!(if: "1")).unwrap();

        let child = ParserClass::define("AnchorChild", &[&base]).unwrap();
        child.applies_rule("between", rule!(if: "1", before: "AnchorBase/two")).unwrap();
        child.applies_rule("alpha", rule!(if: "1", after: "AnchorBase/one")).unwrap();

        assert_eq!(
            child.rule_order().unwrap(),
            vec!["AnchorBase/one", "AnchorChild/alpha", "AnchorChild/between", "AnchorBase/two"]
        );
    }

    #[test]
    fn anchor_must_be_inherited() {
        let base = ParserClass::define("AnchorStrictBase", &[]).unwrap();
        base.applies_rule("one", rule!(if: "1")).unwrap();
        let child = ParserClass::define("AnchorStrictChild", &[&base]).unwrap();
        child.applies_rule("own", rule!(if: "1")).unwrap();

        // Anchoring on the child's own rule is rejected.
        let err = child.applies_rule("bad", rule!(if: "1", before: "AnchorStrictChild/own")).unwrap_err();
        assert!(matches!(err, Error::BadAnchor { .. }));

        // Both anchors at once are rejected.
        let err = child
            .applies_rule("worse", rule!(if: "1", before: "AnchorStrictBase/one", after: "AnchorStrictBase/one"))
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousAnchor));

        // A nonexistent anchor is rejected.
        let err = child.applies_rule("lost", rule!(if: "1", before: "AnchorStrictBase/ghost")).unwrap_err();
        assert!(matches!(err, Error::BadAnchor { .. }));
    }

    #[test]
    fn duplicate_and_reserved_names() {
        let class = ParserClass::define("DupClass", &[]).unwrap();
        class.applies_rule("r", rule!(if: "1")).unwrap();
        assert!(matches!(class.applies_rule("r", rule!(if: "1")), Err(Error::DuplicateRule { .. })));
        assert!(matches!(class.applies_rule("", rule!(if: "1")), Err(Error::MissingRuleName)));
        assert!(matches!(class.applies_rule("BEGIN", rule!(if: "1")), Err(Error::ReservedRuleName { .. })));
    }

    #[test]
    fn disabling_inherited_rules() {
        let base = ParserClass::define("DisableBase", &[]).unwrap();
        base.applies_rule("keep", rule!(if: "1")).unwrap();
        base.applies_rule("drop_exact", rule!(if: "1")).unwrap();
        base.applies_rule("drop_pattern", rule!(if: "1")).unwrap();

        let child = ParserClass::define("DisableChild", &[&base]).unwrap();
        child.applies_rule("mine", rule!(if: "1")).unwrap();

        child
            .disables_superclass_rules(&[
                RuleMatcher::Name("DisableBase/drop_exact".into()),
                RuleMatcher::Pattern(Regex::new("_pattern$").unwrap()),
            ])
            .unwrap();
        assert_eq!(child.rule_order().unwrap(), vec!["DisableBase/keep", "DisableChild/mine"]);

        // Own rules cannot be disabled by exact name, and patterns skip them.
        let err = child.disables_superclass_rules(&[RuleMatcher::Name("DisableChild/mine".into())]).unwrap_err();
        assert!(matches!(err, Error::DisableOwnRule { .. }));
        child.disables_superclass_rules(&[RuleMatcher::Pattern(Regex::new("mine").unwrap())]).unwrap();
        assert_eq!(child.rule_order().unwrap(), vec!["DisableBase/keep", "DisableChild/mine"]);

        // Predicate matchers work too.
        child.disables_superclass_rules(&[RuleMatcher::Predicate(|n| n.ends_with("keep"))]).unwrap();
        assert_eq!(child.rule_order().unwrap(), vec!["DisableChild/mine"]);
    }

    #[test]
    fn cloning_preserves_the_original() {
        let base = ParserClass::define("CloneBase", &[]).unwrap();
        base.applies_rule("orig", rule!(if: "$1 eq \"x\"", do: "return $2")).unwrap();

        let child = ParserClass::define("CloneChild", &[&base]).unwrap();
        child
            .applies_cloned_rule(
                "CloneBase/orig",
                rule!(name: "tweaked", add_precondition: "NF() > 2", append_to_do: "return $3"),
            )
            .unwrap();

        assert_eq!(child.rule_order().unwrap(), vec!["CloneBase/orig", "CloneChild/tweaked"]);
        assert_eq!(base.rule_order().unwrap(), vec!["CloneBase/orig"]);

        let err = child.applies_cloned_rule("CloneBase/ghost", rule!(name: "nope")).unwrap_err();
        assert!(matches!(err, Error::NoSuchRule { .. }));
        let err = child.applies_cloned_rule("CloneBase/orig", rule!(if: "1")).unwrap_err();
        assert!(matches!(err, Error::MissingRuleName));
    }
}
