use buspolicy_core::{Gid, Uid};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use crate::rule::Rule;

// ---------------------------------------------------------------------------
// Category — which container a <policy> block feeds
// ---------------------------------------------------------------------------

/// The scope declared by a `<policy>` block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Default,
    Mandatory,
    User(Uid),
    Group(Gid),
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Default => write!(f, "default"),
            Category::Mandatory => write!(f, "mandatory"),
            Category::User(uid) => write!(f, "user {}", uid),
            Category::Group(gid) => write!(f, "group {}", gid),
        }
    }
}

// ---------------------------------------------------------------------------
// RuleChain — a precedence sequence
// ---------------------------------------------------------------------------

/// An ordered rule sequence, most recently compiled rule first.
///
/// Matching logic walks it front to back and stops at the first match, so
/// the order is the precedence contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleChain {
    rules: VecDeque<Rule>,
}

impl RuleChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prepend(&mut self, rule: Rule) {
        self.rules.push_front(rule);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Rule> + ExactSizeIterator {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first(&self) -> Option<&Rule> {
        self.rules.front()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    /// Put every rule of `newer` ahead of this chain, keeping `newer`'s
    /// internal order.
    fn absorb_newer(&mut self, newer: RuleChain) {
        for rule in newer.rules.into_iter().rev() {
            self.rules.push_front(rule);
        }
    }
}

impl<'a> IntoIterator for &'a RuleChain {
    type Item = &'a Rule;
    type IntoIter = std::collections::vec_deque::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

// ---------------------------------------------------------------------------
// PolicyStore — the compiled, layered model
// ---------------------------------------------------------------------------

/// The compiled policy: global defaults, mandatory overrides, and per-user
/// and per-group chains.
///
/// Filled by one or more compilation passes and never rolled back. Once
/// loading finishes it is read-only and can be shared across readers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStore {
    default_rules: RuleChain,
    mandatory_rules: RuleChain,
    user_rules: BTreeMap<Uid, RuleChain>,
    group_rules: BTreeMap<Gid, RuleChain>,
}

/// Per-container rule counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    pub default_rules: usize,
    pub mandatory_rules: usize,
    pub users: usize,
    pub user_rules: usize,
    pub groups: usize,
    pub group_rules: usize,
}

impl StoreSummary {
    pub fn total(&self) -> usize {
        self.default_rules + self.mandatory_rules + self.user_rules + self.group_rules
    }
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `rule` to the chain selected by `category`, creating the
    /// per-user or per-group chain on first use.
    pub fn insert(&mut self, category: Category, rule: Rule) {
        let chain = match category {
            Category::Default => &mut self.default_rules,
            Category::Mandatory => &mut self.mandatory_rules,
            Category::User(uid) => self.user_rules.entry(uid).or_default(),
            Category::Group(gid) => self.group_rules.entry(gid).or_default(),
        };
        chain.prepend(rule);
    }

    pub fn default_rules(&self) -> &RuleChain {
        &self.default_rules
    }

    pub fn mandatory_rules(&self) -> &RuleChain {
        &self.mandatory_rules
    }

    pub fn user_rules(&self, uid: Uid) -> Option<&RuleChain> {
        self.user_rules.get(&uid)
    }

    pub fn group_rules(&self, gid: Gid) -> Option<&RuleChain> {
        self.group_rules.get(&gid)
    }

    pub fn users(&self) -> impl Iterator<Item = Uid> + '_ {
        self.user_rules.keys().copied()
    }

    pub fn groups(&self) -> impl Iterator<Item = Gid> + '_ {
        self.group_rules.keys().copied()
    }

    /// The chain for a category; `None` for a user or group without rules.
    pub fn rules_for(&self, category: &Category) -> Option<&RuleChain> {
        match category {
            Category::Default => Some(&self.default_rules),
            Category::Mandatory => Some(&self.mandatory_rules),
            Category::User(uid) => self.user_rules.get(uid),
            Category::Group(gid) => self.group_rules.get(gid),
        }
    }

    pub fn len(&self) -> usize {
        self.summary().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> StoreSummary {
        StoreSummary {
            default_rules: self.default_rules.len(),
            mandatory_rules: self.mandatory_rules.len(),
            users: self.user_rules.len(),
            user_rules: self.user_rules.values().map(RuleChain::len).sum(),
            groups: self.group_rules.len(),
            group_rules: self.group_rules.values().map(RuleChain::len).sum(),
        }
    }

    /// Merge a store compiled from a later fragment.
    ///
    /// Every rule in `later` ends up ahead of this store's rules for the same
    /// category, exactly as if `later` had been compiled into `self`
    /// sequentially. Allows fragments to be compiled in isolation and
    /// combined in fragment order afterwards.
    pub fn merge(&mut self, later: PolicyStore) {
        let PolicyStore {
            default_rules,
            mandatory_rules,
            user_rules,
            group_rules,
        } = later;

        self.default_rules.absorb_newer(default_rules);
        self.mandatory_rules.absorb_newer(mandatory_rules);
        for (uid, chain) in user_rules {
            self.user_rules.entry(uid).or_default().absorb_newer(chain);
        }
        for (gid, chain) in group_rules {
            self.group_rules.entry(gid).or_default().absorb_newer(chain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Disposition, RuleBuilder, RuleClass, RuleField};

    fn make_rule(disposition: Disposition, name: &str) -> Rule {
        let mut builder = RuleBuilder::new(disposition);
        builder.assign_class(RuleClass::Own).unwrap();
        builder.set_text(RuleField::Name, name.to_string()).unwrap();
        builder.finish().unwrap()
    }

    fn names(chain: &RuleChain) -> Vec<&str> {
        chain.iter().filter_map(Rule::target_name).collect()
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = PolicyStore::new();
        assert!(store.is_empty());
        assert!(store.default_rules().is_empty());
        assert!(store.mandatory_rules().is_empty());
        assert!(store.user_rules(Uid(0)).is_none());
        assert_eq!(store.summary(), StoreSummary::default());
    }

    #[test]
    fn test_insert_prepends() {
        let mut store = PolicyStore::new();
        store.insert(Category::Default, make_rule(Disposition::Allow, "a"));
        store.insert(Category::Default, make_rule(Disposition::Deny, "b"));
        store.insert(Category::Default, make_rule(Disposition::Allow, "c"));

        assert_eq!(names(store.default_rules()), vec!["c", "b", "a"]);
        assert_eq!(
            store.default_rules().first().unwrap().disposition(),
            Disposition::Allow
        );
        assert_eq!(store.default_rules().get(1).unwrap().target_name(), Some("b"));
    }

    #[test]
    fn test_default_and_mandatory_are_distinct() {
        let mut store = PolicyStore::new();
        store.insert(Category::Default, make_rule(Disposition::Allow, "d"));
        store.insert(Category::Mandatory, make_rule(Disposition::Deny, "m"));

        assert_eq!(names(store.default_rules()), vec!["d"]);
        assert_eq!(names(store.mandatory_rules()), vec!["m"]);
    }

    #[test]
    fn test_user_and_group_chains_keyed_exactly() {
        let mut store = PolicyStore::new();
        store.insert(Category::User(Uid(1000)), make_rule(Disposition::Allow, "u1"));
        store.insert(Category::User(Uid(1001)), make_rule(Disposition::Allow, "u2"));
        store.insert(Category::User(Uid(1000)), make_rule(Disposition::Deny, "u3"));
        store.insert(Category::Group(Gid(10)), make_rule(Disposition::Allow, "g1"));

        assert_eq!(names(store.user_rules(Uid(1000)).unwrap()), vec!["u3", "u1"]);
        assert_eq!(names(store.user_rules(Uid(1001)).unwrap()), vec!["u2"]);
        assert_eq!(names(store.group_rules(Gid(10)).unwrap()), vec!["g1"]);
        assert!(store.group_rules(Gid(1000)).is_none());
        assert_eq!(store.users().collect::<Vec<_>>(), vec![Uid(1000), Uid(1001)]);
        assert_eq!(store.groups().collect::<Vec<_>>(), vec![Gid(10)]);
    }

    #[test]
    fn test_rules_for_category() {
        let mut store = PolicyStore::new();
        store.insert(Category::Group(Gid(4)), make_rule(Disposition::Allow, "g"));

        assert!(store.rules_for(&Category::Default).unwrap().is_empty());
        assert_eq!(store.rules_for(&Category::Group(Gid(4))).unwrap().len(), 1);
        assert!(store.rules_for(&Category::User(Uid(4))).is_none());
    }

    #[test]
    fn test_summary_counts() {
        let mut store = PolicyStore::new();
        store.insert(Category::Default, make_rule(Disposition::Allow, "a"));
        store.insert(Category::Mandatory, make_rule(Disposition::Allow, "b"));
        store.insert(Category::User(Uid(1)), make_rule(Disposition::Allow, "c"));
        store.insert(Category::User(Uid(1)), make_rule(Disposition::Allow, "d"));
        store.insert(Category::User(Uid(2)), make_rule(Disposition::Allow, "e"));
        store.insert(Category::Group(Gid(3)), make_rule(Disposition::Allow, "f"));

        let summary = store.summary();
        assert_eq!(summary.default_rules, 1);
        assert_eq!(summary.mandatory_rules, 1);
        assert_eq!(summary.users, 2);
        assert_eq!(summary.user_rules, 3);
        assert_eq!(summary.groups, 1);
        assert_eq!(summary.group_rules, 1);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn test_merge_matches_sequential_insertion() {
        let mut sequential = PolicyStore::new();
        let mut earlier = PolicyStore::new();
        let mut later = PolicyStore::new();

        for name in ["a1", "a2"] {
            earlier.insert(Category::Default, make_rule(Disposition::Allow, name));
        }
        for name in ["b1", "b2"] {
            later.insert(Category::Default, make_rule(Disposition::Allow, name));
        }
        later.insert(Category::User(Uid(7)), make_rule(Disposition::Deny, "b-user"));
        earlier.insert(Category::User(Uid(7)), make_rule(Disposition::Deny, "a-user"));

        for name in ["a1", "a2"] {
            sequential.insert(Category::Default, make_rule(Disposition::Allow, name));
        }
        sequential.insert(Category::User(Uid(7)), make_rule(Disposition::Deny, "a-user"));
        for name in ["b1", "b2"] {
            sequential.insert(Category::Default, make_rule(Disposition::Allow, name));
        }
        sequential.insert(Category::User(Uid(7)), make_rule(Disposition::Deny, "b-user"));

        earlier.merge(later);
        assert_eq!(names(earlier.default_rules()), vec!["b2", "b1", "a2", "a1"]);
        assert_eq!(earlier, sequential);
    }

    #[test]
    fn test_merge_into_empty_store() {
        let mut store = PolicyStore::new();
        let mut later = PolicyStore::new();
        later.insert(Category::Group(Gid(5)), make_rule(Disposition::Allow, "g"));
        store.merge(later.clone());
        assert_eq!(store, later);
    }

    #[test]
    fn test_store_serializes_in_precedence_order() {
        let mut store = PolicyStore::new();
        store.insert(Category::User(Uid(1000)), make_rule(Disposition::Allow, "old"));
        store.insert(Category::User(Uid(1000)), make_rule(Disposition::Deny, "new"));

        let json = serde_json::to_value(&store).unwrap();
        let chain = &json["user_rules"]["1000"];
        assert_eq!(chain[0]["target_name"], "new");
        assert_eq!(chain[1]["target_name"], "old");
        assert!(json["default_rules"].as_array().unwrap().is_empty());
    }
}
