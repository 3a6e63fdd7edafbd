//! Shared registry of named trees and functions

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::funcs::{builtins, FuncMap};
use crate::parser::ast::Tree;

/// Trees and functions shared by every template handle created from the
/// same root
///
/// Readers take shared locks and clone out `Arc`s, so executions never hold
/// a lock while walking a tree.
#[derive(Debug)]
pub struct Namespace {
    trees: RwLock<HashMap<String, Arc<Tree>>>,
    funcs: RwLock<FuncMap>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    /// Empty namespace with the builtin functions registered
    pub fn new() -> Self {
        Self {
            trees: RwLock::new(HashMap::new()),
            funcs: RwLock::new(builtins()),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Tree>> {
        self.trees.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.trees.read().contains_key(name)
    }

    /// Register `tree` under its name, replacing whatever was there
    pub fn associate(&self, tree: Tree) -> Option<Arc<Tree>> {
        self.trees.write().insert(tree.name.clone(), Arc::new(tree))
    }

    /// Register the trees of one parse under a single write lock
    ///
    /// An empty tree is skipped when a non-empty tree of the same name is
    /// already registered. Returns how many trees were installed.
    pub(crate) fn install(&self, trees: Vec<Tree>) -> usize {
        let mut registered = self.trees.write();
        let mut installed = 0;
        for tree in trees {
            let keep_existing = tree.is_empty()
                && registered
                    .get(&tree.name)
                    .is_some_and(|existing| !existing.is_empty());
            if keep_existing {
                continue;
            }
            registered.insert(tree.name.clone(), Arc::new(tree));
            installed += 1;
        }
        installed
    }

    /// Registered template names in ascending order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.trees.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn add_funcs(&self, funcs: FuncMap) {
        self.funcs.write().extend(funcs);
    }

    pub fn has_func(&self, name: &str) -> bool {
        self.funcs.read().contains_key(name)
    }

    /// Snapshot of the function table
    pub fn funcs(&self) -> FuncMap {
        self.funcs.read().clone()
    }

    /// Independent copy; later changes to either side are not shared
    pub fn deep_clone(&self) -> Namespace {
        let trees = self
            .trees
            .read()
            .iter()
            .map(|(name, tree)| (name.clone(), Arc::new(Tree::clone(tree))))
            .collect();
        let funcs = self.funcs.read().clone();
        Namespace {
            trees: RwLock::new(trees),
            funcs: RwLock::new(funcs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{Node, Spanned};

    fn text_tree(name: &str, text: &str) -> Tree {
        Tree::new(
            name,
            vec![Spanned::new(Node::Text(text.to_string()), 0..text.len())],
            Arc::from(text),
        )
    }

    #[test]
    fn test_install_keeps_non_empty_over_empty() {
        let ns = Namespace::new();
        assert_eq!(ns.install(vec![text_tree("a", "select 1")]), 1);
        assert_eq!(ns.install(vec![text_tree("a", "  ")]), 0);
        let tree = ns.lookup("a").expect("Should be registered");
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_associate_always_replaces() {
        let ns = Namespace::new();
        ns.associate(text_tree("a", "select 1"));
        let previous = ns.associate(text_tree("a", " "));
        assert!(previous.is_some());
        assert!(ns.lookup("a").expect("Should be registered").is_empty());
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let ns = Namespace::new();
        ns.associate(text_tree("a", "1"));
        let copy = ns.deep_clone();
        copy.associate(text_tree("b", "2"));
        ns.associate(text_tree("a", "3"));

        assert_eq!(ns.names(), vec!["a".to_string()]);
        assert_eq!(copy.names(), vec!["a".to_string(), "b".to_string()]);
        let copied = copy.lookup("a").expect("Should be registered");
        assert!(matches!(&copied.root[0].node, Node::Text(t) if t == "1"));
    }

    #[test]
    fn test_builtins_registered() {
        let ns = Namespace::new();
        assert!(ns.has_func("printf"));
        assert!(!ns.has_func("upper"));
    }
}
