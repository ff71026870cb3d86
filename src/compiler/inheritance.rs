//! # Inheritance Linearizer
//!
//! Flattens a class's ancestry into one base-to-derived chain. A single
//! `extends` link is followed to the root; a `Compose(A, B, C)` list is
//! linearized parent by parent and concatenated without duplicates, in listed
//! order, before the class itself.
//!
//! Every call target is resolved here ahead of lowering. A method declared by
//! more than one chain entry is *overridden*: the most-derived body owns the
//! canonical IR name and every earlier body is emitted as a renamed copy
//! (`fun_<Class>_<method>`) reachable through `super`.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use super::catalog::Catalog;
use crate::ast::{ClassDecl, ConstructorDecl, Heritage, MethodDecl};
use crate::{Error, Result};

/// IR name of the canonical implementation of a method
pub fn function_name(method: &str) -> String {
    format!("fun_{}", method)
}

/// IR name of a renamed ancestor implementation
pub fn renamed_function_name(class: &str, method: &str) -> String {
    format!("fun_{}_{}", class, method)
}

/// IR name of a class constructor body
pub fn constructor_name(class: &str) -> String {
    format!("constructor_{}", class)
}

/// Linearized ancestor chain of a class
#[derive(Debug, Clone)]
pub struct InheritanceChain<'a> {
    classes: Vec<&'a ClassDecl>,
    overridden: BTreeSet<String>,
    super_targets: BTreeMap<(String, String), String>,
}

impl<'a> InheritanceChain<'a> {
    /// Linearize `class` against the catalog
    pub fn linearize(class: &'a ClassDecl, catalog: &Catalog<'a>) -> Result<Self> {
        let mut classes = Vec::new();
        let mut stack = Vec::new();
        collect(class, catalog, &mut stack, &mut classes)?;

        let mut declared: BTreeMap<&str, usize> = BTreeMap::new();
        for c in &classes {
            for name in c.methods.iter().map(|m| m.name.as_str()).collect::<BTreeSet<_>>() {
                *declared.entry(name).or_default() += 1;
            }
        }
        let overridden: BTreeSet<String> = declared
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(name, _)| name.to_string())
            .collect();

        let mut chain = Self {
            classes,
            overridden,
            super_targets: BTreeMap::new(),
        };
        chain.super_targets = chain.compute_super_targets();

        debug!(
            class = %class.name,
            chain = ?chain.classes.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            overridden = chain.overridden.len(),
            "Inheritance chain linearized"
        );
        Ok(chain)
    }

    fn compute_super_targets(&self) -> BTreeMap<(String, String), String> {
        let mut targets = BTreeMap::new();
        for (i, class) in self.classes.iter().enumerate() {
            for name in &self.overridden {
                let parent = self.classes[..i]
                    .iter()
                    .enumerate()
                    .rev()
                    .find(|(_, c)| has_body(c, name));
                if let Some((j, _)) = parent {
                    targets.insert(
                        (class.name.clone(), name.clone()),
                        self.ir_name_at(j, name),
                    );
                }
            }
            // `super.m()` where m is declared once, by an ancestor
            for ancestor in &self.classes[..i] {
                for m in ancestor.methods.iter().filter(|m| m.body.is_some()) {
                    targets
                        .entry((class.name.clone(), m.name.clone()))
                        .or_insert_with(|| function_name(&m.name));
                }
            }
        }
        targets
    }

    /// IR name of the implementation of `method` declared by `classes[index]`
    fn ir_name_at(&self, index: usize, method: &str) -> String {
        if self.final_index(method) == Some(index) {
            function_name(method)
        } else {
            renamed_function_name(&self.classes[index].name, method)
        }
    }

    /// Chain position of the most-derived implementation of `method`
    fn final_index(&self, method: &str) -> Option<usize> {
        self.classes
            .iter()
            .rposition(|c| has_body(c, method))
            .or_else(|| {
                self.classes
                    .iter()
                    .rposition(|c| c.methods.iter().any(|m| m.name == method))
            })
    }

    /// Classes base-first; the compiled class is last
    pub fn classes(&self) -> &[&'a ClassDecl] {
        &self.classes
    }

    /// The compiled class
    pub fn most_derived(&self) -> &'a ClassDecl {
        self.classes[self.classes.len() - 1]
    }

    /// Method names declared by two or more chain entries
    pub fn overridden(&self) -> &BTreeSet<String> {
        &self.overridden
    }

    /// True if `name` is a class of the chain
    pub fn contains(&self, name: &str) -> bool {
        self.classes.iter().any(|c| c.name == name)
    }

    /// Final implementation of every method name, in first-declaration order
    pub fn final_methods(&self) -> Vec<(&'a ClassDecl, &'a MethodDecl)> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for c in &self.classes {
            for m in &c.methods {
                if seen.insert(m.name.as_str()) {
                    if let Some(idx) = self.final_index(&m.name) {
                        let owner = self.classes[idx];
                        if let Some(decl) = owner
                            .methods
                            .iter()
                            .rev()
                            .find(|d| d.name == m.name && d.body.is_some())
                            .or_else(|| owner.find_method(&m.name))
                        {
                            out.push((owner, decl));
                        }
                    }
                }
            }
        }
        out
    }

    /// Final implementation of one method
    pub fn find_method(&self, name: &str) -> Option<(&'a ClassDecl, &'a MethodDecl)> {
        let idx = self.final_index(name)?;
        let owner = self.classes[idx];
        owner
            .methods
            .iter()
            .find(|m| m.name == name && m.body.is_some())
            .or_else(|| owner.find_method(name))
            .map(|m| (owner, m))
    }

    /// Non-final implementations of overridden methods, with their renamed IR names
    pub fn renamed_methods(&self) -> Vec<(&'a ClassDecl, &'a MethodDecl, String)> {
        let mut out = Vec::new();
        for (i, c) in self.classes.iter().enumerate() {
            for m in c.methods.iter().filter(|m| m.body.is_some()) {
                if self.overridden.contains(&m.name) && self.final_index(&m.name) != Some(i) {
                    out.push((*c, m, renamed_function_name(&c.name, &m.name)));
                }
            }
        }
        out
    }

    /// IR function a `super.method()` inside `class` resolves to
    pub fn super_target(&self, class: &str, method: &str) -> Result<&str> {
        self.super_targets
            .get(&(class.to_string(), method.to_string()))
            .map(String::as_str)
            .ok_or_else(|| Error::MissingSuperImplementation {
                class: class.to_string(),
                method: method.to_string(),
            })
    }

    /// Most-derived class declaring a constructor
    pub fn effective_constructor(&self) -> Option<(&'a ClassDecl, &'a ConstructorDecl)> {
        self.classes
            .iter()
            .rev()
            .find_map(|c| c.constructor.as_ref().map(|ctor| (*c, ctor)))
    }

    /// Nearest ancestor of `class` that declares a constructor (`super(args)`)
    pub fn parent_constructor(&self, class: &str) -> Option<(&'a ClassDecl, &'a ConstructorDecl)> {
        let idx = self.classes.iter().position(|c| c.name == class)?;
        self.classes[..idx]
            .iter()
            .rev()
            .find_map(|c| c.constructor.as_ref().map(|ctor| (*c, ctor)))
    }
}

fn has_body(class: &ClassDecl, method: &str) -> bool {
    class
        .methods
        .iter()
        .any(|m| m.name == method && m.body.is_some())
}

fn collect<'a>(
    class: &'a ClassDecl,
    catalog: &Catalog<'a>,
    stack: &mut Vec<String>,
    out: &mut Vec<&'a ClassDecl>,
) -> Result<()> {
    if stack.contains(&class.name) {
        return Err(Error::CyclicInheritance(class.name.clone()));
    }
    stack.push(class.name.clone());

    let parents: Vec<&String> = match &class.heritage {
        Some(Heritage::Extends(parent)) => vec![parent],
        Some(Heritage::Compose(parents)) => parents.iter().collect(),
        None => Vec::new(),
    };
    for parent_name in parents {
        let parent = catalog
            .class(parent_name)
            .ok_or_else(|| Error::UnresolvedAncestor {
                name: parent_name.clone(),
                class: class.name.clone(),
            })?;
        let mut linearized = Vec::new();
        collect(parent, catalog, stack, &mut linearized)?;
        for c in linearized {
            if !out.iter().any(|existing| existing.name == c.name) {
                out.push(c);
            }
        }
    }

    stack.pop();
    if !out.iter().any(|existing| existing.name == class.name) {
        out.push(class);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, MethodDecl, SourceUnit, Statement};

    fn getter(value: u128) -> MethodDecl {
        MethodDecl::new("getValue")
            .returns("u256")
            .body(vec![Statement::ret(Expression::num(value))])
    }

    fn names(chain: &InheritanceChain) -> Vec<String> {
        chain.classes().iter().map(|c| c.name.clone()).collect()
    }

    #[test]
    fn test_single_ancestor_chain() {
        let unit = SourceUnit::new("a.ts")
            .with_class(ClassDecl::new("Base").method(getter(1)))
            .with_class(ClassDecl::new("Mid").extends("Base"))
            .with_class(ClassDecl::new("Leaf").extends("Mid").method(getter(2)));
        let catalog = Catalog::build(&unit, &[]).unwrap();
        let leaf = catalog.class("Leaf").unwrap();
        let chain = InheritanceChain::linearize(leaf, &catalog).unwrap();

        assert_eq!(names(&chain), vec!["Base", "Mid", "Leaf"]);
        assert!(chain.overridden().contains("getValue"));
        let (owner, _) = chain.find_method("getValue").unwrap();
        assert_eq!(owner.name, "Leaf");
        assert_eq!(chain.super_target("Leaf", "getValue").unwrap(), "fun_Base_getValue");

        let renamed = chain.renamed_methods();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].2, "fun_Base_getValue");
    }

    #[test]
    fn test_composition_deduplicates() {
        let unit = SourceUnit::new("a.ts")
            .with_class(ClassDecl::new("Ownable"))
            .with_class(ClassDecl::new("Pausable").extends("Ownable"))
            .with_class(ClassDecl::new("Mintable").extends("Ownable"))
            .with_class(ClassDecl::new("Token").compose(&["Pausable", "Mintable"]));
        let catalog = Catalog::build(&unit, &[]).unwrap();
        let chain =
            InheritanceChain::linearize(catalog.class("Token").unwrap(), &catalog).unwrap();
        assert_eq!(names(&chain), vec!["Ownable", "Pausable", "Mintable", "Token"]);
    }

    #[test]
    fn test_missing_super_and_ancestor() {
        let unit = SourceUnit::new("a.ts")
            .with_class(ClassDecl::new("Lonely").method(getter(1)))
            .with_class(ClassDecl::new("Orphan").extends("Ghost"));
        let catalog = Catalog::build(&unit, &[]).unwrap();

        let chain =
            InheritanceChain::linearize(catalog.class("Lonely").unwrap(), &catalog).unwrap();
        assert!(matches!(
            chain.super_target("Lonely", "getValue"),
            Err(Error::MissingSuperImplementation { .. })
        ));

        assert!(matches!(
            InheritanceChain::linearize(catalog.class("Orphan").unwrap(), &catalog),
            Err(Error::UnresolvedAncestor { .. })
        ));
    }

    #[test]
    fn test_cycle_is_fatal() {
        let unit = SourceUnit::new("a.ts")
            .with_class(ClassDecl::new("A").extends("B"))
            .with_class(ClassDecl::new("B").extends("A"));
        let catalog = Catalog::build(&unit, &[]).unwrap();
        assert!(matches!(
            InheritanceChain::linearize(catalog.class("A").unwrap(), &catalog),
            Err(Error::CyclicInheritance(_))
        ));
    }
}
