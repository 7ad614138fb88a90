//! 名義型の上位型グラフ。プログラムのロード時に一度だけ構築され、推論中は読み取り専用。

use bix_ast::TypeRef;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use thiserror::Error;

/// Configuration errors detected while loading the hierarchy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    #[error("class `{name}` is declared more than once")]
    DuplicateClass { name: String },
    #[error("`{class}` extends undeclared type `{supertype}`")]
    UnknownSupertype { class: String, supertype: String },
    #[error("`{class}` passes {found} type argument(s) to `{supertype}`, which declares {expected}")]
    ArityMismatch {
        class: String,
        supertype: String,
        expected: usize,
        found: usize,
    },
    #[error("`{class}` mentions unknown type parameter `{parameter}` in its supertypes")]
    UnknownParameter { class: String, parameter: String },
    #[error("`{class}` may only extend nominal types, found `{supertype}`")]
    UnsupportedSupertype { class: String, supertype: String },
    #[error("cyclic supertype chain: {}", path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Declaration handed over by the hierarchy loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub name: String,
    pub params: Vec<String>,
    pub supertypes: Vec<TypeRef>,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    pub fn generic<I, S>(name: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            supertypes: Vec::new(),
        }
    }

    pub fn extends(mut self, supertype: TypeRef) -> Self {
        self.supertypes.push(supertype);
        self
    }
}

/// Ancestor of a class, with type arguments written in terms of the class's own parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Ancestor {
    pub name: String,
    pub args: Vec<TypeRef>,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct ClassInfo {
    pub params: Vec<String>,
    /// Reflexive-transitive closure in breadth-first order; `ancestors[0]` is the class itself.
    pub ancestors: Vec<Ancestor>,
}

/// Acyclic nominal subtyping graph with optional universal top and bottom types.
#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    classes: FxHashMap<String, ClassInfo>,
    sorted_names: Vec<String>,
    top: Option<String>,
    bottom: Option<String>,
}

impl TypeHierarchy {
    pub fn builder() -> HierarchyBuilder {
        HierarchyBuilder::new()
    }

    /// Kotlin-flavoured base hierarchy: numbers, strings, and the collection interfaces.
    pub fn standard() -> Result<Self, HierarchyError> {
        let e = || TypeRef::param("E");
        let k = || TypeRef::param("K");
        let v = || TypeRef::param("V");
        let comparable = |name: &str| TypeRef::generic("Comparable", vec![TypeRef::named(name)]);

        let mut builder = HierarchyBuilder::new()
            .with_top("Any")
            .with_bottom("Nothing")
            .declare(ClassDecl::generic("Comparable", ["T"]))
            .declare(ClassDecl::new("Number"))
            .declare(ClassDecl::new("CharSequence"))
            .declare(ClassDecl::new("Boolean").extends(comparable("Boolean")))
            .declare(ClassDecl::new("Unit"))
            .declare(
                ClassDecl::new("String")
                    .extends(TypeRef::named("CharSequence"))
                    .extends(comparable("String")),
            )
            .declare(ClassDecl::new("Char").extends(comparable("Char")));

        for number in ["Byte", "Short", "Int", "Long", "Float", "Double"] {
            builder = builder.declare(
                ClassDecl::new(number)
                    .extends(TypeRef::named("Number"))
                    .extends(comparable(number)),
            );
        }

        builder = builder
            .declare(ClassDecl::generic("Iterable", ["E"]))
            .declare(
                ClassDecl::generic("Collection", ["E"])
                    .extends(TypeRef::generic("Iterable", vec![e()])),
            )
            .declare(
                ClassDecl::generic("List", ["E"])
                    .extends(TypeRef::generic("Collection", vec![e()])),
            )
            .declare(
                ClassDecl::generic("MutableList", ["E"])
                    .extends(TypeRef::generic("List", vec![e()])),
            )
            .declare(
                ClassDecl::generic("Set", ["E"]).extends(TypeRef::generic("Collection", vec![e()])),
            )
            .declare(
                ClassDecl::generic("MutableSet", ["E"])
                    .extends(TypeRef::generic("Set", vec![e()])),
            )
            .declare(ClassDecl::generic("Map", ["K", "V"]))
            .declare(
                ClassDecl::generic("MutableMap", ["K", "V"])
                    .extends(TypeRef::generic("Map", vec![k(), v()])),
            )
            .declare(ClassDecl::generic("Pair", ["A", "B"]));

        builder.build()
    }

    pub fn top(&self) -> Option<&str> {
        self.top.as_deref()
    }

    pub fn bottom(&self) -> Option<&str> {
        self.bottom.as_deref()
    }

    pub fn is_top(&self, name: &str) -> bool {
        self.top.as_deref() == Some(name)
    }

    pub fn is_bottom(&self, name: &str) -> bool {
        self.bottom.as_deref() == Some(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    pub fn params(&self, name: &str) -> Option<&[String]> {
        self.classes.get(name).map(|info| info.params.as_slice())
    }

    pub(crate) fn class(&self, name: &str) -> Option<&ClassInfo> {
        self.classes.get(name)
    }

    /// Declared class names in lexicographic order.
    pub(crate) fn sorted_names(&self) -> &[String] {
        &self.sorted_names
    }
}

/// Collects declarations and validates them into a [`TypeHierarchy`].
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    decls: Vec<ClassDecl>,
    top: Option<String>,
    bottom: Option<String>,
}

impl HierarchyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_top(mut self, name: impl Into<String>) -> Self {
        self.top = Some(name.into());
        self
    }

    pub fn with_bottom(mut self, name: impl Into<String>) -> Self {
        self.bottom = Some(name.into());
        self
    }

    pub fn declare(mut self, decl: ClassDecl) -> Self {
        self.decls.push(decl);
        self
    }

    pub fn build(self) -> Result<TypeHierarchy, HierarchyError> {
        let mut decls: FxHashMap<String, ClassDecl> = FxHashMap::default();
        for special in self.top.iter().chain(self.bottom.iter()) {
            decls.insert(special.clone(), ClassDecl::new(special.clone()));
        }
        for decl in self.decls {
            let is_special = self.top.as_deref() == Some(decl.name.as_str())
                || self.bottom.as_deref() == Some(decl.name.as_str());
            if decls.contains_key(&decl.name) && !is_special {
                return Err(HierarchyError::DuplicateClass { name: decl.name });
            }
            decls.insert(decl.name.clone(), decl);
        }

        for decl in decls.values() {
            validate_supertypes(decl, &decls)?;
        }
        detect_cycles(&decls)?;

        let mut classes = FxHashMap::default();
        for decl in decls.values() {
            let ancestors = ancestor_closure(decl, &decls, self.top.as_deref());
            classes.insert(
                decl.name.clone(),
                ClassInfo {
                    params: decl.params.clone(),
                    ancestors,
                },
            );
        }

        let mut sorted_names: Vec<String> = classes.keys().cloned().collect();
        sorted_names.sort();

        Ok(TypeHierarchy {
            classes,
            sorted_names,
            top: self.top,
            bottom: self.bottom,
        })
    }
}

fn validate_supertypes(
    decl: &ClassDecl,
    decls: &FxHashMap<String, ClassDecl>,
) -> Result<(), HierarchyError> {
    for supertype in &decl.supertypes {
        let TypeRef::Named { name, args, .. } = supertype else {
            return Err(HierarchyError::UnsupportedSupertype {
                class: decl.name.clone(),
                supertype: supertype.to_string(),
            });
        };
        let target = decls
            .get(name)
            .ok_or_else(|| HierarchyError::UnknownSupertype {
                class: decl.name.clone(),
                supertype: name.clone(),
            })?;
        if target.params.len() != args.len() {
            return Err(HierarchyError::ArityMismatch {
                class: decl.name.clone(),
                supertype: name.clone(),
                expected: target.params.len(),
                found: args.len(),
            });
        }
        for parameter in supertype.param_names() {
            if !decl.params.iter().any(|own| own == parameter) {
                return Err(HierarchyError::UnknownParameter {
                    class: decl.name.clone(),
                    parameter: parameter.to_string(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycles(decls: &FxHashMap<String, ClassDecl>) -> Result<(), HierarchyError> {
    let mut marks: FxHashMap<&str, Mark> = FxHashMap::default();
    let mut names: Vec<&str> = decls.keys().map(String::as_str).collect();
    names.sort_unstable();

    for start in names {
        if marks.contains_key(start) {
            continue;
        }
        // Iterative DFS: (class, index of the next supertype to visit).
        let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Visiting);
        while let Some((current, next)) = stack.last().copied() {
            let supers = &decls[current].supertypes;
            if next >= supers.len() {
                marks.insert(current, Mark::Done);
                stack.pop();
                continue;
            }
            if let Some(frame) = stack.last_mut() {
                frame.1 += 1;
            }
            let TypeRef::Named { name, .. } = &supers[next] else {
                continue;
            };
            match marks.get(name.as_str()) {
                Some(Mark::Done) => {}
                Some(Mark::Visiting) => {
                    let from = stack
                        .iter()
                        .position(|(class, _)| *class == name.as_str())
                        .unwrap_or(0);
                    let mut path: Vec<String> =
                        stack[from..].iter().map(|(class, _)| class.to_string()).collect();
                    path.push(name.clone());
                    return Err(HierarchyError::Cycle { path });
                }
                None => {
                    marks.insert(name.as_str(), Mark::Visiting);
                    stack.push((name.as_str(), 0));
                }
            }
        }
    }
    Ok(())
}

fn ancestor_closure(
    decl: &ClassDecl,
    decls: &FxHashMap<String, ClassDecl>,
    top: Option<&str>,
) -> Vec<Ancestor> {
    let own_args: Vec<TypeRef> = decl.params.iter().map(TypeRef::param).collect();
    let mut ancestors = vec![Ancestor {
        name: decl.name.clone(),
        args: own_args.clone(),
        depth: 0,
    }];
    let mut seen: FxHashSet<String> = FxHashSet::default();
    seen.insert(decl.name.clone());

    let mut queue: VecDeque<(String, Vec<TypeRef>, usize)> = VecDeque::new();
    queue.push_back((decl.name.clone(), own_args, 0));

    while let Some((name, args, depth)) = queue.pop_front() {
        let current = &decls[&name];
        let bindings: FxHashMap<&str, &TypeRef> = current
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        for supertype in &current.supertypes {
            let TypeRef::Named {
                name: super_name,
                args: super_args,
                ..
            } = supertype
            else {
                continue;
            };
            if top == Some(super_name.as_str()) || !seen.insert(super_name.clone()) {
                continue;
            }
            let instantiated: Vec<TypeRef> = super_args
                .iter()
                .map(|arg| substitute_ref(arg, &bindings))
                .collect();
            ancestors.push(Ancestor {
                name: super_name.clone(),
                args: instantiated.clone(),
                depth: depth + 1,
            });
            queue.push_back((super_name.clone(), instantiated, depth + 1));
        }
    }
    ancestors
}

fn substitute_ref(reference: &TypeRef, bindings: &FxHashMap<&str, &TypeRef>) -> TypeRef {
    match reference {
        TypeRef::Named {
            name,
            args,
            nullable,
        } => TypeRef::Named {
            name: name.clone(),
            args: args.iter().map(|arg| substitute_ref(arg, bindings)).collect(),
            nullable: *nullable,
        },
        TypeRef::Param { name, nullable } => match bindings.get(name.as_str()) {
            Some(bound) if *nullable => (*bound).clone().nullable(),
            Some(bound) => (*bound).clone(),
            None => reference.clone(),
        },
        TypeRef::Function {
            receiver,
            params,
            return_type,
            nullable,
        } => TypeRef::Function {
            receiver: receiver
                .as_ref()
                .map(|r| Box::new(substitute_ref(r, bindings))),
            params: params.iter().map(|p| substitute_ref(p, bindings)).collect(),
            return_type: Box::new(substitute_ref(return_type, bindings)),
            nullable: *nullable,
        },
    }
}
