//! Nominal subtyping queries: `is_subtype`, `join` and `meet`.
//!
//! [`TypeLattice`] is a cheap per-session view over a shared, immutable
//! [`TypeHierarchy`] and a [`LatticeCache`]. Type arguments are invariant:
//! `MutableList<Int>` is a subtype of `List<Int>` but not of `List<Number>`.
//! Nullability follows Kotlin: `T <: T?`, never `T? <: T`.

mod cache;
mod hierarchy;

pub use cache::{CacheMetrics, LatticeCache};
pub use hierarchy::{ClassDecl, HierarchyBuilder, HierarchyError, TypeHierarchy};

use crate::types::Type;
use bix_ast::TypeRef;
use cache::LatticeOp;
use rustc_hash::FxHashMap;
use std::cell::Cell;
use tracing::trace;

pub struct TypeLattice<'a> {
    hierarchy: &'a TypeHierarchy,
    cache: &'a LatticeCache,
    observed: Cell<CacheMetrics>,
}

impl<'a> TypeLattice<'a> {
    pub fn new(hierarchy: &'a TypeHierarchy, cache: &'a LatticeCache) -> Self {
        Self {
            hierarchy,
            cache,
            observed: Cell::new(CacheMetrics::default()),
        }
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        self.hierarchy
    }

    /// Cache traffic generated through this view only.
    pub fn observed_metrics(&self) -> CacheMetrics {
        self.observed.get()
    }

    /// Universal supertype `Any?`, if the hierarchy declares a top type.
    pub fn top(&self) -> Option<Type> {
        self.hierarchy.top().map(|name| Type::concrete(name).nullable())
    }

    /// Universal subtype `Nothing`, if the hierarchy declares a bottom type.
    pub fn bottom(&self) -> Option<Type> {
        self.hierarchy.bottom().map(Type::concrete)
    }

    /// Reflexive-transitive subtyping over concrete types. Variables are only
    /// related to themselves.
    pub fn is_subtype(&self, a: &Type, b: &Type) -> bool {
        if a == b {
            return true;
        }
        let (Some(a_name), Some(b_name)) = (a.name(), b.name()) else {
            return false;
        };
        if a.is_nullable() && !b.is_nullable() {
            return false;
        }
        if self.hierarchy.is_bottom(a_name) || self.hierarchy.is_top(b_name) {
            return true;
        }
        if a_name == b_name {
            return a.args() == b.args();
        }
        self.supertype_instance(a, b_name)
            .map(|args| args.as_slice() == b.args())
            .unwrap_or(false)
    }

    /// Type arguments of `target` as seen from `ty`, e.g. `MutableMap<K, V>`
    /// viewed as `Map` yields `[K, V]`. Variables inside `ty` are carried along.
    pub fn supertype_instance(&self, ty: &Type, target: &str) -> Option<Vec<Type>> {
        let name = ty.name()?;
        if name == target {
            return Some(ty.args().to_vec());
        }
        let info = self.hierarchy.class(name)?;
        let ancestor = info.ancestors.iter().find(|a| a.name == target)?;
        let bindings = self.bindings_for(&info.params, ty.args())?;
        ancestor
            .args
            .iter()
            .map(|arg| Type::from_ref(arg, &bindings).ok())
            .collect()
    }

    /// Least common supertype. `None` only when the hierarchy has no top type
    /// and the operands share no ancestor.
    pub fn join(&self, a: &Type, b: &Type) -> Option<Type> {
        self.memoized(LatticeOp::Join, a, b, |lattice| lattice.compute_join(a, b))
    }

    /// Most specific common subtype. `None` means no common subtype is declared,
    /// which callers must treat as a hard failure.
    pub fn meet(&self, a: &Type, b: &Type) -> Option<Type> {
        self.memoized(LatticeOp::Meet, a, b, |lattice| lattice.compute_meet(a, b))
    }

    fn memoized<F>(&self, op: LatticeOp, a: &Type, b: &Type, compute: F) -> Option<Type>
    where
        F: FnOnce(&Self) -> Option<Type>,
    {
        let mut observed = self.observed.get();
        if let Some(cached) = self.cache.lookup(op, a, b) {
            observed.record_hit();
            self.observed.set(observed);
            return cached;
        }
        observed.record_miss();
        self.observed.set(observed);
        trace!(?op, left = %a, right = %b, "lattice cache miss");
        let result = compute(self);
        self.cache.store(op, a, b, result.clone());
        result
    }

    fn compute_join(&self, a: &Type, b: &Type) -> Option<Type> {
        if self.is_subtype(a, b) {
            return Some(b.clone());
        }
        if self.is_subtype(b, a) {
            return Some(a.clone());
        }
        let nullable = a.is_nullable() || b.is_nullable();

        let left = self.instantiated_ancestors(a);
        let right = self.instantiated_ancestors(b);
        let mut common: Vec<(usize, Type)> = Vec::new();
        for (left_depth, left_ty) in &left {
            if let Some((right_depth, _)) = right.iter().find(|(_, ty)| ty == left_ty) {
                common.push((left_depth + right_depth, left_ty.clone()));
            }
        }

        let minimal: Vec<(usize, Type)> = common
            .iter()
            .filter(|(_, candidate)| {
                !common
                    .iter()
                    .any(|(_, other)| other != candidate && self.is_subtype(other, candidate))
            })
            .cloned()
            .collect();

        let nearest = minimal
            .into_iter()
            .min_by(|(depth_a, ty_a), (depth_b, ty_b)| {
                depth_a
                    .cmp(depth_b)
                    .then_with(|| ty_a.to_string().cmp(&ty_b.to_string()))
            })
            .map(|(_, ty)| ty);

        match nearest {
            Some(ty) => Some(ty.with_nullable(nullable)),
            None => self
                .hierarchy
                .top()
                .map(|name| Type::concrete(name).with_nullable(nullable)),
        }
    }

    fn compute_meet(&self, a: &Type, b: &Type) -> Option<Type> {
        if self.is_subtype(a, b) {
            return Some(a.clone());
        }
        if self.is_subtype(b, a) {
            return Some(b.clone());
        }
        let nullable = a.is_nullable() && b.is_nullable();
        let a_inner = a.clone().non_null();
        let b_inner = b.clone().non_null();

        let candidates: Vec<Type> = self
            .hierarchy
            .sorted_names()
            .iter()
            .filter(|name| !self.hierarchy.is_bottom(name))
            .filter_map(|name| self.instantiate_below(name, &a_inner, &b_inner))
            .filter(|candidate| {
                self.is_subtype(candidate, &a_inner) && self.is_subtype(candidate, &b_inner)
            })
            .collect();

        candidates
            .iter()
            .find(|candidate| {
                !candidates
                    .iter()
                    .any(|other| other != *candidate && self.is_subtype(candidate, other))
            })
            .map(|ty| ty.clone().with_nullable(nullable))
    }

    /// Instantiates class `name` so that it can sit below both `a` and `b`.
    /// Generic classes take their arguments from the operands, e.g.
    /// `ArraySet<E> : List<E>, Set<E>` below `List<String>` becomes `ArraySet<String>`.
    fn instantiate_below(&self, name: &str, a: &Type, b: &Type) -> Option<Type> {
        let info = self.hierarchy.class(name)?;
        if info.params.is_empty() {
            return Some(Type::concrete(name));
        }
        let mut bindings = FxHashMap::default();
        for target in [a, b] {
            let target_name = target.name()?;
            if self.hierarchy.is_top(target_name) {
                continue;
            }
            let ancestor = info.ancestors.iter().find(|entry| entry.name == target_name)?;
            if ancestor.args.len() != target.args().len() {
                return None;
            }
            let bound = ancestor
                .args
                .iter()
                .zip(target.args())
                .all(|(pattern, actual)| bind_params(pattern, actual, &mut bindings));
            if !bound {
                return None;
            }
        }
        let args = info
            .params
            .iter()
            .map(|param| bindings.get(param).cloned())
            .collect::<Option<Vec<_>>>()?;
        Some(Type::generic(name, args))
    }

    /// `ty` and every declared ancestor, instantiated, with their distance from `ty`.
    fn instantiated_ancestors(&self, ty: &Type) -> Vec<(usize, Type)> {
        let Some(name) = ty.name() else {
            return Vec::new();
        };
        let Some(info) = self.hierarchy.class(name) else {
            return vec![(0, ty.clone().non_null())];
        };
        let Some(bindings) = self.bindings_for(&info.params, ty.args()) else {
            return vec![(0, ty.clone().non_null())];
        };
        info.ancestors
            .iter()
            .filter_map(|ancestor| {
                let args = ancestor
                    .args
                    .iter()
                    .map(|arg| Type::from_ref(arg, &bindings).ok())
                    .collect::<Option<Vec<_>>>()?;
                Some((ancestor.depth, Type::generic(ancestor.name.clone(), args)))
            })
            .collect()
    }

    fn bindings_for(&self, params: &[String], args: &[Type]) -> Option<FxHashMap<String, Type>> {
        if params.len() != args.len() {
            return None;
        }
        Some(params.iter().cloned().zip(args.iter().cloned()).collect())
    }
}

/// Matches a class-level type reference against an instantiated type, binding
/// the class's parameters. Fails on a conflicting binding.
fn bind_params(pattern: &TypeRef, actual: &Type, bindings: &mut FxHashMap<String, Type>) -> bool {
    match pattern {
        TypeRef::Param { name, nullable } => {
            if *nullable && !actual.is_nullable() {
                return false;
            }
            let inner = if *nullable {
                actual.clone().non_null()
            } else {
                actual.clone()
            };
            match bindings.get(name) {
                Some(bound) => *bound == inner,
                None => {
                    bindings.insert(name.clone(), inner);
                    true
                }
            }
        }
        TypeRef::Named {
            name,
            args,
            nullable,
        } => {
            actual.name() == Some(name.as_str())
                && actual.is_nullable() == *nullable
                && actual.args().len() == args.len()
                && args
                    .iter()
                    .zip(actual.args())
                    .all(|(pattern, actual)| bind_params(pattern, actual, bindings))
        }
        TypeRef::Function { .. } => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bix_ast::TypeRef;
    use test_case::test_case;

    fn standard() -> TypeHierarchy {
        TypeHierarchy::standard().expect("standard hierarchy")
    }

    fn ty(name: &str) -> Type {
        Type::concrete(name)
    }

    fn list(name: &str, arg: Type) -> Type {
        Type::generic(name, vec![arg])
    }

    #[test_case("Int", "Number" => true; "direct supertype")]
    #[test_case("Int", "Any" => true; "implicit top")]
    #[test_case("Nothing", "String" => true; "bottom below everything")]
    #[test_case("Number", "Int" => false; "wrong direction")]
    #[test_case("String", "Number" => false; "unrelated")]
    #[test_case("String", "Comparable" => false; "raw generic target")]
    #[test_case("Int", "Int" => true; "reflexive")]
    fn subtyping_over_named_types(a: &str, b: &str) -> bool {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        TypeLattice::new(&hierarchy, &cache).is_subtype(&ty(a), &ty(b))
    }

    #[test]
    fn nullability_only_widens() {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        assert!(lattice.is_subtype(&ty("Int"), &ty("Number").nullable()));
        assert!(!lattice.is_subtype(&ty("Int").nullable(), &ty("Number")));
        assert!(lattice.is_subtype(&ty("Int").nullable(), &lattice.top().expect("top")));
    }

    #[test]
    fn generic_arguments_are_invariant() {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        assert!(lattice.is_subtype(&list("MutableList", ty("Int")), &list("List", ty("Int"))));
        assert!(lattice.is_subtype(
            &list("MutableList", ty("Int")),
            &list("Iterable", ty("Int"))
        ));
        assert!(!lattice.is_subtype(
            &list("MutableList", ty("Int")),
            &list("List", ty("Number"))
        ));
        assert!(lattice.is_subtype(&ty("Int"), &list("Comparable", ty("Int"))));
    }

    #[test]
    fn supertype_instance_carries_arguments() {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        let map = Type::generic("MutableMap", vec![ty("String"), ty("Int")]);
        assert_eq!(
            lattice.supertype_instance(&map, "Map"),
            Some(vec![ty("String"), ty("Int")])
        );
        assert_eq!(lattice.supertype_instance(&map, "List"), None);
    }

    #[test_case("Int", "Double" => "Number"; "sibling numbers")]
    #[test_case("Int", "Number" => "Number"; "ancestor")]
    #[test_case("Int", "String" => "Any"; "falls back to top")]
    #[test_case("Nothing", "Long" => "Long"; "bottom is neutral")]
    fn joins(a: &str, b: &str) -> String {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        lattice
            .join(&ty(a), &ty(b))
            .map(|t| t.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn join_keeps_nullability_and_generic_ancestors() {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);
        assert_eq!(
            lattice.join(&ty("Int").nullable(), &ty("Double")),
            Some(ty("Number").nullable())
        );
        assert_eq!(
            lattice.join(
                &list("MutableList", ty("String")),
                &list("Set", ty("String"))
            ),
            Some(list("Collection", ty("String")))
        );
    }

    #[test]
    fn meet_prefers_declared_common_subtypes() {
        let hierarchy = HierarchyBuilder::new()
            .with_top("Any")
            .with_bottom("Nothing")
            .declare(ClassDecl::new("Readable"))
            .declare(ClassDecl::new("Closeable"))
            .declare(
                ClassDecl::new("Stream")
                    .extends(TypeRef::named("Readable"))
                    .extends(TypeRef::named("Closeable")),
            )
            .declare(ClassDecl::new("FileStream").extends(TypeRef::named("Stream")))
            .declare(ClassDecl::new("Unrelated"))
            .build()
            .expect("hierarchy");
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);

        assert_eq!(
            lattice.meet(&ty("Readable"), &ty("Closeable")),
            Some(ty("Stream"))
        );
        assert_eq!(lattice.meet(&ty("Readable"), &ty("Unrelated")), None);
        assert_eq!(
            lattice.meet(&ty("Readable").nullable(), &ty("Stream").nullable()),
            Some(ty("Stream").nullable())
        );
    }

    #[test]
    fn meet_instantiates_generic_common_subtypes() {
        let e = || TypeRef::param("E");
        let hierarchy = HierarchyBuilder::new()
            .with_top("Any")
            .with_bottom("Nothing")
            .declare(ClassDecl::generic("Collection", ["E"]))
            .declare(
                ClassDecl::generic("List", ["E"])
                    .extends(TypeRef::generic("Collection", vec![e()])),
            )
            .declare(
                ClassDecl::generic("Set", ["E"]).extends(TypeRef::generic("Collection", vec![e()])),
            )
            .declare(
                ClassDecl::generic("ArraySet", ["E"])
                    .extends(TypeRef::generic("List", vec![e()]))
                    .extends(TypeRef::generic("Set", vec![e()])),
            )
            .build()
            .expect("hierarchy");
        let cache = LatticeCache::new();
        let lattice = TypeLattice::new(&hierarchy, &cache);

        assert_eq!(
            lattice.meet(&list("List", ty("String")), &list("Set", ty("String"))),
            Some(list("ArraySet", ty("String")))
        );
        assert_eq!(
            lattice.meet(&list("List", ty("String")), &list("Set", ty("Int"))),
            None
        );
    }

    #[test]
    fn repeated_queries_hit_the_shared_cache() {
        let hierarchy = standard();
        let cache = LatticeCache::new();
        {
            let lattice = TypeLattice::new(&hierarchy, &cache);
            lattice.join(&ty("Int"), &ty("Double"));
            assert_eq!(lattice.observed_metrics().misses, 1);
        }
        let second = TypeLattice::new(&hierarchy, &cache);
        assert_eq!(second.join(&ty("Int"), &ty("Double")), Some(ty("Number")));
        assert_eq!(second.observed_metrics().hits, 1);
        assert_eq!(cache.metrics().lookups, 2);
    }
}
