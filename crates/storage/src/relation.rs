//! A bidirectional many-to-many index between two key domains.

use std::{
    collections::{HashMap, HashSet},
    hash::{BuildHasher, Hash},
};

use fxhash::FxBuildHasher;

/// A bidirectional multimap relating keys of type `F` to keys of type `T`.
///
/// Every edge `(f, t)` is recorded in both a forward index (`f -> {t}`) and a
/// reverse index (`t -> {f}`). The two indices are always mutually
/// consistent: any mutation updates both sides, and adjacency sets are
/// pruned as soon as they become empty so a key with no edges is
/// indistinguishable from an unknown key.
///
/// The relation is not internally synchronised. Owners that share it across
/// tasks keep it behind a lock and mutate it as a unit.
#[derive(Clone)]
pub struct Relation<F, T, S = FxBuildHasher> {
    forward: HashMap<F, HashSet<T, S>, S>,
    reverse: HashMap<T, HashSet<F, S>, S>,
}

impl<F, T, S> std::fmt::Debug for Relation<F, T, S>
where
    F: std::fmt::Debug,
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relation").field("forward", &self.forward).finish()
    }
}

impl<F, T, S: Default> Default for Relation<F, T, S> {
    fn default() -> Self {
        Self { forward: HashMap::default(), reverse: HashMap::default() }
    }
}

impl<F, T, S: Default> Relation<F, T, S> {
    /// Creates an empty relation.
    #[must_use]
    pub fn new() -> Self { Self::default() }
}

impl<F, T, S> Relation<F, T, S>
where
    F: Eq + Hash + Clone,
    T: Eq + Hash + Clone,
    S: BuildHasher + Default,
{
    /// Adds the edge `(from, to)`.
    ///
    /// Linking an existing edge is a no-op.
    pub fn link(&mut self, from: F, to: T) {
        self.reverse.entry(to.clone()).or_default().insert(from.clone());
        self.forward.entry(from).or_default().insert(to);
    }

    /// Removes edges by either or both endpoints.
    ///
    /// - `(Some(f), Some(t))` removes the single edge `(f, t)`.
    /// - `(Some(f), None)` removes every edge originating at `f`.
    /// - `(None, Some(t))` removes every edge pointing at `t`.
    /// - `(None, None)` does nothing.
    pub fn unlink(&mut self, from: Option<&F>, to: Option<&T>) {
        match (from, to) {
            (Some(from), Some(to)) => {
                Self::remove_edge(&mut self.forward, from, to);
                Self::remove_edge(&mut self.reverse, to, from);
            }

            (Some(from), None) => {
                let Some(targets) = self.forward.remove(from) else {
                    return;
                };

                for to in &targets {
                    Self::remove_edge(&mut self.reverse, to, from);
                }
            }

            (None, Some(to)) => {
                let Some(sources) = self.reverse.remove(to) else {
                    return;
                };

                for from in &sources {
                    Self::remove_edge(&mut self.forward, from, to);
                }
            }

            (None, None) => {}
        }
    }

    /// Replaces every edge pointing at `to` with one edge from each of
    /// `froms`.
    ///
    /// Equivalent to `unlink(None, Some(&to))` followed by one `link` per
    /// source, performed as a single mutation.
    pub fn relink_to(&mut self, to: T, froms: impl IntoIterator<Item = F>) {
        self.unlink(None, Some(&to));

        for from in froms {
            self.link(from, to.clone());
        }
    }

    /// Returns every `T` linked from `from`, in no particular order.
    pub fn from(&self, from: &F) -> Vec<T> {
        self.forward
            .get(from)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every `F` linked to `to`, in no particular order.
    pub fn to(&self, to: &T) -> Vec<F> {
        self.reverse
            .get(to)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns `true` if the edge `(from, to)` exists.
    pub fn contains(&self, from: &F, to: &T) -> bool {
        self.forward.get(from).is_some_and(|targets| targets.contains(to))
    }

    /// Returns the number of edges.
    pub fn len(&self) -> usize { self.forward.values().map(HashSet::len).sum() }

    /// Returns `true` if the relation holds no edges.
    pub fn is_empty(&self) -> bool { self.forward.is_empty() }

    fn remove_edge<A, B>(index: &mut HashMap<A, HashSet<B, S>, S>, a: &A, b: &B)
    where
        A: Eq + Hash,
        B: Eq + Hash,
    {
        let Some(set) = index.get_mut(a) else {
            return;
        };

        set.remove(b);

        if set.is_empty() {
            index.remove(a);
        }
    }
}
