//! Patient sets.
//!
//! A `PatientSet` is the unit of exchange between cohort queries: a
//! duplicate-free collection of patient identifiers. Iteration is in
//! ascending id order.

use std::collections::BTreeSet;

use crate::PatientId;

/// A set of patient identifiers produced or consumed by a cohort query.
///
/// # Examples
///
/// ```
/// use medrec_types::PatientSet;
///
/// let a: PatientSet = [1, 2, 3].into_iter().collect();
/// let b: PatientSet = [3, 4].into_iter().collect();
///
/// assert_eq!(a.union(&b).len(), 4);
/// assert_eq!(a.intersection(&b).to_vec(), vec![3]);
/// assert_eq!(a.difference(&b).to_vec(), vec![1, 2]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct PatientSet {
    ids: BTreeSet<PatientId>,
}

impl PatientSet {
    /// Creates an empty patient set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of patients in the set.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if the patient is a member.
    pub fn contains(&self, id: PatientId) -> bool {
        self.ids.contains(&id)
    }

    /// Adds a patient. Returns false if it was already present.
    pub fn insert(&mut self, id: PatientId) -> bool {
        self.ids.insert(id)
    }

    /// Removes a patient. Returns false if it was not present.
    pub fn remove(&mut self, id: PatientId) -> bool {
        self.ids.remove(&id)
    }

    /// Iterates members in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = PatientId> + '_ {
        self.ids.iter().copied()
    }

    /// Members as an ascending vector.
    pub fn to_vec(&self) -> Vec<PatientId> {
        self.ids.iter().copied().collect()
    }

    /// Patients in either set.
    pub fn union(&self, other: &PatientSet) -> PatientSet {
        Self {
            ids: self.ids.union(&other.ids).copied().collect(),
        }
    }

    /// Patients in both sets.
    pub fn intersection(&self, other: &PatientSet) -> PatientSet {
        Self {
            ids: self.ids.intersection(&other.ids).copied().collect(),
        }
    }

    /// Patients in this set but not in `other`.
    pub fn difference(&self, other: &PatientSet) -> PatientSet {
        Self {
            ids: self.ids.difference(&other.ids).copied().collect(),
        }
    }

    /// Union of any number of sets. The union of no sets is empty.
    pub fn union_all<'a>(sets: impl IntoIterator<Item = &'a PatientSet>) -> PatientSet {
        let mut out = PatientSet::new();
        for set in sets {
            out.ids.extend(set.ids.iter().copied());
        }
        out
    }

    /// Intersection of any number of sets.
    ///
    /// Returns `None` when no sets are given, since the neutral element
    /// (the whole population) is not known here.
    pub fn intersect_all<'a>(sets: impl IntoIterator<Item = &'a PatientSet>) -> Option<PatientSet> {
        let mut iter = sets.into_iter();
        let first = iter.next()?.clone();
        Some(iter.fold(first, |acc, set| acc.intersection(set)))
    }
}

impl FromIterator<PatientId> for PatientSet {
    fn from_iter<I: IntoIterator<Item = PatientId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

impl Extend<PatientId> for PatientSet {
    fn extend<I: IntoIterator<Item = PatientId>>(&mut self, iter: I) {
        self.ids.extend(iter);
    }
}

impl IntoIterator for PatientSet {
    type Item = PatientId;
    type IntoIter = std::collections::btree_set::IntoIter<PatientId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatientSet {
    type Item = &'a PatientId;
    type IntoIter = std::collections::btree_set::Iter<'a, PatientId>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[PatientId]) -> PatientSet {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_duplicates_collapse() {
        let s = set(&[5, 1, 5, 3, 1]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.to_vec(), vec![1, 3, 5]);
    }

    #[test]
    fn test_union_and_intersection_are_commutative() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4]);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.intersection(&b), b.intersection(&a));
    }

    #[test]
    fn test_union_and_intersection_are_associative() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2, 3, 4]);
        let c = set(&[3, 4, 5, 6]);
        assert_eq!(a.union(&b).union(&c), a.union(&b.union(&c)));
        assert_eq!(
            a.intersection(&b).intersection(&c),
            a.intersection(&b.intersection(&c))
        );
    }

    #[test]
    fn test_idempotent() {
        let a = set(&[7, 8]);
        assert_eq!(a.union(&a), a);
        assert_eq!(a.intersection(&a), a);
    }

    #[test]
    fn test_difference() {
        let a = set(&[1, 2, 3]);
        let b = set(&[2]);
        assert_eq!(a.difference(&b).to_vec(), vec![1, 3]);
        assert!(b.difference(&a).is_empty());
    }

    #[test]
    fn test_union_all_and_intersect_all() {
        let sets = [set(&[1, 2]), set(&[2, 3]), set(&[2, 4])];
        assert_eq!(PatientSet::union_all(&sets).to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(PatientSet::intersect_all(&sets).unwrap().to_vec(), vec![2]);
        assert!(PatientSet::intersect_all(std::iter::empty()).is_none());
        assert!(PatientSet::union_all(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_insert_remove() {
        let mut s = PatientSet::new();
        assert!(s.insert(9));
        assert!(!s.insert(9));
        assert!(s.contains(9));
        assert!(s.remove(9));
        assert!(!s.remove(9));
        assert!(s.is_empty());
    }
}
