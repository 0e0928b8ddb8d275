//! Requirement flattening module
//!
//! The source's `required=` keyword accepted "nothing, a single Job, or an
//! arbitrarily nested nestable collection of Jobs and null sentinels" and
//! flattened it once, by hand, at call time. `IntoRequirement` replaces that
//! ad hoc flattening with a typed union implemented once as a recursive
//! trait, so every nesting shape (`Vec`, arrays, `Option`, `HashSet`, and a
//! bare `Job`/`Sequence`) is handled by a single generic impl rather than a
//! runtime type switch.

use std::collections::HashSet;

use super::job::Job;
use super::sequence::Sequence;

/// Anything that can be flattened into a list of prerequisite jobs.
///
/// A `Sequence` resolves to its tail element (§4.2): only the last job in
/// the chain is a prerequisite of whatever requires the sequence.
pub trait IntoRequirement {
    fn into_requirement(self) -> Vec<Job>;
}

impl IntoRequirement for () {
    fn into_requirement(self) -> Vec<Job> {
        Vec::new()
    }
}

impl IntoRequirement for Job {
    fn into_requirement(self) -> Vec<Job> {
        vec![self]
    }
}

impl IntoRequirement for &Job {
    fn into_requirement(self) -> Vec<Job> {
        vec![self.clone()]
    }
}

impl IntoRequirement for Sequence {
    fn into_requirement(self) -> Vec<Job> {
        self.tail().into_iter().collect()
    }
}

impl IntoRequirement for &Sequence {
    fn into_requirement(self) -> Vec<Job> {
        self.tail().into_iter().collect()
    }
}

impl<T: IntoRequirement> IntoRequirement for Option<T> {
    fn into_requirement(self) -> Vec<Job> {
        match self {
            Some(inner) => inner.into_requirement(),
            None => Vec::new(),
        }
    }
}

impl<T: IntoRequirement> IntoRequirement for Vec<T> {
    fn into_requirement(self) -> Vec<Job> {
        self.into_iter().flat_map(IntoRequirement::into_requirement).collect()
    }
}

impl<T: IntoRequirement> IntoRequirement for &[T]
where
    T: Clone,
{
    fn into_requirement(self) -> Vec<Job> {
        self.iter().cloned().flat_map(IntoRequirement::into_requirement).collect()
    }
}

impl<T: IntoRequirement, const N: usize> IntoRequirement for [T; N] {
    fn into_requirement(self) -> Vec<Job> {
        self.into_iter().flat_map(IntoRequirement::into_requirement).collect()
    }
}

impl IntoRequirement for HashSet<Job> {
    fn into_requirement(self) -> Vec<Job> {
        self.into_iter().collect()
    }
}

/// Flattens and de-duplicates by identity: `requires` applied to any
/// nesting of the same leaves is equal to `requires` applied to the flat,
/// deduplicated set.
pub(crate) fn flatten_dedupe(required: impl IntoRequirement) -> Vec<Job> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for job in required.into_requirement() {
        if seen.insert(job.id()) {
            out.push(job);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::body::FnJob;
    use crate::domain::entities::job::JobOptions;

    fn noop_job() -> Job {
        Job::new(FnJob::new(|_| async { Ok(Box::new(()) as _) }), JobOptions::new()).unwrap()
    }

    #[test]
    fn flattens_nil() {
        assert!(flatten_dedupe(()).is_empty());
        assert!(flatten_dedupe(None::<Job>).is_empty());
        assert!(flatten_dedupe(vec![None::<Job>]).is_empty());
    }

    #[test]
    fn flattens_single_job() {
        let a = noop_job();
        assert_eq!(flatten_dedupe(a.clone()).len(), 1);
        assert_eq!(flatten_dedupe(vec![a]).len(), 1);
    }

    #[test]
    fn flattens_arbitrary_nesting_and_dedupes() {
        let a1 = noop_job();
        let a2 = noop_job();
        let nested = vec![vec![Some(a1.clone())], vec![Some(a2.clone()), Some(a1.clone())]];
        let flat = flatten_dedupe(nested);
        assert_eq!(flat.len(), 2);
    }
}
