//! Sequence entity module
//!
//! A `Sequence` is a construction-time helper, not a DAG node in its own
//! right: it links an ordered list of jobs into a linear chain and forwards
//! external prerequisites to the head. It has no runtime state and does not
//! implement `JobBody`.

use std::sync::{Arc, Mutex};

use crate::application::scheduler::Scheduler;
use crate::error::ConstructionError;

use super::job::Job;
use super::requirement::{flatten_dedupe, IntoRequirement};

/// Options accepted by `Sequence::new`, mirroring the source's
/// `Sequence(*jobs, required=, scheduler=)`.
pub struct SequenceOptions {
    pub(crate) required: Vec<Job>,
    pub(crate) scheduler: Option<Scheduler>,
}

impl SequenceOptions {
    pub fn new() -> Self {
        Self { required: Vec::new(), scheduler: None }
    }

    pub fn required(mut self, required: impl IntoRequirement) -> Self {
        self.required = flatten_dedupe(required);
        self
    }

    pub fn scheduler(mut self, scheduler: &Scheduler) -> Self {
        self.scheduler = Some(scheduler.clone());
        self
    }
}

impl Default for SequenceOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct SequenceInner {
    entries: Mutex<Vec<Job>>,
    schedulers: Mutex<Vec<Scheduler>>,
}

/// A chain element: either a bare job, or another sequence contributing its
/// tail. Nested sequences resolve one level before the chain is linked, so
/// a `Sequence` stays a composite over `Job`s rather than a `Job` subclass.
pub trait ChainLink {
    fn chain_link(self) -> Option<Job>;
}

impl ChainLink for Job {
    fn chain_link(self) -> Option<Job> {
        Some(self)
    }
}

impl ChainLink for Sequence {
    fn chain_link(self) -> Option<Job> {
        self.tail()
    }
}

/// A linear chain of jobs sharing external prerequisites/successors.
#[derive(Clone)]
pub struct Sequence(Arc<SequenceInner>);

impl Sequence {
    /// Links `entries[i+1]` to require `entries[i]` for every `i`, and unions
    /// `opts.required` into `entries[0]`'s prerequisites. If a scheduler is
    /// supplied, every entry is registered there immediately. An entry that
    /// is itself an empty `Sequence` contributes nothing, like a null
    /// sentinel.
    pub fn new<L: ChainLink>(entries: impl IntoIterator<Item = L>, opts: SequenceOptions) -> Result<Sequence, ConstructionError> {
        let entries: Vec<Job> = entries.into_iter().filter_map(ChainLink::chain_link).collect();
        for pair in entries.windows(2) {
            pair[1].requires(pair[0].clone())?;
        }
        if let Some(head) = entries.first() {
            head.requires(opts.required)?;
        }
        let schedulers = opts.scheduler.into_iter().collect::<Vec<_>>();
        for scheduler in &schedulers {
            for job in &entries {
                scheduler.add(job.clone());
            }
        }
        Ok(Sequence(Arc::new(SequenceInner {
            entries: Mutex::new(entries),
            schedulers: Mutex::new(schedulers),
        })))
    }

    /// Extends the chain with a new tail, forwarding registration to every
    /// scheduler this sequence is bound to (effect 4).
    pub fn append<L: ChainLink>(&self, job: L) -> Result<(), ConstructionError> {
        let Some(job) = job.chain_link() else { return Ok(()) };
        {
            let entries = self.0.entries.lock().unwrap();
            if let Some(last) = entries.last() {
                job.requires(last.clone())?;
            }
        }
        self.0.entries.lock().unwrap().push(job.clone());
        for scheduler in self.0.schedulers.lock().unwrap().iter() {
            scheduler.add(job.clone());
        }
        Ok(())
    }

    /// Forwards to the head element (effect in source: requiring a sequence
    /// as a whole means requiring its first link).
    pub fn requires(&self, required: impl IntoRequirement) -> Result<(), ConstructionError> {
        let head = self.0.entries.lock().unwrap().first().cloned();
        match head {
            Some(head) => head.requires(required),
            None => Ok(()),
        }
    }

    /// The element that stands in for this sequence when it is used as a
    /// prerequisite by another job or sequence. `None` for an empty
    /// sequence (it contributes nothing).
    pub fn tail(&self) -> Option<Job> {
        self.0.entries.lock().unwrap().last().cloned()
    }

    pub fn entries(&self) -> Vec<Job> {
        self.0.entries.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::body::FnJob;
    use crate::domain::entities::job::JobOptions;
    use pretty_assertions::assert_eq;

    fn noop(label: &str) -> Job {
        Job::new(FnJob::new(|_| async { Ok(Box::new(()) as _) }), JobOptions::new().label(label)).unwrap()
    }

    #[test]
    fn links_entries_in_order() {
        let (a1, a2, a3) = (noop("1"), noop("2"), noop("3"));
        let seq = Sequence::new([a1.clone(), a2.clone(), a3.clone()], SequenceOptions::new()).unwrap();
        assert_eq!(a1.required().len(), 0);
        assert_eq!(a2.required().len(), 1);
        assert_eq!(a3.required().len(), 1);
        assert_eq!(seq.tail(), Some(a3));
    }

    #[test]
    fn forwards_external_requirement_to_head() {
        let (a1, a2, a3) = (noop("1"), noop("2"), noop("3"));
        let seq = Sequence::new([a2.clone(), a3], SequenceOptions::new().required(a1)).unwrap();
        assert_eq!(a2.required().len(), 1);
        let _ = seq;
    }

    #[test]
    fn nested_sequence_contributes_only_tail() {
        let (a1, a2, a3, a4, b1) = (noop("1"), noop("2"), noop("3"), noop("4"), noop("b1"));
        let s1 = Sequence::new([a1, a2], SequenceOptions::new()).unwrap();
        let s2 = Sequence::new([a3, a4.clone()], SequenceOptions::new()).unwrap();
        // a sequence-of-sequences: only s2's tail (a4) becomes b1's prerequisite
        b1.requires(Sequence::new([s1, s2], SequenceOptions::new()).unwrap()).unwrap();
        assert_eq!(b1.required(), std::iter::once(a4.id()).collect());
    }

    #[test]
    fn append_extends_chain() {
        let (a1, a2) = (noop("1"), noop("2"));
        let seq = Sequence::new([a1], SequenceOptions::new()).unwrap();
        seq.append(a2.clone()).unwrap();
        assert_eq!(a2.required().len(), 1);
        assert_eq!(seq.tail(), Some(a2));
    }
}
