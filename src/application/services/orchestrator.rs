//! Orchestration loop service
//!
//! Drives the ready set of a validated job graph to completion, honoring a
//! concurrency window, a global timeout, and the critical/non-critical
//! failure policy. Grounded in the worker-pool pattern found in the wider
//! pack (`tokio::sync::Semaphore` for the window, `tokio::task::JoinSet`
//! for wait-for-any-completion, and `tokio_util::sync::CancellationToken`
//! for cooperative cancellation): the teacher itself has no async
//! orchestration loop to generalize here, so this module is grounded on
//! that pack-wide idiom instead (see DESIGN.md).

use std::collections::{HashMap, HashSet, VecDeque};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::entities::body::{JobFailure, JobOutput};
use crate::domain::entities::job::{Job, JobId, JobState};

/// Bounded grace period the scheduler waits for a cancelled body to notice
/// and return before abandoning it (SPEC_FULL.md §4.5).
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Options accepted by `Scheduler::orchestrate`.
///
/// No event-loop handle is carried forward from the source (REDESIGN FLAGS
/// §9): `orchestrate` is itself an `async fn` that runs on whatever Tokio
/// runtime its caller is already inside.
#[derive(Debug, Clone, Default)]
pub struct OrchestrateOptions {
    pub timeout: Option<Duration>,
    pub window: Option<NonZeroUsize>,
}

impl OrchestrateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn window(mut self, window: NonZeroUsize) -> Self {
        self.window = Some(window);
        self
    }
}

type TaskSet = JoinSet<(JobId, Result<JobOutput, JobFailure>)>;

/// Runs one orchestration over an already rain-checked job set. Returns
/// `true` for clean termination (every non-forever job `Done` without a
/// critical raise), `false` otherwise.
pub async fn run(jobs: Vec<Job>, opts: OrchestrateOptions, verbose: bool) -> bool {
    if jobs.is_empty() {
        return true;
    }

    let non_forever: HashSet<JobId> = jobs.iter().filter(|j| !j.forever()).map(Job::id).collect();

    if non_forever.is_empty() {
        // Tie-break (SPEC_FULL.md §4.4): nothing to wait for, so no forever
        // job is even admitted before the scheduler tears down.
        shutdown_all(&jobs).await;
        return true;
    }

    let ids: HashSet<JobId> = jobs.iter().map(Job::id).collect();
    let by_id: HashMap<JobId, Job> = jobs.iter().map(|j| (j.id(), j.clone())).collect();

    // A forever prerequisite is treated as immediately satisfied: it never
    // reaches `Done` on its own (SPEC_FULL.md §4.4's happens-before clause
    // only orders successors after non-forever prerequisites), so excluding
    // it here is what lets its successors become ready without waiting on
    // cancellation that itself waits on the non-forever frontier.
    let mut unresolved: HashMap<JobId, HashSet<JobId>> = jobs
        .iter()
        .map(|j| (j.id(), j.required().into_iter().filter(|r| ids.contains(r) && non_forever.contains(r)).collect()))
        .collect();

    let mut ready: VecDeque<JobId> = VecDeque::new();
    seed_ready(&mut unresolved, &mut ready);

    let semaphore = opts.window.map(|w| Arc::new(Semaphore::new(w.get())));
    let cancel_root = CancellationToken::new();
    let mut tasks: TaskSet = JoinSet::new();
    let mut done: HashSet<JobId> = HashSet::new();

    let has_deadline = opts.timeout.is_some();
    let deadline = tokio::time::sleep(opts.timeout.unwrap_or_default());
    tokio::pin!(deadline);

    loop {
        admit_ready(&mut ready, &by_id, &semaphore, &cancel_root, &mut tasks, verbose);

        if non_forever.iter().all(|id| done.contains(id)) {
            break;
        }

        if tasks.is_empty() {
            // A validated, acyclic, non-empty non-forever frontier cannot
            // stall with no outstanding work and nothing ready; this is a
            // defensive stop, not a reachable path.
            break;
        }

        tokio::select! {
            _ = &mut deadline, if has_deadline => {
                cancel_root.cancel();
                drain_grace(&mut tasks, DEFAULT_SHUTDOWN_GRACE).await;
                drop(tasks);
                shutdown_all(&jobs).await;
                return false;
            }
            joined = tasks.join_next() => {
                let Some(joined) = joined else { continue };
                let (id, outcome) = match joined {
                    Ok(pair) => pair,
                    Err(join_err) => {
                        tracing::warn!(error = %join_err, "job task panicked before completing");
                        continue;
                    }
                };
                let job = by_id[&id].clone();
                let raised = outcome.is_err();
                job.complete(outcome);
                done.insert(id);
                if verbose {
                    tracing::info!(label = job.label().unwrap_or(""), raised, "job done");
                }

                for reqs in unresolved.values_mut() {
                    reqs.remove(&id);
                }
                let mut newly_ready = Vec::new();
                unresolved.retain(|succ, reqs| {
                    if reqs.is_empty() {
                        newly_ready.push(*succ);
                        false
                    } else {
                        true
                    }
                });
                ready.extend(newly_ready);

                if raised && job.critical() {
                    cancel_root.cancel();
                    drain_grace(&mut tasks, DEFAULT_SHUTDOWN_GRACE).await;
                    drop(tasks);
                    shutdown_all(&jobs).await;
                    return false;
                }
            }
        }
    }

    // Success: cancel any still-running forever jobs, then tear down.
    cancel_root.cancel();
    drain_grace(&mut tasks, DEFAULT_SHUTDOWN_GRACE).await;
    drop(tasks);
    shutdown_all(&jobs).await;
    true
}

fn seed_ready(unresolved: &mut HashMap<JobId, HashSet<JobId>>, ready: &mut VecDeque<JobId>) {
    let seeded: Vec<JobId> = unresolved.iter().filter(|(_, reqs)| reqs.is_empty()).map(|(id, _)| *id).collect();
    for id in seeded {
        unresolved.remove(&id);
        ready.push_back(id);
    }
}

/// Admits ready jobs while the window has capacity (or unconditionally when
/// there is no window), transitioning each through `Scheduled` to `Running`
/// before spawning its body.
fn admit_ready(
    ready: &mut VecDeque<JobId>,
    by_id: &HashMap<JobId, Job>,
    semaphore: &Option<Arc<Semaphore>>,
    cancel_root: &CancellationToken,
    tasks: &mut TaskSet,
    verbose: bool,
) {
    while let Some(&id) = ready.front() {
        let permit = match semaphore {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => break, // window full; admit more once a job completes
            },
            None => None,
        };
        ready.pop_front();

        let job = by_id[&id].clone();
        job.set_state(JobState::Scheduled);
        job.set_state(JobState::Running);
        if verbose {
            tracing::info!(label = job.label().unwrap_or(""), "job starting");
        }

        let cancel = cancel_root.child_token();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = job.run_body(cancel).await;
            (job.id(), outcome)
        });
    }
}

/// Drains completions for up to `grace`, letting cooperatively-cancelled
/// bodies finish on their own; anything still outstanding afterward is
/// abandoned when the caller drops the `JoinSet`.
async fn drain_grace(tasks: &mut TaskSet, grace: Duration) {
    let sleep = tokio::time::sleep(grace);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => break,
            joined = tasks.join_next() => {
                if joined.is_none() {
                    break;
                }
            }
        }
    }
}

/// Invokes `co_shutdown` on every owned job exactly once, regardless of how
/// (or whether) it ran. A panicking hook is logged and otherwise ignored
/// (SPEC_FULL.md §7).
async fn shutdown_all(jobs: &[Job]) {
    let mut set: JoinSet<()> = JoinSet::new();
    for job in jobs.iter().cloned() {
        set.spawn(async move { job.shutdown().await });
    }
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            tracing::warn!(error = %e, "co_shutdown panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{FnJob, JobOptions, TickJob};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn sleeper(millis: u64) -> Job {
        Job::new(
            FnJob::new(move |_| async move {
                tokio::time::sleep(StdDuration::from_millis(millis)).await;
                Ok(Box::new(millis) as JobOutput)
            }),
            JobOptions::new(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_job_set_succeeds_immediately() {
        assert!(run(vec![], OrchestrateOptions::new(), false).await);
    }

    #[tokio::test(start_paused = true)]
    async fn linear_chain_runs_in_order() {
        let a = sleeper(100);
        let b = sleeper(100);
        let c = sleeper(100);
        b.requires(a.clone()).unwrap();
        c.requires(b.clone()).unwrap();
        let jobs = vec![a.clone(), b.clone(), c.clone()];

        let start = tokio::time::Instant::now();
        assert!(run(jobs, OrchestrateOptions::new(), false).await);
        assert_eq!(start.elapsed(), StdDuration::from_millis(300));
        assert!(a.is_done() && b.is_done() && c.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn diamond_runs_longest_branch() {
        let a = sleeper(100);
        let b = sleeper(200);
        let c = sleeper(300);
        let d = sleeper(100);
        b.requires(a.clone()).unwrap();
        c.requires(a.clone()).unwrap();
        d.requires(vec![b.clone(), c.clone()]).unwrap();

        let start = tokio::time::Instant::now();
        assert!(run(vec![a, b, c, d], OrchestrateOptions::new(), false).await);
        assert_eq!(start.elapsed(), StdDuration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_outstanding_work() {
        let a = sleeper(1_000);
        let b = sleeper(2_000);
        let c = sleeper(10_000);
        b.requires(a.clone()).unwrap();
        c.requires(b.clone()).unwrap();

        let ok = run(vec![a.clone(), b.clone(), c.clone()], OrchestrateOptions::new().timeout(StdDuration::from_secs(3)), false).await;
        assert!(!ok);
        assert!(a.is_done());
        assert_eq!(*a.downcast_result::<u64>().unwrap(), 1_000);
        assert!(b.is_done());
        assert_eq!(*b.downcast_result::<u64>().unwrap(), 2_000);
        assert!(!c.is_done());
    }

    fn raiser(after_millis: u64, critical: bool) -> Job {
        Job::new(
            FnJob::new(move |_| async move {
                tokio::time::sleep(StdDuration::from_millis(after_millis)).await;
                Err(Box::<dyn std::error::Error + Send + Sync>::from("boom"))
            }),
            JobOptions::new().critical(critical),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn non_critical_raise_does_not_abort() {
        let a = sleeper(1_000);
        let b = raiser(500, false);
        assert!(run(vec![a.clone(), b.clone()], OrchestrateOptions::new(), false).await);
        assert!(a.is_done());
        assert!(b.raised_exception().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn critical_raise_aborts() {
        let a = sleeper(1_000);
        let b = raiser(500, true);
        let ok = run(vec![a, b.clone()], OrchestrateOptions::new(), false).await;
        assert!(!ok);
        assert!(b.raised_exception().is_some());
        assert_ne!(b.state(), JobState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn forever_job_is_cancelled_not_awaited() {
        let a = sleeper(500);
        let forever = Job::new(TickJob::new("t", StdDuration::from_millis(100)), JobOptions::new().forever(true)).unwrap();
        assert!(run(vec![a.clone(), forever.clone()], OrchestrateOptions::new(), false).await);
        assert!(a.is_done());
        assert!(!forever.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn forever_only_scheduler_succeeds_immediately() {
        let forever = Job::new(TickJob::new("t", StdDuration::from_millis(100)), JobOptions::new().forever(true)).unwrap();
        assert!(run(vec![forever.clone()], OrchestrateOptions::new(), false).await);
        assert!(!forever.is_done());
    }

    /// A successor of a forever job must be admitted without waiting for
    /// that prerequisite to finish (it never does): regression test for the
    /// hang where a forever prerequisite's id was left in the successor's
    /// unresolved set, so the successor never became ready, `non_forever`
    /// never completed, the forever job was never cancelled, and
    /// `tasks.join_next()` blocked forever with no timeout set.
    #[tokio::test(start_paused = true)]
    async fn successor_of_forever_job_is_admitted_without_waiting() {
        let forever = Job::new(TickJob::new("t", StdDuration::from_millis(100)), JobOptions::new().forever(true)).unwrap();
        let successor = sleeper(50);
        successor.requires(forever.clone()).unwrap();

        let ok = tokio::time::timeout(StdDuration::from_secs(5), run(vec![forever.clone(), successor.clone()], OrchestrateOptions::new(), false))
            .await
            .expect("orchestrate must not hang on a forever prerequisite");
        assert!(ok);
        assert!(successor.is_done());
        assert!(!forever.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn window_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let jobs: Vec<Job> = (0..15)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                Job::new(
                    FnJob::new(move |_| async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(StdDuration::from_millis(100)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok(Box::new(()) as JobOutput)
                    }),
                    JobOptions::new(),
                )
                .unwrap()
            })
            .collect();

        let start = tokio::time::Instant::now();
        let window = NonZeroUsize::new(3).unwrap();
        assert!(run(jobs, OrchestrateOptions::new().window(window), false).await);
        assert_eq!(start.elapsed(), StdDuration::from_millis(500));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }
}
