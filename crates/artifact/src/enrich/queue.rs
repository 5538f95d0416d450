//! A bounded pool of enrichment workers.
//!
//! A fixed set of named worker threads takes jobs from one channel; every
//! job hands its result back through a completion channel of its own. The
//! pool never touches an async runtime, so it can be driven from blocking
//! code and from inside a runtime alike.
//!
//! The `running`/`processed` sets only keep a solution from being submitted
//! twice; the solution lock taken by each transaction is what actually
//! excludes concurrent writers.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use super::{EnrichOutcome, EnrichingError, PartEnricher, WantedParts};
use crate::AbortSignal;
use crate::id::VersionedArtifactIdentification;
use crate::reason::{Reason, ReasonKind};
use crate::resolution::Solution;

type JobResult = std::thread::Result<Result<EnrichOutcome, EnrichingError>>;

//================================================================================================
// Types
//================================================================================================

/// Accepts enrichment jobs and runs them on a fixed number of workers.
pub struct EnrichmentQueue {
    abort: AbortSignal,
    state: Arc<Mutex<QueueState>>,
    jobs: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    pending: Mutex<Vec<(VersionedArtifactIdentification, Receiver<JobResult>)>>,
}

#[derive(Default)]
struct QueueState {
    running: HashSet<VersionedArtifactIdentification>,
    processed: HashSet<VersionedArtifactIdentification>,
}

struct Job {
    solution: Solution,
    walk_scope: String,
    wanted: WantedParts,
    span: tracing::Span,
    done: SyncSender<JobResult>,
}

/// Moves a solution from `running` to `processed` when its job ends, even
/// when the job panicked.
struct Running<'a> {
    state: &'a Mutex<QueueState>,
    id: VersionedArtifactIdentification,
}

/// What a queue did, collected when it is finalized.
#[derive(Clone, Debug, Default)]
pub struct EnrichmentReport {
    /// Solutions whose transaction committed parts.
    pub enriched: Vec<VersionedArtifactIdentification>,
    /// Solutions that had every wanted part already.
    pub unchanged: Vec<VersionedArtifactIdentification>,
    /// Solutions skipped because someone else held their lock.
    pub contended: Vec<VersionedArtifactIdentification>,
    /// Solutions whose transaction rolled back, with the reason.
    pub failed: Vec<(VersionedArtifactIdentification, Reason)>,
}

//================================================================================================
// Impls
//================================================================================================

impl EnrichmentQueue {
    /// Starts a queue running at most `workers` transactions at once.
    ///
    /// Raising `abort` stops new jobs and makes running ones roll back.
    pub fn new(
        enricher: Arc<PartEnricher>,
        workers: usize,
        abort: AbortSignal,
    ) -> std::io::Result<Self> {
        let (jobs, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let state: Arc<Mutex<QueueState>> = Arc::default();

        let workers = (0..workers.max(1))
            .map(|n| {
                let enricher = Arc::clone(&enricher);
                let receiver = Arc::clone(&receiver);
                let state = Arc::clone(&state);
                let abort = abort.clone();
                std::thread::Builder::new()
                    .name(format!("depot-enrich-{n}"))
                    .spawn(move || work(&enricher, &receiver, &state, &abort))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(Self {
            abort,
            state,
            jobs,
            workers,
            pending: Mutex::default(),
        })
    }

    /// The signal shared with every job.
    pub fn abort_signal(&self) -> &AbortSignal {
        &self.abort
    }

    /// Number of solutions whose job has been submitted and not yet ended.
    pub fn in_flight(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .running
            .len()
    }

    /// Submits `solution` unless it is already queued or done. Returns
    /// whether a job was submitted.
    pub fn enrich(&self, solution: Solution, walk_scope: &str, wanted: WantedParts) -> bool {
        if self.abort.is_aborted() {
            return false;
        }
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.processed.contains(&solution.id) || !state.running.insert(solution.id.clone())
            {
                return false;
            }
        }

        let id = solution.id.clone();
        let (done, completion) = mpsc::sync_channel(1);
        let job = Job {
            solution,
            walk_scope: walk_scope.to_owned(),
            wanted,
            span: tracing::Span::current(),
            done,
        };
        if self.jobs.send(job).is_err() {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .running
                .remove(&id);
            tracing::error!(artifact.id = %id, "no enrichment worker left");
            return false;
        }

        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, completion));
        true
    }

    /// Waits for every submitted job and shuts the workers down. Failed jobs
    /// are logged and reported; they never stop the others.
    pub fn finalize_enrichment(self) -> EnrichmentReport {
        let Self {
            jobs,
            workers,
            pending,
            ..
        } = self;
        // workers leave their loop once the queue is drained
        drop(jobs);

        let mut report = EnrichmentReport::default();
        for (id, completion) in pending.into_inner().unwrap_or_else(PoisonError::into_inner) {
            match completion.recv() {
                Ok(Ok(Ok(EnrichOutcome::Enriched(_)))) => report.enriched.push(id),
                Ok(Ok(Ok(EnrichOutcome::Unchanged))) => report.unchanged.push(id),
                Ok(Ok(Ok(EnrichOutcome::Contended))) => report.contended.push(id),
                Ok(Ok(Err(e))) => {
                    tracing::warn!(
                        message = "enrichment failed",
                        artifact.id = %id,
                        error = %e
                    );
                    report.failed.push((id, e.reason()));
                },
                Ok(Err(payload)) => {
                    let cause = panic_message(payload.as_ref());
                    tracing::error!(
                        message = "enrichment worker panicked",
                        artifact.id = %id,
                        panic = %cause
                    );
                    let reason = Reason::new(
                        ReasonKind::EnrichingFailure,
                        format!("enrichment of {id} panicked: {cause}"),
                    );
                    report.failed.push((id, reason));
                },
                Err(_) => {
                    tracing::error!(artifact.id = %id, "enrichment worker died");
                    let reason = Reason::new(
                        ReasonKind::EnrichingFailure,
                        format!("enrichment worker for {id} died"),
                    );
                    report.failed.push((id, reason));
                },
            }
        }

        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("enrichment worker thread panicked");
            }
        }

        tracing::debug!(
            enriched = report.enriched.len(),
            unchanged = report.unchanged.len(),
            contended = report.contended.len(),
            failed = report.failed.len(),
            "enrichment finished"
        );
        report
    }

    /// Raises the abort signal, then waits for the jobs to roll back.
    pub fn stop_enrichment(self) -> EnrichmentReport {
        self.abort.abort();
        self.finalize_enrichment()
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.running.remove(&self.id);
        state.processed.insert(self.id.clone());
    }
}

//================================================================================================
// Functions
//================================================================================================

fn work(
    enricher: &PartEnricher,
    jobs: &Mutex<Receiver<Job>>,
    state: &Mutex<QueueState>,
    abort: &AbortSignal,
) {
    loop {
        let job = jobs.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(job) = job else {
            break;
        };

        let running = Running {
            state,
            id: job.solution.id.clone(),
        };
        let result = {
            let _enter = job.span.enter();
            panic::catch_unwind(AssertUnwindSafe(|| {
                enricher.enrich(&job.solution, &job.walk_scope, &job.wanted, abort)
            }))
        };
        drop(running);
        // nobody waits when the queue was dropped without finalizing
        let _ = job.done.send(result);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::from("unknown panic")
    }
}
