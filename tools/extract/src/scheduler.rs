//! Worker pool executing extraction jobs.
//!
//! All workers pull from one shared queue. Architecture jobs are seeded up
//! front; each one, once it has succeeded, enqueues its own file jobs. The
//! calling thread meanwhile runs the collector, which only ever waits on
//! completion signals. When the collector returns, one `Stop` per worker
//! shuts the pool down.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow, bail};
use sysconst_desc::ConstInfo;

use crate::extractor::Extractor;
use crate::job::{ArchJob, ArchSpec, FileJob, FileOutcome};
use crate::source::DefinitionSource;
use crate::verbose::vprintln;

/// A unit of work on the shared queue.
pub enum Job {
    Arch(ArchJob),
    File(FileJob),
    Stop,
}

/// What the workers need to run jobs.
pub struct Workers<'a> {
    pub extractor: &'a dyn Extractor,
    pub source: &'a dyn DefinitionSource,
    /// Number of worker threads; 0 means one per available CPU.
    pub count: usize,
}

impl Workers<'_> {
    fn thread_count(&self) -> usize {
        match self.count {
            0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            n => n,
        }
    }

    /// Run `jobs` on the pool while `collect` drains their results on the
    /// calling thread.
    pub fn execute<R>(&self, jobs: Vec<ArchJob>, collect: impl FnOnce() -> R) -> R {
        let num_workers = self.thread_count();
        vprintln!("  {} architecture jobs, {} workers", jobs.len(), num_workers);

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        for job in jobs {
            let _ = job_tx.send(Job::Arch(job));
        }
        let job_rx = Mutex::new(job_rx);
        let job_rx_ref = &job_rx;

        std::thread::scope(|s| {
            for _ in 0..num_workers {
                let tx = job_tx.clone();
                s.spawn(move || self.worker(job_rx_ref, &tx));
            }
            let _stop = StopGuard { tx: &job_tx, workers: num_workers };
            collect()
        })
    }

    fn worker(&self, rx: &Mutex<Receiver<Job>>, tx: &Sender<Job>) {
        loop {
            let job = match rx.lock().unwrap_or_else(PoisonError::into_inner).recv() {
                Ok(j) => j,
                Err(_) => break,
            };
            match job {
                Job::Arch(job) => self.run_arch(job, tx),
                Job::File(job) => self.run_file(job),
                Job::Stop => break,
            }
        }
    }

    fn run_arch(&self, job: ArchJob, tx: &Sender<Job>) {
        let ArchJob { spec, files, done } = job;
        match guarded(|| self.process_arch(&spec)) {
            Ok(mut infos) => {
                let files: Vec<FileJob> = files
                    .into_iter()
                    .map(|mut file| {
                        file.info = infos.remove(&file.name);
                        file
                    })
                    .collect();
                done.fire(Ok(()));
                for file in files {
                    let _ = tx.send(Job::File(file));
                }
            }
            // The file jobs are dropped unscheduled.
            Err(e) => done.fire(Err(e)),
        }
    }

    fn process_arch(&self, spec: &ArchSpec) -> Result<BTreeMap<String, ConstInfo>> {
        let infos = self.source.const_infos(&spec.target)?;
        self.extractor.prepare_arch(spec)?;
        Ok(infos)
    }

    fn run_file(&self, job: FileJob) {
        let FileJob { spec, input, info, done, .. } = job;
        let outcome = guarded(|| {
            let Some(info) = info else {
                bail!("const info for input file {} is missing", input.display());
            };
            if info.consts.is_empty() {
                return Ok(FileOutcome::Skipped);
            }
            self.extractor
                .process_file(&spec, &info)
                .map(FileOutcome::Resolved)
        });
        done.fire(outcome);
    }
}

/// Run `f`, turning a panic into an error.
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(anyhow!("panicked: {message}"))
        }
    }
}

/// Sends one `Stop` per worker when dropped, also while unwinding.
struct StopGuard<'a> {
    tx: &'a Sender<Job>,
    workers: usize,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        for _ in 0..self.workers {
            let _ = self.tx.send(Job::Stop);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Fake, MemorySource, arch_jobs};

    #[test]
    fn guarded_converts_panics() {
        let err = guarded::<()>(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(err.to_string(), "panicked: boom 1");
        let err = guarded::<()>(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(err.to_string(), "panicked: unknown panic");
        assert_eq!(guarded(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn children_run_after_parent_succeeds() {
        let source = MemorySource::new(&[("a.txt", &["X"]), ("b.txt", &["Y"])]);
        let extractor = Fake::new(&[("amd64", &[("X", 1), ("Y", 2)])]);
        let (jobs, handles) = arch_jobs(&["amd64"], &["a.txt", "b.txt"]);
        let workers = Workers { extractor: &extractor, source: &source, count: 3 };

        let results = workers.execute(jobs, || {
            handles
                .into_iter()
                .map(|h| {
                    h.done.wait().unwrap().unwrap();
                    h.files
                        .into_iter()
                        .map(|f| (f.name, f.done.wait().unwrap().unwrap()))
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        });

        assert_eq!(results[0].len(), 2);
        assert!(matches!(&results[0][0].1, FileOutcome::Resolved(c) if c.consts["X"] == 1));
        assert!(extractor.prepared("amd64"));
    }

    #[test]
    fn missing_info_and_empty_files() {
        let source = MemorySource::new(&[("empty.txt", &[])]);
        let extractor = Fake::new(&[("amd64", &[])]);
        let (jobs, handles) = arch_jobs(&["amd64"], &["empty.txt", "gone.txt"]);
        let workers = Workers { extractor: &extractor, source: &source, count: 1 };

        let outcomes = workers.execute(jobs, || {
            let handle = handles.into_iter().next().unwrap();
            handle.done.wait().unwrap().unwrap();
            handle.files.into_iter().map(|f| f.done.wait().unwrap()).collect::<Vec<_>>()
        });

        assert_eq!(*outcomes[0].as_ref().unwrap(), FileOutcome::Skipped);
        let err = outcomes[1].as_ref().unwrap_err();
        assert_eq!(err.to_string(), "const info for input file sys/test/gone.txt is missing");
        assert_eq!(extractor.processed(), 0);
    }

    #[test]
    fn failed_parent_drops_children() {
        let source = MemorySource::new(&[("a.txt", &["X"])]);
        let extractor = Fake::new(&[("amd64", &[("X", 1)])]).fail_arch("amd64");
        let (jobs, handles) = arch_jobs(&["amd64"], &["a.txt"]);
        let workers = Workers { extractor: &extractor, source: &source, count: 2 };

        let (arch, file) = workers.execute(jobs, || {
            let handle = handles.into_iter().next().unwrap();
            let arch = handle.done.wait().unwrap();
            let file = handle.files.into_iter().next().unwrap().done.wait();
            (arch, file)
        });

        assert!(arch.unwrap_err().to_string().contains("amd64"));
        assert!(file.is_err(), "child must never publish");
        assert_eq!(extractor.processed(), 0);
    }

    #[test]
    fn panicking_backend_is_contained() {
        let source = MemorySource::new(&[("a.txt", &["X"]), ("b.txt", &["PANIC"])]);
        let extractor = Fake::new(&[("amd64", &[("X", 1)])]);
        let (jobs, handles) = arch_jobs(&["amd64"], &["a.txt", "b.txt"]);
        let workers = Workers { extractor: &extractor, source: &source, count: 2 };

        let outcomes = workers.execute(jobs, || {
            let handle = handles.into_iter().next().unwrap();
            handle.done.wait().unwrap().unwrap();
            handle.files.into_iter().map(|f| f.done.wait().unwrap()).collect::<Vec<_>>()
        });

        assert!(outcomes[0].is_ok());
        assert!(outcomes[1].as_ref().unwrap_err().to_string().starts_with("panicked:"));
    }
}
