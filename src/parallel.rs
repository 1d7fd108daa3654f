//! Workers and the messaging between them.
//!
//! The search may run in several workers, each exploring its own share of the
//! random sample sets. Workers share no state; the only communication is
//! gathering values to one worker and broadcasting a value from it, both
//! behind the [`Communicator`] trait. Both operations are blocking barriers:
//! every worker of the group must take part.
//!
//! [`SingleProcess`] is the communicator of a lone worker and needs no
//! messaging at all. [`LocalCommunicator`] connects workers running on threads
//! of one process.
//!
//! ```rust
//! use srom_opt::parallel::{Communicator, LocalCommunicator};
//!
//! let group = LocalCommunicator::group(3);
//!
//! let sums = std::thread::scope(|s| {
//!     let handles = group
//!         .into_iter()
//!         .map(|comm| {
//!             s.spawn(move || {
//!                 let gathered = comm.gather(comm.rank() + 1, 0).unwrap();
//!                 let sum = gathered.map(|values| values.iter().sum::<usize>()).unwrap_or(0);
//!                 comm.broadcast(sum, 0).unwrap()
//!             })
//!         })
//!         .collect::<Vec<_>>();
//!
//!     handles
//!         .into_iter()
//!         .map(|handle| handle.join().unwrap())
//!         .collect::<Vec<usize>>()
//! });
//!
//! assert_eq!(sums, vec![6, 6, 6]);
//! ```

use std::{
    any::Any,
    sync::mpsc::{channel, Receiver, Sender},
};

use log::trace;
use thiserror::Error;

/// Rank of the worker which collects the results and distributes the global
/// optimum.
pub const COORDINATOR: usize = 0;

/// Error of the messaging layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommError {
    /// The worker of given rank left the group.
    #[error("worker {0} disconnected")]
    Disconnected(usize),
    /// The worker of given rank sent a value of unexpected type.
    #[error("unexpected message from worker {0}")]
    UnexpectedMessage(usize),
    /// The root rank is not in the group.
    #[error("root {root} is out of group of size {size}")]
    InvalidRoot {
        /// The requested root.
        root: usize,
        /// Size of the group.
        size: usize,
    },
}

/// Collective communication among a group of workers.
pub trait Communicator {
    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Rank of this worker, in `0..size`.
    fn rank(&self) -> usize;

    /// Collects `value` of every worker in the `root` worker.
    ///
    /// The root gets the values ordered by rank, all other workers get
    /// `None`.
    fn gather<T: Send + 'static>(&self, value: T, root: usize) -> Result<Option<Vec<T>>, CommError>;

    /// Distributes `value` of the `root` worker to all workers. Values passed
    /// by other workers are ignored.
    fn broadcast<T: Clone + Send + 'static>(&self, value: T, root: usize) -> Result<T, CommError>;
}

/// Communicator of a worker that runs alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn gather<T: Send + 'static>(&self, value: T, root: usize) -> Result<Option<Vec<T>>, CommError> {
        check_root(root, 1)?;
        Ok(Some(vec![value]))
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: T, root: usize) -> Result<T, CommError> {
        check_root(root, 1)?;
        Ok(value)
    }
}

struct Envelope {
    from: usize,
    payload: Box<dyn Any + Send>,
}

/// Communicator of a worker running on a thread, connected to the other
/// workers of its group by channels.
pub struct LocalCommunicator {
    rank: usize,
    peers: Vec<Option<Sender<Envelope>>>,
    inbox: Receiver<Envelope>,
}

impl LocalCommunicator {
    /// Creates a group of `size` connected communicators. The communicator at
    /// index `i` has rank `i` and is meant to be moved to its own thread.
    pub fn group(size: usize) -> Vec<Self> {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();

        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| {
                let peers = senders
                    .iter()
                    .enumerate()
                    .map(|(other, sender)| (other != rank).then(|| sender.clone()))
                    .collect();

                Self { rank, peers, inbox }
            })
            .collect()
    }

    fn send<T: Send + 'static>(&self, to: usize, value: T) -> Result<(), CommError> {
        let envelope = Envelope {
            from: self.rank,
            payload: Box::new(value),
        };

        match &self.peers[to] {
            Some(peer) => peer.send(envelope).map_err(|_| CommError::Disconnected(to)),
            None => Err(CommError::UnexpectedMessage(self.rank)),
        }
    }

    fn recv<T: Send + 'static>(&self) -> Result<(usize, T), CommError> {
        // All peers dropping their senders means nobody is left to talk to.
        let Envelope { from, payload } = self
            .inbox
            .recv()
            .map_err(|_| CommError::Disconnected(self.rank))?;

        let value = payload
            .downcast::<T>()
            .map_err(|_| CommError::UnexpectedMessage(from))?;

        Ok((from, *value))
    }
}

impl Communicator for LocalCommunicator {
    fn size(&self) -> usize {
        self.peers.len()
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn gather<T: Send + 'static>(&self, value: T, root: usize) -> Result<Option<Vec<T>>, CommError> {
        check_root(root, self.size())?;

        if self.rank != root {
            trace!("worker {} sends to {}", self.rank, root);
            self.send(root, value)?;
            return Ok(None);
        }

        let mut slots = (0..self.size()).map(|_| None).collect::<Vec<_>>();
        slots[root] = Some(value);

        for _ in 1..self.size() {
            let (from, value) = self.recv::<T>()?;

            if slots[from].replace(value).is_some() {
                return Err(CommError::UnexpectedMessage(from));
            }

            trace!("worker {} received from {}", self.rank, from);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .map(Some)
            .ok_or(CommError::UnexpectedMessage(root))
    }

    fn broadcast<T: Clone + Send + 'static>(&self, value: T, root: usize) -> Result<T, CommError> {
        check_root(root, self.size())?;

        if self.rank == root {
            for to in (0..self.size()).filter(|to| *to != root) {
                self.send(to, value.clone())?;
            }

            Ok(value)
        } else {
            match self.recv::<T>()? {
                (from, value) if from == root => Ok(value),
                (from, _) => Err(CommError::UnexpectedMessage(from)),
            }
        }
    }
}

fn check_root(root: usize, size: usize) -> Result<(), CommError> {
    if root < size {
        Ok(())
    } else {
        Err(CommError::InvalidRoot { root, size })
    }
}

/// Number of workers and the rank of this one, fixed for the lifetime of an
/// [`Optimizer`](crate::Optimizer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelContext {
    worker_count: usize,
    worker_rank: usize,
}

impl ParallelContext {
    /// Context of a lone worker.
    pub fn single() -> Self {
        Self {
            worker_count: 1,
            worker_rank: 0,
        }
    }

    /// Context of the worker that owns the communicator.
    pub fn from_communicator<C: Communicator>(comm: &C) -> Self {
        Self {
            worker_count: comm.size().max(1),
            worker_rank: comm.rank(),
        }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Rank of this worker.
    pub fn worker_rank(&self) -> usize {
        self.worker_rank
    }

    /// Returns `true` if there is only one worker.
    pub fn is_single(&self) -> bool {
        self.worker_count == 1
    }

    /// Returns `true` for the worker of rank [`COORDINATOR`].
    pub fn is_coordinator(&self) -> bool {
        self.worker_rank == COORDINATOR
    }

    /// Distributes `total` tasks among the workers.
    pub fn split(&self, total: usize) -> WorkSplit {
        WorkSplit {
            per_worker: total / self.worker_count,
            total,
            workers: self.worker_count,
        }
    }
}

impl Default for ParallelContext {
    fn default() -> Self {
        Self::single()
    }
}

/// Even share of tasks per worker. Tasks that cannot be distributed evenly
/// are not run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkSplit {
    /// Number of tasks run by every worker.
    pub per_worker: usize,
    /// Number of requested tasks.
    pub total: usize,
    /// Number of workers.
    pub workers: usize,
}

impl WorkSplit {
    /// Returns `true` if all requested tasks are run.
    pub fn is_even(&self) -> bool {
        self.remainder() == 0
    }

    /// Number of requested tasks that are not run.
    pub fn remainder(&self) -> usize {
        self.total - self.per_worker * self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    fn on_threads<R, W>(size: usize, work: W) -> Vec<R>
    where
        R: Send,
        W: Fn(LocalCommunicator) -> R + Sync,
    {
        let work = &work;

        thread::scope(|s| {
            let handles = LocalCommunicator::group(size)
                .into_iter()
                .map(|comm| s.spawn(move || work(comm)))
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect()
        })
    }

    #[test]
    fn single_process() {
        let comm = SingleProcess;

        assert_eq!(comm.gather("a", 0).unwrap(), Some(vec!["a"]));
        assert_eq!(comm.broadcast(5, 0).unwrap(), 5);
        assert_eq!(
            comm.gather(1, 1).unwrap_err(),
            CommError::InvalidRoot { root: 1, size: 1 }
        );
    }

    #[test]
    fn gather_orders_by_rank() {
        let results = on_threads(4, |comm| comm.gather(comm.rank() * 10, 2).unwrap());

        assert_eq!(results[2], Some(vec![0, 10, 20, 30]));
        assert!(results
            .iter()
            .enumerate()
            .all(|(rank, result)| rank == 2 || result.is_none()));
    }

    #[test]
    fn broadcast_from_root() {
        let results = on_threads(3, |comm| comm.broadcast(format!("from {}", comm.rank()), 1).unwrap());

        assert_eq!(results, vec!["from 1"; 3]);
    }

    #[test]
    fn gather_then_broadcast_repeatedly() {
        let results = on_threads(3, |comm| {
            (0..5)
                .map(|round| {
                    let max = comm
                        .gather(comm.rank() + round, COORDINATOR)
                        .unwrap()
                        .map(|values| values.into_iter().max().unwrap_or(0))
                        .unwrap_or(0);
                    comm.broadcast(max, COORDINATOR).unwrap()
                })
                .collect::<Vec<_>>()
        });

        assert!(results.iter().all(|rounds| rounds == &vec![2, 3, 4, 5, 6]));
    }

    #[test]
    fn unexpected_type() {
        let results = on_threads(2, |comm| {
            if comm.rank() == 0 {
                comm.gather(1u32, 0).map(|_| ())
            } else {
                comm.gather("one", 0).map(|_| ())
            }
        });

        assert_eq!(results[0], Err(CommError::UnexpectedMessage(1)));
        assert_eq!(results[1], Ok(()));
    }

    #[test]
    fn disconnected_peer() {
        let mut group = LocalCommunicator::group(2);
        let root = group.remove(0);
        drop(group);

        assert_eq!(root.gather(1, 0).unwrap_err(), CommError::Disconnected(0));
    }

    #[test]
    fn context_and_split() {
        let ctx = ParallelContext::single();
        assert!(ctx.is_single() && ctx.is_coordinator());

        let comms = LocalCommunicator::group(2);
        let ctx = ParallelContext::from_communicator(&comms[1]);
        assert_eq!((ctx.worker_count(), ctx.worker_rank()), (2, 1));
        assert!(!ctx.is_coordinator());

        let split = ctx.split(7);
        assert_eq!(split.per_worker, 3);
        assert_eq!(split.remainder(), 1);
        assert!(!split.is_even());

        let split = ParallelContext::from_communicator(&LocalCommunicator::group(8)[0]).split(7);
        assert_eq!(split.per_worker, 0);
        assert_eq!(split.remainder(), 7);
        assert!(ctx.split(8).is_even());
    }
}
