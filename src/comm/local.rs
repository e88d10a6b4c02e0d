use super::backend::{Communicator, SendRequest};
use crate::error::{VecOpsError, VecOpsErrorKind};
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use std::{
    any::Any,
    fmt,
    sync::{Arc, Barrier, Mutex},
    thread,
};

/// A message in flight between two workers.
struct Envelope {
    tag: usize,
    payload: Box<dyn Any + Send>,
    /// Signalled by the receiver once the payload has been taken.
    ack: Sender<()>,
}

type GatherBoard = Arc<Mutex<Vec<Option<Box<dyn Any + Send>>>>>;

/// An in-process SPMD world: one worker thread per rank.
///
/// Every ordered pair of ranks gets its own `crossbeam` channel, so messages between two
/// ranks arrive in the order they were sent. All ranks share one barrier and one board for
/// collectives.
pub struct LocalWorld;

impl LocalWorld {
    /// Builds the communicators of a world with `num_procs` ranks spread over `num_nodes`
    /// nodes. Element `r` of the result belongs to rank `r`.
    ///
    /// # Errors
    /// Returns a configuration error if either count is zero or if there are more nodes
    /// than processes.
    pub fn communicators(
        num_procs: usize,
        num_nodes: usize,
    ) -> Result<Vec<LocalComm>, VecOpsError> {
        if num_procs == 0 || num_nodes == 0 || num_nodes > num_procs {
            return Err(VecOpsErrorKind::InvalidConfig(format!(
                "cannot build a world of {num_procs} procs on {num_nodes} nodes"
            ))
            .into());
        }

        // links[src][dst] carries messages from `src` to `dst`.
        let links: Vec<Vec<(Sender<Envelope>, Receiver<Envelope>)>> = (0..num_procs)
            .map(|_| (0..num_procs).map(|_| unbounded()).collect())
            .collect();
        let barrier = Arc::new(Barrier::new(num_procs));
        let board: GatherBoard = Arc::new(Mutex::new((0..num_procs).map(|_| None).collect()));

        Ok((0..num_procs)
            .map(|rank| LocalComm {
                rank,
                num_procs,
                num_nodes,
                outboxes: (0..num_procs)
                    .map(|dest| links[rank][dest].0.clone())
                    .collect(),
                inboxes: (0..num_procs)
                    .map(|source| links[source][rank].1.clone())
                    .collect(),
                barrier: Arc::clone(&barrier),
                board: Arc::clone(&board),
            })
            .collect())
    }

    /// Runs `worker` once per rank, each on its own thread, and returns the results in rank
    /// order.
    ///
    /// A panic on any worker is resumed on the calling thread.
    pub fn run<R, F>(num_procs: usize, num_nodes: usize, worker: F) -> Result<Vec<R>, VecOpsError>
    where
        R: Send,
        F: Fn(LocalComm) -> R + Sync,
    {
        let comms = Self::communicators(num_procs, num_nodes)?;
        let worker = &worker;
        Ok(thread::scope(|scope| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| scope.spawn(move || worker(comm)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
                })
                .collect()
        }))
    }
}

/// The communicator of one rank in a [`LocalWorld`].
pub struct LocalComm {
    rank: usize,
    num_procs: usize,
    num_nodes: usize,
    outboxes: Vec<Sender<Envelope>>,
    inboxes: Vec<Receiver<Envelope>>,
    barrier: Arc<Barrier>,
    board: GatherBoard,
}

impl fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("num_procs", &self.num_procs)
            .field("num_nodes", &self.num_nodes)
            .finish_non_exhaustive()
    }
}

/// A pending send of a [`LocalComm`].
pub struct LocalRequest {
    ack: Receiver<()>,
    dest: usize,
}

impl SendRequest for LocalRequest {
    fn wait(self) -> Result<(), VecOpsError> {
        self.ack.recv().map_err(|_| {
            VecOpsErrorKind::Communication(format!(
                "rank {} dropped a message without receiving it",
                self.dest
            ))
            .into()
        })
    }
}

impl LocalComm {
    fn check_peer(&self, peer: usize) -> Result<(), VecOpsError> {
        if peer >= self.num_procs {
            return Err(VecOpsErrorKind::ProtocolInvariant(format!(
                "rank {peer} is outside a world of {} procs",
                self.num_procs
            ))
            .into());
        }
        Ok(())
    }

    fn poisoned() -> VecOpsError {
        VecOpsErrorKind::Communication("collective state poisoned by a failed worker".into())
            .into()
    }
}

impl Communicator for LocalComm {
    type Request = LocalRequest;

    fn rank(&self) -> usize {
        self.rank
    }

    fn num_procs(&self) -> usize {
        self.num_procs
    }

    fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    fn barrier(&self) -> Result<(), VecOpsError> {
        self.barrier.wait();
        Ok(())
    }

    fn isend<M: Send + 'static>(
        &self,
        msg: M,
        dest: usize,
        tag: usize,
    ) -> Result<LocalRequest, VecOpsError> {
        self.check_peer(dest)?;
        let (ack_tx, ack_rx) = bounded(1);
        self.outboxes[dest]
            .send(Envelope {
                tag,
                payload: Box::new(msg),
                ack: ack_tx,
            })
            .map_err(|_| {
                VecOpsError::from(VecOpsErrorKind::Communication(format!(
                    "rank {dest} is no longer listening"
                )))
            })?;
        Ok(LocalRequest { ack: ack_rx, dest })
    }

    fn recv<M: Send + 'static>(&self, source: usize, tag: usize) -> Result<M, VecOpsError> {
        self.check_peer(source)?;
        let envelope = self.inboxes[source].recv().map_err(|_| {
            VecOpsError::from(VecOpsErrorKind::Communication(format!(
                "rank {source} disconnected"
            )))
        })?;
        if envelope.tag != tag {
            return Err(VecOpsErrorKind::ProtocolInvariant(format!(
                "rank {} expected tag {tag} from rank {source}, got {}",
                self.rank, envelope.tag
            ))
            .into());
        }
        // The sender may legitimately have dropped its request without waiting.
        let _ = envelope.ack.send(());
        envelope.payload.downcast::<M>().map(|boxed| *boxed).map_err(|_| {
            VecOpsErrorKind::ProtocolInvariant(format!(
                "rank {} received an unexpected payload type from rank {source}",
                self.rank
            ))
            .into()
        })
    }

    fn all_gather<M: Clone + Send + 'static>(&self, item: M) -> Result<Vec<M>, VecOpsError> {
        {
            let mut board = self.board.lock().map_err(|_| Self::poisoned())?;
            board[self.rank] = Some(Box::new(item));
        }
        self.barrier.wait();

        let gathered = {
            let board = self.board.lock().map_err(|_| Self::poisoned())?;
            board
                .iter()
                .enumerate()
                .map(|(rank, slot)| {
                    slot.as_ref()
                        .and_then(|boxed| boxed.downcast_ref::<M>())
                        .cloned()
                        .ok_or_else(|| {
                            VecOpsError::from(VecOpsErrorKind::ProtocolInvariant(format!(
                                "rank {rank} contributed no item of the expected type"
                            )))
                        })
                })
                .collect::<Result<Vec<M>, _>>()
        };
        self.barrier.wait();

        // Every rank has read the board; only now may the own slot be reused.
        let mut board = self.board.lock().map_err(|_| Self::poisoned())?;
        board[self.rank] = None;
        gathered
    }
}
