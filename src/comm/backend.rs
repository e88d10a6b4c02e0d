use crate::error::VecOpsError;
use faer::{
    Mat,
    traits::{ComplexField, math_utils::add},
};

/// Tag for a point-to-point message from `sender` to `receiver` in a world of `num_procs`.
///
/// Distinct ordered pairs get distinct tags, so a receive can verify that the message it
/// matched is the one the protocol expects.
#[inline]
pub fn message_tag(sender: usize, receiver: usize, num_procs: usize) -> usize {
    sender * (num_procs + 1) + receiver
}

/// Handle on an in-flight non-blocking send.
pub trait SendRequest {
    /// Blocks until the matching receive has taken the message.
    fn wait(self) -> Result<(), VecOpsError>;
}

/// The process-topology and messaging primitives the engines are built on.
///
/// Every process of a computation holds one communicator and executes the same control
/// flow. The only points where processes depend on each other are [`Communicator::barrier`],
/// the point-to-point calls, and the collectives.
pub trait Communicator {
    type Request: SendRequest;

    /// Rank of this process, in `0..num_procs()`.
    fn rank(&self) -> usize;

    /// Total number of processes.
    fn num_procs(&self) -> usize;

    /// Number of nodes the processes are spread across.
    fn num_nodes(&self) -> usize;

    /// Blocks until every process has reached the barrier.
    fn barrier(&self) -> Result<(), VecOpsError>;

    /// Starts sending `msg` to `dest` without waiting for it to be received.
    fn isend<M: Send + 'static>(
        &self,
        msg: M,
        dest: usize,
        tag: usize,
    ) -> Result<Self::Request, VecOpsError>;

    /// Blocks until a message from `source` arrives.
    ///
    /// # Errors
    /// Returns a protocol-invariant error if the arriving message carries a different tag
    /// or payload type than expected.
    fn recv<M: Send + 'static>(&self, source: usize, tag: usize) -> Result<M, VecOpsError>;

    /// Collects one item from every process, in rank order, on every process.
    fn all_gather<M: Clone + Send + 'static>(&self, item: M) -> Result<Vec<M>, VecOpsError>;

    fn is_rank_zero(&self) -> bool {
        self.rank() == 0
    }

    fn is_distributed(&self) -> bool {
        self.num_procs() > 1
    }

    /// Sends `msg` to `dest` and receives the replacement from `source`.
    ///
    /// The send is non-blocking, the receive is blocking, and the send is waited on right
    /// after the receive so its buffer is never reused while the peer is still reading it.
    fn exchange<M: Send + 'static>(
        &self,
        msg: M,
        dest: usize,
        source: usize,
    ) -> Result<M, VecOpsError> {
        let num_procs = self.num_procs();
        let rank = self.rank();
        let request = self.isend(msg, dest, message_tag(rank, dest, num_procs))?;
        let received = self.recv(source, message_tag(source, rank, num_procs))?;
        request.wait()?;
        Ok(received)
    }

    /// Element-wise sum of `mat` over all processes, replicated on every process.
    ///
    /// The partial matrices are added in rank order, so every process obtains bit-identical
    /// results.
    fn all_reduce_sum<T>(&self, mat: Mat<T>) -> Result<Mat<T>, VecOpsError>
    where
        T: ComplexField + Send + 'static,
        Mat<T>: Clone,
    {
        if !self.is_distributed() {
            return Ok(mat);
        }
        let (nrows, ncols) = (mat.nrows(), mat.ncols());
        let partials = self.all_gather(mat)?;
        let mut total = Mat::<T>::zeros(nrows, ncols);
        for partial in &partials {
            for j in 0..ncols {
                for i in 0..nrows {
                    total[(i, j)] = add(&total[(i, j)], &partial[(i, j)]);
                }
            }
        }
        Ok(total)
    }
}
