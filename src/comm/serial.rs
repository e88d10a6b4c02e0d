use super::backend::{Communicator, SendRequest};
use crate::error::{VecOpsError, VecOpsErrorKind};
use std::{any::Any, cell::RefCell, collections::VecDeque};

/// The communicator of a single-process run: rank 0 of 1.
///
/// Messages sent to rank 0 are queued in a loop-back mailbox, which keeps the ring code
/// path identical to the distributed one.
#[derive(Default)]
pub struct SerialComm {
    mailbox: RefCell<VecDeque<(usize, Box<dyn Any + Send>)>>,
}

impl SerialComm {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_self(peer: usize) -> Result<(), VecOpsError> {
        if peer != 0 {
            return Err(VecOpsErrorKind::ProtocolInvariant(format!(
                "rank {peer} does not exist in a serial run"
            ))
            .into());
        }
        Ok(())
    }
}

/// Loop-back sends complete immediately.
pub struct SerialRequest;

impl SendRequest for SerialRequest {
    fn wait(self) -> Result<(), VecOpsError> {
        Ok(())
    }
}

impl Communicator for SerialComm {
    type Request = SerialRequest;

    fn rank(&self) -> usize {
        0
    }

    fn num_procs(&self) -> usize {
        1
    }

    fn num_nodes(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), VecOpsError> {
        Ok(())
    }

    fn isend<M: Send + 'static>(
        &self,
        msg: M,
        dest: usize,
        tag: usize,
    ) -> Result<SerialRequest, VecOpsError> {
        Self::check_self(dest)?;
        self.mailbox.borrow_mut().push_back((tag, Box::new(msg)));
        Ok(SerialRequest)
    }

    fn recv<M: Send + 'static>(&self, source: usize, tag: usize) -> Result<M, VecOpsError> {
        Self::check_self(source)?;
        let (found, payload) = self.mailbox.borrow_mut().pop_front().ok_or_else(|| {
            VecOpsError::from(VecOpsErrorKind::Communication(
                "receive on an empty loop-back mailbox would block forever".into(),
            ))
        })?;
        if found != tag {
            return Err(VecOpsErrorKind::ProtocolInvariant(format!(
                "expected tag {tag}, got {found}"
            ))
            .into());
        }
        payload.downcast::<M>().map(|boxed| *boxed).map_err(|_| {
            VecOpsErrorKind::ProtocolInvariant("unexpected payload type".into()).into()
        })
    }

    fn all_gather<M: Clone + Send + 'static>(&self, item: M) -> Result<Vec<M>, VecOpsError> {
        Ok(vec![item])
    }
}
