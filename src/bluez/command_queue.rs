use std::collections::VecDeque;
use std::future;
use std::time::Instant;

use futures::future::BoxFuture;

use crate::api::characteristic::{Characteristic, CharacteristicWriteType};
use crate::api::descriptor::Descriptor;
use crate::bluez::error::BluezError;

/// What the application asked for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operation {
    ReadCharacteristic {
        characteristic: Characteristic,
    },
    WriteCharacteristic {
        characteristic: Characteristic,
        value: Vec<u8>,
        write_type: CharacteristicWriteType,
    },
    SetNotify {
        characteristic: Characteristic,
        enable: bool,
    },
    ReadDescriptor {
        descriptor: Descriptor,
    },
    WriteDescriptor {
        descriptor: Descriptor,
        value: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct OperationRequest {
    pub operation: Operation,
    /// Object path of the target proxy; completions are matched on it.
    pub path: String,
    pub enqueued_at: Instant,
}

impl OperationRequest {
    pub(crate) fn new(operation: Operation, path: String) -> Self {
        OperationRequest {
            operation,
            path,
            enqueued_at: Instant::now(),
        }
    }
}

/// Bytes read back for reads, empty for everything else.
pub(crate) type OperationResult = Result<Vec<u8>, BluezError>;

struct InFlight {
    request: OperationRequest,
    completion: BoxFuture<'static, OperationResult>,
}

/// FIFO of pending requests with a single in-flight slot.
#[derive(Default)]
pub(crate) struct CommandQueue {
    pending: VecDeque<OperationRequest>,
    in_flight: Option<InFlight>,
}

impl CommandQueue {
    pub(crate) fn enqueue(&mut self, request: OperationRequest) {
        self.pending.push_back(request);
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len() + usize::from(self.is_busy())
    }

    /// Next request to dispatch, `None` while one is in flight.
    pub(crate) fn next_pending(&mut self) -> Option<OperationRequest> {
        if self.is_busy() {
            return None;
        }
        self.pending.pop_front()
    }

    pub(crate) fn start(
        &mut self,
        request: OperationRequest,
        completion: BoxFuture<'static, OperationResult>,
    ) {
        debug_assert!(self.in_flight.is_none());
        self.in_flight = Some(InFlight {
            request,
            completion,
        });
    }

    /// Resolves when the in-flight RPC returns; never resolves while idle.
    pub(crate) async fn next_completion(&mut self) -> Option<(OperationRequest, OperationResult)> {
        let result = match self.in_flight.as_mut() {
            Some(in_flight) => (&mut in_flight.completion).await,
            None => return future::pending().await,
        };
        self.in_flight
            .take()
            .map(|in_flight| (in_flight.request, result))
    }

    /// Cancels the in-flight RPC and empties the queue, in-flight first.
    pub(crate) fn drain(&mut self) -> Vec<OperationRequest> {
        let mut drained: Vec<OperationRequest> = self
            .in_flight
            .take()
            .map(|in_flight| in_flight.request)
            .into_iter()
            .collect();
        drained.extend(self.pending.drain(..));
        drained
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::FutureExt;
    use tokio::time::timeout;
    use uuid::Uuid;

    use super::*;
    use crate::api::characteristic::CharacteristicProperty;

    fn read_request(path: &str) -> OperationRequest {
        let characteristic = Characteristic::new(
            Uuid::from_u128(0x2a35),
            Uuid::from_u128(0x1810),
            [CharacteristicProperty::Read],
        );
        OperationRequest::new(Operation::ReadCharacteristic { characteristic }, path.to_string())
    }

    #[test]
    fn test_one_in_flight_at_a_time() {
        let mut queue = CommandQueue::default();
        queue.enqueue(read_request("a"));
        queue.enqueue(read_request("b"));

        let first = queue.next_pending().unwrap();
        assert_eq!(first.path, "a");
        queue.start(first, future::pending().boxed());

        assert!(queue.next_pending().is_none());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_drain_returns_in_flight_first() {
        let mut queue = CommandQueue::default();
        queue.enqueue(read_request("a"));
        queue.enqueue(read_request("b"));
        queue.enqueue(read_request("c"));
        let first = queue.next_pending().unwrap();
        queue.start(first, future::pending().boxed());

        let paths: Vec<String> = queue.drain().into_iter().map(|request| request.path).collect();
        assert_eq!(paths, vec!["a", "b", "c"]);
        assert!(!queue.is_busy());
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_completion_frees_the_slot() {
        let mut queue = CommandQueue::default();
        queue.enqueue(read_request("a"));
        queue.enqueue(read_request("b"));
        let first = queue.next_pending().unwrap();
        queue.start(first, async { Ok::<_, BluezError>(vec![0x01, 0x02]) }.boxed());

        let (request, result) = queue.next_completion().await.unwrap();
        assert_eq!(request.path, "a");
        assert_eq!(result, Ok(vec![0x01, 0x02]));
        assert_eq!(queue.next_pending().map(|request| request.path), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_idle_queue_never_completes() {
        let mut queue = CommandQueue::default();
        let completion = timeout(Duration::from_millis(20), queue.next_completion()).await;
        assert!(completion.is_err());
    }
}
