//! Bounded manager for many in-flight nonblocking operations.
//!
//! A [`RequestManager`] is a fixed-size multiplexing window: callers submit
//! sends and receives tagged with an arbitrary handle, then call
//! [`poll`](RequestManager::poll) to learn, in bulk, which operations finished.
//! Each poll makes exactly one bulk completion call to the [`Transport`].
//!
//! # Buffers
//!
//! Every submit moves its buffer into the slot, and the buffer comes back in
//! the [`Completion`] (or [`StatusFailure`]) of that operation. A receiver can
//! read a completed inbox and submit it again right away, so streaming any
//! number of messages through `capacity` slots needs only `capacity` buffers.
//! See [`Buffer`] for the accepted buffer types.
//!
//! # Slot layout
//!
//! Request tokens live in a dense array. The occupied slots are always the
//! prefix `[0, len)`, and the handle and buffer at position `i` belong to the
//! token at position `i`. Completed slots are removed by swap-removal in
//! decreasing index order, so the remaining slots keep no particular
//! submission order.
//!
//! # Partial failures
//!
//! When the transport reports that some of the completed operations failed,
//! poll returns [`PollError::Status`] listing each failed operation with its
//! code, description, handle and buffer. Every completed slot is released.
//! The successful completions from that same poll are retained and returned
//! at the front of the next [`poll`](RequestManager::poll) or
//! [`wait`](RequestManager::wait), or by
//! [`take_retained`](RequestManager::take_retained).
//!
//! # Example
//!
//! ```
//! # use ferroreq::{RawStatus, RequestManager, Result, SomeOutcome, Transport, MpiDatatype};
//! # #[derive(Default)]
//! # struct Instant;
//! # impl Transport for Instant {
//! #     type Request = u32;
//! #     unsafe fn start_send<T: MpiDatatype>(&mut self, _: &[T], _: i32, _: i32, r: &mut u32) -> Result<()> { *r = 1; Ok(()) }
//! #     unsafe fn start_recv<T: MpiDatatype>(&mut self, _: &mut [T], _: i32, _: i32, r: &mut u32) -> Result<()> { *r = 1; Ok(()) }
//! #     fn test_some(&mut self, reqs: &mut [u32], idx: &mut [usize], st: &mut [RawStatus]) -> Result<SomeOutcome> {
//! #         for i in 0..reqs.len() { idx[i] = i; st[i] = RawStatus::default(); }
//! #         Ok(SomeOutcome::Completed(reqs.len()))
//! #     }
//! #     fn wait_some(&mut self, reqs: &mut [u32], idx: &mut [usize], st: &mut [RawStatus]) -> Result<SomeOutcome> { self.test_some(reqs, idx, st) }
//! #     fn wait_all(&mut self, _: &mut [u32]) -> Result<()> { Ok(()) }
//! #     fn error_string(&self, _: i32) -> Option<String> { None }
//! # }
//! let mut manager = RequestManager::new(Instant, 8)?;
//! manager.send(vec![1.0f64, 2.0, 3.0], 1, 0, "first block")?;
//!
//! for done in manager.poll().expect("poll failed") {
//!     println!("{} finished: {}", done.handle, done.status);
//!     // The payload is ours again and can be refilled and resent
//!     assert_eq!(done.buffer, [1.0, 2.0, 3.0]);
//! }
//! assert!(manager.is_empty());
//! # Ok::<(), ferroreq::Error>(())
//! ```

use std::fmt;
use std::mem;

use tracing::{debug, trace, warn};

use crate::buffer::{Buffer, BufferMut};
use crate::datatype::MpiDatatype;
use crate::error::{describe_error, Error, Result};
use crate::status::{RawStatus, Status};
use crate::transport::{SomeOutcome, Transport};

/// A completed operation paired with the handle and buffer it was
/// submitted with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<H, B> {
    /// Handle given at submission.
    pub handle: H,
    /// Buffer given at submission. For a receive it holds the message.
    pub buffer: B,
    /// Completion status reported by the transport.
    pub status: Status,
}

/// One operation that completed with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFailure<H, B> {
    /// MPI error code of the operation.
    pub code: i32,
    /// Description of `code`.
    pub message: String,
    /// Handle given at submission.
    pub handle: H,
    /// Buffer given at submission.
    pub buffer: B,
}

/// Every operation that failed in a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusErrors<H, B> {
    failures: Vec<StatusFailure<H, B>>,
    retained: usize,
}

impl<H, B> StatusErrors<H, B> {
    /// The failed operations, in the order the transport reported them.
    pub fn failures(&self) -> &[StatusFailure<H, B>] {
        &self.failures
    }

    /// Consume the record, returning the failed operations.
    pub fn into_failures(self) -> Vec<StatusFailure<H, B>> {
        self.failures
    }

    /// Number of failed operations.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Successful completions held by the manager when this error was raised.
    pub fn retained(&self) -> usize {
        self.retained
    }
}

impl<H: fmt::Debug, B> fmt::Display for StatusErrors<H, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPI status errors: {} errors", self.failures.len())?;
        for failure in &self.failures {
            write!(
                f,
                "\nError {}: {} ({:?})",
                failure.code, failure.message, failure.handle
            )?;
        }
        Ok(())
    }
}

impl<H: fmt::Debug, B: fmt::Debug> std::error::Error for StatusErrors<H, B> {}

/// Error returned by [`RequestManager::poll`] and [`RequestManager::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<H, B> {
    /// The completion check itself failed. No slot was released.
    Mpi(Error),
    /// Some completed operations failed. Every completed slot was released.
    Status(StatusErrors<H, B>),
}

impl<H, B> PollError<H, B> {
    /// The partial-failure record, if this is one.
    pub fn status_errors(&self) -> Option<&StatusErrors<H, B>> {
        match self {
            PollError::Status(errors) => Some(errors),
            PollError::Mpi(_) => None,
        }
    }
}

impl<H, B> From<Error> for PollError<H, B> {
    fn from(err: Error) -> Self {
        PollError::Mpi(err)
    }
}

impl<H: fmt::Debug, B> fmt::Display for PollError<H, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::Mpi(err) => fmt::Display::fmt(err, f),
            PollError::Status(errors) => fmt::Display::fmt(errors, f),
        }
    }
}

impl<H: fmt::Debug + 'static, B: fmt::Debug + 'static> std::error::Error for PollError<H, B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PollError::Mpi(err) => Some(err),
            PollError::Status(errors) => Some(errors),
        }
    }
}

/// A submit that did not start. Hands the handle and buffer back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitError<H, B> {
    /// Why the operation was not started.
    pub error: Error,
    /// Handle given at submission.
    pub handle: H,
    /// Buffer given at submission.
    pub buffer: B,
}

impl<H, B> fmt::Display for SubmitError<H, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<H: fmt::Debug, B: fmt::Debug> std::error::Error for SubmitError<H, B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<H, B> From<SubmitError<H, B>> for Error {
    fn from(err: SubmitError<H, B>) -> Self {
        err.error
    }
}

/// Bookkeeping for one occupied slot, index-aligned with the token array.
struct Entry<H, B> {
    handle: H,
    buffer: B,
}

#[derive(Clone, Copy)]
enum Mode {
    Test,
    Wait,
}

/// Fixed-capacity table of in-flight nonblocking operations.
///
/// `H` is the caller's handle type; the manager stores and returns handles
/// but never inspects them. `B` is the buffer type, owned by the manager
/// while its operation is in flight. Dropping a manager that still has
/// operations in flight blocks until they complete, then drops their buffers.
pub struct RequestManager<H, B, P: Transport> {
    transport: P,
    requests: Box<[P::Request]>,
    entries: Vec<Entry<H, B>>,
    size: usize,
    indices: Box<[usize]>,
    statuses: Box<[RawStatus]>,
    removal_order: Vec<(usize, usize)>,
    retained: Vec<Completion<H, B>>,
}

impl<H, B: Buffer, P: Transport> RequestManager<H, B, P> {
    /// Create a manager with room for `capacity` concurrent operations.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroCapacity`] if `capacity` is 0.
    pub fn new(transport: P, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::ZeroCapacity);
        }
        Ok(RequestManager {
            transport,
            requests: vec![P::Request::default(); capacity].into_boxed_slice(),
            entries: Vec::with_capacity(capacity),
            size: 0,
            indices: vec![0; capacity].into_boxed_slice(),
            statuses: vec![RawStatus::default(); capacity].into_boxed_slice(),
            removal_order: Vec::with_capacity(capacity),
            retained: Vec::new(),
        })
    }

    /// Maximum number of operations in flight.
    pub fn capacity(&self) -> usize {
        self.requests.len()
    }

    /// Number of operations in flight.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Whether no operation is in flight.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether a submit would fail with [`Error::CapacityExceeded`].
    pub fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// Handles of the operations in flight, in slot order.
    pub fn handles(&self) -> impl Iterator<Item = &H> + '_ {
        self.entries.iter().map(|entry| &entry.handle)
    }

    /// Number of successful completions kept back by a partial failure.
    pub fn retained(&self) -> usize {
        self.retained.len()
    }

    /// Take the successful completions kept back by a partial failure.
    pub fn take_retained(&mut self) -> Vec<Completion<H, B>> {
        mem::take(&mut self.retained)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &P {
        &self.transport
    }

    /// Start a nonblocking send of `buffer` to rank `dest`.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityExceeded`] if every slot is occupied, or the error
    /// from the transport. In both cases the manager is unchanged and the
    /// [`SubmitError`] hands `buffer` and `handle` back.
    pub fn send(
        &mut self,
        buffer: B,
        dest: i32,
        tag: i32,
        handle: H,
    ) -> std::result::Result<(), SubmitError<H, B>> {
        let slot = match self.reserve() {
            Ok(slot) => slot,
            Err(error) => return Err(SubmitError { error, handle, buffer }),
        };
        let len = buffer.as_slice().len();
        // SAFETY: the buffer moves into the slot without moving its elements
        // (`Buffer` contract), and Drop waits on every operation still in
        // flight before the slots are dropped.
        let started = unsafe {
            self.transport
                .start_send(buffer.as_slice(), dest, tag, &mut self.requests[slot])
        };
        self.commit(slot, started, handle, buffer)?;
        trace!(slot, dest, tag, len, "send submitted");
        Ok(())
    }

    /// Start a nonblocking receive into `buffer` from rank `source`.
    ///
    /// Use [`ANY_SOURCE`](crate::ANY_SOURCE) and [`ANY_TAG`](crate::ANY_TAG)
    /// as wildcards.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn recv(
        &mut self,
        mut buffer: B,
        source: i32,
        tag: i32,
        handle: H,
    ) -> std::result::Result<(), SubmitError<H, B>>
    where
        B: BufferMut,
    {
        let slot = match self.reserve() {
            Ok(slot) => slot,
            Err(error) => return Err(SubmitError { error, handle, buffer }),
        };
        let len = buffer.as_slice().len();
        // SAFETY: as for `send`. Nothing reads the buffer until its
        // completion hands it back.
        let started = unsafe {
            self.transport
                .start_recv(buffer.as_mut_slice(), source, tag, &mut self.requests[slot])
        };
        self.commit(slot, started, handle, buffer)?;
        trace!(slot, source, tag, len, "recv submitted");
        Ok(())
    }

    /// Check every operation in flight for completion without blocking.
    ///
    /// Returns the completed operations in the order the transport reported
    /// them, preceded by any completions retained from an earlier partial
    /// failure. An empty vector means nothing is ready yet.
    ///
    /// # Errors
    ///
    /// See [`PollError`].
    pub fn poll(&mut self) -> std::result::Result<Vec<Completion<H, B>>, PollError<H, B>> {
        self.complete(Mode::Test)
    }

    /// Like [`poll`](Self::poll), but blocks until at least one operation
    /// completes. Returns immediately when nothing is in flight.
    ///
    /// # Errors
    ///
    /// See [`PollError`].
    pub fn wait(&mut self) -> std::result::Result<Vec<Completion<H, B>>, PollError<H, B>> {
        self.complete(Mode::Wait)
    }

    fn reserve(&self) -> Result<usize> {
        if self.is_full() {
            return Err(Error::CapacityExceeded {
                capacity: self.capacity(),
            });
        }
        Ok(self.size)
    }

    fn commit(
        &mut self,
        slot: usize,
        started: Result<()>,
        handle: H,
        buffer: B,
    ) -> std::result::Result<(), SubmitError<H, B>> {
        if let Err(error) = started {
            self.requests[slot] = P::Request::default();
            return Err(SubmitError { error, handle, buffer });
        }
        debug_assert_eq!(slot, self.entries.len());
        self.entries.push(Entry { handle, buffer });
        self.size += 1;
        Ok(())
    }

    fn complete(
        &mut self,
        mode: Mode,
    ) -> std::result::Result<Vec<Completion<H, B>>, PollError<H, B>> {
        if self.size == 0 {
            return Ok(self.take_retained());
        }

        let size = self.size;
        let requests = &mut self.requests[..size];
        let indices = &mut self.indices[..size];
        let statuses = &mut self.statuses[..size];
        let outcome = match mode {
            Mode::Test => self.transport.test_some(requests, indices, statuses),
            Mode::Wait => self.transport.wait_some(requests, indices, statuses),
        }?;

        let outcount = outcome.count();
        if outcount > size {
            return Err(PollError::Mpi(Error::Internal(format!(
                "transport reported {outcount} completions for {size} requests"
            ))));
        }
        if outcount == 0 {
            return Ok(self.take_retained());
        }

        let resolved = self.remove_completed(outcount);
        debug!(completed = outcount, in_flight = self.size, "requests completed");

        match outcome {
            SomeOutcome::Completed(_) => {
                let mut done = self.take_retained();
                done.extend(resolved);
                Ok(done)
            }
            SomeOutcome::ErrInStatus(_) => {
                let mut failures = Vec::new();
                for completion in resolved {
                    if completion.status.is_success() {
                        self.retained.push(completion);
                    } else {
                        let code = completion.status.error;
                        failures.push(StatusFailure {
                            code,
                            message: self.describe(code),
                            handle: completion.handle,
                            buffer: completion.buffer,
                        });
                    }
                }
                warn!(
                    failed = failures.len(),
                    retained = self.retained.len(),
                    "requests completed with errors"
                );
                Err(PollError::Status(StatusErrors {
                    failures,
                    retained: self.retained.len(),
                }))
            }
        }
    }

    /// Release the slots named by `indices[..outcount]`, returning their
    /// completions in reported order.
    fn remove_completed(&mut self, outcount: usize) -> Vec<Completion<H, B>> {
        let mut order = mem::take(&mut self.removal_order);
        order.clear();
        order.extend((0..outcount).map(|k| (self.indices[k], k)));
        // Highest index first: a swap only ever moves a slot that has
        // already been visited or is not in the batch.
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        let mut resolved: Vec<Option<Completion<H, B>>> = (0..outcount).map(|_| None).collect();
        let mut previous = None;
        for &(index, k) in &order {
            assert_ne!(previous, Some(index), "slot {index} reported complete twice");
            previous = Some(index);
            let entry = self.remove_slot(index);
            resolved[k] = Some(Completion {
                handle: entry.handle,
                buffer: entry.buffer,
                status: Status::new(self.statuses[k], <B::Item as MpiDatatype>::TAG),
            });
        }
        self.removal_order = order;

        resolved.into_iter().flatten().collect()
    }

    /// Swap-remove the slot at `index`.
    ///
    /// # Panics
    ///
    /// If `index` is not an occupied slot.
    fn remove_slot(&mut self, index: usize) -> Entry<H, B> {
        assert!(
            index < self.size,
            "cannot remove slot {index}: only {} slots occupied",
            self.size
        );
        let last = self.size - 1;
        if index != last {
            self.requests[index] = self.requests[last];
        }
        self.requests[last] = P::Request::default();
        self.size = last;
        self.entries.swap_remove(index)
    }

    fn describe(&self, code: i32) -> String {
        describe_error(self.transport.error_string(code), code)
    }
}

impl<H, B, P: Transport> Drop for RequestManager<H, B, P> {
    fn drop(&mut self) {
        if self.size == 0 {
            return;
        }
        // The buffers are dropped once we return, so the operations must be
        // finished first.
        warn!(in_flight = self.size, "dropping request manager, waiting on in-flight requests");
        let size = self.size;
        if let Err(err) = self.transport.wait_all(&mut self.requests[..size]) {
            warn!(error = %err, "waiting on in-flight requests failed");
        }
    }
}

impl<H: fmt::Debug, B, P: Transport> fmt::Debug for RequestManager<H, B, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestManager")
            .field("capacity", &self.requests.len())
            .field("size", &self.size)
            .field("handles", &self.entries.iter().map(|e| &e.handle).collect::<Vec<_>>())
            .field("retained", &self.retained.len())
            .finish_non_exhaustive()
    }
}
