//! Integration tests for RequestManager over an in-process loopback transport.
//!
//! The loopback copies bytes from send buffers into a mailbox and from the
//! mailbox into receive buffers, so these tests move real payloads through
//! the public API without an MPI runtime.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::rc::Rc;

use ferroreq::{
    Error, MpiDatatype, PollError, RawStatus, RequestManager, Result, SomeOutcome, Transport,
    ANY_TAG, SUCCESS,
};

const ERR_TRUNCATE: i32 = 15;
const ERR_REJECTED: i32 = 77;
const ERR_INTERN: i32 = 16;

/// Tag whose sends complete with `ERR_REJECTED`.
const REJECTED_TAG: i32 = 666;

#[derive(Clone, Copy)]
enum Op {
    Send { tag: i32, bytes: usize },
    Recv { ptr: *mut u8, cap: usize, tag: i32 },
}

struct Message {
    tag: i32,
    data: Vec<u8>,
}

/// Single-rank transport: sends complete on the next check, receives
/// complete once a send with a matching tag has been posted.
#[derive(Default)]
struct Loopback {
    next_token: u64,
    ops: HashMap<u64, Op>,
    mailbox: VecDeque<Message>,
    broken: bool,
    checks: usize,
    drained: Rc<Cell<usize>>,
}

impl Loopback {
    fn issue(&mut self, op: Op, request: &mut u64) {
        self.next_token += 1;
        self.ops.insert(self.next_token, op);
        *request = self.next_token;
    }

    fn deliver(&mut self, ptr: *mut u8, cap: usize, tag: i32) -> Option<RawStatus> {
        let pos = self
            .mailbox
            .iter()
            .position(|msg| tag == ANY_TAG || msg.tag == tag)?;
        let msg = self.mailbox.remove(pos)?;
        let len = msg.data.len().min(cap);
        // SAFETY: the manager owns the receive buffer until the operation is
        // reported complete, and moving it does not move its elements.
        unsafe { std::ptr::copy_nonoverlapping(msg.data.as_ptr(), ptr, len) };
        Some(RawStatus {
            source: 0,
            tag: msg.tag,
            error: if msg.data.len() > cap { ERR_TRUNCATE } else { SUCCESS },
            bytes: len as i64,
        })
    }
}

impl Transport for Loopback {
    type Request = u64;

    unsafe fn start_send<T: MpiDatatype>(
        &mut self,
        buf: &[T],
        _dest: i32,
        tag: i32,
        request: &mut u64,
    ) -> Result<()> {
        let bytes = std::mem::size_of_val(buf);
        let data = std::slice::from_raw_parts(buf.as_ptr().cast::<u8>(), bytes).to_vec();
        self.mailbox.push_back(Message { tag, data });
        self.issue(Op::Send { tag, bytes }, request);
        Ok(())
    }

    unsafe fn start_recv<T: MpiDatatype>(
        &mut self,
        buf: &mut [T],
        _source: i32,
        tag: i32,
        request: &mut u64,
    ) -> Result<()> {
        let op = Op::Recv {
            ptr: buf.as_mut_ptr().cast::<u8>(),
            cap: std::mem::size_of_val(buf),
            tag,
        };
        self.issue(op, request);
        Ok(())
    }

    fn test_some(
        &mut self,
        requests: &mut [u64],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome> {
        self.checks += 1;
        if self.broken {
            return Err(Error::from_code(ERR_INTERN, "loopback is broken"));
        }

        let mut n = 0;
        let mut failed = false;
        for (i, token) in requests.iter_mut().enumerate() {
            let key = *token;
            let Some(&op) = self.ops.get(&key) else {
                continue;
            };
            let status = match op {
                Op::Send { tag, bytes } => Some(RawStatus {
                    source: 0,
                    tag,
                    error: if tag == REJECTED_TAG { ERR_REJECTED } else { SUCCESS },
                    bytes: bytes as i64,
                }),
                Op::Recv { ptr, cap, tag } => self.deliver(ptr, cap, tag),
            };
            if let Some(status) = status {
                self.ops.remove(&key);
                *token = 0;
                failed |= status.error != SUCCESS;
                indices[n] = i;
                statuses[n] = status;
                n += 1;
            }
        }

        Ok(if failed {
            SomeOutcome::ErrInStatus(n)
        } else {
            SomeOutcome::Completed(n)
        })
    }

    fn wait_some(
        &mut self,
        requests: &mut [u64],
        indices: &mut [usize],
        statuses: &mut [RawStatus],
    ) -> Result<SomeOutcome> {
        self.test_some(requests, indices, statuses)
    }

    fn wait_all(&mut self, requests: &mut [u64]) -> Result<()> {
        for token in requests.iter_mut() {
            self.ops.remove(&*token);
            *token = 0;
        }
        self.drained.set(self.drained.get() + requests.len());
        Ok(())
    }

    fn error_string(&self, code: i32) -> Option<String> {
        match code {
            ERR_TRUNCATE => Some("Message truncated".to_string()),
            ERR_INTERN => Some("Internal error".to_string()),
            _ => None,
        }
    }
}

fn handle_set<'a, H: Ord + Clone + 'a>(handles: impl Iterator<Item = &'a H>) -> BTreeSet<H> {
    handles.cloned().collect()
}

#[test]
fn test_round_trip_returns_every_handle_once() {
    const PAIRS: usize = 12;
    let payloads: Vec<Vec<u32>> = (0..PAIRS as u32).map(|p| vec![p, p + 1, p + 2, p + 3]).collect();

    let mut manager = RequestManager::new(Loopback::default(), 3).unwrap();
    let mut seen = Vec::new();
    let mut received = vec![Vec::new(); PAIRS];
    let mut submitted = 0;
    let mut rounds = 0;

    while seen.len() < 2 * PAIRS {
        while !manager.is_full() && submitted < 2 * PAIRS {
            // Each receive is followed by the send that satisfies it
            let p = submitted / 2;
            if submitted % 2 == 0 {
                manager.recv(vec![0u32; 4], 0, p as i32, 2 * p).unwrap();
            } else {
                manager.send(payloads[p].clone(), 0, p as i32, 2 * p + 1).unwrap();
            }
            submitted += 1;
        }

        for done in manager.poll().unwrap() {
            assert!(done.status.is_success());
            assert_eq!(done.status.count().unwrap(), 4);
            if done.handle % 2 == 0 {
                received[done.handle / 2] = done.buffer;
            }
            seen.push(done.handle);
        }
        assert_eq!(manager.len(), submitted - seen.len());
        assert!(manager.len() <= manager.capacity());

        rounds += 1;
        assert!(rounds < 1000, "manager stopped making progress");
    }
    assert!(manager.is_empty());

    seen.sort_unstable();
    assert_eq!(seen, (0..2 * PAIRS).collect::<Vec<_>>());
    assert_eq!(received, payloads);
}

#[test]
fn test_recycled_inbox_through_single_slot() {
    let mut manager = RequestManager::new(Loopback::default(), 1).unwrap();
    let mut inbox = vec![0u16; 3];

    for round in 1..=4u16 {
        manager.send(vec![round; 3], 0, 7, "ping").unwrap();
        let sent = manager.poll().unwrap();
        assert_eq!(sent[0].handle, "ping");
        assert_eq!(sent[0].buffer, vec![round; 3]);

        manager.recv(inbox, 0, 7, "inbox").unwrap();
        let mut done = manager.poll().unwrap();
        assert_eq!(done.len(), 1);
        let done = done.remove(0);
        assert_eq!(done.handle, "inbox");
        inbox = done.buffer;

        // The message is readable before the inbox goes back in
        assert_eq!(inbox, vec![round; 3]);
        assert!(manager.is_empty());
    }
}

#[test]
fn test_wildcard_receives_take_messages_in_send_order() {
    let payloads = [vec![1.5f64; 3], vec![2.5f64; 3], vec![3.5f64; 3]];

    let mut manager = RequestManager::new(Loopback::default(), 6).unwrap();
    for i in 0..3 {
        manager.recv(vec![0.0f64; 3], 0, ANY_TAG, format!("inbox-{i}")).unwrap();
    }

    // Nothing has been sent yet
    assert!(manager.poll().unwrap().is_empty());
    assert_eq!(manager.len(), 3);

    for (i, payload) in payloads.iter().enumerate() {
        manager.send(payload.clone(), 0, 10 + i as i32, format!("send-{i}")).unwrap();
    }

    let done = manager.poll().unwrap();
    assert_eq!(done.len(), 6);
    let mut inboxes: Vec<(String, i32, Vec<f64>)> = done
        .into_iter()
        .filter(|c| c.handle.starts_with("inbox"))
        .map(|c| (c.handle, c.status.tag, c.buffer))
        .collect();
    inboxes.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        inboxes,
        vec![
            ("inbox-0".to_string(), 10, payloads[0].clone()),
            ("inbox-1".to_string(), 11, payloads[1].clone()),
            ("inbox-2".to_string(), 12, payloads[2].clone()),
        ]
    );
}

#[test]
fn test_capacity_three_middle_completion() {
    let mut manager = RequestManager::new(Loopback::default(), 3).unwrap();
    manager.recv(vec![0u8; 8], 0, 1, 'A').unwrap();
    manager.send(vec![7u8; 8], 0, 42, 'B').unwrap();
    manager.recv(vec![0u8; 8], 0, 2, 'C').unwrap();
    assert!(manager.is_full());

    // Only the send in slot 1 can complete: nobody posted tags 1 or 2
    let done = manager.poll().unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].handle, 'B');
    assert_eq!(done[0].status.tag, 42);

    assert_eq!(manager.len(), 2);
    assert_eq!(handle_set(manager.handles()), BTreeSet::from(['A', 'C']));

    manager.send(vec![9u8; 8], 0, 43, 'D').unwrap();
    assert!(manager.is_full());
    assert_eq!(handle_set(manager.handles()), BTreeSet::from(['A', 'C', 'D']));
}

#[test]
fn test_capacity_two_partial_failure() {
    let mut manager = RequestManager::new(Loopback::default(), 2).unwrap();
    manager.send(vec![1i64; 2], 0, REJECTED_TAG, "A").unwrap();
    manager.send(vec![2i64; 2], 0, 5, "B").unwrap();

    let errors = match manager.poll() {
        Err(PollError::Status(errors)) => errors,
        other => panic!("expected a partial failure, got {other:?}"),
    };
    assert_eq!(errors.len(), 1);
    let failure = &errors.failures()[0];
    assert_eq!(failure.handle, "A");
    assert_eq!(failure.code, ERR_REJECTED);
    assert_eq!(failure.message, "Unknown MPI error: 77");
    assert_eq!(failure.buffer, vec![1i64; 2]);
    assert_eq!(errors.retained(), 1);

    // Both resolved slots are released
    assert_eq!(manager.len(), 0);

    let retained = manager.take_retained();
    assert_eq!(retained.len(), 1);
    assert_eq!(retained[0].handle, "B");
    assert_eq!(retained[0].status.count().unwrap(), 2);
}

#[test]
fn test_truncated_receive_is_described_by_transport() {
    let mut manager = RequestManager::new(Loopback::default(), 2).unwrap();
    manager.recv(vec![0u32; 4], 0, 3, 0usize).unwrap();
    manager.send(vec![5u32; 6], 0, 3, 1usize).unwrap();

    let errors = match manager.poll() {
        Err(PollError::Status(errors)) => errors,
        other => panic!("expected a partial failure, got {other:?}"),
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.failures()[0].handle, 0);
    assert_eq!(errors.failures()[0].message, "Message truncated");
    assert!(errors.to_string().contains("Message truncated"));

    // What fit is still delivered
    let small = errors.into_failures().remove(0).buffer;
    assert_eq!(small, vec![5, 5, 5, 5]);

    // The retained send leads the next poll
    let next = manager.poll().unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].handle, 1);
    assert!(manager.is_empty());
}

#[test]
fn test_boundary_submit_after_freeing_a_slot() {
    let mut manager = RequestManager::new(Loopback::default(), 2).unwrap();
    manager.recv(vec![0i32; 1], 0, 8, 1).unwrap();
    manager.send(vec![1i32; 1], 0, 9, 2).unwrap();

    let err = manager.send(vec![2i32; 1], 0, 9, 3).unwrap_err();
    assert_eq!(err.error, Error::CapacityExceeded { capacity: 2 });
    assert_eq!(manager.len(), 2);
    assert_eq!(handle_set(manager.handles()), BTreeSet::from([1, 2]));

    let done = manager.poll().unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].handle, 2);

    // Resubmit exactly what the rejected call handed back
    manager.send(err.buffer, 0, 9, err.handle).unwrap();
    assert!(manager.is_full());
    assert_eq!(handle_set(manager.handles()), BTreeSet::from([1, 3]));
}

#[test]
fn test_poll_with_nothing_ready_is_idempotent() {
    let mut manager = RequestManager::new(Loopback::default(), 4).unwrap();
    for i in 0..3 {
        manager.recv(vec![0u8; 2], 0, i as i32, i).unwrap();
    }
    let before: Vec<usize> = manager.handles().copied().collect();

    for _ in 0..3 {
        assert!(manager.poll().unwrap().is_empty());
        assert_eq!(manager.len(), 3);
        assert_eq!(manager.handles().copied().collect::<Vec<_>>(), before);
    }
}

#[test]
fn test_borrowed_slices_can_be_submitted() {
    let mut inbox = [0u8; 4];
    let mut payload = [3u8; 4];
    {
        let mut manager = RequestManager::new(Loopback::default(), 2).unwrap();
        manager.recv(&mut inbox[..], 0, 4, "in").unwrap();
        manager.send(&mut payload[..], 0, 4, "out").unwrap();

        let done = manager.poll().unwrap();
        assert_eq!(done.len(), 2);
        assert_eq!(manager.len(), 0);
    }
    assert_eq!(inbox, [3; 4]);
}

#[test]
fn test_uniform_failure_leaves_slots_alone() {
    let transport = Loopback {
        broken: true,
        ..Default::default()
    };
    let mut manager = RequestManager::new(transport, 2).unwrap();
    manager.send(vec![1u64; 4], 0, 1, "only").unwrap();

    match manager.poll() {
        Err(PollError::Mpi(err)) => {
            assert_eq!(err.code(), Some(ERR_INTERN));
            assert_eq!(err.to_string(), "MPI error 16: loopback is broken");
        }
        other => panic!("expected a uniform failure, got {other:?}"),
    }
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.handles().collect::<Vec<_>>(), vec![&"only"]);
    assert_eq!(manager.transport().checks, 1);
}

#[test]
fn test_drop_drains_in_flight_operations() {
    let drained = Rc::new(Cell::new(0));
    {
        let transport = Loopback {
            drained: Rc::clone(&drained),
            ..Default::default()
        };
        let mut manager = RequestManager::new(transport, 3).unwrap();
        for i in 0..3 {
            manager.recv(vec![0u8; 4], 0, i as i32, i).unwrap();
        }
        assert!(manager.poll().unwrap().is_empty());
    }
    assert_eq!(drained.get(), 3);
}

#[test]
fn test_handles_track_model_under_mixed_traffic() {
    const STEPS: usize = 300;

    let mut manager = RequestManager::new(Loopback::default(), 5).unwrap();
    let mut model = BTreeSet::new();
    let mut next_handle = 0u32;
    let mut seed = 0x2545_f491_u32;

    for step in 0..STEPS {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let roll = (seed >> 16) % 4;
        // Four tags keep some receives waiting and some sends unmatched
        let tag = ((seed >> 8) % 4) as i32;

        let submitted = match roll {
            0 => manager.send(vec![step as u8; 3], 0, tag, next_handle),
            1 => manager.recv(vec![0u8; 3], 0, tag, next_handle),
            _ => {
                for done in manager.poll().unwrap() {
                    assert!(model.remove(&done.handle), "handle {} returned twice", done.handle);
                }
                assert_eq!(handle_set(manager.handles()), model);
                continue;
            }
        };

        match submitted {
            Ok(()) => {
                assert!(model.insert(next_handle));
            }
            Err(err) => {
                assert_eq!(err.error, Error::CapacityExceeded { capacity: 5 });
                assert_eq!(err.handle, next_handle);
                assert_eq!(model.len(), 5);
            }
        }
        next_handle += 1;

        assert_eq!(manager.len(), model.len());
        assert!(manager.len() <= manager.capacity());
        assert_eq!(handle_set(manager.handles()), model);
    }
}
