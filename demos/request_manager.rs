//! Streaming messages through a bounded request window.
//!
//! Rank 0 sends `NMSGS` tagged messages and rank 1 receives them, each side
//! keeping at most `WINDOW` operations in flight. Every completion hands its
//! buffer back, and the buffer is reused for the next message.
//!
//! Run with: mpiexec -n 2 cargo run --features mpi --example request_manager
//! Set `RUST_LOG=ferroreq=debug` to see completions as they are collected.

use std::error::Error;

use ferroreq::{Mpi, MpiTransport, RequestManager, ANY_TAG};

const NMSGS: usize = 32;
const WINDOW: usize = 4;
const LEN: usize = 256;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mpi = Mpi::init()?;
    let world = mpi.world();
    let rank = world.rank();

    if world.size() < 2 {
        println!("Need at least 2 processes");
        return Ok(());
    }

    world.barrier()?;

    match rank {
        0 => {
            let mut manager = RequestManager::new(MpiTransport::new(&mpi, world.clone())?, WINDOW)?;
            let mut spare = vec![vec![0.0f64; LEN]; WINDOW];
            let mut next = 0;
            let mut delivered = 0;

            while delivered < NMSGS {
                while next < NMSGS {
                    let Some(mut payload) = spare.pop() else { break };
                    payload.fill(next as f64);
                    manager.send(payload, 1, next as i32, next)?;
                    next += 1;
                }
                for completion in manager.wait()? {
                    spare.push(completion.buffer);
                    delivered += 1;
                }
            }
            println!("✓ Rank 0 delivered {delivered} messages from {WINDOW} buffers");
        }
        1 => {
            let mut manager = RequestManager::new(MpiTransport::new(&mpi, world.clone())?, WINDOW)?;
            let mut spare = vec![vec![0.0f64; LEN]; WINDOW];
            let mut posted = 0;
            let mut done = 0;
            let mut empty_polls = 0u64;

            while done < NMSGS {
                while posted < NMSGS {
                    let Some(inbox) = spare.pop() else { break };
                    manager.recv(inbox, 0, ANY_TAG, posted)?;
                    posted += 1;
                }
                let completions = manager.poll()?;
                if completions.is_empty() {
                    empty_polls += 1;
                    std::hint::spin_loop();
                }
                for completion in completions {
                    println!("inbox {} <- {}", completion.handle, completion.status);
                    // Messages may match inboxes out of order; the tag names the payload
                    let tag = f64::from(completion.status.tag);
                    assert!(completion.buffer.iter().all(|&x| x == tag));
                    spare.push(completion.buffer);
                    done += 1;
                }
            }
            println!("  ({empty_polls} polls found nothing ready)");
            println!("✓ Rank 1 received {NMSGS} messages into {WINDOW} buffers");
        }
        _ => {}
    }

    world.barrier()?;
    Ok(())
}
