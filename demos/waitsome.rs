//! Many nonblocking receives completed with the bulk helpers.
//!
//! Rank 0 posts `NMSGS` sends and completes them with `wait_all`. Rank 1
//! posts `NMSGS` receives and drains them first with `wait_any`, then with
//! `wait_some`.
//!
//! Run with: mpiexec -n 2 cargo run --features mpi --example waitsome

use ferroreq::{Communicator, Mpi, Request, Result};

const MSG: &[u8] = b"hello";
const NMSGS: usize = 10;

fn send_batch(world: &Communicator) -> Result<()> {
    let mut requests = (0..NMSGS)
        .map(|_| world.isend(MSG, 1, 0))
        .collect::<Result<Vec<_>>>()?;
    let statuses = Request::wait_all(&mut requests)?;
    println!("0 wait_all finished ({} statuses)", statuses.len());
    Ok(())
}

fn main() -> Result<()> {
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

    // ============================================================
    // Round 1: wait_any
    // ============================================================
    match rank {
        0 => send_batch(&world)?,
        1 => {
            let mut bufs = vec![[0u8; 10]; NMSGS];
            {
                let mut requests = bufs
                    .iter_mut()
                    .map(|buf| world.irecv(buf, 0, 0))
                    .collect::<Result<Vec<_>>>()?;
                for _ in 0..NMSGS {
                    if let Some((i, status)) = Request::wait_any(&mut requests)? {
                        println!("{i} {status}");
                    }
                }
                assert!(requests.iter().all(Request::is_completed));
            }
            assert!(bufs.iter().all(|buf| &buf[..MSG.len()] == MSG));
            println!("✓ wait_any drained {NMSGS} receives");
        }
        _ => {}
    }

    world.barrier()?;

    // ============================================================
    // Round 2: wait_some
    // ============================================================
    match rank {
        0 => send_batch(&world)?,
        1 => {
            let mut bufs = vec![[0u8; 10]; NMSGS];
            let mut rounds = 0;
            {
                let mut requests = bufs
                    .iter_mut()
                    .map(|buf| world.irecv(buf, 0, 0))
                    .collect::<Result<Vec<_>>>()?;
                let mut finished = 0;
                while finished < NMSGS {
                    let completed = Request::wait_some(&mut requests)?;
                    for (i, status) in &completed {
                        println!("{i} {status}");
                    }
                    finished += completed.len();
                    rounds += 1;
                }
            }
            assert!(bufs.iter().all(|buf| &buf[..MSG.len()] == MSG));
            println!("✓ wait_some drained {NMSGS} receives in {rounds} rounds");
        }
        _ => {}
    }

    world.barrier()?;
    Ok(())
}
