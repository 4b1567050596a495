//! Single nonblocking send and receive.
//!
//! Rank 0 posts an `isend`, rank 1 posts an `irecv` into a larger buffer and
//! checks the received element count.
//!
//! Run with: mpiexec -n 2 cargo run --features mpi --example isend_irecv

use ferroreq::{Mpi, Result};

const MSG: &[u8] = b"hello";

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

    match rank {
        0 => {
            let request = world.isend(MSG, 1, 0)?;
            request.wait()?;
            println!("✓ Rank 0 send completed");
        }
        1 => {
            let mut buf = [0u8; 10];
            let mut polls = 0;
            let status = {
                let mut request = world.irecv(&mut buf, 0, 0)?;
                loop {
                    if let Some(status) = request.test()? {
                        break status;
                    }
                    polls += 1;
                    std::hint::spin_loop();
                }
            };
            println!("  ({polls} polls before completion)");
            assert_eq!(status.count()?, MSG.len() as i64);
            assert_eq!(&buf[..MSG.len()], MSG);
            println!("✓ Rank 1 received {status}");
        }
        _ => {}
    }

    world.barrier()?;
    Ok(())
}
