//! Hello world with blocking point-to-point messaging.
//!
//! Prints rank, size and processor name on every rank, then sends a short
//! greeting from rank 0 to rank 1.
//!
//! Run with: mpiexec -n 2 cargo run --features mpi --example hello

use ferroreq::{Mpi, Result};

const MSG: &[u8] = b"hello";

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mpi = Mpi::init()?;
    let world = mpi.world();

    let rank = world.rank();
    let size = world.size();
    println!("{} {} {}", size, rank, world.processor_name()?);

    world.barrier()?;

    if size < 2 {
        if rank == 0 {
            println!("Need at least 2 processes for the send/recv part");
        }
        return Ok(());
    }

    match rank {
        0 => world.send(MSG, 1, 0)?,
        1 => {
            let mut buf = [0u8; 10];
            let status = world.recv(&mut buf, 0, 0)?;
            println!("{status}");
            assert_eq!(status.count()?, MSG.len() as i64);
            assert_eq!(&buf[..MSG.len()], MSG);
            println!("✓ Rank 1 received {:?}", std::str::from_utf8(&buf[..MSG.len()]));
        }
        _ => {}
    }

    world.barrier()?;
    Ok(())
}
