//! Compiles and links the C shim when the `mpi` feature is enabled.
//!
//! MPI flags come from pkg-config (`MPI_PKG_CONFIG`, else the usual package
//! names) or, failing that, from the compiler wrapper (`MPICC`, else
//! `mpicc`). Without the feature the crate is pure Rust.

use std::env;
use std::path::PathBuf;
use std::process::Command;

const PKG_NAMES: [&str; 3] = ["mpich", "ompi", "mpi"];

#[derive(Default)]
struct Flags {
    includes: Vec<PathBuf>,
    lib_dirs: Vec<PathBuf>,
    libs: Vec<String>,
}

fn main() {
    println!("cargo:rerun-if-changed=csrc/ferroreq.c");
    println!("cargo:rerun-if-changed=csrc/ferroreq.h");
    println!("cargo:rerun-if-env-changed=MPI_PKG_CONFIG");
    println!("cargo:rerun-if-env-changed=MPICC");

    if env::var_os("CARGO_FEATURE_MPI").is_none() {
        return;
    }

    let Some(flags) = from_pkg_config().or_else(from_wrapper) else {
        panic!(
            "the `mpi` feature needs an MPI installation: set MPI_PKG_CONFIG to its \
             pkg-config name, or put its compiler wrapper on PATH (or in MPICC)"
        );
    };

    cc::Build::new()
        .file("csrc/ferroreq.c")
        .include("csrc")
        .includes(&flags.includes)
        .flag_if_supported("-std=c11")
        .warnings(true)
        .extra_warnings(true)
        .compile("ferroreq");

    for dir in &flags.lib_dirs {
        println!("cargo:rustc-link-search=native={}", dir.display());
        // run against the libmpi that was linked
        println!("cargo:rustc-link-arg=-Wl,-rpath,{}", dir.display());
    }
    for lib in &flags.libs {
        println!("cargo:rustc-link-lib={lib}");
    }
}

fn from_pkg_config() -> Option<Flags> {
    let names = match env::var("MPI_PKG_CONFIG") {
        Ok(name) => vec![name],
        Err(_) => PKG_NAMES.iter().map(|n| n.to_string()).collect(),
    };
    names.iter().find_map(|name| {
        let lib = pkg_config::Config::new()
            .cargo_metadata(false)
            .probe(name)
            .ok()?;
        eprintln!("using MPI from pkg-config package {name}");
        Some(Flags {
            includes: lib.include_paths,
            lib_dirs: lib.link_paths,
            libs: lib.libs,
        })
    })
}

fn from_wrapper() -> Option<Flags> {
    let wrapper = env::var("MPICC").unwrap_or_else(|_| "mpicc".into());
    // MPICH answers to -show, Open MPI to -showme
    let output = ["-show", "-showme"].iter().find_map(|flag| {
        let out = Command::new(&wrapper).arg(flag).output().ok()?;
        out.status.success().then_some(out.stdout)
    })?;

    let mut flags = Flags::default();
    for word in String::from_utf8_lossy(&output).split_whitespace() {
        if let Some(dir) = word.strip_prefix("-I") {
            flags.includes.push(dir.into());
        } else if let Some(dir) = word.strip_prefix("-L") {
            flags.lib_dirs.push(dir.into());
        } else if let Some(lib) = word.strip_prefix("-l") {
            flags.libs.push(lib.into());
        }
    }
    if flags.libs.is_empty() {
        flags.libs.push("mpi".into());
    }
    Some(flags)
}
