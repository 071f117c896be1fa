//! Build helpers: `cargo xtask build-ebpf`, `cargo xtask run -- <livestacks args>`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

const EBPF_PACKAGE: &str = "livestacks-ebpf";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Cross-compile the kernel-side sampler
    BuildEbpf {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
    },
    /// Build the sampler and userspace, then run livestacks under sudo
    Run {
        #[arg(long, default_value = "bpfel-unknown-none")]
        target: String,
        /// Build userspace in release mode
        #[arg(long)]
        release: bool,
        /// Arguments passed to livestacks
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    match Args::parse().command {
        Cmd::BuildEbpf { target } => build_ebpf(&target),
        Cmd::Run { target, release, args } => {
            build_ebpf(&target)?;
            run(release, &args)
        }
    }
}

/// The sampler is always built in release mode: debug builds pull in
/// formatting code the BPF linker rejects.
fn build_ebpf(target: &str) -> Result<()> {
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", EBPF_PACKAGE, "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to spawn cargo for the eBPF build")?;

    if !status.success() {
        bail!("Failed to build {EBPF_PACKAGE} for {target}");
    }

    println!("✓ {EBPF_PACKAGE} built ({target}, release)");
    Ok(())
}

fn run(release: bool, args: &[String]) -> Result<()> {
    let mut build = Command::new("cargo");
    build.args(["build", "--package", "livestacks"]);
    if release {
        build.arg("--release");
    }
    if !build.status().context("Failed to spawn cargo build")?.success() {
        bail!("Failed to build livestacks");
    }

    let profile = if release { "release" } else { "debug" };
    let binary = format!("target/{profile}/livestacks");
    let status = Command::new("sudo")
        .args(["-E", &binary])
        .args(args)
        .status()
        .with_context(|| format!("Failed to run {binary}"))?;

    if !status.success() {
        bail!("livestacks exited with {status}");
    }
    Ok(())
}
