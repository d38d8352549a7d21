use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

const EBPF_TARGET: &str = "bpfel-unknown-none";
const EBPF_CRATE: &str = "fpsxdp-ebpf";
const BINARY: &str = "fpsxdp";

#[derive(Parser, Debug)]
struct Cli {
    #[clap(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Builds the XDP object
    BuildEbpf {
        #[clap(long)]
        debug: bool,
    },
    /// Builds the XDP object and the control plane
    Build {
        #[clap(long)]
        debug: bool,
    },
    /// Checks the host can load and attach the fast path
    Audit,
    /// Builds everything and launches the control plane (needs root)
    Run {
        #[clap(long)]
        debug: bool,
        /// Arguments passed through to fpsxdp, e.g. `-- eth0 --skb`
        #[clap(last = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    match Cli::parse().cmd {
        Commands::BuildEbpf { debug } => build_ebpf(!debug).map(drop),
        Commands::Build { debug } => build(!debug),
        Commands::Audit => audit(),
        Commands::Run { debug, args } => run(!debug, &args),
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(message);
    spinner
}

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn profile(release: bool) -> &'static str {
    if release {
        "release"
    } else {
        "debug"
    }
}

//  1. BUILD-EBPF

fn build_ebpf(release: bool) -> Result<PathBuf> {
    let root = workspace_root();
    let spinner = spinner("building XDP object...");

    let mut cmd = Command::new("cargo");
    cmd.current_dir(root.join(EBPF_CRATE))
        // the rustup toolchain file in the eBPF crate picks nightly
        .env_remove("RUSTUP_TOOLCHAIN")
        .args(["build", "--target", EBPF_TARGET, "-Z", "build-std=core"])
        .arg("--target-dir")
        .arg(root.join("target"));
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status().context("failed to run cargo for the eBPF crate")?;
    if !status.success() {
        spinner.abandon_with_message("XDP object build failed");
        bail!("eBPF build exited with {status}");
    }

    let object = root
        .join("target")
        .join(EBPF_TARGET)
        .join(profile(release))
        .join(BINARY);
    if !object.exists() {
        bail!("build succeeded but object missing at {}", object.display());
    }
    spinner.finish_with_message(format!("XDP object at {}", object.display()));
    Ok(object)
}

//  2. BUILD

fn build(release: bool) -> Result<()> {
    build_ebpf(release)?;

    let spinner = spinner("building control plane...");
    let mut cmd = Command::new("cargo");
    cmd.current_dir(workspace_root()).args(["build", "--package", BINARY]);
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status().context("failed to run cargo")?;
    if !status.success() {
        spinner.abandon_with_message("control plane build failed");
        bail!("cargo build exited with {status}");
    }
    spinner.finish_with_message("control plane built");
    Ok(())
}

//  3. AUDIT

fn audit() -> Result<()> {
    let spinner = spinner("checking host...");

    let release = std::fs::read_to_string("/proc/sys/kernel/osrelease")
        .context("failed to read kernel release")?;
    let (major, minor) = kernel_version(&release)
        .with_context(|| format!("unrecognised kernel release {:?}", release.trim()))?;
    // bpf_xdp_adjust_tail shrinking and boot-time clock
    if (major, minor) < (5, 8) {
        spinner.abandon();
        bail!("kernel {major}.{minor} is too old, XDP fast path needs 5.8+");
    }

    let mounts = std::fs::read_to_string("/proc/mounts").context("failed to read /proc/mounts")?;
    if !mounts.lines().any(|line| line.split_whitespace().nth(2) == Some("bpf")) {
        spinner.abandon();
        bail!("bpffs is not mounted; mount -t bpf bpf /sys/fs/bpf");
    }

    let linker = Command::new("bpf-linker").arg("--version").output();
    if !matches!(linker, Ok(ref out) if out.status.success()) {
        spinner.abandon();
        bail!("bpf-linker not found; cargo install bpf-linker");
    }

    spinner.finish_with_message(format!("host audit passed (kernel {major}.{minor})"));
    Ok(())
}

fn kernel_version(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.trim().split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}

//  4. RUN

fn run(release: bool, args: &[String]) -> Result<()> {
    build(release)?;
    let root = workspace_root();
    let object = root.join("target").join(EBPF_TARGET).join(profile(release)).join(BINARY);
    let bin = root.join("target").join(profile(release)).join(BINARY);

    // XDP attach needs root
    let mut cmd = if is_root() {
        Command::new(&bin)
    } else {
        let mut sudo = Command::new("sudo");
        sudo.arg("-E").arg(&bin);
        sudo
    };
    let status = cmd
        .arg("--object")
        .arg(&object)
        .args(args)
        .status()
        .with_context(|| format!("failed to launch {}", bin.display()))?;
    if !status.success() {
        bail!("{BINARY} exited with {status}");
    }
    Ok(())
}

fn is_root() -> bool {
    Command::new("id")
        .arg("-u")
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
        .unwrap_or(false)
}
