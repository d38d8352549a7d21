//! Loading and attaching the XDP program.

use std::ffi::CString;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use aya::programs::{xdp::XdpLinkId, Xdp, XdpFlags};
use aya::{Ebpf, EbpfLoader};
use aya_log::EbpfLogger;
use fpsxdp_common::PROGRAM_NAME;
use tracing::{info, warn};

use crate::config::Config;

/// The loaded object and, while attached, the link holding it on the interface.
pub struct Datapath {
    ebpf: Ebpf,
    interface: String,
    link: Option<XdpLinkId>,
}

impl Datapath {
    /// Runs every startup check in order and attaches the fast path.
    pub fn attach(config: &Config) -> Result<Self> {
        ensure_root()?;
        let ifindex = interface_index(&config.interface)?;
        raise_memlock()?;

        fs::create_dir_all(&config.pin_path)
            .with_context(|| format!("failed to create pin directory {}", config.pin_path.display()))?;
        let mut ebpf = load(&config.object, &config.pin_path)?;

        if let Err(err) = EbpfLogger::init(&mut ebpf) {
            warn!("eBPF logger unavailable: {err}");
        }

        let program: &mut Xdp = ebpf
            .program_mut(PROGRAM_NAME)
            .with_context(|| format!("program {PROGRAM_NAME} not found in object"))?
            .try_into()?;
        program.load().context("failed to load xdp program")?;

        let link = if config.force_skb {
            program
                .attach(&config.interface, XdpFlags::SKB_MODE)
                .context("failed to attach in skb mode")?
        } else {
            match program.attach(&config.interface, XdpFlags::DRV_MODE) {
                Ok(link) => link,
                Err(err) => {
                    warn!("native attach failed ({err}), falling back to skb mode");
                    program
                        .attach(&config.interface, XdpFlags::SKB_MODE)
                        .context("failed to attach in skb mode")?
                }
            }
        };
        info!("fast path attached to {} (ifindex {ifindex})", config.interface);

        Ok(Self {
            ebpf,
            interface: config.interface.clone(),
            link: Some(link),
        })
    }

    pub fn ebpf_mut(&mut self) -> &mut Ebpf {
        &mut self.ebpf
    }

    /// Takes the program off the interface. Traffic goes back to the stack.
    pub fn detach(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        let program: &mut Xdp = self
            .ebpf
            .program_mut(PROGRAM_NAME)
            .context("xdp program disappeared")?
            .try_into()?;
        program
            .detach(link)
            .with_context(|| format!("failed to detach from {}", self.interface))?;
        info!("fast path detached from {}", self.interface);
        Ok(())
    }
}

impl Drop for Datapath {
    fn drop(&mut self) {
        if self.link.is_some() {
            if let Err(err) = self.detach() {
                warn!("{err:#}");
            }
        }
    }
}

fn load(object: &Path, pin_path: &Path) -> Result<Ebpf> {
    EbpfLoader::new()
        .map_pin_path(pin_path)
        .load_file(object)
        .with_context(|| format!("failed to load {}", object.display()))
}

fn ensure_root() -> Result<()> {
    // SAFETY: geteuid has no preconditions.
    if unsafe { libc::geteuid() } != 0 {
        bail!("fpsxdp must run as root");
    }
    Ok(())
}

/// Resolves `name` and checks the link is up.
fn interface_index(name: &str) -> Result<u32> {
    let c_name = CString::new(name).context("interface name contains a NUL byte")?;
    // SAFETY: c_name is a valid NUL-terminated string.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        bail!("interface {name} does not exist");
    }

    let flags = fs::read_to_string(format!("/sys/class/net/{name}/flags"))
        .with_context(|| format!("failed to read flags of {name}"))?;
    let flags = parse_flags(&flags).with_context(|| format!("bad flags for {name}: {flags:?}"))?;
    if flags & libc::IFF_UP as u32 == 0 {
        bail!("interface {name} is down");
    }
    Ok(index)
}

fn parse_flags(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    u32::from_str_radix(raw.strip_prefix("0x").unwrap_or(raw), 16).ok()
}

/// Map memory is charged against RLIMIT_MEMLOCK on older kernels.
fn raise_memlock() -> Result<()> {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    // SAFETY: limit is a valid rlimit.
    if unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) } != 0 {
        return Err(std::io::Error::last_os_error()).context("failed to raise RLIMIT_MEMLOCK");
    }
    Ok(())
}
