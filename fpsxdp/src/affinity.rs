//! CPU pinning for the control plane.

use std::io;
use std::mem;

use anyhow::{bail, Context, Result};

/// Restricts the calling thread to `cpu`. Threads it spawns afterwards
/// inherit the mask, so call this before the async runtime starts.
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    if cpu >= libc::CPU_SETSIZE as usize {
        bail!("cpu {cpu} is outside the affinity mask (max {})", libc::CPU_SETSIZE - 1);
    }
    // SAFETY: cpu_set_t is plain bits and cpu was bounds checked above
    let mut set = unsafe { mem::zeroed::<libc::cpu_set_t>() };
    unsafe { libc::CPU_SET(cpu, &mut set) };

    // SAFETY: pid 0 is the calling thread and set outlives the call
    if unsafe { libc::sched_setaffinity(0, mem::size_of_val(&set), &set) } != 0 {
        return Err(io::Error::last_os_error()).with_context(|| format!("failed to pin to cpu {cpu}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_cpus() -> Result<Vec<usize>> {
        let mut set = unsafe { mem::zeroed::<libc::cpu_set_t>() };
        if unsafe { libc::sched_getaffinity(0, mem::size_of_val(&set), &mut set) } != 0 {
            return Err(io::Error::last_os_error()).context("failed to read cpu affinity");
        }
        Ok((0..libc::CPU_SETSIZE as usize)
            .filter(|&cpu| unsafe { libc::CPU_ISSET(cpu, &set) })
            .collect())
    }

    #[test]
    fn out_of_range_cpu_is_rejected() {
        let err = pin_current_thread(libc::CPU_SETSIZE as usize).unwrap_err();
        assert!(err.to_string().contains("outside the affinity mask"));
    }

    #[test]
    fn pins_to_an_allowed_cpu() {
        // own thread so the test runner's mask is untouched
        std::thread::spawn(|| {
            let allowed = current_cpus().unwrap();
            let target = *allowed.last().unwrap();
            pin_current_thread(target).unwrap();
            assert_eq!(current_cpus().unwrap(), vec![target]);
        })
        .join()
        .unwrap();
    }
}
