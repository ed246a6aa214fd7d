use anyhow::{Context, Result};
use nix::{sched, sched::CpuSet, unistd::Pid};

/// Pin the calling thread to the specified cpu core
pub fn pin_current_thread(cpu: usize) -> Result<()> {
    let mut cpu_set = CpuSet::new();
    cpu_set.set(cpu).context("failed to build CpuSet arg")?;
    //pid 0 addresses the calling thread
    sched::sched_setaffinity(Pid::from_raw(0), &cpu_set)
        .context(format!("failed to pin current thread to core {}", cpu))?;

    Ok(())
}
