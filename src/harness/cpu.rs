//! Idle CPU check: a process sleeping on the hub should burn almost no CPU.

use std::time::Duration;

use hubcheck_core::Hub;
use nix::sys::resource::{UsageWho, getrusage};
use nix::sys::time::TimeVal;
use tracing::debug;

use super::errors::{HarnessError, HarnessResult};

fn as_duration(tv: TimeVal) -> Duration {
    let micros = tv.tv_sec() as f64 * 1_000_000.0 + tv.tv_usec() as f64;
    Duration::from_secs_f64(micros.max(0.0) / 1_000_000.0)
}

fn cpu_times() -> HarnessResult<(Duration, Duration)> {
    let usage = getrusage(UsageWho::RUSAGE_SELF)?;
    Ok((as_duration(usage.user_time()), as_duration(usage.system_time())))
}

/// Sleep on `hub` for `duration` and fail if user plus system CPU exceeded `allowed_part` of it.
pub fn check_idle_cpu_usage<H: Hub + ?Sized>(hub: &H, duration: Duration, allowed_part: f64) -> HarnessResult<()> {
    let (user_before, sys_before) = cpu_times()?;
    hub.sleep(duration)?;
    let (user_after, sys_after) = cpu_times()?;

    let user = user_after.saturating_sub(user_before).as_secs_f64();
    let sys = sys_after.saturating_sub(sys_before).as_secs_f64();
    let wall = duration.as_secs_f64();
    let allowed = wall * allowed_part;
    debug!(user, sys, allowed, "idle cpu usage");

    if user + sys > allowed {
        let pct = |value: f64| if wall > 0.0 { value / wall * 100.0 } else { 0.0 };
        return Err(HarnessError::Assertion(format!(
            "CPU usage over limit: user {:.2}% sys {:.2}% allowed {:.2}%",
            pct(user),
            pct(sys),
            allowed_part * 100.0
        )));
    }
    Ok(())
}
