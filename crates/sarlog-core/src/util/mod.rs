//! Host facts recorded in data file headers.

use serde::{Deserialize, Serialize};

/// Short git revision the library was built from, or `unknown`.
pub const GIT_SHA: &str = env!("SARLOG_GIT_SHA");

/// Fallback when the kernel's tick rate cannot be queried.
pub const DEFAULT_HZ: u32 = 100;

/// Machine identification written into every data file header.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostIdentity {
    pub sysname: String,
    pub release: String,
    pub nodename: String,
    pub machine: String,
}

/// Identity of the running host from `uname(2)`.
pub fn host_identity() -> HostIdentity {
    match nix::sys::utsname::uname() {
        Ok(uts) => HostIdentity {
            sysname: uts.sysname().to_string_lossy().into_owned(),
            release: uts.release().to_string_lossy().into_owned(),
            nodename: uts.nodename().to_string_lossy().into_owned(),
            machine: uts.machine().to_string_lossy().into_owned(),
        },
        Err(e) => {
            tracing::warn!(error = %e, "uname failed, host identity left empty");
            HostIdentity::default()
        }
    }
}

/// Kernel clock ticks per second (`sysconf(_SC_CLK_TCK)`).
pub fn clock_ticks() -> u32 {
    match nix::unistd::sysconf(nix::unistd::SysconfVar::CLK_TCK) {
        Ok(Some(hz)) if hz > 0 => hz as u32,
        _ => DEFAULT_HZ,
    }
}
