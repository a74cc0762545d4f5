//! Process and host probes used by the housekeeping lock and the
//! repack memory gate.

/// The local hostname, or `"unknown"` when it cannot be determined.
#[cfg(unix)]
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return "unknown".into();
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    match std::str::from_utf8(&buf[..len]) {
        Ok(s) if !s.is_empty() => s.to_string(),
        _ => "unknown".into(),
    }
}

#[cfg(not(unix))]
pub fn hostname() -> String {
    std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".into())
}

/// Whether a pid refers to a live process we can see.
///
/// `kill(pid, 0)` probes without signalling; EPERM means the process
/// exists but belongs to someone else, which still counts as alive.
#[cfg(unix)]
pub fn pid_alive(pid: u32) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn pid_alive(_pid: u32) -> bool {
    // No cheap probe; report alive so foreign locks are honored.
    true
}

/// Total physical memory in bytes, or 0 when the probe fails.
///
/// Callers treat 0 as "unknown, proceed".
#[cfg(target_os = "linux")]
pub fn total_ram() -> u64 {
    let mut info: libc::sysinfo = unsafe { std::mem::zeroed() };
    if unsafe { libc::sysinfo(&mut info) } == 0 {
        (info.totalram as u64).saturating_mul(info.mem_unit as u64)
    } else {
        0
    }
}

#[cfg(target_os = "macos")]
pub fn total_ram() -> u64 {
    let mut mib = [libc::CTL_HW, libc::HW_MEMSIZE];
    let mut mem: u64 = 0;
    let mut len = std::mem::size_of::<u64>();
    let rc = unsafe {
        libc::sysctl(
            mib.as_mut_ptr(),
            2,
            &mut mem as *mut u64 as *mut libc::c_void,
            &mut len,
            std::ptr::null_mut(),
            0,
        )
    };
    if rc == 0 {
        mem
    } else {
        0
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn total_ram() -> u64 {
    0
}

/// Detach from the controlling terminal.
///
/// Forks; the parent exits immediately so the invoking caller (for
/// example a commit hook) gets its prompt back. The child becomes a
/// session leader with stdio pointed at /dev/null and returns `true`.
/// Returns `false` when the fork fails; the caller then continues in
/// the foreground.
#[cfg(unix)]
pub fn daemonize() -> bool {
    unsafe {
        match libc::fork() {
            -1 => false,
            0 => {
                libc::setsid();
                let devnull = libc::open(
                    b"/dev/null\0".as_ptr() as *const libc::c_char,
                    libc::O_RDWR,
                );
                if devnull >= 0 {
                    libc::dup2(devnull, 0);
                    libc::dup2(devnull, 1);
                    libc::dup2(devnull, 2);
                    if devnull > 2 {
                        libc::close(devnull);
                    }
                }
                true
            }
            _ => {
                // Parent: skip atexit handlers and buffered flushes; the
                // child owns all further cleanup.
                libc::_exit(0);
            }
        }
    }
}

#[cfg(not(unix))]
pub fn daemonize() -> bool {
    false
}
