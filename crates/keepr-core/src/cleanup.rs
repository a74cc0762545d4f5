//! Shared exit/signal cleanup state.
//!
//! A detached gc must commit its captured stderr and drop its pid file
//! on every way out: normal return, `exit()`, or a fatal signal. The
//! signal path may only touch async-signal-safe calls (`fstat`,
//! `fsync`, `rename`, `unlink`, `close`, `raise`), so everything it
//! needs is staged here up front as raw fds and C strings behind
//! atomics. No allocation, locking or buffered I/O happens after the
//! fact.

#![cfg(unix)]

use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicPtr, Ordering};

static LOG_FD: AtomicI32 = AtomicI32::new(-1);
static LOG_LOCK_PATH: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());
static LOG_FINAL_PATH: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());
static LOG_DONE: AtomicBool = AtomicBool::new(false);

static PID_PATH: AtomicPtr<libc::c_char> = AtomicPtr::new(ptr::null_mut());

static HANDLERS_INSTALLED: AtomicBool = AtomicBool::new(false);

fn leak_path(path: &Path) -> *mut libc::c_char {
    use std::os::unix::ffi::OsStrExt;
    CString::new(path.as_os_str().as_bytes())
        .map(CString::into_raw)
        .unwrap_or(ptr::null_mut())
}

/// Stage the log-capture lockfile for commit-on-exit.
pub(crate) fn set_log_capture(fd: i32, lock_path: &Path, final_path: &Path) {
    LOG_LOCK_PATH.store(leak_path(lock_path), Ordering::SeqCst);
    LOG_FINAL_PATH.store(leak_path(final_path), Ordering::SeqCst);
    LOG_DONE.store(false, Ordering::SeqCst);
    LOG_FD.store(fd, Ordering::SeqCst);
}

/// Remember the committed pid file so fatal signals unlink it.
pub(crate) fn register_pidfile(path: &Path) {
    let old = PID_PATH.swap(leak_path(path), Ordering::SeqCst);
    if !old.is_null() {
        drop(unsafe { CString::from_raw(old) });
    }
}

/// The pid file was removed in an orderly fashion; signals need not
/// touch it any more.
pub(crate) fn clear_pidfile() {
    let old = PID_PATH.swap(ptr::null_mut(), Ordering::SeqCst);
    if !old.is_null() {
        drop(unsafe { CString::from_raw(old) });
    }
}

/// Install the atexit hook and chain the fatal-signal handlers. Safe
/// to call more than once.
pub(crate) fn install_handlers() {
    if HANDLERS_INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    unsafe {
        libc::atexit(cleanup_at_exit);
        for sig in [libc::SIGHUP, libc::SIGINT, libc::SIGTERM, libc::SIGQUIT] {
            libc::signal(sig, cleanup_on_signal as libc::sighandler_t);
        }
    }
}

/// Commit or roll back the captured log exactly once.
///
/// Non-empty capture: fsync and rename the lock file into place so the
/// failure is durable. Empty capture: remove the lock file and any
/// stale committed log from an earlier failed run.
unsafe fn finalize_log() {
    if LOG_DONE.swap(true, Ordering::SeqCst) {
        return;
    }
    let fd = LOG_FD.load(Ordering::SeqCst);
    if fd < 0 {
        return;
    }
    let lock_path = LOG_LOCK_PATH.load(Ordering::SeqCst);
    let final_path = LOG_FINAL_PATH.load(Ordering::SeqCst);
    if lock_path.is_null() || final_path.is_null() {
        return;
    }

    let mut st: libc::stat = std::mem::zeroed();
    // An fstat failure is itself suspicious; keep the capture in that
    // case rather than discarding evidence.
    let captured_output = libc::fstat(fd, &mut st) != 0 || st.st_size > 0;
    if captured_output {
        libc::fsync(fd);
        libc::rename(lock_path, final_path);
    } else {
        libc::unlink(lock_path);
        libc::unlink(final_path);
    }
    libc::close(fd);
}

unsafe fn unlink_pidfile() {
    let path = PID_PATH.swap(ptr::null_mut(), Ordering::SeqCst);
    if !path.is_null() {
        libc::unlink(path);
    }
}

extern "C" fn cleanup_at_exit() {
    unsafe {
        finalize_log();
        unlink_pidfile();
    }
}

extern "C" fn cleanup_on_signal(sig: libc::c_int) {
    unsafe {
        finalize_log();
        unlink_pidfile();
        // Re-deliver with the default disposition so the exit status
        // still reports the signal.
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}
