//! Centralized `errno` access for the Unix kernel and signal backends.
//!
//! Copied from the pattern `libstd/sys/unix/os.rs` uses: the symbol that
//! exposes the thread-local errno cell differs by libc.

#![allow(unused)]

#[cfg(unix)]
extern "C" {
    #[cfg(not(target_os = "dragonfly"))]
    #[cfg_attr(
        any(
            target_os = "linux",
            target_os = "emscripten",
            target_os = "fuchsia",
            target_os = "l4re"
        ),
        link_name = "__errno_location"
    )]
    #[cfg_attr(
        any(
            target_os = "android",
            target_os = "netbsd",
            target_os = "openbsd",
            target_env = "newlib"
        ),
        link_name = "__errno"
    )]
    #[cfg_attr(target_os = "solaris", link_name = "___errno")]
    #[cfg_attr(
        any(target_os = "macos", target_os = "ios", target_os = "freebsd"),
        link_name = "__error"
    )]
    fn errno_location() -> *mut libc::c_int;
}

#[cfg(all(unix, not(target_os = "dragonfly")))]
pub(crate) fn errno() -> libc::c_int {
    unsafe { *errno_location() }
}

#[cfg(target_os = "dragonfly")]
pub(crate) fn errno() -> libc::c_int {
    extern "C" {
        #[thread_local]
        static errno: libc::c_int;
    }
    unsafe { errno }
}
