//! The process-wide fatal-error hook.
//!
//! Handles report broken ownership invariants (a null object for a [`SharedRef`], a count that
//! would drop below zero) here instead of producing an invalid handle. These are programmer errors:
//! the hook must not return.
//!
//! [`SharedRef`]: crate::SharedRef

use spin::RwLock;

/// Receives the description of a violated invariant and never returns.
pub type FatalErrorHook = fn(&str) -> !;

static HOOK: RwLock<Option<FatalErrorHook>> = RwLock::new(None);

/// Installs `hook` for the whole process, returning the previously installed one.
pub fn set_fatal_error_hook(hook: FatalErrorHook) -> Option<FatalErrorHook> {
    HOOK.write().replace(hook)
}

/// Removes the installed hook, restoring the default behaviour.
pub fn take_fatal_error_hook() -> Option<FatalErrorHook> {
    HOOK.write().take()
}

#[cold]
#[inline(never)]
pub(crate) fn fatal_error(message: &str) -> ! {
    log::error!("{}", message);

    // Copied out so the lock is released before the hook runs.
    let hook = *HOOK.read();
    match hook {
        Some(hook) => hook(message),
        None => default_hook(message),
    }
}

#[cfg(feature = "std")]
fn default_hook(_message: &str) -> ! {
    std::process::abort()
}

#[cfg(not(feature = "std"))]
fn default_hook(message: &str) -> ! {
    panic!("{}", message)
}
