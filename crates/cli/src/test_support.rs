use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Locks process environment mutation for the entire test body.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    run()
}

/// Sets or clears a variable and restores the previous value on drop.
/// Only use inside `with_locked_env`.
pub(crate) struct EnvVarGuard {
    key: String,
    previous: Option<String>,
}

impl EnvVarGuard {
    pub(crate) fn set(key: &str, value: &str) -> Self {
        let guard = Self::capture(key);
        // SAFETY: environment access is serialized by `with_locked_env`.
        unsafe {
            std::env::set_var(key, value);
        }
        guard
    }

    pub(crate) fn remove(key: &str) -> Self {
        let guard = Self::capture(key);
        // SAFETY: environment access is serialized by `with_locked_env`.
        unsafe {
            std::env::remove_var(key);
        }
        guard
    }

    fn capture(key: &str) -> Self {
        Self {
            key: key.to_string(),
            previous: std::env::var(key).ok(),
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        // SAFETY: environment access is serialized by `with_locked_env`.
        unsafe {
            match &self.previous {
                Some(value) => std::env::set_var(&self.key, value),
                None => std::env::remove_var(&self.key),
            }
        }
    }
}
