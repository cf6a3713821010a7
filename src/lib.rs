use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod api;
pub mod clip_plan;
pub mod compositor;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod media;
pub mod platform;
pub mod script;
pub mod session;
pub mod voice;

pub use error::{Error, Result};

pub type ProgressLogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<ProgressLogHook>>> = Lazy::new(|| Mutex::new(None));

/// Mirror every progress line into `hook` (e.g. a UI status panel).
pub fn set_log_hook(hook: Option<ProgressLogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!("[{}] {}", tag, message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
