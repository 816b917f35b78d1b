//! Transport configuration and socket path handling

use crate::transport::DEFAULT_CHUNK_SIZE;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default Unix socket path; `$UID` is expanded at runtime
pub const DEFAULT_SOCKET_PATH: &str = "/run/user/$UID/udslink/udslink.sock";

/// Delay schedule between connect attempts while the endpoint is missing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match attempt {
            0..=1 => self.initial,
            2..=3 => self.initial.saturating_mul(2),
            _ => self.max,
        };
        delay.min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Largest number of bytes moved through one read or write syscall
    pub chunk_size: NonZeroUsize,
    /// Total connect attempts made by `connect_with_backoff`, at least one
    pub connect_attempts: u32,
    pub backoff: Backoff,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_attempts: 1,
            backoff: Backoff::default(),
        }
    }
}

impl TransportConfig {
    pub fn with_chunk_size(mut self, chunk_size: NonZeroUsize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_connect_attempts(mut self, attempts: u32) -> Self {
        self.connect_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

fn get_uid() -> String {
    std::env::var("UID").unwrap_or_else(|_| nix::unistd::getuid().to_string())
}

/// Expand `$UID` and `$RUNTIME_DIRECTORY` in a configured socket path
pub fn expand_socket_path(path: &str) -> String {
    expand_with(path, |name| match name {
        "UID" => Some(get_uid()),
        other => std::env::var(other).ok(),
    })
}

fn expand_with(path: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut expanded = path.to_string();
    for name in ["RUNTIME_DIRECTORY", "UID"] {
        let token = format!("${}", name);
        if !expanded.contains(&token) {
            continue;
        }
        // An unset variable leaves the token in place
        if let Some(value) = lookup(name) {
            expanded = expanded.replace(&token, &value);
        }
    }
    expanded
}
