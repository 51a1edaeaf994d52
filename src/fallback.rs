//! Ordered fallback over interchangeable backends
//!
//! Backends are tried in order until one succeeds. Each backend is called at
//! most once per run, and only the first success is used.

use std::fmt;
use std::sync::Arc;

/// One failed attempt in a chain run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub backend: String,
    pub error: String,
}

/// Every backend in the chain failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainExhausted {
    pub attempts: Vec<Attempt>,
}

impl fmt::Display for ChainExhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no backend configured");
        }
        let summary: Vec<String> = self
            .attempts
            .iter()
            .map(|attempt| format!("{}: {}", attempt.backend, attempt.error))
            .collect();
        write!(f, "{}", summary.join("; "))
    }
}

impl std::error::Error for ChainExhausted {}

/// Named backends of one kind, in priority order
pub struct FallbackChain<B: ?Sized> {
    label: &'static str,
    backends: Vec<(String, Arc<B>)>,
}

impl<B: ?Sized> Clone for FallbackChain<B> {
    fn clone(&self) -> Self {
        Self {
            label: self.label,
            backends: self.backends.clone(),
        }
    }
}

impl<B: ?Sized> FallbackChain<B> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            backends: Vec::new(),
        }
    }

    /// Append a backend with the lowest priority so far
    pub fn push(&mut self, name: impl Into<String>, backend: Arc<B>) {
        self.backends.push((name.into(), backend));
    }

    pub fn with(mut self, name: impl Into<String>, backend: Arc<B>) -> Self {
        self.push(name, backend);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Call `attempt` on each backend in order and return the first success
    pub fn run<T, E, F>(&self, mut attempt: F) -> Result<T, ChainExhausted>
    where
        E: fmt::Display,
        F: FnMut(&B) -> Result<T, E>,
    {
        let mut attempts = Vec::new();

        for (index, (name, backend)) in self.backends.iter().enumerate() {
            match attempt(&**backend) {
                Ok(value) => {
                    if index > 0 {
                        tracing::info!("{} succeeded with fallback backend {}", self.label, name);
                    } else {
                        tracing::debug!("{} succeeded with {}", self.label, name);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("{} backend {} failed: {}, trying next", self.label, name, e);
                    attempts.push(Attempt {
                        backend: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        Err(ChainExhausted { attempts })
    }
}
