//! Background dependency loading
//!
//! Backends like the HTTP agents or the speech engines take a moment to set
//! up. The gate initializes them on a single background thread, in order,
//! while the key listener is already running. Tasks that need a backend wait
//! on the gate with a timeout.
//!
//! The loader is the only writer. Readiness is published through a
//! `tokio::sync::watch` channel so any number of tasks can wait concurrently
//! without polling.

use crate::error::GateError;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// A loaded dependency, shared with every task that asks for it
pub type Artifact = Arc<dyn Any + Send + Sync>;

type InitFn = Box<dyn FnOnce(&Resolved<'_>) -> Result<Artifact, String> + Send>;

/// Artifacts produced by dependencies that finished loading earlier
pub struct Resolved<'a> {
    artifacts: &'a HashMap<String, Artifact>,
}

impl Resolved<'_> {
    /// Get an earlier artifact by name, if it loaded and has type `T`
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.artifacts
            .get(name)
            .cloned()
            .and_then(|artifact| artifact.downcast::<T>().ok())
    }
}

/// A named dependency and the function that initializes it
pub struct DependencySpec {
    name: String,
    init: InitFn,
}

impl DependencySpec {
    pub fn new<T, F>(name: impl Into<String>, init: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&Resolved<'_>) -> Result<T, String> + Send + 'static,
    {
        Self {
            name: name.into(),
            init: Box::new(move |resolved: &Resolved<'_>| {
                init(resolved).map(|value| Arc::new(value) as Artifact)
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Default)]
struct GateState {
    ready: HashMap<String, Artifact>,
    /// Set when an initializer failed or panicked; the loader stops there
    crashed: Option<String>,
    /// Set when every dependency loaded
    finished: bool,
}

/// Process-wide readiness table for background-loaded dependencies
pub struct DependencyGate {
    registered: HashSet<String>,
    state: watch::Receiver<GateState>,
}

impl DependencyGate {
    /// Spawn the loader thread for `specs`, initialized in the given order
    pub fn spawn(specs: Vec<DependencySpec>) -> std::io::Result<Self> {
        let registered = specs.iter().map(|spec| spec.name.clone()).collect();
        let (tx, rx) = watch::channel(GateState::default());

        std::thread::Builder::new()
            .name("dep-loader".to_string())
            .spawn(move || load_all(specs, tx))?;

        Ok(Self {
            registered,
            state: rx,
        })
    }

    /// Wait until `name` is ready
    ///
    /// Fails with `DependencyTimeout` after `timeout`, or right away with
    /// `LoaderCrashed` once the loader has died without producing `name`.
    pub async fn wait(&self, name: &str, timeout: Duration) -> Result<Artifact, GateError> {
        if !self.registered.contains(name) {
            return Err(GateError::Unknown(name.to_string()));
        }

        let mut rx = self.state.clone();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| {
                state.ready.contains_key(name) || state.crashed.is_some() || state.finished
            }),
        )
        .await;

        match waited {
            Err(_) => Err(GateError::DependencyTimeout {
                name: name.to_string(),
                secs: timeout.as_secs_f32(),
            }),
            Ok(Ok(state)) => resolve(name, &state),
            // Loader thread is gone; whatever it published last is final
            Ok(Err(_)) => resolve(name, &self.state.borrow()),
        }
    }

    /// Wait for `name` and downcast it to the expected type
    pub async fn get<T: Any + Send + Sync>(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Arc<T>, GateError> {
        self.wait(name, timeout)
            .await?
            .downcast::<T>()
            .map_err(|_| GateError::WrongType {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Whether `name` has finished loading
    pub fn is_ready(&self, name: &str) -> bool {
        self.state.borrow().ready.contains_key(name)
    }

    /// Whether the loader is still working through its list
    pub fn is_loading(&self) -> bool {
        let loader_alive = self.state.has_changed().is_ok();
        let state = self.state.borrow();
        loader_alive && !state.finished && state.crashed.is_none()
    }
}

fn resolve(name: &str, state: &GateState) -> Result<Artifact, GateError> {
    if let Some(artifact) = state.ready.get(name) {
        return Ok(artifact.clone());
    }
    let reason = match &state.crashed {
        Some(reason) => reason.clone(),
        None if state.finished => "loader finished without producing it".to_string(),
        None => "loader thread exited".to_string(),
    };
    Err(GateError::LoaderCrashed {
        name: name.to_string(),
        reason,
    })
}

fn load_all(specs: Vec<DependencySpec>, tx: watch::Sender<GateState>) {
    let mut artifacts: HashMap<String, Artifact> = HashMap::new();

    for DependencySpec { name, init } in specs {
        let started = Instant::now();
        let resolved = Resolved {
            artifacts: &artifacts,
        };
        let outcome = catch_unwind(AssertUnwindSafe(move || init(&resolved)));

        let reason = match outcome {
            Ok(Ok(artifact)) => {
                tracing::info!(
                    "Loaded {} in {:.2}s",
                    name,
                    started.elapsed().as_secs_f32()
                );
                artifacts.insert(name.clone(), artifact.clone());
                tx.send_modify(|state| {
                    state.ready.insert(name, artifact);
                });
                continue;
            }
            Ok(Err(reason)) => reason,
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::error!("Failed to load {}: {}", name, reason);
        tx.send_modify(|state| state.crashed = Some(format!("{}: {}", name, reason)));
        return;
    }

    tx.send_modify(|state| state.finished = true);
    tracing::debug!("All dependencies loaded");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn slow<T: Any + Send + Sync>(name: &str, delay_ms: u64, value: T) -> DependencySpec {
        DependencySpec::new(name, move |_| {
            std::thread::sleep(Duration::from_millis(delay_ms));
            Ok(value)
        })
    }

    #[tokio::test]
    async fn test_wait_returns_loaded_value() {
        let gate = DependencyGate::spawn(vec![slow("answer", 10, 42u32)]).unwrap();
        let value = gate.get::<u32>("answer", Duration::from_secs(5)).await.unwrap();
        assert_eq!(*value, 42);
        assert!(gate.is_ready("answer"));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let gate = DependencyGate::spawn(vec![slow("sluggish", 2000, ())]).unwrap();
        let err = gate
            .wait("sluggish", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::DependencyTimeout { ref name, .. } if name == "sluggish"));
        assert!(gate.is_loading());
    }

    #[tokio::test]
    async fn test_failure_fails_later_waiters_fast() {
        let gate = DependencyGate::spawn(vec![
            DependencySpec::new::<(), _>("broken", |_| Err("no network".to_string())),
            slow("after", 10, 1u8),
        ])
        .unwrap();

        let started = Instant::now();
        let err = gate.wait("after", Duration::from_secs(10)).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            GateError::LoaderCrashed { name, reason } => {
                assert_eq!(name, "after");
                assert!(reason.contains("no network"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!gate.is_loading());
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_crash() {
        let gate = DependencyGate::spawn(vec![DependencySpec::new::<(), _>("boom", |_| {
            panic!("init exploded")
        })])
        .unwrap();

        let err = gate.wait("boom", Duration::from_secs(10)).await.unwrap_err();
        match err {
            GateError::LoaderCrashed { reason, .. } => assert!(reason.contains("init exploded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_earlier_dependency_stays_available_after_crash() {
        let gate = DependencyGate::spawn(vec![
            slow("first", 0, "ok".to_string()),
            DependencySpec::new::<(), _>("second", |_| Err("bad".to_string())),
        ])
        .unwrap();

        let _ = gate.wait("second", Duration::from_secs(5)).await;
        let first = gate
            .get::<String>("first", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(*first, "ok");
    }

    #[tokio::test]
    async fn test_unknown_dependency() {
        let gate = DependencyGate::spawn(vec![slow("known", 0, ())]).unwrap();
        let err = gate.wait("missing", Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(err, GateError::Unknown("missing".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let gate = DependencyGate::spawn(vec![slow("number", 0, 7u64)]).unwrap();
        let err = gate
            .get::<String>("number", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::WrongType { .. }));
    }

    #[tokio::test]
    async fn test_later_dependency_sees_earlier_artifacts() {
        let gate = DependencyGate::spawn(vec![
            slow("base", 0, 20u32),
            DependencySpec::new("derived", |resolved| {
                let base = resolved
                    .get::<u32>("base")
                    .ok_or_else(|| "base missing".to_string())?;
                Ok(*base + 1)
            }),
        ])
        .unwrap();

        let derived = gate.get::<u32>("derived", Duration::from_secs(5)).await.unwrap();
        assert_eq!(*derived, 21);
    }

    #[tokio::test]
    async fn test_loads_in_order_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let specs = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let calls = calls.clone();
                let order = order.clone();
                DependencySpec::new(name, move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    order.lock().unwrap().push(name);
                    Ok(())
                })
            })
            .collect();
        let gate = DependencyGate::spawn(specs).unwrap();

        gate.wait("c", Duration::from_secs(5)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_waiters() {
        let gate = Arc::new(DependencyGate::spawn(vec![slow("shared", 100, 5i32)]).unwrap());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.get::<i32>("shared", Duration::from_secs(5)).await })
            })
            .collect();

        for waiter in waiters {
            assert_eq!(*waiter.await.unwrap().unwrap(), 5);
        }
    }
}
