/*! Environment, system interrogation, and backend factory: the layer
 * between the per-backend `Runner` implementations in `harness-hal` and
 * the ergonomic facade in `harness`.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

pub mod factory;
pub mod interrogator;

use std::sync::{Mutex, MutexGuard};

use ht::{Backend, DeviceInfo, Result, SystemSnapshot};
use once_cell::sync::OnceCell;

pub use factory::BackendFactoryImpl;

/// Owns the loader, the cached system snapshot, and the lazily
/// constructed per-backend factories. A `HarnessEnvironment` is the
/// thing that actually holds state; [`process_env`] is a thin
/// process-scope convenience wrapper around one for callers (the CLI)
/// that don't want to thread an environment value through explicitly.
pub struct HarnessEnvironment {
    loader: hal::RuntimeLoader,
    snapshot: Option<SystemSnapshot>,
    factories: rustc_hash::FxHashMap<Backend, Box<dyn BackendFactoryImpl>>,
}

impl HarnessEnvironment {
    pub fn new() -> Self {
        Self {
            loader: hal::RuntimeLoader::new(),
            snapshot: None,
            factories: rustc_hash::FxHashMap::default(),
        }
    }

    /// Lazily compute and cache the system snapshot.
    pub fn snapshot(&mut self) -> &SystemSnapshot {
        if self.snapshot.is_none() {
            log::debug!("computing system snapshot");
            self.snapshot = Some(interrogator::interrogate(&self.loader));
        }
        self.snapshot.as_ref().unwrap()
    }

    /// Invalidate the cached snapshot; the next call to [`Self::snapshot`]
    /// recomputes it. Does not affect already-constructed runners or
    /// cached factories.
    pub fn refresh(&mut self) {
        self.snapshot = None;
    }

    pub fn is_available(&mut self, backend: Backend) -> bool {
        self.snapshot().backend_available(backend)
    }

    /// Every backend whose snapshot entry reports availability, always
    /// including the software CPU entry.
    pub fn available_backends(&mut self) -> Vec<Backend> {
        self.snapshot().available_backends()
    }

    fn factory_for(&mut self, backend: Backend) -> &mut Box<dyn BackendFactoryImpl> {
        if !self.factories.contains_key(&backend) {
            log::debug!("constructing backend factory for {backend}");
            self.factories.insert(backend, factory::make_factory(backend));
        }
        self.factories.get_mut(&backend).unwrap()
    }

    pub fn devices(&mut self, backend: Backend) -> Result<Vec<DeviceInfo>> {
        let snapshot = self.snapshot().clone();
        self.factory_for(backend).devices(&snapshot)
    }

    /// Construct a runner bound to `device_index`, after verifying the
    /// backend is available and the index is in range.
    pub fn create_runner(&mut self, backend: Backend, device_index: usize) -> Result<Box<dyn hal::Runner>> {
        let snapshot = self.snapshot().clone();
        if !snapshot.backend_available(backend) {
            return Err(ht::ErrorInfo::new(
                ht::ErrorCode::BackendNotAvailable,
                format!("{backend} is not available on this system"),
            ));
        }
        let devices = self.factory_for(backend).devices(&snapshot)?;
        if device_index >= devices.len() {
            return Err(ht::ErrorInfo::new(
                ht::ErrorCode::InvalidArgument,
                format!(
                    "device index {device_index} out of range for {backend} ({} device(s) available)",
                    devices.len()
                ),
            ));
        }
        self.factory_for(backend).create_runner(&snapshot, device_index)
    }
}

impl Default for HarnessEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_ENV: OnceCell<Mutex<HarnessEnvironment>> = OnceCell::new();

/// Process-scope convenience accessor. Library callers that want an
/// isolated environment (tests, embedders running multiple independent
/// harness instances) should construct their own [`HarnessEnvironment`]
/// instead.
pub fn process_env() -> MutexGuard<'static, HarnessEnvironment> {
    PROCESS_ENV
        .get_or_init(|| Mutex::new(HarnessEnvironment::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_backend_is_always_available() {
        let mut env = HarnessEnvironment::new();
        assert!(env.is_available(Backend::Cpu));
        assert!(env.available_backends().contains(&Backend::Cpu));
    }

    #[test]
    fn snapshot_is_cached_until_refresh() {
        let mut env = HarnessEnvironment::new();
        let first = env.snapshot().timestamp.clone();
        let second = env.snapshot().timestamp.clone();
        assert_eq!(first, second);
        env.refresh();
        // `refresh` only invalidates the cache; re-snapshotting must not panic.
        let _ = env.snapshot();
    }

    #[test]
    fn cpu_device_index_out_of_range_is_invalid_argument() {
        let mut env = HarnessEnvironment::new();
        let err = match env.create_runner(Backend::Cpu, 7) {
            Err(e) => e,
            Ok(_) => panic!("expected create_runner to fail for an out-of-range device index"),
        };
        assert_eq!(err.code, ht::ErrorCode::InvalidArgument);
    }

    #[test]
    fn cpu_runner_opens_successfully() {
        let mut env = HarnessEnvironment::new();
        let runner = env.create_runner(Backend::Cpu, 0).unwrap();
        assert_eq!(runner.backend_name(), Backend::Cpu.to_str());
    }
}
