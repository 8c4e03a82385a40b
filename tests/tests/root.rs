//! Cross-crate integration scenarios, run through a hand-rolled
//! `libtest-mimic` harness instead of `#[test]`, since most scenarios here
//! need to be individually skippable depending on what hardware is
//! actually present on the host running them.

use libtest_mimic::{Arguments, Failed, Trial};

use ht::{Backend, BufferRole, BufferUsage};

fn gpu_tests_enabled() -> bool {
    std::env::var("HARNESS_RUN_GPU_TESTS").is_ok_and(|v| v != "0")
}

/// `ht::ErrorInfo` implements `std::error::Error` but `libtest_mimic::Failed`
/// only converts from strings, so every fallible call below goes through
/// this instead of a bare `?`.
trait OrFailed<T> {
    fn or_failed(self) -> Result<T, Failed>;
}

impl<T> OrFailed<T> for ht::Result<T> {
    fn or_failed(self) -> Result<T, Failed> {
        self.map_err(|e| Failed::from(e.message))
    }
}

fn main() {
    env_logger::try_init().ok();
    let args = Arguments::from_args();

    let mut trials = vec![
        Trial::test("cpu_backend_is_always_available", cpu_backend_is_always_available),
        Trial::test("availability_is_monotonic_across_calls", availability_is_monotonic_across_calls),
        Trial::test("snapshot_identity_is_stable_until_refresh", snapshot_identity_is_stable_until_refresh),
        Trial::test("cpu_kernel_runs_end_to_end", cpu_kernel_runs_end_to_end),
        Trial::test("cpu_buffer_upload_past_bounds_is_rejected", cpu_buffer_upload_past_bounds_is_rejected),
        Trial::test("dispatch_without_load_is_rejected", dispatch_without_load_is_rejected),
        Trial::test("kernel_drop_does_not_panic", kernel_drop_does_not_panic),
    ];

    for backend in [Backend::Cuda, Backend::Vulkan] {
        let name = format!("{}_backend_opens_when_available", backend.to_str());
        let trial = Trial::test(name, move || hardware_backend_opens_when_available(backend));
        trials.push(if gpu_tests_enabled() { trial } else { trial.with_ignored_flag(true) });
    }

    libtest_mimic::run(&args, trials).exit();
}

fn cpu_backend_is_always_available() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    if !harness.is_available(Backend::Cpu) {
        return Err("CPU backend reported unavailable".into());
    }
    Ok(())
}

fn availability_is_monotonic_across_calls() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let first = harness.available_backends();
    let second = harness.available_backends();
    if first != second {
        return Err(format!("available backends changed between calls: {first:?} vs {second:?}").into());
    }
    Ok(())
}

fn snapshot_identity_is_stable_until_refresh() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let first = harness.snapshot().timestamp.clone();
    let second = harness.snapshot().timestamp.clone();
    if first != second {
        return Err("snapshot timestamp changed without an explicit refresh".into());
    }
    harness.refresh();
    let _ = harness.snapshot();
    Ok(())
}

fn cpu_kernel_runs_end_to_end() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let mut kernel = harness.open(Backend::Cpu, 0).or_failed()?;

    kernel.load(b"placeholder bytecode", "main").or_failed()?;
    kernel.set_parameters(&[1, 2, 3, 4]).or_failed()?;

    let input = kernel.create_buffer(256, BufferRole::Storage, BufferUsage::empty()).or_failed()?;
    input.upload(0, &[7u8; 32]).or_failed()?;
    kernel.bind_buffer(0, input.clone()).or_failed()?;

    kernel.dispatch_for_extent(64, 64, 1).or_failed()?;
    kernel.wait().or_failed()?;

    let timing = kernel.last_timing().ok_or("expected a timing sample after dispatch")?;
    if !timing.is_complete {
        return Err("CPU dispatch timing should always report complete".into());
    }

    let echoed = input.download(0, 32).or_failed()?;
    if echoed != vec![7u8; 32] {
        return Err("buffer contents changed unexpectedly across a dispatch with no real compute".into());
    }
    Ok(())
}

fn cpu_buffer_upload_past_bounds_is_rejected() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let mut kernel = harness.open(Backend::Cpu, 0).or_failed()?;
    let buffer = kernel.create_buffer(16, BufferRole::Storage, BufferUsage::empty()).or_failed()?;
    match buffer.upload(8, &[0u8; 16]) {
        Ok(()) => Err("expected an out-of-bounds upload to fail".into()),
        Err(e) if e.code == ht::ErrorCode::InvalidArgument => Ok(()),
        Err(e) => Err(format!("unexpected error code for an out-of-bounds upload: {:?}", e.code).into()),
    }
}

fn dispatch_without_load_is_rejected() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let mut kernel = harness.open(Backend::Cpu, 0).or_failed()?;
    match kernel.dispatch(1, 1, 1) {
        Ok(()) => Err("expected dispatch before load_kernel to fail".into()),
        Err(e) if e.code == ht::ErrorCode::BackendNotAvailable => Ok(()),
        Err(e) => Err(format!("unexpected error code for dispatch-before-load: {:?}", e.code).into()),
    }
}

fn kernel_drop_does_not_panic() -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    let mut kernel = harness.open(Backend::Cpu, 0).or_failed()?;
    kernel.load(b"placeholder bytecode", "main").or_failed()?;
    kernel.dispatch(1, 1, 1).or_failed()?;
    drop(kernel);
    drop(harness);
    Ok(())
}

fn hardware_backend_opens_when_available(backend: Backend) -> Result<(), Failed> {
    let mut harness = harness::Harness::new();
    if !harness.is_available(backend) {
        return Err(format!("{backend} is not available on this host; re-run with HARNESS_RUN_GPU_TESTS unset to skip").into());
    }
    let kernel = harness.open(backend, 0).or_failed()?;
    if kernel.backend() != backend {
        return Err("opened kernel reports the wrong backend".into());
    }
    Ok(())
}
