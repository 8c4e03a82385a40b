//! Produces the single authoritative [`SystemSnapshot`] for a process:
//! per-runtime library/executable discovery plus a capability read-off
//! for each. `HarnessEnvironment` is the only thing that calls
//! [`interrogate`]; everything downstream reads the cached result.

use std::io::Read;
use std::process::Command;

use ht::{RuntimeCapabilities, RuntimeInfo, SystemSnapshot};

const CUDA_LIBRARY_PATTERNS: &[&str] = &["cudart", "nvcuda"];
const VULKAN_LIBRARY_PATTERNS: &[&str] = &["vulkan"];
const SHADER_JIT_LIBRARY_PATTERNS: &[&str] = &["slang"];
const SHADER_COMPILER_EXECUTABLE_NAMES: &[&str] = &["slangc", "slangc.exe"];

const COMPUTE_CAPABILITY_PROFILES: &[&str] = &["sm_60", "sm_70", "sm_75", "sm_80", "sm_86", "sm_90"];

pub fn interrogate(loader: &hal::RuntimeLoader) -> SystemSnapshot {
    SystemSnapshot {
        cuda: detect_cuda(loader),
        vulkan: detect_vulkan(loader),
        shader_compiler: detect_shader_compiler(loader),
        timestamp: now_string(),
        hostname: hostname(),
        os_version: os_version(),
        architecture: std::env::consts::ARCH.to_string(),
        product_version: env!("CARGO_PKG_VERSION").to_string(),
        build_timestamp: String::new(),
    }
}

fn detect_cuda(loader: &hal::RuntimeLoader) -> RuntimeInfo {
    let mut libraries = loader.scan(CUDA_LIBRARY_PATTERNS);
    let Some(primary) = primary_of(&libraries, CUDA_LIBRARY_PATTERNS) else {
        return RuntimeInfo::unavailable("CUDA", "CUDA runtime libraries not found");
    };
    let primary = libraries.remove(&primary).unwrap();

    let devices = hal::cuda::enumerate_devices(&primary.absolute_path).unwrap_or_else(|e| {
        log::warn!("CUDA driver library present but device enumeration failed: {e}");
        Vec::new()
    });

    RuntimeInfo {
        available: true,
        name: "CUDA".to_string(),
        version: "unknown".to_string(),
        error_message: String::new(),
        library_paths: vec![primary.absolute_path.clone()],
        executable_paths: Vec::new(),
        primary_library_path: Some(primary.absolute_path.clone()),
        primary_executable_path: None,
        library_file_size: primary.file_size,
        executable_file_size: 0,
        library_checksum: primary.checksum.clone(),
        executable_checksum: String::new(),
        library_last_modified: primary.last_modified.clone(),
        executable_last_modified: String::new(),
        capabilities: RuntimeCapabilities {
            jit_compilation: true,
            precompiled_kernels: true,
            memory_management: true,
            device_enumeration: true,
            performance_counters: true,
            supported_targets: vec!["ptx".to_string(), "cubin".to_string()],
            supported_profiles: COMPUTE_CAPABILITY_PROFILES.iter().map(|s| s.to_string()).collect(),
            supported_stages: vec!["compute".to_string()],
        },
        devices,
    }
}

fn detect_vulkan(loader: &hal::RuntimeLoader) -> RuntimeInfo {
    let mut libraries = loader.scan(VULKAN_LIBRARY_PATTERNS);
    let Some(primary) = primary_of(&libraries, VULKAN_LIBRARY_PATTERNS) else {
        return RuntimeInfo::unavailable("Vulkan", "Vulkan loader library not found");
    };
    let primary = libraries.remove(&primary).unwrap();

    let devices = hal::vulkan::enumerate_devices().unwrap_or_else(|e| {
        log::warn!("Vulkan loader library present but device enumeration failed: {e}");
        Vec::new()
    });

    RuntimeInfo {
        available: true,
        name: "Vulkan".to_string(),
        version: "unknown".to_string(),
        error_message: String::new(),
        library_paths: vec![primary.absolute_path.clone()],
        executable_paths: Vec::new(),
        primary_library_path: Some(primary.absolute_path.clone()),
        primary_executable_path: None,
        library_file_size: primary.file_size,
        executable_file_size: 0,
        library_checksum: primary.checksum.clone(),
        executable_checksum: String::new(),
        library_last_modified: primary.last_modified.clone(),
        executable_last_modified: String::new(),
        capabilities: RuntimeCapabilities {
            jit_compilation: false,
            precompiled_kernels: true,
            memory_management: true,
            device_enumeration: true,
            performance_counters: true,
            supported_targets: vec!["spirv".to_string()],
            supported_profiles: vec!["glsl_450".to_string(), "glsl_460".to_string()],
            supported_stages: vec!["compute".to_string(), "vertex".to_string(), "fragment".to_string()],
        },
        devices,
    }
}

/// Composite probe: a precompile-only executable, a JIT-only runtime
/// library, both, or neither. Executable search prefers in-tree build
/// output directories over `PATH`, mirroring a convenience an in-tree
/// build of the compiler relies on.
fn detect_shader_compiler(loader: &hal::RuntimeLoader) -> RuntimeInfo {
    let executable = find_compiler_executable();
    let jit_libraries = loader.scan(SHADER_JIT_LIBRARY_PATTERNS);
    let jit_primary = primary_of(&jit_libraries, SHADER_JIT_LIBRARY_PATTERNS).and_then(|name| jit_libraries.get(&name).cloned());

    if executable.is_none() && jit_primary.is_none() {
        return RuntimeInfo::unavailable("Shader Compiler", "no shader compiler executable or JIT library found");
    }

    let mut hints: Vec<String> = Vec::new();
    if let Some(path) = &executable {
        hints.extend(probe_compiler_hints(path));
    }

    RuntimeInfo {
        available: true,
        name: "Shader Compiler".to_string(),
        version: "unknown".to_string(),
        error_message: String::new(),
        library_paths: jit_primary.iter().map(|l| l.absolute_path.clone()).collect(),
        executable_paths: executable.iter().cloned().collect(),
        primary_library_path: jit_primary.as_ref().map(|l| l.absolute_path.clone()),
        primary_executable_path: executable.clone(),
        library_file_size: jit_primary.as_ref().map(|l| l.file_size).unwrap_or(0),
        executable_file_size: executable.as_ref().and_then(|p| std::fs::metadata(p).ok()).map(|m| m.len()).unwrap_or(0),
        library_checksum: jit_primary.as_ref().map(|l| l.checksum.clone()).unwrap_or_default(),
        executable_checksum: String::new(),
        library_last_modified: jit_primary.as_ref().map(|l| l.last_modified.clone()).unwrap_or_default(),
        executable_last_modified: String::new(),
        capabilities: RuntimeCapabilities {
            jit_compilation: jit_primary.is_some(),
            precompiled_kernels: executable.is_some(),
            memory_management: false,
            device_enumeration: false,
            performance_counters: false,
            supported_targets: hints,
            supported_profiles: Vec::new(),
            supported_stages: Vec::new(),
        },
        devices: Vec::new(),
    }
}

fn find_compiler_executable() -> Option<String> {
    let mut search_dirs = vec![
        std::path::PathBuf::from("build/_deps/slang-src/bin"),
        std::path::PathBuf::from("_deps/slang-src/bin"),
    ];
    if let Ok(path_var) = std::env::var("PATH") {
        search_dirs.extend(std::env::split_paths(&path_var));
    }
    for dir in search_dirs {
        for name in SHADER_COMPILER_EXECUTABLE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate.to_string_lossy().into_owned());
            }
        }
    }
    None
}

/// Invoke the candidate with `-h`, capturing combined output and
/// tokenizing it case-insensitively for recognized target/profile
/// substrings. A compiler that answers at all is considered present
/// regardless of which tokens were recognized — this is a hint list, not
/// a gate.
fn probe_compiler_hints(executable: &str) -> Vec<String> {
    const KNOWN_TOKENS: &[&str] = &["spirv", "ptx", "glsl", "hlsl", "cuda"];
    let output = match Command::new(executable).arg("-h").output() {
        Ok(output) => output,
        Err(e) => {
            log::debug!("shader compiler probe of {executable} failed to spawn: {e}");
            return Vec::new();
        }
    };
    let mut combined = String::new();
    let _ = std::io::Cursor::new(&output.stdout).read_to_string(&mut combined);
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let lowercase = combined.to_ascii_lowercase();
    KNOWN_TOKENS.iter().filter(|t| lowercase.contains(*t)).map(|t| t.to_string()).collect()
}

/// The first `patterns` entry that scan found anything for, not an
/// arbitrary hash-map key — `scan` keys its result map by pattern, and
/// pattern order is the caller's declared preference (e.g. `cudart`
/// before `nvcuda`).
fn primary_of(libraries: &std::collections::HashMap<String, ht::LibraryInfo>, patterns: &[&str]) -> Option<String> {
    patterns.iter().find(|p| libraries.contains_key(**p)).map(|p| p.to_string())
}

fn now_string() -> String {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs().to_string(),
        Err(_) => "0".to_string(),
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")).unwrap_or_else(|_| "unknown".to_string())
}

fn os_version() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}
