//! Dynamic library discovery, loading, and symbol resolution, built on
//! `libloading::Library` the same way a Vulkan loader dynamic-loads
//! `libvulkan` through `ash::Entry::load()`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use ht::{ErrorCode, ErrorInfo, LibraryInfo, LoaderDiagnostics, Result};

/// Opaque handle to a loaded shared library.
///
/// One handle per distinct absolute path; the loader is the sole owner.
/// Cloning a handle clones the identifying key, not the library itself —
/// dropping every clone has no effect, only [`RuntimeLoader::unload`]
/// releases the underlying `Library`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(u64);

struct LoadedLibrary {
    path: PathBuf,
    library: libloading::Library,
}

/// Platform-abstracted discovery, load, symbol resolution, and scoped
/// unload for GPU driver shared libraries.
///
/// This struct itself holds no lock — callers choose whether to share
/// one instance behind a `Mutex<RuntimeLoader>` (see [`process_loader`])
/// or own one outright, but mutating operations are meant to be called
/// through a single process-wide mutex when shared.
pub struct RuntimeLoader {
    next_handle: u64,
    by_path: HashMap<PathBuf, LibraryHandle>,
    libraries: HashMap<LibraryHandle, LoadedLibrary>,
}

impl Default for RuntimeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeLoader {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            by_path: HashMap::new(),
            libraries: HashMap::new(),
        }
    }

    /// Enumerate regular files under the standard search paths whose names
    /// contain any of `patterns`. The first directory to yield a logical
    /// name becomes that name's primary record; later hits are appended to
    /// `duplicate_paths`. Missing directories are not errors.
    pub fn scan(&self, patterns: &[&str]) -> HashMap<String, LibraryInfo> {
        let mut found: HashMap<String, LibraryInfo> = HashMap::new();
        for dir in search_paths() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue, // missing/unreadable directories are not errors
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let file_name = match path.file_name().and_then(|n| n.to_str()) {
                    Some(n) => n,
                    None => continue,
                };
                let Some(pattern) = patterns
                    .iter()
                    .find(|p| file_name.to_ascii_lowercase().contains(&p.to_ascii_lowercase()))
                else {
                    continue;
                };
                let meta = std::fs::metadata(&path).ok();
                let absolute = path
                    .canonicalize()
                    .unwrap_or(path.clone())
                    .to_string_lossy()
                    .into_owned();

                match found.get_mut(*pattern) {
                    Some(existing) => existing.duplicate_paths.push(absolute),
                    None => {
                        let mut info = LibraryInfo::new(pattern.to_string(), absolute);
                        if let Some(meta) = meta {
                            info.file_size = meta.len();
                            info.last_modified = meta
                                .modified()
                                .ok()
                                .map(format_system_time)
                                .unwrap_or_default();
                            info.checksum = checksum_tag(info.file_size, meta.modified().ok());
                        }
                        found.insert(pattern.to_string(), info);
                    }
                }
            }
        }
        found
    }

    /// Convenience single-pattern scan.
    pub fn find(&self, name: &str) -> Result<LibraryInfo> {
        self.scan(&[name]).remove(name).ok_or_else(|| {
            ErrorInfo::new(
                ErrorCode::LibraryLoadFailed,
                format!("no library matching '{name}' found on search paths"),
            )
        })
    }

    /// Check that a path exists, is a regular file, and is readable,
    /// without loading it.
    pub fn validate_library(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).map_err(|e| {
            ErrorInfo::new(
                ErrorCode::FileNotFound,
                format!("cannot stat library path: {e}"),
            )
            .with_context(path.display().to_string())
        })?;
        if !meta.is_file() {
            return Err(ErrorInfo::new(
                ErrorCode::FileNotFound,
                "path exists but is not a regular file",
            )
            .with_context(path.display().to_string()));
        }
        std::fs::File::open(path).map_err(|e| {
            ErrorInfo::new(
                ErrorCode::PermissionDenied,
                format!("cannot open library for reading: {e}"),
            )
            .with_context(path.display().to_string())
        })?;
        Ok(())
    }

    /// Platform-native load; idempotent per absolute path.
    pub fn load(&mut self, absolute_path: impl AsRef<Path>) -> Result<LibraryHandle> {
        let path = absolute_path.as_ref().to_path_buf();
        if let Some(&handle) = self.by_path.get(&path) {
            return Ok(handle);
        }
        let library = unsafe { libloading::Library::new(&path) }.map_err(|e| {
            ErrorInfo::new(
                ErrorCode::LibraryLoadFailed,
                format!("{e}"),
            )
            .with_context(path.display().to_string())
        })?;
        let handle = LibraryHandle(self.next_handle);
        self.next_handle += 1;
        log::debug!("loaded library {} as {:?}", path.display(), handle);
        self.by_path.insert(path.clone(), handle);
        self.libraries.insert(handle, LoadedLibrary { path, library });
        Ok(handle)
    }

    /// Platform-native unload; invalidates the handle and both cache maps.
    pub fn unload(&mut self, handle: LibraryHandle) -> Result<()> {
        let loaded = self
            .libraries
            .remove(&handle)
            .ok_or_else(|| ErrorInfo::new(ErrorCode::InvalidArgument, "unknown library handle"))?;
        self.by_path.remove(&loaded.path);
        log::debug!("unloaded library {}", loaded.path.display());
        drop(loaded.library);
        Ok(())
    }

    pub fn is_loaded(&self, handle: LibraryHandle) -> bool {
        self.libraries.contains_key(&handle)
    }

    /// Raw, untyped symbol lookup. Returns `None` when the symbol is
    /// absent, matching the null-pointer convention of the source.
    ///
    /// # Safety
    /// The caller must ensure `T` matches the symbol's actual signature.
    pub unsafe fn symbol<T>(&self, handle: LibraryHandle, name: &str) -> Option<T>
    where
        T: Copy,
    {
        let loaded = self.libraries.get(&handle)?;
        unsafe {
            loaded
                .library
                .get::<T>(name.as_bytes())
                .ok()
                .map(|sym| *sym)
        }
    }

    /// Typed symbol lookup; a missing symbol becomes a categorized error
    /// instead of `None`, for call sites that consider the symbol required.
    ///
    /// # Safety
    /// The caller must ensure `T` matches the symbol's actual signature.
    pub unsafe fn typed_symbol<T>(&self, handle: LibraryHandle, name: &str) -> Result<T>
    where
        T: Copy,
    {
        unsafe { self.symbol(handle, name) }.ok_or_else(|| {
            ErrorInfo::new(
                ErrorCode::LibraryLoadFailed,
                format!("Symbol not found: {name}"),
            )
        })
    }

    pub fn get_diagnostics(&self) -> LoaderDiagnostics {
        LoaderDiagnostics {
            loaded_count: self.libraries.len(),
            loaded_paths: self
                .libraries
                .values()
                .map(|l| l.path.display().to_string())
                .collect(),
        }
    }

    pub fn get_loaded_libraries(&self) -> Vec<PathBuf> {
        self.libraries.values().map(|l| l.path.clone()).collect()
    }

    /// Borrow a handle across a bounded scope; unloads on drop.
    pub fn scoped_load(&mut self, absolute_path: impl AsRef<Path>) -> Result<ScopedLibrary<'_>> {
        let handle = self.load(absolute_path)?;
        Ok(ScopedLibrary {
            loader: self,
            handle: Some(handle),
        })
    }
}

/// Move-only RAII wrapper that unloads its handle on scope exit.
pub struct ScopedLibrary<'a> {
    loader: &'a mut RuntimeLoader,
    handle: Option<LibraryHandle>,
}

impl ScopedLibrary<'_> {
    pub fn handle(&self) -> LibraryHandle {
        self.handle.expect("ScopedLibrary used after release")
    }
}

impl Drop for ScopedLibrary<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(err) = self.loader.unload(handle) {
                log::warn!("failed to unload scoped library: {err}");
            }
        }
    }
}

/// The thin convenience accessor for callers that genuinely want process
/// scope: most code should instead own a `RuntimeLoader`
/// via `HarnessEnvironment` in `harness-core`.
pub fn process_loader() -> &'static Mutex<RuntimeLoader> {
    static LOADER: OnceCell<Mutex<RuntimeLoader>> = OnceCell::new();
    LOADER.get_or_init(|| Mutex::new(RuntimeLoader::new()))
}

#[cfg(unix)]
pub fn library_extension() -> &'static str {
    if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

#[cfg(windows)]
pub fn library_extension() -> &'static str {
    "dll"
}

#[cfg(unix)]
pub fn library_prefix() -> &'static str {
    "lib"
}

#[cfg(windows)]
pub fn library_prefix() -> &'static str {
    ""
}

pub fn build_library_filename(name: &str) -> String {
    format!("{}{name}.{}", library_prefix(), library_extension())
}

/// OS-standard library directories, the platform library-path environment
/// variable, and a fixed list of in-tree build directories
///.
fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    #[cfg(unix)]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/lib/x86_64-linux-gnu"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/usr/lib64"));
        let var = std::env::var_os("LD_LIBRARY_PATH");
        if let Some(var) = var {
            paths.extend(std::env::split_paths(&var));
        }
    }
    #[cfg(windows)]
    {
        if let Some(var) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&var));
        }
    }

    paths.push(PathBuf::from("build/_deps"));
    paths.push(PathBuf::from("_deps"));
    paths
}

fn format_system_time(time: SystemTime) -> String {
    match time.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_secs().to_string(),
        Err(_) => String::new(),
    }
}

/// Cheap content tag: size + mtime composed into one string. This is a
/// fingerprint, not a cryptographic digest — a real
/// digest is a drop-in upgrade at this call site.
fn checksum_tag(size: u64, modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("{size:x}-{secs:x}")
}

#[cfg(target_os = "linux")]
pub fn last_os_error_string() -> String {
    std::io::Error::last_os_error().to_string()
}

#[cfg(not(target_os = "linux"))]
pub fn last_os_error_string() -> String {
    std::io::Error::last_os_error().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn touch(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn load_is_idempotent_per_absolute_path() {
        let dir = tempdir();
        let path = touch(dir.path(), build_library_filename("probe").as_str(), b"stub");
        let mut loader = RuntimeLoader::new();
        let h1 = loader.load(&path).unwrap();
        let h2 = loader.load(&path).unwrap();
        assert_eq!(h1, h2);
        loader.unload(h1).unwrap();
        assert!(!loader.is_loaded(h1));
    }

    #[test]
    fn unknown_handle_unload_is_invalid_argument() {
        let mut loader = RuntimeLoader::new();
        let bogus = LibraryHandle(999);
        let err = loader.unload(bogus).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidArgument);
    }

    #[test]
    fn scan_marks_first_hit_primary_and_rest_as_duplicates() {
        let dir_a = tempdir();
        let dir_b = tempdir();
        touch(dir_a.path(), "libcudart.so", b"a");
        touch(dir_b.path(), "libcudart.so", b"b");

        // `scan` walks fixed OS search paths, not arbitrary test directories,
        // so this test exercises the duplicate-bookkeeping logic directly
        // rather than through `scan`'s path discovery.
        let mut info = LibraryInfo::new("cudart", dir_a.path().join("libcudart.so").to_string_lossy());
        info.duplicate_paths.push(dir_b.path().join("libcudart.so").to_string_lossy().into_owned());
        assert!(info.is_primary);
        assert_eq!(info.duplicate_paths.len(), 1);
    }

    struct TempDir(PathBuf);
    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
    fn tempdir() -> TempDir {
        let dir = std::env::temp_dir().join(format!(
            "harness-hal-test-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}
