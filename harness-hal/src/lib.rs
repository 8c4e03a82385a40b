/*! Dynamic driver loading and per-backend `Runner` implementations.
 *
 * This crate knows how to talk to a specific driver API, but nothing
 * about interrogation caching or backend selection policy, which live
 * one layer up in `harness-core`.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

pub mod cpu;
pub mod loader;
pub mod runner;

#[cfg(feature = "cuda")]
pub mod cuda;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use cpu::CpuRunner;
pub use loader::{process_loader, LibraryHandle, RuntimeLoader, ScopedLibrary};
pub use runner::{NativeBuffer, NativeTexture, Runner};
