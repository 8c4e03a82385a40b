/*! Shared data model and error types for the kernel execution harness.
 *
 * This crate carries no backend logic; it is the vocabulary every other
 * crate in the workspace speaks.
 */
#![warn(trivial_casts, trivial_numeric_casts, unused_extern_crates)]

pub mod backend;
pub mod device;
pub mod error;
pub mod library;
pub mod resource;
pub mod runtime;
pub mod snapshot;
pub mod timing;

pub use backend::Backend;
pub use device::DeviceInfo;
pub use error::{ErrorCategory, ErrorCode, ErrorInfo, Result};
pub use library::{FileMetadata, LibraryInfo, LoaderDiagnostics};
pub use resource::{BufferRole, BufferUsage, TextureDesc, TextureFlags, TextureFormat};
pub use runtime::{RuntimeCapabilities, RuntimeInfo};
pub use snapshot::{RuntimeKind, SystemSnapshot};
pub use timing::TimingSample;

/// `⌈w/16⌉, ⌈h/16⌉, max(1, d)` for a fixed 16×16×1 compute block.
///
/// Pure and backend-independent, so it lives here as a free function rather
/// than on the `Runner` trait.
pub fn calc_dispatch(w: u32, h: u32, d: u32) -> (u32, u32, u32) {
    const BLOCK: u32 = 16;
    let gx = w.div_ceil(BLOCK);
    let gy = h.div_ceil(BLOCK);
    let gz = d.max(1);
    (gx, gy, gz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_calculator_rounds_up_to_block_size() {
        assert_eq!(calc_dispatch(0, 0, 0), (0, 0, 1));
        assert_eq!(calc_dispatch(1, 1, 1), (1, 1, 1));
        assert_eq!(calc_dispatch(16, 16, 1), (1, 1, 1));
        assert_eq!(calc_dispatch(17, 16, 1), (2, 1, 1));
        assert_eq!(calc_dispatch(1920, 1080, 1), (120, 68, 1));
        assert_eq!(calc_dispatch(32, 32, 0), (2, 2, 1));
    }

    #[test]
    fn dispatch_calculator_property_sweep() {
        for w in 0..40u32 {
            for h in 0..40u32 {
                let (gx, gy, _) = calc_dispatch(w, h, 1);
                assert_eq!(gx, (w + 15) / 16);
                assert_eq!(gy, (h + 15) / 16);
            }
        }
    }
}
