//! Level image assembly.
//!
//! [`Compositor`] turns a set of cached tile slots into one RGBA canvas the
//! size of the level. Decoding is CPU-bound and runs on the blocking pool.

mod compositor;

pub use compositor::{paste_tile, Compositor, DEFAULT_DECODE_CONCURRENCY};
