//! The mask refinement and compositing pipeline
//!
//! raw mask → [`MaskRefiner`] → [`AlphaCompositor`] or [`BackgroundReplacer`]
//! → optional [`ContentCropper`]. [`MaskExporter`] branches off the refined mask
//! instead of compositing.
//!
//! Every stage is a synchronous function over borrowed inputs that returns a
//! new value, so stages can be called concurrently on distinct images.

pub mod compose;
pub mod crop;
pub mod export;
pub mod filters;
pub mod refine;
pub mod replace;

pub use compose::AlphaCompositor;
pub use crop::ContentCropper;
pub use export::{MaskExporter, MaskScale};
pub use filters::{GaussianKernel, ImageFilters, NativeFilters, StructuringElement};
pub use refine::MaskRefiner;
pub use replace::BackgroundReplacer;
