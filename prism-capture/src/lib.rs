//! Prism Capture - Captured camera frames for scan fusion
//!
//! This crate holds the camera side of a scan snapshot:
//!
//! - [`CapturedFrame`]: an RGBA8/BGRA8 image with its pose and pinhole intrinsics
//! - [`FrameIndex`]: time-ordered frames with projection and pixel sampling
//! - [`FrameSource`]: where frames come from (image files, memory)
//!
//! ## Example
//!
//! ```ignore
//! use prism_capture::{FrameIndex, collect_frames, ImageFileSource};
//!
//! let mut source = ImageFileSource::new(descriptors);
//! let index = collect_frames(&mut source)?;
//! for frame in &index {
//!     let p = frame.project(world_point);
//! }
//! ```

mod frame;
mod index;
mod source;

pub use frame::{CapturedFrame, FrameError, Intrinsics, PixelBuffer, PixelFormat, Projection};
pub use index::FrameIndex;
pub use source::{
    FrameDescriptor, FrameSource, ImageFileSource, MemoryFrameSource, collect_frames,
    load_frame_image,
};
