//! Version stamps and their single-owner allocator
//!
//! Per SHARD_MODEL.md §3: the shard's ordering primitive is a monotonic
//! (epoch, counter) stamp. All "happened before" reasoning in the write
//! and recovery paths reduces to comparing these stamps.

mod space;
mod stamp;

pub use space::VersionSpace;
pub use stamp::Version;
