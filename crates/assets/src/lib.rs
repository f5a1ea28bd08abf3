//! Content sources for the zone display.
//!
//! Types:
//!
//! - `AssetSource` enumerates still images and videos and hands back their
//!   bytes; `DirectoryAssets` is the filesystem implementation.
//! - `VideoCache` stages one video at a time into a bounded directory before
//!   the playback engine opens it.
//! - `SpaceProbe` reports free bytes for the cache volume; `DiskSpaceProbe`
//!   asks `sysinfo`.

mod cache;
mod source;

pub use cache::{CacheError, DiskSpaceProbe, SpaceProbe, StagedVideo, VideoCache};
pub use source::{
    AssetError, AssetId, AssetKind, AssetSource, DirectoryAssets, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
