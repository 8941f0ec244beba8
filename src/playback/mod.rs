//! Ambient effect playback
//!
//! The effect library (manifest-driven asset loading), its fetch and upload
//! collaborators, and the loop player that renders the selected asset.

pub mod fetch;
mod library;
mod loop_player;
mod store;

#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{AssetFetcher, EffectUploader, MANIFEST_FILE};
pub use library::{AssetFailure, AssetList, EffectLibrary, ReloadReport};
pub use loop_player::{LoopPlayer, PlaybackHandle, SourceState};
pub use store::LocalEffectStore;
