//! Edit engine: image staging, schema remap and transactional coordination

pub mod asset_reconciler;
pub mod asset_stage;
pub mod asset_store;
pub mod edit_coordinator;
pub mod image_transcoder;
pub mod parameter_remap;
pub mod validation;

pub use asset_reconciler::{plan, AssetPlan, AssetReconciler, Reconciliation};
pub use asset_stage::AssetStage;
pub use asset_store::{AssetCategory, AssetStore, AssetTarget, CleanupFailure, CleanupReport};
pub use edit_coordinator::EditCoordinator;
pub use image_transcoder::ImageTranscoder;
pub use parameter_remap::{remap, RemapPlan};
