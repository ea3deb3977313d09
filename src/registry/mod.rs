//! Registry repository and manifest-list publication

pub mod manifest;
pub mod publisher;

pub use manifest::{ManifestError, ManifestList, Platform, PlatformManifest};
pub use publisher::{PublishError, PublishedImage, RegistryPublisher, RepositoryStatus};
