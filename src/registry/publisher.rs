use super::manifest::{ManifestError, ManifestList};
use crate::cloud::{RegistryService, ServiceError};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Registry rejected manifest for {repository}:{tag}: {source}")]
    Registry {
        repository: String,
        tag: String,
        source: ServiceError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Created,
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedImage {
    pub repository: String,
    pub tag: String,
    pub digest: Option<String>,
    pub platforms: usize,
}

pub struct RegistryPublisher<'a> {
    registry: &'a dyn RegistryService,
}

impl<'a> RegistryPublisher<'a> {
    pub fn new(registry: &'a dyn RegistryService) -> Self {
        Self { registry }
    }

    /// Creates the repository unless it already exists
    pub async fn ensure_repository(&self, name: &str) -> Result<RepositoryStatus, ServiceError> {
        match self.registry.create_repository(name).await {
            Ok(()) => {
                info!(repository = name, "Repository created");
                Ok(RepositoryStatus::Created)
            }
            Err(e) if e.is_already_exists() => {
                info!(repository = name, "Repository already exists");
                Ok(RepositoryStatus::Existing)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn publish(
        &self,
        repository: &str,
        tag: &str,
        manifest: &ManifestList,
    ) -> Result<PublishedImage, PublishError> {
        manifest.validate()?;
        if manifest.is_single_platform() {
            warn!(
                repository,
                tag, "Publishing a manifest list with a single platform; expected output of a multi-arch build"
            );
        }

        let document = manifest.render()?;
        let digest = self
            .registry
            .put_image(repository, tag, &document, &manifest.media_type)
            .await
            .map_err(|source| PublishError::Registry {
                repository: repository.to_string(),
                tag: tag.to_string(),
                source,
            })?;

        info!(
            repository,
            tag,
            platforms = manifest.manifests.len(),
            digest = digest.as_deref().unwrap_or("-"),
            "Manifest list published"
        );

        Ok(PublishedImage {
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
            platforms: manifest.manifests.len(),
        })
    }
}
