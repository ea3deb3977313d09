use super::{BuildLogStream, ImageBuildService, ServiceError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::image::BuildImageOptions;
use bollard::Docker;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::debug;

/// Image builds on the local Docker daemon
#[derive(Debug, Clone)]
pub struct DockerBuilder {
    docker: Docker,
}

impl DockerBuilder {
    pub fn connect() -> Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ImageBuildService for DockerBuilder {
    async fn build<'a>(
        &'a self,
        context_archive: Vec<u8>,
        dockerfile: &str,
        tag: &str,
    ) -> Result<BuildLogStream<'a>, ServiceError> {
        let options = BuildImageOptions {
            dockerfile: dockerfile.to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        debug!(
            tag,
            dockerfile,
            context_bytes = context_archive.len(),
            "Submitting image build"
        );

        let stream = self
            .docker
            .build_image(options, None, Some(Bytes::from(context_archive)))
            .filter_map(|item| async move {
                match item {
                    Ok(info) => {
                        // The daemon reports build failures in-band
                        if let Some(error) = info.error {
                            return Some(Err(ServiceError::Rejected(error)));
                        }
                        info.stream
                            .or(info.status)
                            .map(|line| line.trim_end().to_string())
                            .filter(|line| !line.is_empty())
                            .map(Ok)
                    }
                    Err(e) => Some(Err(ServiceError::rejected(e.to_string()))),
                }
            });

        Ok(stream.boxed())
    }
}
