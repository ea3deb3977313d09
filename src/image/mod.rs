//! Container image build from a local context directory

use crate::cloud::{ImageBuildService, ServiceError};
use crate::progress::{ProgressEvent, ProgressHandler};
use futures_util::StreamExt;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use ignore::WalkBuilder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

const DOCKERIGNORE: &str = ".dockerignore";

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Build context not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Dockerfile {dockerfile} not found in {context}")]
    DockerfileMissing { context: PathBuf, dockerfile: String },

    #[error("Failed to archive build context: {0}")]
    Archive(#[from] io::Error),

    #[error("Failed to walk build context: {0}")]
    Walk(#[from] ignore::Error),

    #[error("Failed to submit build: {0}")]
    Submit(#[source] ServiceError),

    #[error("Build failed after {lines} line(s) of output: {source}")]
    Build { lines: usize, source: ServiceError },
}

/// Tar archive of a build context
#[derive(Debug, Clone)]
pub struct ContextArchive {
    pub bytes: Vec<u8>,
    pub files: usize,
    /// `sha256:<hex>` of the archive bytes
    pub digest: String,
}

/// Result of a completed build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub tag: String,
    pub context_digest: String,
    pub log_lines: usize,
}

/// Root-anchored `.dockerignore` rules, last match wins
fn dockerignore_rules(context: &Path) -> Result<Gitignore, ImageError> {
    let mut builder = GitignoreBuilder::new(context);
    let path = context.join(DOCKERIGNORE);
    if path.is_file() {
        let contents = std::fs::read_to_string(&path)?;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (negated, pattern) = match line.strip_prefix('!') {
                Some(rest) => (true, rest.trim()),
                None => (false, line),
            };
            let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
            if pattern.is_empty() {
                continue;
            }
            let anchored = if negated {
                format!("!/{}", pattern)
            } else {
                format!("/{}", pattern)
            };
            builder.add_line(Some(path.clone()), &anchored)?;
        }
    }
    Ok(builder.build()?)
}

/// Archives `context` the way the Docker CLI would send it: only the root
/// `.dockerignore` applies, and the Dockerfile and `.dockerignore` are
/// always included.
pub fn archive_context(context: &Path, dockerfile: &str) -> Result<ContextArchive, ImageError> {
    if !context.is_dir() {
        return Err(ImageError::ContextNotFound(context.to_path_buf()));
    }

    let rules = dockerignore_rules(context)?;
    let dockerfile = Path::new(dockerfile.trim_start_matches("./"));
    let walker = WalkBuilder::new(context)
        .standard_filters(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    let mut files = 0;

    for entry in walker {
        let entry = entry?;
        let path = entry.path();
        let relative = match path.strip_prefix(context) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let is_dir = entry.file_type().is_some_and(|ft| ft.is_dir());

        let always_sent = relative == dockerfile || relative == Path::new(DOCKERIGNORE);
        // Excluded directories are still walked so exception patterns can
        // bring files back.
        if !always_sent && rules.matched_path_or_any_parents(relative, is_dir).is_ignore() {
            continue;
        }

        match entry.file_type() {
            Some(_) if is_dir => builder.append_dir(relative, path)?,
            Some(_) => {
                builder.append_path_with_name(path, relative)?;
                files += 1;
            }
            None => continue,
        }
    }

    let bytes = builder.into_inner()?;
    let digest = format!("sha256:{}", hex::encode(Sha256::digest(&bytes)));
    debug!(files, bytes = bytes.len(), digest = %digest, "Build context archived");

    Ok(ContextArchive {
        bytes,
        files,
        digest,
    })
}

pub struct ImageBuilder<'a> {
    images: &'a dyn ImageBuildService,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(images: &'a dyn ImageBuildService) -> Self {
        Self { images }
    }

    /// Builds `tag` from `context`, reporting every log line until the
    /// build stream closes.
    pub async fn build(
        &self,
        context: &Path,
        dockerfile: &str,
        tag: &str,
        progress: &dyn ProgressHandler,
    ) -> Result<BuildArtifact, ImageError> {
        if !context.join(dockerfile).is_file() {
            return Err(if context.is_dir() {
                ImageError::DockerfileMissing {
                    context: context.to_path_buf(),
                    dockerfile: dockerfile.to_string(),
                }
            } else {
                ImageError::ContextNotFound(context.to_path_buf())
            });
        }

        let archive = archive_context(context, dockerfile)?;
        let mut lines = self
            .images
            .build(archive.bytes, dockerfile, tag)
            .await
            .map_err(ImageError::Submit)?;

        let mut log_lines = 0;
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) => {
                    log_lines += 1;
                    progress.on_progress(&ProgressEvent::BuildOutput { line });
                }
                Err(source) => {
                    return Err(ImageError::Build {
                        lines: log_lines,
                        source,
                    })
                }
            }
        }

        info!(tag, log_lines, "Image built");
        Ok(BuildArtifact {
            tag: tag.to_string(),
            context_digest: archive.digest,
            log_lines,
        })
    }
}
