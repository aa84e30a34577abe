use crate::volume_loader::{DecodeOutcome, VolumeLoader, VolumeLoaderError};

use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;

/// Source of the processed volume's bytes.
pub trait ResourceFetcher {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VolumeLoaderError>>;
}

/// Reads local paths and `file://` URLs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

impl FileFetcher {
    fn resolve(location: &str) -> Result<PathBuf, VolumeLoaderError> {
        if let Some(path) = location.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        match location.split_once("://") {
            Some((scheme, _)) => Err(VolumeLoaderError::Transport(format!(
                "unsupported scheme '{scheme}'"
            ))),
            None => Ok(PathBuf::from(location)),
        }
    }
}

impl ResourceFetcher for FileFetcher {
    fn fetch<'a>(&'a self, location: &'a str) -> BoxFuture<'a, Result<Vec<u8>, VolumeLoaderError>> {
        async move {
            let path = Self::resolve(location)?;
            tokio::fs::read(&path)
                .await
                .map_err(|e| VolumeLoaderError::Transport(format!("{}: {e}", path.display())))
        }
        .boxed()
    }
}

/// Fetch a resource and decode it into a scalar field.
pub async fn fetch_and_decode<F>(fetcher: &F, location: &str) -> Result<DecodeOutcome, VolumeLoaderError>
where
    F: ResourceFetcher + ?Sized,
{
    let bytes = fetcher.fetch(location).await?;
    log::debug!("fetched {} bytes from {location}", bytes.len());
    VolumeLoader::decode(bytes)
}
