//! Per-file size lookup.

use std::future::Future;
use std::io;
use std::path::Path;
use std::pin::Pin;

/// Boxed future used by the object-safe collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Looks up the size of a single file.
///
/// Worker units call this concurrently; implementations must be shareable
/// across tasks.
pub trait FileStat: Send + Sync + 'static {
    /// Size of `path` in bytes.
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>>;
}

/// Reads sizes from the filesystem with `tokio::fs::metadata`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsStat;

impl FileStat for FsStat {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        Box::pin(async move {
            let metadata = tokio::fs::metadata(path).await?;
            Ok(metadata.len())
        })
    }
}
