//! Turning one locked variant into a source descriptor
//!
//! Path gems need nothing fetched. Git gems are hashed at their locked
//! revision. Registry gems are hashed from a local or downloaded artifact.
//! A fetch failure only affects the gem it happened to: the variant becomes
//! [`SourceDescriptor::Empty`] and the run goes on.

use crate::fetcher::{FetchError, HashFetcher};
use crate::gemset::{ResolvedVariant, SourceDescriptor};
use crate::model::{LockedPackage, Origin};
use crate::platform::Platform;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Unknown bundler source '{kind}' for gem {name}")]
    UnknownOrigin { name: String, kind: String },
}

pub struct SourceResolver<'a> {
    fetcher: &'a dyn HashFetcher,
}

impl<'a> SourceResolver<'a> {
    pub fn new(fetcher: &'a dyn HashFetcher) -> Self {
        Self { fetcher }
    }

    pub fn resolve<'p>(
        &self,
        package: &'p LockedPackage,
    ) -> Result<ResolvedVariant<'p>, SourceError> {
        let outcome = match &package.origin {
            Origin::Path { path } => Ok(SourceDescriptor::Path { path: path.clone() }),
            Origin::Git {
                url,
                revision,
                submodules,
                ..
            } => self.git(url, revision, *submodules),
            Origin::Registry { remotes } => self.registry(package, remotes),
            Origin::Unknown { kind } => {
                return Err(SourceError::UnknownOrigin {
                    name: package.name.clone(),
                    kind: kind.clone(),
                });
            }
        };

        let source = outcome.unwrap_or_else(|err| {
            warn!(gem = %package.name, "Skipping {}: {}", package, err);
            SourceDescriptor::Empty {
                reason: err.to_string(),
            }
        });

        Ok(ResolvedVariant { package, source })
    }

    fn git(
        &self,
        url: &str,
        revision: &str,
        submodules: bool,
    ) -> Result<SourceDescriptor, FetchError> {
        let sha256 = self.fetcher.revision_hash(url, revision, submodules)?;
        Ok(SourceDescriptor::Git {
            url: url.to_string(),
            rev: revision.to_string(),
            sha256,
            fetch_submodules: submodules,
        })
    }

    fn registry(
        &self,
        package: &LockedPackage,
        remotes: &[String],
    ) -> Result<SourceDescriptor, FetchError> {
        let hash = self.fetcher.artifact_hash(package, remotes)?;
        let native = hash.platform.as_deref().and_then(Platform::parse);

        Ok(SourceDescriptor::Gem {
            remotes: match hash.remote {
                Some(remote) => vec![remote],
                None => remotes.to_vec(),
            },
            sha256: hash.sha256,
            target: hash.platform,
            target_cpu: native.as_ref().and_then(|p| p.cpu.clone()),
            target_os: native.map(|p| p.os),
        })
    }
}
