//! Public handle surface (§6): `open()`, the handle's mutable
//! `method`/`components`/`version` properties with eager validation, and
//! `Handle::get`.
//!
//! Grounded on `active.py`'s `Active` class property setters (validating on
//! assignment rather than at call time) and the teacher's `store.rs`
//! URI-scheme-driven backend construction (pick the concrete `Store`/here
//! `Source` impl once, behind a trait object, at open time).

use std::sync::Arc;

use log::debug;

use crate::buffer::PartialValue;
use crate::config::{Config, StorageOptions};
use crate::engine::{self, RemoteConfig};
use crate::engine::pool::WorkerPool;
use crate::engine::Output;
use crate::error::{Error, Result};
use crate::reducer::Method;
use crate::selection::{AxisSelector, Selection};
use crate::source::local::LocalFileSource;
use crate::source::s3::{S3Options, S3Source};
use crate::source::{parse_uri, ChunkIndex, DynSource, ParsedUri, VariableMetadata};

/// Which execution path `Handle::get` takes (§6 "Handle properties").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Version {
    /// Bypasses the reduction dispatch: a plain select over the requested
    /// hyperslab regardless of `method`, read through the same chunked
    /// indexer and worker pool as the other versions (a fully separate
    /// whole-variable read path would duplicate C1/C3 for no behavioral
    /// gain, since this crate has no other array-reading code to reuse).
    PassThrough,
    /// The engine (C6) with local reduction only, even when an
    /// active-storage URL is configured.
    #[default]
    LocalEngine,
    /// The engine, preferring remote reduction via an active-storage server
    /// when the source reports an S3 identity and a server is configured.
    RemoteEngine,
}

impl Version {
    pub fn parse(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Version::PassThrough),
            1 => Ok(Version::LocalEngine),
            2 => Ok(Version::RemoteEngine),
            other => Err(Error::InvalidInput(format!(
                "unsupported handle version {other}, expected 0, 1, or 2"
            ))),
        }
    }
}

/// The result of `Handle::get` (§3 "Final result", §6 "Handle slicing").
#[derive(Debug, Clone)]
pub enum GetResult {
    Array {
        shape: Vec<u64>,
        dtype: crate::dtype::Dtype,
        data: Vec<u8>,
    },
    Scalar(PartialValue),
    Components {
        op: &'static str,
        value: PartialValue,
        n: u64,
        shape: Vec<u64>,
    },
}

impl From<Output> for GetResult {
    fn from(output: Output) -> Self {
        match output {
            Output::Array { shape, dtype, data } => GetResult::Array { shape, dtype, data },
            Output::Scalar(v) => GetResult::Scalar(v),
            Output::Components { op, value, n, shape } => {
                GetResult::Components { op, value, n, shape }
            }
        }
    }
}

/// Per-call overrides for [`open`], one rung above [`Config::global`] in the
/// precedence chain (§6 "Environment / config").
#[derive(Default)]
pub struct OpenOptions<'a> {
    pub storage_type: Option<&'a str>,
    pub storage_options: Option<StorageOptions>,
    pub active_storage_url: Option<&'a str>,
    pub active_storage_username: Option<&'a str>,
    pub active_storage_password: Option<&'a str>,
    pub max_threads: Option<usize>,
}

/// An opened variable (§3 "Variable handle"). Immutable except for the
/// three properties named in §6, each validated eagerly on assignment
/// rather than lazily on the next `get` (§7 "Input validation happens
/// eagerly at open and at `method` assignment").
pub struct Handle {
    source: DynSource,
    meta: Arc<VariableMetadata>,
    method: Option<Method>,
    components: bool,
    version: Version,
    remote: Option<RemoteConfig>,
    pool: WorkerPool,
}

/// Open a variable (§6): resolve the concrete source from `uri`'s scheme,
/// validate the missing-value spec, and resolve active-storage connection
/// details through the explicit → storage-options → process-config
/// precedence chain.
pub async fn open(
    uri: &str,
    meta: VariableMetadata,
    chunks: ChunkIndex,
    options: OpenOptions<'_>,
) -> Result<Handle> {
    // Eager validation at open (§7): a malformed missing spec fails here,
    // not on first `get`.
    crate::missing::MissingSpec::normalize(meta.missing_attrs.clone())?;

    let parsed = parse_uri(uri)?;
    let global = Config::global();

    let source: DynSource = match parsed {
        ParsedUri::Local(path) => {
            debug!("opening local source at {path}");
            Arc::new(LocalFileSource::new(path, chunks))
        }
        ParsedUri::S3 { bucket, object } => {
            if let Some(t) = options.storage_type {
                if t != "s3" {
                    return Err(Error::InvalidInput(format!(
                        "storage_type {t} does not match an s3:// URI"
                    )));
                }
            }
            let storage_options = options.storage_options.clone().unwrap_or_default();
            let endpoint = crate::config::resolve(
                None,
                storage_options.s3.endpoint.as_deref(),
                global.s3.endpoint.as_deref(),
            )
            .ok_or_else(|| Error::InvalidInput("no S3 endpoint configured".into()))?;
            let region = crate::config::resolve(
                None,
                storage_options.s3.region.as_deref(),
                global.s3.region.as_deref(),
            )
            .unwrap_or("us-east-1");
            let access_key = crate::config::resolve(
                None,
                storage_options.s3.access_key.as_deref(),
                global.s3.access_key.as_deref(),
            )
            .ok_or_else(|| Error::InvalidInput("no S3 access key configured".into()))?;
            let secret_key = crate::config::resolve(
                None,
                storage_options.s3.secret_key.as_deref(),
                global.s3.secret_key.as_deref(),
            )
            .ok_or_else(|| Error::InvalidInput("no S3 secret key configured".into()))?;

            debug!("opening s3 source s3://{bucket}/{object} via {endpoint}");
            let s3_options = S3Options {
                endpoint: endpoint.to_string(),
                region: region.to_string(),
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            };
            Arc::new(S3Source::new(bucket, object, &s3_options, chunks).await?)
        }
    };

    let remote = resolve_remote(&options, global);
    let max_threads = options.max_threads.or(global.max_threads).unwrap_or(100);

    Ok(Handle {
        source,
        meta: Arc::new(meta),
        method: None,
        components: false,
        version: Version::LocalEngine,
        remote,
        pool: WorkerPool::new(max_threads),
    })
}

fn resolve_remote(options: &OpenOptions<'_>, global: &Config) -> Option<RemoteConfig> {
    let storage_options = options.storage_options.as_ref();
    let url = crate::config::resolve(
        options.active_storage_url,
        storage_options.and_then(|o| o.active_storage.url.as_deref()),
        global.active_storage.url.as_deref(),
    )?;
    let username = crate::config::resolve(
        options.active_storage_username,
        storage_options.and_then(|o| o.active_storage.username.as_deref()),
        global.active_storage.username.as_deref(),
    )
    .unwrap_or("")
    .to_string();
    let password = crate::config::resolve(
        options.active_storage_password,
        storage_options.and_then(|o| o.active_storage.password.as_deref()),
        global.active_storage.password.as_deref(),
    )
    .unwrap_or("")
    .to_string();

    // The endpoint the active-storage server itself uses to reach the
    // object store reuses the same S3 endpoint setting rather than
    // introducing a second, parallel config surface for it.
    let s3_source = crate::config::resolve(
        None,
        storage_options.and_then(|o| o.s3.endpoint.as_deref()),
        global.s3.endpoint.as_deref(),
    )
    .unwrap_or("")
    .to_string();

    Some(RemoteConfig {
        reductionist_url: url.to_string(),
        s3_source,
        username,
        password,
    })
}

impl Handle {
    /// Set the reduction method (`None` for a plain select). Validates
    /// eagerly (§7).
    pub fn set_method(&mut self, method: Option<&str>) -> Result<()> {
        self.method = match method {
            None => None,
            Some(name) => Some(Method::parse(name).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unsupported method {name:?}, expected one of min, max, sum, mean"
                ))
            })?),
        };
        Ok(())
    }

    pub fn method(&self) -> Option<Method> {
        self.method
    }

    pub fn set_components(&mut self, components: bool) {
        self.components = components;
    }

    pub fn components(&self) -> bool {
        self.components
    }

    pub fn set_version(&mut self, version: u8) -> Result<()> {
        self.version = Version::parse(version)?;
        Ok(())
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn dtype(&self) -> crate::dtype::Dtype {
        self.meta.dtype
    }

    pub fn shape(&self) -> &[u64] {
        &self.meta.shape
    }

    /// Run one selection against this handle (§4.6 "Plan").
    pub async fn get(&self, selectors: Vec<AxisSelector>) -> Result<GetResult> {
        let selection = Selection::new(selectors, &self.meta.shape)?;

        let method = match self.version {
            Version::PassThrough => None,
            _ => self.method,
        };
        let remote = match self.version {
            Version::RemoteEngine => self.remote.clone(),
            Version::PassThrough | Version::LocalEngine => None,
        };

        debug!(
            "dispatching get: method={:?} components={} version={:?} rank={}",
            method,
            self.components,
            self.version,
            selection.rank()
        );

        let output = engine::run(
            self.source.clone(),
            self.meta.clone(),
            &selection,
            method,
            self.components,
            &self.pool,
            remote,
        )
        .await?;

        Ok(output.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_known_values() {
        assert_eq!(Version::parse(0).unwrap(), Version::PassThrough);
        assert_eq!(Version::parse(1).unwrap(), Version::LocalEngine);
        assert_eq!(Version::parse(2).unwrap(), Version::RemoteEngine);
    }

    #[test]
    fn version_rejects_unknown_value() {
        assert!(matches!(
            Version::parse(3).unwrap_err(),
            Error::InvalidInput(_)
        ));
    }
}
