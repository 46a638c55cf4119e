//! Reduction engine (C6): orchestrates the indexer (C1) over the local
//! (C3) or remote (C4) reducer via a bounded worker pool, then combines
//! partials into a final array or scalar (§4.6).
//!
//! Grounded on `active.py::_process_chunk`/`_from_storage` for the control
//! flow (per-chunk dispatch, then re-applying the method over the
//! collected partials), and the teacher's `db/mod.rs` `spawn_blocking` +
//! channel idiom for mixing blocking and async work within one batch.

pub mod combine;
pub mod pool;

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;

use crate::buffer::PartialValue;
use crate::error::{Error, Result};
use crate::filters::{self, Compressor, Filter};
use crate::indexer::{self, ChunkTask};
use crate::missing::MissingSpec;
use crate::reducer::local::{reduce_chunk as reduce_local, LocalChunkRequest};
use crate::reducer::remote::{reduce_chunk as reduce_remote, RemoteChunkRequest};
use crate::reducer::{ChunkOutcome, Method};
use crate::selection::Selection;
use crate::source::{DynSource, VariableMetadata};

use self::combine::{combine_partials, components_shape, finalize_scalar, squeeze_ranges, DisjointByteWriter};
use self::pool::WorkerPool;

/// Connection details for an active-storage (Reductionist) server,
/// resolved through the precedence chain in §6.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub reductionist_url: String,
    pub s3_source: String,
    pub username: String,
    pub password: String,
}

/// The shape a `Handle::get` call can return (§6 "Handle slicing").
#[derive(Debug, Clone)]
pub enum Output {
    /// A select-mode result: the filled output array, native-endian bytes.
    Array {
        shape: Vec<u64>,
        dtype: crate::dtype::Dtype,
        data: Vec<u8>,
    },
    /// A reduction scalar (`components=false`).
    Scalar(PartialValue),
    /// A reduction in components form (`components=true`): the raw
    /// accumulator (named `"sum"` for `mean`, the method name otherwise)
    /// plus the sample count, both reshaped to `(1,)*rank` (§4.6, §9).
    Components {
        op: &'static str,
        value: PartialValue,
        n: u64,
        shape: Vec<u64>,
    },
}

/// Run one `Handle::get` invocation (§4.6 "Plan").
pub async fn run(
    source: DynSource,
    meta: Arc<VariableMetadata>,
    selection: &Selection,
    method: Option<Method>,
    components: bool,
    pool: &WorkerPool,
    remote: Option<RemoteConfig>,
) -> Result<Output> {
    let missing = Arc::new(MissingSpec::normalize(meta.missing_attrs.clone())?);
    let (compressor, filters) = filters::decode_pipeline(
        &meta.filter_pipeline,
        meta.dtype.size_bytes(),
        "<variable>",
    )?;
    let filters = Arc::new(filters);

    let tasks = indexer::iter_chunks(selection, &meta.chunk_shape);

    if tasks.is_empty() {
        return Ok(empty_output(selection, meta.dtype, method, components));
    }

    // Use remote dispatch only when both an active-storage server is
    // configured and the source actually has an S3 identity to report
    // (§4.6 "depending on whether the source is remote").
    let remote = remote.filter(|_| source.s3_identity().is_some());

    let drop_axes = if components { Vec::new() } else { selection.drop_axes() };
    let out_shape = if components {
        selection.kept_shape()
    } else {
        selection.squeezed_shape()
    };

    let mut select_buffer: Option<Vec<u8>> = if method.is_none() {
        let elems: u64 = out_shape.iter().product();
        Some(vec![0u8; (elems * meta.dtype.size_bytes() as u64) as usize])
    } else {
        None
    };

    // Safety: every spawned task below writes at a distinct
    // `out_selection`-derived byte offset, computed from the indexer's
    // disjoint partition of the output (§4.1/§4.6), so concurrent writes
    // through this writer never overlap.
    let writer: Option<Arc<DisjointByteWriter>> = select_buffer
        .as_mut()
        .map(|buf| Arc::new(unsafe { DisjointByteWriter::new(buf) }));

    let element_size = meta.dtype.size_bytes();

    let mut futures = FuturesUnordered::new();
    for task in tasks {
        let pool = pool.clone();
        let source = source.clone();
        let meta = meta.clone();
        let missing = missing.clone();
        let filters = filters.clone();
        let remote = remote.clone();
        let writer = writer.clone();
        let drop_axes = drop_axes.clone();
        let out_shape = out_shape.clone();

        let handle = tokio::spawn(async move {
            let _permit = pool.acquire_owned().await;
            dispatch_chunk(
                task,
                source,
                meta,
                missing,
                compressor,
                filters,
                method,
                remote,
                writer,
                &drop_axes,
                &out_shape,
                element_size,
            )
            .await
        });
        futures.push(handle);
    }

    let mut partials: Vec<(PartialValue, u64)> = Vec::new();
    let mut first_error: Option<Error> = None;

    while let Some(joined) = futures.next().await {
        let outcome = match joined {
            Ok(result) => result,
            Err(join_err) => Err(Error::TransportFailure(format!(
                "chunk task panicked: {join_err}"
            ))),
        };
        match outcome {
            Ok(Some((partial, count))) => partials.push((partial, count)),
            Ok(None) => {}
            Err(e) => {
                first_error = Some(e);
                break;
            }
        }
    }

    // §9: a failing chunk does not force-cancel in-flight siblings. Dropping
    // `futures` here detaches the remaining `JoinHandle`s rather than
    // aborting them, letting already-spawned reads/HTTP requests run to
    // completion in the background.
    drop(futures);

    if let Some(err) = first_error {
        return Err(err);
    }

    match method {
        None => {
            let data = select_buffer.expect("select mode always allocates an output buffer");
            Ok(Output::Array {
                shape: out_shape,
                dtype: meta.dtype,
                data,
            })
        }
        Some(method) => {
            let op = method.as_op();
            let (value, n) = combine_partials(&partials, op);
            if components {
                Ok(Output::Components {
                    op: components_op_name(method),
                    value,
                    n,
                    shape: components_shape(selection),
                })
            } else {
                Ok(Output::Scalar(finalize_scalar(method, value, n)))
            }
        }
    }
}

fn components_op_name(method: Method) -> &'static str {
    match method {
        Method::Mean => "sum",
        Method::Min => "min",
        Method::Max => "max",
        Method::Sum => "sum",
    }
}

#[allow(clippy::too_many_arguments)]
async fn dispatch_chunk(
    task: ChunkTask,
    source: DynSource,
    meta: Arc<VariableMetadata>,
    missing: Arc<MissingSpec>,
    compressor: Option<Compressor>,
    filters: Arc<Vec<Filter>>,
    method: Option<Method>,
    remote: Option<RemoteConfig>,
    writer: Option<Arc<DisjointByteWriter>>,
    drop_axes: &[usize],
    out_shape: &[u64],
    element_size: usize,
) -> Result<Option<(PartialValue, u64)>> {
    let descriptor = source.get_chunk(&task.chunk_coords)?;

    let outcome = match (&remote, source.s3_identity()) {
        (Some(cfg), Some((bucket, object))) => {
            // §4.4: `compression`/`filters` are reserved on the wire; a
            // non-null pipeline must fail loudly rather than silently
            // reduce over still-compressed bytes (reductionist.py raises
            // `NotImplementedError` before ever building the request).
            if compressor.is_some() || !filters.is_empty() {
                return Err(Error::UnsupportedFeature(
                    "remote (active-storage) reduction does not support a non-null compression/filter pipeline in v1".into(),
                ));
            }
            let client = reqwest::Client::new();
            let request = RemoteChunkRequest {
                reductionist_url: cfg.reductionist_url.clone(),
                s3_source: cfg.s3_source.clone(),
                bucket: bucket.to_string(),
                object: object.to_string(),
                username: cfg.username.clone(),
                password: cfg.password.clone(),
                dtype: meta.dtype,
                endianness: meta.endianness.resolved(),
                offset: descriptor.offset,
                size: descriptor.size,
                order: meta.order,
                chunk_shape: meta.chunk_shape.clone(),
                chunk_selection: task.chunk_selection.clone(),
                missing: (*missing).clone(),
                method,
            };
            reduce_remote(&client, &request).await?
        }
        _ => {
            let request = LocalChunkRequest {
                descriptor,
                compressor,
                filters: (*filters).clone(),
                missing: (*missing).clone(),
                dtype: meta.dtype,
                endianness: meta.endianness.resolved(),
                chunk_shape: meta.chunk_shape.clone(),
                order: meta.order,
                chunk_selection: task.chunk_selection.clone(),
                op: method.map(Method::as_op),
            };
            reduce_local(source.as_ref(), request).await?
        }
    };

    match outcome {
        ChunkOutcome::Select(buffer) => {
            let writer = writer.expect("select mode always constructs a writer");
            let squeezed_out = squeeze_ranges(&task.out_selection, drop_axes);
            let indices = crate::buffer::flat_indices(out_shape, &squeezed_out);
            for (local_idx, &flat) in indices.iter().enumerate() {
                let bytes = buffer.element_le_bytes(local_idx);
                writer.write(flat * element_size, &bytes);
            }
            Ok(None)
        }
        ChunkOutcome::Reduce(partial, count) => Ok(Some((partial, count))),
    }
}

fn empty_output(
    selection: &Selection,
    dtype: crate::dtype::Dtype,
    method: Option<Method>,
    components: bool,
) -> Output {
    match method {
        None => Output::Array {
            shape: selection.squeezed_shape(),
            dtype,
            data: Vec::new(),
        },
        Some(method) => {
            let identity = identity_for(dtype, method.as_op());
            if components {
                Output::Components {
                    op: components_op_name(method),
                    value: identity,
                    n: 0,
                    shape: components_shape(selection),
                }
            } else {
                Output::Scalar(identity)
            }
        }
    }
}

/// The `(value, count=0)` partial's value half for an empty selection,
/// matching the per-dtype identities `reduce_masked` itself uses when every
/// element is masked (§4.3 edge case).
fn identity_for(dtype: crate::dtype::Dtype, op: crate::buffer::Op) -> PartialValue {
    use crate::buffer::Op;
    use crate::dtype::Dtype;
    match dtype {
        Dtype::F32 | Dtype::F64 => PartialValue::Float(match op {
            Op::Min => f64::INFINITY,
            Op::Max => f64::NEG_INFINITY,
            Op::Sum => 0.0,
        }),
        Dtype::I8 | Dtype::I16 | Dtype::I32 | Dtype::I64 => PartialValue::Int(match op {
            Op::Min => i64::MAX,
            Op::Max => i64::MIN,
            Op::Sum => 0,
        }),
        Dtype::U8 | Dtype::U16 | Dtype::U32 | Dtype::U64 => PartialValue::UInt(match op {
            Op::Min => u64::MAX,
            Op::Max => u64::MIN,
            Op::Sum => 0,
        }),
    }
}
