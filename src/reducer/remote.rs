//! Remote chunk reducer (C4): the Reductionist active-storage HTTP client.
//!
//! Grounded directly on `activestorage/reductionist.py`
//! (`build_request_data`, `encode_selection`, `decode_result`), translated
//! into the teacher's HTTP idiom (`store/s3.rs` uses a bare `reqwest::get`;
//! this generalizes that to a POST with JSON body, Basic auth, and typed
//! response headers).

use serde::Serialize;
use serde_json::json;

use crate::buffer::{PartialValue, TypedBuffer};
use crate::dtype::{Dtype, ResolvedEndianness};
use crate::error::{Error, Result};
use crate::indexer::AxisRange;
use crate::missing::MissingSpec;
use crate::order::Order;

use super::{ChunkOutcome, Method};

/// S3 credentials and endpoint identity needed to build a Reductionist
/// request (§4.4 "Required fields").
#[derive(Debug, Clone)]
pub struct RemoteChunkRequest {
    pub reductionist_url: String,
    pub s3_source: String,
    pub bucket: String,
    pub object: String,
    pub username: String,
    pub password: String,
    pub dtype: Dtype,
    pub endianness: ResolvedEndianness,
    pub offset: u64,
    pub size: u64,
    pub order: Order,
    pub chunk_shape: Vec<u64>,
    pub chunk_selection: Vec<AxisRange>,
    pub missing: MissingSpec,
    pub method: Option<Method>,
}

/// Encode one `(start, stop, step)` axis range in the `[start, stop, step]`
/// form Reductionist expects (§4.4: an integer index `i` becomes
/// `[i, i+1, 1]`, which is already how [`AxisRange`] represents it once it
/// reaches this layer).
fn encode_selection(ranges: &[AxisRange]) -> Vec<[u64; 3]> {
    ranges.iter().map(|r| [r.start, r.stop, r.step]).collect()
}

/// Build the `missing` JSON object (§4.4). `float32` values are widened to
/// `float64` for JSON encoding by virtue of [`MissingSpec`] already storing
/// everything as `f64`. `fill` takes priority over a distinct
/// `missing_value` when encoding (they are coalesced upstream in
/// [`MissingSpec::normalize`](crate::missing::MissingSpec::normalize), so by
/// the time a spec reaches here there is exactly one coalesced set to emit).
fn encode_missing(missing: &MissingSpec) -> Option<serde_json::Value> {
    if let Some(fill) = missing.fill {
        return Some(json!({ "missing_value": fill }));
    }
    if missing.missing.0.len() == 1 {
        return Some(json!({ "missing_value": missing.missing.0[0] }));
    }
    if !missing.missing.0.is_empty() {
        return Some(json!({ "missing_values": missing.missing.0 }));
    }
    match (missing.valid_min, missing.valid_max) {
        (Some(lo), Some(hi)) => Some(json!({ "valid_range": [lo, hi] })),
        (Some(lo), None) => Some(json!({ "valid_min": lo })),
        (None, Some(hi)) => Some(json!({ "valid_max": hi })),
        (None, None) => None,
    }
}

#[derive(Serialize)]
struct RequestBody {
    source: String,
    bucket: String,
    object: String,
    dtype: String,
    byte_order: String,
    offset: u64,
    size: u64,
    order: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    shape: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    selection: Option<Vec<[u64; 3]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    missing: Option<serde_json::Value>,
}

fn build_request_body(req: &RemoteChunkRequest) -> RequestBody {
    RequestBody {
        source: req.s3_source.clone(),
        bucket: req.bucket.clone(),
        object: req.object.clone(),
        dtype: req.dtype.canonical_name().to_string(),
        byte_order: req.endianness.as_wire_str().to_string(),
        offset: req.offset,
        size: req.size,
        order: req.order.as_wire_str().to_string(),
        shape: Some(req.chunk_shape.clone()),
        selection: Some(encode_selection(&req.chunk_selection)),
        missing: encode_missing(&req.missing),
    }
}

fn url_for(server: &str, method: Option<Method>) -> String {
    let op = method.map(Method::wire_op_name).unwrap_or("select");
    format!("{}/v1/{op}/", server.trim_end_matches('/'))
}

/// POST a chunk request to the active-storage server and decode its typed
/// response (§4.4).
pub async fn reduce_chunk(
    client: &reqwest::Client,
    req: &RemoteChunkRequest,
) -> Result<ChunkOutcome> {
    let body = build_request_body(req);
    let url = url_for(&req.reductionist_url, req.method);

    let response = client
        .post(&url)
        .basic_auth(&req.username, Some(&req.password))
        .json(&body)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body_text = response
            .text()
            .await
            .unwrap_or_else(|_| "-".to_string());
        return Err(Error::RemoteReductionFailure {
            status,
            body: body_text,
        });
    }

    decode_response(req, response).await
}

async fn decode_response(
    req: &RemoteChunkRequest,
    response: reqwest::Response,
) -> Result<ChunkOutcome> {
    let headers = response.headers().clone();
    let dtype_name = headers
        .get("x-activestorage-dtype")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::DecodeFailure("missing x-activestorage-dtype header".into()))?;
    let dtype = Dtype::parse(dtype_name)?;

    let shape_header = headers
        .get("x-activestorage-shape")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::DecodeFailure("missing x-activestorage-shape header".into()))?;
    let shape: Vec<u64> = serde_json::from_str(shape_header)?;

    let count_header = headers
        .get("x-activestorage-count")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::DecodeFailure("missing x-activestorage-count header".into()))?;
    let count: u64 = serde_json::from_str(count_header)?;

    let body = response.bytes().await?;
    let expected_len = shape.iter().product::<u64>() as usize * dtype.size_bytes();
    if body.len() != expected_len {
        return Err(Error::DecodeFailure(format!(
            "response body is {} bytes, expected {expected_len} for shape {shape:?} dtype {dtype_name}",
            body.len()
        )));
    }

    // Reductionist always replies in the host's native byte order (it runs
    // the same decode-then-reduce pipeline this crate does); there is no
    // separate byte-order header, so the host's resolved native order is
    // correct here.
    let buffer =
        TypedBuffer::from_bytes(dtype, crate::dtype::Endianness::Native.resolved(), &body)?;

    match req.method {
        None => Ok(ChunkOutcome::Select(buffer)),
        Some(_) => {
            let partial = scalar_partial(&buffer)?;
            Ok(ChunkOutcome::Reduce(partial, count))
        }
    }
}

fn scalar_partial(buffer: &TypedBuffer) -> Result<PartialValue> {
    if buffer.len() != 1 {
        return Err(Error::DecodeFailure(format!(
            "expected a single scalar in reduction response, got {} elements",
            buffer.len()
        )));
    }
    Ok(match buffer {
        TypedBuffer::F32(_) | TypedBuffer::F64(_) => PartialValue::Float(buffer.get_f64(0)),
        TypedBuffer::I8(_) | TypedBuffer::I16(_) | TypedBuffer::I32(_) | TypedBuffer::I64(_) => {
            PartialValue::Int(buffer.get_f64(0) as i64)
        }
        TypedBuffer::U8(_) | TypedBuffer::U16(_) | TypedBuffer::U32(_) | TypedBuffer::U64(_) => {
            PartialValue::UInt(buffer.get_f64(0) as u64)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::missing::RawMissingAttrs;

    #[test]
    fn url_defaults_to_select_for_no_method() {
        assert_eq!(url_for("http://localhost:8080", None), "http://localhost:8080/v1/select/");
    }

    #[test]
    fn mean_is_sent_as_sum() {
        assert_eq!(
            url_for("http://localhost:8080", Some(Method::Mean)),
            "http://localhost:8080/v1/sum/"
        );
    }

    #[test]
    fn selection_encodes_as_triples() {
        let ranges = vec![AxisRange { start: 0, stop: 2, step: 1 }];
        assert_eq!(encode_selection(&ranges), vec![[0, 2, 1]]);
    }

    #[test]
    fn missing_fill_wins_over_missing_value() {
        let spec = MissingSpec::normalize(RawMissingAttrs {
            fill: Some(-999.0),
            missing_value: Some(-888.0),
            ..Default::default()
        })
        .unwrap();
        let encoded = encode_missing(&spec).unwrap();
        assert_eq!(encoded["missing_value"], -999.0);
    }

    #[test]
    fn missing_valid_range_round_trips() {
        let spec = MissingSpec::normalize(RawMissingAttrs {
            valid_range: Some((750.0, 850.0)),
            ..Default::default()
        })
        .unwrap();
        let encoded = encode_missing(&spec).unwrap();
        assert_eq!(encoded["valid_range"], json!([750.0, 850.0]));
    }

    #[test]
    fn no_missing_attrs_encode_to_none() {
        let spec = MissingSpec::default();
        assert!(encode_missing(&spec).is_none());
    }
}
