//! Per-video model output.

use ndarray::Array2;
use serde_json::{Value, json};

/// The strategy-dependent part of an emitted record.
///
/// Caption-only records carry no payload at all; they are represented as
/// `None` wherever an `Option<Payload>` appears.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// One embedding row per frame.
    Embeddings(Array2<f32>),
    /// One row of discrete token ids per frame.
    Tokens(Array2<i64>),
}

impl Payload {
    /// Number of frames (rows) in the payload.
    pub fn rows(&self) -> usize {
        match self {
            Payload::Embeddings(array) => array.nrows(),
            Payload::Tokens(array) => array.nrows(),
        }
    }

    /// Width of each row.
    pub fn columns(&self) -> usize {
        match self {
            Payload::Embeddings(array) => array.ncols(),
            Payload::Tokens(array) => array.ncols(),
        }
    }

    /// Short name of the payload kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Embeddings(_) => "embeddings",
            Payload::Tokens(_) => "tokens",
        }
    }

    /// JSON form: `{"kind", "shape", "data"}` with `data` as nested rows.
    pub fn to_json(&self) -> Value {
        let data: Vec<Value> = match self {
            Payload::Embeddings(array) => array
                .rows()
                .into_iter()
                .map(|row| json!(row.to_vec()))
                .collect(),
            Payload::Tokens(array) => array
                .rows()
                .into_iter()
                .map(|row| json!(row.to_vec()))
                .collect(),
        };
        json!({
            "kind": self.kind(),
            "shape": [self.rows(), self.columns()],
            "data": data,
        })
    }
}
