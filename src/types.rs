//! Scalar bounds, error type and small numerical helpers shared by all modules.

use crate::pivoted_qr::HasPivotedQR;
use ndarray::{ArrayBase, Data, Ix2};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::OperationNorm;
use num::ToPrimitive;
use thiserror::Error;

pub use ndarray_linalg::{c32, c64, Scalar};

#[derive(Error, Debug)]
pub enum BlrError {
    #[error("Lapack Error: {0}")]
    LinalgError(#[from] LinalgError),
    #[error("Pivoted QR failed with info = {0}")]
    PivotedQRError(i32),
    #[error("Incompatible memory layout")]
    LayoutError,
    #[error("Invalid approximation options: {0}")]
    InvalidOptions(String),
}

pub type Result<T> = std::result::Result<T, BlrError>;

/// Scalar types a tile can be built from.
///
/// Implemented for `f32`, `f64`, `c32` and `c64`.
pub trait TileScalar: HasPivotedQR + Send + Sync {}

impl<A: HasPivotedQR + Send + Sync> TileScalar for A {}

/// Convert a real value of any scalar type to `f64`.
pub(crate) fn real_to_f64<R: ToPrimitive>(value: R) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Frobenius norm through LAPACK `?lange`, which needs a contiguous layout.
fn fro_norm<A, S>(mat: &ArrayBase<S, Ix2>) -> f64
where
    A: TileScalar,
    S: Data<Elem = A>,
{
    mat.as_standard_layout()
        .opnorm_fro()
        .map_or(f64::NAN, real_to_f64)
}

pub trait RelDiff {
    type A: TileScalar;

    /// Return the relative Frobenius norm difference of `self` and `other`.
    fn rel_diff<S: Data<Elem = Self::A>>(&self, other: &ArrayBase<S, Ix2>) -> f64;
}

impl<A, S> RelDiff for ArrayBase<S, Ix2>
where
    A: TileScalar,
    S: Data<Elem = A>,
{
    type A = A;

    fn rel_diff<T: Data<Elem = A>>(&self, other: &ArrayBase<T, Ix2>) -> f64 {
        let diff = self.to_owned() - other;
        fro_norm(&diff) / fro_norm(other)
    }
}
