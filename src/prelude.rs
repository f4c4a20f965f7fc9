//! Collect all traits and other exports here.

pub use crate::approximation::{ApproximationStatus, LowRankFactors};
pub use crate::dense_tile::DenseTile;
pub use crate::kernels::{Diag, Side, Trans, UPLO};
pub use crate::low_rank_tile::LowRankTile;
pub use crate::options::{ApproximationOptions, LowRankAlgorithm};
pub use crate::permutation::*;
pub use crate::pivoted_qr::{HasPivotedQR, PivotedQR};
pub use crate::random_matrix::RandomMatrix;
pub use crate::tile::{Tile, TileState};
pub use crate::types::{c32, c64, BlrError, RelDiff, Result, Scalar, TileScalar};
