//! Block low-rank tile algebra.
//!
//! A [`Tile`] is one block of a block low-rank matrix, stored either densely
//! or as a low-rank product $UV$. Low-rank tiles are built by the
//! approximation routines in [`approximation`], from an explicit block or from
//! element, row or column accessors. The tile algebra (multiplication,
//! triangular solves, row permutations and Schur-complement updates) works on
//! any mix of representations and always contracts through the ranks.

pub mod approximation;
pub mod dense_tile;
pub mod kernels;
pub mod low_rank_tile;
pub mod options;
pub mod permutation;
pub mod pivoted_qr;
pub mod prelude;
pub mod random_matrix;
pub mod schur;
pub mod tile;
pub mod types;

pub use approximation::{ApproximationStatus, LowRankFactors};
pub use dense_tile::DenseTile;
pub use kernels::{Diag, Side, Trans, UPLO};
pub use low_rank_tile::LowRankTile;
pub use options::{ApproximationOptions, LowRankAlgorithm};
pub use permutation::PivotDirection;
pub use random_matrix::RandomMatrix;
pub use tile::{Tile, TileState};
pub use types::{BlrError, RelDiff, Result, TileScalar};
