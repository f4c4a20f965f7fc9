//! The polymorphic tile of a block low-rank matrix.
//!
//! A [`Tile`] is either stored densely or as a low-rank product. Both
//! representations answer the same queries, while operations combining two
//! tiles dispatch on the pair of representations in [`crate::schur`].

use crate::dense_tile::DenseTile;
use crate::kernels::{Diag, Side, Trans, UPLO};
use crate::low_rank_tile::LowRankTile;
use crate::permutation::PivotDirection;
use crate::schur;
use crate::types::{Result, TileScalar};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

/// Lifecycle of a tile's contents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// Contents are as constructed.
    Approximated,
    /// Contents were modified in place by a permutation or a solve.
    Updated,
}

#[derive(Clone, Debug)]
pub enum Tile<A: TileScalar> {
    Dense(DenseTile<A>),
    LowRank(LowRankTile<A>),
}

impl<A: TileScalar> From<DenseTile<A>> for Tile<A> {
    fn from(tile: DenseTile<A>) -> Self {
        Tile::Dense(tile)
    }
}

impl<A: TileScalar> From<LowRankTile<A>> for Tile<A> {
    fn from(tile: LowRankTile<A>) -> Self {
        Tile::LowRank(tile)
    }
}

macro_rules! forward {
    ($self:ident, $tile:ident => $call:expr) => {
        match $self {
            Tile::Dense($tile) => $call,
            Tile::LowRank($tile) => $call,
        }
    };
}

impl<A: TileScalar> Tile<A> {
    /// Wrap an explicit block as a dense tile. See [`Tile::to_dense`] for the
    /// reverse direction.
    pub fn from_dense_block(d: Array2<A>) -> Self {
        Tile::Dense(DenseTile::new(d))
    }

    pub fn low_rank(u: Array2<A>, v: Array2<A>) -> Self {
        Tile::LowRank(LowRankTile::from_factors(u, v))
    }

    pub fn is_low_rank(&self) -> bool {
        matches!(self, Tile::LowRank(_))
    }

    pub fn rows(&self) -> usize {
        forward!(self, tile => tile.rows())
    }

    pub fn cols(&self) -> usize {
        forward!(self, tile => tile.cols())
    }

    pub fn rank(&self) -> usize {
        forward!(self, tile => tile.rank())
    }

    pub fn maximum_rank(&self) -> usize {
        forward!(self, tile => tile.maximum_rank())
    }

    /// Storage in bytes.
    pub fn memory(&self) -> usize {
        forward!(self, tile => tile.memory())
    }

    pub fn nonzeros(&self) -> usize {
        forward!(self, tile => tile.nonzeros())
    }

    pub fn state(&self) -> TileState {
        forward!(self, tile => tile.state())
    }

    /// The dense block. Panics on a low-rank tile.
    pub fn d(&self) -> &Array2<A> {
        match self {
            Tile::Dense(tile) => tile.d(),
            Tile::LowRank(_) => panic!("Tile::d called on a low-rank tile"),
        }
    }

    /// The left factor. Panics on a dense tile.
    pub fn u(&self) -> &Array2<A> {
        match self {
            Tile::LowRank(tile) => tile.u(),
            Tile::Dense(_) => panic!("Tile::u called on a dense tile"),
        }
    }

    /// The right factor. Panics on a dense tile.
    pub fn v(&self) -> &Array2<A> {
        match self {
            Tile::LowRank(tile) => tile.v(),
            Tile::Dense(_) => panic!("Tile::v called on a dense tile"),
        }
    }

    /// Materialise the tile as a dense block.
    pub fn to_dense(&self) -> Array2<A> {
        forward!(self, tile => tile.dense())
    }

    pub fn element(&self, i: usize, j: usize) -> A {
        forward!(self, tile => tile.element(i, j))
    }

    pub fn permute_rows(&mut self, piv: &[usize], direction: PivotDirection) {
        forward!(self, tile => tile.permute_rows(piv, direction))
    }

    /// Overwrite the tile with the solution `X` of `op(a) X = alpha B`
    /// (`Side::L`) or `X op(a) = alpha B` (`Side::R`).
    #[allow(clippy::too_many_arguments)]
    pub fn solve_triangular(
        &mut self,
        side: Side,
        uplo: UPLO,
        ta: Trans,
        diag: Diag,
        alpha: A,
        a: ArrayView2<A>,
        task_depth: usize,
    ) -> Result<()> {
        forward!(self, tile => tile.solve_triangular(side, uplo, ta, diag, alpha, a, task_depth))
    }

    pub fn gemv(
        &self,
        ta: Trans,
        alpha: A,
        x: ArrayView1<A>,
        beta: A,
        y: ArrayViewMut1<A>,
        task_depth: usize,
    ) {
        forward!(self, tile => tile.gemv(ta, alpha, x, beta, y, task_depth))
    }

    /// `c = alpha * op(self) * op(b) + beta * c` with a dense `b`.
    #[allow(clippy::too_many_arguments)]
    pub fn multiply(
        &self,
        ta: Trans,
        tb: Trans,
        alpha: A,
        b: ArrayView2<A>,
        beta: A,
        c: ArrayViewMut2<A>,
        task_depth: usize,
    ) {
        forward!(self, tile => tile.multiply(ta, tb, alpha, b, beta, c, task_depth))
    }

    /// `c = alpha * op(a) * op(self) + beta * c` with a dense `a`.
    #[allow(clippy::too_many_arguments)]
    pub fn multiply_left(
        &self,
        ta: Trans,
        tb: Trans,
        alpha: A,
        a: ArrayView2<A>,
        beta: A,
        c: ArrayViewMut2<A>,
        task_depth: usize,
    ) {
        forward!(self, tile => tile.multiply_left(ta, tb, alpha, a, beta, c, task_depth))
    }

    /// `c = alpha * op(self) * op(b) + beta * c` with another tile `b`.
    #[allow(clippy::too_many_arguments)]
    pub fn multiply_tile(
        &self,
        ta: Trans,
        tb: Trans,
        alpha: A,
        b: &Tile<A>,
        beta: A,
        c: ArrayViewMut2<A>,
        task_depth: usize,
    ) {
        schur::gemm(ta, tb, alpha, self, b, beta, c, task_depth)
    }

    /// `c -= (self * b)[.., j]`.
    pub fn schur_update_col(
        &self,
        j: usize,
        b: &Tile<A>,
        c: ArrayViewMut1<A>,
        task_depth: usize,
    ) {
        schur::update_col(j, self, b, c, task_depth)
    }

    /// `c -= (self * b)[i, ..]`.
    pub fn schur_update_row(
        &self,
        i: usize,
        b: &Tile<A>,
        c: ArrayViewMut1<A>,
        task_depth: usize,
    ) {
        schur::update_row(i, self, b, c, task_depth)
    }

    /// `c[.., k] -= (self * b)[.., cols[k]]`.
    pub fn schur_update_cols(
        &self,
        cols: &[usize],
        b: &Tile<A>,
        c: ArrayViewMut2<A>,
        task_depth: usize,
    ) {
        schur::update_cols(cols, self, b, c, task_depth)
    }

    /// `c[k, ..] -= (self * b)[rows[k], ..]`.
    pub fn schur_update_rows(
        &self,
        rows: &[usize],
        b: &Tile<A>,
        c: ArrayViewMut2<A>,
        task_depth: usize,
    ) {
        schur::update_rows(rows, self, b, c, task_depth)
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::options::ApproximationOptions;
    use crate::random_matrix::RandomMatrix;
    use crate::types::RelDiff;

    fn both_representations(mat: &Array2<f64>) -> Vec<Tile<f64>> {
        let opts = ApproximationOptions::default().with_rel_tol(1E-12);
        vec![
            Tile::from_dense_block(mat.clone()),
            LowRankTile::from_dense(mat.view(), &opts).unwrap().into(),
        ]
    }

    #[test]
    fn representations_agree_on_queries() {
        let mut rng = rand::thread_rng();
        let mat = f64::random_low_rank_matrix((40, 30), 3, &mut rng);
        let tiles = both_representations(&mat);

        assert!(!tiles[0].is_low_rank());
        assert!(tiles[1].is_low_rank());
        assert_eq!(tiles[0].rank(), 30);
        assert_eq!(tiles[1].rank(), 3);
        assert_eq!(tiles[0].nonzeros(), 1200);
        assert_eq!(tiles[1].nonzeros(), 3 * 70);
        assert!(tiles[1].memory() < tiles[0].memory());

        for tile in &tiles {
            assert_eq!((tile.rows(), tile.cols()), (40, 30));
            assert_eq!(tile.state(), TileState::Approximated);
            assert!(tile.to_dense().rel_diff(&mat) < 1E-10);
            assert!((tile.element(17, 4) - mat[[17, 4]]).abs() < 1E-10);
        }
    }

    #[test]
    fn mutations_mark_tile_updated() {
        let mut rng = rand::thread_rng();
        let mat = f64::random_low_rank_matrix((12, 12), 2, &mut rng);
        let mut a = Array2::<f64>::eye(12);
        a[[3, 1]] = 0.5;

        for mut tile in both_representations(&mat) {
            tile.permute_rows(&[1, 0], PivotDirection::Forward);
            assert_eq!(tile.state(), TileState::Updated);
            tile.permute_rows(&[1, 0], PivotDirection::Backward);

            tile.solve_triangular(Side::L, UPLO::Lower, Trans::N, Diag::Unit, 1.0, a.view(), 0)
                .unwrap();
            assert!(a.dot(&tile.to_dense()).rel_diff(&mat) < 1E-10);
        }
    }

    #[test]
    fn tile_product_matches_dense_product() {
        let mut rng = rand::thread_rng();
        let a_mat = f64::random_low_rank_matrix((25, 20), 4, &mut rng);
        let b_mat = f64::random_gaussian((20, 15), &mut rng);
        let expected = a_mat.dot(&b_mat);

        let b = Tile::from_dense_block(b_mat.clone());
        for a in both_representations(&a_mat) {
            let mut c = Array2::<f64>::zeros((25, 15));
            a.multiply_tile(Trans::N, Trans::N, 1.0, &b, 0.0, c.view_mut(), 1);
            assert!(c.rel_diff(&expected) < 1E-10);

            let mut c = Array2::<f64>::zeros((25, 15));
            a.multiply(Trans::N, Trans::N, 1.0, b_mat.view(), 0.0, c.view_mut(), 0);
            assert!(c.rel_diff(&expected) < 1E-10);

            let mut c = Array2::<f64>::zeros((25, 2));
            a.schur_update_cols(&[3, 9], &b, c.view_mut(), 0);
            assert!(c.mapv(|item| -item).rel_diff(&expected.select(ndarray::Axis(1), &[3, 9])) < 1E-10);
        }
    }

    #[test]
    #[should_panic(expected = "low-rank tile")]
    fn dense_block_of_low_rank_tile_panics() {
        let tile = Tile::low_rank(Array2::<f64>::ones((3, 1)), Array2::<f64>::ones((1, 3)));
        tile.d();
    }

    #[test]
    #[should_panic(expected = "dense tile")]
    fn factors_of_dense_tile_panic() {
        let tile = Tile::from_dense_block(Array2::<f64>::ones((3, 3)));
        tile.u();
    }
}
