//! Dense storage for a tile.

use crate::kernels::{self, Diag, Side, Trans, UPLO};
use crate::permutation::{laswp, PivotDirection};
use crate::tile::TileState;
use crate::types::{Result, TileScalar};
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};

/// A tile stored as one explicit `rows x cols` block.
#[derive(Clone, Debug)]
pub struct DenseTile<A: TileScalar> {
    d: Array2<A>,
    state: TileState,
}

impl<A: TileScalar> DenseTile<A> {
    pub fn new(d: Array2<A>) -> Self {
        Self {
            d,
            state: TileState::Approximated,
        }
    }

    pub fn rows(&self) -> usize {
        self.d.nrows()
    }

    pub fn cols(&self) -> usize {
        self.d.ncols()
    }

    /// A dense tile has full rank `min(rows, cols)`.
    pub fn rank(&self) -> usize {
        self.rows().min(self.cols())
    }

    pub fn maximum_rank(&self) -> usize {
        self.rank()
    }

    /// Storage in bytes.
    pub fn memory(&self) -> usize {
        self.nonzeros() * std::mem::size_of::<A>()
    }

    pub fn nonzeros(&self) -> usize {
        self.d.len()
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    pub fn d(&self) -> &Array2<A> {
        &self.d
    }

    pub fn into_inner(self) -> Array2<A> {
        self.d
    }

    pub fn dense(&self) -> Array2<A> {
        self.d.clone()
    }

    pub fn element(&self, i: usize, j: usize) -> A {
        self.d[[i, j]]
    }

    pub fn permute_rows(&mut self, piv: &[usize], direction: PivotDirection) {
        laswp(self.d.view_mut(), piv, direction);
        self.state = TileState::Updated;
    }

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
        kernels::trsm(side, uplo, ta, diag, alpha, a, self.d.view_mut(), task_depth)?;
        self.state = TileState::Updated;
        Ok(())
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
        kernels::gemv(ta, alpha, self.d.view(), x, beta, y, task_depth);
    }

    /// `c = alpha * op(self) * op(b) + beta * c`.
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
        kernels::gemm(ta, tb, alpha, self.d.view(), b, beta, c, task_depth);
    }

    /// `c = alpha * op(a) * op(self) + beta * c`.
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
        kernels::gemm(ta, tb, alpha, a, self.d.view(), beta, c, task_depth);
    }
}
