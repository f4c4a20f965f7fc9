//! Low-rank storage for a tile.
//!
//! A tile $M\in\mathbb{C}^{m\times n}$ is stored as $M\approx UV$ with
//! $U\in\mathbb{C}^{m\times r}$ and $V\in\mathbb{C}^{r\times n}$. Every
//! operation contracts through the rank $r$ and never forms the $m\times n$
//! product unless it is explicitly requested with [`LowRankTile::dense`].

use crate::approximation::{self, ApproximationStatus, LowRankFactors};
use crate::kernels::{self, Diag, Side, Trans, UPLO};
use crate::options::{ApproximationOptions, LowRankAlgorithm};
use crate::permutation::{laswp, PivotDirection};
use crate::tile::TileState;
use crate::types::{Result, TileScalar};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2};
use num::traits::{One, Zero};

#[derive(Clone, Debug)]
pub struct LowRankTile<A: TileScalar> {
    u: Array2<A>,
    v: Array2<A>,
    status: ApproximationStatus,
    state: TileState,
}

impl<A: TileScalar> From<LowRankFactors<A>> for LowRankTile<A> {
    fn from(factors: LowRankFactors<A>) -> Self {
        Self {
            u: factors.u,
            v: factors.v,
            status: factors.status,
            state: TileState::Approximated,
        }
    }
}

impl<A: TileScalar> LowRankTile<A> {
    /// Wrap existing factors. The tile represents `u * v` exactly.
    pub fn from_factors(u: Array2<A>, v: Array2<A>) -> Self {
        assert_eq!(
            u.ncols(),
            v.nrows(),
            "LowRankTile: u has {} columns but v has {} rows",
            u.ncols(),
            v.nrows()
        );
        let rank = u.ncols();
        Self {
            u,
            v,
            status: ApproximationStatus {
                rank,
                converged: true,
                estimated_error: 0.0,
            },
            state: TileState::Approximated,
        }
    }

    /// Compress an explicitly stored block with the algorithm chosen in `opts`.
    pub fn from_dense(mat: ArrayView2<A>, opts: &ApproximationOptions) -> Result<Self> {
        opts.validate()?;
        let (m, n) = mat.dim();
        let factors = match opts.algorithm() {
            LowRankAlgorithm::Rrqr => {
                approximation::rrqr(mat, opts.rel_tol(), opts.abs_tol(), opts.max_rank())?
            }
            LowRankAlgorithm::Aca => approximation::aca_elements(
                m,
                n,
                |i, j| mat[[i, j]],
                opts.rel_tol(),
                opts.abs_tol(),
                opts.max_rank(),
            ),
        };
        Ok(factors.into())
    }

    /// Compress an `m x n` block known through its entries.
    pub fn from_elements<F>(m: usize, n: usize, elem: F, opts: &ApproximationOptions) -> Result<Self>
    where
        F: Fn(usize, usize) -> A,
    {
        opts.validate()?;
        Ok(approximation::aca_elements(
            m,
            n,
            elem,
            opts.rel_tol(),
            opts.abs_tol(),
            opts.max_rank(),
        )
        .into())
    }

    /// Compress an `m x n` block known through single row and column accessors.
    pub fn from_rows_cols<FR, FC>(
        m: usize,
        n: usize,
        row: FR,
        col: FC,
        opts: &ApproximationOptions,
    ) -> Result<Self>
    where
        FR: FnMut(usize, ArrayViewMut1<A>),
        FC: FnMut(usize, ArrayViewMut1<A>),
    {
        opts.validate()?;
        Ok(approximation::aca(
            m,
            n,
            row,
            col,
            opts.rel_tol(),
            opts.abs_tol(),
            opts.max_rank(),
        )
        .into())
    }

    /// Compress an `m x n` block known through batched row and column
    /// accessors, requesting `opts.baca_blocksize()` of them at a time.
    pub fn from_row_col_blocks<FR, FC>(
        m: usize,
        n: usize,
        rows: FR,
        cols: FC,
        opts: &ApproximationOptions,
    ) -> Result<Self>
    where
        FR: FnMut(&[usize], ArrayViewMut2<A>),
        FC: FnMut(&[usize], ArrayViewMut2<A>),
    {
        opts.validate()?;
        Ok(approximation::baca(
            m,
            n,
            rows,
            cols,
            opts.baca_blocksize(),
            opts.rel_tol(),
            opts.abs_tol(),
            opts.max_rank(),
        )
        .into())
    }

    pub fn rows(&self) -> usize {
        self.u.nrows()
    }

    pub fn cols(&self) -> usize {
        self.v.ncols()
    }

    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    pub fn maximum_rank(&self) -> usize {
        self.rank()
    }

    /// Storage in bytes.
    pub fn memory(&self) -> usize {
        self.nonzeros() * std::mem::size_of::<A>()
    }

    pub fn nonzeros(&self) -> usize {
        self.u.len() + self.v.len()
    }

    pub fn state(&self) -> TileState {
        self.state
    }

    /// How the tile was approximated.
    pub fn status(&self) -> ApproximationStatus {
        self.status
    }

    pub fn u(&self) -> &Array2<A> {
        &self.u
    }

    pub fn v(&self) -> &Array2<A> {
        &self.v
    }

    /// Factors `(l, tl), (r, tr)` with `op(self) = op_tl(l) * op_tr(r)`.
    pub(crate) fn op_factors(&self, trans: Trans) -> ((ArrayView2<A>, Trans), (ArrayView2<A>, Trans)) {
        match trans {
            Trans::N => ((self.u.view(), Trans::N), (self.v.view(), Trans::N)),
            Trans::T | Trans::C => ((self.v.view(), trans), (self.u.view(), trans)),
        }
    }

    /// Write `u * v` into `c`.
    pub fn dense_into(&self, c: ArrayViewMut2<A>, task_depth: usize) {
        kernels::gemm(
            Trans::N,
            Trans::N,
            A::one(),
            self.u.view(),
            self.v.view(),
            A::zero(),
            c,
            task_depth,
        );
    }

    pub fn dense(&self) -> Array2<A> {
        let mut c = Array2::<A>::zeros((self.rows(), self.cols()));
        self.dense_into(c.view_mut(), 0);
        c
    }

    pub fn element(&self, i: usize, j: usize) -> A {
        self.u.row(i).dot(&self.v.column(j))
    }

    /// Row swaps act on `u` only.
    pub fn permute_rows(&mut self, piv: &[usize], direction: PivotDirection) {
        laswp(self.u.view_mut(), piv, direction);
        self.state = TileState::Updated;
    }

    /// A left solve updates `u`, a right solve updates `v`.
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
        let factor = match side {
            Side::L => self.u.view_mut(),
            Side::R => self.v.view_mut(),
        };
        kernels::trsm(side, uplo, ta, diag, alpha, a, factor, task_depth)?;
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
        let ((left, tl), (right, tr)) = self.op_factors(ta);
        let mut tmp = Array1::<A>::zeros(self.rank());
        kernels::gemv(tr, A::one(), right, x, A::zero(), tmp.view_mut(), task_depth);
        kernels::gemv(tl, alpha, left, tmp.view(), beta, y, task_depth);
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
        let ((left, tl), (right, tr)) = self.op_factors(ta);
        let mut tmp = Array2::<A>::zeros((self.rank(), c.ncols()));
        kernels::gemm(tr, tb, A::one(), right, b, A::zero(), tmp.view_mut(), task_depth);
        kernels::gemm(tl, Trans::N, alpha, left, tmp.view(), beta, c, task_depth);
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
        let ((left, tl), (right, tr)) = self.op_factors(tb);
        let mut tmp = Array2::<A>::zeros((c.nrows(), self.rank()));
        kernels::gemm(ta, tl, A::one(), a, left, A::zero(), tmp.view_mut(), task_depth);
        kernels::gemm(Trans::N, tr, alpha, tmp.view(), right, beta, c, task_depth);
    }
}
