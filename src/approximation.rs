//! Low-rank approximation of blocks.
//!
//! A block $M\in\mathbb{C}^{m\times n}$ is approximated as $M\approx UV$ with
//! $U\in\mathbb{C}^{m\times r}$ and $V\in\mathbb{C}^{r\times n}$. Three
//! algorithms are provided:
//!
//! - [`rrqr`]: truncated rank-revealing QR of an explicitly stored block.
//! - [`aca`] / [`aca_elements`]: adaptive cross approximation with partial
//!   pivoting. Only $O(r(m+n))$ entries of the block are touched.
//! - [`baca`]: blocked adaptive cross approximation, which requests several
//!   rows or columns per accessor call.
//!
//! RRQR stops once the exact residual falls below
//! $\max(\text{rel\_tol}\cdot\|M\|_F, \text{abs\_tol})$. Cross approximation
//! only sees the entries it requested, so it stops once several rank-one
//! terms in a row fall below that threshold, the later ones taken from rows
//! that no pivot led to. This is an estimate: a residual concentrated in rows
//! that were never requested is not detected. Both stop at `max_rank`.
//! Hitting the rank cap is not an error, it is reported through
//! [`ApproximationStatus::converged`].

use crate::permutation::{ApplyPermutationToMatrix, MatrixPermutationMode};
use crate::pivoted_qr::PivotedQR;
use crate::types::{real_to_f64, Result, TileScalar};
use itertools::Itertools;
use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};
use ndarray_linalg::Norm;
use num::traits::Zero;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// Outcome of an approximation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApproximationStatus {
    /// Rank of the returned factors.
    pub rank: usize,
    /// `true` if the stopping test passed before `max_rank` was reached.
    /// For RRQR this means the tolerance was met. For cross approximation it
    /// is a heuristic: the rejected terms were negligible, but entries that
    /// were never requested may still carry a larger error.
    pub converged: bool,
    /// Frobenius norm of the residual. Exact for RRQR. For cross
    /// approximation the largest rejected rank-one term if the stopping test
    /// passed, otherwise the last accepted term.
    pub estimated_error: f64,
}

/// Low-rank factors `u` (m x r) and `v` (r x n) with their status.
pub struct LowRankFactors<A: TileScalar> {
    pub u: Array2<A>,
    pub v: Array2<A>,
    pub status: ApproximationStatus,
}

impl<A: TileScalar> LowRankFactors<A> {
    pub fn rank(&self) -> usize {
        self.u.ncols()
    }

    /// Multiply out the factors.
    pub fn to_mat(&self) -> Array2<A> {
        self.u.dot(&self.v)
    }
}

fn tolerance(rel_tol: f64, abs_tol: f64, norm: f64) -> f64 {
    (rel_tol * norm).max(abs_tol)
}

fn by_magnitude(first: &f64, second: &f64) -> Ordering {
    first.partial_cmp(second).unwrap_or(Ordering::Equal)
}

/// Index of the entry of largest modulus among the entries not yet used.
fn argmax_unused<A: TileScalar>(vec: &Array1<A>, used: &[bool]) -> Option<usize> {
    vec.iter()
        .zip(used)
        .enumerate()
        .filter(|(_, (_, &taken))| !taken)
        .map(|(index, (&item, _))| (index, real_to_f64(item.abs())))
        .max_by(|first, second| by_magnitude(&first.1, &second.1))
        .map(|(index, _)| index)
}

/// Running estimate of $\|UV\|_F^2$ for cross approximation.
///
/// Appending the term `c * r` changes the squared norm by
/// $2\,\mathrm{Re}\sum_l (u_l^H c)(r v_l^H) + \|c\|^2\|r\|^2$.
struct FrobeniusEstimate {
    squared: f64,
}

impl FrobeniusEstimate {
    fn with_term<A: TileScalar>(
        &self,
        u: ArrayView2<A>,
        v: ArrayView2<A>,
        c: &Array1<A>,
        r: &Array1<A>,
        term: f64,
    ) -> f64 {
        let cross = if u.ncols() > 0 {
            let uc = u.t().dot(&c.mapv(|item| item.conj()));
            let vr = v.dot(&r.mapv(|item| item.conj()));
            real_to_f64(uc.dot(&vr).re())
        } else {
            0.0
        };
        (self.squared + 2.0 * cross + term * term).max(0.0)
    }
}

/// Negligible terms in a row needed before a cross approximation stops.
///
/// A small term only shows that the residual is small along the current
/// pivot path. After the first one the search restarts from rows no pivot
/// led to, which catches entries the path never reached.
const CONVERGENCE_CHECKS: usize = 2;

/// Stopping test shared by [`aca`] and [`baca`].
struct StoppingTest {
    rel_tol: f64,
    abs_tol: f64,
    /// Consecutive negligible terms seen since the last accepted one.
    run: usize,
    /// Largest negligible term of the current run.
    largest_negligible: f64,
    /// Norm of the last accepted term.
    last_accepted: f64,
    /// Every row was examined.
    exhausted: bool,
}

impl StoppingTest {
    fn new(rel_tol: f64, abs_tol: f64) -> Self {
        Self {
            rel_tol,
            abs_tol,
            run: 0,
            largest_negligible: 0.0,
            last_accepted: 0.0,
            exhausted: false,
        }
    }

    /// Record the candidate term `term` given the squared Frobenius norm
    /// `squared` of the approximation including it. Returns `true` if the
    /// term must be rejected.
    fn negligible(&mut self, term: f64, squared: f64) -> bool {
        if term <= tolerance(self.rel_tol, self.abs_tol, squared.sqrt()) {
            self.run += 1;
            self.largest_negligible = self.largest_negligible.max(term);
            true
        } else {
            self.run = 0;
            self.largest_negligible = 0.0;
            self.last_accepted = term;
            false
        }
    }

    fn mark_exhausted(&mut self) {
        self.exhausted = true;
    }

    fn converged(&self) -> bool {
        self.run >= CONVERGENCE_CHECKS
    }

    /// Largest rejected term once the test passed, otherwise the last
    /// accepted term.
    fn estimated_error(&self) -> f64 {
        if self.run > 0 || self.exhausted {
            self.largest_negligible
        } else {
            self.last_accepted
        }
    }
}

/// Approximate an explicitly stored block by a truncated pivoted QR.
///
/// The rank is the smallest `k` with $\|R_{k:,:}\|_F\leq\max(\text{rel\_tol}
/// \|M\|_F,\text{abs\_tol})$, which is the exact Frobenius residual of the
/// truncation, capped at `max_rank`.
pub fn rrqr<A: TileScalar>(
    mat: ArrayView2<A>,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> Result<LowRankFactors<A>> {
    let qr = mat.pivoted_qr()?;

    let k_max = qr.r.nrows();
    let mut trailing = vec![0.0; k_max + 1];
    for k in (0..k_max).rev() {
        trailing[k] = trailing[k + 1] + real_to_f64(qr.r.row(k).norm_l2()).powi(2);
    }

    let tol = tolerance(rel_tol, abs_tol, trailing[0].sqrt());
    let needed = (0..=k_max)
        .find(|&k| trailing[k].sqrt() <= tol)
        .unwrap_or(k_max);
    let rank = needed.min(max_rank);

    let u = qr.q.slice(s![.., ..rank]).to_owned();
    let v = qr
        .r
        .slice(s![..rank, ..])
        .apply_permutation(&qr.ind, MatrixPermutationMode::ColInv);

    let status = ApproximationStatus {
        rank,
        converged: rank == needed,
        estimated_error: trailing[rank].sqrt(),
    };
    debug!(
        rows = mat.nrows(),
        cols = mat.ncols(),
        rank,
        converged = status.converged,
        "rank-revealing QR approximation"
    );

    Ok(LowRankFactors { u, v, status })
}

/// Adaptive cross approximation through single row and column accessors.
///
/// `row(i, out)` must write row `i` of the block into `out` (length `n`),
/// `col(j, out)` column `j` (length `m`).
pub fn aca<A, FR, FC>(
    m: usize,
    n: usize,
    mut row: FR,
    mut col: FC,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> LowRankFactors<A>
where
    A: TileScalar,
    FR: FnMut(usize, ArrayViewMut1<A>),
    FC: FnMut(usize, ArrayViewMut1<A>),
{
    let cap = max_rank.min(m).min(n);
    let mut u = Array2::<A>::zeros((m, cap));
    let mut v = Array2::<A>::zeros((cap, n));
    let mut used_rows = vec![false; m];
    let mut used_cols = vec![false; n];
    let mut row_buf = Array1::<A>::zeros(n);
    let mut col_buf = Array1::<A>::zeros(m);

    let mut estimate = FrobeniusEstimate { squared: 0.0 };
    let mut stop = StoppingTest::new(rel_tol, abs_tol);
    let mut rank = 0;
    let mut next_row = if m > 0 { Some(0) } else { None };

    while rank < cap {
        let i = match next_row {
            Some(i) => i,
            None => {
                stop.mark_exhausted();
                break;
            }
        };
        used_rows[i] = true;

        row(i, row_buf.view_mut());
        let mut r = &row_buf - &u.slice(s![i, ..rank]).dot(&v.slice(s![..rank, ..]));

        let j = match argmax_unused(&r, &used_cols) {
            Some(j) if !r[j].is_zero() => j,
            _ => {
                trace!(row = i, "residual row vanishes");
                next_row = used_rows.iter().position(|&taken| !taken);
                continue;
            }
        };
        let pivot = r[j];
        r.mapv_inplace(|item| item / pivot);

        col(j, col_buf.view_mut());
        let c = &col_buf - &u.slice(s![.., ..rank]).dot(&v.slice(s![..rank, j]));

        let term = real_to_f64(c.norm_l2()) * real_to_f64(r.norm_l2());
        let squared = estimate.with_term(
            u.slice(s![.., ..rank]),
            v.slice(s![..rank, ..]),
            &c,
            &r,
            term,
        );
        if stop.negligible(term, squared) {
            if stop.converged() {
                break;
            }
            trace!(row = i, term, "negligible term, restarting from an unused row");
            next_row = used_rows.iter().position(|&taken| !taken);
            continue;
        }

        u.column_mut(rank).assign(&c);
        v.row_mut(rank).assign(&r);
        used_cols[j] = true;
        estimate.squared = squared;
        rank += 1;

        next_row = argmax_unused(&c, &used_rows);
    }

    finish(u, v, rank, stop, rank == m.min(n))
}

/// Adaptive cross approximation through an element accessor.
pub fn aca_elements<A, F>(
    m: usize,
    n: usize,
    elem: F,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> LowRankFactors<A>
where
    A: TileScalar,
    F: Fn(usize, usize) -> A,
{
    aca(
        m,
        n,
        |i, mut out: ArrayViewMut1<A>| {
            for (j, item) in out.iter_mut().enumerate() {
                *item = elem(i, j);
            }
        },
        |j, mut out: ArrayViewMut1<A>| {
            for (i, item) in out.iter_mut().enumerate() {
                *item = elem(i, j);
            }
        },
        rel_tol,
        abs_tol,
        max_rank,
    )
}

/// Choose pivots in a residual row block by complete pivoting.
///
/// Returns `(local row, column)` pairs in elimination order. Columns marked
/// in `used_cols` are never chosen.
fn block_pivots<A: TileScalar>(
    mut block: Array2<A>,
    used_cols: &[bool],
    limit: usize,
) -> Vec<(usize, usize)> {
    let mut row_taken = vec![false; block.nrows()];
    let mut col_taken = used_cols.to_vec();
    let mut pivots = Vec::new();

    while pivots.len() < limit.min(block.nrows()) {
        let best = block
            .indexed_iter()
            .filter(|((p, q), _)| !row_taken[*p] && !col_taken[*q])
            .map(|(index, &item)| (index, real_to_f64(item.abs())))
            .max_by(|first, second| by_magnitude(&first.1, &second.1));

        let (p, q) = match best {
            Some((index, value)) if value > 0.0 => index,
            _ => break,
        };

        let pivot = block[[p, q]];
        let pivot_row = block.row(p).mapv(|item| item / pivot).insert_axis(Axis(0));
        let pivot_col = block.column(q).to_owned().insert_axis(Axis(1));
        block -= &pivot_col.dot(&pivot_row);

        row_taken[p] = true;
        col_taken[q] = true;
        pivots.push((p, q));
    }

    pivots
}

/// Blocked adaptive cross approximation.
///
/// `rows(idx, out)` must write the rows `idx` of the block into `out`
/// (`idx.len()` x `n`), `cols(idx, out)` the columns `idx` into `out`
/// (`m` x `idx.len()`). Up to `blocksize` rows and the matching pivot
/// columns are requested per call. Each rank-one term is accepted under the
/// same stopping test as [`aca`].
#[allow(clippy::too_many_arguments)]
pub fn baca<A, FR, FC>(
    m: usize,
    n: usize,
    mut rows: FR,
    mut cols: FC,
    blocksize: usize,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
) -> LowRankFactors<A>
where
    A: TileScalar,
    FR: FnMut(&[usize], ArrayViewMut2<A>),
    FC: FnMut(&[usize], ArrayViewMut2<A>),
{
    assert!(blocksize > 0, "baca: blocksize must be positive");

    let cap = max_rank.min(m).min(n);
    let mut u = Array2::<A>::zeros((m, cap));
    let mut v = Array2::<A>::zeros((cap, n));
    let mut used_rows = vec![false; m];
    let mut used_cols = vec![false; n];

    let mut estimate = FrobeniusEstimate { squared: 0.0 };
    let mut stop = StoppingTest::new(rel_tol, abs_tol);
    let mut rank = 0;
    let mut next_rows: Vec<usize> = (0..m.min(blocksize)).collect();
    let unused_rows = |used_rows: &[bool]| -> Vec<usize> {
        (0..m).filter(|&i| !used_rows[i]).take(blocksize).collect()
    };

    'blocks: while rank < cap {
        if next_rows.is_empty() {
            stop.mark_exhausted();
            break;
        }
        for &i in &next_rows {
            used_rows[i] = true;
        }

        let mut row_block = Array2::<A>::zeros((next_rows.len(), n));
        rows(&next_rows, row_block.view_mut());
        row_block -= &u
            .slice(s![.., ..rank])
            .select(Axis(0), &next_rows)
            .dot(&v.slice(s![..rank, ..]));

        let pivots = block_pivots(row_block.clone(), &used_cols, cap - rank);
        if pivots.is_empty() {
            trace!(rows = ?next_rows, "residual row block vanishes");
            next_rows = unused_rows(&used_rows);
            continue;
        }

        let pivot_cols = pivots.iter().map(|&(_, q)| q).collect_vec();
        let mut col_block = Array2::<A>::zeros((m, pivot_cols.len()));
        cols(&pivot_cols, col_block.view_mut());
        col_block -= &u
            .slice(s![.., ..rank])
            .dot(&v.slice(s![..rank, ..]).select(Axis(1), &pivot_cols));

        let start = rank;
        let mut restart = false;
        for (t, &(p, q)) in pivots.iter().enumerate() {
            let i = next_rows[p];
            let mut r = &row_block.row(p) - &u.slice(s![i, start..rank]).dot(&v.slice(s![start..rank, ..]));
            let c = &col_block.column(t) - &u.slice(s![.., start..rank]).dot(&v.slice(s![start..rank, q]));

            let pivot = r[q];
            if pivot.is_zero() {
                break;
            }
            r.mapv_inplace(|item| item / pivot);

            let term = real_to_f64(c.norm_l2()) * real_to_f64(r.norm_l2());
            let squared = estimate.with_term(
                u.slice(s![.., ..rank]),
                v.slice(s![..rank, ..]),
                &c,
                &r,
                term,
            );
            if stop.negligible(term, squared) {
                if stop.converged() {
                    break 'blocks;
                }
                restart = true;
                break;
            }

            u.column_mut(rank).assign(&c);
            v.row_mut(rank).assign(&r);
            used_cols[q] = true;
            estimate.squared = squared;
            rank += 1;
        }

        if restart {
            trace!(rows = ?next_rows, "negligible term, restarting from unused rows");
            next_rows = unused_rows(&used_rows);
            continue;
        }

        // The next rows are those with the largest residual in the column block.
        let residual = &col_block
            - &u.slice(s![.., start..rank])
                .dot(&v.slice(s![start..rank, ..]).select(Axis(1), &pivot_cols));
        let score = residual
            .axis_iter(Axis(0))
            .map(|line| {
                line.iter()
                    .map(|&item| real_to_f64(item.abs()))
                    .fold(0.0, f64::max)
            })
            .collect_vec();
        next_rows = (0..m)
            .filter(|&i| !used_rows[i])
            .sorted_by(|&first, &second| by_magnitude(&score[second], &score[first]))
            .take(blocksize)
            .collect();
    }

    finish(u, v, rank, stop, rank == m.min(n))
}

fn finish<A: TileScalar>(
    u: Array2<A>,
    v: Array2<A>,
    rank: usize,
    stop: StoppingTest,
    full_rank: bool,
) -> LowRankFactors<A> {
    let u = u.slice(s![.., ..rank]).to_owned();
    let v = v.slice(s![..rank, ..]).to_owned();
    let status = ApproximationStatus {
        rank,
        converged: stop.converged() || stop.exhausted || full_rank,
        estimated_error: if full_rank { 0.0 } else { stop.estimated_error() },
    };
    debug!(
        rows = u.nrows(),
        cols = v.ncols(),
        rank,
        converged = status.converged,
        estimated_error = status.estimated_error,
        "cross approximation"
    );
    LowRankFactors { u, v, status }
}
