//! Products of two tiles and Schur-complement updates.
//!
//! Every function dispatches on the pair of representations of its operands
//! and contracts through the ranks of the low-rank ones. The full `m x n`
//! product is only formed when both operands are dense.
//!
//! The update functions compute `c -= a * b` restricted to some rows or
//! columns of the product. The target `c` holds only the requested rows or
//! columns, in the order they are given. The batched forms evaluate the same
//! contractions as the single-index forms, one index per column (or row) of
//! the intermediates.

use crate::kernels::{self, Trans};
use crate::low_rank_tile::LowRankTile;
use crate::tile::Tile;
use crate::types::TileScalar;
use ndarray::{Array1, Array2, ArrayViewMut1, ArrayViewMut2, Axis};
use num::traits::{One, Zero};
use tracing::trace;

fn op_dim<A: TileScalar>(tile: &Tile<A>, trans: Trans) -> (usize, usize) {
    match trans {
        Trans::N => (tile.rows(), tile.cols()),
        Trans::T | Trans::C => (tile.cols(), tile.rows()),
    }
}

fn assert_conformable<A: TileScalar>(a: &Tile<A>, b: &Tile<A>) {
    assert_eq!(
        a.cols(),
        b.rows(),
        "Schur update: a has {} columns but b has {} rows",
        a.cols(),
        b.rows()
    );
}

/// `c = alpha * op(a) * op(b) + beta * c`.
#[allow(clippy::too_many_arguments)]
pub fn gemm<A: TileScalar>(
    ta: Trans,
    tb: Trans,
    alpha: A,
    a: &Tile<A>,
    b: &Tile<A>,
    beta: A,
    c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    let (m, k) = op_dim(a, ta);
    let (kb, n) = op_dim(b, tb);
    assert_eq!(k, kb, "gemm: inner dimensions {} and {} differ", k, kb);
    assert_eq!(
        c.dim(),
        (m, n),
        "gemm: output is {:?}, expected {:?}",
        c.dim(),
        (m, n)
    );

    match (a, b) {
        (Tile::Dense(a), Tile::Dense(b)) => {
            kernels::gemm(ta, tb, alpha, a.d().view(), b.d().view(), beta, c, task_depth)
        }
        (Tile::Dense(a), Tile::LowRank(b)) => {
            b.multiply_left(ta, tb, alpha, a.d().view(), beta, c, task_depth)
        }
        (Tile::LowRank(a), Tile::Dense(b)) => {
            a.multiply(ta, tb, alpha, b.d().view(), beta, c, task_depth)
        }
        (Tile::LowRank(a), Tile::LowRank(b)) => {
            low_rank_product(ta, tb, alpha, a, b, beta, c, task_depth)
        }
    }
}

/// Both operands low rank: `op(a) * op(b) = la * (ra * lb) * rb`. The
/// `rank_a x rank_b` core is formed first, then it is absorbed into
/// whichever outer factor gives fewer flops.
#[allow(clippy::too_many_arguments)]
fn low_rank_product<A: TileScalar>(
    ta: Trans,
    tb: Trans,
    alpha: A,
    a: &LowRankTile<A>,
    b: &LowRankTile<A>,
    beta: A,
    c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    let ((la, tla), (ra, tra)) = a.op_factors(ta);
    let ((lb, tlb), (rb, trb)) = b.op_factors(tb);
    let (m, n) = c.dim();
    let (rank_a, rank_b) = (a.rank(), b.rank());

    let mut core = Array2::<A>::zeros((rank_a, rank_b));
    kernels::gemm(tra, tlb, A::one(), ra, lb, A::zero(), core.view_mut(), task_depth);

    let left_first = m * rank_b * (rank_a + n);
    let right_first = rank_a * n * (rank_b + m);
    trace!(m, n, rank_a, rank_b, left_first, right_first, "low-rank product");

    if left_first <= right_first {
        let mut tmp = Array2::<A>::zeros((m, rank_b));
        kernels::gemm(tla, Trans::N, A::one(), la, core.view(), A::zero(), tmp.view_mut(), task_depth);
        kernels::gemm(Trans::N, trb, alpha, tmp.view(), rb, beta, c, task_depth);
    } else {
        let mut tmp = Array2::<A>::zeros((rank_a, n));
        kernels::gemm(Trans::N, trb, A::one(), core.view(), rb, A::zero(), tmp.view_mut(), task_depth);
        kernels::gemm(tla, Trans::N, alpha, la, tmp.view(), beta, c, task_depth);
    }
}

/// `c -= (a * b)[.., j]`.
pub fn update_col<A: TileScalar>(
    j: usize,
    a: &Tile<A>,
    b: &Tile<A>,
    c: ArrayViewMut1<A>,
    task_depth: usize,
) {
    assert_conformable(a, b);
    assert!(j < b.cols(), "update_col: column {} out of range", j);
    assert_eq!(c.len(), a.rows(), "update_col: target has wrong length");

    let one = A::one();
    let zero = A::zero();
    let minus_one = -one;

    match (a, b) {
        (Tile::Dense(a), Tile::Dense(b)) => {
            kernels::gemv(Trans::N, minus_one, a.d().view(), b.d().column(j), one, c, task_depth);
        }
        (Tile::Dense(a), Tile::LowRank(b)) => {
            let mut tmp = Array1::<A>::zeros(b.rows());
            kernels::gemv(Trans::N, one, b.u().view(), b.v().column(j), zero, tmp.view_mut(), task_depth);
            kernels::gemv(Trans::N, minus_one, a.d().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::Dense(b)) => {
            let mut tmp = Array1::<A>::zeros(a.rank());
            kernels::gemv(Trans::N, one, a.v().view(), b.d().column(j), zero, tmp.view_mut(), task_depth);
            kernels::gemv(Trans::N, minus_one, a.u().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::LowRank(b)) => {
            let mut tmp1 = Array1::<A>::zeros(b.rows());
            let mut tmp2 = Array1::<A>::zeros(a.rank());
            kernels::gemv(Trans::N, one, b.u().view(), b.v().column(j), zero, tmp1.view_mut(), task_depth);
            kernels::gemv(Trans::N, one, a.v().view(), tmp1.view(), zero, tmp2.view_mut(), task_depth);
            kernels::gemv(Trans::N, minus_one, a.u().view(), tmp2.view(), one, c, task_depth);
        }
    }
}

/// `c -= (a * b)[i, ..]`.
pub fn update_row<A: TileScalar>(
    i: usize,
    a: &Tile<A>,
    b: &Tile<A>,
    c: ArrayViewMut1<A>,
    task_depth: usize,
) {
    assert_conformable(a, b);
    assert!(i < a.rows(), "update_row: row {} out of range", i);
    assert_eq!(c.len(), b.cols(), "update_row: target has wrong length");

    let one = A::one();
    let zero = A::zero();
    let minus_one = -one;

    match (a, b) {
        (Tile::Dense(a), Tile::Dense(b)) => {
            kernels::gemv(Trans::T, minus_one, b.d().view(), a.d().row(i), one, c, task_depth);
        }
        (Tile::Dense(a), Tile::LowRank(b)) => {
            let mut tmp = Array1::<A>::zeros(b.rank());
            kernels::gemv(Trans::T, one, b.u().view(), a.d().row(i), zero, tmp.view_mut(), task_depth);
            kernels::gemv(Trans::T, minus_one, b.v().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::Dense(b)) => {
            let mut tmp = Array1::<A>::zeros(a.cols());
            kernels::gemv(Trans::T, one, a.v().view(), a.u().row(i), zero, tmp.view_mut(), task_depth);
            kernels::gemv(Trans::T, minus_one, b.d().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::LowRank(b)) => {
            let mut tmp1 = Array1::<A>::zeros(a.cols());
            let mut tmp2 = Array1::<A>::zeros(b.rank());
            kernels::gemv(Trans::T, one, a.v().view(), a.u().row(i), zero, tmp1.view_mut(), task_depth);
            kernels::gemv(Trans::T, one, b.u().view(), tmp1.view(), zero, tmp2.view_mut(), task_depth);
            kernels::gemv(Trans::T, minus_one, b.v().view(), tmp2.view(), one, c, task_depth);
        }
    }
}

/// `c[.., k] -= (a * b)[.., cols[k]]` for every `k`.
pub fn update_cols<A: TileScalar>(
    cols: &[usize],
    a: &Tile<A>,
    b: &Tile<A>,
    c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    assert_conformable(a, b);
    assert!(
        cols.iter().all(|&j| j < b.cols()),
        "update_cols: column index out of range"
    );
    assert_eq!(
        c.dim(),
        (a.rows(), cols.len()),
        "update_cols: target has wrong shape"
    );
    if cols.is_empty() {
        return;
    }

    let one = A::one();
    let zero = A::zero();
    let minus_one = -one;
    let nc = cols.len();

    match (a, b) {
        (Tile::Dense(a), Tile::Dense(b)) => {
            let bc = b.d().select(Axis(1), cols);
            kernels::gemm(Trans::N, Trans::N, minus_one, a.d().view(), bc.view(), one, c, task_depth);
        }
        (Tile::Dense(a), Tile::LowRank(b)) => {
            let vc = b.v().select(Axis(1), cols);
            let mut tmp = Array2::<A>::zeros((b.rows(), nc));
            kernels::gemm(Trans::N, Trans::N, one, b.u().view(), vc.view(), zero, tmp.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, a.d().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::Dense(b)) => {
            let bc = b.d().select(Axis(1), cols);
            let mut tmp = Array2::<A>::zeros((a.rank(), nc));
            kernels::gemm(Trans::N, Trans::N, one, a.v().view(), bc.view(), zero, tmp.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, a.u().view(), tmp.view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::LowRank(b)) => {
            let vc = b.v().select(Axis(1), cols);
            let mut tmp1 = Array2::<A>::zeros((b.rows(), nc));
            let mut tmp2 = Array2::<A>::zeros((a.rank(), nc));
            kernels::gemm(Trans::N, Trans::N, one, b.u().view(), vc.view(), zero, tmp1.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, one, a.v().view(), tmp1.view(), zero, tmp2.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, a.u().view(), tmp2.view(), one, c, task_depth);
        }
    }
}

/// `c[k, ..] -= (a * b)[rows[k], ..]` for every `k`.
pub fn update_rows<A: TileScalar>(
    rows: &[usize],
    a: &Tile<A>,
    b: &Tile<A>,
    c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    assert_conformable(a, b);
    assert!(
        rows.iter().all(|&i| i < a.rows()),
        "update_rows: row index out of range"
    );
    assert_eq!(
        c.dim(),
        (rows.len(), b.cols()),
        "update_rows: target has wrong shape"
    );
    if rows.is_empty() {
        return;
    }

    let one = A::one();
    let zero = A::zero();
    let minus_one = -one;
    let nr = rows.len();

    match (a, b) {
        (Tile::Dense(a), Tile::Dense(b)) => {
            let ar = a.d().select(Axis(0), rows);
            kernels::gemm(Trans::N, Trans::N, minus_one, ar.view(), b.d().view(), one, c, task_depth);
        }
        (Tile::Dense(a), Tile::LowRank(b)) => {
            let ar = a.d().select(Axis(0), rows);
            let mut tmp = Array2::<A>::zeros((nr, b.rank()));
            kernels::gemm(Trans::N, Trans::N, one, ar.view(), b.u().view(), zero, tmp.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, tmp.view(), b.v().view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::Dense(b)) => {
            let ur = a.u().select(Axis(0), rows);
            let mut tmp = Array2::<A>::zeros((nr, a.cols()));
            kernels::gemm(Trans::N, Trans::N, one, ur.view(), a.v().view(), zero, tmp.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, tmp.view(), b.d().view(), one, c, task_depth);
        }
        (Tile::LowRank(a), Tile::LowRank(b)) => {
            let ur = a.u().select(Axis(0), rows);
            let mut tmp1 = Array2::<A>::zeros((nr, a.cols()));
            let mut tmp2 = Array2::<A>::zeros((nr, b.rank()));
            kernels::gemm(Trans::N, Trans::N, one, ur.view(), a.v().view(), zero, tmp1.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, one, tmp1.view(), b.u().view(), zero, tmp2.view_mut(), task_depth);
            kernels::gemm(Trans::N, Trans::N, minus_one, tmp2.view(), b.v().view(), one, c, task_depth);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::random_matrix::RandomMatrix;
    use crate::types::{c64, RelDiff};
    use ndarray_linalg::Scalar;

    /// A tile of the requested representation together with its dense value.
    fn make_tile<A: RandomMatrix>(low_rank: bool, m: usize, n: usize, rank: usize) -> (Tile<A>, Array2<A>) {
        let mut rng = rand::thread_rng();
        if low_rank {
            let u = A::random_gaussian((m, rank), &mut rng);
            let v = A::random_gaussian((rank, n), &mut rng);
            let mat = u.dot(&v);
            (Tile::low_rank(u, v), mat)
        } else {
            let mat = A::random_gaussian((m, n), &mut rng);
            (Tile::from_dense_block(mat.clone()), mat)
        }
    }

    fn apply_op<A: TileScalar>(mat: &Array2<A>, trans: Trans) -> Array2<A> {
        match trans {
            Trans::N => mat.clone(),
            Trans::T => mat.t().to_owned(),
            Trans::C => mat.t().mapv(|item| item.conj()),
        }
    }

    macro_rules! pair_tests {
        ($($name:ident: $a_low_rank:expr, $b_low_rank:expr,)*) => {
            mod pairs {
                use super::*;

                $(
                mod $name {
                    use super::*;

                    #[test]
                    fn gemm_matches_dense_product() {
                        for &(ta, tb) in &[(Trans::N, Trans::N), (Trans::T, Trans::N), (Trans::N, Trans::C), (Trans::C, Trans::T)] {
                            let mut rng = rand::thread_rng();
                            // Stored shapes so that op(a) is 35 x 25 and op(b) is 25 x 45.
                            let a_dim = if ta == Trans::N { (35, 25) } else { (25, 35) };
                            let b_dim = if tb == Trans::N { (25, 45) } else { (45, 25) };
                            let (a, a_mat) = make_tile::<c64>($a_low_rank, a_dim.0, a_dim.1, 4);
                            let (b, b_mat) = make_tile::<c64>($b_low_rank, b_dim.0, b_dim.1, 6);

                            let alpha = c64::new(1.5, 0.5);
                            let beta = c64::from_real(-1.0);
                            let c0 = c64::random_gaussian((35, 45), &mut rng);

                            let mut c = c0.clone();
                            gemm(ta, tb, alpha, &a, &b, beta, c.view_mut(), 2);

                            let expected = apply_op(&a_mat, ta).dot(&apply_op(&b_mat, tb)).mapv(|item| item * alpha)
                                + c0.mapv(|item| item * beta);
                            assert!(c.rel_diff(&expected) < 1E-10);
                        }
                    }

                    #[test]
                    fn updates_subtract_product() {
                        let mut rng = rand::thread_rng();
                        let (a, a_mat) = make_tile::<f64>($a_low_rank, 30, 20, 3);
                        let (b, b_mat) = make_tile::<f64>($b_low_rank, 20, 25, 5);
                        let c0 = f64::random_gaussian((30, 25), &mut rng);
                        let expected = &c0 - &a_mat.dot(&b_mat);

                        let cols = [7usize, 0, 24, 3];
                        let mut c = c0.select(Axis(1), &cols);
                        update_cols(&cols, &a, &b, c.view_mut(), 0);
                        assert!(c.rel_diff(&expected.select(Axis(1), &cols)) < 1E-12);

                        let rows = [29usize, 2, 11];
                        let mut c = c0.select(Axis(0), &rows);
                        update_rows(&rows, &a, &b, c.view_mut(), 1);
                        assert!(c.rel_diff(&expected.select(Axis(0), &rows)) < 1E-12);

                        let mut c = c0.clone();
                        for j in 0..25 {
                            update_col(j, &a, &b, c.column_mut(j), 0);
                        }
                        assert!(c.rel_diff(&expected) < 1E-12);

                        let mut c = c0.clone();
                        for i in 0..30 {
                            update_row(i, &a, &b, c.row_mut(i), 0);
                        }
                        assert!(c.rel_diff(&expected) < 1E-12);
                    }

                    #[test]
                    fn single_index_updates_match_batched() {
                        let mut rng = rand::thread_rng();
                        let (a, _) = make_tile::<c64>($a_low_rank, 18, 22, 4);
                        let (b, _) = make_tile::<c64>($b_low_rank, 22, 16, 2);
                        let c0 = c64::random_gaussian((18, 16), &mut rng);

                        let cols = [15usize, 4, 4, 9];
                        let mut batched = c0.select(Axis(1), &cols);
                        update_cols(&cols, &a, &b, batched.view_mut(), 0);
                        for (k, &j) in cols.iter().enumerate() {
                            let mut single = c0.column(j).to_owned();
                            update_col(j, &a, &b, single.view_mut(), 0);
                            for (x, y) in single.iter().zip(batched.column(k)) {
                                assert!((x - y).abs() < 1E-12 * (1.0 + y.abs()));
                            }
                        }

                        let rows = [0usize, 17, 8];
                        let mut batched = c0.select(Axis(0), &rows);
                        update_rows(&rows, &a, &b, batched.view_mut(), 0);
                        for (k, &i) in rows.iter().enumerate() {
                            let mut single = c0.row(i).to_owned();
                            update_row(i, &a, &b, single.view_mut(), 0);
                            for (x, y) in single.iter().zip(batched.row(k)) {
                                assert!((x - y).abs() < 1E-12 * (1.0 + y.abs()));
                            }
                        }
                    }
                }
                )*
            }
        };
    }

    pair_tests! {
        dense_dense: false, false,
        dense_low_rank: false, true,
        low_rank_dense: true, false,
        low_rank_low_rank: true, true,
    }

    #[test]
    fn low_rank_product_picks_either_order() {
        // Wide and tall outputs exercise both contraction orders.
        for &(m, n) in &[(200, 10), (10, 200)] {
            let (a, a_mat) = make_tile::<f64>(true, m, 50, 3);
            let (b, b_mat) = make_tile::<f64>(true, 50, n, 7);
            let mut c = Array2::<f64>::zeros((m, n));
            gemm(Trans::N, Trans::N, 1.0, &a, &b, 0.0, c.view_mut(), 0);
            assert!(c.rel_diff(&a_mat.dot(&b_mat)) < 1E-12);
        }
    }

    #[test]
    fn empty_index_set_is_a_no_op() {
        let (a, _) = make_tile::<f64>(true, 6, 5, 2);
        let (b, _) = make_tile::<f64>(false, 5, 4, 0);
        let mut c = Array2::<f64>::zeros((6, 0));
        update_cols(&[], &a, &b, c.view_mut(), 0);
        let mut c = Array2::<f64>::zeros((0, 4));
        update_rows(&[], &a, &b, c.view_mut(), 0);
    }

    #[test]
    #[should_panic]
    fn mismatched_inner_dimension_panics() {
        let (a, _) = make_tile::<f64>(false, 6, 5, 0);
        let (b, _) = make_tile::<f64>(true, 4, 4, 2);
        let mut c = Array2::<f64>::zeros((6, 4));
        update_col(0, &a, &b, c.column_mut(0), 0);
    }
}
