//! Dense kernels used by the tile algebra.
//!
//! Thin wrappers around `ndarray` products and the `ndarray-linalg`
//! triangular solver that add BLAS-style transpose and side selectors.
//! Every kernel takes an explicit `task_depth`: the number of fork-join
//! levels it may still open. A depth of zero runs sequentially. Large
//! outputs are split in halves with `rayon::join`, each half receiving
//! `task_depth - 1`.

use crate::types::{Result, TileScalar};
use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, CowArray, Ix2};
use ndarray_linalg::SolveTriangular;
use num::traits::{One, Zero};

pub use ndarray_linalg::{Diag, UPLO};

/// Outputs with fewer rows and columns than twice this are never split.
const PARALLEL_SPLIT_SIZE: usize = 128;

/// Operation applied to a matrix operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trans {
    /// No transpose.
    N,
    /// Transpose.
    T,
    /// Conjugate transpose.
    C,
}

/// Side from which a triangular matrix is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    /// Solve `op(A) X = alpha B`.
    L,
    /// Solve `X op(A) = alpha B`.
    R,
}

/// Return `op(a)`. Transposes are views, conjugate transposes are copies.
pub fn op<A: TileScalar>(a: ArrayView2<A>, trans: Trans) -> CowArray<A, Ix2> {
    match trans {
        Trans::N => a.into(),
        Trans::T => a.reversed_axes().into(),
        Trans::C => a.t().mapv(|item| item.conj()).into(),
    }
}

fn flip(uplo: UPLO) -> UPLO {
    match uplo {
        UPLO::Upper => UPLO::Lower,
        UPLO::Lower => UPLO::Upper,
    }
}

fn scale_in_place<A: TileScalar>(beta: A, mut c: ArrayViewMut2<A>) {
    if beta.is_zero() {
        c.fill(A::zero());
    } else {
        c.mapv_inplace(|item| item * beta);
    }
}

/// `c = alpha * op(a) * op(b) + beta * c`.
#[allow(clippy::too_many_arguments)]
pub fn gemm<A: TileScalar>(
    ta: Trans,
    tb: Trans,
    alpha: A,
    a: ArrayView2<A>,
    b: ArrayView2<A>,
    beta: A,
    c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    let a = op(a, ta);
    let b = op(b, tb);

    assert_eq!(a.ncols(), b.nrows(), "gemm: inner dimensions do not match");
    assert_eq!(
        (a.nrows(), b.ncols()),
        c.dim(),
        "gemm: output has the wrong shape"
    );

    gemm_split(alpha, a.view(), b.view(), beta, c, task_depth);
}

fn gemm_split<A: TileScalar>(
    alpha: A,
    a: ArrayView2<A>,
    b: ArrayView2<A>,
    beta: A,
    mut c: ArrayViewMut2<A>,
    task_depth: usize,
) {
    let (m, n) = c.dim();
    if m == 0 || n == 0 {
        return;
    }
    if a.ncols() == 0 {
        scale_in_place(beta, c);
        return;
    }

    if task_depth > 0 && m.max(n) >= 2 * PARALLEL_SPLIT_SIZE {
        if n >= m {
            let (b1, b2) = b.split_at(Axis(1), n / 2);
            let (c1, c2) = c.split_at(Axis(1), n / 2);
            rayon::join(
                || gemm_split(alpha, a, b1, beta, c1, task_depth - 1),
                || gemm_split(alpha, a, b2, beta, c2, task_depth - 1),
            );
        } else {
            let (a1, a2) = a.split_at(Axis(0), m / 2);
            let (c1, c2) = c.split_at(Axis(0), m / 2);
            rayon::join(
                || gemm_split(alpha, a1, b, beta, c1, task_depth - 1),
                || gemm_split(alpha, a2, b, beta, c2, task_depth - 1),
            );
        }
        return;
    }

    general_mat_mul(alpha, &a, &b, beta, &mut c);
}

/// `y = alpha * op(a) * x + beta * y`.
pub fn gemv<A: TileScalar>(
    ta: Trans,
    alpha: A,
    a: ArrayView2<A>,
    x: ArrayView1<A>,
    beta: A,
    y: ArrayViewMut1<A>,
    task_depth: usize,
) {
    let a = op(a, ta);

    assert_eq!(a.ncols(), x.len(), "gemv: inner dimensions do not match");
    assert_eq!(a.nrows(), y.len(), "gemv: output has the wrong length");

    gemv_split(alpha, a.view(), x, beta, y, task_depth);
}

fn gemv_split<A: TileScalar>(
    alpha: A,
    a: ArrayView2<A>,
    x: ArrayView1<A>,
    beta: A,
    mut y: ArrayViewMut1<A>,
    task_depth: usize,
) {
    let m = y.len();
    if m == 0 {
        return;
    }
    if x.is_empty() {
        if beta.is_zero() {
            y.fill(A::zero());
        } else {
            y.mapv_inplace(|item| item * beta);
        }
        return;
    }

    if task_depth > 0 && m >= 2 * PARALLEL_SPLIT_SIZE {
        let (a1, a2) = a.split_at(Axis(0), m / 2);
        let (y1, y2) = y.split_at(Axis(0), m / 2);
        rayon::join(
            || gemv_split(alpha, a1, x, beta, y1, task_depth - 1),
            || gemv_split(alpha, a2, x, beta, y2, task_depth - 1),
        );
        return;
    }

    general_mat_vec_mul(alpha, &a, &x, beta, &mut y);
}

/// Triangular solve in place: `b = alpha * op(a)^{-1} * b` for `Side::L`,
/// `b = alpha * b * op(a)^{-1}` for `Side::R`.
///
/// Only the `uplo` triangle of `a` is referenced.
#[allow(clippy::too_many_arguments)]
pub fn trsm<A: TileScalar>(
    side: Side,
    uplo: UPLO,
    ta: Trans,
    diag: Diag,
    alpha: A,
    a: ArrayView2<A>,
    b: ArrayViewMut2<A>,
    task_depth: usize,
) -> Result<()> {
    assert_eq!(a.nrows(), a.ncols(), "trsm: triangular factor must be square");
    match side {
        Side::L => assert_eq!(a.nrows(), b.nrows(), "trsm: row count mismatch"),
        Side::R => assert_eq!(a.ncols(), b.ncols(), "trsm: column count mismatch"),
    }

    let uplo = match ta {
        Trans::N => uplo,
        Trans::T | Trans::C => flip(uplo),
    };
    let a = op(a, ta);
    let a = a.as_standard_layout();

    trsm_split(side, uplo, diag, alpha, a.view(), b, task_depth)
}

fn trsm_split<A: TileScalar>(
    side: Side,
    uplo: UPLO,
    diag: Diag,
    alpha: A,
    a: ArrayView2<A>,
    mut b: ArrayViewMut2<A>,
    task_depth: usize,
) -> Result<()> {
    let (m, n) = b.dim();
    if m == 0 || n == 0 {
        return Ok(());
    }

    // Columns of b are independent for a left solve, rows for a right solve.
    let axis = match side {
        Side::L => Axis(1),
        Side::R => Axis(0),
    };
    let len = b.len_of(axis);
    if task_depth > 0 && len >= 2 * PARALLEL_SPLIT_SIZE {
        let (b1, b2) = b.split_at(axis, len / 2);
        let (first, second) = rayon::join(
            || trsm_split(side, uplo, diag, alpha, a, b1, task_depth - 1),
            || trsm_split(side, uplo, diag, alpha, a, b2, task_depth - 1),
        );
        first?;
        second?;
        return Ok(());
    }

    let x = match side {
        Side::L => a.solve_triangular(uplo, diag, &b.to_owned())?,
        Side::R => a
            .t()
            .solve_triangular(flip(uplo), diag, &b.t().to_owned())?
            .reversed_axes(),
    };

    b.assign(&x);
    if alpha != A::one() {
        b.mapv_inplace(|item| item * alpha);
    }
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::random_matrix::RandomMatrix;
    use crate::types::RelDiff;
    use ndarray::{Array1, Array2};
    use ndarray_linalg::Scalar;

    fn lower_triangular<A: RandomMatrix>(n: usize) -> Array2<A> {
        let mut rng = rand::thread_rng();
        let mut a = A::random_gaussian((n, n), &mut rng);
        for ((i, j), item) in a.indexed_iter_mut() {
            if j > i {
                *item = A::zero();
            } else if i == j {
                *item = *item + A::from_real(A::real(2.0 * n as f64));
            }
        }
        a
    }

    macro_rules! gemm_tests {
        ($($name:ident: $scalar:ty, $ta:expr, $tb:expr, $depth:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let (m, k, n) = (300, 20, 270);
                let mut rng = rand::thread_rng();

                let a = <$scalar>::random_gaussian((m, k), &mut rng);
                let b = <$scalar>::random_gaussian((k, n), &mut rng);
                let c0 = <$scalar>::random_gaussian((m, n), &mut rng);

                let a_stored = match $ta {
                    Trans::N => a.clone(),
                    Trans::T => a.t().to_owned(),
                    Trans::C => a.t().mapv(|item| item.conj()),
                };
                let b_stored = match $tb {
                    Trans::N => b.clone(),
                    Trans::T => b.t().to_owned(),
                    Trans::C => b.t().mapv(|item| item.conj()),
                };

                let alpha = <$scalar>::from_real(0.5);
                let beta = <$scalar>::from_real(2.0);

                let mut c = c0.clone();
                gemm($ta, $tb, alpha, a_stored.view(), b_stored.view(), beta, c.view_mut(), $depth);

                let expected = a.dot(&b).mapv(|item| item * alpha) + c0.mapv(|item| item * beta);
                assert!(c.rel_diff(&expected) < 1E-5);
            }
            )*
        };
    }

    gemm_tests! {
        gemm_nn_f64: f64, Trans::N, Trans::N, 0,
        gemm_tn_f64: f64, Trans::T, Trans::N, 2,
        gemm_nt_f32: f32, Trans::N, Trans::T, 3,
        gemm_cc_c64: ndarray_linalg::c64, Trans::C, Trans::C, 2,
        gemm_nc_c32: ndarray_linalg::c32, Trans::N, Trans::C, 0,
    }

    #[test]
    fn gemm_with_empty_inner_dimension_scales_output() {
        let a = Array2::<f64>::zeros((3, 0));
        let b = Array2::<f64>::zeros((0, 2));
        let mut c = Array2::<f64>::ones((3, 2));
        gemm(Trans::N, Trans::N, 1.0, a.view(), b.view(), 3.0, c.view_mut(), 0);
        assert!(c.iter().all(|&item| item == 3.0));
    }

    #[test]
    fn gemv_matches_dot() {
        let mut rng = rand::thread_rng();
        let a = f64::random_gaussian((400, 30), &mut rng);
        let x = Array1::from_iter((0..400).map(|index| index as f64 / 400.0));
        let mut y = Array1::<f64>::zeros(30);

        gemv(Trans::T, 1.0, a.view(), x.view(), 0.0, y.view_mut(), 2);

        let expected = a.t().dot(&x);
        let err = (&y - &expected).iter().map(|item| item * item).sum::<f64>().sqrt();
        assert!(err < 1E-10 * expected.iter().map(|item| item * item).sum::<f64>().sqrt());
    }

    #[test]
    fn gemv_splits_long_outputs() {
        let mut rng = rand::thread_rng();
        let a = f64::random_gaussian((600, 40), &mut rng);
        let x = f64::random_gaussian((40, 1), &mut rng).column(0).to_owned();
        let y0 = f64::random_gaussian((600, 1), &mut rng).column(0).to_owned();

        let expected = a.dot(&x) * 2.0 + &y0 * 0.5;
        for &(ta, ref mat) in &[(Trans::N, a.clone()), (Trans::T, a.t().to_owned())] {
            for &depth in &[0, 3] {
                let mut y = y0.clone();
                gemv(ta, 2.0, mat.view(), x.view(), 0.5, y.view_mut(), depth);

                let err = (&y - &expected).iter().map(|item| item * item).sum::<f64>().sqrt();
                assert!(err < 1E-10 * expected.iter().map(|item| item * item).sum::<f64>().sqrt());
            }
        }
    }

    macro_rules! trsm_tests {
        ($($name:ident: $scalar:ty, $side:expr, $ta:expr, $depth:expr,)*) => {
            $(
            #[test]
            fn $name() {
                let n = 40;
                let mut rng = rand::thread_rng();
                let lower = lower_triangular::<$scalar>(n);
                let opa = match $ta {
                    Trans::N => lower.clone(),
                    Trans::T => lower.t().to_owned(),
                    Trans::C => lower.t().mapv(|item| item.conj()),
                };
                let alpha = <$scalar>::from_real(2.0);

                let rhs_shape = match $side {
                    Side::L => (n, 300),
                    Side::R => (300, n),
                };
                let b0 = <$scalar>::random_gaussian(rhs_shape, &mut rng);
                let mut x = b0.clone();

                trsm($side, UPLO::Lower, $ta, Diag::NonUnit, alpha, lower.view(), x.view_mut(), $depth).unwrap();

                let reconstructed = match $side {
                    Side::L => opa.dot(&x),
                    Side::R => x.dot(&opa),
                };
                let expected = b0.mapv(|item| item * alpha);
                assert!(reconstructed.rel_diff(&expected) < 1E-4);
            }
            )*
        };
    }

    trsm_tests! {
        trsm_left_lower_f64: f64, Side::L, Trans::N, 0,
        trsm_left_transposed_f64: f64, Side::L, Trans::T, 2,
        trsm_right_lower_f64: f64, Side::R, Trans::N, 2,
        trsm_right_conjugate_c64: ndarray_linalg::c64, Side::R, Trans::C, 0,
        trsm_left_conjugate_c32: ndarray_linalg::c32, Side::L, Trans::C, 1,
    }

    #[test]
    fn trsm_with_unit_diagonal_ignores_stored_diagonal() {
        let mut a = Array2::<f64>::eye(3);
        a[[1, 0]] = 2.0;
        a[[2, 1]] = -1.0;
        a.diag_mut().fill(100.0);

        let mut b = Array2::<f64>::ones((3, 1));
        trsm(Side::L, UPLO::Lower, Trans::N, Diag::Unit, 1.0, a.view(), b.view_mut(), 0).unwrap();

        assert!((b[[0, 0]] - 1.0).abs() < 1E-14);
        assert!((b[[1, 0]] + 1.0).abs() < 1E-14);
        assert!((b[[2, 0]]).abs() < 1E-14);
    }
}
