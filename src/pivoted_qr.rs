//! This module implements QR with column pivoting by calling into the
//! corresponding Lapack routines. Pivoted QR is currently not
//! implemented in ndarray-linalg, making this module necessary.
//!
//! The factorisation satisfies $AP = QR$. If `ind[j] = k` then the
//! jth column of $QR$ is the kth column of $A$. The absolute values of
//! the diagonal of $R$ are non-increasing, which makes the factorisation
//! rank revealing.

use crate::types::Result;
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2, ShapeBuilder};
use ndarray_linalg::{Lapack, Scalar};

pub struct QR<A: Scalar> {
    /// The Q matrix with orthonormal columns, m x min(m, n).
    pub q: Array2<A>,
    /// The upper trapezoidal R matrix, min(m, n) x n.
    pub r: Array2<A>,
    /// The column pivots.
    pub ind: Array1<usize>,
}

pub trait PivotedQR {
    type Q: Scalar + Lapack;

    fn pivoted_qr(&self) -> Result<QR<Self::Q>>;
}

impl<A, S> PivotedQR for ArrayBase<S, Ix2>
where
    A: HasPivotedQR,
    S: Data<Elem = A>,
{
    type Q = A;

    fn pivoted_qr(&self) -> Result<QR<Self::Q>> {
        let m = self.nrows();
        let n = self.ncols();

        let mut mat_fortran = Array2::<Self::Q>::zeros((m, n).f());
        mat_fortran.assign(self);
        A::pivoted_qr_impl(mat_fortran)
    }
}

pub trait HasPivotedQR: imp::PivotedQRImpl {}

impl<A: imp::PivotedQRImpl> HasPivotedQR for A {}

mod imp {

    use crate::types::{BlrError, Result};
    use ndarray::{s, Array1, Array2};
    use ndarray_linalg::{Lapack, Scalar};
    use num::traits::{ToPrimitive, Zero};

    pub trait PivotedQRImpl
    where
        Self: Scalar + Lapack,
    {
        /// Factorise a matrix stored in Fortran order.
        fn pivoted_qr_impl(mat: Array2<Self>) -> Result<super::QR<Self>>;
    }

    fn workspace_len<A: Scalar>(query: A) -> usize {
        query.re().to_usize().unwrap_or(1).max(1)
    }

    macro_rules! impl_qr_pivot {

    (@real, $scalar:ty, $qp3:path, $orgqr:path) => {
        impl_qr_pivot!(@body, $scalar, $qp3, $orgqr, );
    };
    (@complex, $scalar:ty, $qp3:path, $orgqr:path) => {
        impl_qr_pivot!(@body, $scalar, $qp3, $orgqr, rwork);
    };
    (@body, $scalar:ty, $qp3:path, $orgqr:path, $($rwork_ident:ident),*) => {
            impl PivotedQRImpl for $scalar {
                fn pivoted_qr_impl(mut mat: Array2<Self>) -> Result<super::QR<$scalar>> {
                    let m = mat.nrows();
                    let n = mat.ncols();
                    let k = m.min(n);

                    if k == 0 {
                        return Ok(super::QR {
                            q: Array2::zeros((m, 0)),
                            r: Array2::zeros((0, n)),
                            ind: Array1::from_iter(0..n),
                        });
                    }

                    let a = mat
                        .as_slice_memory_order_mut()
                        .ok_or(BlrError::LayoutError)?;

                    let mut info = 0;
                    let mut tau = vec![<$scalar>::zero(); k];
                    let mut jpvt = vec![0i32; n];
                    let mut work_size = [<$scalar>::zero()];

                    $(
                    let mut $rwork_ident = vec![<$scalar as Scalar>::Real::zero(); 2 * n];
                    )*

                    unsafe {
                        $qp3(
                            m as i32,
                            n as i32,
                            a,
                            m as i32,
                            &mut jpvt,
                            &mut tau,
                            &mut work_size,
                            -1,
                            $(&mut $rwork_ident,)*
                            &mut info,
                        );
                    }
                    if info != 0 {
                        return Err(BlrError::PivotedQRError(info));
                    }

                    let lwork = workspace_len(work_size[0]);
                    let mut work = vec![<$scalar>::zero(); lwork];
                    unsafe {
                        $qp3(
                            m as i32,
                            n as i32,
                            a,
                            m as i32,
                            &mut jpvt,
                            &mut tau,
                            &mut work,
                            lwork as i32,
                            $(&mut $rwork_ident,)*
                            &mut info,
                        );
                    }
                    if info != 0 {
                        return Err(BlrError::PivotedQRError(info));
                    }

                    // Lapack pivots count from one.
                    let ind: Array1<usize> = jpvt.iter().map(|&item| (item - 1) as usize).collect();

                    let mut r_mat = Array2::<$scalar>::zeros((k, n));
                    for ((i, j), item) in r_mat.indexed_iter_mut() {
                        if j >= i {
                            *item = mat[[i, j]];
                        }
                    }

                    let a = mat
                        .as_slice_memory_order_mut()
                        .ok_or(BlrError::LayoutError)?;

                    unsafe {
                        $orgqr(
                            m as i32,
                            k as i32,
                            k as i32,
                            a,
                            m as i32,
                            &tau,
                            &mut work_size,
                            -1,
                            &mut info,
                        );
                    }
                    if info != 0 {
                        return Err(BlrError::PivotedQRError(info));
                    }

                    let lwork = workspace_len(work_size[0]);
                    let mut work = vec![<$scalar>::zero(); lwork];
                    unsafe {
                        $orgqr(
                            m as i32,
                            k as i32,
                            k as i32,
                            a,
                            m as i32,
                            &tau,
                            &mut work,
                            lwork as i32,
                            &mut info,
                        );
                    }
                    if info != 0 {
                        return Err(BlrError::PivotedQRError(info));
                    }

                    let q_mat = mat.slice(s![.., 0..k]).to_owned();

                    Ok(super::QR { q: q_mat, r: r_mat, ind })
                }
            }
        };
    }
    impl_qr_pivot!(@real, f64, lapack::dgeqp3, lapack::dorgqr);
    impl_qr_pivot!(@real, f32, lapack::sgeqp3, lapack::sorgqr);
    impl_qr_pivot!(@complex, num::complex::Complex<f64>, lapack::zgeqp3, lapack::zungqr);
    impl_qr_pivot!(@complex, num::complex::Complex<f32>, lapack::cgeqp3, lapack::cungqr);
}
