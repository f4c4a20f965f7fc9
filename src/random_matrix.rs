//! Generation of random test matrices for the supported scalar types.

use crate::pivoted_qr::PivotedQR;
use crate::types::TileScalar;
use ndarray::{Array, Array2};
use num::complex::Complex;
use num::traits::cast::cast;
use num::Float;
use rand::Rng;
use rand_distr::{Distribution, Normal};

pub trait RandomMatrix
where
    Self: TileScalar,
{
    /// Generate a random Gaussian matrix.
    ///
    /// # Arguments
    ///
    /// * `dimension`: Tuple (rows, cols) specifying the number of rows and columns.
    /// * `rng`: The random number generator to use.
    fn random_gaussian<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<Self>;

    /// Generate a random matrix with orthonormal columns (m >= n) or rows (m < n).
    ///
    /// # Panics
    ///
    /// Panics if the underlying pivoted QR fails.
    fn random_orthogonal_matrix<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<Self> {
        let (m, n) = dimension;

        if n > m {
            let q = Self::random_orthogonal_matrix((n, m), rng);
            return q.t().map(|item| item.conj());
        }

        let mat = Self::random_gaussian((m, n), rng);
        match mat.pivoted_qr() {
            Ok(qr) => qr.q,
            Err(err) => panic!("`random_orthogonal_matrix`: QR failed: {}", err),
        }
    }

    /// Generate a random approximate low-rank matrix.
    ///
    /// The singular values are logarithmically distributed between
    /// `sigma_max` and `sigma_min`.
    fn random_approximate_low_rank_matrix<R: Rng>(
        dimension: (usize, usize),
        sigma_max: f64,
        sigma_min: f64,
        rng: &mut R,
    ) -> Array2<Self> {
        assert!(
            sigma_min < sigma_max,
            "`sigma_min` must be smaller than `sigma_max`"
        );
        assert!(sigma_min > 0.0, "`sigma_min` must be positive.");

        let min_dim = std::cmp::min(dimension.0, dimension.1);

        let u = Self::random_orthogonal_matrix((dimension.0, min_dim), rng);
        let vt = Self::random_orthogonal_matrix((min_dim, dimension.1), rng);
        let singvals = Array::geomspace(sigma_max, sigma_min, min_dim)
            .unwrap_or_else(|| Array::zeros(min_dim))
            .map(|&item| Self::from_real(Self::real(item)));
        let sigma = Array2::from_diag(&singvals);
        u.dot(&sigma.dot(&vt))
    }

    /// Generate an exactly rank-`rank` matrix as a sum of `rank` random
    /// Gaussian outer products.
    fn random_low_rank_matrix<R: Rng>(
        dimension: (usize, usize),
        rank: usize,
        rng: &mut R,
    ) -> Array2<Self> {
        let left = Self::random_gaussian((dimension.0, rank), rng);
        let right = Self::random_gaussian((rank, dimension.1), rng);
        left.dot(&right)
    }
}

impl RandomMatrix for f64 {
    fn random_gaussian<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<f64> {
        random_gaussian_real::<f64, R>(dimension, rng)
    }
}

impl RandomMatrix for f32 {
    fn random_gaussian<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<f32> {
        random_gaussian_real::<f32, R>(dimension, rng)
    }
}

impl RandomMatrix for Complex<f64> {
    fn random_gaussian<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<Complex<f64>> {
        random_gaussian_complex::<f64, R>(dimension, rng)
    }
}

impl RandomMatrix for Complex<f32> {
    fn random_gaussian<R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<Complex<f32>> {
        random_gaussian_complex::<f32, R>(dimension, rng)
    }
}

fn standard_normal<T: Float, R: Rng>(normal: &Normal<f64>, rng: &mut R) -> T {
    cast::<f64, T>(normal.sample(rng)).unwrap_or_else(T::zero)
}

fn random_gaussian_real<T: Float, R: Rng>(dimension: (usize, usize), rng: &mut R) -> Array2<T> {
    let mut mat = Array2::<T>::zeros(dimension);
    if let Ok(normal) = Normal::new(0.0, 1.0) {
        mat.map_inplace(|item| *item = standard_normal(&normal, rng));
    }
    mat
}

fn random_gaussian_complex<T: Float, R: Rng>(
    dimension: (usize, usize),
    rng: &mut R,
) -> Array2<Complex<T>> {
    let mut mat = Array2::<Complex<T>>::zeros(dimension);
    if let Ok(normal) = Normal::new(0.0, 1.0) {
        mat.map_inplace(|item| {
            let re = standard_normal(&normal, rng);
            let im = standard_normal(&normal, rng);
            *item = Complex::new(re, im);
        });
    }
    mat
}
