//! Traits and functions for permutation vectors and pivot sequences.
//!
//! Two encodings are used. A *permutation vector* `ind` maps positions to
//! positions. A *pivot sequence* `piv` is the LAPACK `ipiv` encoding
//! (zero based): step `i` swaps row `i` with row `piv[i]`.

use ndarray::{Array1, Array2, ArrayBase, ArrayViewMut2, Axis, Data, Ix1, Ix2};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixPermutationMode {
    /// `permuted[.., j] = mat[.., ind[j]]`
    Col,
    /// `permuted[i, ..] = mat[ind[i], ..]`
    Row,
    /// `permuted[.., ind[j]] = mat[.., j]`
    ColInv,
    /// `permuted[ind[i], ..] = mat[i, ..]`
    RowInv,
}

/// Order in which a pivot sequence is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PivotDirection {
    /// Apply swaps `0, 1, ..., n - 1`.
    Forward,
    /// Apply swaps `n - 1, ..., 1, 0`, undoing `Forward`.
    Backward,
}

pub fn invert_permutation_vector<S: Data<Elem = usize>>(perm: &ArrayBase<S, Ix1>) -> Array1<usize> {
    let n = perm.len();

    let mut inverse = Array1::<usize>::zeros(n);

    for (index, &elem) in perm.iter().enumerate() {
        inverse[elem] = index;
    }

    inverse
}

/// Apply the row swaps of a pivot sequence to `mat` in place.
pub fn laswp<A>(mut mat: ArrayViewMut2<A>, piv: &[usize], direction: PivotDirection) {
    let swap = |mat: &mut ArrayViewMut2<A>, i: usize, p: usize| {
        assert!(p < mat.nrows(), "laswp: pivot {} out of range", p);
        if i != p {
            for j in 0..mat.ncols() {
                mat.swap([i, j], [p, j]);
            }
        }
    };

    match direction {
        PivotDirection::Forward => {
            for (i, &p) in piv.iter().enumerate() {
                swap(&mut mat, i, p);
            }
        }
        PivotDirection::Backward => {
            for (i, &p) in piv.iter().enumerate().rev() {
                swap(&mut mat, i, p);
            }
        }
    }
}

/// Convert a pivot sequence on `n` rows into the permutation vector `ind`
/// such that forward application yields `permuted[i, ..] = mat[ind[i], ..]`.
pub fn pivots_to_permutation(piv: &[usize], n: usize) -> Array1<usize> {
    let mut ind: Array1<usize> = (0..n).collect();
    for (i, &p) in piv.iter().enumerate() {
        ind.swap(i, p);
    }
    ind
}

pub trait ApplyPermutationToMatrix {
    type A;

    fn apply_permutation<S: Data<Elem = usize>>(
        &self,
        index_array: &ArrayBase<S, Ix1>,
        mode: MatrixPermutationMode,
    ) -> Array2<Self::A>;
}

impl<A, S> ApplyPermutationToMatrix for ArrayBase<S, Ix2>
where
    A: Clone + num::Zero,
    S: Data<Elem = A>,
{
    type A = A;

    fn apply_permutation<T: Data<Elem = usize>>(
        &self,
        index_array: &ArrayBase<T, Ix1>,
        mode: MatrixPermutationMode,
    ) -> Array2<Self::A> {
        let mut permuted = Array2::<A>::zeros(self.dim());

        match mode {
            MatrixPermutationMode::Col => {
                for (index, mut col) in permuted.axis_iter_mut(Axis(1)).enumerate() {
                    col.assign(&self.index_axis(Axis(1), index_array[index]));
                }
            }
            MatrixPermutationMode::Row => {
                for (index, mut row) in permuted.axis_iter_mut(Axis(0)).enumerate() {
                    row.assign(&self.index_axis(Axis(0), index_array[index]));
                }
            }
            MatrixPermutationMode::ColInv => {
                for (index, col) in self.axis_iter(Axis(1)).enumerate() {
                    permuted
                        .index_axis_mut(Axis(1), index_array[index])
                        .assign(&col);
                }
            }
            MatrixPermutationMode::RowInv => {
                for (index, row) in self.axis_iter(Axis(0)).enumerate() {
                    permuted
                        .index_axis_mut(Axis(0), index_array[index])
                        .assign(&row);
                }
            }
        };

        permuted
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use ndarray::array;

    #[test]
    fn inverse_undoes_permutation() {
        let perm = array![2usize, 0, 3, 1];
        let inverse = invert_permutation_vector(&perm);
        for (index, &elem) in perm.iter().enumerate() {
            assert_eq!(inverse[elem], index);
        }
    }

    #[test]
    fn permutation_modes_are_inverse_pairs() {
        let mat = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let ind = array![2usize, 0, 1];

        let permuted = mat.apply_permutation(&ind, MatrixPermutationMode::Col);
        assert_eq!(permuted, array![[3.0, 1.0, 2.0], [6.0, 4.0, 5.0]]);
        assert_eq!(
            permuted.apply_permutation(&ind, MatrixPermutationMode::ColInv),
            mat
        );

        let rows = array![1usize, 0];
        let permuted = mat.apply_permutation(&rows, MatrixPermutationMode::Row);
        assert_eq!(permuted, array![[4.0, 5.0, 6.0], [1.0, 2.0, 3.0]]);
        assert_eq!(
            permuted.apply_permutation(&rows, MatrixPermutationMode::RowInv),
            mat
        );
    }

    #[test]
    fn laswp_matches_pivots_to_permutation() {
        let mut mat = Array2::from_shape_fn((5, 2), |(i, j)| (10 * i + j) as f64);
        let original = mat.clone();
        let piv = [3usize, 3, 4, 3];

        laswp(mat.view_mut(), &piv, PivotDirection::Forward);
        let ind = pivots_to_permutation(&piv, 5);
        assert_eq!(
            mat,
            original.apply_permutation(&ind, MatrixPermutationMode::Row)
        );

        laswp(mat.view_mut(), &piv, PivotDirection::Backward);
        assert_eq!(mat, original);
    }
}
