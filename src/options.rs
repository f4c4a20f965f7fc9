//! Options controlling low-rank approximation of tiles.

use crate::types::{BlrError, Result};

/// Algorithm used to compress an explicitly stored block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LowRankAlgorithm {
    /// Rank-revealing (column pivoted) QR of the full block.
    Rrqr,
    /// Adaptive cross approximation with partial pivoting.
    Aca,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ApproximationOptions {
    algorithm: LowRankAlgorithm,
    rel_tol: f64,
    abs_tol: f64,
    max_rank: usize,
    baca_blocksize: usize,
}

impl Default for ApproximationOptions {
    fn default() -> Self {
        Self {
            algorithm: LowRankAlgorithm::Rrqr,
            rel_tol: 1E-4,
            abs_tol: 1E-10,
            max_rank: 5000,
            baca_blocksize: 4,
        }
    }
}

impl ApproximationOptions {
    pub fn with_algorithm(mut self, algorithm: LowRankAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_rel_tol(mut self, rel_tol: f64) -> Self {
        self.rel_tol = rel_tol;
        self
    }

    pub fn with_abs_tol(mut self, abs_tol: f64) -> Self {
        self.abs_tol = abs_tol;
        self
    }

    pub fn with_max_rank(mut self, max_rank: usize) -> Self {
        self.max_rank = max_rank;
        self
    }

    /// Number of rows or columns requested per accessor call in blocked ACA.
    pub fn with_baca_blocksize(mut self, baca_blocksize: usize) -> Self {
        self.baca_blocksize = baca_blocksize;
        self
    }

    pub fn algorithm(&self) -> LowRankAlgorithm {
        self.algorithm
    }

    pub fn rel_tol(&self) -> f64 {
        self.rel_tol
    }

    pub fn abs_tol(&self) -> f64 {
        self.abs_tol
    }

    pub fn max_rank(&self) -> usize {
        self.max_rank
    }

    pub fn baca_blocksize(&self) -> usize {
        self.baca_blocksize
    }

    /// Check that the tolerances and block size are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.rel_tol.is_finite() && (0.0..1.0).contains(&self.rel_tol)) {
            return Err(BlrError::InvalidOptions(format!(
                "require 0 <= rel_tol < 1, got {}",
                self.rel_tol
            )));
        }
        if !(self.abs_tol.is_finite() && self.abs_tol >= 0.0) {
            return Err(BlrError::InvalidOptions(format!(
                "require abs_tol >= 0, got {}",
                self.abs_tol
            )));
        }
        if self.baca_blocksize == 0 {
            return Err(BlrError::InvalidOptions(
                "baca_blocksize must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
