//! Data
//!
//! The column-major [`Matrix`] view used by learners, and the [`DmlData`]
//! container holding outcome, treatment and covariates of a causal model.
use crate::errors::DmlError;

/// Borrowed column-major view over covariates.
///
/// Column `j` is the contiguous slice `data[j * rows..(j + 1) * rows]`.
pub struct Matrix<'a, T> {
    pub data: &'a [T],
    pub rows: usize,
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix { data, rows, cols }
    }

    /// Value in row `i` and column `j`.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Values of one row, column by column.
    pub fn get_row_iter(&self, row: usize) -> impl Iterator<Item = &'a T> {
        self.data.iter().skip(row).step_by(self.rows.max(1))
    }

    pub fn get_col(&self, col: usize) -> &'a [T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}

impl<'a, T: Copy> Matrix<'a, T> {
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }

    /// Copy the selected rows into a new column-major buffer.
    ///
    /// The result has `rows.len()` rows and `self.cols` columns, and can be
    /// wrapped with [`Matrix::new`].
    pub fn take_rows(&self, rows: &[usize]) -> Vec<T> {
        let mut out = Vec::with_capacity(rows.len() * self.cols);
        for j in 0..self.cols {
            let col = self.get_col(j);
            out.extend(rows.iter().map(|&i| col[i]));
        }
        out
    }
}

/// Data backend of a causal model with a single binary treatment.
///
/// Row order is the join key for every per-observation array derived from it.
#[derive(Debug, Clone)]
pub struct DmlData {
    /// Covariates, column-major with `n_obs` rows and `n_cols` columns.
    pub x: Vec<f64>,
    /// Outcome variable.
    pub y: Vec<f64>,
    /// Treatment variable.
    pub d: Vec<f64>,
    /// Number of covariate columns.
    pub n_cols: usize,
    /// Optional instruments, column-major.
    pub z: Option<Vec<f64>>,
    /// Optional cluster labels.
    pub cluster: Option<Vec<u64>>,
}

impl DmlData {
    /// Create a new data backend.
    ///
    /// * `x` - Covariates stored column-major.
    /// * `n_cols` - Number of covariate columns.
    /// * `y` - Outcome, one entry per observation.
    /// * `d` - Treatment, one entry per observation.
    pub fn new(x: Vec<f64>, n_cols: usize, y: Vec<f64>, d: Vec<f64>) -> Result<Self, DmlError> {
        let n_obs = y.len();
        if n_obs == 0 {
            return Err(DmlError::InvalidData("the outcome is empty".to_string()));
        }
        if d.len() != n_obs {
            return Err(DmlError::InvalidData(format!(
                "treatment has {} entries, outcome has {}",
                d.len(),
                n_obs
            )));
        }
        if n_cols == 0 || x.len() != n_obs * n_cols {
            return Err(DmlError::InvalidData(format!(
                "covariates have {} values, expected {} rows times {} columns",
                x.len(),
                n_obs,
                n_cols
            )));
        }
        Ok(DmlData {
            x,
            y,
            d,
            n_cols,
            z: None,
            cluster: None,
        })
    }

    /// Attach instrumental variables, stored column-major.
    pub fn with_instruments(mut self, z: Vec<f64>) -> Result<Self, DmlError> {
        if z.is_empty() || z.len() % self.n_obs() != 0 {
            return Err(DmlError::InvalidData(format!(
                "instruments have {} values, which is not a multiple of {} observations",
                z.len(),
                self.n_obs()
            )));
        }
        self.z = Some(z);
        Ok(self)
    }

    /// Attach cluster labels.
    pub fn with_clusters(mut self, cluster: Vec<u64>) -> Result<Self, DmlError> {
        if cluster.len() != self.n_obs() {
            return Err(DmlError::InvalidData(format!(
                "cluster labels have {} entries, expected {}",
                cluster.len(),
                self.n_obs()
            )));
        }
        self.cluster = Some(cluster);
        Ok(self)
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    /// Covariates as a matrix view.
    pub fn x_matrix(&self) -> Matrix<'_, f64> {
        Matrix::new(&self.x, self.n_obs(), self.n_cols)
    }

    /// Number of instrument columns.
    pub fn n_instruments(&self) -> usize {
        self.z.as_ref().map_or(0, |z| z.len() / self.n_obs())
    }

    pub fn is_cluster_data(&self) -> bool {
        self.cluster.is_some()
    }

    /// True if every treatment value is exactly 0 or 1.
    pub fn is_binary_treatment(&self) -> bool {
        self.d.iter().all(|v| *v == 0.0 || *v == 1.0)
    }
}
