//! Pairwise Pearson correlation between strategies' normalized signals.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub strategies: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Build from one series per strategy. Series are compared over their
    /// common prefix; all series produced by one run have the same length.
    pub fn from_series(series: &[(String, Vec<f64>)]) -> Self {
        let n = series.len();
        let mut values = vec![vec![0.0; n]; n];
        for i in 0..n {
            values[i][i] = 1.0;
            for j in (i + 1)..n {
                let r = pearson(&series[i].1, &series[j].1);
                values[i][j] = r;
                values[j][i] = r;
            }
        }
        Self {
            strategies: series.iter().map(|(name, _)| name.clone()).collect(),
            values,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.strategies.iter().position(|s| s == a)?;
        let j = self.strategies.iter().position(|s| s == b)?;
        Some(self.values[i][j])
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Pearson correlation; 0 when either side has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let (x, y) = (&x[..n], &y[..n]);
    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= 0.0 || var_y <= 0.0 {
        return 0.0;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}
