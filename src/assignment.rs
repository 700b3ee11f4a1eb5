//! Minimum-cost bipartite assignment (the Kuhn-Munkres / Hungarian
//! algorithm), used by the matcher to solve each window's cost matrix.
//!
//! No existing crate in this stack provides an assignment solver, so this
//! is a from-scratch O(n^3) implementation in the successive-
//! shortest-augmenting-path form described at a high level by Kuhn (1955)
//! and Munkres (1957).

use ndarray::Array2;

/// Cost assigned to a padding row or column added to make a rectangular
/// cost matrix square. Chosen well above the matcher's hard-gate cost
/// (`10^6`) so that a real, merely-distant candidate is always preferred
/// over leaving a row or column entirely unassigned.
const PAD_COST: f64 = 1e9;

/// Solve the minimum-cost bipartite assignment for a `rows x cols` cost
/// matrix.
///
/// Returns one entry per row of `cost`: `Some(col)` if that row was
/// assigned to a real column, `None` if `rows > cols` and this row was
/// left over (assigned only to padding). Symmetrically, a column with
/// `cols > rows` may receive no row at all and simply will not appear in
/// the output.
///
/// `cost` must contain only finite, non-negative values.
pub fn min_cost_assignment(cost: &Array2<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = cost.dim();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }

    let n = rows.max(cols);
    let mut padded = Array2::<f64>::from_elem((n, n), PAD_COST);
    for i in 0..rows {
        for j in 0..cols {
            padded[[i, j]] = cost[[i, j]];
        }
    }

    let col_for_row = hungarian_square(&padded);

    col_for_row
        .into_iter()
        .take(rows)
        .map(|j| if j < cols { Some(j) } else { None })
        .collect()
}

/// The classic O(n^3) Hungarian algorithm for a square cost matrix,
/// using row/column potentials and successive shortest augmenting paths.
/// Returns, for each row, the column it was assigned.
fn hungarian_square(a: &Array2<f64>) -> Vec<usize> {
    let n = a.nrows();
    // 1-indexed internally (index 0 is an unused sentinel "no row"/"no column"),
    // matching the classic formulation of this algorithm.
    let mut u = vec![0.0_f64; n + 1];
    let mut v = vec![0.0_f64; n + 1];
    let mut p = vec![0usize; n + 1]; // p[j] = row currently assigned to column j, 0 = none
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![f64::INFINITY; n + 1];
        let mut used = vec![false; n + 1];

        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = f64::INFINITY;
            let mut j1 = 0usize;

            for j in 1..=n {
                if !used[j] {
                    let cur = a[[i0 - 1, j - 1]] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }

            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }

            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }

        loop {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
            if j0 == 0 {
                break;
            }
        }
    }

    let mut result = vec![usize::MAX; n];
    for j in 1..=n {
        if p[j] != 0 {
            result[p[j] - 1] = j - 1;
        }
    }
    result
}
