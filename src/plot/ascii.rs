//! ASCII plotting for terminal output.
//!
//! Fixed-size character grids, so output is deterministic and easy to
//! snapshot in tests.
//!
//! Plot elements:
//! - observed points: `o`
//! - fitted curve: `-` line
//! - sum-of-squares trace: `*` line
//! - mean evaluation time: `#` bar

use crate::domain::MethodStatistics;
use crate::report::{PerformanceRow, quality_cap};

/// Observed points over the fitted curve.
pub fn render_fit_plot(observed: &[(f64, f64)], curve: &[(f64, f64)], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let all = || observed.iter().chain(curve.iter());
    let (x_min, x_max) = range(all().map(|p| p.0)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = range(all().map(|p| p.1)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];
    draw_series(&mut grid, curve, (x_min, x_max), (y_min, y_max), '-');
    for &(x, y) in observed {
        let col = map_x(x, x_min, x_max, width);
        let row = map_y(y, y_min, y_max, height);
        grid[row][col] = 'o';
    }

    let mut out = format!("Plot: x=[{x_min:.3}, {x_max:.3}] | y=[{y_min:.3}, {y_max:.3}]\n");
    push_grid(&mut out, grid);
    out
}

/// One panel per method: sum of squares by evaluation number.
///
/// Each panel's y axis runs from 0 to that method's `quality_cap`; larger
/// values are drawn at the top edge.
pub fn render_quality_plot(statistics: &[MethodStatistics], width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let mut out = String::new();
    for stats in statistics {
        let cap = quality_cap(stats);
        let n = stats.sum_squares.len();
        out.push_str(&format!("SSQ: {} | evals={n} | y=[0, {cap:.3e}]\n", stats.method));
        if n == 0 {
            out.push_str("(no evaluations)\n");
            continue;
        }
        let points: Vec<(f64, f64)> = stats
            .sum_squares
            .iter()
            .enumerate()
            .map(|(i, &ssq)| ((i + 1) as f64, ssq.min(cap)))
            .collect();
        let mut grid = vec![vec![' '; width]; height];
        let x_max = (n as f64).max(2.0);
        draw_series(&mut grid, &points, (1.0, x_max), (0.0, cap), '*');
        push_grid(&mut out, grid);
    }
    out
}

/// Horizontal bars of mean evaluation time per method.
pub fn render_performance_bars(rows: &[PerformanceRow], width: usize) -> String {
    let width = width.max(10);
    let label_width = rows.iter().map(|r| r.method.len()).max().unwrap_or(0);
    let longest = rows.iter().map(|r| r.average_secs).fold(0.0_f64, f64::max);

    let mut out = String::from("Mean seconds per evaluation\n");
    for r in rows {
        let len = if longest > 0.0 {
            ((r.average_secs / longest) * width as f64).round() as usize
        } else {
            0
        };
        out.push_str(&format!(
            "{:<label_width$} |{} {:.3e}\n",
            r.method,
            "#".repeat(len),
            r.average_secs
        ));
    }
    out
}

fn push_grid(out: &mut String, grid: Vec<Vec<char>>) {
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
}

fn range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo.is_finite() && hi > lo).then_some((lo, hi))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y max is row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_series(grid: &mut [Vec<char>], points: &[(f64, f64)], xr: (f64, f64), yr: (f64, f64), ch: char) {
    let height = grid.len();
    let width = grid.first().map_or(0, Vec::len);
    let mut prev = None;
    for &(x, y) in points {
        if !x.is_finite() || !y.is_finite() {
            prev = None;
            continue;
        }
        let col = map_x(x, xr.0, xr.1, width);
        let row = map_y(y, yr.0, yr.1, height);
        match prev {
            Some((c0, r0)) => draw_line(grid, c0, r0, col, row, ch),
            None => grid[row][col] = ch,
        }
        prev = Some((col, row));
    }
}

/// Integer line drawing (Bresenham).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
