//! Planar hulls over keyframe positions.
//!
//! Keyframe positions are projected on the XY plane. Both functions return
//! indices into the input slice, sorted ascending, so callers can map them
//! back to keyframes.

use nalgebra::Point2;

/// Indices of the convex hull vertices (Andrew's monotone chain).
///
/// Collinear boundary points are dropped. Inputs with fewer than three
/// distinct points return every index.
pub fn convex_hull_xy(points: &[Point2<f32>]) -> Vec<usize> {
    if points.len() < 3 {
        return (0..points.len()).collect();
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        points[a]
            .x
            .total_cmp(&points[b].x)
            .then(points[a].y.total_cmp(&points[b].y))
    });
    order.dedup_by(|a, b| points[*a] == points[*b]);
    if order.len() < 3 {
        return (0..points.len()).collect();
    }

    let cross = |o: usize, a: usize, b: usize| {
        let (o, a, b) = (points[o], points[a], points[b]);
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    };

    let mut hull: Vec<usize> = Vec::with_capacity(2 * order.len());
    // Lower chain
    for &i in &order {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], i) <= 0.0 {
            hull.pop();
        }
        hull.push(i);
    }
    // Upper chain
    let lower_len = hull.len() + 1;
    for &i in order.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], i) <= 0.0
        {
            hull.pop();
        }
        hull.push(i);
    }
    hull.pop();

    hull.sort_unstable();
    hull.dedup();
    hull
}

/// Indices of the alpha-shape boundary vertices.
///
/// An edge (i, j) is on the boundary when some circle of radius `alpha`
/// passing through both points contains no other point. Smaller `alpha`
/// follows concavities more closely; as `alpha` grows the result tends to
/// the convex hull.
pub fn concave_hull_xy(points: &[Point2<f32>], alpha: f32) -> Vec<usize> {
    let n = points.len();
    if n < 3 || alpha <= 0.0 {
        return (0..n).collect();
    }

    let alpha_sq = alpha * alpha;
    // Slack so points lying on the circle itself do not block the edge
    let inside_sq = alpha_sq * (1.0 - 1e-4);
    let mut on_boundary = vec![false; n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (points[i], points[j]);
            let chord = b - a;
            let d_sq = chord.norm_squared();
            if d_sq <= f32::EPSILON || d_sq > 4.0 * alpha_sq {
                continue;
            }

            let mid = nalgebra::center(&a, &b);
            let h = (alpha_sq - d_sq / 4.0).max(0.0).sqrt();
            let offset = nalgebra::Vector2::new(-chord.y, chord.x) * (h / d_sq.sqrt());

            let empty = |center: Point2<f32>| {
                points.iter().enumerate().all(|(k, p)| {
                    k == i || k == j || (p - center).norm_squared() >= inside_sq
                })
            };

            if empty(mid + offset) || empty(mid - offset) {
                on_boundary[i] = true;
                on_boundary[j] = true;
            }
        }
    }

    on_boundary
        .iter()
        .enumerate()
        .filter_map(|(i, &b)| b.then_some(i))
        .collect()
}
