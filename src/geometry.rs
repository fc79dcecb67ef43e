//! Local neighbourhood geometry in the reference embedding.
//!
//! A query's positively weighted training neighbours are triangulated
//! (Bowyer-Watson Delaunay). The union of the Delaunay triangles is the convex
//! hull of the neighbours, so membership ("in-hull") is decided against that
//! hull with a small tolerance: a point on an edge or a vertex counts as inside.
//!
//! Fewer than three distinct points, or points that are all collinear, cannot
//! be triangulated and yield [`MotionError::InsufficientNeighborhood`].

use std::cmp::Ordering;

use log::trace;

use crate::core::Point2;
use crate::error::{MotionError, Result};

/// Relative tolerance for orientation tests (scaled by the squared extent).
const ORIENT_EPS: f64 = 1e-12;

/// Distance of the bounding super-triangle, in units of the point extent.
const SUPER_SCALE: f64 = 1e3;

#[inline]
fn orient(a: Point2, b: Point2, c: Point2) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// True when `d` lies strictly inside the circumcircle of counter-clockwise `abc`.
#[inline]
fn in_circumcircle(a: Point2, b: Point2, c: Point2, d: Point2) -> bool {
    let (adx, ady) = (a[0] - d[0], a[1] - d[1]);
    let (bdx, bdy) = (b[0] - d[0], b[1] - d[1]);
    let (cdx, cdy) = (c[0] - d[0], c[1] - d[1]);
    let ad = adx * adx + ady * ady;
    let bd = bdx * bdx + bdy * bdy;
    let cd = cdx * cdx + cdy * cdy;
    let det = adx * (bdy * cd - bd * cdy) - ady * (bdx * cd - bd * cdx) + ad * (bdx * cdy - bdy * cdx);
    det > 0.0
}

fn cmp_points(a: &Point2, b: &Point2) -> Ordering {
    a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1]))
}

/// Counter-clockwise convex hull (monotone chain) without collinear vertices.
pub fn convex_hull(points: &[Point2]) -> Vec<Point2> {
    let mut pts: Vec<Point2> = points.to_vec();
    pts.sort_by(cmp_points);
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut lower: Vec<Point2> = Vec::with_capacity(pts.len());
    for &p in &pts {
        while lower.len() >= 2 && orient(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }
    let mut upper: Vec<Point2> = Vec::with_capacity(pts.len());
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && orient(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Twice the signed area of a polygon (positive when counter-clockwise).
fn polygon_area2(poly: &[Point2]) -> f64 {
    (0..poly.len())
        .map(|i| {
            let (a, b) = (poly[i], poly[(i + 1) % poly.len()]);
            a[0] * b[1] - b[0] * a[1]
        })
        .sum()
}

/// Delaunay triangulation of a query's neighbour coordinates.
#[derive(Clone, Debug)]
pub struct Neighbourhood {
    points: Vec<Point2>,
    /// Counter-clockwise triangles, as indices into `points`.
    triangles: Vec<[usize; 3]>,
    hull: Vec<Point2>,
    eps: f64,
}

impl Neighbourhood {
    pub fn triangulate(points: &[Point2]) -> Result<Self> {
        if points.iter().any(|p| !(p[0].is_finite() && p[1].is_finite())) {
            return Err(MotionError::NumericDegeneracy(
                "non-finite neighbour coordinate".to_string(),
            ));
        }

        let hull = convex_hull(points);
        let (min_x, max_x, min_y, max_y) = points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY),
            |(a, b, c, d), p| (a.min(p[0]), b.max(p[0]), c.min(p[1]), d.max(p[1])),
        );
        let extent = (max_x - min_x).max(max_y - min_y);
        let eps = ORIENT_EPS * extent * extent;

        if hull.len() < 3 || polygon_area2(&hull) <= eps {
            return Err(MotionError::InsufficientNeighborhood(format!(
                "{} neighbours span {} hull vertices",
                points.len(),
                hull.len()
            )));
        }

        // distinct points, remembering the first original index of each
        let mut order: Vec<usize> = (0..points.len()).collect();
        order.sort_by(|&a, &b| cmp_points(&points[a], &points[b]).then(a.cmp(&b)));
        order.dedup_by(|a, b| points[*a] == points[*b]);
        let n = order.len();

        let mut all: Vec<Point2> = order.iter().map(|&i| points[i]).collect();
        let (mx, my) = (0.5 * (min_x + max_x), 0.5 * (min_y + max_y));
        let m = SUPER_SCALE * extent;
        all.push([mx - m, my - m]);
        all.push([mx + m, my - m]);
        all.push([mx, my + m]);

        let mut triangles: Vec<[usize; 3]> = vec![[n, n + 1, n + 2]];
        for i in 0..n {
            let p = all[i];
            let (bad, good): (Vec<[usize; 3]>, Vec<[usize; 3]>) = triangles
                .into_iter()
                .partition(|t| in_circumcircle(all[t[0]], all[t[1]], all[t[2]], p));

            // cavity boundary: directed edges whose reverse is not in the cavity
            let edges: Vec<(usize, usize)> = bad
                .iter()
                .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
                .collect();
            triangles = good;
            for &(a, b) in &edges {
                if !edges.contains(&(b, a)) {
                    triangles.push([a, b, i]);
                }
            }
        }

        let triangles: Vec<[usize; 3]> = triangles
            .into_iter()
            .filter(|t| t.iter().all(|&v| v < n))
            .map(|t| [order[t[0]], order[t[1]], order[t[2]]])
            .collect();

        trace!(
            "Triangulated {} neighbours ({} distinct) into {} triangles, hull of {}",
            points.len(),
            n,
            triangles.len(),
            hull.len()
        );

        Ok(Self {
            points: points.to_vec(),
            triangles,
            hull,
            eps,
        })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    pub fn hull(&self) -> &[Point2] {
        &self.hull
    }

    /// Index of a triangle containing `p` (edges included), if any.
    pub fn find_simplex(&self, p: Point2) -> Option<usize> {
        self.triangles.iter().position(|t| {
            let (a, b, c) = (self.points[t[0]], self.points[t[1]], self.points[t[2]]);
            orient(a, b, p) >= -self.eps && orient(b, c, p) >= -self.eps && orient(c, a, p) >= -self.eps
        })
    }

    /// Whether `p` lies within or on the triangulated region.
    pub fn contains(&self, p: Point2) -> bool {
        if !(p[0].is_finite() && p[1].is_finite()) {
            return false;
        }
        let h = &self.hull;
        (0..h.len()).all(|i| orient(h[i], h[(i + 1) % h.len()], p) >= -self.eps)
    }
}
