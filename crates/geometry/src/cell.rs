//! The quadrilateral geometry cell and its inverse mapping.
//!
//! A cell is one region of the sphere bounded by four great-circle walls
//! through its corner points. The inverse mapping (`uninterpolate`)
//! measures a point's signed angular separation from the two opposing
//! walls of each axis and normalizes by the angular span through the
//! point, yielding coordinates in [0,1]×[0,1] exactly when the point lies
//! inside the quadrilateral.

use nalgebra::Vector3;

/// Norm below which a corner or wall normal is considered degenerate.
const DEGENERATE_EPS: f64 = 1e-12;

/// Iteration cap for the forward-mapping refinement in [`GeometryCell::point_at`].
const POINT_AT_MAX_ITERS: usize = 16;

/// Convergence tolerance (normalized units) for [`GeometryCell::point_at`].
const POINT_AT_TOL: f64 = 1e-12;

/// One quadrilateral region of the sphere, with the derived state needed
/// to map sphere points into normalized tile-local coordinates.
///
/// Corners are ordered SW, SE, NE, NW. All derived vectors are computed
/// once at construction; the cell is immutable afterward.
#[derive(Debug, Clone)]
pub struct GeometryCell {
    /// Corner unit vectors, ordered SW, SE, NE, NW.
    corners: [Vector3<f64>; 4],
    /// Inward-pointing unit wall normals: south, east, north, west.
    normals: [Vector3<f64>; 4],
    /// Unit vector toward the cell interior, used when picking sphere
    /// sides in the forward mapping.
    center: Vector3<f64>,
    /// Input winding was clockwise (normals were negated to point inward).
    clockwise: bool,
    /// Degenerate geometry: excluded from rendering.
    dead: bool,
}

impl GeometryCell {
    /// Build a cell from four corner unit vectors ordered SW, SE, NE, NW.
    ///
    /// Wall normals are cross products of adjacent corners; the winding is
    /// detected from the sign of the naive south normal against the NE
    /// corner and the normals negated so all four point inward. A cell
    /// whose corners are all zero (or whose walls collapse) is flagged
    /// dead and must be excluded from rendering.
    pub fn new(corners: [Vector3<f64>; 4]) -> Self {
        if corners.iter().all(|c| c.norm() < DEGENERATE_EPS) {
            return Self::dead_cell(corners);
        }

        let Some((normals, clockwise)) = Self::wall_normals(&corners) else {
            return Self::dead_cell(corners);
        };

        let [sw, se, ne, nw] = corners;
        let center_sum = sw + se + ne + nw;
        let center = if center_sum.norm() < DEGENERATE_EPS {
            // Hemisphere-spanning cell; any corner serves as the side pick.
            sw.normalize()
        } else {
            center_sum.normalize()
        };

        Self {
            corners,
            normals,
            center,
            clockwise,
            dead: false,
        }
    }

    fn dead_cell(corners: [Vector3<f64>; 4]) -> Self {
        Self {
            corners,
            normals: [Vector3::zeros(); 4],
            center: Vector3::zeros(),
            clockwise: false,
            dead: true,
        }
    }

    /// Inward unit wall normals (south, east, north, west) and the
    /// detected winding, or None for collapsed walls.
    fn wall_normals(corners: &[Vector3<f64>; 4]) -> Option<([Vector3<f64>; 4], bool)> {
        let [sw, se, ne, nw] = *corners;

        // Wall planes pass through the origin and two adjacent corners.
        let raw = [
            sw.cross(&se), // south
            se.cross(&ne), // east
            ne.cross(&nw), // north
            nw.cross(&sw), // west
        ];
        if raw.iter().any(|n| n.norm() < DEGENERATE_EPS) {
            return None;
        }

        // Counter-clockwise winding leaves the naive normals pointing
        // inward; clockwise input flips every sign.
        let clockwise = raw[0].dot(&ne) < 0.0;
        let sign = if clockwise { -1.0 } else { 1.0 };
        Some((
            [
                (raw[0] * sign).normalize(),
                (raw[1] * sign).normalize(),
                (raw[2] * sign).normalize(),
                (raw[3] * sign).normalize(),
            ],
            clockwise,
        ))
    }

    /// Whether the cell has degenerate geometry and must not render.
    pub fn is_dead(&self) -> bool {
        self.dead
    }

    /// Whether the input corner winding was clockwise.
    pub fn is_clockwise(&self) -> bool {
        self.clockwise
    }

    /// Corner unit vectors, ordered SW, SE, NE, NW.
    pub fn corners(&self) -> &[Vector3<f64>; 4] {
        &self.corners
    }

    /// Inward unit wall normals, ordered south, east, north, west.
    pub fn normals(&self) -> &[Vector3<f64>; 4] {
        &self.normals
    }

    /// Map a point on the sphere to normalized tile-local coordinates.
    ///
    /// Reference implementation: recomputes the wall normals from the
    /// corners on every call. Returns coordinates inside [0,1]×[0,1] iff
    /// the point is inside the quadrilateral; boundary points map to
    /// exactly 0 or 1 within floating tolerance.
    pub fn uninterpolate(&self, point: &Vector3<f64>) -> (f64, f64) {
        if self.dead {
            return (f64::NAN, f64::NAN);
        }
        let (normals, _) = Self::wall_normals(&self.corners)
            .expect("live cell has valid walls");
        Self::coords_from_normals(point, &normals)
    }

    /// Numerically optimized variant of [`uninterpolate`]: identical
    /// arithmetic against the unit wall normals cached at construction.
    ///
    /// [`uninterpolate`]: GeometryCell::uninterpolate
    pub fn uninterpolate_fast(&self, point: &Vector3<f64>) -> (f64, f64) {
        if self.dead {
            return (f64::NAN, f64::NAN);
        }
        Self::coords_from_normals(point, &self.normals)
    }

    fn coords_from_normals(point: &Vector3<f64>, normals: &[Vector3<f64>; 4]) -> (f64, f64) {
        (
            Self::axis_coord(point, &normals[3], &normals[1]),
            Self::axis_coord(point, &normals[0], &normals[2]),
        )
    }

    /// Normalized coordinate along one axis: the signed angular
    /// separation from the near wall, over the angular span between the
    /// walls measured through the point. The dot product against the near
    /// wall normal supplies the sign, so points past the wall come out
    /// negative.
    fn axis_coord(point: &Vector3<f64>, near_wall: &Vector3<f64>, far_wall: &Vector3<f64>) -> f64 {
        let a = point.dot(near_wall).clamp(-1.0, 1.0).asin();
        let b = point.dot(far_wall).clamp(-1.0, 1.0).asin();
        let span = a + b;
        if span <= DEGENERATE_EPS {
            // Near-antipodal point: the span through it collapses. Any
            // sign-correct out-of-range value renders the same (skipped).
            return if a < 0.0 { -1e9 } else { 1e9 };
        }
        a / span
    }

    /// Map normalized tile-local coordinates back to the sphere.
    ///
    /// Inverse of [`uninterpolate`], refined to floating tolerance:
    /// starts from a normalized bilinear blend of the corners and
    /// iterates the residual away, so that
    /// `uninterpolate(point_at(x, y)) == (x, y)`. (0,0) lands on the SW
    /// corner, (1,1) on NE.
    ///
    /// [`uninterpolate`]: GeometryCell::uninterpolate
    pub fn point_at(&self, x: f64, y: f64) -> Vector3<f64> {
        if self.dead {
            return Vector3::zeros();
        }

        let mut u = x;
        let mut v = y;
        let mut p = self.blend_corners(u, v);
        for _ in 0..POINT_AT_MAX_ITERS {
            let (fx, fy) = Self::coords_from_normals(&p, &self.normals);
            let ex = x - fx;
            let ey = y - fy;
            if ex.abs() < POINT_AT_TOL && ey.abs() < POINT_AT_TOL {
                break;
            }
            u += ex;
            v += ey;
            p = self.blend_corners(u, v);
        }
        p
    }

    /// Normalized bilinear blend of the corner vectors. The blend is not
    /// the exact inverse of the wall-angle mapping; `point_at` corrects
    /// the residual.
    fn blend_corners(&self, x: f64, y: f64) -> Vector3<f64> {
        let [sw, se, ne, nw] = self.corners;
        let blended = sw * ((1.0 - x) * (1.0 - y))
            + se * (x * (1.0 - y))
            + ne * (x * y)
            + nw * ((1.0 - x) * y);
        if blended.norm() < DEGENERATE_EPS {
            self.center
        } else {
            blended.normalize()
        }
    }

    /// Whether normalized coordinates fall inside the cell, with a
    /// tolerance band in normalized units (callers pass half a source
    /// pixel to avoid visible seams at tile joins).
    pub fn contains_coords(&self, x: f64, y: f64, tol_x: f64, tol_y: f64) -> bool {
        x >= -tol_x && x <= 1.0 + tol_x && y >= -tol_y && y <= 1.0 + tol_y
    }
}
