//! The "SHAPE" Engine - Ray/Plane/Triangle Kernel and Colliders
//!
//! Picking and occlusion never touch full mesh geometry. Every overlay
//! object is reduced to one of two proxy volumes:
//! - A sphere (center + radius) tested via its closest-approach plane
//! - A quad (four coplanar corners) decomposed into two triangles
//!
//! All kernel arithmetic is single precision. Degenerate configurations
//! (ray parallel to a plane, intersection behind the ray origin) never
//! panic; they surface as a non-finite or negative ray parameter and are
//! rejected at the `Option` boundary.

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

// ============================================================================
// RAY
// ============================================================================

/// A half-line in render space: origin plus a direction.
///
/// The direction is not required to be unit length; ray parameters returned
/// by [`Plane::intersect_ray`] are expressed in multiples of it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    /// Start point of the cast
    pub origin: Point3<f32>,

    /// Cast direction
    pub direction: Vector3<f32>,
}

impl Ray {
    /// Creates a ray from an origin and a direction.
    pub fn new(origin: Point3<f32>, direction: Vector3<f32>) -> Self {
        Self { origin, direction }
    }

    /// Creates a ray passing through two points, cast from the first.
    pub fn through(origin: Point3<f32>, target: Point3<f32>) -> Self {
        Self {
            origin,
            direction: target - origin,
        }
    }

    /// Returns origin + t * direction.
    #[inline]
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        self.origin + self.direction * t
    }
}

// ============================================================================
// PLANE
// ============================================================================

/// An infinite plane given by a point on it and a normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Any point on the plane
    pub point: Point3<f32>,

    /// Plane normal (not required to be unit length)
    pub normal: Vector3<f32>,
}

impl Plane {
    /// Creates a plane from a point and a normal.
    pub fn new(point: Point3<f32>, normal: Vector3<f32>) -> Self {
        Self { point, normal }
    }

    /// Solves `(origin + t * dir - point) . normal == 0` for t.
    ///
    /// The raw parameter is returned untouched: negative t means the plane
    /// lies behind the ray origin, and a ray parallel to the plane divides
    /// by zero and comes back non-finite. Callers reject both; see
    /// [`Plane::clip_ray`].
    #[inline]
    pub fn intersect_ray(&self, ray: &Ray) -> f32 {
        let denom = ray.direction.dot(&self.normal);
        (self.point - ray.origin).dot(&self.normal) / denom
    }

    /// Forward intersection point, or `None` for a degenerate or
    /// behind-the-origin crossing.
    pub fn clip_ray(&self, ray: &Ray) -> Option<Point3<f32>> {
        let t = self.intersect_ray(ray);
        if !t.is_finite() || t < 0.0 {
            return None;
        }
        Some(ray.point_at(t))
    }
}

// ============================================================================
// TRIANGLE
// ============================================================================

/// Three points; the building block of the quad collider.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub a: Point3<f32>,
    pub b: Point3<f32>,
    pub c: Point3<f32>,
}

impl Triangle {
    pub fn new(a: Point3<f32>, b: Point3<f32>, c: Point3<f32>) -> Self {
        Self { a, b, c }
    }

    /// The plane containing this triangle.
    pub fn plane(&self) -> Plane {
        let normal = (self.b - self.a).cross(&(self.c - self.a));
        Plane::new(self.a, normal)
    }

    /// Point-in-triangle via same-side half-plane tests. Edges count as
    /// inside. The point is assumed to lie on the triangle's plane.
    pub fn contains(&self, point: &Point3<f32>) -> bool {
        same_side(point, &self.a, &self.b, &self.c)
            && same_side(point, &self.b, &self.a, &self.c)
            && same_side(point, &self.c, &self.a, &self.b)
    }
}

/// True if `point` and `reference` are on the same side of the line a-b
/// (or on it).
fn same_side(
    point: &Point3<f32>,
    reference: &Point3<f32>,
    a: &Point3<f32>,
    b: &Point3<f32>,
) -> bool {
    let edge = b - a;
    let cp = edge.cross(&(point - a));
    let cr = edge.cross(&(reference - a));
    cp.dot(&cr) >= 0.0
}

// ============================================================================
// SPHERE COLLIDER
// ============================================================================

/// Center + radius proxy volume, boundary inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereCollider {
    pub center: Point3<f32>,
    pub radius: f32,
}

impl SphereCollider {
    pub fn new(center: Point3<f32>, radius: f32) -> Self {
        Self { center, radius }
    }

    /// A point exactly on the boundary is contained.
    pub fn contains(&self, point: &Point3<f32>) -> bool {
        (point - self.center).norm() <= self.radius
    }

    /// Intersects the ray with the closest-approach plane (the plane
    /// through the center whose normal is the ray direction) and accepts
    /// the candidate point only if it lies inside the sphere.
    ///
    /// A ray cast from inside the volume but pointing away from the center
    /// puts that plane behind the origin and reports no hit; there is no
    /// inside special case. Callers that need inside-out hits must cast
    /// from outside.
    pub fn intersect(&self, ray: &Ray) -> Option<Point3<f32>> {
        let plane = Plane::new(self.center, ray.direction);
        let candidate = plane.clip_ray(ray)?;
        if self.contains(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

// ============================================================================
// SQUARE COLLIDER
// ============================================================================

/// Four coplanar corners decomposed into two triangles sharing one plane.
///
/// Coplanarity and winding order of the corners are preconditions, not
/// runtime checks; non-coplanar input produces unspecified results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareCollider {
    corners: [Point3<f32>; 4],
}

impl SquareCollider {
    pub fn new(corners: [Point3<f32>; 4]) -> Self {
        Self { corners }
    }

    pub fn corners(&self) -> &[Point3<f32>; 4] {
        &self.corners
    }

    /// The two constituent triangles (abc, acd).
    fn triangles(&self) -> (Triangle, Triangle) {
        let [a, b, c, d] = self.corners;
        (Triangle::new(a, b, c), Triangle::new(a, c, d))
    }

    /// The shared plane of both triangles.
    pub fn plane(&self) -> Plane {
        self.triangles().0.plane()
    }

    /// True if the point lies in either constituent triangle.
    pub fn contains(&self, point: &Point3<f32>) -> bool {
        let (t1, t2) = self.triangles();
        t1.contains(point) || t2.contains(point)
    }

    /// Plane crossing followed by the containment test. Same no-inside-
    /// special-case contract as [`SphereCollider::intersect`].
    pub fn intersect(&self, ray: &Ray) -> Option<Point3<f32>> {
        let candidate = self.plane().clip_ray(ray)?;
        if self.contains(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }
}

// ============================================================================
// COLLIDER
// ============================================================================

/// The proxy volume attached to an overlay object for picking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    Sphere(SphereCollider),
    Square(SquareCollider),
}

impl Collider {
    pub fn sphere(center: Point3<f32>, radius: f32) -> Self {
        Collider::Sphere(SphereCollider::new(center, radius))
    }

    pub fn square(corners: [Point3<f32>; 4]) -> Self {
        Collider::Square(SquareCollider::new(corners))
    }

    pub fn contains(&self, point: &Point3<f32>) -> bool {
        match self {
            Collider::Sphere(s) => s.contains(point),
            Collider::Square(s) => s.contains(point),
        }
    }

    pub fn intersect(&self, ray: &Ray) -> Option<Point3<f32>> {
        match self {
            Collider::Sphere(s) => s.intersect(ray),
            Collider::Square(s) => s.intersect(ray),
        }
    }

    /// Consistent with [`Collider::intersect`] by construction.
    pub fn intersects(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn p(x: f32, y: f32, z: f32) -> Point3<f32> {
        Point3::new(x, y, z)
    }

    fn v(x: f32, y: f32, z: f32) -> Vector3<f32> {
        Vector3::new(x, y, z)
    }

    #[test]
    fn test_ray_point_at() {
        let ray = Ray::new(p(1.0, 2.0, 3.0), v(0.0, 0.0, -2.0));
        let point = ray.point_at(2.0);
        assert_relative_eq!(point.z, -1.0);
        assert_relative_eq!(point.x, 1.0);
    }

    #[test]
    fn test_plane_intersection_parameter() {
        let plane = Plane::new(p(0.0, 0.0, -5.0), v(0.0, 0.0, 1.0));
        let ray = Ray::new(p(0.0, 0.0, 0.0), v(0.0, 0.0, -1.0));
        let t = plane.intersect_ray(&ray);
        assert_relative_eq!(t, 5.0);
    }

    #[test]
    fn test_plane_behind_origin_is_rejected() {
        let plane = Plane::new(p(0.0, 0.0, 5.0), v(0.0, 0.0, 1.0));
        let ray = Ray::new(p(0.0, 0.0, 0.0), v(0.0, 0.0, -1.0));
        assert!(plane.intersect_ray(&ray) < 0.0);
        assert!(plane.clip_ray(&ray).is_none());
    }

    #[test]
    fn test_parallel_ray_yields_no_finite_crossing() {
        let plane = Plane::new(p(0.0, 1.0, 0.0), v(0.0, 1.0, 0.0));
        let ray = Ray::new(p(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0));
        assert!(!plane.intersect_ray(&ray).is_finite());
        assert!(plane.clip_ray(&ray).is_none());
    }

    #[test]
    fn test_triangle_contains() {
        let tri = Triangle::new(p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0));
        assert!(tri.contains(&p(0.25, 0.25, 0.0)));
        assert!(tri.contains(&p(0.5, 0.5, 0.0))); // on the hypotenuse
        assert!(!tri.contains(&p(0.75, 0.75, 0.0)));
    }

    #[test]
    fn test_sphere_boundary_is_inclusive() {
        let sphere = SphereCollider::new(p(0.0, 0.0, 0.0), 2.0);
        assert!(sphere.contains(&p(2.0, 0.0, 0.0)));
        assert!(!sphere.contains(&p(2.0 + 1e-3, 0.0, 0.0)));
    }

    #[test]
    fn test_sphere_ray_hit_and_miss() {
        let sphere = SphereCollider::new(p(0.0, 0.0, -10.0), 1.0);

        let hit = Ray::new(p(0.0, 0.0, 0.0), v(0.0, 0.0, -1.0));
        let point = sphere.intersect(&hit).expect("straight-on cast hits");
        assert_relative_eq!(point.z, -10.0);

        let miss = Ray::new(p(5.0, 0.0, 0.0), v(0.0, 0.0, -1.0));
        assert!(sphere.intersect(&miss).is_none());
    }

    #[test]
    fn test_ray_from_inside_pointing_away_reports_no_hit() {
        // The closest-approach plane sits behind the origin when the cast
        // starts inside and points away from the center, so no hit is
        // reported even though the ray exits the volume.
        let sphere = SphereCollider::new(p(0.0, 0.0, 0.0), 5.0);
        let ray = Ray::new(p(1.0, 0.0, 0.0), v(1.0, 0.0, 0.0));
        assert!(sphere.intersect(&ray).is_none());
        assert!(sphere.contains(&ray.origin));
    }

    fn unit_square() -> SquareCollider {
        SquareCollider::new([
            p(0.0, 0.0, 0.0),
            p(0.0, 1.0, 0.0),
            p(1.0, 1.0, 0.0),
            p(1.0, 0.0, 0.0),
        ])
    }

    #[test]
    fn test_square_contains() {
        let square = unit_square();
        assert!(square.contains(&p(0.5, 0.5, 0.0)));
        assert!(square.contains(&p(0.0, 0.0, 0.0))); // corner
        assert!(!square.contains(&p(2.0, 2.0, 0.0)));
    }

    #[test]
    fn test_square_ray_intersection() {
        let square = unit_square();
        let ray = Ray::new(p(0.5, 0.5, 3.0), v(0.0, 0.0, -1.0));
        let point = square.intersect(&ray).expect("cast through the middle");
        assert_relative_eq!(point.x, 0.5);
        assert_relative_eq!(point.z, 0.0);

        let graze = Ray::new(p(1.5, 0.5, 3.0), v(0.0, 0.0, -1.0));
        assert!(square.intersect(&graze).is_none());
    }

    #[test]
    fn test_intersects_agrees_with_intersect() {
        let collider = Collider::square(*unit_square().corners());
        let hit = Ray::new(p(0.5, 0.5, 3.0), v(0.0, 0.0, -1.0));
        let miss = Ray::new(p(5.0, 5.0, 3.0), v(0.0, 0.0, -1.0));
        assert_eq!(collider.intersects(&hit), collider.intersect(&hit).is_some());
        assert_eq!(collider.intersects(&miss), collider.intersect(&miss).is_some());
        assert!(collider.intersects(&hit));
        assert!(!collider.intersects(&miss));
    }
}
