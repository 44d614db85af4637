// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Bounding spheres and circumsphere construction

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use super::BoundingBox;

const DEGENERATE_EPS: f64 = 1e-8;

/// Sphere defined by center and radius
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Point3<f64>, radius: f64) -> Self {
        Self { center, radius }
    }

    /// Check if a point lies strictly inside the sphere
    pub fn contains(&self, point: &Point3<f64>) -> bool {
        (point - self.center).norm() < self.radius
    }

    /// Exact sphere-sphere intersection test
    pub fn intersects(&self, other: &Sphere) -> bool {
        (other.center - self.center).norm() <= self.radius + other.radius
    }

    /// Bounding box of the sphere
    pub fn bounding_box(&self) -> BoundingBox {
        let r = nalgebra::Vector3::new(self.radius, self.radius, self.radius);
        BoundingBox::new(self.center - r, self.center + r)
    }

    /// Circumscribing sphere of a triangle.
    ///
    /// Returns `None` for degenerate (near-collinear) triangles, whose
    /// circumradius is unbounded.
    pub fn circumsphere(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> Option<Sphere> {
        let n1 = a - b;
        let n2 = b - c;
        let n3 = c - a;
        let d = n1.cross(&n2);

        let l1 = n1.norm_squared();
        let l2 = n2.norm_squared();
        let l3 = n3.norm_squared();
        let ld = d.norm_squared();

        if ld < DEGENERATE_EPS {
            return None;
        }

        let wa = n1.dot(&(a - c)) * l2 / ld / 2.0;
        let wb = n2.dot(&(b - a)) * l3 / ld / 2.0;
        let wc = n3.dot(&(c - b)) * l1 / ld / 2.0;

        let radius = (l1 * l2 * l3 / ld).sqrt() / 2.0;
        let center = Point3::from(wa * a.coords + wb * b.coords + wc * c.coords);

        Some(Sphere::new(center, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sphere_intersection() {
        let a = Sphere::new(Point3::new(0.0, 0.0, 0.0), 1.0);
        let b = Sphere::new(Point3::new(1.5, 0.0, 0.0), 1.0);
        let c = Sphere::new(Point3::new(5.0, 0.0, 0.0), 1.0);

        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_circumsphere_equilateral() {
        // Unit right triangle in the XY plane; circumcenter at the
        // hypotenuse midpoint.
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        let s = Sphere::circumsphere(&a, &b, &c).expect("non-degenerate");
        assert_relative_eq!(s.center.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.center.y, 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.radius, (0.5f64).sqrt(), epsilon = 1e-12);

        // All three vertices lie on the sphere surface.
        for p in [&a, &b, &c] {
            assert_relative_eq!((p - s.center).norm(), s.radius, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_circumsphere_degenerate() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(2.0, 0.0, 0.0);
        assert!(Sphere::circumsphere(&a, &b, &c).is_none());
    }
}
