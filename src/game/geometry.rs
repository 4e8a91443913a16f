//! Combat Geometry
//!
//! Pure hit-test functions: annular sectors (weapon reach) against
//! convex quads (combatant bodies). No state, no randomness; identical
//! inputs always give identical answers.
//!
//! ## Sector
//!
//! ```text
//!                 end
//!                /
//!        outer  /  ___
//!        chord /  /   \
//!             / _/     |  ← outer arc (tested as a chord)
//!            / /       |
//!   center ●──┼────────┘─── start
//!             inner
//! ```
//!
//! Angles are degrees counter-clockwise from +X. A sector whose
//! normalized start is greater than its end crosses 0°.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;

/// Four vertices of a convex quadrilateral, in winding order.
pub type Quad = [Vec2; 4];

/// Normalize an angle in degrees to `[0, 360)`.
#[inline]
pub fn normalize_degrees(angle: f64) -> f64 {
    let a = angle.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360.0
    if a >= 360.0 { 0.0 } else { a }
}

/// Whether a normalized `angle` lies in the range `[start, end]`,
/// wrapping through 0° when `start > end`.
#[inline]
fn angle_in_range(angle: f64, start: f64, end: f64) -> bool {
    if start > end {
        angle >= start || angle <= end
    } else {
        angle >= start && angle <= end
    }
}

/// Check if a point lies inside an annular sector.
///
/// True iff the distance from `center` is within `[inner_radius, outer_radius]`
/// and the direction from `center` is within the angular range. An
/// `inner_radius` of zero never excludes a point.
pub fn point_in_sector(
    point: Vec2,
    center: Vec2,
    inner_radius: f64,
    outer_radius: f64,
    start_deg: f64,
    end_deg: f64,
) -> bool {
    let offset = point - center;
    let distance = offset.length();
    if distance < inner_radius || distance > outer_radius {
        return false;
    }

    let angle = normalize_degrees(offset.angle_deg());
    angle_in_range(angle, normalize_degrees(start_deg), normalize_degrees(end_deg))
}

/// Check if segment `p1-p2` intersects segment `q1-q2`.
///
/// Parallel and collinear pairs (`cross == 0`) never intersect, even when
/// they overlap, matching the server.
pub fn segments_intersect(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let r = p2 - p1;
    let s = q2 - q1;
    let denom = r.cross(s);
    if denom == 0.0 {
        return false;
    }

    let qp = q1 - p1;
    let t = qp.cross(s) / denom;
    let u = qp.cross(r) / denom;

    (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u)
}

/// Check if a point lies inside (or on the border of) a convex quad.
///
/// Each edge's cross product with (point − edge start) must share one sign,
/// so either winding order gives the same answer.
pub fn point_in_convex_quad(point: Vec2, vertices: &Quad) -> bool {
    let mut has_positive = false;
    let mut has_negative = false;

    for i in 0..4 {
        let a = vertices[i];
        let b = vertices[(i + 1) % 4];
        let side = (b - a).cross(point - a);
        if side > 0.0 {
            has_positive = true;
        } else if side < 0.0 {
            has_negative = true;
        }
        if has_positive && has_negative {
            return false;
        }
    }

    true
}

/// The four boundary segments of a sector: radial edge at `start`,
/// radial edge at `end`, inner chord, outer chord.
pub fn sector_edges(
    center: Vec2,
    inner_radius: f64,
    outer_radius: f64,
    start_deg: f64,
    end_deg: f64,
) -> [(Vec2, Vec2); 4] {
    let inner_start = center.polar_offset(inner_radius, start_deg);
    let inner_end = center.polar_offset(inner_radius, end_deg);
    let outer_start = center.polar_offset(outer_radius, start_deg);
    let outer_end = center.polar_offset(outer_radius, end_deg);

    [
        (inner_start, outer_start),
        (inner_end, outer_end),
        (inner_start, inner_end),
        (outer_start, outer_end),
    ]
}

/// Check if an annular sector overlaps a convex quad.
///
/// Tested in order, first match wins:
/// 1. any quad vertex inside the sector,
/// 2. any sector boundary segment crossing any quad edge,
/// 3. the sector center inside the quad.
pub fn sector_intersects_rect(
    center: Vec2,
    inner_radius: f64,
    outer_radius: f64,
    start_deg: f64,
    end_deg: f64,
    rect: &Quad,
) -> bool {
    let start = normalize_degrees(start_deg);
    let end = normalize_degrees(end_deg);

    if rect
        .iter()
        .any(|v| point_in_sector(*v, center, inner_radius, outer_radius, start, end))
    {
        return true;
    }

    let edges = sector_edges(center, inner_radius, outer_radius, start, end);
    for (a, b) in edges {
        for i in 0..4 {
            if segments_intersect(a, b, rect[i], rect[(i + 1) % 4]) {
                return true;
            }
        }
    }

    point_in_convex_quad(center, rect)
}

/// Axis-aligned rectangle centered on `center`, counter-clockwise from the
/// bottom-left corner.
pub fn body_rect(center: Vec2, half_width: f64, half_height: f64) -> Quad {
    [
        Vec2::new(center.x - half_width, center.y - half_height),
        Vec2::new(center.x + half_width, center.y - half_height),
        Vec2::new(center.x + half_width, center.y + half_height),
        Vec2::new(center.x - half_width, center.y + half_height),
    ]
}

/// Limit `target` to a circle of `radius` around `origin`.
pub fn clamp_to_radius(origin: Vec2, target: Vec2, radius: f64) -> Vec2 {
    let offset = target - origin;
    if offset.length() <= radius {
        return target;
    }
    origin + offset.normalize() * radius
}

// =============================================================================
// DIRECTION
// =============================================================================

/// Facing octant, used to pick a facing-dependent animation.
///
/// Discriminants match the animation clip indices of the sprite sheets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// 337.5° – 22.5°
    Right = 0,
    /// 292.5° – 337.5°
    RightDown = 1,
    /// 247.5° – 292.5°
    Down = 2,
    /// 202.5° – 247.5°
    LeftDown = 3,
    /// 157.5° – 202.5°
    Left = 4,
    /// 112.5° – 157.5°
    LeftUp = 5,
    /// 67.5° – 112.5°
    Up = 6,
    /// 22.5° – 67.5°
    RightUp = 7,
}

/// Map a facing angle to its octant.
///
/// Boundaries sit at 22.5°, 67.5°, …, 337.5°, so 0° is centered in
/// [`Direction::Right`]. Lower bounds are inclusive.
pub fn classify_direction(angle_deg: f64) -> Direction {
    let angle = normalize_degrees(angle_deg);
    if !(22.5..337.5).contains(&angle) {
        Direction::Right
    } else if angle < 67.5 {
        Direction::RightUp
    } else if angle < 112.5 {
        Direction::Up
    } else if angle < 157.5 {
        Direction::LeftUp
    } else if angle < 202.5 {
        Direction::Left
    } else if angle < 247.5 {
        Direction::LeftDown
    } else if angle < 292.5 {
        Direction::Down
    } else {
        Direction::RightDown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HALF: f64 = 17.5;

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(0.0), 0.0);
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(450.0), 90.0);
        assert_eq!(normalize_degrees(-1e-20), 0.0);
    }

    #[test]
    fn test_point_in_sector_basic() {
        let c = Vec2::ZERO;
        assert!(point_in_sector(Vec2::new(10.0, 10.0), c, 0.0, 52.5, 0.0, 90.0));
        // Behind the attacker
        assert!(!point_in_sector(Vec2::new(-10.0, 10.0), c, 0.0, 52.5, 0.0, 90.0));
        // Too far
        assert!(!point_in_sector(Vec2::new(50.0, 50.0), c, 0.0, 52.5, 0.0, 90.0));
    }

    #[test]
    fn test_point_in_sector_inner_radius() {
        let c = Vec2::ZERO;
        // Spear-like ring: 140..175
        assert!(!point_in_sector(Vec2::new(100.0, 1.0), c, 140.0, 175.0, 0.0, 45.0));
        assert!(point_in_sector(Vec2::new(150.0, 1.0), c, 140.0, 175.0, 0.0, 45.0));
        // Zero inner radius accepts the center itself
        assert!(point_in_sector(c, c, 0.0, 10.0, 0.0, 90.0));
    }

    #[test]
    fn test_point_in_sector_wraparound() {
        let c = Vec2::ZERO;
        // -30..30 normalizes to 330..30
        assert!(point_in_sector(Vec2::new(10.0, -2.0), c, 0.0, 20.0, -30.0, 30.0));
        assert!(point_in_sector(Vec2::new(10.0, 2.0), c, 0.0, 20.0, -30.0, 30.0));
        assert!(!point_in_sector(Vec2::new(0.0, 10.0), c, 0.0, 20.0, -30.0, 30.0));
        assert!(!point_in_sector(Vec2::new(-10.0, 0.0), c, 0.0, 20.0, 330.0, 30.0));
    }

    #[test]
    fn test_segments_intersect() {
        let cross = segments_intersect(
            Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0), Vec2::new(10.0, 0.0),
        );
        assert!(cross);

        let apart = segments_intersect(
            Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0),
            Vec2::new(5.0, 0.0), Vec2::new(6.0, -3.0),
        );
        assert!(!apart);

        // Touching at an endpoint counts
        let touch = segments_intersect(
            Vec2::new(0.0, 0.0), Vec2::new(5.0, 0.0),
            Vec2::new(5.0, -5.0), Vec2::new(5.0, 5.0),
        );
        assert!(touch);
    }

    #[test]
    fn test_collinear_segments_never_intersect() {
        // Overlapping collinear segments are reported as non-intersecting
        assert!(!segments_intersect(
            Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0),
            Vec2::new(5.0, 0.0), Vec2::new(15.0, 0.0),
        ));
        // Parallel
        assert!(!segments_intersect(
            Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0),
            Vec2::new(0.0, 1.0), Vec2::new(10.0, 1.0),
        ));
        // Degenerate zero-length segment
        assert!(!segments_intersect(
            Vec2::new(3.0, 3.0), Vec2::new(3.0, 3.0),
            Vec2::new(0.0, 0.0), Vec2::new(10.0, 10.0),
        ));
    }

    #[test]
    fn test_point_in_convex_quad() {
        let quad = body_rect(Vec2::new(5.0, 5.0), 5.0, 5.0);
        assert!(point_in_convex_quad(Vec2::new(5.0, 5.0), &quad));
        assert!(point_in_convex_quad(Vec2::new(0.0, 0.0), &quad)); // corner
        assert!(!point_in_convex_quad(Vec2::new(11.0, 5.0), &quad));

        let mut clockwise = quad;
        clockwise.reverse();
        assert!(point_in_convex_quad(Vec2::new(5.0, 5.0), &clockwise));
        assert!(!point_in_convex_quad(Vec2::new(-1.0, 5.0), &clockwise));
    }

    #[test]
    fn test_hit_vertex_inside_sector() {
        // Blade at origin facing 0°, defender 30 units to the right
        let rect = body_rect(Vec2::new(30.0, 0.0), HALF, HALF);
        assert!(sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, 0.0, 90.0, &rect));
    }

    #[test]
    fn test_miss_behind_attacker() {
        let rect = body_rect(Vec2::new(-100.0, 0.0), HALF, HALF);
        assert!(!sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, 0.0, 90.0, &rect));
    }

    #[test]
    fn test_hit_by_edge_crossing_only() {
        // Thin wide bar crossing the sector's radial edge, no vertex inside
        let rect: Quad = [
            Vec2::new(-100.0, 20.0),
            Vec2::new(100.0, 20.0),
            Vec2::new(100.0, 22.0),
            Vec2::new(-100.0, 22.0),
        ];
        assert!(rect.iter().all(|v| !point_in_sector(*v, Vec2::ZERO, 0.0, 52.5, 0.0, 90.0)));
        assert!(sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, 0.0, 90.0, &rect));
    }

    #[test]
    fn test_hit_sector_inside_rect() {
        // A huge rectangle swallowing a small sector
        let rect = body_rect(Vec2::ZERO, 500.0, 500.0);
        assert!(sector_intersects_rect(Vec2::ZERO, 0.0, 10.0, 0.0, 90.0, &rect));
    }

    #[test]
    fn test_ring_sector_misses_close_target() {
        // Bow ring 105..245 does not reach a target standing next to the archer
        let rect = body_rect(Vec2::new(20.0, 0.0), HALF, 35.0);
        assert!(!sector_intersects_rect(Vec2::ZERO, 105.0, 245.0, 0.0, 45.0, &rect));
        let far = body_rect(Vec2::new(150.0, 40.0), HALF, 35.0);
        assert!(sector_intersects_rect(Vec2::ZERO, 105.0, 245.0, 0.0, 45.0, &far));
    }

    #[test]
    fn test_rotated_sector() {
        // Facing 90° subtracts from the local angles: 0..90 becomes -90..0
        let below = body_rect(Vec2::new(10.0, -30.0), HALF, HALF);
        assert!(sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, 0.0 - 90.0, 90.0 - 90.0, &below));
        let above = body_rect(Vec2::new(-30.0, 40.0), 5.0, 5.0);
        assert!(!sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, 0.0 - 90.0, 90.0 - 90.0, &above));
    }

    #[test]
    fn test_classify_direction() {
        assert_eq!(classify_direction(0.0), Direction::Right);
        assert_eq!(classify_direction(22.4), Direction::Right);
        assert_eq!(classify_direction(22.5), Direction::RightUp);
        assert_eq!(classify_direction(44.0), Direction::RightUp);
        assert_eq!(classify_direction(46.0), Direction::RightUp);
        assert_eq!(classify_direction(90.0), Direction::Up);
        assert_eq!(classify_direction(135.0), Direction::LeftUp);
        assert_eq!(classify_direction(180.0), Direction::Left);
        assert_eq!(classify_direction(225.0), Direction::LeftDown);
        assert_eq!(classify_direction(270.0), Direction::Down);
        assert_eq!(classify_direction(315.0), Direction::RightDown);
        assert_eq!(classify_direction(337.5), Direction::Right);
        assert_eq!(classify_direction(359.0), Direction::Right);
        assert_eq!(classify_direction(-90.0), Direction::Down);
        assert_eq!(classify_direction(720.0), Direction::Right);
    }

    #[test]
    fn test_clamp_to_radius() {
        let origin = Vec2::new(10.0, 10.0);
        let inside = Vec2::new(12.0, 10.0);
        assert_eq!(clamp_to_radius(origin, inside, 5.0), inside);

        let clamped = clamp_to_radius(origin, Vec2::new(110.0, 10.0), 5.0);
        assert!((clamped.x - 15.0).abs() < 1e-9);
        assert!((clamped.y - 10.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_point_in_sector_invariant_under_full_turns(
            px in -200.0f64..200.0,
            py in -200.0f64..200.0,
            start in -360i32..360,
            span in 1i32..359,
            turns in -2i32..3,
        ) {
            let start = start as f64;
            let end = start + span as f64;
            let shift = 360.0 * turns as f64;
            let p = Vec2::new(px, py);
            let base = point_in_sector(p, Vec2::ZERO, 10.0, 150.0, start, end);
            prop_assert_eq!(base, point_in_sector(p, Vec2::ZERO, 10.0, 150.0, start + shift, end));
            prop_assert_eq!(base, point_in_sector(p, Vec2::ZERO, 10.0, 150.0, start, end + shift));
        }

        #[test]
        fn prop_winding_order_does_not_matter(
            cx in -150.0f64..150.0,
            cy in -150.0f64..150.0,
            facing in 0i32..360,
        ) {
            let ccw = body_rect(Vec2::new(cx, cy), HALF, 35.0);
            let mut cw = ccw;
            cw.reverse();
            let start = -(facing as f64);
            let end = 90.0 - facing as f64;
            prop_assert_eq!(
                sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, start, end, &ccw),
                sector_intersects_rect(Vec2::ZERO, 0.0, 52.5, start, end, &cw)
            );
        }
    }
}
