// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Shape geometry: parsing-level validity, ink costs, closed-polygon and
//! self-intersection tests, cross-shape overlap, and canvas bounds.

pub mod path;

pub use path::{ParsedPath, Point, Segment};

use crate::error::{Error, Result};
use crate::primitives::Shape;
use crate::settings::CanvasSettings;

/// Maximum length of a shape's path string.
pub const MAX_SVG_LEN: usize = 128;

/// Sentinel colour that disables a fill or stroke layer.
pub const TRANSPARENT: &str = "transparent";

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidShapeSvgString(msg.into())
}

/// Checks a path string alone: length bound, command set, operand counts.
pub fn validate_svg_string(svg: &str) -> Result<()> {
    if svg.len() > MAX_SVG_LEN {
        return Err(Error::ShapeSvgStringTooLong);
    }
    path::parse(svg).map(|_| ())
}

/// Parses a shape and enforces every constraint that does not depend on
/// the canvas: length, command validity, at least one visible layer, and
/// closed-and-simple geometry when the shape is filled.
fn checked_parse(shape: &Shape) -> Result<ParsedPath> {
    if shape.svg.len() > MAX_SVG_LEN {
        return Err(Error::ShapeSvgStringTooLong);
    }
    let parsed = path::parse(&shape.svg)?;
    if shape.fill == TRANSPARENT && shape.stroke == TRANSPARENT {
        return Err(invalid("both fill and stroke are transparent"));
    }
    if shape.fill != TRANSPARENT {
        if parsed.subpaths != 1 {
            return Err(invalid("filled path must be a single subpath"));
        }
        if !parsed.closed {
            return Err(invalid("filled path must be closed"));
        }
        if !polygon_is_simple(&parsed.polygon) {
            return Err(invalid("filled path must not self-intersect"));
        }
    }
    Ok(parsed)
}

/// Full admission-time validation of a shape against the canvas.
pub fn validate_shape(shape: &Shape, canvas: &CanvasSettings) -> Result<()> {
    let parsed = checked_parse(shape)?;
    let (x_max, y_max) = (f64::from(canvas.canvas_x_max), f64::from(canvas.canvas_y_max));
    for p in &parsed.points {
        if p.x < 0.0 || p.x > x_max || p.y < 0.0 || p.y > y_max {
            return Err(Error::OutOfBounds);
        }
    }
    Ok(())
}

/// Total Euclidean length of the drawn segments.
pub fn line_cost(parsed: &ParsedPath) -> f64 {
    parsed
        .segments
        .iter()
        .map(|s| ((s.b.x - s.a.x).powi(2) + (s.b.y - s.a.y).powi(2)).sqrt())
        .sum()
}

/// Shoelace area of the polygon's vertex loop.
pub fn fill_cost(polygon: &[Point]) -> f64 {
    let n = polygon.len();
    if n < 3 {
        return 0.0;
    }
    let mut cross_sum = 0.0;
    for i in 0..n {
        let (a, b) = (polygon[i], polygon[(i + 1) % n]);
        cross_sum += a.x * b.y - b.x * a.y;
    }
    cross_sum.abs() / 2.0
}

/// Ink consumed by committing the shape: segment length for the stroke
/// layer plus polygon area for the fill layer, rounded down.
pub fn ink_cost(shape: &Shape) -> Result<u32> {
    let parsed = checked_parse(shape)?;
    let mut cost = 0.0;
    if shape.stroke != TRANSPARENT {
        cost += line_cost(&parsed);
    }
    if shape.fill != TRANSPARENT {
        cost += fill_cost(&parsed.polygon);
    }
    Ok(cost.floor() as u32)
}

/// Whether two shapes conflict on the canvas: a segment of one crosses a
/// segment of the other, or either shape is filled and a vertex of the
/// other lies strictly inside the filled region. Two stroke-only shapes
/// overlap only through segment crossings.
pub fn shapes_overlap(a: &Shape, b: &Shape) -> Result<bool> {
    let pa = checked_parse(a)?;
    let pb = checked_parse(b)?;

    for sa in &pa.segments {
        for sb in &pb.segments {
            if segments_cross(sa, sb) {
                return Ok(true);
            }
        }
    }

    if a.fill != TRANSPARENT && pb.points.iter().any(|p| point_in_polygon(*p, &pa.polygon)) {
        return Ok(true);
    }
    if b.fill != TRANSPARENT && pa.points.iter().any(|p| point_in_polygon(*p, &pb.polygon)) {
        return Ok(true);
    }

    Ok(false)
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn within_bounding_box(s: &Segment, p: Point) -> bool {
    p.x >= s.a.x.min(s.b.x)
        && p.x <= s.a.x.max(s.b.x)
        && p.y >= s.a.y.min(s.b.y)
        && p.y <= s.a.y.max(s.b.y)
}

/// Whether two segments intersect: general-position crossing via
/// orientation signs, with a bounding-box containment test for the
/// collinear cases.
pub fn segments_cross(s: &Segment, t: &Segment) -> bool {
    let d1 = orientation(t.a, t.b, s.a);
    let d2 = orientation(t.a, t.b, s.b);
    let d3 = orientation(s.a, s.b, t.a);
    let d4 = orientation(s.a, s.b, t.b);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    (d1 == 0.0 && within_bounding_box(t, s.a))
        || (d2 == 0.0 && within_bounding_box(t, s.b))
        || (d3 == 0.0 && within_bounding_box(s, t.a))
        || (d4 == 0.0 && within_bounding_box(s, t.b))
}

/// Whether no two non-adjacent edges of the vertex loop intersect.
/// Shared endpoints of adjacent edges do not count.
fn polygon_is_simple(polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 4 {
        return true;
    }
    for i in 0..n {
        let ei = Segment {
            a: polygon[i],
            b: polygon[(i + 1) % n],
        };
        for j in (i + 2)..n {
            // The closing edge (n-1, 0) is adjacent to edge 0.
            if i == 0 && j == n - 1 {
                continue;
            }
            let ej = Segment {
                a: polygon[j],
                b: polygon[(j + 1) % n],
            };
            if segments_cross(&ei, &ej) {
                return false;
            }
        }
    }
    true
}

/// Even-odd containment test with an upward infinite ray. The half-open
/// rule on x resolves a ray through a vertex by the orientation of the
/// adjacent edge, so the vertex is counted exactly once.
fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (polygon[j], polygon[i]);
        if (a.x > p.x) != (b.x > p.x) {
            let y_at = a.y + (b.y - a.y) * (p.x - a.x) / (b.x - a.x);
            if y_at > p.y {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}
