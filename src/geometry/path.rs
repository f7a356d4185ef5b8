// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

//! Parser for the restricted SVG path command set
//! {M, m, L, l, H, h, V, v, Z, z}.

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub a: Point,
    pub b: Point,
}

/// The geometric content of a parsed path string.
#[derive(Debug, Clone)]
pub struct ParsedPath {
    /// Every computed vertex, move targets included.
    pub points: Vec<Point>,
    /// Drawn segments in command order. `Z`/`z` contributes the segment
    /// back to the most recent move target.
    pub segments: Vec<Segment>,
    /// Vertex loop of the first subpath, without a duplicated closing
    /// vertex. Only meaningful for single-subpath paths.
    pub polygon: Vec<Point>,
    /// Number of `M`/`m` commands.
    pub subpaths: usize,
    /// Whether the path is a single subpath whose end returns to its
    /// start, either through `Z`/`z` or an explicit draw.
    pub closed: bool,
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidShapeSvgString(msg.into())
}

fn operand<'a>(tokens: &mut impl Iterator<Item = &'a str>, cmd: &str) -> Result<f64> {
    let tok = tokens
        .next()
        .ok_or_else(|| invalid(format!("missing operand for {cmd}")))?;
    let val: f64 = tok
        .parse()
        .map_err(|_| invalid(format!("bad operand {tok:?} for {cmd}")))?;
    if !val.is_finite() {
        return Err(invalid(format!("non-finite operand for {cmd}")));
    }
    Ok(val)
}

/// Parses a path string. The string must open with an absolute `M` and
/// every command must carry the correct number of numeric operands.
pub fn parse(svg: &str) -> Result<ParsedPath> {
    let mut tokens = svg.split_whitespace();

    match tokens.next() {
        Some("M") => {}
        Some(other) => return Err(invalid(format!("path must start with M, got {other:?}"))),
        None => return Err(invalid("empty path")),
    }
    let start = Point {
        x: operand(&mut tokens, "M")?,
        y: operand(&mut tokens, "M")?,
    };

    let mut cursor = start;
    let mut subpath_start = start;
    let mut points = vec![start];
    let mut segments = Vec::new();
    let mut polygon = vec![start];
    let mut subpaths = 1usize;

    while let Some(cmd) = tokens.next() {
        match cmd {
            "M" | "m" => {
                let x = operand(&mut tokens, cmd)?;
                let y = operand(&mut tokens, cmd)?;
                let target = if cmd == "M" {
                    Point { x, y }
                } else {
                    Point {
                        x: cursor.x + x,
                        y: cursor.y + y,
                    }
                };
                cursor = target;
                subpath_start = target;
                subpaths += 1;
                points.push(target);
            }
            "L" | "l" | "H" | "h" | "V" | "v" => {
                let target = match cmd {
                    "L" => Point {
                        x: operand(&mut tokens, cmd)?,
                        y: operand(&mut tokens, cmd)?,
                    },
                    "l" => Point {
                        x: cursor.x + operand(&mut tokens, cmd)?,
                        y: cursor.y + operand(&mut tokens, cmd)?,
                    },
                    "H" => Point {
                        x: operand(&mut tokens, cmd)?,
                        y: cursor.y,
                    },
                    "h" => Point {
                        x: cursor.x + operand(&mut tokens, cmd)?,
                        y: cursor.y,
                    },
                    "V" => Point {
                        x: cursor.x,
                        y: operand(&mut tokens, cmd)?,
                    },
                    "v" => Point {
                        x: cursor.x,
                        y: cursor.y + operand(&mut tokens, cmd)?,
                    },
                    _ => unreachable!(),
                };
                segments.push(Segment {
                    a: cursor,
                    b: target,
                });
                cursor = target;
                points.push(target);
                if subpaths == 1 {
                    polygon.push(target);
                }
            }
            "Z" | "z" => {
                segments.push(Segment {
                    a: cursor,
                    b: subpath_start,
                });
                cursor = subpath_start;
            }
            other => return Err(invalid(format!("unknown path command {other:?}"))),
        }
    }

    // A draw that terminates exactly on the opening move duplicates the
    // first polygon vertex.
    if subpaths == 1 && polygon.len() > 1 && *polygon.last().unwrap() == start {
        polygon.pop();
    }

    let closed = subpaths == 1 && !segments.is_empty() && cursor == subpath_start;

    Ok(ParsedPath {
        points,
        segments,
        polygon,
        subpaths,
        closed,
    })
}
