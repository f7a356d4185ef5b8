// Copyright (c) 2024 The Inkchain developers
// Licensed under the Apache License, Version 2.0 see LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0 or the MIT license, see
// LICENSE-MIT or http://opensource.org/licenses/MIT

use serde::{Deserialize, Serialize};

use crate::geometry::TRANSPARENT;

/// A shape on the canvas: a path string plus fill and stroke colours.
/// `"transparent"` disables a layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub svg: String,
    pub fill: String,
    pub stroke: String,
}

impl Shape {
    pub fn new(svg: impl Into<String>, fill: impl Into<String>, stroke: impl Into<String>) -> Self {
        Shape {
            svg: svg.into(),
            fill: fill.into(),
            stroke: stroke.into(),
        }
    }

    /// The recoloured record a deleted shape leaves behind so historical
    /// block rendering stays consistent: every visible layer turns white.
    pub fn tombstone(&self) -> Shape {
        let recolour = |layer: &str| {
            if layer == TRANSPARENT {
                TRANSPARENT.to_owned()
            } else {
                "white".to_owned()
            }
        };
        Shape {
            svg: self.svg.clone(),
            fill: recolour(&self.fill),
            stroke: recolour(&self.stroke),
        }
    }

    /// Rendered `<path/>` element.
    pub fn to_svg_element(&self) -> String {
        format!(
            r#"<path d="{}" stroke="{}" fill="{}"/>"#,
            self.svg, self.stroke, self.fill
        )
    }
}
