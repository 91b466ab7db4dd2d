use serde::{Deserialize, Serialize};
use std::fmt::Write;

const DEFAULT_COLOR: &str = "#000000";
const DEFAULT_STROKE_WIDTH: f64 = 2.0;

/// Vector stroke records of one page.
///
/// ```json
/// {"width": 1404, "height": 1872, "strokes": [
///     {"color": "#1a1a1a", "width": 2.5, "points": [[10, 10], [12, 14, 0.8]]}
/// ]}
/// ```
///
/// Points may carry a third (pressure) component, which is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeData {
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "default_stroke_width")]
    pub width: f64,
    #[serde(default)]
    pub points: Vec<Vec<f64>>,
}

fn default_stroke_width() -> f64 {
    DEFAULT_STROKE_WIDTH
}

/// Colours end up inside an SVG attribute; only accept `#hex` or plain names.
fn safe_color(color: Option<&str>) -> &str {
    match color {
        Some(c)
            if !c.is_empty()
                && (c.strip_prefix('#').is_some_and(|hex| hex.chars().all(|ch| ch.is_ascii_hexdigit()))
                    || c.chars().all(|ch| ch.is_ascii_alphabetic())) =>
        {
            c
        },
        _ => DEFAULT_COLOR,
    }
}

impl Stroke {
    fn xy(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().filter_map(|p| match p.as_slice() {
            [x, y, ..] if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
    }
}

impl StrokeData {
    pub fn is_empty(&self) -> bool {
        self.strokes.iter().all(|s| s.xy().next().is_none())
    }

    /// Canvas size: declared dimensions, otherwise the bounding box of all
    /// points.
    fn canvas(&self) -> (f64, f64) {
        let (mut max_x, mut max_y) = (1.0_f64, 1.0_f64);
        for (x, y) in self.strokes.iter().flat_map(Stroke::xy) {
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (self.width.filter(|w| *w > 0.0).unwrap_or(max_x), self.height.filter(|h| *h > 0.0).unwrap_or(max_y))
    }

    /// Renders the strokes as a standalone SVG document, one `<path>` per
    /// stroke.
    pub fn to_svg(&self) -> String {
        let (width, height) = self.canvas();
        let mut svg = format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {width:.0} {height:.0}\" width=\"{width:.0}\" height=\"{height:.0}\">\n"
        );
        for stroke in &self.strokes {
            let mut points = stroke.xy();
            let Some((x0, y0)) = points.next() else {
                continue;
            };
            let mut d = format!("M{x0:.1} {y0:.1}");
            let mut segments = 0;
            for (x, y) in points {
                // Infallible: writing to a String.
                _ = write!(d, " L{x:.1} {y:.1}");
                segments += 1;
            }
            if segments == 0 {
                // A dot: zero-length segment so round caps draw something.
                _ = write!(d, " L{x0:.1} {y0:.1}");
            }
            let stroke_width = if stroke.width.is_finite() && stroke.width > 0.0 { stroke.width } else { DEFAULT_STROKE_WIDTH };
            _ = writeln!(
                svg,
                "  <path d=\"{d}\" fill=\"none\" stroke=\"{}\" stroke-width=\"{stroke_width:.1}\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/>",
                safe_color(stroke.color.as_deref())
            );
        }
        svg.push_str("</svg>\n");
        svg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_render() {
        let data: StrokeData = serde_json::from_str(
            r##"{"width": 100, "height": 50, "strokes": [
                {"color": "#ff0000", "width": 3, "points": [[1, 2], [3, 4, 0.5]]},
                {"points": [[10, 10]]},
                {"points": []}
            ]}"##,
        )
        .unwrap();
        let svg = data.to_svg();
        assert!(svg.starts_with("<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 100 50\""));
        assert!(svg.contains("d=\"M1.0 2.0 L3.0 4.0\" fill=\"none\" stroke=\"#ff0000\" stroke-width=\"3.0\""));
        assert!(svg.contains("d=\"M10.0 10.0 L10.0 10.0\""));
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_canvas_falls_back_to_bounding_box() {
        let data: StrokeData = serde_json::from_str(r#"{"strokes": [{"points": [[5, 5], [40, 30]]}]}"#).unwrap();
        assert!(data.to_svg().contains("viewBox=\"0 0 40 30\""));
    }

    #[test]
    fn test_unsafe_color_is_replaced() {
        let data: StrokeData =
            serde_json::from_str(r#"{"strokes": [{"color": "\"/><script>", "points": [[1, 1], [2, 2]]}]}"#).unwrap();
        let svg = data.to_svg();
        assert!(!svg.contains("script"));
        assert!(svg.contains("stroke=\"#000000\""));
    }

    #[test]
    fn test_empty() {
        assert!(StrokeData::default().is_empty());
        let data: StrokeData = serde_json::from_str(r#"{"strokes": [{"points": [[1]]}]}"#).unwrap();
        assert!(data.is_empty());
    }
}
