//! PLY point-cloud loading

use crate::ply::{PlyError, read_header};
use crate::{ColoredPoint, Rgb};
use glam::Vec3;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

// Rows are deserialized as maps so property order and optional properties
// do not matter.
#[derive(Deserialize, Debug)]
struct PlyFile {
    #[serde(default, rename = "vertex")]
    vertex: Vec<HashMap<String, JsonValue>>,
}

/// A point cloud read back from disk.
#[derive(Debug, Clone, Default)]
pub struct PlyCloud {
    pub points: Vec<ColoredPoint>,
    /// The file declared red/green/blue (or r/g/b).
    pub has_color: bool,
    /// The file declared a confidence property.
    pub has_confidence: bool,
}

impl PlyCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Load a colored point cloud from a PLY file.
///
/// Missing colors default to the sentinel gray and missing confidence to 1.0.
#[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn read_ply(path: impl AsRef<Path>) -> Result<PlyCloud, PlyError> {
    let path = path.as_ref();
    let header = read_header(path)?;
    let has_color = (header.has_property("red")
        && header.has_property("green")
        && header.has_property("blue"))
        || (header.has_property("r") && header.has_property("g") && header.has_property("b"));
    let has_confidence = header.has_property("confidence");

    let reader = BufReader::new(File::open(path)?);
    let ply_data: PlyFile = serde_ply::from_reader(reader).map_err(|e| {
        warn!("Failed to parse PLY file: {}", e);
        PlyError::Parse(e.to_string())
    })?;

    if ply_data.vertex.len() != header.vertex_count {
        warn!(
            "Header declares {} vertices but {} were read",
            header.vertex_count,
            ply_data.vertex.len()
        );
    }

    fn get_f32(prop: Option<&JsonValue>) -> Option<f32> {
        prop.and_then(|v| match v {
            JsonValue::Number(n) => n.as_f64().map(|f| f as f32),
            _ => None,
        })
    }

    fn get_u8(prop: Option<&JsonValue>) -> Option<u8> {
        prop.and_then(|v| match v {
            JsonValue::Number(n) => n
                .as_u64()
                .map(|u| u.min(255) as u8)
                .or_else(|| n.as_f64().map(|f| f.round().clamp(0.0, 255.0) as u8)),
            _ => None,
        })
    }

    let mut points = Vec::with_capacity(ply_data.vertex.len());
    for (index, vertex) in ply_data.vertex.iter().enumerate() {
        let coord = |property: &'static str| {
            get_f32(vertex.get(property)).ok_or(PlyError::MissingProperty { property, index })
        };
        let position = Vec3::new(coord("x")?, coord("y")?, coord("z")?);

        let channel = |long: &str, short: &str| {
            get_u8(vertex.get(long)).or_else(|| get_u8(vertex.get(short)))
        };
        let color = match (
            channel("red", "r"),
            channel("green", "g"),
            channel("blue", "b"),
        ) {
            (Some(r), Some(g), Some(b)) => Rgb::new(r, g, b),
            _ => Rgb::SENTINEL,
        };

        let confidence = get_f32(vertex.get("confidence")).unwrap_or(1.0);
        points.push(ColoredPoint::new(position, color, confidence));
    }

    info!(
        "Loaded {} points (color: {}, confidence: {})",
        points.len(),
        has_color,
        has_confidence
    );
    debug!("PLY body starts at byte {}", header.body_offset);

    Ok(PlyCloud {
        points,
        has_color,
        has_confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply::{PlyLayout, PlyWriter};
    use std::fs;

    #[test]
    fn test_round_trip_preserves_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("round.ply");
        let points: Vec<ColoredPoint> = (0..25)
            .map(|i| {
                let t = i as f32;
                ColoredPoint::new(
                    Vec3::new(t * 0.013_7, -t * 1.1, 3.0 / (t + 1.0)),
                    Rgb::new((i * 10) as u8, 255 - i as u8, (i * 3) as u8),
                    1.0 / (t + 1.0),
                )
            })
            .collect();

        let mut writer = PlyWriter::create(&path, PlyLayout::default()).unwrap();
        writer.write_header(points.len()).unwrap();
        writer.append(&points).unwrap();
        writer.finalize().unwrap();

        let cloud = read_ply(&path).unwrap();
        assert!(cloud.has_color);
        assert!(cloud.has_confidence);
        assert_eq!(cloud.len(), points.len());
        for (read, written) in cloud.points.iter().zip(&points) {
            assert_eq!(read.position, written.position);
            assert_eq!(read.color, written.color);
            assert_eq!(read.confidence, written.confidence);
        }
    }

    #[test]
    fn test_reordered_and_missing_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reordered.ply");
        fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 2\n\
             property uchar blue\nproperty float z\nproperty uchar red\n\
             property float x\nproperty uchar green\nproperty float y\n\
             end_header\n\
             3 0.5 1 1.5 2 2.5\n\
             30 -0.5 10 -1.5 20 -2.5\n",
        )
        .unwrap();

        let cloud = read_ply(&path).unwrap();
        assert!(cloud.has_color);
        assert!(!cloud.has_confidence);
        assert_eq!(cloud.points[0].position, Vec3::new(1.5, 2.5, 0.5));
        assert_eq!(cloud.points[0].color, Rgb::new(1, 2, 3));
        assert_eq!(cloud.points[1].color, Rgb::new(10, 20, 30));
        assert_eq!(cloud.points[1].confidence, 1.0);
    }

    #[test]
    fn test_positions_only_default_to_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bare.ply");
        fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 1\n\
             property float x\nproperty float y\nproperty float z\n\
             end_header\n1 2 3\n",
        )
        .unwrap();

        let cloud = read_ply(&path).unwrap();
        assert!(!cloud.has_color);
        assert_eq!(cloud.points[0].color, Rgb::SENTINEL);
        assert_eq!(cloud.points[0].confidence, 1.0);
    }
}
