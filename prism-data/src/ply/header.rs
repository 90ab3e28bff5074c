//! PLY header layout, parsing and in-place vertex count rewriting

use crate::ply::PlyError;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::debug;

/// Which optional properties a written cloud carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyLayout {
    /// Emit `property float confidence` after the color channels.
    pub with_confidence: bool,
    /// Some vertices are synthesized rather than measured; emits a
    /// [`SYNTHESIZED_COMMENT`] line.
    pub synthesized: bool,
}

/// Header comment marking clouds that contain jittered, non-measured points.
pub const SYNTHESIZED_COMMENT: &str =
    "synthesized: contains jittered points that are not measured geometry";

impl PlyLayout {
    pub fn colored() -> Self {
        Self {
            with_confidence: false,
            synthesized: false,
        }
    }

    pub fn with_confidence() -> Self {
        Self {
            with_confidence: true,
            synthesized: false,
        }
    }

    pub fn synthesized(mut self, synthesized: bool) -> Self {
        self.synthesized = synthesized;
        self
    }

    /// Full header text for `vertex_count` vertices, ending with a newline.
    pub fn header(&self, vertex_count: usize) -> String {
        let mut header = String::from("ply\nformat ascii 1.0\n");
        if self.synthesized {
            header.push_str(&format!("comment {SYNTHESIZED_COMMENT}\n"));
        }
        header.push_str(&format!("element vertex {vertex_count}\n"));
        header.push_str("property float x\nproperty float y\nproperty float z\n");
        header.push_str("property uchar red\nproperty uchar green\nproperty uchar blue\n");
        if self.with_confidence {
            header.push_str("property float confidence\n");
        }
        header.push_str("end_header\n");
        header
    }
}

impl Default for PlyLayout {
    fn default() -> Self {
        Self::with_confidence()
    }
}

/// The parts of a PLY header the point-cloud reader cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlyHeader {
    pub format: String,
    pub vertex_count: usize,
    /// Vertex property names in declaration order.
    pub properties: Vec<String>,
    /// Text of `comment` lines, without the keyword.
    pub comments: Vec<String>,
    /// Byte offset of the first body byte.
    pub body_offset: u64,
    /// Byte offset and length (without terminator) of the `element vertex` line.
    count_line: (u64, usize),
}

impl PlyHeader {
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.iter().any(|p| p == name)
    }
}

/// Parse the header of a PLY file.
pub fn read_header(path: impl AsRef<Path>) -> Result<PlyHeader, PlyError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut offset = 0u64;
    let mut line = String::new();

    let mut format = None;
    let mut vertex_count = None;
    let mut count_line = None;
    let mut properties = Vec::new();
    let mut comments = Vec::new();
    let mut in_vertex_element = false;
    let mut first = true;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Err(PlyError::Header("missing end_header".into()));
        }
        let line_offset = offset;
        offset += read as u64;
        let content = line.trim_end_matches(['\n', '\r']);
        let mut tokens = content.split_whitespace();

        if first {
            if content.trim() != "ply" {
                return Err(PlyError::Header("missing 'ply' magic".into()));
            }
            first = false;
            continue;
        }

        match tokens.next() {
            Some("format") => format = Some(tokens.collect::<Vec<_>>().join(" ")),
            Some("element") => {
                let name = tokens.next();
                in_vertex_element = name == Some("vertex");
                if in_vertex_element {
                    let count = tokens
                        .next()
                        .and_then(|n| n.parse::<usize>().ok())
                        .ok_or_else(|| PlyError::Header(format!("bad vertex count: {content}")))?;
                    vertex_count = Some(count);
                    count_line = Some((line_offset, content.len()));
                }
            }
            Some("property") if in_vertex_element => {
                if let Some(name) = tokens.last() {
                    properties.push(name.to_string());
                }
            }
            Some("comment") => {
                let text = content.trim_start().trim_start_matches("comment");
                comments.push(text.trim().to_string());
            }
            Some("end_header") => break,
            _ => {}
        }
    }

    Ok(PlyHeader {
        format: format.ok_or_else(|| PlyError::Header("missing format line".into()))?,
        vertex_count: vertex_count
            .ok_or_else(|| PlyError::Header("missing vertex element".into()))?,
        properties,
        comments,
        body_offset: offset,
        count_line: count_line.unwrap_or_default(),
    })
}

/// Rewrite the `element vertex N` line of an existing PLY file.
///
/// When the new line has the same width it is overwritten in place;
/// otherwise the file is rebuilt next to the original and renamed over it.
/// Rewriting with the count already present leaves the file byte-identical.
pub fn rewrite_vertex_count(path: impl AsRef<Path>, count: usize) -> Result<(), PlyError> {
    let path = path.as_ref();
    let header = read_header(path)?;
    let (offset, old_len) = header.count_line;
    let line = format!("element vertex {count}");

    if line.len() == old_len {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        debug!("Rewrote vertex count in place: {}", count);
        return Ok(());
    }

    let tmp = path.with_extension("ply.tmp");
    {
        let mut src = BufReader::new(File::open(path)?);
        let mut dst = BufWriter::new(File::create(&tmp)?);

        let mut head = vec![0u8; offset as usize];
        src.read_exact(&mut head)?;
        dst.write_all(&head)?;
        dst.write_all(line.as_bytes())?;
        src.seek_relative(old_len as i64)?;
        io::copy(&mut src, &mut dst)?;
        dst.flush()?;
    }
    fs::rename(&tmp, path)?;
    debug!(
        "Rebuilt PLY file for vertex count {} ({} -> {} header bytes)",
        count,
        old_len,
        line.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_order() {
        let header = PlyLayout::with_confidence().header(3);
        let lines: Vec<&str> = header.lines().collect();
        assert_eq!(
            lines,
            vec![
                "ply",
                "format ascii 1.0",
                "element vertex 3",
                "property float x",
                "property float y",
                "property float z",
                "property uchar red",
                "property uchar green",
                "property uchar blue",
                "property float confidence",
                "end_header",
            ]
        );
        assert!(!PlyLayout::colored().header(3).contains("confidence"));
    }

    #[test]
    fn test_read_header_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.ply");
        fs::write(&path, PlyLayout::colored().header(12)).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.format, "ascii 1.0");
        assert_eq!(header.vertex_count, 12);
        assert_eq!(header.properties, vec!["x", "y", "z", "red", "green", "blue"]);
        assert!(!header.has_property("confidence"));
        assert_eq!(header.body_offset as usize, PlyLayout::colored().header(12).len());
    }

    #[test]
    fn test_synthesized_comment_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jittered.ply");
        let layout = PlyLayout::colored().synthesized(true);
        fs::write(&path, layout.header(2)).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.comments, vec![SYNTHESIZED_COMMENT.to_string()]);
        assert_eq!(header.vertex_count, 2);
        assert!(read_header_of(PlyLayout::colored(), &dir).comments.is_empty());
    }

    fn read_header_of(layout: PlyLayout, dir: &tempfile::TempDir) -> PlyHeader {
        let path = dir.path().join("plain.ply");
        fs::write(&path, layout.header(0)).unwrap();
        read_header(&path).unwrap()
    }

    #[test]
    fn test_read_header_rejects_non_ply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.ply");
        fs::write(&path, "solid cube\nend_header\n").unwrap();
        assert!(matches!(read_header(&path), Err(PlyError::Header(_))));
    }

    #[test]
    fn test_rewrite_count_changes_width() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grow.ply");
        let body = "0 0 0 1 2 3\n";
        fs::write(&path, format!("{}{}", PlyLayout::colored().header(9), body)).unwrap();

        rewrite_vertex_count(&path, 1000).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("element vertex 1000\n"));
        assert!(text.ends_with(body));
        assert_eq!(read_header(&path).unwrap().vertex_count, 1000);
    }

    #[test]
    fn test_rewrite_count_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.ply");
        fs::write(&path, format!("{}1 2 3 4 5 6\n", PlyLayout::colored().header(500))).unwrap();

        rewrite_vertex_count(&path, 1).unwrap();
        let once = fs::read(&path).unwrap();
        rewrite_vertex_count(&path, 1).unwrap();
        let twice = fs::read(&path).unwrap();
        assert_eq!(once, twice);
    }
}
