// THEORY:
// The `frame` module is the data foundation of the engine. A `FrameSequence` is a
// "dumb", immutable container for the decoded raster frames of one clip, in
// temporal order. Every other layer only ever borrows from it.
//
// Key architectural principles:
// 1.  **Single Owner**: The sequence exclusively owns its frames. Consumers get
//     `&RgbImage` views and must clone before mutating anything.
// 2.  **Validated Once**: The invariants (non-empty, uniform dimensions) are checked
//     at construction, so the detection and compositing layers never need to
//     re-check them per frame.
// 3.  **Decoding Is Elsewhere**: Turning a video into frames belongs to a
//     `FrameSource`. The engine only defines the contract; `ImageDirectorySource`
//     is a simple stand-in that reads still images from a directory.

use crate::error::{EngineError, EngineResult};
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A single decoded frame: 8-bit, three channel.
pub type Frame = RgbImage;

/// An ordered, non-empty, immutable sequence of equally sized frames.
#[derive(Debug, Clone)]
pub struct FrameSequence {
    frames: Vec<Frame>,
}

impl FrameSequence {
    /// Builds a sequence, rejecting empty input and frames whose dimensions
    /// differ from frame 0.
    pub fn new(frames: Vec<Frame>) -> EngineResult<Self> {
        let first = frames.first().ok_or(EngineError::EmptySource)?;
        let expected = first.dimensions();
        for (index, frame) in frames.iter().enumerate().skip(1) {
            if frame.dimensions() != expected {
                return Err(EngineError::DimensionMismatch {
                    index,
                    expected,
                    actual: frame.dimensions(),
                });
            }
        }
        Ok(Self { frames })
    }

    /// Drains a frame source into a validated sequence.
    pub fn load<S: FrameSource + ?Sized>(source: &mut S) -> EngineResult<Self> {
        let frames = source.read_frames()?;
        let sequence = Self::new(frames)?;
        info!(frames = sequence.len(), "Loaded frame sequence");
        Ok(sequence)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Always false for a constructed sequence; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// The first frame, which seeds every composite.
    pub fn first(&self) -> &Frame {
        &self.frames[0]
    }

    pub fn width(&self) -> u32 {
        self.first().width()
    }

    pub fn height(&self) -> u32 {
        self.first().height()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }
}

/// Produces the raw frames of one clip, in temporal order.
///
/// Implementations fail with `SourceOpen` when the underlying source cannot be
/// opened and with `EmptySource` when it yields nothing.
pub trait FrameSource {
    fn read_frames(&mut self) -> EngineResult<Vec<Frame>>;
}

impl FrameSource for Vec<Frame> {
    fn read_frames(&mut self) -> EngineResult<Vec<Frame>> {
        if self.is_empty() {
            return Err(EngineError::EmptySource);
        }
        Ok(std::mem::take(self))
    }
}

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tif"];

/// Reads every still image in a directory, ordered by file name.
#[derive(Debug, Clone)]
pub struct ImageDirectorySource {
    dir: PathBuf,
}

impl ImageDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn frame_paths(&self) -> EngineResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| EngineError::SourceOpen {
            path: self.dir.clone(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| EngineError::SourceOpen {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageDirectorySource {
    fn read_frames(&mut self) -> EngineResult<Vec<Frame>> {
        let paths = self.frame_paths()?;
        if paths.is_empty() {
            return Err(EngineError::EmptySource);
        }

        let mut frames = Vec::with_capacity(paths.len());
        for (index, path) in paths.iter().enumerate() {
            debug!(index, path = %path.display(), "Decoding frame");
            let frame = image::open(path)
                .map_err(|e| EngineError::frame_decode(index, e.to_string()))?
                .to_rgb8();
            frames.push(frame);
        }
        Ok(frames)
    }
}

/// `clip.mp4` becomes `clip_interp.png`.
pub fn suggested_output_name(source: &Path) -> String {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("composite");
    format!("{stem}_interp.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn empty_sequence_is_rejected() {
        assert!(matches!(
            FrameSequence::new(Vec::new()),
            Err(EngineError::EmptySource)
        ));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let frames = vec![RgbImage::new(20, 20), RgbImage::new(20, 10)];
        match FrameSequence::new(frames) {
            Err(EngineError::DimensionMismatch { index, .. }) => assert_eq!(index, 1),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn load_drains_an_in_memory_source() {
        let mut source = vec![RgbImage::from_pixel(4, 3, Rgb([9, 9, 9])); 3];
        let sequence = FrameSequence::load(&mut source).unwrap();
        assert_eq!(sequence.len(), 3);
        assert_eq!((sequence.width(), sequence.height()), (4, 3));
        assert!(source.is_empty());
    }

    #[test]
    fn empty_in_memory_source_is_a_content_error() {
        let mut source: Vec<Frame> = Vec::new();
        assert!(matches!(
            FrameSequence::load(&mut source),
            Err(EngineError::EmptySource)
        ));
    }

    #[test]
    fn missing_directory_is_an_open_error() {
        let mut source = ImageDirectorySource::new("/definitely/not/a/real/dir");
        assert!(matches!(
            source.read_frames(),
            Err(EngineError::SourceOpen { .. })
        ));
    }

    #[test]
    fn directory_frames_are_read_in_name_order() {
        let dir = std::env::temp_dir().join(format!("trail_vision_frames_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        RgbImage::from_pixel(2, 2, Rgb([200, 0, 0]))
            .save(dir.join("frame_001.png"))
            .unwrap();
        RgbImage::from_pixel(2, 2, Rgb([0, 200, 0]))
            .save(dir.join("frame_000.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let frames = ImageDirectorySource::new(&dir).read_frames().unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].get_pixel(0, 0), &Rgb([0, 200, 0]));
        assert_eq!(frames[1].get_pixel(0, 0), &Rgb([200, 0, 0]));
    }

    #[test]
    fn output_name_follows_source_stem() {
        assert_eq!(suggested_output_name(Path::new("/tmp/dragon.mp4")), "dragon_interp.png");
        assert_eq!(suggested_output_name(Path::new("")), "composite_interp.png");
    }
}
