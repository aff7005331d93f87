// Edge-profile similarity. The SHA-256 gate only catches byte-identical
// reposts; this pass catches the same picture re-encoded or lightly
// recompressed. Every candidate is reduced to the set of edge pixels of a
// grayscale 500x500 render, and two images are "similar" when a sampled
// subset of one profile's edge points lands on or near the other's edges.

use std::collections::{HashSet, VecDeque};

use crate::core::dedup::GateError;

/// Tuning knobs for edge extraction and comparison.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityConfig {
    /// Percentage of sampled points that must match for a similar verdict (0-100).
    pub match_percent: u8,
    /// Minimum luma value for a pixel to count as an edge (0-255).
    pub line_threshold: u8,
    /// Percentage of a profile's points sampled during comparison (1-100).
    pub sample_percent: u8,
    /// Resolution every image is normalized to before edge detection.
    pub dimensions: (u32, u32),
    /// Radius searched around a sampled point for a near match.
    pub near_radius: i32,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            match_percent: 90,
            line_threshold: 128,
            sample_percent: 10,
            dimensions: (500, 500),
            near_radius: 3,
        }
    }
}

/// The edge pixels of one normalized image.
#[derive(Debug, Clone)]
pub struct EdgeProfile {
    points: Vec<(u16, u16)>,
    lookup: HashSet<(u16, u16)>,
}

impl EdgeProfile {
    fn from_points(points: Vec<(u16, u16)>) -> Self {
        let lookup = points.iter().copied().collect();
        Self { points, lookup }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Is there an edge pixel at (x, y) or within `radius` of it?
    fn has_edge_near(&self, x: u16, y: u16, radius: i32) -> bool {
        if self.lookup.contains(&(x, y)) {
            return true;
        }
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 {
                    continue;
                }
                if self.lookup.contains(&(nx as u16, ny as u16)) {
                    return true;
                }
            }
        }
        false
    }
}

/// 3x3 edge-detection kernel (discrete Laplacian).
const EDGE_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 8.0, -1.0, -1.0, -1.0, -1.0];

/// Extracts edge profiles and compares them.
pub struct EdgeDetector {
    config: SimilarityConfig,
}

impl EdgeDetector {
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    /// Decode, normalize, and edge-detect a candidate image.
    pub fn profile(&self, image_bytes: &[u8]) -> Result<EdgeProfile, GateError> {
        let decoded =
            image::load_from_memory(image_bytes).map_err(|e| GateError::Decode(e.to_string()))?;

        let (width, height) = self.config.dimensions;
        let gray = decoded.to_luma8();
        let resized =
            image::imageops::resize(&gray, width, height, image::imageops::FilterType::Triangle);
        let edges = image::imageops::filter3x3(&resized, &EDGE_KERNEL);

        let mut points = Vec::new();
        for (x, y, pixel) in edges.enumerate_pixels() {
            if pixel.0[0] >= self.config.line_threshold {
                points.push((x as u16, y as u16));
            }
        }

        Ok(EdgeProfile::from_points(points))
    }

    /// Compare a sampled subset of `source` against `comparison`.
    ///
    /// Empty profiles never match anything: an image with no detectable edges
    /// carries no signal, and skipping fresh content is the failure direction
    /// we cannot accept.
    pub fn is_similar(&self, source: &EdgeProfile, comparison: &EdgeProfile) -> bool {
        if source.is_empty() || comparison.is_empty() {
            return false;
        }

        let step = (100 / self.config.sample_percent.max(1) as usize).max(1);
        let mut checked = 0usize;
        let mut hits = 0usize;

        for &(x, y) in source.points.iter().step_by(step) {
            checked += 1;
            if comparison.has_edge_near(x, y, self.config.near_radius) {
                hits += 1;
            }
        }

        if checked == 0 {
            return false;
        }

        let percent = (hits * 100) / checked;
        percent >= self.config.match_percent as usize
    }
}

/// Bounded ring of recently posted profiles. Oldest entries fall off once the
/// capacity (scaled to how much the scraper can see in a few cycles) is hit.
pub struct ProfileRing {
    profiles: VecDeque<EdgeProfile>,
    capacity: usize,
}

impl ProfileRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            profiles: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.profiles.len() > self.capacity {
            self.profiles.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Does the candidate look like anything we posted recently?
    pub fn matches(&self, detector: &EdgeDetector, candidate: &EdgeProfile) -> bool {
        self.profiles
            .iter()
            .any(|known| detector.is_similar(candidate, known))
    }

    pub fn push(&mut self, profile: EdgeProfile) {
        self.profiles.push_back(profile);
        while self.profiles.len() > self.capacity {
            self.profiles.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::io::Cursor;

    fn png_bytes(img: GrayImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    /// 500x500 black canvas with a white rectangle, so edge pixels sit on the
    /// rectangle border at predictable coordinates.
    fn rect_image(x0: u32, y0: u32, x1: u32, y1: u32) -> Vec<u8> {
        let mut img = GrayImage::from_pixel(500, 500, Luma([0]));
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        png_bytes(img)
    }

    fn detector() -> EdgeDetector {
        EdgeDetector::new(SimilarityConfig::default())
    }

    #[test]
    fn profile_finds_edges_on_shape_boundaries() {
        let det = detector();
        let profile = det.profile(&rect_image(100, 100, 300, 300)).unwrap();
        assert!(!profile.is_empty());
    }

    #[test]
    fn identical_images_are_similar() {
        let det = detector();
        let a = det.profile(&rect_image(100, 100, 300, 300)).unwrap();
        let b = det.profile(&rect_image(100, 100, 300, 300)).unwrap();
        assert!(det.is_similar(&a, &b));
    }

    #[test]
    fn disjoint_shapes_are_not_similar() {
        let det = detector();
        let a = det.profile(&rect_image(50, 50, 150, 150)).unwrap();
        let b = det.profile(&rect_image(300, 300, 400, 400)).unwrap();
        assert!(!det.is_similar(&a, &b));
    }

    #[test]
    fn featureless_images_never_match() {
        let det = detector();
        let blank = det
            .profile(&png_bytes(GrayImage::from_pixel(500, 500, Luma([0]))))
            .unwrap();
        let shape = det.profile(&rect_image(100, 100, 300, 300)).unwrap();

        assert!(blank.is_empty());
        assert!(!det.is_similar(&blank, &shape));
        assert!(!det.is_similar(&blank, &blank));
    }

    #[test]
    fn undecodable_bytes_fail_with_decode_error() {
        let det = detector();
        assert!(matches!(
            det.profile(b"not an image"),
            Err(GateError::Decode(_))
        ));
    }

    #[test]
    fn ring_evicts_oldest_when_capacity_shrinks() {
        let det = detector();
        let mut ring = ProfileRing::new(10);
        for i in 0..6u32 {
            let offset = i * 60;
            let profile = det
                .profile(&rect_image(offset + 10, 10, offset + 50, 50))
                .unwrap();
            ring.push(profile);
        }
        assert_eq!(ring.len(), 6);

        ring.set_capacity(3);
        assert_eq!(ring.len(), 3);

        // The newest entry survives eviction.
        let newest = det.profile(&rect_image(310, 10, 350, 50)).unwrap();
        assert!(ring.matches(&det, &newest));
    }
}
