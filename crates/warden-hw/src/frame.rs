//! Frame type and pixel conversions: YUYV and GREY to BGR, BGR to RGB.

/// A captured colour frame, BGR24 packed (3 bytes per pixel, row-major).
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl Frame {
    /// Build a frame from BGR bytes, checking the buffer length.
    pub fn from_bgr(data: Vec<u8>, width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// Uniform frame of a single BGR colour.
    pub fn solid(width: u32, height: u32, bgr: [u8; 3], sequence: u32) -> Self {
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert packed YUYV (4:2:2) to BGR24 using BT.601 full-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = width as usize * height as usize * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut bgr = Vec::with_capacity(width as usize * height as usize * 3);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0] as f32, quad[2] as f32] {
            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;
            bgr.extend_from_slice(&[clamp_u8(b), clamp_u8(g), clamp_u8(r)]);
        }
    }
    Ok(bgr)
}

/// Expand 8-bit grayscale to BGR24 by replicating each sample.
pub fn grey_to_bgr(gray: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if gray.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: gray.len(),
        });
    }
    Ok(gray[..pixels].iter().flat_map(|&p| [p, p, p]).collect())
}

/// Swap BGR24 to RGB24.
pub fn bgr_to_rgb(bgr: &[u8]) -> Vec<u8> {
    bgr.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect()
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_gray() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        assert_eq!(bgr, vec![100, 100, 100, 200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and green down; blue unaffected with neutral U.
        let yuyv = vec![100, 128, 100, 228];
        let bgr = yuyv_to_bgr(&yuyv, 2, 1).unwrap();
        let (b, g, r) = (bgr[0], bgr[1], bgr[2]);
        assert_eq!(b, 100);
        assert!(r > 200, "r = {r}");
        assert!(g < 50, "g = {g}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(yuyv_to_bgr(&[100, 128], 2, 1).is_err());
    }

    #[test]
    fn test_grey_to_bgr() {
        let bgr = grey_to_bgr(&[5, 9], 2, 1).unwrap();
        assert_eq!(bgr, vec![5, 5, 5, 9, 9, 9]);
    }

    #[test]
    fn test_bgr_to_rgb() {
        assert_eq!(bgr_to_rgb(&[1, 2, 3, 4, 5, 6]), vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn test_from_bgr_checks_length() {
        assert!(Frame::from_bgr(vec![0; 12], 2, 2, 0).is_ok());
        assert!(Frame::from_bgr(vec![0; 10], 2, 2, 0).is_err());
    }

    #[test]
    fn test_solid_frame() {
        let f = Frame::solid(4, 4, [128, 64, 32], 0);
        assert_eq!(f.data.len(), 48);
        assert_eq!(&f.data[..3], &[128, 64, 32]);
    }
}
