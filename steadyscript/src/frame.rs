//! C1: frame source. Owns the capture device and yields raw frames.
//!
//! Grounded on the teacher's `ci2`/`ci2-async` camera-backend traits
//! (`Camera::frame()` is a blocking call on a dedicated thread, wrapped by
//! an async handle upstream) but specialized to a single always-available
//! backend: a default Video4Linux2 webcam, via the `v4l` crate (the
//! pack's closest match for generic USB webcam capture; the teacher's own
//! `ci2-*` backends all target proprietary machine-vision SDKs that do not
//! apply to a commodity webcam).

use crate::error::{Error, Result};

/// A single decoded BGR24 video frame. Transient: produced by the capture
/// task and consumed within one pipeline tick (spec.md §3).
#[derive(Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Interleaved BGR8 pixel data, row-major, no padding.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), (width * height * 3) as usize);
        Self { width, height, data }
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let idx = ((y * self.width + x) * 3) as usize;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }
}

/// Blocking contract for a capture device (spec.md C1). Implementations
/// run on a dedicated thread; the pipeline task never calls `read`
/// directly, only through [`crate::pipeline::spawn_capture_thread`].
pub trait FrameSource: Send {
    /// Blocks until a frame is available. Returns `TransientCapture` for a
    /// recoverable single-frame failure (caller reuses the previous
    /// frame); any other error is treated as fatal by the caller.
    fn read(&mut self) -> Result<Frame>;

    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;
pub const TARGET_FPS: u32 = 30;

#[cfg(feature = "camera-v4l2")]
pub mod v4l2 {
    use super::*;
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::prelude::*;
    use v4l::video::Capture;
    use v4l::FourCC;

    /// Captures 640x480@30fps BGR frames from a Video4Linux2 device.
    pub struct V4l2FrameSource {
        stream: MmapStream<'static>,
        width: u32,
        height: u32,
        last_good: Option<Frame>,
    }

    impl V4l2FrameSource {
        /// Opens `/dev/video{camera_index}` and negotiates the format
        /// fixed by spec.md C1 (640x480 @ 30fps). Returns
        /// [`Error::DeviceUnavailable`] if the device cannot be opened or
        /// the format cannot be negotiated -- both are fatal at startup
        /// per spec.md §7.
        pub fn open(camera_index: usize) -> Result<Self> {
            let dev = Device::new(camera_index)
                .map_err(|e| Error::DeviceUnavailable(format!("/dev/video{camera_index}: {e}")))?;

            let mut fmt = dev
                .format()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
            fmt.width = super::DEFAULT_WIDTH;
            fmt.height = super::DEFAULT_HEIGHT;
            fmt.fourcc = FourCC::new(b"BGR3");
            let fmt = dev
                .set_format(&fmt)
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

            let mut params = dev
                .params()
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
            params.interval = v4l::Fraction::new(1, super::TARGET_FPS);
            dev.set_params(&params)
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

            let stream = MmapStream::with_buffers(&dev, Type::VideoCapture, 4)
                .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

            Ok(Self {
                stream,
                width: fmt.width,
                height: fmt.height,
                last_good: None,
            })
        }
    }

    impl FrameSource for V4l2FrameSource {
        fn read(&mut self) -> Result<Frame> {
            match self.stream.next() {
                Ok((buf, _meta)) => {
                    let frame = Frame::new(self.width, self.height, buf.to_vec());
                    self.last_good = Some(frame.clone());
                    Ok(frame)
                }
                Err(e) => {
                    if let Some(prev) = &self.last_good {
                        tracing::warn!("transient capture error, reusing previous frame: {e}");
                        Ok(prev.clone())
                    } else {
                        Err(Error::TransientCapture(e.to_string()))
                    }
                }
            }
        }

        fn width(&self) -> u32 {
            self.width
        }

        fn height(&self) -> u32 {
            self.height
        }
    }
}

/// A deterministic frame source used by tests and by the pipeline when no
/// camera is configured. Produces solid-color frames with an optional
/// colored-marker disc at a caller-supplied position, letting integration
/// tests drive the detector/session controller without real hardware.
pub struct SyntheticFrameSource {
    width: u32,
    height: u32,
    background: (u8, u8, u8),
    marker_bgr: (u8, u8, u8),
    positions: std::collections::VecDeque<Option<(i32, i32)>>,
    marker_radius: i32,
}

impl SyntheticFrameSource {
    pub fn new(
        width: u32,
        height: u32,
        marker_bgr: (u8, u8, u8),
        marker_radius: i32,
        positions: Vec<Option<(i32, i32)>>,
    ) -> Self {
        Self {
            width,
            height,
            background: (40, 40, 40),
            marker_bgr,
            positions: positions.into(),
            marker_radius,
        }
    }

    fn render(&self, center: Option<(i32, i32)>) -> Frame {
        let mut data = vec![0u8; (self.width * self.height * 3) as usize];
        for px in data.chunks_exact_mut(3) {
            px[0] = self.background.0;
            px[1] = self.background.1;
            px[2] = self.background.2;
        }
        if let Some((cx, cy)) = center {
            let r2 = self.marker_radius * self.marker_radius;
            for y in (cy - self.marker_radius).max(0)..(cy + self.marker_radius).min(self.height as i32) {
                for x in (cx - self.marker_radius).max(0)..(cx + self.marker_radius).min(self.width as i32)
                {
                    let dx = x - cx;
                    let dy = y - cy;
                    if dx * dx + dy * dy <= r2 {
                        let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
                        data[idx] = self.marker_bgr.0;
                        data[idx + 1] = self.marker_bgr.1;
                        data[idx + 2] = self.marker_bgr.2;
                    }
                }
            }
        }
        Frame::new(self.width, self.height, data)
    }
}

impl FrameSource for SyntheticFrameSource {
    fn read(&mut self) -> Result<Frame> {
        let center = self.positions.pop_front().unwrap_or(None);
        Ok(self.render(center))
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}
