//! Deferred image hand-off between the worker and the interactive thread.
//!
//! An [`ImageSlot`] moves through `Empty → Loading → Ready → Empty`. The
//! interactive thread marks a slot loading and queues a decode job; the
//! worker assigns the decoded buffer; the interactive thread polls
//! [`ImageSlot::transfer`] each frame and uploads whatever it receives.
//!
//! The state tag is a single atomic. Every transition is one
//! compare-exchange on it, so polling an empty or loading slot never touches
//! the buffer lock, and a consumer only locks the buffer after the producer
//! has published `Ready`.

// Image dimensions are far below 2^52
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::{SceneError, SceneResult};

/// State of an [`ImageSlot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SlotState {
    /// No image and no load in flight.
    Empty = 0,
    /// A decode job is in flight.
    Loading = 1,
    /// A decoded buffer is waiting to be transferred.
    Ready = 2,
}

impl SlotState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Ready,
            _ => Self::Empty,
        }
    }
}

/// A decoded 8-bit image, row-major and channel-interleaved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Wraps raw pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Image`] if `channels` is zero or `data` does not
    /// hold exactly `width * height * channels` bytes.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> SceneResult<Self> {
        if channels == 0 {
            return Err(SceneError::image("image must have at least one channel"));
        }
        let expected = width as usize * height as usize * usize::from(channels);
        if data.len() != expected {
            return Err(SceneError::image(format!(
                "expected {expected} bytes for {width}x{height}x{channels}, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Image width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of interleaved channels.
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// Raw pixel bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns the image with its width reduced to a multiple of 4.
    ///
    /// Texture upload requires row widths that are multiples of 4. Columns
    /// are resampled with an area-average filter to `(width / 4) * 4`;
    /// rows are untouched. Images already aligned are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Image`] for images narrower than 4 pixels.
    pub fn with_aligned_width(self) -> SceneResult<Self> {
        if self.width % 4 == 0 {
            return Ok(self);
        }
        let dst_width = (self.width / 4) * 4;
        if dst_width == 0 {
            return Err(SceneError::image(format!(
                "image width {} is below the 4-pixel minimum",
                self.width
            )));
        }
        Ok(self.resample_columns(dst_width))
    }

    fn resample_columns(&self, dst_width: u32) -> Self {
        let src_w = self.width as usize;
        let dst_w = dst_width as usize;
        let ch = usize::from(self.channels);
        let scale = src_w as f64 / dst_w as f64;

        let mut out = Vec::with_capacity(dst_w * self.height as usize * ch);
        let mut acc = vec![0.0_f64; ch];
        for row in self.data.chunks_exact(src_w * ch) {
            for x in 0..dst_w {
                let start = x as f64 * scale;
                let end = start + scale;
                acc.iter_mut().for_each(|a| *a = 0.0);

                let first = start.floor() as usize;
                let last = (end.ceil() as usize).min(src_w);
                for sx in first..last {
                    let weight = (end.min(sx as f64 + 1.0) - start.max(sx as f64)).max(0.0);
                    let pixel = &row[sx * ch..(sx + 1) * ch];
                    for (a, &v) in acc.iter_mut().zip(pixel) {
                        *a += weight * f64::from(v);
                    }
                }
                out.extend(acc.iter().map(|a| (a / scale).round().clamp(0.0, 255.0) as u8));
            }
        }

        Self {
            width: dst_width,
            height: self.height,
            channels: self.channels,
            data: out,
        }
    }
}

/// Tri-state holder for an image decoded off the interactive thread.
#[derive(Debug)]
pub struct ImageSlot {
    state: AtomicU8,
    buffer: Mutex<Option<ImageBuffer>>,
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSlot {
    /// Creates an empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(SlotState::Empty as u8),
            buffer: Mutex::new(None),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SlotState {
        SlotState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Empty → Loading`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidSlotTransition`] unless the slot is empty.
    pub fn mark_loading(&self) -> SceneResult<()> {
        self.transition(SlotState::Empty, SlotState::Loading, "mark loading")
    }

    /// `Loading → Ready`, installing `image` after aligning its width.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidSlotTransition`] unless the slot is
    /// loading, or [`SceneError::Image`] if the image cannot be aligned (the
    /// slot then reverts to empty).
    pub fn assign(&self, image: ImageBuffer) -> SceneResult<()> {
        let state = self.state();
        if state != SlotState::Loading {
            warn!(?state, "Image slot assign outside loading state");
            return Err(SceneError::InvalidSlotTransition {
                operation: "assign",
                state,
            });
        }

        let image = match image.with_aligned_width() {
            Ok(image) => image,
            Err(err) => {
                self.fail_loading();
                return Err(err);
            }
        };

        {
            let mut buffer = self.lock();
            // release() stores Empty while holding this lock
            let state = self.state();
            if state != SlotState::Loading {
                debug!(?state, "Image slot released while the image was resampled");
                return Err(SceneError::InvalidSlotTransition {
                    operation: "assign",
                    state,
                });
            }
            *buffer = Some(image);
        }

        if let Err(err) = self.transition(SlotState::Loading, SlotState::Ready, "assign") {
            self.lock().take();
            return Err(err);
        }
        Ok(())
    }

    /// `Ready → Empty`, handing the buffer to the caller.
    ///
    /// Returns `None` without side effects when the slot is not ready.
    /// Intended for the interactive thread only. The producer drops the
    /// buffer lock before it publishes `Ready`, so this never waits on an
    /// in-flight [`ImageSlot::assign`].
    #[must_use]
    pub fn transfer(&self) -> Option<ImageBuffer> {
        if self.state() != SlotState::Ready {
            return None;
        }
        let mut buffer = self.lock();
        self.state
            .compare_exchange(
                SlotState::Ready as u8,
                SlotState::Empty as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        buffer.take()
    }

    /// `Loading → Empty` after a failed decode. No effect in other states.
    pub fn fail_loading(&self) {
        if self
            .transition(SlotState::Loading, SlotState::Empty, "fail loading")
            .is_ok()
        {
            debug!("Image slot reverted to empty after failed load");
        }
    }

    /// Drops any buffer and forces the slot empty. Idempotent.
    pub fn release(&self) {
        let mut buffer = self.lock();
        self.state.store(SlotState::Empty as u8, Ordering::Release);
        *buffer = None;
    }

    fn transition(&self, from: SlotState, to: SlotState, operation: &'static str) -> SceneResult<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| SceneError::InvalidSlotTransition {
                operation,
                state: SlotState::from_u8(actual),
            })
    }

    fn lock(&self) -> MutexGuard<'_, Option<ImageBuffer>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn gray(width: u32, height: u32) -> ImageBuffer {
        let data = (0..width * height).map(|i| (i % 251) as u8).collect();
        ImageBuffer::new(width, height, 1, data).unwrap()
    }

    #[test]
    fn test_buffer_rejects_bad_length() {
        assert!(ImageBuffer::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(ImageBuffer::new(2, 2, 0, vec![]).is_err());
        assert!(ImageBuffer::new(2, 2, 3, vec![0; 12]).is_ok());
    }

    #[test]
    fn test_aligned_width_untouched() {
        let img = gray(8, 2);
        assert_eq!(img.clone().with_aligned_width().unwrap(), img);
    }

    #[test]
    fn test_aligned_width_area_average() {
        // 5 columns -> 4 columns, scale 1.25
        let data = vec![0, 100, 200, 100, 0];
        let img = ImageBuffer::new(5, 1, 1, data).unwrap().with_aligned_width().unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.height(), 1);
        // [0, 1.25): 0*1 + 100*0.25 = 25 / 1.25 = 20
        assert_eq!(img.data()[0], 20);
        // [1.25, 2.5): 100*0.75 + 200*0.5 = 175 / 1.25 = 140
        assert_eq!(img.data()[1], 140);
        assert_eq!(img.data()[2], 140);
        assert_eq!(img.data()[3], 20);
    }

    #[test]
    fn test_aligned_width_multichannel_constant() {
        let img = ImageBuffer::new(7, 3, 3, vec![77; 7 * 3 * 3]).unwrap();
        let img = img.with_aligned_width().unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(img.data().len(), 4 * 3 * 3);
        assert!(img.data().iter().all(|&v| v == 77));
    }

    #[test]
    fn test_too_narrow_image_fails() {
        assert!(gray(3, 3).with_aligned_width().is_err());
    }

    #[test]
    fn test_state_machine() {
        let slot = ImageSlot::new();
        assert_eq!(slot.state(), SlotState::Empty);

        // assign on Empty fails
        assert!(slot.assign(gray(4, 4)).is_err());
        assert_eq!(slot.state(), SlotState::Empty);
        // transfer on Empty is a no-op
        assert!(slot.transfer().is_none());

        slot.mark_loading().unwrap();
        assert_eq!(slot.state(), SlotState::Loading);
        // mark_loading on non-Empty fails
        assert!(slot.mark_loading().is_err());
        // transfer on Loading is a no-op
        assert!(slot.transfer().is_none());
        assert_eq!(slot.state(), SlotState::Loading);

        slot.assign(gray(6, 2)).unwrap();
        assert_eq!(slot.state(), SlotState::Ready);
        assert!(slot.mark_loading().is_err());
        assert!(slot.assign(gray(4, 4)).is_err());

        let img = slot.transfer().unwrap();
        assert_eq!(img.width(), 4);
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.transfer().is_none());
    }

    #[test]
    fn test_release_is_idempotent() {
        let slot = ImageSlot::new();
        slot.release();
        assert_eq!(slot.state(), SlotState::Empty);

        slot.mark_loading().unwrap();
        slot.assign(gray(4, 4)).unwrap();
        slot.release();
        slot.release();
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.transfer().is_none());
    }

    #[test]
    fn test_failed_alignment_reverts_to_empty() {
        let slot = ImageSlot::new();
        slot.mark_loading().unwrap();
        assert!(slot.assign(gray(2, 2)).is_err());
        assert_eq!(slot.state(), SlotState::Empty);
    }

    #[test]
    fn test_fail_loading_only_from_loading() {
        let slot = ImageSlot::new();
        slot.mark_loading().unwrap();
        slot.assign(gray(4, 1)).unwrap();
        slot.fail_loading();
        assert_eq!(slot.state(), SlotState::Ready);

        let _ = slot.transfer();
        slot.mark_loading().unwrap();
        slot.fail_loading();
        assert_eq!(slot.state(), SlotState::Empty);
    }

    #[test]
    fn test_assign_after_release_leaves_slot_empty() {
        let slot = ImageSlot::new();
        slot.mark_loading().unwrap();
        slot.release();
        assert!(slot.assign(gray(4, 4)).is_err());
        assert_eq!(slot.state(), SlotState::Empty);
        assert!(slot.lock().is_none());
    }

    #[test]
    fn test_ready_slot_buffer_is_unlocked() {
        for _ in 0..64 {
            let slot = Arc::new(ImageSlot::new());
            slot.mark_loading().unwrap();

            let producer = {
                let slot = Arc::clone(&slot);
                thread::spawn(move || slot.assign(gray(12, 8)))
            };

            while slot.state() != SlotState::Ready {
                thread::yield_now();
            }
            // The producer published Ready only after dropping its guard
            let guard = slot.buffer.try_lock().expect("buffer lock held after Ready");
            assert!(guard.is_some());
            drop(guard);

            producer.join().unwrap().unwrap();
            assert_eq!(slot.transfer().unwrap().width(), 12);
        }
    }

    #[test]
    fn test_cross_thread_handoff() {
        let slot = Arc::new(ImageSlot::new());
        slot.mark_loading().unwrap();

        let producer = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.assign(gray(16, 16)))
        };

        let mut received = None;
        while received.is_none() {
            received = slot.transfer();
            thread::yield_now();
        }
        producer.join().unwrap().unwrap();
        assert_eq!(received.unwrap().width(), 16);
        assert_eq!(slot.state(), SlotState::Empty);
    }
}
