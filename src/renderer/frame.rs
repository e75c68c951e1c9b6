//! Frames in flight
//!
//! The CPU records frame `n` while the GPU may still execute up to N-1 earlier frames.
//! Each slot remembers whether its last submission is still pending; starting a frame
//! in a busy slot is where a real backend waits on that slot's fence.

use crate::gpu::DeviceIdle;

use super::error::{frame_config_error, RendererResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameData {
    /// Frame number last submitted from this slot
    pub submitted: Option<u64>,
    pub in_flight: bool,
}

#[derive(Debug)]
pub struct FrameSync {
    frames: Vec<FrameData>,
    frame_number: u64,
}

impl FrameSync {
    pub fn new(frames_in_flight: usize) -> RendererResult<Self> {
        if frames_in_flight < 2 {
            return Err(frame_config_error(frames_in_flight));
        }
        Ok(Self {
            frames: vec![FrameData::default(); frames_in_flight],
            frame_number: 0,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Frames submitted so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn current_index(&self) -> usize {
        (self.frame_number % self.frames.len() as u64) as usize
    }

    pub fn current(&self) -> &FrameData {
        &self.frames[self.current_index()]
    }

    /// Claim the current slot, waiting out its previous submission
    pub fn begin_frame(&mut self) -> usize {
        let index = self.current_index();
        let frame = &mut self.frames[index];
        if frame.in_flight {
            log::trace!(
                "[FrameSync::begin_frame] Slot {} waits for frame {:?}",
                index,
                frame.submitted
            );
            frame.in_flight = false;
        }
        index
    }

    /// Submit the current slot and advance
    pub fn end_frame(&mut self) {
        let index = self.current_index();
        let frame_number = self.frame_number;
        let frame = &mut self.frames[index];
        frame.submitted = Some(frame_number);
        frame.in_flight = true;
        self.frame_number += 1;
    }

    /// Nothing is in flight once the device is idle
    pub fn mark_idle(&mut self, _idle: &DeviceIdle) {
        for frame in &mut self.frames {
            frame.in_flight = false;
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.frames.iter().filter(|frame| frame.in_flight).count()
    }
}
