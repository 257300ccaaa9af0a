use super::buffer::SequenceBuffer;
use super::sequence::Sequence;
use crate::constants::{JITTER_BUFFER_SIZE, TICK_RATE};
use crate::state::{AvatarState, ObjectState};

/// A received state update, already resolved against its baselines.
#[derive(Debug, Clone, Default)]
pub struct JitterEntry {
    pub frame_number: u32,
    pub avatar_sample_time_offset: f32,
    pub avatars: Vec<AvatarState>,
    pub objects: Vec<(usize, ObjectState)>,
}

impl JitterEntry {
    pub fn sample_time(&self) -> f64 {
        self.frame_number as f64 / TICK_RATE as f64 + self.avatar_sample_time_offset as f64
    }
}

/// Holds received frames for a fixed delay before they are played out, and
/// interpolates avatar samples against a virtual clock.
#[derive(Debug)]
pub struct JitterBuffer {
    entries: SequenceBuffer<u32, JitterEntry>,
    delay_frames: u32,
    playout_frame: Option<u32>,
    time: f64,
    bracket: Option<(u32, u32)>,
}

impl JitterBuffer {
    pub fn new(delay_frames: u32) -> Self {
        Self {
            entries: SequenceBuffer::new(JITTER_BUFFER_SIZE),
            delay_frames,
            playout_frame: None,
            time: 0.0,
            bracket: None,
        }
    }

    pub fn reset(&mut self) {
        self.entries.reset();
        self.playout_frame = None;
        self.time = 0.0;
        self.bracket = None;
    }

    pub fn delay_frames(&self) -> u32 {
        self.delay_frames
    }

    /// Next frame [`JitterBuffer::advance`] will play, once started.
    pub fn playout_frame(&self) -> Option<u32> {
        self.playout_frame
    }

    pub fn add_packet(&mut self, entry: JitterEntry) -> bool {
        let frame = entry.frame_number;
        let playout = match self.playout_frame {
            Some(playout) => playout,
            None => {
                let playout = frame.back(self.delay_frames);
                self.playout_frame = Some(playout);
                self.time = playout as f64 / TICK_RATE as f64;
                playout
            }
        };

        if frame.less_than(playout) {
            log::debug!("jitter buffer dropped late frame {frame} (playing {playout})");
            return false;
        }
        if frame.distance(playout) as usize >= self.entries.capacity() {
            log::debug!("jitter buffer dropped frame {frame}, too far ahead of {playout}");
            return false;
        }
        if self.entries.exists(frame) {
            return false;
        }
        self.entries.insert_with(frame, entry)
    }

    pub fn get_entry(&self, frame: u32) -> Option<&JitterEntry> {
        self.entries.find(frame)
    }

    /// Steps playout forward one frame, returning that frame's entry if it
    /// arrived in time.
    pub fn advance(&mut self) -> Option<JitterEntry> {
        let frame = self.playout_frame?;
        self.playout_frame = Some(frame.next());
        self.entries.find(frame).cloned()
    }

    /// Moves the virtual clock by `dt` seconds and returns every avatar
    /// interpolated at that time.
    pub fn get_interpolated_avatar_state(&mut self, dt: f64) -> Vec<AvatarState> {
        if self.playout_frame.is_none() {
            return Vec::new();
        }
        self.time += dt;

        let bracket = match self.bracket.filter(|&(a, b)| self.bracket_valid(a, b)) {
            Some(bracket) => Some(bracket),
            None => {
                self.bracket = self.find_bracket();
                self.bracket
            }
        };

        match bracket {
            Some((a, b)) => self.interpolate(a, b),
            None => self.latest_before().map(|e| e.avatars.clone()).unwrap_or_default(),
        }
    }

    fn bracket_valid(&self, a: u32, b: u32) -> bool {
        match (self.entries.find(a), self.entries.find(b)) {
            (Some(from), Some(to)) => {
                from.sample_time() <= self.time && self.time < to.sample_time()
            }
            _ => false,
        }
    }

    fn find_bracket(&self) -> Option<(u32, u32)> {
        let mut from: Option<(u32, f64)> = None;
        let mut to: Option<(u32, f64)> = None;
        for (frame, entry) in self.entries.iter() {
            if entry.avatars.is_empty() {
                continue;
            }
            let time = entry.sample_time();
            if time <= self.time {
                if from.is_none_or(|(_, t)| time >= t) {
                    from = Some((frame, time));
                }
            } else if to.is_none_or(|(_, t)| time < t) {
                to = Some((frame, time));
            }
        }
        Some((from?.0, to?.0))
    }

    fn latest_before(&self) -> Option<&JitterEntry> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.avatars.is_empty() && entry.sample_time() <= self.time)
            .last()
            .map(|(_, entry)| entry)
    }

    fn interpolate(&self, a: u32, b: u32) -> Vec<AvatarState> {
        let (Some(from), Some(to)) = (self.entries.find(a), self.entries.find(b)) else {
            return Vec::new();
        };
        let span = to.sample_time() - from.sample_time();
        let t = if span > 0.0 {
            ((self.time - from.sample_time()) / span).clamp(0.0, 1.0) as f32
        } else {
            0.0
        };

        from.avatars
            .iter()
            .map(|avatar| {
                match to
                    .avatars
                    .iter()
                    .find(|other| other.client_index == avatar.client_index)
                {
                    Some(other) => AvatarState::interpolate(avatar, other, t),
                    None => *avatar,
                }
            })
            .collect()
    }
}
