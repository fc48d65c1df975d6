//! Visual state of the avatar.
//!
//! The remote video track is muted while the avatar idles and unmuted while it
//! speaks. A mute only switches back to the idle visual after a delay, so the short
//! gaps between sentences do not flicker. The delay itself is run by the caller:
//! [`Playback::mute`] hands out an epoch and [`Playback::idle_elapsed`] applies it
//! unless a newer mute or unmute happened meanwhile.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playback {
    started: bool,
    muted: bool,
    playing: bool,
    epoch: u64,
}

impl Default for Playback {
    fn default() -> Self {
        Self {
            started: false,
            muted: true,
            playing: false,
            epoch: 0,
        }
    }
}

impl Playback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the conversation started. Returns true when the avatar started speaking.
    pub fn start(&mut self) -> bool {
        self.started = true;
        if self.muted {
            return false;
        }
        self.play()
    }

    /// Returns true when the avatar started speaking.
    pub fn unmute(&mut self) -> bool {
        self.muted = false;
        self.epoch += 1;
        if !self.started {
            return false;
        }
        self.play()
    }

    /// Returns the epoch to pass to [`Self::idle_elapsed`] once the idle delay passed.
    pub fn mute(&mut self) -> u64 {
        self.muted = true;
        self.epoch += 1;
        self.epoch
    }

    /// Returns true when the avatar went back to idle.
    pub fn idle_elapsed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || !self.muted || !self.playing {
            return false;
        }
        self.playing = false;
        true
    }

    fn play(&mut self) -> bool {
        let started_speaking = !self.playing;
        self.playing = true;
        started_speaking
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn idle_visible(&self) -> bool {
        !self.playing
    }

    /// Input stays closed while the avatar answers a started conversation.
    pub fn input_enabled(&self) -> bool {
        !(self.playing && self.started)
    }
}
