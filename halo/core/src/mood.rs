//! LED Moods
//!
//! A mood is a named animation state. Each mood maps to a fixed
//! [`MoodDescriptor`] (hue, brightness range, motion pattern) through a
//! closed table, so the waveform for a mood can never drift at runtime.
//!
//! # Table
//!
//! ```text
//! Mood        Hue   Range (0..1)        Motion
//! off         170   0.00 - 0.00         static
//! idle        170   0.08 - 0.24         breathe 2.0s
//! listening   170   0.00 - 0.78         spin 500ms, trail 3
//! thinking    170   0.12 - 0.31         breathe 2.5s
//! speaking    170   0.59 - 1.00         breathe 3.5s
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hue shared by every mood: blue on the 0-255 color wheel.
pub const BLUE_HUE: u8 = 170;

/// A named LED animation state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    /// All pixels dark
    #[default]
    Off,
    /// Dim, slow breathing
    Idle,
    /// Spinning head with a fading trail
    Listening,
    /// Medium breathing while a reply is prepared
    Thinking,
    /// Bright breathing while audio plays
    Speaking,
}

impl Mood {
    /// Every mood, in protocol order
    pub const ALL: [Mood; 5] = [
        Mood::Off,
        Mood::Idle,
        Mood::Listening,
        Mood::Thinking,
        Mood::Speaking,
    ];

    /// Wire name of the mood
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
        }
    }

    /// Waveform descriptor for this mood
    #[must_use]
    pub fn descriptor(self) -> MoodDescriptor {
        match self {
            Self::Off => MoodDescriptor {
                hue: BLUE_HUE,
                min: 0.0,
                max: 0.0,
                motion: Motion::Static,
            },
            Self::Idle => MoodDescriptor {
                hue: BLUE_HUE,
                min: 20.0 / 255.0,
                max: 60.0 / 255.0,
                motion: Motion::Breathe {
                    period: Duration::from_millis(2000),
                },
            },
            Self::Listening => MoodDescriptor {
                hue: BLUE_HUE,
                min: 0.0,
                max: 200.0 / 255.0,
                motion: Motion::Spin {
                    period: Duration::from_millis(500),
                    trail: 3,
                },
            },
            Self::Thinking => MoodDescriptor {
                hue: BLUE_HUE,
                min: 30.0 / 255.0,
                max: 80.0 / 255.0,
                motion: Motion::Breathe {
                    period: Duration::from_millis(2500),
                },
            },
            Self::Speaking => MoodDescriptor {
                hue: BLUE_HUE,
                min: 150.0 / 255.0,
                max: 1.0,
                motion: Motion::Breathe {
                    period: Duration::from_millis(3500),
                },
            },
        }
    }

    /// Whether the mood changes over time
    #[must_use]
    pub fn is_animated(self) -> bool {
        !matches!(self.descriptor().motion, Motion::Static)
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mood name that is not in the table
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("Unknown mood '{0}'")]
pub struct UnknownMood(pub String);

impl FromStr for Mood {
    type Err = UnknownMood;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| UnknownMood(name.to_string()))
    }
}

/// Motion pattern of a mood
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Motion {
    /// Constant brightness on every pixel
    Static,
    /// Whole strip oscillates between min and max once per period
    Breathe {
        /// Full cycle length
        period: Duration,
    },
    /// A head pixel travels around the strip once per period
    Spin {
        /// Time for one lap
        period: Duration,
        /// Lit pixels including the head
        trail: usize,
    },
}

/// Immutable waveform description of a mood
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoodDescriptor {
    /// Hue on the 0-255 color wheel
    pub hue: u8,
    /// Lowest normalized brightness
    pub min: f32,
    /// Highest normalized brightness
    pub max: f32,
    /// How brightness evolves over time
    pub motion: Motion,
}
