use serde::{Deserialize, Serialize};

/// Which video streams of the input to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum VideoSelection {
    /// The first video stream of the first input
    First,
    /// Video stream by index among video streams
    Index(u32),
    All,
    None,
}

/// Which audio streams of the input to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum AudioSelection {
    /// Audio streams whose `language` tag equals this ISO 639-2 code
    Language(String),
    /// Audio stream by index among audio streams
    Index(u32),
    All,
    None,
}

/// Declarative description of the remux: which streams survive and which
/// disposition flags they carry. Interpreted by the transcoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSelectionSpec {
    pub video: VideoSelection,
    pub audio: AudioSelection,
    /// Mark the first kept audio stream as the default playback choice
    pub mark_audio_default: bool,
    pub include_subtitles: bool,
}

impl TrackSelectionSpec {
    /// First video stream plus every audio stream tagged with `language`.
    pub fn language(language: impl Into<String>) -> Self {
        Self {
            audio: AudioSelection::Language(language.into().to_lowercase()),
            ..Self::default()
        }
    }

    pub fn with_default_audio(mut self, mark: bool) -> Self {
        self.mark_audio_default = mark;
        self
    }

    pub fn with_subtitles(mut self, include: bool) -> Self {
        self.include_subtitles = include;
        self
    }

    /// Check the selection can be expressed as a stream specifier.
    pub fn validate(&self) -> Result<(), String> {
        if let AudioSelection::Language(tag) = &self.audio {
            if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(format!("Invalid audio language tag: {:?}", tag));
            }
        }
        if self.video == VideoSelection::None && self.audio == AudioSelection::None {
            return Err("Track selection keeps no video and no audio".to_string());
        }
        if self.mark_audio_default && self.audio == AudioSelection::None {
            return Err("Cannot mark a default audio stream when no audio is kept".to_string());
        }
        Ok(())
    }
}

impl Default for TrackSelectionSpec {
    fn default() -> Self {
        Self {
            video: VideoSelection::First,
            audio: AudioSelection::Language("eng".to_string()),
            mark_audio_default: true,
            include_subtitles: false,
        }
    }
}
