use std::path::PathBuf;
use vidrelay_core::{AudioSelection, TrackSelectionSpec, VideoSelection};

/// Fragmented MP4: playable without seeking back to patch the header
const STREAMING_MOVFLAGS: &str = "frag_keyframe+empty_moov+default_base_moof";
/// Seekable MP4 with the index moved to the front
const FILE_MOVFLAGS: &str = "+faststart";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeInput {
    /// Media arrives on stdin
    Pipe,
    Path(PathBuf),
    /// The transcoder fetches the URL itself
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutput {
    /// Media leaves on stdout
    Pipe,
    Path(PathBuf),
}

/// Build the `ffmpeg` argument list for a remux.
///
/// Codecs are always copied. Progress goes to stderr as `key=value` lines.
pub fn build_args(
    tracks: &TrackSelectionSpec,
    input: &TranscodeInput,
    output: &TranscodeOutput,
) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-y", "-progress", "pipe:2", "-nostats"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let input_arg = match input {
        TranscodeInput::Pipe => "pipe:0".to_string(),
        TranscodeInput::Path(path) => path.to_string_lossy().to_string(),
        TranscodeInput::Url(url) => url.clone(),
    };
    if !matches!(input, TranscodeInput::Pipe) {
        args.push("-nostdin".to_string());
    }
    args.push("-i".to_string());
    args.push(input_arg);

    match &tracks.video {
        VideoSelection::First => push_map(&mut args, "0:v:0".to_string()),
        VideoSelection::Index(n) => push_map(&mut args, format!("0:v:{}", n)),
        VideoSelection::All => push_map(&mut args, "0:v".to_string()),
        VideoSelection::None => {}
    }

    let keeps_audio = match &tracks.audio {
        AudioSelection::Language(tag) => {
            push_map(&mut args, format!("0:a:m:language:{}", tag));
            true
        }
        AudioSelection::Index(n) => {
            push_map(&mut args, format!("0:a:{}", n));
            true
        }
        AudioSelection::All => {
            push_map(&mut args, "0:a".to_string());
            true
        }
        AudioSelection::None => false,
    };

    if tracks.include_subtitles {
        // Optional map: inputs without subtitles are not an error
        push_map(&mut args, "0:s?".to_string());
    }

    args.push("-c".to_string());
    args.push("copy".to_string());
    if tracks.include_subtitles {
        args.push("-c:s".to_string());
        args.push("mov_text".to_string());
    }

    if keeps_audio && tracks.mark_audio_default {
        // Later specifiers win for a stream, so clear all then flag the first
        args.push("-disposition:a".to_string());
        args.push("0".to_string());
        args.push("-disposition:a:0".to_string());
        args.push("default".to_string());
    }

    args.push("-f".to_string());
    args.push("mp4".to_string());
    args.push("-movflags".to_string());
    match output {
        TranscodeOutput::Pipe => {
            args.push(STREAMING_MOVFLAGS.to_string());
            args.push("pipe:1".to_string());
        }
        TranscodeOutput::Path(path) => {
            args.push(FILE_MOVFLAGS.to_string());
            args.push(path.to_string_lossy().to_string());
        }
    }

    args
}

fn push_map(args: &mut Vec<String>, specifier: String) {
    args.push("-map".to_string());
    args.push(specifier);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(args: &[String]) -> String {
        args.join(" ")
    }

    #[test]
    fn test_default_stream_mode() {
        let args = build_args(
            &TrackSelectionSpec::default(),
            &TranscodeInput::Pipe,
            &TranscodeOutput::Pipe,
        );
        let cmd = joined(&args);
        assert!(cmd.starts_with("-hide_banner -y -progress pipe:2 -nostats -i pipe:0"));
        assert!(cmd.contains("-map 0:v:0 -map 0:a:m:language:eng -c copy"));
        assert!(cmd.contains("-disposition:a 0 -disposition:a:0 default"));
        assert!(cmd.ends_with("-f mp4 -movflags frag_keyframe+empty_moov+default_base_moof pipe:1"));
        assert!(!args.contains(&"-nostdin".to_string()));
    }

    #[test]
    fn test_file_mode_uses_faststart_and_nostdin() {
        let args = build_args(
            &TrackSelectionSpec::language("fra").with_default_audio(false),
            &TranscodeInput::Url("https://cdn.example.com/in.mp4".to_string()),
            &TranscodeOutput::Path(PathBuf::from("/tmp/run/output.mp4")),
        );
        let cmd = joined(&args);
        assert!(cmd.contains("-nostdin -i https://cdn.example.com/in.mp4"));
        assert!(cmd.contains("-map 0:a:m:language:fra"));
        assert!(!cmd.contains("-disposition"));
        assert!(cmd.ends_with("-movflags +faststart /tmp/run/output.mp4"));
    }

    #[test]
    fn test_selection_variants() {
        let tracks = TrackSelectionSpec {
            video: VideoSelection::None,
            audio: AudioSelection::Index(1),
            mark_audio_default: false,
            include_subtitles: true,
        };
        let cmd = joined(&build_args(
            &tracks,
            &TranscodeInput::Path(PathBuf::from("in.mkv")),
            &TranscodeOutput::Pipe,
        ));
        assert!(!cmd.contains("0:v"));
        assert!(cmd.contains("-map 0:a:1 -map 0:s? -c copy -c:s mov_text"));
    }
}
