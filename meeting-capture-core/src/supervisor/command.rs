use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// External tool the external-process backend launches.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureTool {
    /// PulseAudio's `parecord`, writing WAV directly.
    #[default]
    Parecord,
    /// `ffmpeg` reading from the pulse input device.
    Ffmpeg,
    /// Any other tool. Arguments may contain the placeholders
    /// `{source}`, `{rate}`, `{channels}` and `{output}`.
    Custom { program: String, args: Vec<String> },
}

impl CaptureTool {
    pub fn program(&self) -> &str {
        match self {
            Self::Parecord => "parecord",
            Self::Ffmpeg => "ffmpeg",
            Self::Custom { program, .. } => program,
        }
    }
}

/// Fully resolved command line of a capture process.
///
/// Plain data: building one has no side effects, so argument layout can be
/// checked without launching anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build the command that records `source` into `output` as 16-bit PCM WAV.
    pub fn for_tool(tool: &CaptureTool, source: &str, sample_rate: u32, channels: u16, output: &Path) -> Self {
        let out = output.display().to_string();
        match tool {
            CaptureTool::Parecord => Self::new(
                "parecord",
                vec![
                    "-d".to_string(),
                    source.to_string(),
                    "--file-format=wav".to_string(),
                    "--format=s16le".to_string(),
                    format!("--rate={}", sample_rate),
                    format!("--channels={}", channels),
                    out,
                ],
            ),
            CaptureTool::Ffmpeg => Self::new(
                "ffmpeg",
                vec![
                    "-f".to_string(),
                    "pulse".to_string(),
                    "-i".to_string(),
                    source.to_string(),
                    "-ac".to_string(),
                    channels.to_string(),
                    "-ar".to_string(),
                    sample_rate.to_string(),
                    "-acodec".to_string(),
                    "pcm_s16le".to_string(),
                    "-y".to_string(),
                    out,
                ],
            ),
            CaptureTool::Custom { program, args } => {
                let args = args
                    .iter()
                    .map(|arg| {
                        arg.replace("{source}", source)
                            .replace("{rate}", &sample_rate.to_string())
                            .replace("{channels}", &channels.to_string())
                            .replace("{output}", &out)
                    })
                    .collect();
                Self::new(program.clone(), args)
            }
        }
    }

    /// The command as a single shell-like string, for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }

    /// Locate the program, either as a path or on `PATH`.
    pub fn resolve(&self) -> Option<PathBuf> {
        resolve_on_path(&self.program)
    }
}

impl fmt::Display for CaptureToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Find `program` the way a shell would: as given if it contains a separator,
/// otherwise in each `PATH` entry.
pub fn resolve_on_path(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    let direct = Path::new(program);
    if direct.components().count() > 1 {
        return direct.is_file().then(|| direct.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parecord_records_wav_from_source() {
        let cmd = CaptureToolCommand::for_tool(
            &CaptureTool::Parecord,
            "@DEFAULT_MONITOR@",
            16000,
            1,
            Path::new("/tmp/out.wav"),
        );
        assert_eq!(cmd.program, "parecord");
        assert_eq!(
            cmd.args,
            vec![
                "-d",
                "@DEFAULT_MONITOR@",
                "--file-format=wav",
                "--format=s16le",
                "--rate=16000",
                "--channels=1",
                "/tmp/out.wav"
            ]
        );
    }

    #[test]
    fn ffmpeg_overwrites_output() {
        let cmd = CaptureToolCommand::for_tool(&CaptureTool::Ffmpeg, "default", 48000, 2, Path::new("a.wav"));
        assert_eq!(cmd.program, "ffmpeg");
        assert_eq!(cmd.args[..4], ["-f", "pulse", "-i", "default"]);
        assert!(cmd.args.windows(2).any(|w| w == ["-ar", "48000"]));
        assert!(cmd.args.windows(2).any(|w| w == ["-ac", "2"]));
        assert_eq!(cmd.args.last().map(String::as_str), Some("a.wav"));
    }

    #[test]
    fn custom_substitutes_placeholders() {
        let tool = CaptureTool::Custom {
            program: "arecord".into(),
            args: vec!["-D".into(), "{source}".into(), "-r{rate}".into(), "-c{channels}".into(), "{output}".into()],
        };
        let cmd = CaptureToolCommand::for_tool(&tool, "hw:1", 16000, 1, Path::new("x.wav"));
        assert_eq!(cmd.args, vec!["-D", "hw:1", "-r16000", "-c1", "x.wav"]);
    }

    #[test]
    fn command_line_quotes_whitespace() {
        let cmd = CaptureToolCommand::new("sh", vec!["-c".into(), "sleep 5".into()]);
        assert_eq!(cmd.command_line(), "sh -c 'sleep 5'");
    }

    #[test]
    fn tool_deserializes_from_camel_case() {
        let tool: CaptureTool = serde_json::from_str("\"ffmpeg\"").unwrap();
        assert_eq!(tool, CaptureTool::Ffmpeg);
        let tool: CaptureTool = serde_json::from_str(r#"{"custom":{"program":"rec","args":["{output}"]}}"#).unwrap();
        assert_eq!(tool.program(), "rec");
    }

    #[test]
    fn missing_program_does_not_resolve() {
        assert!(resolve_on_path("definitely-not-a-capture-tool-4821").is_none());
        assert!(resolve_on_path("").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn shell_resolves() {
        assert!(resolve_on_path("sh").is_some());
        assert!(resolve_on_path("/bin/sh").is_some());
    }
}
