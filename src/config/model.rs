// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::bus::{BusConfig, DEFAULT_SUBSCRIBER_BUFFER};
use crate::dag::TaskGraph;
use crate::engine::ServiceOptions;
use crate::engine::pool::default_size;
use crate::types::OverflowPolicy;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [config]
/// workers = 2
/// subscriber_buffer = 64
/// overflow = "drop_oldest"
///
/// [[task]]
/// name = "lyrics"
/// consumes = ["song.mp3"]
/// produces = ["out/lyrics.txt"]
/// cmd = "extract-lyrics {consumes} > {produces}"
///
/// [[task]]
/// name = "compress"
/// for_each = ["vocals", "accompaniment"]
/// consumes = ["out/{item}.wav"]
/// produces = ["out/{item}.mp3"]
/// exec = ["ffmpeg", "-y", "-i", "{consumes}", "{produces}"]
/// always_fresh = true
/// ```
///
/// All sections are optional. Use [`ConfigFile`] (via `TryFrom`) for a
/// validated view.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    /// `[[task]]` entries, in declaration order.
    #[serde(default)]
    pub task: Vec<TaskConfig>,

    #[serde(default)]
    pub karaoke: KaraokeSection,
}

/// A validated configuration: every task builds and the tasks form a DAG.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub task: Vec<TaskConfig>,
    pub karaoke: KaraokeSection,
    graph: TaskGraph,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, graph: TaskGraph) -> Self {
        Self {
            config: raw.config,
            task: raw.task,
            karaoke: raw.karaoke,
            graph,
        }
    }

    /// Tasks of all `[[task]]` entries, families expanded.
    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }
}

/// `[config]` section: service sizing and the worker program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigSection {
    /// Worker pool size; defaults to the number of CPUs.
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// What to do when a subscriber's buffer is full.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Program started for each job. Defaults to this executable's hidden
    /// `worker` subcommand.
    #[serde(default)]
    pub worker_program: Option<PathBuf>,

    #[serde(default)]
    pub worker_args: Vec<String>,
}

fn default_subscriber_buffer() -> usize {
    DEFAULT_SUBSCRIBER_BUFFER
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            workers: None,
            subscriber_buffer: default_subscriber_buffer(),
            overflow: OverflowPolicy::default(),
            worker_program: None,
            worker_args: Vec::new(),
        }
    }
}

impl ConfigSection {
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            workers: self.workers.unwrap_or_else(default_size),
            bus: BusConfig {
                buffer: self.subscriber_buffer,
                overflow: self.overflow,
            },
        }
    }
}

/// One `[[task]]` entry.
///
/// At most one of `cmd`, `exec` and `stage` may be set; an entry with none
/// is a group and may only list `after`. With `for_each`, the entry
/// describes a family: one task `name:item` per item, with `{item}`
/// replaced in paths, commands and `after`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskConfig {
    pub name: String,

    #[serde(default)]
    pub consumes: Vec<String>,

    #[serde(default)]
    pub produces: Vec<String>,

    #[serde(default)]
    pub after: Vec<String>,

    /// Ignore timestamps once all outputs exist.
    #[serde(default)]
    pub always_fresh: bool,

    /// Regex selecting stdout lines reported as step events.
    #[serde(default)]
    pub step_pattern: Option<String>,

    /// Shell command template.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Program and arguments, run without a shell.
    #[serde(default)]
    pub exec: Option<Vec<String>>,

    /// Name of an in-process stage.
    #[serde(default)]
    pub stage: Option<String>,

    #[serde(default)]
    pub for_each: Vec<String>,
}

/// `[karaoke]` section: command templates for the bundled karaoke
/// pipeline. `{consumes}`/`{produces}` expand as for any task, and
/// `{output_dir}` to the job's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KaraokeSection {
    pub lyrics_cmd: String,
    pub separate_cmd: String,
    pub silences_cmd: String,
    pub align_cmd: String,
    pub video_cmd: String,
    pub youtube_cmd: String,
    /// Program and arguments used to compress each separated stem.
    pub compress: Vec<String>,
    /// Stems produced by separation, in order.
    pub stems: Vec<String>,
}

impl Default for KaraokeSection {
    fn default() -> Self {
        Self {
            lyrics_cmd: "ffprobe -v error -show_entries format_tags=lyrics \
                 -of default=noprint_wrappers=1:nokey=1 {consumes} > {produces}"
                .to_string(),
            separate_cmd: "spleeter separate -p spleeter:2stems \
                 -f '{instrument}.{codec}' -o {output_dir} {consumes}"
                .to_string(),
            silences_cmd: "ffmpeg -hide_banner -nostats -i {consumes} \
                 -af silencedetect=noise=-35dB:d=0.5 -f null - 2> {produces}"
                .to_string(),
            align_cmd: "python3 -m aeneas.tools.execute_task {consumes[0]} {consumes[1]} \
                 'task_language=eng|is_text_type=mplain|os_task_file_format=json' {produces}"
                .to_string(),
            video_cmd: "ffmpeg -y -f lavfi -i color=c=black:s=1024x768:r=10 \
                 -i {consumes[0]} -shortest -c:v libx264 -c:a aac {produces}"
                .to_string(),
            youtube_cmd: "yt-dlp -x --audio-format mp3 -o {produces} {url}".to_string(),
            compress: ["ffmpeg", "-y", "-i", "{consumes}", "{produces}"]
                .map(String::from)
                .to_vec(),
            stems: ["accompaniment", "vocals"].map(String::from).to_vec(),
        }
    }
}
