// src/pipeline/karaoke.rs

//! The karaoke pipeline: turn a song into a lyrics video.
//!
//! ```text
//! [download_youtube_audio] -> song.mp3
//! song.mp3 -> download_lyrics  -> lyrics.txt
//! song.mp3 -> separate_audio   -> accompaniment.wav, vocals.wav
//! vocals.wav -> find_silences  -> silences.json
//! vocals.wav, lyrics.txt, silences.json -> run_aligner -> sync_map.json
//! <stem>.wav -> compress:<stem> -> <stem>.mp3
//! accompaniment.wav, sync_map.json, silences.json -> create_video -> <song>_karaoke.mp4
//! ```
//!
//! `karaokedokeize` groups the minimum needed for playback: the sync map
//! and the compressed stems.

use std::path::{Path, PathBuf};

use crate::config::KaraokeSection;
use crate::dag::{Target, TaskGraph};
use crate::errors::Result;
use crate::task::work::shell_quote;
use crate::task::{Task, TaskBuilder, expand_family};
use crate::types::{JobId, TaskId};

/// Id of the group task covering alignment and compression.
pub const GROUP_TASK: &str = "karaokedokeize";

/// One song to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KaraokeJob {
    input: PathBuf,
    output_dir: PathBuf,
    youtube_url: Option<String>,
}

impl KaraokeJob {
    /// Outputs go to `<dir>/<stem>.out` next to the input by default.
    pub fn new(input: impl Into<PathBuf>) -> Self {
        let input = input.into();
        let output_dir = default_output_dir(&input);
        Self {
            input,
            output_dir,
            youtube_url: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Download the input from YouTube first.
    pub fn with_youtube_url(mut self, url: impl Into<String>) -> Self {
        self.youtube_url = Some(url.into());
        self
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The song's file stem, used as the job id.
    pub fn job_id(&self) -> JobId {
        JobId::new(stem(&self.input))
    }

    pub fn lyrics_path(&self) -> PathBuf {
        self.output_dir.join("lyrics.txt")
    }

    pub fn silences_path(&self) -> PathBuf {
        self.output_dir.join("silences.json")
    }

    pub fn sync_map_path(&self) -> PathBuf {
        self.output_dir.join("sync_map.json")
    }

    pub fn stem_path(&self, stem: &str, ext: &str) -> PathBuf {
        self.output_dir.join(format!("{stem}.{ext}"))
    }

    pub fn video_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}_karaoke.mp4", stem(&self.input)))
    }

    /// Target covering alignment and compression only.
    pub fn group_target() -> Target {
        Target::task(GROUP_TASK)
    }

    pub fn tasks(&self, cmds: &KaraokeSection) -> Result<Vec<Task>> {
        let vocals = self.stem_path("vocals", "wav");
        let accompaniment = self.stem_path("accompaniment", "wav");
        let mut tasks = Vec::new();

        if let Some(url) = &self.youtube_url {
            let cmd = self.fill(&cmds.youtube_cmd).replace("{url}", &shell_quote(url));
            tasks.push(
                TaskBuilder::new("download_youtube_audio")
                    .produces(&self.input)
                    .shell(cmd)
                    .always_fresh(true)
                    .build()?,
            );
        }

        tasks.push(
            TaskBuilder::new("download_lyrics")
                .consumes(&self.input)
                .produces(self.lyrics_path())
                .shell(self.fill(&cmds.lyrics_cmd))
                .build()?,
        );

        tasks.push(
            TaskBuilder::new("separate_audio")
                .consumes(&self.input)
                .produces_all(cmds.stems.iter().map(|s| self.stem_path(s, "wav")))
                .shell(self.fill(&cmds.separate_cmd))
                .always_fresh(true)
                .build()?,
        );

        tasks.push(
            TaskBuilder::new("find_silences")
                .consumes(&vocals)
                .produces(self.silences_path())
                .shell(self.fill(&cmds.silences_cmd))
                .build()?,
        );

        tasks.push(
            TaskBuilder::new("run_aligner")
                .consumes(&vocals)
                .consumes(self.lyrics_path())
                .consumes(self.silences_path())
                .produces(self.sync_map_path())
                .shell(self.fill(&cmds.align_cmd))
                .build()?,
        );

        let (program, args) = cmds
            .compress
            .split_first()
            .map(|(p, a)| (p.clone(), a.to_vec()))
            .unwrap_or_else(|| ("ffmpeg".to_string(), Vec::new()));
        tasks.extend(expand_family(&cmds.stems, |stem| {
            TaskBuilder::new(TaskId::with_param("compress", stem))
                .consumes(self.stem_path(stem, "wav"))
                .produces(self.stem_path(stem, "mp3"))
                .exec(program.clone(), args.iter().map(|a| self.fill_arg(a)))
                .always_fresh(true)
        })?);

        tasks.push(
            TaskBuilder::new("create_video")
                .consumes(&accompaniment)
                .consumes(self.sync_map_path())
                .consumes(self.silences_path())
                .produces(self.video_path())
                .shell(self.fill(&cmds.video_cmd))
                .build()?,
        );

        let mut group = TaskBuilder::group(GROUP_TASK, ["run_aligner"]);
        for stem in &cmds.stems {
            group = group.after(TaskId::with_param("compress", stem));
        }
        tasks.push(group.build()?);

        Ok(tasks)
    }

    pub fn graph(&self, cmds: &KaraokeSection) -> Result<TaskGraph> {
        let graph = TaskGraph::from_tasks(self.tasks(cmds)?)?;
        graph.order()?;
        Ok(graph)
    }

    /// For shell templates: the directory is quoted.
    fn fill(&self, template: &str) -> String {
        template.replace(
            "{output_dir}",
            &shell_quote(&self.output_dir.to_string_lossy()),
        )
    }

    /// For exec arguments, which never pass through a shell.
    fn fill_arg(&self, arg: &str) -> String {
        arg.replace("{output_dir}", &self.output_dir.to_string_lossy())
    }
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "song".to_string())
}

fn default_output_dir(input: &Path) -> PathBuf {
    let parent = input.parent().unwrap_or_else(|| Path::new(""));
    parent.join(format!("{}.out", stem(input)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::{Decision, plan};
    use crate::fs::MockFileSystem;
    use crate::task::Work;

    fn ids(graph: &TaskGraph) -> Vec<String> {
        graph.order().unwrap().iter().map(|t| t.id().to_string()).collect()
    }

    #[test]
    fn output_dir_defaults_next_to_the_input() {
        let job = KaraokeJob::new("music/song.mp3");
        assert_eq!(job.output_dir(), Path::new("music/song.out"));
        assert_eq!(job.video_path(), PathBuf::from("music/song.out/song_karaoke.mp4"));
        assert_eq!(job.job_id().as_str(), "song");
    }

    #[test]
    fn graph_orders_the_pipeline() {
        let graph = KaraokeJob::new("song.mp3")
            .graph(&KaraokeSection::default())
            .unwrap();
        let order = ids(&graph);
        let pos = |id: &str| order.iter().position(|t| t == id).unwrap();

        assert!(pos("separate_audio") < pos("find_silences"));
        assert!(pos("find_silences") < pos("run_aligner"));
        assert!(pos("download_lyrics") < pos("run_aligner"));
        assert!(pos("separate_audio") < pos("compress:vocals"));
        assert!(pos("run_aligner") < pos("create_video"));
        assert!(pos("compress:accompaniment") < pos(GROUP_TASK));
        assert!(pos("run_aligner") < pos(GROUP_TASK));
    }

    #[test]
    fn group_target_leaves_out_the_video() {
        let graph = KaraokeJob::new("song.mp3")
            .graph(&KaraokeSection::default())
            .unwrap();
        let selected: Vec<String> = graph
            .subgraph_for(&[KaraokeJob::group_target()])
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert!(!selected.contains(&"create_video".to_string()));
        assert!(selected.contains(&"compress:vocals".to_string()));
    }

    #[test]
    fn youtube_download_produces_the_input() {
        let job = KaraokeJob::new("dl/song.mp3").with_youtube_url("https://youtu.be/x?a=1&b=2");
        let graph = job.graph(&KaraokeSection::default()).unwrap();
        let download = graph.producer_of(Path::new("dl/song.mp3")).unwrap();
        assert_eq!(download.id().as_str(), "download_youtube_audio");
        assert!(download.always_fresh());
        assert_eq!(ids(&graph)[0], "download_youtube_audio");
    }

    #[test]
    fn separated_stems_are_not_redone_after_lyrics_change() {
        let job = KaraokeJob::new("song.mp3");
        let graph = job.graph(&KaraokeSection::default()).unwrap();
        let fs = MockFileSystem::new();
        fs.add_file("song.mp3", "");
        for stem in ["accompaniment", "vocals"] {
            fs.add_file(job.stem_path(stem, "wav"), "");
            fs.add_file(job.stem_path(stem, "mp3"), "");
        }
        for path in [job.lyrics_path(), job.silences_path(), job.sync_map_path(), job.video_path()] {
            fs.add_file(path, "");
        }
        fs.touch("song.mp3");

        let plan = plan(&graph, &[], &fs).unwrap();
        let runs: Vec<&str> = plan.to_run().map(|t| t.id().as_str()).collect();
        assert_eq!(runs, ["download_lyrics", "run_aligner", "create_video", GROUP_TASK]);
        let separate = plan
            .steps()
            .iter()
            .find(|s| s.task.id().as_str() == "separate_audio")
            .unwrap();
        assert!(!separate.decision.runs());
        assert!(matches!(separate.decision, Decision::Skip(_)));
    }

    #[test]
    fn exec_arguments_get_the_output_dir_unquoted() {
        let cmds = KaraokeSection {
            compress: ["ffmpeg", "-i", "{consumes}", "{output_dir}/x.mp3"]
                .map(String::from)
                .to_vec(),
            ..KaraokeSection::default()
        };
        let job = KaraokeJob::new("song.mp3").with_output_dir("my dir");
        let graph = job.graph(&cmds).unwrap();

        let task = graph.get(&TaskId::with_param("compress", "vocals")).unwrap();
        match task.work() {
            Some(Work::Exec { program, args }) => {
                assert_eq!(program, "ffmpeg");
                assert_eq!(args, &["-i", "{consumes}", "my dir/x.mp3"]);
            }
            other => panic!("expected exec work, got {other:?}"),
        }

        let Some(Work::Shell(separate)) = graph.get(&"separate_audio".into()).unwrap().work() else {
            panic!("expected shell work");
        };
        assert!(separate.contains("-o 'my dir' "));
    }
}
