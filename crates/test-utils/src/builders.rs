#![allow(dead_code)]

use pipedag::config::{ConfigFile, ConfigSection, KaraokeSection, RawConfigFile, TaskConfig};
use pipedag::types::OverflowPolicy;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: Vec::new(),
                karaoke: KaraokeSection::default(),
            },
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.config.workers = Some(n);
        self
    }

    pub fn subscriber_buffer(mut self, n: usize) -> Self {
        self.config.config.subscriber_buffer = n;
        self
    }

    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.config.overflow = policy;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`. Starts as a group; call `cmd`, `exec` or
/// `stage` to give it work.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                ..TaskConfig::default()
            },
        }
    }

    pub fn consumes(mut self, path: &str) -> Self {
        self.task.consumes.push(path.to_string());
        self
    }

    pub fn produces(mut self, path: &str) -> Self {
        self.task.produces.push(path.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.cmd = Some(cmd.to_string());
        self
    }

    pub fn exec(mut self, argv: &[&str]) -> Self {
        self.task.exec = Some(argv.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn stage(mut self, name: &str) -> Self {
        self.task.stage = Some(name.to_string());
        self
    }

    pub fn always_fresh(mut self, val: bool) -> Self {
        self.task.always_fresh = val;
        self
    }

    pub fn step_pattern(mut self, pattern: &str) -> Self {
        self.task.step_pattern = Some(pattern.to_string());
        self
    }

    pub fn for_each(mut self, items: &[&str]) -> Self {
        self.task.for_each = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
