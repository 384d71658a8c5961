// src/task/work.rs

//! Units of work and placeholder expansion.
//!
//! Command templates may refer to a task's files:
//!
//! - `{consumes}` / `{produces}`: every path, space separated
//! - `{consumes[i]}` / `{produces[i]}`: the i-th path
//!
//! Any other `{...}` sequence is left untouched, so shell and awk braces
//! survive expansion.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What a task actually does. Serializable because it is shipped to the
/// worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Work {
    /// Run through `sh -c` after placeholder expansion (paths are
    /// shell-quoted).
    Shell(String),
    /// Run `program` directly. An argument that is exactly `{consumes}` or
    /// `{produces}` expands to one argument per path.
    Exec { program: String, args: Vec<String> },
    /// An in-process stage looked up by name in the worker's registry.
    Stage(String),
}

/// Paths available to placeholder expansion.
#[derive(Debug, Clone, Copy)]
pub struct Placeholders<'a> {
    pub consumes: &'a [PathBuf],
    pub produces: &'a [PathBuf],
}

impl<'a> Placeholders<'a> {
    pub fn new(consumes: &'a [PathBuf], produces: &'a [PathBuf]) -> Self {
        Self { consumes, produces }
    }

    /// Expand a shell template; paths are quoted for `sh`.
    pub fn expand_shell(&self, template: &str) -> Result<String, String> {
        self.expand(template, true)
    }

    /// Expand an argument vector for direct execution.
    pub fn expand_args(&self, args: &[String]) -> Result<Vec<String>, String> {
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            match arg.as_str() {
                "{consumes}" => out.extend(self.consumes.iter().map(display)),
                "{produces}" => out.extend(self.produces.iter().map(display)),
                _ => out.push(self.expand(arg, false)?),
            }
        }
        Ok(out)
    }

    fn expand(&self, template: &str, quote: bool) -> Result<String, String> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            let Some(end) = tail.find('}') else {
                out.push_str(tail);
                return Ok(out);
            };

            let key = &tail[1..end];
            if key.contains('{') {
                // An inner brace may open a real placeholder; re-scan from it.
                out.push('{');
                rest = &tail[1..];
                continue;
            }

            match self.resolve(key, quote)? {
                Some(value) => out.push_str(&value),
                None => out.push_str(&tail[..=end]),
            }
            rest = &tail[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn resolve(&self, key: &str, quote: bool) -> Result<Option<String>, String> {
        let (name, index) = match key.split_once('[') {
            Some((name, idx)) => match idx.strip_suffix(']').and_then(|i| i.parse::<usize>().ok()) {
                Some(i) => (name, Some(i)),
                None => return Ok(None),
            },
            None => (key, None),
        };

        let paths = match name {
            "consumes" => self.consumes,
            "produces" => self.produces,
            _ => return Ok(None),
        };

        let render = |p: &PathBuf| {
            let s = display(p);
            if quote { shell_quote(&s) } else { s }
        };

        match index {
            None => Ok(Some(paths.iter().map(render).collect::<Vec<_>>().join(" "))),
            Some(i) => paths
                .get(i)
                .map(|p| Some(render(p)))
                .ok_or_else(|| format!("placeholder {{{key}}} is out of range ({} paths)", paths.len())),
        }
    }
}

fn display(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

/// Single-quote `s` for `sh` unless it only contains safe characters.
pub(crate) fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | ','));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn shell_template_quotes_paths_with_spaces() {
        let consumes = paths(&["in/My Song.mp3"]);
        let produces = paths(&["out/lyrics.txt"]);
        let ph = Placeholders::new(&consumes, &produces);

        let cmd = ph.expand_shell("fetch-lyrics {consumes} > {produces[0]}").unwrap();
        assert_eq!(cmd, "fetch-lyrics 'in/My Song.mp3' > out/lyrics.txt");
    }

    #[test]
    fn unknown_braces_are_left_alone() {
        let consumes = paths(&["a.txt"]);
        let ph = Placeholders::new(&consumes, &[]);

        let cmd = ph.expand_shell("awk '{print $1}' {consumes} ${HOME} {{consumes}}").unwrap();
        assert_eq!(cmd, "awk '{print $1}' a.txt ${HOME} {a.txt}");
    }

    #[test]
    fn exec_args_splat_whole_lists() {
        let consumes = paths(&["a.wav", "b.wav"]);
        let produces = paths(&["mix.mp3"]);
        let ph = Placeholders::new(&consumes, &produces);

        let args = ph
            .expand_args(&["-i".into(), "{consumes}".into(), "--out={produces[0]}".into()])
            .unwrap();
        assert_eq!(args, ["-i", "a.wav", "b.wav", "--out=mix.mp3"]);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let produces = paths(&["x"]);
        let ph = Placeholders::new(&[], &produces);
        assert!(ph.expand_shell("cp {produces[1]} y").is_err());
    }
}
