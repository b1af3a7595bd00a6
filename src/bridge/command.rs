use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::utils::shell_line;

/// Invocation of the bridging program:
/// `<program> <input> <output> <resolution> <framerate> <input-format>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeCommand {
    pub program: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub resolution: String,
    pub framerate: u32,
    pub input_format: String,
}

impl BridgeCommand {
    pub fn args(&self) -> Vec<String> {
        vec![
            self.input.display().to_string(),
            self.output.display().to_string(),
            self.resolution.clone(),
            self.framerate.to_string(),
            self.input_format.clone(),
        ]
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args());
        cmd
    }

    /// Arguments that identify a running instance of this invocation: program,
    /// input and output. Used to sweep orphans left behind by a previous session.
    pub fn signature(&self) -> Vec<String> {
        vec![
            self.program.display().to_string(),
            self.input.display().to_string(),
            self.output.display().to_string(),
        ]
    }

    /// Shell-quoted command line for logs.
    pub fn display_line(&self) -> String {
        shell_line(&self.program, &self.args())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}
