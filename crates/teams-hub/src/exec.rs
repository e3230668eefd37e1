//! External agent invocation
//!
//! Argument profiles derived from the teammate's permission mode.

use std::path::Path;
use std::process::Command;

/// Base argv for the external agent under `permission_mode`.
///
/// - `bypassPermissions` / `dontAsk` run unsandboxed
/// - `plan` runs with a read-only sandbox
/// - everything else runs full-auto
pub fn exec_base(agent_bin: &str, permission_mode: &str) -> Vec<String> {
    let mode = permission_mode.trim();
    let mut argv = vec![agent_bin.to_string(), "exec".to_string()];
    match mode {
        "bypassPermissions" | "dontAsk" => {
            argv.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        }
        "plan" => {
            argv.push("--sandbox".to_string());
            argv.push("read-only".to_string());
        }
        _ => argv.push("--full-auto".to_string()),
    }
    argv
}

/// Full argv for one prompt run.
pub fn build_argv(
    agent_bin: &str,
    permission_mode: &str,
    model: &str,
    profile: &str,
    cwd: &Path,
    prompt: &str,
) -> Vec<String> {
    let mut argv = exec_base(agent_bin, permission_mode);
    if !model.is_empty() {
        argv.push("-m".to_string());
        argv.push(model.to_string());
    }
    if !profile.is_empty() {
        argv.push("-p".to_string());
        argv.push(profile.to_string());
    }
    argv.push("-C".to_string());
    argv.push(cwd.display().to_string());
    argv.push(prompt.to_string());
    argv
}

/// `Command` for one prompt run, with the working directory applied.
pub fn build_command(
    agent_bin: &str,
    permission_mode: &str,
    model: &str,
    profile: &str,
    cwd: &Path,
    prompt: &str,
) -> Command {
    let argv = build_argv(agent_bin, permission_mode, model, profile, cwd, prompt);
    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.current_dir(cwd);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_mode_profiles() {
        assert_eq!(
            exec_base("codex", "bypassPermissions"),
            vec!["codex", "exec", "--dangerously-bypass-approvals-and-sandbox"]
        );
        assert_eq!(
            exec_base("codex", "dontAsk"),
            vec!["codex", "exec", "--dangerously-bypass-approvals-and-sandbox"]
        );
        assert_eq!(
            exec_base("codex", "plan"),
            vec!["codex", "exec", "--sandbox", "read-only"]
        );
        assert_eq!(exec_base("codex", "default"), vec!["codex", "exec", "--full-auto"]);
        assert_eq!(
            exec_base("codex", "acceptEdits"),
            vec!["codex", "exec", "--full-auto"]
        );
    }

    #[test]
    fn test_build_argv_tail() {
        let argv = build_argv(
            "codex",
            "plan",
            "gpt-5",
            "pair",
            &PathBuf::from("/work"),
            "do it",
        );
        assert_eq!(
            argv,
            vec![
                "codex",
                "exec",
                "--sandbox",
                "read-only",
                "-m",
                "gpt-5",
                "-p",
                "pair",
                "-C",
                "/work",
                "do it"
            ]
        );
    }

    #[test]
    fn test_build_argv_omits_empty_model_profile() {
        let argv = build_argv("codex", "default", "", "", &PathBuf::from("/w"), "p");
        assert_eq!(argv, vec!["codex", "exec", "--full-auto", "-C", "/w", "p"]);
    }
}
