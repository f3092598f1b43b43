//! Git tools. Everything goes through the command runner so the usual
//! timeout and output caps apply.

use anyhow::Result;
use serde_json::{json, Value};

use super::common::*;
use crate::error::HostError;
use crate::exec::CommandResult;

const DEFAULT_LOG_LIMIT: u64 = 10;
const MAX_LOG_LIMIT: u64 = 100;

async fn run_git(ctx: &ToolContext, command: &str) -> Result<CommandResult> {
    let cwd = ctx.current_dir();
    let result = ctx
        .runner
        .run(command, &cwd, ctx.command_timeout(None))
        .await?;

    if result.exit_code != Some(0) {
        anyhow::bail!(
            "`{}` failed (exit {:?}): {}",
            command,
            result.exit_code,
            result.stderr.trim()
        );
    }
    Ok(result)
}

fn quote(arg: &str) -> Result<String> {
    shlex::try_quote(arg)
        .map(|quoted| quoted.into_owned())
        .map_err(|e| HostError::InvalidParams(format!("Cannot quote {:?}: {}", arg, e)).into())
}

pub async fn tool_git_status(_args: Value, ctx: ToolContext) -> Result<Value> {
    let result = run_git(&ctx, "git status --porcelain=v1 --branch").await?;

    let mut branch = None;
    let mut changes = Vec::new();
    for line in result.stdout.lines() {
        if let Some(header) = line.strip_prefix("## ") {
            branch = Some(header.split("...").next().unwrap_or(header).to_string());
        } else if line.len() > 3 {
            changes.push(json!({
                "status": line[..2].trim(),
                "path": &line[3..],
            }));
        }
    }

    Ok(json!({
        "branch": branch,
        "clean": changes.is_empty(),
        "changes": changes,
    }))
}

pub async fn tool_git_diff(args: Value, ctx: ToolContext) -> Result<Value> {
    let file = optional_str(&args, "path");
    let staged = optional_bool(&args, "staged").unwrap_or(false);

    let mut command = String::from("git --no-pager diff --no-color");
    if staged {
        command.push_str(" --cached");
    }
    if let Some(file) = file {
        command.push_str(" -- ");
        command.push_str(&quote(file)?);
    }

    let result = run_git(&ctx, &command).await?;
    let mut out = json!({
        "path": file.unwrap_or("(all)"),
        "staged": staged,
        "diff": result.stdout,
        "truncated": result.stdout_truncated,
    });
    if result.stdout.is_empty() {
        out["message"] = json!("No changes found");
    }
    Ok(out)
}

pub async fn tool_git_log(args: Value, ctx: ToolContext) -> Result<Value> {
    let limit = optional_u64(&args, "limit")
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT);

    let command = format!(
        "git --no-pager log -n {} --date=iso-strict --pretty=format:%H%x09%an%x09%ad%x09%s",
        limit
    );
    let result = run_git(&ctx, &command).await?;

    let commits: Vec<Value> = result
        .stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '\t');
            Some(json!({
                "commit": parts.next()?,
                "author": parts.next()?,
                "date": parts.next()?,
                "subject": parts.next().unwrap_or(""),
            }))
        })
        .collect();

    Ok(json!({ "total": commits.len(), "commits": commits }))
}
