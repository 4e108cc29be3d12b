//! CLI wiring for `monorepo port`.

use std::path::PathBuf;

use crate::cli::{PortAction, PortArgs, PortRunArgs};
use crate::external::{
    ClipboardProvider, LlmToolProvider, NonInteractiveUi, NullClipboardProvider, NullLlmProvider,
    NullTerminalLauncher, PromptChoice, PromptUi, StdioPromptUi, TerminalLauncher,
};
use crate::monorepo_port::{
    self, conflict, plan::PortPlan, preflight, prompt::{render_conflict_prompt, ConflictPromptContext},
    PortRequest, PortResult, SourceRequest,
};
use crate::output;

fn collect_sources(args: &PortRunArgs) -> Vec<SourceRequest> {
    let mut sources = Vec::new();
    if let Some(location) = &args.from_happy {
        sources.push(SourceRequest {
            label: "happy".to_string(),
            location: location.clone(),
            base_ref: args.from_happy_base.clone().unwrap_or_else(|| "main".to_string()),
            head_ref: args.from_happy_ref.clone(),
        });
    }
    if let Some(location) = &args.from_happy_cli {
        sources.push(SourceRequest {
            label: "happy-cli".to_string(),
            location: location.clone(),
            base_ref: args.from_happy_cli_base.clone().unwrap_or_else(|| "main".to_string()),
            head_ref: args.from_happy_cli_ref.clone(),
        });
    }
    if let Some(location) = &args.from_happy_server {
        sources.push(SourceRequest {
            label: "happy-server".to_string(),
            location: location.clone(),
            base_ref: args.from_happy_server_base.clone().unwrap_or_else(|| "main".to_string()),
            head_ref: args.from_happy_server_ref.clone(),
        });
    }
    sources
}

fn build_request(args: &PortRunArgs) -> anyhow::Result<PortRequest> {
    let sources = collect_sources(args);
    if sources.is_empty() {
        anyhow::bail!("at least one --from-happy[-cli|-server] source is required");
    }
    Ok(PortRequest {
        target: args.target.clone(),
        branch: args.branch.clone(),
        base: args.base.clone(),
        onto_current: args.onto_current,
        dry_run: args.dry_run,
        use_3way: args.three_way,
        continue_on_failure: args.continue_on_failure,
        sources,
    })
}

fn git_dir_for(target: &PathBuf) -> anyhow::Result<PathBuf> {
    let mut cmd = std::process::Command::new("git");
    cmd.current_dir(target).args(["rev-parse", "--absolute-git-dir"]);
    let out = crate::shell_exec::run_checked(&mut cmd, Some("git-dir"))?;
    Ok(PathBuf::from(out.stdout.trim()))
}

/// Rebuild a [`PortRequest`] that resumes `plan`'s remaining sources, via
/// `resumeArgv` (`--onto-current`).
fn resumed_request_from_plan(plan: &PortPlan) -> PortRequest {
    PortRequest {
        target: plan.target_repo_root.clone(),
        branch: None,
        base: Some(plan.base.clone()),
        onto_current: true,
        dry_run: false,
        use_3way: plan.use_3way,
        continue_on_failure: false,
        sources: plan
            .sources
            .iter()
            .map(|s| SourceRequest {
                label: s.label.clone(),
                location: s.location.clone(),
                base_ref: s.base_ref.clone(),
                head_ref: s.head_ref.clone(),
            })
            .collect(),
    }
}

pub fn handle(args: PortArgs) -> anyhow::Result<()> {
    match args.action {
        PortAction::Run(run_args) => handle_run(run_args),
        PortAction::Preflight(run_args) => handle_preflight(run_args),
        PortAction::Guide(run_args) => handle_guide(run_args),
        PortAction::Status { target } => handle_status(target),
        PortAction::Continue { target, stage } => handle_continue(target, stage),
    }
}

fn handle_run(run_args: PortRunArgs) -> anyhow::Result<()> {
    let request = build_request(&run_args)?;
    let result = monorepo_port::run(&request)?;

    output::json(&serde_json::json!({
        "ok": result.ok,
        "appliedPatches": result.applied_count(),
        "skippedAlreadyApplied": result.skipped_already_applied_count(),
        "skippedAlreadyExistsIdentical": result.skipped_identical_count(),
        "failedPatches": result.failed_count(),
    }))?;

    if !output::is_json() {
        if result.ok {
            output::success(format!(
                "port complete: {} applied, {} skipped (already applied), {} skipped (identical), {} failed",
                result.applied_count(),
                result.skipped_already_applied_count(),
                result.skipped_identical_count(),
                result.failed_count()
            ));
        } else {
            output::warning(format!(
                "port stopped with {} failed patch(es); run `happy monorepo port continue --target={}` after resolving",
                result.failed_count(),
                run_args.target.display()
            ));
        }
    }

    if !result.ok {
        anyhow::bail!("port did not complete cleanly");
    }
    Ok(())
}

fn handle_preflight(run_args: PortRunArgs) -> anyhow::Result<()> {
    let request = build_request(&run_args)?;
    let components_dir = run_args.target.parent().unwrap_or(&run_args.target).to_path_buf();
    let outcome = monorepo_port::run_preflight(&request, &components_dir)?;

    match outcome {
        preflight::PreflightOutcome::Ok => {
            output::json(&serde_json::json!({"ok": true}))?;
            if !output::is_json() {
                output::success("preflight: no conflicts detected");
            }
            Ok(())
        }
        preflight::PreflightOutcome::Conflict(conflict) => {
            output::json(&serde_json::json!({
                "ok": false,
                "firstConflict": {
                    "currentPatch": conflict.current_patch,
                    "conflictedFiles": conflict.conflicted_files,
                }
            }))?;
            if !output::is_json() {
                output::warning(format!(
                    "preflight: conflict in {} on {}",
                    conflict.current_patch.display(),
                    conflict.conflicted_files.join(", ")
                ));
            }
            anyhow::bail!("preflight detected a conflict")
        }
    }
}

fn handle_status(target: PathBuf) -> anyhow::Result<()> {
    let git_dir = git_dir_for(&target)?;
    let plan = PortPlan::load(&git_dir)?;
    output::json(&serde_json::json!({"planPending": plan.is_some()}))?;
    if !output::is_json() {
        match &plan {
            Some(_) => output::info("a port plan is pending for this target"),
            None => output::info("no port plan is pending for this target"),
        }
    }
    Ok(())
}

fn handle_continue(target: PathBuf, stage: bool) -> anyhow::Result<()> {
    let result = conflict::continue_am(&target, stage)?;
    let git_dir = git_dir_for(&target)?;

    if result == conflict::ContinueResult::Drained
        && let Some(plan) = PortPlan::load(&git_dir)?
    {
        let request = resumed_request_from_plan(&plan);
        let resumed = monorepo_port::run(&request)?;
        output::json(&serde_json::json!({"ok": resumed.ok, "resumed": true}))?;
        if !output::is_json() {
            output::success("remaining sources applied; plan cleared");
        }
        if !resumed.ok {
            anyhow::bail!("resumed port did not complete cleanly");
        }
        return Ok(());
    }

    output::json(&serde_json::json!({"ok": true, "resumed": false}))?;
    if !output::is_json() {
        output::success("am session advanced");
    }
    Ok(())
}

/// Interactive guided port: runs (or resumes) the port, and on conflict
/// enters a prompt loop offering continue | stage+continue | status |
/// launch LLM | copy LLM prompt | skip | abort | quit.
fn handle_guide(run_args: PortRunArgs) -> anyhow::Result<()> {
    let ui: Box<dyn PromptUi> =
        if !output::is_json() && StdioPromptUi.is_interactive() { Box::new(StdioPromptUi) } else { Box::new(NonInteractiveUi) };
    let llm = NullLlmProvider;
    let terminal = NullTerminalLauncher;
    let clipboard = NullClipboardProvider;

    let git_dir = git_dir_for(&run_args.target)?;
    let existing_plan = PortPlan::load(&git_dir)?;

    let mut result = if let Some(plan) = &existing_plan {
        if preflight::am_in_progress(&run_args.target)? {
            PortResult { ok: false, findings: Vec::new() }
        } else {
            monorepo_port::run(&resumed_request_from_plan(plan))?
        }
    } else {
        monorepo_port::run(&build_request(&run_args)?)?
    };

    while !result.ok {
        let Some(conflict) = preflight::report_conflict(&run_args.target)? else {
            break;
        };

        let diff = std::fs::read_to_string(&conflict.current_patch).unwrap_or_default();
        let parsed = crate::monorepo_port::patch::parse(&diff);
        let subject = parsed.subject.clone().unwrap_or_else(|| "(unknown subject)".to_string());
        let repo_name = run_args
            .target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "target".to_string());

        if !output::is_json() {
            output::warning(format!(
                "conflict in {} on {}",
                conflict.current_patch.display(),
                conflict.conflicted_files.join(", ")
            ));
        }

        let tools = llm.detect();
        let mut choices = vec![
            PromptChoice { key: "c".into(), label: "continue".into() },
            PromptChoice { key: "s".into(), label: "stage resolved files + continue".into() },
            PromptChoice { key: "status".into(), label: "show status again".into() },
        ];
        if !tools.is_empty() {
            choices.push(PromptChoice { key: "l".into(), label: "launch LLM in a new terminal".into() });
        }
        choices.push(PromptChoice { key: "p".into(), label: "copy LLM prompt to clipboard".into() });
        choices.push(PromptChoice { key: "k".into(), label: "skip this patch".into() });
        choices.push(PromptChoice { key: "a".into(), label: "abort the port".into() });
        choices.push(PromptChoice { key: "q".into(), label: "quit (leave the plan pending)".into() });

        let choice = ui.prompt_select("conflict action: ", &choices)?;

        match choice.as_str() {
            "c" => advance_or_resume(&run_args.target, false, &git_dir, &mut result)?,
            "s" => advance_or_resume(&run_args.target, true, &git_dir, &mut result)?,
            "status" => continue,
            "l" => {
                let rendered = render_conflict_prompt(&ConflictPromptContext {
                    target_repo_name: &repo_name,
                    current_patch_subject: &subject,
                    conflicted_files: &conflict.conflicted_files,
                    diff: &diff,
                })?;
                let outcome = terminal.launch(&rendered, &run_args.target);
                if !outcome.ok && !output::is_json() {
                    output::warning(outcome.reason.unwrap_or_else(|| "terminal launch unavailable".into()));
                }
            }
            "p" => {
                let rendered = render_conflict_prompt(&ConflictPromptContext {
                    target_repo_name: &repo_name,
                    current_patch_subject: &subject,
                    conflicted_files: &conflict.conflicted_files,
                    diff: &diff,
                })?;
                if clipboard.available() {
                    clipboard.copy(&rendered)?;
                } else if !output::is_json() {
                    output::info(rendered);
                }
            }
            "k" => {
                let outcome = conflict::skip_am(&run_args.target)?;
                if outcome == conflict::ContinueResult::Drained {
                    resume_plan_if_present(&run_args.target, &git_dir, &mut result)?;
                }
            }
            "a" => {
                conflict::abort_am(&run_args.target)?;
                PortPlan::delete(&git_dir)?;
                anyhow::bail!("port aborted at operator request");
            }
            "q" => break,
            other => anyhow::bail!("unrecognized conflict action {other:?}"),
        }
    }

    output::json(&serde_json::json!({
        "ok": result.ok,
        "appliedPatches": result.applied_count(),
        "skippedAlreadyApplied": result.skipped_already_applied_count(),
        "skippedAlreadyExistsIdentical": result.skipped_identical_count(),
        "failedPatches": result.failed_count(),
    }))?;

    if !output::is_json() {
        if result.ok {
            output::success("guide complete");
        } else {
            output::warning("guide left a conflict pending; the plan was preserved");
        }
    }

    Ok(())
}

/// `am --continue`/`--stage`; if it drains the session, transparently
/// resume any remaining sources from the persisted Plan.
fn advance_or_resume(
    target: &std::path::Path,
    stage: bool,
    git_dir: &std::path::Path,
    result: &mut PortResult,
) -> anyhow::Result<()> {
    let outcome = conflict::continue_am(target, stage)?;
    if outcome == conflict::ContinueResult::Drained {
        resume_plan_if_present(target, git_dir, result)?;
    }
    Ok(())
}

fn resume_plan_if_present(
    _target: &std::path::Path,
    git_dir: &std::path::Path,
    result: &mut PortResult,
) -> anyhow::Result<()> {
    if let Some(plan) = PortPlan::load(git_dir)? {
        *result = monorepo_port::run(&resumed_request_from_plan(&plan))?;
    } else {
        result.ok = true;
    }
    Ok(())
}
