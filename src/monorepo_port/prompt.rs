//! Renders the LLM-assisted conflict-resolution prompt via minijinja.
//!
//! A default template constant plus a thin `Environment::template_from_str`
//! render call. This only ever produces prompt *text* — running it through
//! an LLM CLI, launching a terminal, or copying it to the clipboard are
//! external-collaborator concerns (see [`crate::external`]).

use minijinja::Environment;

/// Inputs available to the conflict prompt template.
pub struct ConflictPromptContext<'a> {
    pub target_repo_name: &'a str,
    pub current_patch_subject: &'a str,
    pub conflicted_files: &'a [String],
    pub diff: &'a str,
}

const DEFAULT_CONFLICT_TEMPLATE: &str = r#"A `git am` patch failed to apply cleanly while porting commits into {{ repo }}.

Patch: {{ subject }}

Conflicted files:
{% for f in files %}
- {{ f }}
{% endfor %}

Resolve the conflict markers in the files above so the working tree reflects
the intent of both sides, then stage the result. Do not run `git am --continue`
yourself; the operator will do that.

Diff of the conflicting patch:
```
{{ diff }}
```
"#;

/// Render the default conflict-resolution prompt for `ctx`.
pub fn render_conflict_prompt(ctx: &ConflictPromptContext<'_>) -> anyhow::Result<String> {
    let env = Environment::new();
    let tmpl = env.template_from_str(DEFAULT_CONFLICT_TEMPLATE)?;
    let rendered = tmpl.render(minijinja::context! {
        repo => ctx.target_repo_name,
        subject => ctx.current_patch_subject,
        files => ctx.conflicted_files,
        diff => ctx.diff,
    })?;
    Ok(rendered)
}
