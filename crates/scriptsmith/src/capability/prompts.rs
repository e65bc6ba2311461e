//! Prompt construction and response cleanup for the text generator.

use crate::config::Browser;
use crate::extract::{ExtractedProject, Framework};

use super::code::GeneratedCode;

/// Characters of each key source file included as project context.
const CONTEXT_FILE_CHARS: usize = 3_000;

/// Characters of a failing transcript handed to the debugger.
const TRANSCRIPT_CHARS: usize = 6_000;

pub const SCRIPT_SYSTEM: &str = "You are a senior QA automation engineer. You write \
self-contained Python Playwright scripts using the synchronous API. Output only code.";

pub const DEBUG_SYSTEM: &str = "You are a senior QA automation engineer who repairs \
failing Playwright scripts. Explain the failure briefly, then give the full corrected script.";

pub const CODE_SYSTEM: &str = "You are a senior web developer. You extend existing \
projects with new features that follow the project's conventions. Reply with JSON only.";

pub const INTEGRATION_SYSTEM: &str = "You are a senior web developer writing concise, \
step-by-step integration instructions for a teammate.";

/// Escapes chat-template control tokens in untrusted text.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|", "< |")
        .replace("|>", "| >")
        .replace("[INST]", "[ INST ]")
        .replace("[/INST]", "[ / INST ]")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

const SCRIPT_CONTRACT: &str = r#"The script MUST:
- read the browser name from the SCRIPTSMITH_BROWSER environment variable (chromium, firefox or webkit) and headless mode from SCRIPTSMITH_HEADLESS ("1" or "0");
- wait for network idle with a bounded timeout after every navigation;
- wrap every assertion so a failure or unexpected exception is counted and recorded, never aborting the run;
- record named high-level steps as they complete, page-load durations and individual action durations in seconds;
- close the browser in a finally block;
- print "[PASS] <summary>" when every assertion passed, otherwise "[FAIL] <summary>";
- finally print a line STATS_JSON_START, then one JSON object with the keys execution_time, assertions_passed, assertions_failed, total_assertions, step_coverage, performance (with page_loads and action_times lists), accessibility_violations, locator_retries, errors, then a line STATS_JSON_END;
- exit with status 1 if any assertion failed."#;

pub fn script_prompt(
    requirement: &str,
    browser: Browser,
    project: Option<&ExtractedProject>,
    generated: Option<&GeneratedCode>,
) -> String {
    let mut prompt = format!(
        "Write a Playwright test script for this requirement:\n{}\n\nTarget browser: {}\n\n{}\n",
        sanitize_for_prompt(requirement),
        browser,
        SCRIPT_CONTRACT
    );

    if let Some(project) = project {
        prompt.push_str("\nThe application under test:\n");
        prompt.push_str(&sanitize_for_prompt(&project.context_summary(CONTEXT_FILE_CHARS)));
    }
    if let Some(generated) = generated {
        prompt.push_str("\nThe feature being verified was just generated:\n");
        prompt.push_str(&sanitize_for_prompt(&generated.render()));
    }

    prompt
}

pub fn debug_prompt(requirement: &str, script: &str, transcript: &str, reason: &str) -> String {
    format!(
        "Requirement:\n{}\n\nScript:\n```python\n{}\n```\n\nThe run failed: {}\n\nOutput:\n{}\n\n\
         Reply with a line starting with ANALYSIS: explaining the failure and the fix, followed by \
         the complete corrected script in a single ```python block. Keep the output contract of the \
         original script unchanged.",
        sanitize_for_prompt(requirement),
        script,
        sanitize_for_prompt(reason),
        sanitize_for_prompt(&truncate(transcript, TRANSCRIPT_CHARS)),
    )
}

pub fn code_prompt(requirement: &str, project: &ExtractedProject, framework: Framework) -> String {
    format!(
        "The project below is built with {}.\n\n{}\n\nImplement this feature:\n{}\n\n\
         Reply with one JSON object using the keys routes_code, template_code, css_code, js_code, \
         models_code and forms_code. Each value is the complete source for that part, or an empty \
         string when the feature needs no change there.",
        framework.display_name(),
        sanitize_for_prompt(&project.context_summary(CONTEXT_FILE_CHARS)),
        sanitize_for_prompt(requirement),
    )
}

pub fn integration_prompt(requirement: &str, code: &GeneratedCode, framework: Framework) -> String {
    format!(
        "Feature request:\n{}\n\nGenerated code for a {} project:\n{}\n\n\
         Write numbered instructions for merging this code into the project: which files to \
         create or edit, where each fragment goes, required imports or registrations, and how to \
         try the feature manually.",
        sanitize_for_prompt(requirement),
        framework.display_name(),
        sanitize_for_prompt(&code.render()),
    )
}

/// Returns the content of the first fenced code block, or the trimmed input
/// when the text has no complete fence.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed.to_string();
    };

    let after_open = &trimmed[open + 3..];
    // Skip the language tag on the opening line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(after_open.len());
    let body = &after_open[body_start..];

    match body.find("```") {
        Some(close) => body[..close].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

/// Extracts the first balanced JSON object from a response with surrounding prose.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&response[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }

    None
}
