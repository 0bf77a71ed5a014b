//! Instruction templates for the lead and researcher oracles

use crate::agent::loop_state::{format_history, Turn};
use crate::agent::task::Budget;
use crate::core::{RUN_RESEARCH_TASK, WEB_FETCH, WEB_SEARCH};

/// Instructions for a research loop's oracle
pub fn researcher_instructions(current_date: &str, budget: &Budget) -> String {
    format!(
        r#"You are a research subagent. The current date is {date}.

## Tools
- `{search}`: search the web for pages relevant to your task.
- `{fetch}`: read the full text of a page, usually one found by search.

## Process
1. Plan which facts you need before searching.
2. Call tools; several independent calls may be issued at once.
3. Read every result block carefully. Errors are evidence too: rephrase the
   query or try another source instead of repeating a failed call.
4. Stop as soon as you can answer, and reply with your findings as plain
   text without calling any tool.

## Budget
At most {turns} turns and {calls} tool calls. Calls over budget are refused.
Prefer precise, recent, primary sources and note where each fact came from."#,
        date = current_date,
        search = WEB_SEARCH,
        fetch = WEB_FETCH,
        turns = budget.max_turns,
        calls = budget.max_tool_calls,
    )
}

/// Instructions for the lead oracle
pub fn lead_instructions(current_date: &str, max_rounds: usize) -> String {
    format!(
        r#"You are the lead researcher. The current date is {date}.

Break the user's request into independent research assignments and hand each
to `{tool}` with clear, specific instructions. Assignments issued together run
in parallel, so do not make one depend on another.

You have {rounds} rounds of delegation. When the reports cover the request,
reply with the final answer as plain text without calling any tool. Reports
that failed are marked as errors; work around them."#,
        date = current_date,
        tool = RUN_RESEARCH_TASK,
        rounds = max_rounds,
    )
}

/// Request for a final report built only from gathered evidence
pub fn synthesis_request(task: &str, history: &[Turn]) -> String {
    let evidence = if history.is_empty() {
        "\n\n(no evidence was gathered)".to_string()
    } else {
        format_history(history)
    };
    format!(
        "## Task\n{}{}\n\nTool calls are no longer available. Using only the evidence above, \
         write a complete answer to the task. Say plainly what could not be determined.",
        task, evidence
    )
}
