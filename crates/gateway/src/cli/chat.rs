//! `parley chat`: interactive REPL command.
//!
//! Opens a readline loop that submits each line as a user turn and
//! prints the reply. Slash-commands manage the conversation and its
//! bindings. Ctrl+C while a turn is running cancels that turn.

use std::sync::Arc;

use pl_domain::config::Config;
use pl_domain::tool::ContentBlock;

use crate::bootstrap;
use crate::cli::history::transcript;
use crate::runtime::{self, TurnInput};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL on `conversation`.
pub async fn chat(config: Arc<Config>, conversation: String) -> anyhow::Result<()> {
    // 1. Boot the runtime; chat needs a completion provider.
    let state = bootstrap::build_app_state(config)?;
    bootstrap::require_provider(&state)?;

    // 2. Initialize rustyline editor with persistent line history.
    let history_path = state.config.store.state_path.join("chat_history.txt");
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    // 3. Welcome message on stderr (keep stdout for replies).
    eprintln!("Parley interactive chat");
    eprintln!("Conversation: {conversation}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    // 4. REPL loop.
    loop {
        match rl.readline("you> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(&state, trimmed, &conversation).await {
                        break;
                    }
                    continue;
                }

                // ── User message → turn ──────────────────────────
                send_message(&state, &conversation, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    // 5. Save line history.
    rl.save_history(&history_path).ok();

    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
async fn handle_slash_command(state: &AppState, input: &str, conversation: &str) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).filter(|s| !s.is_empty());

    match cmd {
        "/exit" | "/quit" => return true,

        "/new" => match runtime::clear_conversation(state, conversation).await {
            Ok(()) => eprintln!("Started a new conversation."),
            Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
        },

        "/model" => match arg {
            Some(name) => match state.config.llm.resolve_model(name) {
                Some(model) => report(
                    state.bindings.set_model(conversation, Some(model.as_str())),
                    &format!("Model set to: {model}"),
                ),
                None => {
                    let mut aliases: Vec<&str> =
                        state.config.llm.model_aliases.keys().map(String::as_str).collect();
                    aliases.sort_unstable();
                    eprintln!("Unknown model: {name}  (aliases: {})", aliases.join(", "));
                }
            },
            None => {
                let current = state
                    .bindings
                    .model(conversation)
                    .unwrap_or_else(|| format!("{} (default)", state.config.llm.default_model));
                eprintln!("Current model: {current}");
                eprintln!("Usage: /model <alias|model-id>");
            }
        },

        "/repo" => match arg {
            Some(repo) => report(
                state.bindings.set_repo(conversation, repo),
                &format!("Repository set to: {repo}"),
            ),
            None => {
                let repo = state.bindings.get(conversation).repo;
                eprintln!("Current repository: {}", repo.as_deref().unwrap_or("(none)"));
                eprintln!("Usage: /repo <owner/name>");
            }
        },

        "/branch" => match arg {
            Some("clear") => report(state.bindings.clear_branch(conversation), "Branch cleared."),
            Some(branch) => report(
                state.bindings.set_branch(conversation, Some(branch)),
                &format!("Branch set to: {branch}"),
            ),
            None => {
                let branch = state.bindings.get(conversation).branch;
                eprintln!("Current branch: {}", branch.as_deref().unwrap_or("(default)"));
                eprintln!("Usage: /branch <name|clear>");
            }
        },

        "/history" => match runtime::cached_history(state, conversation).await {
            Ok(turns) if turns.is_empty() => eprintln!("(empty)"),
            Ok(turns) => {
                for line in transcript(&turns) {
                    eprintln!("{line}");
                }
            }
            Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
        },

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /new                 Clear this conversation and start over");
            eprintln!("  /model [name]        Show or set the model (alias or full id)");
            eprintln!("  /repo [owner/name]   Show or bind the active repository");
            eprintln!("  /branch [name|clear] Show, set or clear the active branch");
            eprintln!("  /history             Show the conversation so far");
            eprintln!("  /exit, /quit         Exit the chat");
            eprintln!("  /help                Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

fn report(result: pl_domain::Result<()>, ok: &str) {
    match result {
        Ok(()) => eprintln!("{ok}"),
        Err(e) => eprintln!("\x1B[31merror: {e}\x1B[0m"),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Submit one user turn and print the reply chunks. Ctrl+C while the
/// turn runs requests cancellation; the turn still finishes its current
/// external call before rolling back.
async fn send_message(state: &AppState, conversation: &str, text: &str) {
    if runtime::is_busy(state, conversation) {
        eprintln!("Queued, finishing current request first.");
    }

    let input = TurnInput {
        conversation_key: conversation.to_string(),
        content: vec![ContentBlock::text(text)],
        user_id: None,
        model: None,
    };
    let task_state = state.clone();
    let mut turn = tokio::spawn(async move { runtime::submit_turn(&task_state, input).await });

    let joined = tokio::select! {
        res = &mut turn => res,
        _ = tokio::signal::ctrl_c() => {
            if runtime::cancel(state, conversation) {
                eprintln!("\x1B[2m(cancelling...)\x1B[0m");
            }
            turn.await
        }
    };

    match joined {
        Ok(Ok(reply)) => {
            for chunk in &reply.chunks {
                println!("{chunk}");
            }
            println!();
            tracing::debug!(
                rounds = reply.rounds,
                input_tokens = reply.usage.input_tokens,
                output_tokens = reply.usage.output_tokens,
                "turn finished"
            );
        }
        Ok(Err(failure)) => {
            tracing::debug!(error = %failure, "turn failed");
            eprintln!("\x1B[31m{}\x1B[0m", failure.user_message());
        }
        Err(e) => eprintln!("\x1B[31mturn task failed: {e}\x1B[0m"),
    }
}
