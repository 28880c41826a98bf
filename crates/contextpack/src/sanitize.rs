//! History sanitizer.
//!
//! The completion API rejects any history where roles do not strictly
//! alternate, the first turn is not `user`, or a `tool_use` block is not
//! answered by exactly one `tool_result` in the very next turn. This module
//! repairs a history by removing whole turns; it never edits blocks inside
//! a turn.
//!
//! Two passes:
//!
//! 1. **Pairing.** An assistant turn carrying `tool_use` blocks must be
//!    followed by a user turn made only of `tool_result` blocks whose ids
//!    match the `tool_use` ids one-to-one. A valid pair is kept as a unit.
//!    Otherwise the assistant turn is dropped, together with the following
//!    turn when that turn carries any `tool_result`. A `tool_result` turn
//!    not consumed by a pair is an orphan and is dropped. Empty turns are
//!    dropped, and so are turns carrying a tool block of the other role
//!    (`tool_use` from the user, `tool_result` from the assistant).
//! 2. **Alternation.** Units are re-chained. Leading units that start with
//!    `assistant` are dropped. When a unit starts with the same role the
//!    previous unit ended with, the previous unit is dropped (a pair goes
//!    as a whole), repeating until the chain alternates.
//!
//! The result satisfies both invariants, so running it again removes
//! nothing.

use std::collections::HashSet;

use pl_domain::tool::{ContentBlock, Role, Turn};
use pl_domain::trace::TraceEvent;

/// A kept run of turns: a lone turn, or a `tool_use` turn plus its results.
struct Unit {
    turns: Vec<Turn>,
}

impl Unit {
    fn first_role(&self) -> Role {
        self.turns[0].role
    }

    fn last_role(&self) -> Role {
        self.turns[self.turns.len() - 1].role
    }
}

/// Outcome of a sanitize pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub before: usize,
    pub after: usize,
}

impl SanitizeReport {
    pub fn dropped(&self) -> usize {
        self.before - self.after
    }
}

/// Repair `turns` so it satisfies the alternation and pairing invariants.
pub fn sanitize(turns: Vec<Turn>) -> Vec<Turn> {
    sanitize_with_report(turns).0
}

pub fn sanitize_with_report(turns: Vec<Turn>) -> (Vec<Turn>, SanitizeReport) {
    let before = turns.len();
    let units = pair_units(turns);
    let chained = chain_units(units);
    let out: Vec<Turn> = chained.into_iter().flat_map(|u| u.turns).collect();

    let report = SanitizeReport {
        before,
        after: out.len(),
    };
    if report.dropped() > 0 {
        tracing::warn!(
            before = report.before,
            after = report.after,
            "history violated turn invariants, dropped offending turns"
        );
        TraceEvent::HistorySanitized {
            before: report.before,
            after: report.after,
        }
        .emit();
    }
    (out, report)
}

// ── Pass 1: pairing ────────────────────────────────────────────────

fn pair_units(turns: Vec<Turn>) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut iter = turns
        .into_iter()
        .filter(|t| !t.content.is_empty())
        .peekable();

    while let Some(turn) = iter.next() {
        if has_misplaced_block(&turn) {
            tracing::debug!(role = turn.role.as_str(), "dropping turn with tool block in wrong role");
            continue;
        }
        match turn.role {
            Role::Assistant if turn.has_tool_use() => {
                let answered = iter
                    .peek()
                    .is_some_and(|next| resolves(&turn, next));
                if answered {
                    if let Some(results) = iter.next() {
                        units.push(Unit {
                            turns: vec![turn, results],
                        });
                    }
                } else {
                    tracing::debug!(
                        tool_use_ids = ?turn.tool_use_ids(),
                        "dropping assistant turn with unanswered tool_use"
                    );
                    // Its would-be partner is an invalid result turn: drop it too.
                    if iter.peek().is_some_and(Turn::has_tool_result) {
                        iter.next();
                    }
                }
            }
            Role::User if turn.has_tool_result() => {
                tracing::debug!(
                    tool_result_ids = ?turn.tool_result_ids(),
                    "dropping orphan tool_result turn"
                );
            }
            _ => units.push(Unit { turns: vec![turn] }),
        }
    }
    units
}

/// `tool_use` only belongs to assistant turns, `tool_result` only to user
/// turns.
fn has_misplaced_block(turn: &Turn) -> bool {
    match turn.role {
        Role::User => turn.has_tool_use(),
        Role::Assistant => turn.has_tool_result(),
    }
}

/// Whether `next` answers every `tool_use` in `call` exactly once and
/// carries nothing else.
fn resolves(call: &Turn, next: &Turn) -> bool {
    if next.role != Role::User || !next.content.iter().all(ContentBlock::is_tool_result) {
        return false;
    }

    let use_ids = call.tool_use_ids();
    let result_ids = next.tool_result_ids();
    if use_ids.len() != result_ids.len() {
        return false;
    }

    let uses: HashSet<&str> = use_ids.iter().copied().collect();
    let results: HashSet<&str> = result_ids.iter().copied().collect();
    // Set sizes equal to list sizes rules out duplicate ids on either side.
    uses.len() == use_ids.len() && results.len() == result_ids.len() && uses == results
}

// ── Pass 2: alternation ────────────────────────────────────────────

fn chain_units(units: Vec<Unit>) -> Vec<Unit> {
    let mut out: Vec<Unit> = Vec::with_capacity(units.len());
    for unit in units {
        while out
            .last()
            .is_some_and(|prev| prev.last_role() == unit.first_role())
        {
            out.pop();
        }
        if out.is_empty() && unit.first_role() == Role::Assistant {
            continue;
        }
        out.push(unit);
    }
    out
}

/// Check both invariants without modifying anything.
pub fn is_well_formed(turns: &[Turn]) -> bool {
    if turns.first().is_some_and(|t| t.role != Role::User) {
        return false;
    }
    for (i, turn) in turns.iter().enumerate() {
        if turn.content.is_empty() || has_misplaced_block(turn) {
            return false;
        }
        if i > 0 && turns[i - 1].role == turn.role {
            return false;
        }
        if turn.has_tool_use() {
            match turns.get(i + 1) {
                Some(next) if resolves(turn, next) => {}
                _ => return false,
            }
        }
        if turn.has_tool_result() {
            match i.checked_sub(1).map(|p| &turns[p]) {
                Some(prev) if prev.has_tool_use() && resolves(prev, turn) => {}
                _ => return false,
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(text: &str) -> Turn {
        Turn::user_text(text)
    }

    fn assistant(text: &str) -> Turn {
        Turn::assistant_text(text)
    }

    fn call(ids: &[&str]) -> Turn {
        Turn::assistant(
            ids.iter()
                .map(|id| ContentBlock::tool_use(*id, "list_issues", json!({})))
                .collect(),
        )
    }

    fn results(ids: &[&str]) -> Turn {
        Turn::user(
            ids.iter()
                .map(|id| ContentBlock::tool_result(*id, "[]", false))
                .collect(),
        )
    }

    fn roles(turns: &[Turn]) -> String {
        turns
            .iter()
            .map(|t| match (t.role, t.has_tool_use(), t.has_tool_result()) {
                (Role::Assistant, true, _) => "C",
                (Role::Assistant, false, _) => "A",
                (Role::User, _, true) => "R",
                (Role::User, _, false) => "U",
            })
            .collect()
    }

    #[test]
    fn valid_history_untouched() {
        let h = vec![
            user("hi"),
            call(&["a", "b"]),
            results(&["b", "a"]),
            assistant("done"),
            user("thanks"),
        ];
        let out = sanitize(h.clone());
        assert_eq!(out, h);
        assert!(is_well_formed(&out));
    }

    #[test]
    fn leading_assistant_dropped() {
        let out = sanitize(vec![assistant("stale"), user("hi"), assistant("hello")]);
        assert_eq!(roles(&out), "UA");
    }

    #[test]
    fn trailing_unanswered_tool_use_dropped() {
        let out = sanitize(vec![user("hi"), call(&["a"])]);
        assert_eq!(roles(&out), "U");
    }

    #[test]
    fn mismatched_results_drop_both_turns() {
        let out = sanitize(vec![
            user("hi"),
            call(&["a", "b"]),
            results(&["a"]),
            assistant("partial"),
            user("again"),
        ]);
        // Pair removed; "hi" then "partial" still alternate.
        assert_eq!(roles(&out), "UAU");
        assert!(is_well_formed(&out));
    }

    #[test]
    fn extra_result_id_is_a_mismatch() {
        let out = sanitize(vec![user("hi"), call(&["a"]), results(&["a", "z"]), assistant("x")]);
        assert_eq!(roles(&out), "UA");
    }

    #[test]
    fn duplicate_result_id_is_a_mismatch() {
        let out = sanitize(vec![user("hi"), call(&["a", "b"]), results(&["a", "a"]), assistant("x")]);
        assert_eq!(roles(&out), "UA");
    }

    #[test]
    fn mixed_result_turn_is_invalid_partner() {
        let mixed = Turn::user(vec![
            ContentBlock::tool_result("a", "[]", false),
            ContentBlock::text("also this"),
        ]);
        let out = sanitize(vec![user("hi"), call(&["a"]), mixed, assistant("x")]);
        assert_eq!(roles(&out), "UA");
    }

    #[test]
    fn orphan_result_dropped() {
        let out = sanitize(vec![user("hi"), assistant("hello"), results(&["a"]), user("next")]);
        assert_eq!(roles(&out), "UAU");
    }

    #[test]
    fn consecutive_users_keep_latest() {
        let out = sanitize(vec![user("first"), user("second")]);
        assert_eq!(out, vec![user("second")]);
    }

    #[test]
    fn user_after_dangling_pair_drops_pair() {
        // Crash after tool results were appended, then a new message.
        let out = sanitize(vec![
            user("hi"),
            assistant("hello"),
            user("list issues"),
            call(&["a"]),
            results(&["a"]),
            user("are you there?"),
        ]);
        // Pair dropped, then "list issues" collides with the new message.
        assert_eq!(roles(&out), "UAU");
        assert_eq!(out[2], user("are you there?"));
    }

    #[test]
    fn assistant_before_pair_dropped() {
        let out = sanitize(vec![
            user("hi"),
            assistant("thinking"),
            call(&["a"]),
            results(&["a"]),
            assistant("done"),
        ]);
        assert_eq!(roles(&out), "UCRA");
    }

    #[test]
    fn leading_pair_dropped() {
        let out = sanitize(vec![call(&["a"]), results(&["a"]), assistant("x"), user("hi")]);
        assert_eq!(roles(&out), "U");
    }

    #[test]
    fn tool_use_in_user_turn_dropped() {
        let stray = Turn::user(vec![ContentBlock::tool_use("a", "list_issues", json!({}))]);
        let out = sanitize(vec![stray, assistant("ok"), user("hi"), assistant("hello")]);
        assert_eq!(roles(&out), "UA");
        assert_eq!(out[0], user("hi"));
        assert!(is_well_formed(&out));
    }

    #[test]
    fn tool_result_in_assistant_turn_dropped() {
        let stray = Turn::assistant(vec![
            ContentBlock::text("here you go"),
            ContentBlock::tool_result("a", "[]", false),
        ]);
        let out = sanitize(vec![user("hi"), stray]);
        assert_eq!(out, vec![user("hi")]);
        assert!(is_well_formed(&out));
    }

    #[test]
    fn misplaced_blocks_are_not_well_formed() {
        let stray = Turn::user(vec![ContentBlock::tool_use("a", "list_issues", json!({}))]);
        assert!(!is_well_formed(&[stray, assistant("ok")]));
        let stray = Turn::assistant(vec![ContentBlock::tool_result("a", "[]", false)]);
        assert!(!is_well_formed(&[user("hi"), stray]));
    }

    #[test]
    fn empty_turns_dropped() {
        let out = sanitize(vec![user("hi"), Turn::assistant(vec![]), assistant("ok")]);
        assert_eq!(roles(&out), "UA");
    }

    #[test]
    fn idempotent_on_messy_histories() {
        let messy = vec![
            vec![assistant("a"), assistant("b"), user("c"), user("d"), call(&["x"])],
            vec![results(&["q"]), call(&["a"]), user("u"), call(&["b"]), results(&["b"])],
            vec![user("u"), call(&["a", "a"]), results(&["a", "a"]), assistant("z"), assistant("y")],
            vec![user("u"), call(&["a"]), results(&["a"]), call(&["b"]), results(&["b"]), user("v")],
        ];
        for h in messy {
            let once = sanitize(h);
            assert!(is_well_formed(&once), "{}", roles(&once));
            let twice = sanitize(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn report_counts_drops() {
        let (_, report) = sanitize_with_report(vec![assistant("x"), user("hi")]);
        assert_eq!(report.dropped(), 1);
    }

    // ── Generated histories ─────────────────────────────────────────

    mod props {
        use super::*;
        use proptest::prelude::*;

        /// A small id alphabet so pairs, shared ids and duplicates all occur.
        fn id_strategy() -> impl Strategy<Value = &'static str> {
            prop_oneof![Just("a"), Just("b"), Just("c")]
        }

        fn block_strategy() -> impl Strategy<Value = ContentBlock> {
            prop_oneof![
                "[a-z ]{0,6}".prop_map(|text: String| ContentBlock::text(text)),
                id_strategy().prop_map(|id| ContentBlock::tool_use(id, "list_issues", json!({}))),
                (id_strategy(), any::<bool>())
                    .prop_map(|(id, is_error)| ContentBlock::tool_result(id, "[]", is_error)),
            ]
        }

        fn turn_strategy() -> impl Strategy<Value = Turn> {
            (
                any::<bool>(),
                prop::collection::vec(block_strategy(), 0..4),
            )
                .prop_map(|(from_user, content)| {
                    if from_user {
                        Turn::user(content)
                    } else {
                        Turn::assistant(content)
                    }
                })
        }

        fn history_strategy() -> impl Strategy<Value = Vec<Turn>> {
            prop::collection::vec(turn_strategy(), 0..12)
        }

        proptest! {
            #[test]
            fn sanitized_history_is_well_formed(h in history_strategy()) {
                let out = sanitize(h);
                prop_assert!(is_well_formed(&out), "{}", roles(&out));
            }

            #[test]
            fn sanitize_is_idempotent(h in history_strategy()) {
                let once = sanitize(h);
                let twice = sanitize(once.clone());
                prop_assert_eq!(twice, once);
            }
        }
    }
}
