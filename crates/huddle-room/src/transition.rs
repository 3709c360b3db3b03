//! The state machine: what each command does to a room document.
//!
//! [`apply`] runs inside the store transaction, against a draft. It either
//! mutates the draft and reports [`Transition::Applied`], recognises a
//! retry and reports [`Transition::Replayed`] without touching anything,
//! or fails before any field changes. It may be re-run if the transaction
//! retries, so it has no side effects beyond the draft.
//!
//! Checks run in a fixed order: caller, replay, status, rate limit,
//! arguments against room state. A replay is recognised before the status
//! check because a successful first attempt has usually moved the status
//! already.

use huddle_protocol::{
    Command, OrderState, PlayerId, PlayerRecord, RequestId, ResolveMode, Room, RoomStatus,
    RoundVerdict, Timestamp, UiFlags,
};
use huddle_session::{resolve_host, RosterEntry};
use huddle_store::RoomDocument;

use crate::outcome::{build_play_outcome_payload, build_reveal_outcome_payload, HiddenValues};
use crate::{CommandConfig, CommandError, Dealer};

/// What a command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The draft was mutated; `statusVersion` moved by one.
    Applied { verdict: Option<RoundVerdict> },
    /// The command had already taken effect; nothing changed.
    Replayed,
}

/// Inputs a transition needs besides the document.
pub struct TransitionContext<'a> {
    pub actor: &'a PlayerId,
    pub request_id: &'a RequestId,
    pub now: Timestamp,
    pub config: &'a CommandConfig,
    pub dealer: &'a dyn Dealer,
}

/// Applies one command to the draft.
pub fn apply(
    doc: &mut RoomDocument,
    command: &Command,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    let transition = match command {
        Command::Start => open_round(doc, ctx, Family::Start)?,
        Command::NextRound => open_round(doc, ctx, Family::Next)?,
        Command::Deal => deal(doc, ctx)?,
        Command::SubmitOrder { list } => submit_order(doc, list, ctx)?,
        Command::CommitPlay { player_id } => commit_play(doc, player_id, ctx)?,
        Command::Finalize => finalize(doc, ctx)?,
        Command::Reset => reset(doc, ctx)?,
        Command::Join { name, avatar } => join(doc, name, avatar.as_deref(), ctx)?,
        Command::Leave => leave(doc, ctx)?,
        Command::TopicChange { topic } => change_topic(doc, topic.as_deref(), ctx)?,
        Command::ProfileUpdate { name, avatar } => {
            update_profile(doc, name.as_deref(), avatar.as_deref(), ctx)?
        }
    };

    if let Transition::Applied { .. } = transition {
        doc.room.status_version += 1;
        doc.room.last_active_at = ctx.now;
    }
    Ok(transition)
}

// ---------------------------------------------------------------------------
// Command families
// ---------------------------------------------------------------------------

/// Commands whose last accepted request id is kept on the room.
#[derive(Debug, Clone, Copy)]
enum Family {
    Start,
    Next,
    Deal,
    Finalize,
    Reset,
}

impl Family {
    fn slot(self, room: &mut Room) -> &mut Option<RequestId> {
        match self {
            Self::Start => &mut room.start_request_id,
            Self::Next => &mut room.next_request_id,
            Self::Deal => &mut room.deal_request_id,
            Self::Finalize => &mut room.finalize_request_id,
            Self::Reset => &mut room.reset_request_id,
        }
    }

    fn last(self, room: &Room) -> Option<&RequestId> {
        match self {
            Self::Start => room.start_request_id.as_ref(),
            Self::Next => room.next_request_id.as_ref(),
            Self::Deal => room.deal_request_id.as_ref(),
            Self::Finalize => room.finalize_request_id.as_ref(),
            Self::Reset => room.reset_request_id.as_ref(),
        }
    }

    /// A retry: same request id as the last accepted one, and the room
    /// already sits in the command's target status.
    fn is_replay(self, room: &Room, ctx: &TransitionContext<'_>, target: RoomStatus) -> bool {
        self.last(room) == Some(ctx.request_id) && room.status == target
    }

    fn record(self, room: &mut Room, ctx: &TransitionContext<'_>) {
        *self.slot(room) = Some(ctx.request_id.clone());
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

fn require_host(room: &Room, ctx: &TransitionContext<'_>, action: &'static str) -> Result<(), CommandError> {
    if room.is_host_or_creator(ctx.actor) {
        Ok(())
    } else {
        Err(CommandError::Forbidden {
            player_id: ctx.actor.clone(),
            action,
        })
    }
}

fn require_seated(
    doc: &RoomDocument,
    ctx: &TransitionContext<'_>,
    action: &'static str,
) -> Result<(), CommandError> {
    if doc.players.contains_key(ctx.actor) {
        Ok(())
    } else {
        Err(CommandError::Forbidden {
            player_id: ctx.actor.clone(),
            action,
        })
    }
}

fn require_status(room: &Room, command: &Command, allowed: &[RoomStatus]) -> Result<(), CommandError> {
    if allowed.contains(&room.status) {
        Ok(())
    } else {
        Err(CommandError::InvalidStatus {
            command: command.kind(),
            status: room.status,
        })
    }
}

/// Rejects a command stamped `last` less than `rate_limit_ms` ago. Deals
/// and round openings carry separate stamps.
fn check_rate_limit(last: Option<Timestamp>, ctx: &TransitionContext<'_>) -> Result<(), CommandError> {
    let limit = ctx.config.rate_limit_ms;
    match last {
        Some(last) if ctx.now - last < limit => Err(CommandError::RateLimited {
            retry_after_ms: limit - (ctx.now - last),
        }),
        _ => Ok(()),
    }
}

fn dealt_numbers(doc: &RoomDocument) -> HiddenValues {
    doc.players
        .values()
        .filter_map(|p| p.number.map(|n| (p.id.clone(), n)))
        .collect()
}

fn clear_numbers(doc: &mut RoomDocument) {
    for player in doc.players.values_mut() {
        player.number = None;
    }
}

/// Moves a round whose verdict is in to the reveal phase.
fn enter_reveal(room: &mut Room) {
    room.status = RoomStatus::Reveal;
    room.ui = UiFlags {
        round_preparing: false,
        recall_open: false,
        reveal_pending: true,
    };
}

// ---------------------------------------------------------------------------
// Round commands
// ---------------------------------------------------------------------------

fn open_round(
    doc: &mut RoomDocument,
    ctx: &TransitionContext<'_>,
    family: Family,
) -> Result<Transition, CommandError> {
    let (command, allowed, rate_limited): (Command, &[RoomStatus], bool) = match family {
        Family::Start => (Command::Start, &[RoomStatus::Waiting], false),
        _ => (
            Command::NextRound,
            &[
                RoomStatus::Reveal,
                RoomStatus::Finished,
                RoomStatus::Waiting,
                RoomStatus::Clue,
            ],
            true,
        ),
    };

    require_host(&doc.room, ctx, "open a round")?;
    if family.is_replay(&doc.room, ctx, RoomStatus::Clue) {
        return Ok(Transition::Replayed);
    }
    require_status(&doc.room, &command, allowed)?;
    if rate_limited {
        check_rate_limit(doc.room.last_round_at, ctx)?;
    }

    let seated = doc.players.len();
    if seated < ctx.config.min_players {
        return Err(CommandError::NoPlayers {
            seated,
            required: ctx.config.min_players,
        });
    }

    clear_numbers(doc);
    let room = &mut doc.room;
    room.status = RoomStatus::Clue;
    room.round += 1;
    room.order = Some(OrderState::new(seated));
    room.ui = UiFlags {
        round_preparing: true,
        ..UiFlags::default()
    };
    if rate_limited {
        room.last_round_at = Some(ctx.now);
    }
    room.last_command_at = None;
    family.record(room, ctx);
    Ok(Transition::Applied { verdict: None })
}

fn deal(doc: &mut RoomDocument, ctx: &TransitionContext<'_>) -> Result<Transition, CommandError> {
    require_host(&doc.room, ctx, "deal")?;
    if Family::Deal.is_replay(&doc.room, ctx, RoomStatus::Clue) {
        return Ok(Transition::Replayed);
    }
    require_status(&doc.room, &Command::Deal, &[RoomStatus::Clue])?;
    check_rate_limit(doc.room.last_command_at, ctx)?;

    let options = doc.room.options;
    let seated = doc.players.len();
    let numbers = ctx.dealer.deal(seated, options.deal_min, options.deal_max)?;
    for (player, number) in doc.players.values_mut().zip(numbers) {
        player.number = Some(number);
    }

    let room = &mut doc.room;
    room.order = Some(OrderState::new(seated));
    room.ui = UiFlags {
        round_preparing: false,
        recall_open: true,
        reveal_pending: false,
    };
    room.last_command_at = Some(ctx.now);
    Family::Deal.record(room, ctx);
    Ok(Transition::Applied { verdict: None })
}

fn submit_order(
    doc: &mut RoomDocument,
    list: &[PlayerId],
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    let command = Command::SubmitOrder { list: list.to_vec() };
    require_seated(doc, ctx, "submit an order")?;
    let already_submitted = doc.room.status.is_round_over()
        && doc.room.order.as_ref().is_some_and(|o| o.list == list);
    if already_submitted {
        return Ok(Transition::Replayed);
    }
    require_status(&doc.room, &command, &[RoomStatus::Clue])?;
    if doc.room.options.resolve_mode != ResolveMode::SortSubmit {
        return Err(CommandError::InvalidStatus {
            command: command.kind(),
            status: doc.room.status,
        });
    }

    let values = dealt_numbers(doc);
    if values.is_empty() {
        return Err(CommandError::InvalidStatus {
            command: command.kind(),
            status: doc.room.status,
        });
    }
    if list.len() != values.len() || !list.iter().all(|id| values.contains_key(id)) {
        return Err(CommandError::invalid(
            "order must list every dealt player exactly once",
        ));
    }

    let outcome = build_reveal_outcome_payload(list, &values, doc.room.stats, ctx.now);
    let room = &mut doc.room;
    room.order = Some(outcome.order);
    room.stats = outcome.stats;
    enter_reveal(room);
    Ok(Transition::Applied {
        verdict: Some(outcome.verdict),
    })
}

fn commit_play(
    doc: &mut RoomDocument,
    player: &PlayerId,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    let command = Command::CommitPlay {
        player_id: player.clone(),
    };
    require_seated(doc, ctx, "play")?;
    if player != ctx.actor && !doc.room.is_host_or_creator(ctx.actor) {
        return Err(CommandError::Forbidden {
            player_id: ctx.actor.clone(),
            action: "play for someone else",
        });
    }
    let already_played = doc.room.status != RoomStatus::Waiting
        && doc.room.order.as_ref().is_some_and(|o| o.contains(player));
    if already_played {
        return Ok(Transition::Replayed);
    }
    require_status(&doc.room, &command, &[RoomStatus::Clue])?;
    if doc.room.options.resolve_mode != ResolveMode::Sequential {
        return Err(CommandError::InvalidStatus {
            command: command.kind(),
            status: doc.room.status,
        });
    }

    let values = dealt_numbers(doc);
    if values.is_empty() {
        return Err(CommandError::InvalidStatus {
            command: command.kind(),
            status: doc.room.status,
        });
    }
    let Some(&number) = values.get(player) else {
        return Err(CommandError::invalid(format!("player {player} holds no number")));
    };

    let order = doc
        .room
        .order
        .clone()
        .unwrap_or_else(|| OrderState::new(values.len()));
    let outcome = build_play_outcome_payload(&order, player, number, &doc.room.options, ctx.now);

    let room = &mut doc.room;
    room.order = Some(outcome.order);
    room.ui.recall_open = !outcome.verdict.finished;
    if outcome.verdict.finished {
        room.stats.record(outcome.verdict.success);
        enter_reveal(room);
    }
    Ok(Transition::Applied {
        verdict: Some(outcome.verdict),
    })
}

fn finalize(doc: &mut RoomDocument, ctx: &TransitionContext<'_>) -> Result<Transition, CommandError> {
    require_seated(doc, ctx, "finalize")?;
    if Family::Finalize.is_replay(&doc.room, ctx, RoomStatus::Finished) {
        return Ok(Transition::Replayed);
    }
    require_status(&doc.room, &Command::Finalize, &[RoomStatus::Reveal])?;

    let room = &mut doc.room;
    room.status = RoomStatus::Finished;
    room.ui.reveal_pending = false;
    Family::Finalize.record(room, ctx);
    Ok(Transition::Applied { verdict: None })
}

fn reset(doc: &mut RoomDocument, ctx: &TransitionContext<'_>) -> Result<Transition, CommandError> {
    require_host(&doc.room, ctx, "reset the room")?;
    if Family::Reset.is_replay(&doc.room, ctx, RoomStatus::Waiting) {
        return Ok(Transition::Replayed);
    }

    clear_numbers(doc);
    let room = &mut doc.room;
    room.status = RoomStatus::Waiting;
    room.order = None;
    room.ui = UiFlags::default();
    Family::Reset.record(room, ctx);
    Ok(Transition::Applied { verdict: None })
}

// ---------------------------------------------------------------------------
// Roster commands
// ---------------------------------------------------------------------------

fn join(
    doc: &mut RoomDocument,
    name: &str,
    avatar: Option<&str>,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    if doc.players.contains_key(ctx.actor) {
        return Ok(Transition::Replayed);
    }
    if doc.players.len() >= ctx.config.max_players {
        return Err(CommandError::Forbidden {
            player_id: ctx.actor.clone(),
            action: "join a full room",
        });
    }

    let join_order = doc.room.next_join_order;
    doc.room.next_join_order += 1;
    doc.players.insert(
        ctx.actor.clone(),
        PlayerRecord {
            id: ctx.actor.clone(),
            name: name.trim().to_owned(),
            avatar: avatar.map(str::to_owned),
            number: None,
            join_order,
            joined_at: ctx.now,
        },
    );
    doc.sync_seats();
    if doc.room.host_id.is_none() {
        doc.room.host_id = Some(ctx.actor.clone());
    }
    Ok(Transition::Applied { verdict: None })
}

fn leave(doc: &mut RoomDocument, ctx: &TransitionContext<'_>) -> Result<Transition, CommandError> {
    if doc.players.remove(ctx.actor).is_none() {
        return Ok(Transition::Replayed);
    }
    doc.sync_seats();

    let mut verdict = None;
    let room = &mut doc.room;
    if room.status == RoomStatus::Clue {
        let sequential = room.options.resolve_mode == ResolveMode::Sequential;
        if let Some(order) = room.order.as_mut().filter(|o| !o.contains(ctx.actor)) {
            order.total = order.total.saturating_sub(1);
            // The leaver may have been the last one still to play.
            if sequential && !order.list.is_empty() && order.is_complete() {
                order.decided_at = Some(ctx.now);
                let success = !order.failed;
                verdict = Some(RoundVerdict {
                    success,
                    failed_at: order.failed_at,
                    finished: true,
                });
                room.stats.record(success);
                enter_reveal(room);
            }
        }
    }

    if room.host_id.as_ref() == Some(ctx.actor) {
        let roster: Vec<RosterEntry> = room.seats.iter().map(RosterEntry::from).collect();
        room.host_id = resolve_host(&roster, None, None, ctx.now, 0);
    }
    Ok(Transition::Applied { verdict })
}

fn change_topic(
    doc: &mut RoomDocument,
    topic: Option<&str>,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    require_host(&doc.room, ctx, "change the topic")?;
    let command = Command::TopicChange {
        topic: topic.map(str::to_owned),
    };
    require_status(&doc.room, &command, &[RoomStatus::Waiting, RoomStatus::Clue])?;

    doc.room.topic = topic.map(str::to_owned);
    Ok(Transition::Applied { verdict: None })
}

fn update_profile(
    doc: &mut RoomDocument,
    name: Option<&str>,
    avatar: Option<&str>,
    ctx: &TransitionContext<'_>,
) -> Result<Transition, CommandError> {
    let Some(player) = doc.players.get_mut(ctx.actor) else {
        return Err(CommandError::Forbidden {
            player_id: ctx.actor.clone(),
            action: "update a profile without a seat",
        });
    };
    if let Some(name) = name {
        player.name = name.trim().to_owned();
    }
    if let Some(avatar) = avatar {
        player.avatar = Some(avatar.to_owned());
    }
    doc.sync_seats();
    Ok(Transition::Applied { verdict: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceDealer;
    use huddle_protocol::RoomId;

    fn pid(id: &str) -> PlayerId {
        PlayerId::new(id)
    }

    /// A room created by `a` with `names` seated in order, `a` as host.
    fn room_with(names: &[&str]) -> RoomDocument {
        let mut doc = RoomDocument::new(Room::new(RoomId::new("r"), pid("a"), 0));
        let config = CommandConfig::default();
        let dealer = SequenceDealer::default();
        for name in names {
            let actor = pid(name);
            let rid = RequestId::new(format!("join-{name}"));
            let ctx = context(&actor, &rid, 0, &config, &dealer);
            apply(
                &mut doc,
                &Command::Join {
                    name: name.to_string(),
                    avatar: None,
                },
                &ctx,
            )
            .unwrap();
        }
        doc
    }

    fn context<'a>(
        actor: &'a PlayerId,
        request_id: &'a RequestId,
        now: Timestamp,
        config: &'a CommandConfig,
        dealer: &'a dyn Dealer,
    ) -> TransitionContext<'a> {
        TransitionContext {
            actor,
            request_id,
            now,
            config,
            dealer,
        }
    }

    fn run(
        doc: &mut RoomDocument,
        actor: &str,
        command: Command,
        request_id: &str,
        now: Timestamp,
        dealer: &dyn Dealer,
    ) -> Result<Transition, CommandError> {
        let actor = pid(actor);
        let rid = RequestId::new(request_id);
        let config = CommandConfig::default();
        apply(doc, &command, &context(&actor, &rid, now, &config, dealer))
    }

    #[test]
    fn test_join_first_player_becomes_host() {
        let doc = room_with(&["a", "b"]);
        assert_eq!(doc.room.host_id, Some(pid("a")));
        assert_eq!(doc.room.seats.len(), 2);
        assert_eq!(doc.room.status_version, 2);
    }

    #[test]
    fn test_start_twice_same_request_replays() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::default();

        let first = run(&mut doc, "a", Command::Start, "s1", 10, &dealer).unwrap();
        let second = run(&mut doc, "a", Command::Start, "s1", 20, &dealer).unwrap();

        assert!(matches!(first, Transition::Applied { .. }));
        assert_eq!(second, Transition::Replayed);
        assert_eq!(doc.room.status_version, 3);
        assert_eq!(doc.room.round, 1);
    }

    #[test]
    fn test_start_different_request_is_invalid_status() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::default();
        run(&mut doc, "a", Command::Start, "s1", 10, &dealer).unwrap();

        let err = run(&mut doc, "a", Command::Start, "s2", 20, &dealer).unwrap_err();
        assert!(matches!(err, CommandError::InvalidStatus { .. }));
    }

    #[test]
    fn test_start_by_guest_is_forbidden() {
        let mut doc = room_with(&["a", "b"]);
        let err = run(&mut doc, "b", Command::Start, "s1", 10, &SequenceDealer::default())
            .unwrap_err();
        assert!(matches!(err, CommandError::Forbidden { .. }));
    }

    #[test]
    fn test_start_alone_is_no_players() {
        let mut doc = room_with(&["a"]);
        let err = run(&mut doc, "a", Command::Start, "s1", 10, &SequenceDealer::default())
            .unwrap_err();
        assert!(matches!(err, CommandError::NoPlayers { seated: 1, required: 2 }));
    }

    #[test]
    fn test_deal_then_deal_again_is_rate_limited() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::new([10, 20, 30, 40]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 100, &dealer).unwrap();

        let err = run(&mut doc, "a", Command::Deal, "d2", 600, &dealer).unwrap_err();
        assert!(matches!(err, CommandError::RateLimited { retry_after_ms: 1_000 }));
    }

    #[test]
    fn test_next_round_then_deal_is_not_rate_limited() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::new([30, 10, 20, 40]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 100, &dealer).unwrap();
        let list = vec![pid("b"), pid("a")];
        run(&mut doc, "b", Command::SubmitOrder { list }, "o1", 200, &dealer).unwrap();

        // Open and deal the next round well inside the limit window.
        run(&mut doc, "a", Command::NextRound, "n1", 300, &dealer).unwrap();
        let t = run(&mut doc, "a", Command::Deal, "d2", 400, &dealer).unwrap();

        assert!(matches!(t, Transition::Applied { .. }));
        assert_eq!(doc.room.round, 2);
        assert!(doc.players.values().all(|p| p.number.is_some()));
    }

    #[test]
    fn test_next_round_twice_is_rate_limited() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::default();
        run(&mut doc, "a", Command::NextRound, "n1", 0, &dealer).unwrap();

        let err = run(&mut doc, "a", Command::NextRound, "n2", 500, &dealer).unwrap_err();
        assert!(matches!(err, CommandError::RateLimited { retry_after_ms: 1_000 }));
    }

    #[test]
    fn test_submit_order_reveals_and_records_stats() {
        let mut doc = room_with(&["a", "b"]);
        // BTreeMap order: a gets 30, b gets 10.
        let dealer = SequenceDealer::new([30, 10]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        let list = vec![pid("b"), pid("a")];
        let t = run(&mut doc, "b", Command::SubmitOrder { list: list.clone() }, "o1", 5, &dealer)
            .unwrap();

        let Transition::Applied { verdict: Some(v) } = t else {
            panic!("expected a verdict, got {t:?}");
        };
        assert!(v.success);
        assert_eq!(doc.room.status, RoomStatus::Reveal);
        assert!(doc.room.ui.reveal_pending);
        assert_eq!(doc.room.stats.success_count, 1);

        // Same list again is a replay, not an error.
        let again = run(&mut doc, "a", Command::SubmitOrder { list }, "o2", 6, &dealer).unwrap();
        assert_eq!(again, Transition::Replayed);
    }

    #[test]
    fn test_submit_order_not_a_permutation_is_invalid_payload() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::new([30, 10]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        let err = run(&mut doc, "a", Command::SubmitOrder { list: vec![pid("a")] }, "o1", 5, &dealer)
            .unwrap_err();
        assert!(matches!(err, CommandError::InvalidPayload(_)));
    }

    #[test]
    fn test_submit_order_before_deal_is_invalid_status() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::default();
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();

        let list = vec![pid("a"), pid("b")];
        let err = run(&mut doc, "a", Command::SubmitOrder { list }, "o1", 5, &dealer).unwrap_err();
        assert!(matches!(err, CommandError::InvalidStatus { .. }));
    }

    #[test]
    fn test_commit_play_for_other_player_requires_host() {
        let mut doc = room_with(&["a", "b"]);
        doc.room.options.resolve_mode = ResolveMode::Sequential;
        let dealer = SequenceDealer::new([30, 10]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        let err = run(&mut doc, "b", Command::CommitPlay { player_id: pid("a") }, "p1", 5, &dealer)
            .unwrap_err();
        assert!(matches!(err, CommandError::Forbidden { .. }));

        let ok = run(&mut doc, "a", Command::CommitPlay { player_id: pid("b") }, "p2", 5, &dealer)
            .unwrap();
        assert!(matches!(ok, Transition::Applied { .. }));
    }

    #[test]
    fn test_commit_play_completes_round() {
        let mut doc = room_with(&["a", "b"]);
        doc.room.options.resolve_mode = ResolveMode::Sequential;
        let dealer = SequenceDealer::new([30, 10]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        run(&mut doc, "b", Command::CommitPlay { player_id: pid("b") }, "p1", 5, &dealer).unwrap();
        let t = run(&mut doc, "a", Command::CommitPlay { player_id: pid("a") }, "p2", 6, &dealer)
            .unwrap();

        assert!(matches!(t, Transition::Applied { verdict: Some(v) } if v.finished && v.success));
        assert_eq!(doc.room.status, RoomStatus::Reveal);

        let replay = run(&mut doc, "a", Command::CommitPlay { player_id: pid("a") }, "p2", 7, &dealer)
            .unwrap();
        assert_eq!(replay, Transition::Replayed);
    }

    #[test]
    fn test_finalize_then_next_round() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::new([1, 2, 3, 4]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();
        let list = vec![pid("a"), pid("b")];
        run(&mut doc, "a", Command::SubmitOrder { list }, "o1", 0, &dealer).unwrap();

        run(&mut doc, "b", Command::Finalize, "f1", 10, &dealer).unwrap();
        assert_eq!(doc.room.status, RoomStatus::Finished);
        assert!(!doc.room.ui.reveal_pending);
        assert_eq!(
            run(&mut doc, "b", Command::Finalize, "f1", 11, &dealer).unwrap(),
            Transition::Replayed
        );

        run(&mut doc, "a", Command::NextRound, "n1", 5_000, &dealer).unwrap();
        assert_eq!(doc.room.status, RoomStatus::Clue);
        assert_eq!(doc.room.round, 2);
        assert!(doc.players.values().all(|p| p.number.is_none()));
    }

    #[test]
    fn test_reset_from_clue_clears_round() {
        let mut doc = room_with(&["a", "b"]);
        let dealer = SequenceDealer::new([1, 2]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        run(&mut doc, "a", Command::Reset, "x1", 10, &dealer).unwrap();

        assert_eq!(doc.room.status, RoomStatus::Waiting);
        assert!(doc.room.order.is_none());
        assert_eq!(doc.room.ui, UiFlags::default());
        assert!(doc.players.values().all(|p| p.number.is_none()));
    }

    #[test]
    fn test_leave_host_hands_over_to_earliest_joiner() {
        let mut doc = room_with(&["a", "b", "c"]);
        doc.room.creator_id = pid("nobody");
        let dealer = SequenceDealer::default();

        run(&mut doc, "a", Command::Leave, "l1", 10, &dealer).unwrap();

        assert_eq!(doc.room.host_id, Some(pid("b")));
        assert!(!doc.room.is_seated(&pid("a")));
        // Leaving twice is a no-op.
        assert_eq!(
            run(&mut doc, "a", Command::Leave, "l2", 11, &dealer).unwrap(),
            Transition::Replayed
        );
    }

    #[test]
    fn test_leave_creator_loses_host_powers() {
        let mut doc = room_with(&["a", "b", "c"]);
        let dealer = SequenceDealer::default();

        run(&mut doc, "a", Command::Leave, "l1", 10, &dealer).unwrap();
        assert_eq!(doc.room.host_id, Some(pid("b")));
        assert_eq!(doc.room.creator_id, pid("a"));

        for command in [Command::Start, Command::Reset, Command::Deal] {
            let err = run(&mut doc, "a", command, "x1", 20, &dealer).unwrap_err();
            assert!(matches!(err, CommandError::Forbidden { .. }), "{err:?}");
        }
        let t = run(&mut doc, "b", Command::Start, "s1", 30, &dealer).unwrap();
        assert!(matches!(t, Transition::Applied { .. }));
    }

    #[test]
    fn test_leave_during_clue_shrinks_total() {
        let mut doc = room_with(&["a", "b", "c"]);
        let dealer = SequenceDealer::new([1, 2, 3]);
        run(&mut doc, "a", Command::Start, "s1", 0, &dealer).unwrap();
        run(&mut doc, "a", Command::Deal, "d1", 0, &dealer).unwrap();

        run(&mut doc, "c", Command::Leave, "l1", 10, &dealer).unwrap();

        assert_eq!(doc.room.order.as_ref().map(|o| o.total), Some(2));
    }

    #[test]
    fn test_join_full_room_is_forbidden() {
        let names: Vec<String> = (0..20).map(|i| format!("p{i:02}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut doc = room_with(&refs);

        let err = run(
            &mut doc,
            "late",
            Command::Join {
                name: "Late".into(),
                avatar: None,
            },
            "j",
            0,
            &SequenceDealer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::Forbidden { .. }));
    }

    #[test]
    fn test_profile_update_changes_seat() {
        let mut doc = room_with(&["a", "b"]);
        run(
            &mut doc,
            "b",
            Command::ProfileUpdate {
                name: Some("Bee".into()),
                avatar: None,
            },
            "u1",
            0,
            &SequenceDealer::default(),
        )
        .unwrap();
        assert_eq!(doc.room.seat(&pid("b")).map(|s| s.name.as_str()), Some("Bee"));
    }

    #[test]
    fn test_join_and_profile_update_store_trimmed_names() {
        let mut doc = room_with(&["a"]);
        let dealer = SequenceDealer::default();
        let padded = format!("{}b", " ".repeat(200));
        run(
            &mut doc,
            "b",
            Command::Join {
                name: padded,
                avatar: None,
            },
            "j1",
            0,
            &dealer,
        )
        .unwrap();
        assert_eq!(doc.room.seat(&pid("b")).map(|s| s.name.as_str()), Some("b"));

        run(
            &mut doc,
            "b",
            Command::ProfileUpdate {
                name: Some("  Bee  ".into()),
                avatar: None,
            },
            "u1",
            1,
            &dealer,
        )
        .unwrap();
        assert_eq!(doc.players[&pid("b")].name, "Bee");
    }

    #[test]
    fn test_topic_change_after_reveal_is_invalid_status() {
        let mut doc = room_with(&["a", "b"]);
        doc.room.status = RoomStatus::Reveal;
        let err = run(
            &mut doc,
            "a",
            Command::TopicChange {
                topic: Some("cats".into()),
            },
            "t1",
            0,
            &SequenceDealer::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidStatus { .. }));
    }
}
