//! Client reconciliation: folding sync patches into the local room.
//!
//! Patches arrive over a channel that may redeliver, drop or reorder them.
//! `statusVersion` is the only ordering authority, so the rule is simple:
//! apply a patch only if it is strictly newer than what is held.
//!
//! ## Why not arrival order?
//!
//! Arrival order is whatever the network made of it. Suppose the server
//! commits v7 then v8, and the client receives v8 then v7. Applying in
//! arrival order leaves the client on v7 forever, because nothing newer is
//! coming. Comparing versions makes the result independent of delivery:
//! any permutation of the same patches folds to the state of the highest
//! one.

use huddle_protocol::{Room, SyncPatch};

use crate::PatchRejection;

/// Returns the room that results from applying `patch` to `current`.
///
/// `current` is never modified; on success a new room is returned with
/// the patch's declared fields merged over it (the `ui` flags key by key)
/// and `status_version` set to the patch's.
///
/// # Errors
/// A [`PatchRejection`] saying why the patch doesn't apply.
pub fn apply_patch(current: Option<&Room>, patch: &SyncPatch) -> Result<Room, PatchRejection> {
    let current = current.ok_or(PatchRejection::NoRoom)?;
    if current.id != patch.room_id {
        return Err(PatchRejection::RoomMismatch {
            expected: current.id.clone(),
            got: patch.room_id.clone(),
        });
    }
    if patch.status_version < current.status_version {
        return Err(PatchRejection::Stale {
            local: current.status_version,
            incoming: patch.status_version,
        });
    }
    if patch.status_version == current.status_version {
        return Err(PatchRejection::Duplicate {
            version: patch.status_version,
        });
    }

    let mut next = patch.room.apply_to(current);
    next.status_version = patch.status_version;
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_protocol::{
        CommandKind, PatchMeta, PatchSource, PlayerId, RoomId, RoomPatch, RoomStatus, UiPatch,
    };

    fn room(version: u64) -> Room {
        let mut room = Room::new(RoomId::new("r1"), PlayerId::new("h"), 0);
        room.status_version = version;
        room
    }

    fn patch(version: u64, room_patch: RoomPatch) -> SyncPatch {
        SyncPatch {
            room_id: RoomId::new("r1"),
            status_version: version,
            room: room_patch,
            meta: PatchMeta {
                source: PatchSource::Api,
                command: CommandKind::Start,
                request_id: None,
                ts: 0,
            },
        }
    }

    #[test]
    fn test_apply_patch_no_room() {
        let result = apply_patch(None, &patch(1, RoomPatch::default()));
        assert_eq!(result, Err(PatchRejection::NoRoom));
    }

    #[test]
    fn test_apply_patch_room_mismatch() {
        let mut other = patch(2, RoomPatch::default());
        other.room_id = RoomId::new("r2");
        let result = apply_patch(Some(&room(1)), &other);
        assert!(matches!(result, Err(PatchRejection::RoomMismatch { .. })));
    }

    #[test]
    fn test_apply_patch_stale_and_duplicate() {
        let current = room(5);
        assert_eq!(
            apply_patch(Some(&current), &patch(4, RoomPatch::default())),
            Err(PatchRejection::Stale { local: 5, incoming: 4 })
        );
        assert_eq!(
            apply_patch(Some(&current), &patch(5, RoomPatch::default())),
            Err(PatchRejection::Duplicate { version: 5 })
        );
    }

    #[test]
    fn test_apply_patch_merges_ui_keys_and_leaves_input_alone() {
        let mut current = room(1);
        current.ui.recall_open = true;
        let before = current.clone();

        let next = apply_patch(
            Some(&current),
            &patch(
                2,
                RoomPatch {
                    status: Some(RoomStatus::Clue),
                    ui: Some(UiPatch {
                        round_preparing: Some(true),
                        ..UiPatch::default()
                    }),
                    ..RoomPatch::default()
                },
            ),
        )
        .unwrap();

        assert_eq!(current, before);
        assert_eq!(next.status, RoomStatus::Clue);
        assert_eq!(next.status_version, 2);
        assert!(next.ui.round_preparing);
        assert!(next.ui.recall_open, "absent ui keys are preserved");
    }
}
