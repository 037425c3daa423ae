//! Minimal reconciliation between the visible row set and a fresh read.
//!
//! A full reset on every refresh would discard scroll position, selection,
//! and change animations for rows that did not move. [`reconcile`] instead
//! computes the smallest batched insert/remove/update sequence that turns
//! the current ordered row set into the incoming one, matching rows by a
//! caller-supplied stable identity key.

use std::collections::HashSet;
use std::hash::Hash;

/// One reconciliation step.
///
/// Indices address the evolving list: ops must be applied in order, each
/// against the list produced by the previous op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    /// Insert `count` rows taken from
    /// `incoming[source_index..source_index + count]` at `index`.
    Insert {
        index: usize,
        source_index: usize,
        count: usize,
    },
    /// Remove `count` rows starting at `index`.
    Remove { index: usize, count: usize },
    /// Replace the row at `index` with `incoming[source_index]`.
    Update { index: usize, source_index: usize },
}

enum Slot {
    Kept(usize),
    Inserted,
}

/// Compute the minimal op sequence transforming `current` into `incoming`.
///
/// `key_of` extracts each row's stable identity. Rows with equal identity
/// are the same logical entity: unchanged content produces no op, changed
/// content produces an in-place update, and a changed position produces a
/// single-row remove + insert. Identities are expected to be unique within
/// each list. Contiguous runs of removals and insertions are batched.
pub fn reconcile<R, K, F>(current: &[R], incoming: &[R], key_of: F) -> Vec<DiffOp>
where
    R: PartialEq,
    K: Eq + Hash,
    F: Fn(&R) -> K,
{
    let current_keys: Vec<K> = current.iter().map(&key_of).collect();
    let incoming_keys: Vec<K> = incoming.iter().map(&key_of).collect();
    let incoming_set: HashSet<&K> = incoming_keys.iter().collect();

    let mut ops = Vec::new();

    // Pass 1: drop rows whose identity vanished, batching contiguous runs.
    // At apply time every earlier run is already gone, so a run's index is
    // simply the number of rows kept before it.
    let mut kept: Vec<usize> = Vec::with_capacity(current.len());
    let mut index = 0;
    while index < current.len() {
        if incoming_set.contains(&current_keys[index]) {
            kept.push(index);
            index += 1;
            continue;
        }
        let run_start = index;
        while index < current.len() && !incoming_set.contains(&current_keys[index]) {
            index += 1;
        }
        ops.push(DiffOp::Remove {
            index: kept.len(),
            count: index - run_start,
        });
    }

    // Pass 2: walk the incoming order against the survivors. `slots` mirrors
    // the evolving list; model row sets are small, so the relocation scans
    // below stay linear in practice.
    let mut slots: Vec<Slot> = kept.into_iter().map(Slot::Kept).collect();
    let mut pos = 0;
    let mut si = 0;
    while si < incoming.len() {
        if let Some(Slot::Kept(ci)) = slots.get(pos) {
            if current_keys[*ci] == incoming_keys[si] {
                if current[*ci] != incoming[si] {
                    ops.push(DiffOp::Update {
                        index: pos,
                        source_index: si,
                    });
                }
                pos += 1;
                si += 1;
                continue;
            }
        }

        // The identity may live further down the surviving list: a reorder.
        let relocated = slots[pos..].iter().position(
            |slot| matches!(slot, Slot::Kept(ci) if current_keys[*ci] == incoming_keys[si]),
        );
        if let Some(offset) = relocated {
            let from = pos + offset;
            ops.push(DiffOp::Remove { index: from, count: 1 });
            ops.push(DiffOp::Insert {
                index: pos,
                source_index: si,
                count: 1,
            });
            slots.remove(from);
            slots.insert(pos, Slot::Inserted);
            pos += 1;
            si += 1;
            continue;
        }

        // Brand-new rows: batch the run of consecutive incoming rows that
        // match nothing in the remaining survivors.
        let run_start = si;
        loop {
            si += 1;
            if si >= incoming.len() {
                break;
            }
            let key = &incoming_keys[si];
            let known = slots[pos..]
                .iter()
                .any(|slot| matches!(slot, Slot::Kept(ci) if &current_keys[*ci] == key));
            if known {
                break;
            }
        }
        let count = si - run_start;
        ops.push(DiffOp::Insert {
            index: pos,
            source_index: run_start,
            count,
        });
        slots.splice(pos..pos, std::iter::repeat_with(|| Slot::Inserted).take(count));
        pos += count;
    }

    // Leftover survivors can only exist when identities repeat; trim them so
    // the final list mirrors `incoming` exactly.
    if pos < slots.len() {
        ops.push(DiffOp::Remove {
            index: pos,
            count: slots.len() - pos,
        });
    }

    ops
}

/// Apply a reconciliation sequence to `rows`, calling `notify` after each
/// mutation. `ops` must come from [`reconcile`] over the same
/// `(rows, incoming)` pair.
pub fn apply<R: Clone>(
    rows: &mut Vec<R>,
    incoming: &[R],
    ops: &[DiffOp],
    mut notify: impl FnMut(DiffOp),
) {
    for &op in ops {
        match op {
            DiffOp::Insert {
                index,
                source_index,
                count,
            } => {
                rows.splice(
                    index..index,
                    incoming[source_index..source_index + count].iter().cloned(),
                );
            }
            DiffOp::Remove { index, count } => {
                rows.drain(index..index + count);
            }
            DiffOp::Update {
                index,
                source_index,
            } => {
                rows[index] = incoming[source_index].clone();
            }
        }
        notify(op);
    }
}
