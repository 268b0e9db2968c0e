//! Resolution of the append-only ledger into current board state.
//!
//! Each coordinate behaves like a stack ordered by the store-assigned edit
//! id: an edit pushes its color, a deletion pops the most recent surviving
//! edit. The current color is the top of the stack, or background when the
//! stack is empty. A deleted color can therefore never come back by a later
//! deletion of something else.

use std::collections::BTreeMap;

use crate::pixel::{Coordinates, CurrentPixel, PixelEdit};

/// Resolve ledger rows into the surviving edit per coordinate.
///
/// Rows may arrive in any order; they are applied by ascending `id`.
/// Coordinates whose stack ends empty are omitted.
pub fn resolve_current<'a, I>(edits: I) -> Vec<CurrentPixel>
where
    I: IntoIterator<Item = &'a PixelEdit>,
{
    let mut ordered: Vec<&PixelEdit> = edits.into_iter().collect();
    ordered.sort_by_key(|edit| edit.id);

    let mut stacks: BTreeMap<Coordinates, Vec<&PixelEdit>> = BTreeMap::new();
    for edit in ordered {
        let stack = stacks.entry(edit.coords).or_default();
        if edit.deleted {
            stack.pop();
        } else {
            stack.push(edit);
        }
    }

    stacks
        .values()
        .filter_map(|stack| stack.last().map(|edit| CurrentPixel::from(*edit)))
        .collect()
}
