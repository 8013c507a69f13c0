//! Ordered-collection arithmetic.
//!
//! Columns within a board and tasks within a column are "positioned
//! lists": each member carries an integer order index, and within one
//! parent the indices form the dense sequence `0..N-1` between
//! mutations. The two primitives are:
//!
//! - *relocate*: close the gap a member leaves behind, open a slot at
//!   its destination, then place it (the classic array-splice, applied
//!   to set-scoped index fields)
//! - *reindex*: assign `index = list position` from an explicit ordering
//!
//! The helpers here are pure and shared by the server-side engine and
//! the client-side mirror, so the optimistic path and the authoritative
//! path cannot drift apart.
//!
//! Every relocate shifts the whole remainder of the affected parent,
//! O(parent size) per move. Fine at kanban column sizes; a gapped or
//! fractional index scheme would be the escape hatch if that ever
//! changes.

/// A member of a positioned list.
pub trait Ordered {
    fn order_index(&self) -> i64;
    fn set_order_index(&mut self, index: i64);
}

impl Ordered for crate::model::Column {
    fn order_index(&self) -> i64 {
        self.order_index
    }
    fn set_order_index(&mut self, index: i64) {
        self.order_index = index;
    }
}

impl Ordered for crate::model::ColumnView {
    fn order_index(&self) -> i64 {
        self.order_index
    }
    fn set_order_index(&mut self, index: i64) {
        self.order_index = index;
    }
}

impl Ordered for crate::model::Task {
    fn order_index(&self) -> i64 {
        self.order_index
    }
    fn set_order_index(&mut self, index: i64) {
        self.order_index = index;
    }
}

/// Close the gap left by a member removed from index `removed_index`:
/// every member strictly above it shifts down by one.
pub fn close_gap<'a, T, I>(members: I, removed_index: i64)
where
    T: Ordered + 'a,
    I: IntoIterator<Item = &'a mut T>,
{
    for member in members {
        if member.order_index() > removed_index {
            member.set_order_index(member.order_index() - 1);
        }
    }
}

/// Open a slot at `at`: every member at or above it shifts up by one.
pub fn open_slot<'a, T, I>(members: I, at: i64)
where
    T: Ordered + 'a,
    I: IntoIterator<Item = &'a mut T>,
{
    for member in members {
        if member.order_index() >= at {
            member.set_order_index(member.order_index() + 1);
        }
    }
}

/// Clamp a requested target index to `[0, member_count]`. A target past
/// the end means "append".
pub fn clamp_target(member_count: usize, target: i64) -> i64 {
    target.clamp(0, member_count as i64)
}

/// Assign `index = position in ordering` for every member whose id
/// appears in `ordering`, in list order. Members not listed keep their
/// current index. Returns the first id that does not match any member.
pub fn reindex<'a, T, Id, F>(
    members: &mut [T],
    ordering: &'a [Id],
    id_of: F,
) -> Result<(), &'a Id>
where
    T: Ordered,
    Id: PartialEq,
    F: Fn(&T) -> Id,
{
    for id in ordering {
        if !members.iter().any(|member| id_of(member) == *id) {
            return Err(id);
        }
    }
    for (index, id) in ordering.iter().enumerate() {
        if let Some(member) = members.iter_mut().find(|member| id_of(member) == *id) {
            member.set_order_index(index as i64);
        }
    }
    Ok(())
}

/// Sort members ascending by order index (stable, so equal indices keep
/// their relative order).
pub fn sort_by_index<T: Ordered>(members: &mut [T]) {
    members.sort_by_key(Ordered::order_index);
}

/// True when the indices, sorted ascending, are exactly `0..len`.
pub fn is_dense<T: Ordered>(members: &[T]) -> bool {
    let mut indices: Vec<i64> = members.iter().map(Ordered::order_index).collect();
    indices.sort_unstable();
    indices
        .iter()
        .enumerate()
        .all(|(expected, &actual)| actual == expected as i64)
}
