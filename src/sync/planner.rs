use crate::models::{ChainHead, SyncWindow};

/// Plan one round of windows after `cursor`.
///
/// The round covers `(cursor, min(cursor + limit, head)]` in `offset`-sized
/// windows, ascending and contiguous. An empty plan means there is nothing
/// left to fetch below the observed head.
pub fn plan(cursor: u64, offset: u64, limit: u64, head: Option<&ChainHead>) -> Vec<SyncWindow> {
    let last_height = head.map(|h| h.height).unwrap_or(0);
    let from = cursor;
    let to = cursor.saturating_add(limit).min(last_height);

    if to <= from || offset == 0 {
        return Vec::new();
    }

    let mut windows = Vec::with_capacity(((to - from) / offset + 1) as usize);
    let mut current = from;
    while current < to {
        let window_end = current.saturating_add(offset).min(to);
        windows.push(SyncWindow::new(current, window_end));
        current = window_end;
    }
    windows
}
