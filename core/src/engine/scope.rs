//! Indentation scope scans
//!
//! Control commands find their partners by scanning the block layout for the
//! first runnable command at the same indent, skipping anything nested deeper
//! and never crossing a command at a shallower indent.

use super::command::{CommandKind, CommandMeta};

/// Assign indent levels from command kinds.
///
/// Closers are placed one level out before the level is applied, openers
/// indent everything after them. The level never goes negative.
pub fn indent_levels(kinds: &[CommandKind]) -> Vec<usize> {
    let mut level = 0usize;
    kinds
        .iter()
        .map(|kind| {
            if kind.closes_scope() {
                level = level.saturating_sub(1);
            }
            let indent = level;
            if kind.opens_scope() {
                level += 1;
            }
            indent
        })
        .collect()
}

/// Scan forward from `from` for the first same-indent command in `targets`
fn scan_forward(layout: &[CommandMeta], from: usize, targets: &[CommandKind]) -> Option<usize> {
    let indent = layout.get(from)?.indent;
    for (i, meta) in layout.iter().enumerate().skip(from + 1) {
        if meta.indent < indent {
            return None;
        }
        if meta.indent == indent && meta.is_runnable() && targets.contains(&meta.kind) {
            return Some(i);
        }
    }
    None
}

/// `End` closing the scope opened at (or continued by) `from`
pub fn find_matching_end(layout: &[CommandMeta], from: usize) -> Option<usize> {
    scan_forward(layout, from, &[CommandKind::End])
}

/// Where a false `If`/`ElseIf` at `from` hands control: the next sibling
/// `ElseIf`, `Else` or `End`
pub fn find_next_branch(layout: &[CommandMeta], from: usize) -> Option<usize> {
    scan_forward(
        layout,
        from,
        &[CommandKind::ElseIf, CommandKind::Else, CommandKind::End],
    )
}

/// Opener (`If` or `While`) of the scope an `End` at `from` closes
pub fn find_scope_opener(layout: &[CommandMeta], from: usize) -> Option<usize> {
    let indent = layout.get(from)?.indent;
    for i in (0..from).rev() {
        let meta = &layout[i];
        if meta.indent < indent {
            return None;
        }
        if meta.indent == indent
            && meta.enabled
            && matches!(meta.kind, CommandKind::If | CommandKind::While)
        {
            return Some(i);
        }
    }
    None
}

/// Innermost `While` enclosing the command at `from`
pub fn find_enclosing_loop(layout: &[CommandMeta], from: usize) -> Option<usize> {
    let mut level = layout.get(from)?.indent;
    for i in (0..from).rev() {
        let meta = &layout[i];
        if meta.indent < level {
            if meta.kind == CommandKind::While && meta.enabled {
                return Some(i);
            }
            level = meta.indent;
        }
    }
    None
}

/// Index of the label named `name`
pub fn find_label(layout: &[CommandMeta], name: &str) -> Option<usize> {
    layout
        .iter()
        .position(|meta| meta.kind == CommandKind::Label && meta.label.as_deref() == Some(name))
}
