//! Recovered user actions and their textual rendering.

use std::fmt;
use std::io::{self, Write};

/// High-level user action inferred from on-disk residue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Mkdir,
    Touch,
    Rmdir,
    Rm,
    Mv,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Mkdir => "mkdir",
            ActionKind::Touch => "touch",
            ActionKind::Rmdir => "rmdir",
            ActionKind::Rm => "rm",
            ActionKind::Mv => "mv",
        };
        f.write_str(name)
    }
}

/// One recovered action. `None` slots render as `?`; a timestamp of `None`
/// means the evidence could not date the action. For `mv` the argument and
/// directory pairs are `(from, to)`-aligned.
#[derive(Debug, Clone)]
pub struct Action {
    pub timestamp: Option<u32>,
    pub kind: ActionKind,
    pub args: Vec<Option<Vec<u8>>>,
    pub affected_dirs: Vec<Option<u32>>,
    pub affected_inodes: Vec<u32>,
}

/// Order actions by timestamp, undatable ones after every dated one. The
/// sort is stable, so per-inode emission order survives.
pub fn sort_actions(mut actions: Vec<Action>) -> Vec<Action> {
    actions.sort_by_key(|a| a.timestamp.map_or(u64::MAX, u64::from));
    actions
}

/// Emit one line per action:
/// `<timestamp|?> <kind> [args] [dirs] [inodes]`.
///
/// Path arguments are written as raw bytes so salvaged names survive
/// verbatim.
pub fn render<W: Write>(actions: &[Action], out: &mut W) -> io::Result<()> {
    for action in actions {
        match action.timestamp {
            Some(t) => write!(out, "{} ", t)?,
            None => out.write_all(b"? ")?,
        }
        write!(out, "{} [", action.kind)?;
        for (i, arg) in action.args.iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            match arg {
                Some(path) if !path.is_empty() => out.write_all(path)?,
                _ => out.write_all(b"?")?,
            }
        }
        out.write_all(b"] [")?;
        for (i, dir) in action.affected_dirs.iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            match dir {
                Some(ino) => write!(out, "{}", ino)?,
                None => out.write_all(b"?")?,
            }
        }
        out.write_all(b"] [")?;
        for (i, ino) in action.affected_inodes.iter().enumerate() {
            if i > 0 {
                out.write_all(b" ")?;
            }
            write!(out, "{}", ino)?;
        }
        out.write_all(b"]\n")?;
    }
    Ok(())
}
