//! History classifier: maps each inode's observed evidence (live and ghost
//! sightings, inode clocks, parent-directory clocks) onto the create /
//! rename / delete actions that plausibly produced it.
//!
//! Ambiguity is never an error here; any slot the evidence cannot pin down
//! is left unknown and renders as `?`.

use std::collections::HashMap;
use std::io::{Read, Seek};

use log::warn;

use crate::timeline::{Action, ActionKind};
use crate::walker::{EntryRecord, InodeIndex, InodeObservation};
use crate::Ext2Fs;

/// Parent-directory clock readings, cached across the classification pass.
/// Unreadable parents read as zeroed records, which simply never satisfy the
/// matching predicates.
struct ParentClocks<'a, T: Read + Seek> {
    fs: &'a mut Ext2Fs<T>,
    cache: HashMap<u32, (u32, u32)>,
}

impl<'a, T: Read + Seek> ParentClocks<'a, T> {
    fn new(fs: &'a mut Ext2Fs<T>) -> Self {
        ParentClocks {
            fs,
            cache: HashMap::new(),
        }
    }

    /// `(atime, mtime)` of a directory inode.
    fn clock(&mut self, inode: u32) -> (u32, u32) {
        if let Some(&c) = self.cache.get(&inode) {
            return c;
        }
        let record = self.fs.read_inode_or_empty(inode);
        let c = (record.i_atime, record.i_mtime);
        self.cache.insert(inode, c);
        c
    }

    fn mtime(&mut self, inode: u32) -> u32 {
        self.clock(inode).1
    }
}

/// The role slots the classifier tries to fill for one observation. Any slot
/// may stay empty when the evidence is ambiguous.
#[derive(Debug, Default, Clone, Copy)]
struct Evidence<'e> {
    live: Option<&'e EntryRecord>,
    creation: Option<&'e EntryRecord>,
    deletion: Option<&'e EntryRecord>,
    other_ghost: Option<&'e EntryRecord>,
}

/// Classify every observation in the index. The returned actions are in
/// per-inode emission order; ordering across inodes is by inode number.
pub fn reconstruct_actions<T: Read + Seek>(
    fs: &mut Ext2Fs<T>,
    index: &InodeIndex,
) -> Vec<Action> {
    let mut clocks = ParentClocks::new(fs);
    let mut actions = Vec::new();
    for (&inode, observation) in index.iter() {
        let before = actions.len();
        classify_inode(&mut clocks, inode, observation, &mut actions);
        debug_assert!(actions.len() > before, "every observation yields a create");
    }
    actions
}

fn classify_inode<T: Read + Seek>(
    clocks: &mut ParentClocks<'_, T>,
    inode: u32,
    obs: &InodeObservation,
    actions: &mut Vec<Action>,
) {
    let image = &obs.image;
    let ghosts: Vec<&EntryRecord> = obs.entries.iter().filter(|e| e.is_ghost()).collect();
    let ev = assign_roles(clocks, obs, &ghosts);

    let is_dir = image.is_dir();

    // Every inode was created exactly once.
    let create_kind = if is_dir {
        ActionKind::Mkdir
    } else {
        ActionKind::Touch
    };
    actions.push(single(nonzero(image.i_atime), create_kind, ev.creation, inode));

    if ghosts.is_empty() {
        return;
    }

    if image.i_dtime != 0 {
        let delete_kind = if is_dir { ActionKind::Rmdir } else { ActionKind::Rm };
        actions.push(single(Some(image.i_dtime), delete_kind, ev.deletion, inode));

        if ghosts.len() == 2 && ev.creation.is_some() && ev.deletion.is_some() {
            // Both endpoints known: a single undated move chains them.
            actions.push(mv(ev.creation, ev.deletion, None, inode));
        } else if ghosts.len() >= 2 && ev.creation.is_none() {
            if let Some(d) = ev.deletion {
                actions.push(mv(None, Some(d), None, inode));
                for &e in &ghosts {
                    if e != d {
                        actions.push(mv(Some(e), None, None, inode));
                    }
                }
            } else {
                for &e in &ghosts {
                    if clocks.mtime(e.parent_inode) != image.i_dtime {
                        actions.push(mv(Some(e), None, None, inode));
                    }
                }
            }
        }
        return;
    }

    // Still live, with rename residue. A ctime that drifted from mtime dates
    // the final rename; otherwise it is undatable.
    let ctime_ts = if image.i_ctime != image.i_mtime {
        nonzero(image.i_ctime)
    } else {
        None
    };

    if let [ghost] = ghosts.as_slice() {
        actions.push(mv(Some(*ghost), ev.live, ctime_ts, inode));
        return;
    }

    if let (2, Some(creation), Some(other), Some(live)) =
        (ghosts.len(), ev.creation, ev.other_ghost, ev.live)
    {
        actions.push(mv(Some(creation), Some(other), None, inode));

        let other_pm = clocks.mtime(other.parent_inode);
        let live_pm = clocks.mtime(live.parent_inode);
        let ts = if other_pm == live_pm || other_pm == image.i_ctime {
            nonzero(other_pm)
        } else {
            ctime_ts
        };
        actions.push(mv(Some(other), Some(live), ts, inode));
        return;
    }

    let live_pm = ev.live.map(|l| clocks.mtime(l.parent_inode));
    let mut matched_live = false;
    for &e in &ghosts {
        let e_pm = clocks.mtime(e.parent_inode);
        let hit = match live_pm {
            Some(lpm) => e_pm == lpm || e_pm == image.i_ctime,
            None => false,
        };
        if hit {
            matched_live = true;
            actions.push(mv(Some(e), ev.live, nonzero(e_pm), inode));
        } else {
            actions.push(mv(Some(e), None, None, inode));
        }
    }
    if !matched_live {
        if let Some(live) = ev.live {
            actions.push(mv(None, Some(live), ctime_ts, inode));
        }
    }
}

/// Fill the creation / deletion / other-ghost slots for one observation per
/// the evidence case table keyed on (ghost sightings, live sightings).
fn assign_roles<'e, T: Read + Seek>(
    clocks: &mut ParentClocks<'_, T>,
    obs: &'e InodeObservation,
    ghosts: &[&'e EntryRecord],
) -> Evidence<'e> {
    let image = &obs.image;
    let lives: Vec<&'e EntryRecord> = obs.entries.iter().filter(|e| !e.is_ghost()).collect();

    if lives.len() > 1 {
        warn!(
            "inode {} has {} live links; hard-link history is undefined",
            image.i_num,
            lives.len()
        );
    }

    let mut ev = Evidence {
        live: lives.last().copied(),
        ..Evidence::default()
    };

    let ghost_clocks: Vec<(&'e EntryRecord, u32, u32)> = ghosts
        .iter()
        .map(|&e| {
            let (pa, pm) = clocks.clock(e.parent_inode);
            (e, pa, pm)
        })
        .collect();

    // Creation: a parent whose mtime equals this inode's atime, else a lone
    // parent whose atime predates it.
    let creation_pick = pick_unique(
        &ghost_clocks,
        |_, pm| pm == image.i_atime,
        |pa, _| pa < image.i_atime,
    );
    // Deletion: a parent whose mtime equals the deletion time, else a lone
    // parent touched after it.
    let deletion_pick = pick_unique(
        &ghost_clocks,
        |_, pm| pm == image.i_dtime,
        |_, pm| pm > image.i_dtime,
    );

    match (ghosts.len(), lives.len()) {
        (0, _) => ev.creation = ev.live,
        (1, 0) => {
            ev.creation = Some(ghosts[0]);
            ev.deletion = Some(ghosts[0]);
        }
        (2, 0) => {
            ev.creation = creation_pick;
            if let Some(c) = ev.creation {
                ev.deletion = ghosts.iter().copied().find(|&e| e != c);
            } else if let Some(d) = deletion_pick {
                ev.deletion = Some(d);
                ev.creation = ghosts.iter().copied().find(|&e| e != d);
            }
        }
        (_, 0) => {
            ev.creation = creation_pick;
            ev.deletion = deletion_pick;
        }
        (1, _) => ev.creation = Some(ghosts[0]),
        (2, _) => {
            ev.creation = creation_pick;
            if let Some(c) = ev.creation {
                ev.other_ghost = ghosts.iter().copied().find(|&e| e != c);
            } else if let Some(live) = ev.live {
                let live_pm = clocks.mtime(live.parent_inode);
                let hits: Vec<_> = ghost_clocks
                    .iter()
                    .filter(|&&(_, _, pm)| pm == live_pm || pm == image.i_ctime)
                    .collect();
                if let [only] = hits.as_slice() {
                    ev.other_ghost = Some(only.0);
                    ev.creation = ghosts.iter().copied().find(|&e| e != only.0);
                }
            }
        }
        (_, _) => ev.creation = creation_pick,
    }

    ev
}

/// If exactly one candidate satisfies the equality predicate, pick it; else
/// if exactly one satisfies the looser ordering predicate, pick that; else
/// stay unknown. Predicates see the parent's `(atime, mtime)`.
fn pick_unique<'e>(
    candidates: &[(&'e EntryRecord, u32, u32)],
    equality: impl Fn(u32, u32) -> bool,
    ordering: impl Fn(u32, u32) -> bool,
) -> Option<&'e EntryRecord> {
    let exact: Vec<_> = candidates
        .iter()
        .filter(|&&(_, pa, pm)| equality(pa, pm))
        .collect();
    if let [only] = exact.as_slice() {
        return Some(only.0);
    }
    let loose: Vec<_> = candidates
        .iter()
        .filter(|&&(_, pa, pm)| ordering(pa, pm))
        .collect();
    if let [only] = loose.as_slice() {
        return Some(only.0);
    }
    None
}

fn nonzero(t: u32) -> Option<u32> {
    (t != 0).then_some(t)
}

fn single(
    timestamp: Option<u32>,
    kind: ActionKind,
    entry: Option<&EntryRecord>,
    inode: u32,
) -> Action {
    Action {
        timestamp,
        kind,
        args: vec![entry.map(|e| e.full_path.clone())],
        affected_dirs: vec![entry.map(|e| e.parent_inode)],
        affected_inodes: vec![inode],
    }
}

fn mv(
    from: Option<&EntryRecord>,
    to: Option<&EntryRecord>,
    timestamp: Option<u32>,
    inode: u32,
) -> Action {
    Action {
        timestamp,
        kind: ActionKind::Mv,
        args: vec![
            from.map(|e| e.full_path.clone()),
            to.map(|e| e.full_path.clone()),
        ],
        affected_dirs: vec![from.map(|e| e.parent_inode), to.map(|e| e.parent_inode)],
        affected_inodes: vec![inode],
    }
}
