// src/parallel.rs
//
// The single execution primitive every kernel is written against:
//   - `for_each_fab`: run a per-box body over all boxes, serially or on the rayon pool;
//   - `for_each_cell`: run a per-cell body over an index range inside one box.
//
// Box bodies only touch their own box's data plus read-only shared data, so the
// threaded path needs no synchronisation beyond rayon's join.

use crate::index::{IndexBox, IntVect};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecPolicy {
    Serial,
    #[default]
    Threaded,
}

impl ExecPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" | "seq" | "0" => Some(Self::Serial),
            "threaded" | "rayon" | "parallel" | "1" => Some(Self::Threaded),
            _ => None,
        }
    }
}

/// Apply `f(box_index, item)` to every item.
pub fn for_each_fab<T, F>(policy: ExecPolicy, items: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    match policy {
        ExecPolicy::Serial => items.iter_mut().enumerate().for_each(|(i, x)| f(i, x)),
        ExecPolicy::Threaded => items.par_iter_mut().enumerate().for_each(|(i, x)| f(i, x)),
    }
}

/// Map every box index through `f` and combine with `reduce` (used for sums and norms).
pub fn map_reduce_boxes<R, F, G>(policy: ExecPolicy, n: usize, identity: R, f: F, reduce: G) -> R
where
    R: Send + Sync + Copy,
    F: Fn(usize) -> R + Sync + Send,
    G: Fn(R, R) -> R + Sync + Send,
{
    match policy {
        ExecPolicy::Serial => (0..n).map(&f).fold(identity, &reduce),
        ExecPolicy::Threaded => (0..n).into_par_iter().map(&f).reduce(|| identity, &reduce),
    }
}

/// Apply `f` to every index of `bx` (x fastest).
#[inline]
pub fn for_each_cell<const D: usize, F>(bx: &IndexBox<D>, f: F)
where
    F: FnMut(IntVect<D>),
{
    bx.iter().for_each(f);
}
