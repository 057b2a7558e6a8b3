//! Speculative bisection over an ordered sequence of changes.

/// Propose new points to sample between adjacent changes.
///
/// For every adjacent pair `(a, b)` of `changes`:
/// - `detect(a, b) == None` calls `on_unknown(a, b)` so the caller can ask
///   for more samples instead of splitting;
/// - `detect(a, b) == Some(true)` proposes `midpoint(a, b)` and, up to
///   `levels` deep, the midpoints of the two halves it creates;
/// - `detect(a, b) == Some(false)` proposes nothing.
///
/// `midpoint` returns `None` when nothing lies between its arguments, which
/// ends that branch. Each proposal is returned with the index in `changes`
/// of the pair's right-hand change, the position it would be inserted at.
pub fn speculate<C, D, U, M>(
    changes: &[C],
    mut detect: D,
    mut on_unknown: U,
    midpoint: M,
    levels: usize,
) -> Vec<(usize, C)>
where
    D: FnMut(&C, &C) -> Option<bool>,
    U: FnMut(&C, &C),
    M: Fn(&C, &C) -> Option<C>,
{
    let mut proposals = Vec::new();
    for (index, pair) in changes.windows(2).enumerate() {
        let (a, b) = (&pair[0], &pair[1]);
        match detect(a, b) {
            None => on_unknown(a, b),
            Some(true) => split(a, b, index + 1, levels, &midpoint, &mut proposals),
            Some(false) => {}
        }
    }
    proposals
}

fn split<C, M>(a: &C, b: &C, anchor: usize, level: usize, midpoint: &M, out: &mut Vec<(usize, C)>)
where
    M: Fn(&C, &C) -> Option<C>,
{
    if level == 0 {
        return;
    }
    let Some(mid) = midpoint(a, b) else {
        return;
    };
    split(a, &mid, anchor, level - 1, midpoint, out);
    split(&mid, b, anchor, level - 1, midpoint, out);
    out.push((anchor, mid));
}
