//! Proportional distribution of a category's search budget across servers.
//!
//! Pure arithmetic; knows nothing about dry-run or submission.

/// Split `limit` searches across servers holding `available[i]` items each.
///
/// Returned allocations line up with `available`. Guarantees:
/// - `limit == 0` allocates nothing.
/// - If everything fits (`sum <= limit`), every server gets all its items.
/// - Otherwise allocations sum to exactly `limit`, no server exceeds its
///   available count, and every server with items gets at least one unless
///   there are more such servers than `limit`. In that case the `limit`
///   servers with the most items get one each.
///
/// Shares start at `floor(limit * count / total)`, lifted to one where that
/// rounds to zero. An overshoot is trimmed from the largest allocations. A
/// shortfall goes to the servers with the largest fractional remainders.
/// Ties between equal remainders (or equal counts) go to the earlier server;
/// ties while trimming take from the later server.
pub fn allocate(available: &[usize], limit: usize) -> Vec<usize> {
    let mut alloc = vec![0; available.len()];
    if limit == 0 {
        return alloc;
    }

    let total: usize = available.iter().sum();
    if total <= limit {
        return available.to_vec();
    }

    let eligible: Vec<usize> = (0..available.len())
        .filter(|&i| available[i] > 0)
        .collect();

    if limit < eligible.len() {
        let mut ranked = eligible;
        ranked.sort_by(|&a, &b| available[b].cmp(&available[a]).then(a.cmp(&b)));
        for &i in ranked.iter().take(limit) {
            alloc[i] = 1;
        }
        return alloc;
    }

    let share = |i: usize| (limit as u128 * available[i] as u128, total as u128);

    let mut lifted = vec![false; available.len()];
    for &i in &eligible {
        let (numerator, denominator) = share(i);
        let raw = (numerator / denominator) as usize;
        if raw == 0 {
            alloc[i] = 1;
            lifted[i] = true;
        } else {
            alloc[i] = raw;
        }
    }

    let mut sum: usize = alloc.iter().sum();

    // Trim overshoot caused by the floor of one
    while sum > limit {
        let largest = eligible
            .iter()
            .copied()
            .filter(|&i| alloc[i] > 1)
            .max_by(|&a, &b| alloc[a].cmp(&alloc[b]).then(a.cmp(&b)));
        match largest {
            Some(i) => {
                alloc[i] -= 1;
                sum -= 1;
            }
            None => break,
        }
    }

    // Largest remainder first; lifted servers already hold more than their share
    let mut order: Vec<usize> = eligible.iter().copied().filter(|&i| !lifted[i]).collect();
    order.sort_by(|&a, &b| {
        let (na, d) = share(a);
        let (nb, _) = share(b);
        (nb % d).cmp(&(na % d)).then(a.cmp(&b))
    });
    order.extend(eligible.iter().copied().filter(|&i| lifted[i]));

    while sum < limit {
        let mut progressed = false;
        for &i in &order {
            if sum == limit {
                break;
            }
            if alloc[i] < available[i] {
                alloc[i] += 1;
                sum += 1;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    alloc
}
