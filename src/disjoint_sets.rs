/// Concurrent disjoint sets (union-find)
/// One flat array of 64-bit atomics, each entry packing rank (high 8 bits)
/// and parent (low 56 bits). Find uses path halving, union is by rank with
/// a CAS loop. Workers call union concurrently during marker graph vertex
/// construction; the resulting partition does not depend on interleaving.

use std::sync::atomic::{AtomicU64, Ordering};

const PARENT_BITS: u32 = 56;
const PARENT_MASK: u64 = (1u64 << PARENT_BITS) - 1;

fn parent_of(entry: u64) -> u64 {
    entry & PARENT_MASK
}

fn rank_of(entry: u64) -> u64 {
    entry >> PARENT_BITS
}

fn pack(rank: u64, parent: u64) -> u64 {
    (rank << PARENT_BITS) | parent
}

pub struct DisjointSets {
    entries: Vec<AtomicU64>,
}

impl DisjointSets {
    pub fn new(size: u64) -> Self {
        assert!(size <= PARENT_MASK, "disjoint sets size exceeds parent field");
        let mut entries = Vec::with_capacity(size as usize);
        for i in 0..size {
            entries.push(AtomicU64::new(pack(0, i)));
        }
        DisjointSets { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Representative of the set containing x, with path halving.
    pub fn find(&self, mut x: u64) -> u64 {
        loop {
            let entry = self.entries[x as usize].load(Ordering::Acquire);
            let parent = parent_of(entry);
            if parent == x {
                return x;
            }
            let parent_entry = self.entries[parent as usize].load(Ordering::Acquire);
            let grandparent = parent_of(parent_entry);
            if grandparent == parent {
                return parent;
            }
            // halve the path; losing the race is fine, somebody else halved it
            let _ = self.entries[x as usize].compare_exchange_weak(
                entry,
                pack(rank_of(entry), grandparent),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            x = grandparent;
        }
    }

    /// Merge the sets containing a and b. Safe to call concurrently.
    pub fn union(&self, a: u64, b: u64) {
        loop {
            let root_a = self.find(a);
            let root_b = self.find(b);
            if root_a == root_b {
                return;
            }
            let entry_a = self.entries[root_a as usize].load(Ordering::Acquire);
            let entry_b = self.entries[root_b as usize].load(Ordering::Acquire);
            // somebody moved a root from under us, retry
            if parent_of(entry_a) != root_a || parent_of(entry_b) != root_b {
                continue;
            }
            let rank_a = rank_of(entry_a);
            let rank_b = rank_of(entry_b);

            // attach the lower rank root under the higher one;
            // equal ranks attach the higher index under the lower
            let (child, child_entry, root, root_entry) = if rank_a < rank_b {
                (root_a, entry_a, root_b, entry_b)
            } else if rank_b < rank_a {
                (root_b, entry_b, root_a, entry_a)
            } else if root_a > root_b {
                (root_a, entry_a, root_b, entry_b)
            } else {
                (root_b, entry_b, root_a, entry_a)
            };

            if self.entries[child as usize]
                .compare_exchange(
                    child_entry,
                    pack(rank_of(child_entry), root),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                if rank_of(child_entry) == rank_of(root_entry) {
                    // rank bump may fail if the root changed, that only
                    // costs balance, not correctness
                    let _ = self.entries[root as usize].compare_exchange(
                        root_entry,
                        pack(rank_of(root_entry) + 1, root),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn serial_union_find() {
        let sets = DisjointSets::new(10);
        sets.union(0, 1);
        sets.union(2, 3);
        sets.union(1, 3);
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(0), sets.find(4));
        assert_eq!(sets.find(9), 9);
    }

    #[test]
    fn concurrent_unions_produce_the_same_partition() {
        let n: u64 = 10_000;
        let sets = DisjointSets::new(n);
        // chain every even index to its successor, in parallel
        (0..n - 1).into_par_iter().for_each(|i| {
            if i % 2 == 0 {
                sets.union(i, i + 1);
            }
        });
        (0..n - 1).into_par_iter().for_each(|i| {
            if i % 2 == 1 {
                sets.union(i, i + 1);
            }
        });
        // everything ends up in one set
        let root = sets.find(0);
        for i in 1..n {
            assert_eq!(sets.find(i), root);
        }
    }

    #[test]
    fn disjoint_groups_stay_disjoint() {
        let n: u64 = 1000;
        let sets = DisjointSets::new(n);
        (0..n).into_par_iter().for_each(|i| {
            // group by residue mod 10
            if i >= 10 {
                sets.union(i, i - 10);
            }
        });
        for i in 0..n {
            for j in 0..10 {
                let same = sets.find(i) == sets.find(j);
                assert_eq!(same, i % 10 == j % 10);
            }
        }
    }
}
