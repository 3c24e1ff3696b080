//! Union-Find over dense integer handles, used for batch coreference.

/// Disjoint-set forest with union by rank and path compression.
#[derive(Debug, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh singleton and return its handle.
    pub fn push(&mut self) -> usize {
        let handle = self.parent.len();
        self.parent.push(handle);
        self.rank.push(0);
        handle
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Representative of the set containing `x`.
    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets containing `a` and `b`. Returns the new root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return ra;
        }
        let (winner, loser) = if self.rank[ra] >= self.rank[rb] {
            (ra, rb)
        } else {
            (rb, ra)
        };
        self.parent[loser] = winner;
        if self.rank[ra] == self.rank[rb] {
            self.rank[winner] += 1;
        }
        winner
    }

    pub fn same(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singletons_are_distinct() {
        let mut uf = UnionFind::new();
        let a = uf.push();
        let b = uf.push();
        assert!(!uf.same(a, b));
    }

    #[test]
    fn union_is_transitive() {
        let mut uf = UnionFind::new();
        let a = uf.push();
        let b = uf.push();
        let c = uf.push();
        uf.union(a, b);
        uf.union(b, c);
        assert!(uf.same(a, c));
    }

    #[test]
    fn find_compresses_paths() {
        let mut uf = UnionFind::new();
        let handles: Vec<usize> = (0..100).map(|_| uf.push()).collect();
        for pair in handles.windows(2) {
            uf.union(pair[0], pair[1]);
        }
        let root = uf.find(handles[0]);
        for &h in &handles {
            assert_eq!(uf.find(h), root);
        }
    }
}
