/// A disjoint-set forest over the ids `0..len`, merged by size.
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    /// Creates a structure in which every id is its own set.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    /// Returns the root of the set containing `id`, halving the path on the way.
    pub fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    /// Merges the sets containing `a` and `b`.
    pub fn union(&mut self, a: usize, b: usize) {
        let mut root_a = self.find(a);
        let mut root_b = self.find(b);
        if root_a == root_b {
            return;
        }
        if self.size[root_a] < self.size[root_b] {
            std::mem::swap(&mut root_a, &mut root_b);
        }
        self.parent[root_b] = root_a;
        self.size[root_a] += self.size[root_b];
    }
}

#[cfg(test)]
mod tests {
    use super::UnionFind;

    #[test]
    fn fresh_ids_are_their_own_roots() {
        let mut uf = UnionFind::new(5);
        assert_eq!(uf.find(0), 0);
        assert_eq!(uf.find(4), 4);
    }

    #[test]
    fn union_is_transitive() {
        let mut uf = UnionFind::new(6);

        uf.union(0, 1);
        uf.union(1, 2);
        assert_eq!(uf.find(0), uf.find(2));

        uf.union(3, 4);
        assert_ne!(uf.find(0), uf.find(3));

        uf.union(2, 3);
        assert_eq!(uf.find(0), uf.find(4));
    }

    #[test]
    fn larger_set_absorbs_the_smaller() {
        let mut uf = UnionFind::new(5);
        uf.union(0, 1);
        uf.union(0, 2);
        let root = uf.find(0);
        uf.union(3, 0);
        assert_eq!(uf.find(3), root);
    }
}
