//! Molecular graph for making molecules whole across periodic boundaries.

use crate::topology::Topology;
use hopmd_math::{SimBox, Vec3};

/// Spanning forest over the bonded connectivity.
///
/// Each edge `(parent, child)` is visited in breadth-first order from the
/// lowest atom index of its molecule, so a single pass over the edges places
/// every child next to its already-placed parent.
#[derive(Clone, Debug, Default)]
pub struct MolGraph {
    edges: Vec<(usize, usize)>,
    molecules: Vec<Vec<usize>>,
}

impl MolGraph {
    pub fn new(natoms: usize, bonded_pairs: &[(usize, usize)]) -> Self {
        let mut adjacency = vec![Vec::new(); natoms];
        for &(i, j) in bonded_pairs {
            adjacency[i].push(j);
            adjacency[j].push(i);
        }
        for list in &mut adjacency {
            list.sort_unstable();
            list.dedup();
        }

        let mut visited = vec![false; natoms];
        let mut edges = Vec::new();
        let mut molecules = Vec::new();
        for root in 0..natoms {
            if visited[root] {
                continue;
            }
            visited[root] = true;
            let mut members = vec![root];
            let mut head = 0;
            while head < members.len() {
                let a = members[head];
                head += 1;
                for &b in &adjacency[a] {
                    if !visited[b] {
                        visited[b] = true;
                        edges.push((a, b));
                        members.push(b);
                    }
                }
            }
            members.sort_unstable();
            molecules.push(members);
        }

        Self { edges, molecules }
    }

    pub fn from_topology(topology: &Topology) -> Self {
        Self::new(topology.natoms(), &topology.bonded_pairs())
    }

    /// Connected components, each sorted by atom index.
    pub fn molecules(&self) -> &[Vec<usize>] {
        &self.molecules
    }

    pub fn nedges(&self) -> usize {
        self.edges.len()
    }

    /// Shift atoms so that every bonded neighbour sits at its minimum image.
    pub fn make_whole(&self, x: &mut [Vec3], pbc: &SimBox) {
        if !pbc.is_periodic() {
            return;
        }
        for &(parent, child) in &self.edges {
            let d = pbc.dx(&x[parent], &x[child]);
            x[child] = x[parent] + d;
        }
    }
}
