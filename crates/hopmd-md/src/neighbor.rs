//! Verlet neighbour list with displacement-triggered rebuild.

use hopmd_math::{SimBox, Vec3};

/// Neighbour list for pairwise interactions.
#[derive(Clone, Debug)]
pub struct NeighborList {
    /// Neighbour pairs (i, j) with i < j.
    pub pairs: Vec<(usize, usize)>,
    /// Cutoff radius.
    pub r_cut: f64,
    /// Skin distance (buffer for rebuilding).
    pub skin: f64,
    /// Atoms the list was built over; `None` means all atoms.
    subset: Option<Vec<usize>>,
    /// Positions of the listed atoms at the last rebuild.
    last_positions: Vec<Vec3>,
}

impl NeighborList {
    pub fn new(r_cut: f64, skin: f64) -> Self {
        Self {
            pairs: Vec::new(),
            r_cut,
            skin,
            subset: None,
            last_positions: Vec::new(),
        }
    }

    /// Build the list over all atoms.
    pub fn build(&mut self, x: &[Vec3], pbc: &SimBox) {
        self.subset = None;
        self.last_positions = x.to_vec();
        let all: Vec<usize> = (0..x.len()).collect();
        self.pairs = search(&all, x, pbc, self.r_cut + self.skin);
    }

    /// Build the list over the given atoms only; pairs hold atom indices.
    pub fn build_subset(&mut self, atoms: &[usize], x: &[Vec3], pbc: &SimBox) {
        self.last_positions = atoms.iter().map(|&a| x[a]).collect();
        self.pairs = search(atoms, x, pbc, self.r_cut + self.skin);
        self.subset = Some(atoms.to_vec());
    }

    /// True if any listed atom moved more than half the skin since the last build.
    pub fn needs_rebuild(&self, x: &[Vec3], pbc: &SimBox) -> bool {
        let max_disp_sq = (0.5 * self.skin).powi(2);
        match &self.subset {
            None => {
                if self.last_positions.len() != x.len() {
                    return true;
                }
                self.last_positions
                    .iter()
                    .zip(x)
                    .any(|(last, now)| pbc.dx(last, now).norm_squared() > max_disp_sq)
            }
            Some(atoms) => atoms
                .iter()
                .zip(&self.last_positions)
                .any(|(&a, last)| a >= x.len() || pbc.dx(last, &x[a]).norm_squared() > max_disp_sq),
        }
    }

    /// Pairs of the list that are currently within the cutoff.
    pub fn within_cutoff<'a>(
        &'a self,
        x: &'a [Vec3],
        pbc: &'a SimBox,
    ) -> impl Iterator<Item = (usize, usize, f64)> + 'a {
        let rc2 = self.r_cut * self.r_cut;
        self.pairs.iter().filter_map(move |&(i, j)| {
            let r2 = pbc.dx(&x[i], &x[j]).norm_squared();
            (r2 < rc2).then(|| (i, j, r2.sqrt()))
        })
    }
}

fn search(atoms: &[usize], x: &[Vec3], pbc: &SimBox, r_search: f64) -> Vec<(usize, usize)> {
    let r_search_sq = r_search * r_search;
    let mut pairs = Vec::new();
    for (k, &i) in atoms.iter().enumerate() {
        for &j in &atoms[k + 1..] {
            if pbc.dx(&x[i], &x[j]).norm_squared() < r_search_sq {
                pairs.push((i.min(j), i.max(j)));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbor_list_build() {
        let x = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
        ];

        let mut nlist = NeighborList::new(2.0, 0.5);
        nlist.build(&x, &SimBox::open());

        // (0,1) at r=1.0 < 2.5; (0,2) and (1,2) too far
        assert_eq!(nlist.pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_neighbor_list_periodic() {
        let x = vec![Vec3::new(0.1, 0.0, 0.0), Vec3::new(2.9, 0.0, 0.0)];
        let mut nlist = NeighborList::new(0.3, 0.1);
        nlist.build(&x, &SimBox::rectangular(Vec3::new(3.0, 3.0, 3.0)));
        assert_eq!(nlist.pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_neighbor_list_rebuild() {
        let mut x = vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let pbc = SimBox::open();

        let mut nlist = NeighborList::new(2.0, 0.5);
        nlist.build(&x, &pbc);
        assert!(!nlist.needs_rebuild(&x, &pbc));

        // Less than half the skin
        x[0] += Vec3::new(0.1, 0.0, 0.0);
        assert!(!nlist.needs_rebuild(&x, &pbc));

        x[0] += Vec3::new(0.3, 0.0, 0.0);
        assert!(nlist.needs_rebuild(&x, &pbc));
    }

    #[test]
    fn test_subset_and_cutoff_filter() {
        let x = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.1, 0.0, 0.0),
            Vec3::new(0.3, 0.0, 0.0),
            Vec3::new(0.32, 0.0, 0.0),
        ];
        let pbc = SimBox::open();
        let mut nlist = NeighborList::new(0.25, 0.1);
        nlist.build_subset(&[3, 0, 2], &x, &pbc);

        // Atom 1 is not in the subset
        assert!(nlist.pairs.iter().all(|&(i, j)| i != 1 && j != 1));
        assert!(nlist.pairs.contains(&(0, 3)));

        let close: Vec<_> = nlist.within_cutoff(&x, &pbc).map(|(i, j, _)| (i, j)).collect();
        assert!(close.contains(&(2, 3)));
        assert!(!close.contains(&(0, 3)));
    }
}
