use super::pbvh_update::leaf_vertex_aabb;
use super::{NodeFlags, Pbvh, PbvhData};
use crate::utils::{HashMap, HashSet};

impl Pbvh {
    /// Counts the leaves reachable from the node at index `id`.
    ///
    /// This is mostly a utility for debugging.
    pub fn reachable_leaf_count(&self, id: u32) -> u32 {
        match self.nodes[id as usize].children() {
            None => 1,
            Some([left, right]) => {
                self.reachable_leaf_count(left) + self.reachable_leaf_count(right)
            }
        }
    }

    /// Panics if the tree isn't well-formed.
    ///
    /// The tree is well-formed if every node is reachable exactly once from the root,
    /// every primitive is referenced by exactly one leaf, leaves never mix materials nor
    /// split a base face, and the boxes of the parents bound the ones of their children.
    /// Boxes are only checked when no leaf has a pending `UPDATE_BB`.
    pub fn assert_well_formed(&self) {
        assert!(!self.nodes.is_empty(), "the tree has no root");

        let mut visited = HashSet::default();
        self.assert_well_formed_recurse(0, &mut visited);
        assert_eq!(visited.len(), self.nodes.len(), "some nodes are unreachable");

        let leaves = self.leaves();
        let bounds_clean = leaves
            .iter()
            .all(|leaf| !self.nodes[*leaf as usize].flag.contains(NodeFlags::UPDATE_BB));

        if bounds_clean {
            for leaf in &leaves {
                let n = &self.nodes[*leaf as usize];
                let vb = leaf_vertex_aabb(&self.data, &self.prim_indices, n);
                if vb.is_valid() {
                    assert!(n.vb.contains(&vb), "leaf {} does not bound its vertices", leaf);
                }
            }

            for (id, node) in self.nodes.iter().enumerate() {
                if let Some([left, right]) = node.children() {
                    for child in [left, right] {
                        let cvb = &self.nodes[child as usize].vb;
                        if cvb.is_valid() {
                            assert!(
                                node.vb.contains(cvb),
                                "node {} does not bound child {}",
                                id,
                                child
                            );
                        }
                    }
                }
            }
        }

        match &self.data {
            PbvhData::Faces(mesh) => {
                self.assert_prims_partitioned(mesh.num_corner_tris(), mesh.tri_faces(), |a, b| {
                    mesh.face_materials_match(
                        mesh.tri_faces()[a as usize] as usize,
                        mesh.tri_faces()[b as usize] as usize,
                    )
                });

                let mut owner = vec![None; mesh.num_verts()];
                for leaf in &leaves {
                    let n = &self.nodes[*leaf as usize];
                    for vert in &n.vert_indices[..n.uniq_verts as usize] {
                        assert!(owner[*vert as usize].is_none(), "vertex {} is owned twice", vert);
                        owner[*vert as usize] = Some(*leaf);
                    }
                }
                for leaf in &leaves {
                    let n = &self.nodes[*leaf as usize];
                    for vert in &n.vert_indices[n.uniq_verts as usize..] {
                        assert!(owner[*vert as usize].is_some_and(|o| o != *leaf));
                    }
                }
            }
            PbvhData::Grids(grids) => {
                self.assert_prims_partitioned(grids.num_grids(), grids.grid_to_face_map(), |a, b| {
                    grids.grid_materials_match(a as usize, b as usize)
                });
            }
            PbvhData::BMesh(data) => {
                let mut face_owner = HashMap::default();
                let mut vert_owner = HashMap::default();

                for leaf in &leaves {
                    let n = &self.nodes[*leaf as usize];

                    for face in &n.bm_faces {
                        assert!(
                            face_owner.insert(*face, *leaf).is_none(),
                            "face {} is in two leaves",
                            face
                        );
                        assert_eq!(data.face_node(*face), Some(*leaf));

                        let f = data
                            .mesh
                            .face(*face)
                            .expect("leaf face missing from the mesh");
                        for vert in f.verts() {
                            assert!(
                                n.bm_unique_verts.contains(&vert)
                                    || n.bm_other_verts.contains(&vert)
                            );
                        }
                    }

                    for vert in &n.bm_unique_verts {
                        assert!(
                            vert_owner.insert(*vert, *leaf).is_none(),
                            "vertex {} is owned twice",
                            vert
                        );
                        assert_eq!(data.vert_node(*vert), Some(*leaf));
                    }
                }

                assert_eq!(face_owner.len(), data.mesh.num_faces());
                assert_eq!(face_owner.len(), data.face_node.len());
                assert_eq!(vert_owner.len(), data.vert_node.len());

                for leaf in &leaves {
                    for vert in &self.nodes[*leaf as usize].bm_other_verts {
                        assert!(vert_owner.get(vert).is_some_and(|o| o != leaf));
                    }
                }
            }
        }
    }

    fn assert_well_formed_recurse(&self, id: u32, visited: &mut HashSet<u32>) {
        assert!(visited.insert(id), "node {} is reachable twice", id);

        if let Some([left, right]) = self.nodes[id as usize].children() {
            assert!(left > id, "children must be stored after their parent");
            assert!((right as usize) < self.nodes.len());
            self.assert_well_formed_recurse(left, visited);
            self.assert_well_formed_recurse(right, visited);
        }
    }

    /// Checks that the leaves split `0..num_prims` without overlap, never separate two
    /// primitives of the same base face, and only mix matching materials.
    fn assert_prims_partitioned(
        &self,
        num_prims: usize,
        prim_faces: &[u32],
        materials_match: impl Fn(u32, u32) -> bool,
    ) {
        let mut seen = vec![false; num_prims];
        let mut face_leaf = HashMap::default();

        for leaf in self.leaves() {
            let prims = self.node_prim_indices(leaf);

            for prim in prims {
                assert!(!seen[*prim as usize], "primitive {} is referenced twice", prim);
                seen[*prim as usize] = true;

                let face = prim_faces[*prim as usize];
                let owner = *face_leaf.entry(face).or_insert(leaf);
                assert_eq!(owner, leaf, "face {} is split across leaves", face);
            }

            if let Some(first) = prims.first() {
                for prim in prims {
                    assert!(materials_match(*first, *prim), "leaf {} mixes materials", leaf);
                }
            }
        }

        assert!(seen.iter().all(|s| *s), "some primitives are not referenced");
        assert_eq!(self.prim_indices.len(), num_prims);
    }
}
