use crate::{jittered_mesh, options};
use pbvh3d::math::Real;
use pbvh3d::mesh::SubdivGrids;
use pbvh3d::partitioning::{NodeFlags, Pbvh};

#[test]
fn random_meshes_are_well_formed() {
    for seed in 0..20 {
        for leaf_limit in [1, 3, 8, 50] {
            let mesh = jittered_mesh(seed, 12, 1 + seed as u32 % 4);
            let num_tris = mesh.num_corner_tris();
            let pbvh = Pbvh::build_mesh(mesh, options(leaf_limit)).unwrap();
            pbvh.assert_well_formed();

            let leaves = pbvh.leaves();
            let total: usize = leaves.iter().map(|l| pbvh.node(*l).prim_count()).sum();
            assert_eq!(total, num_tris);
            assert_eq!(pbvh.reachable_leaf_count(0) as usize, leaves.len());

            // Leaves only exceed the limit to keep the triangles of a quad together.
            for leaf in leaves {
                assert!(pbvh.node(leaf).prim_count() <= leaf_limit.max(2));
            }
        }
    }
}

#[test]
fn moved_vertices_are_refit() {
    let mut rng = oorandom::Rand32::new(7);
    let mut pbvh = Pbvh::build_mesh(jittered_mesh(3, 16, 2), options(12)).unwrap();
    let num_verts = pbvh.faces().unwrap().num_verts();

    for _ in 0..10 {
        let moved: Vec<usize> = (0..20)
            .map(|_| rng.rand_range(0..num_verts as u32) as usize)
            .collect();

        let positions = pbvh.faces_mut().unwrap().positions_mut();
        for vert in &moved {
            positions[*vert].z += rng.rand_float() as Real * 4.0 - 2.0;
        }

        // Tag every leaf using one of the moved vertices.
        for leaf in pbvh.leaves() {
            if pbvh
                .node(leaf)
                .vert_indices()
                .iter()
                .any(|v| moved.contains(&(*v as usize)))
            {
                pbvh.node_mut(leaf).mark_positions_update();
            }
        }

        pbvh.update_bounds(NodeFlags::UPDATE_BB | NodeFlags::UPDATE_REDRAW);
        pbvh.update_normals();
        pbvh.assert_well_formed();

        for node in pbvh.nodes() {
            assert!(!node
                .flag()
                .intersects(NodeFlags::UPDATE_BB | NodeFlags::UPDATE_NORMALS));
        }
    }
}

#[test]
fn grids_never_split_a_base_face() {
    // Base face `f` owns `1 + f % 4` grids of 5 * 5 samples.
    let grid_size = 5;
    let area = grid_size * grid_size;
    let mut face_offsets = vec![0];
    for f in 0..30 {
        let last = *face_offsets.last().unwrap();
        face_offsets.push(last + 1 + f % 4);
    }

    let num_grids = *face_offsets.last().unwrap() as usize;
    let mut rng = oorandom::Rand32::new(11);
    let positions = (0..num_grids * area)
        .map(|i| {
            let (grid, sample) = (i / area, i % area);
            pbvh3d::math::Point::new(
                (grid * grid_size + sample % grid_size) as Real,
                (sample / grid_size) as Real,
                rng.rand_float() as Real,
            )
        })
        .collect();

    let grids = SubdivGrids::new(grid_size as u32, face_offsets, positions)
        .unwrap()
        .with_material_indices((0..30).map(|f| f % 3).collect())
        .unwrap();

    for leaf_limit in [25, 100, 400] {
        let pbvh = Pbvh::build_grids(grids.clone(), options(leaf_limit)).unwrap();
        pbvh.assert_well_formed();
        assert!(pbvh.leaf_limit() >= 4);
    }
}
